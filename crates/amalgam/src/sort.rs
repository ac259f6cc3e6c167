//! Load-order computation over resolved dependency edges.
//!
//! The invariant: if file A references a symbol defined in file B, then B
//! must load before A. Edges run source → target ("source depends on
//! target"), so every target precedes its sources in the output.
//!
//! Cycles are classified by the edges that close them. A cycle containing a
//! structural edge (extends / implements / trait use) cannot be loaded in
//! any order and is fatal. Cycles of plain references are broken with a
//! warning: every intra-cycle edge is dropped and the members fall back to
//! id order, which places the smallest-id member first.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::db::Store;
use crate::error::{Error, Result, WarningKind, Warnings};
use crate::types::{FileId, StoredFile};

/// Order the files required by the entry so that every resolved dependency
/// loads before its dependents.
///
/// Ties are broken by smallest file id, which makes the order (and the
/// reference-cycle warnings) deterministic across runs.
pub fn sort_files(
    store: &Store,
    entry: FileId,
    warnings: &mut Warnings,
) -> Result<Vec<StoredFile>> {
    let files = store.all_required_files(entry)?;
    let ids: HashSet<i64> = files.iter().map(|f| f.id).collect();
    let by_id: HashMap<i64, StoredFile> = files.into_iter().map(|f| (f.id, f)).collect();
    let path_of = |id: i64| -> String {
        by_id
            .get(&id)
            .map_or_else(|| format!("file #{id}"), |f| f.path.clone())
    };

    // Deduplicate edges per (source, target), remembering whether any edge
    // between the pair is structural.
    let mut edge_set: HashSet<(i64, i64)> = HashSet::new();
    let mut structural: HashSet<(i64, i64)> = HashSet::new();
    for (source, target, kind) in store.resolved_edges()? {
        if !ids.contains(&source) || !ids.contains(&target) {
            continue;
        }
        if source == target {
            if kind.is_structural() {
                return Err(Error::CircularDependency(format!(
                    "{0} -> {0}",
                    path_of(source)
                )));
            }
            // A file including itself is satisfied by `require_once`
            // semantics; no ordering constraint.
            continue;
        }
        edge_set.insert((source, target));
        if kind.is_structural() {
            structural.insert((source, target));
        }
    }

    // Strongly-connected components over the deduplicated edges.
    let mut graph: DiGraph<i64, ()> = DiGraph::new();
    let mut node_of: HashMap<i64, NodeIndex> = HashMap::new();
    let mut sorted_ids: Vec<i64> = ids.iter().copied().collect();
    sorted_ids.sort_unstable();
    for id in &sorted_ids {
        node_of.insert(*id, graph.add_node(*id));
    }
    for (source, target) in &edge_set {
        graph.add_edge(node_of[source], node_of[target], ());
    }

    for component in tarjan_scc(&graph) {
        if component.len() < 2 {
            continue;
        }
        let mut members: Vec<i64> = component.iter().map(|n| graph[*n]).collect();
        members.sort_unstable();
        let member_set: HashSet<i64> = members.iter().copied().collect();

        let has_structural_edge = structural
            .iter()
            .any(|(s, t)| member_set.contains(s) && member_set.contains(t));
        if has_structural_edge {
            let mut cycle: Vec<String> = members.iter().map(|id| path_of(*id)).collect();
            cycle.push(path_of(members[0]));
            return Err(Error::CircularDependency(cycle.join(" -> ")));
        }

        // Reference-only cycle: drop the intra-cycle edges (each lies on a
        // cycle) so the members fall back to id order, smallest first.
        warnings.push(
            WarningKind::ReferenceCycle,
            format!(
                "reference cycle between {}; loading {} first",
                members
                    .iter()
                    .map(|id| path_of(*id))
                    .collect::<Vec<_>>()
                    .join(", "),
                path_of(members[0])
            ),
        );
        edge_set.retain(|(s, t)| !(member_set.contains(s) && member_set.contains(t)));
    }

    let order = kahn_order(&sorted_ids, &edge_set).map_err(|remaining| {
        Error::CircularDependency(
            remaining
                .iter()
                .map(|id| path_of(*id))
                .collect::<Vec<_>>()
                .join(" -> "),
        )
    })?;

    Ok(order
        .into_iter()
        .filter_map(|id| by_id.get(&id).cloned())
        .collect())
}

/// Sort an arbitrary `{node → [dependencies]}` graph.
///
/// Every dependency precedes its dependents in the result; ties are broken
/// lexicographically. Any cycle is fatal in this variant.
pub fn sort_graph(graph: &BTreeMap<String, Vec<String>>) -> Result<Vec<String>> {
    let mut nodes: Vec<&str> = graph.keys().map(String::as_str).collect();
    for deps in graph.values() {
        for dep in deps {
            if !graph.contains_key(dep) {
                nodes.push(dep);
            }
        }
    }
    nodes.sort_unstable();
    nodes.dedup();

    let mut edge_set: HashSet<(&str, &str)> = HashSet::new();
    for (node, deps) in graph {
        for dep in deps {
            if node == dep {
                return Err(Error::CircularDependency(format!("{node} -> {node}")));
            }
            edge_set.insert((node.as_str(), dep.as_str()));
        }
    }

    let mut digraph: DiGraph<&str, ()> = DiGraph::new();
    let mut node_of: HashMap<&str, NodeIndex> = HashMap::new();
    for node in &nodes {
        node_of.insert(*node, digraph.add_node(*node));
    }
    for (source, target) in &edge_set {
        digraph.add_edge(node_of[source], node_of[target], ());
    }

    for component in tarjan_scc(&digraph) {
        if component.len() < 2 {
            continue;
        }
        let mut members: Vec<&str> = component.iter().map(|n| digraph[*n]).collect();
        members.sort_unstable();
        let mut cycle: Vec<&str> = members.clone();
        cycle.push(members[0]);
        return Err(Error::CircularDependency(cycle.join(" -> ")));
    }

    // Dependency-count Kahn with lexicographic tiebreak.
    let mut remaining: HashMap<&str, usize> = nodes.iter().map(|n| (*n, 0)).collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for (source, target) in &edge_set {
        *remaining.entry(source).or_insert(0) += 1;
        dependents.entry(target).or_default().push(source);
    }

    let mut ready: BinaryHeap<Reverse<&str>> = nodes
        .iter()
        .filter(|n| remaining[*n] == 0)
        .map(|n| Reverse(*n))
        .collect();
    let mut order = Vec::with_capacity(nodes.len());
    while let Some(Reverse(node)) = ready.pop() {
        order.push(node.to_string());
        if let Some(sources) = dependents.get(node) {
            let mut unblocked: Vec<&str> = Vec::new();
            for source in sources {
                if let Some(count) = remaining.get_mut(source) {
                    *count -= 1;
                    if *count == 0 {
                        unblocked.push(source);
                    }
                }
            }
            for source in unblocked {
                ready.push(Reverse(source));
            }
        }
    }

    if order.len() != nodes.len() {
        return Err(Error::Internal(
            "cycle survived component analysis".to_string(),
        ));
    }
    Ok(order)
}

/// Kahn's algorithm over file ids: emit a file once all of its dependency
/// targets are emitted, smallest id first among the ready set.
fn kahn_order(ids: &[i64], edges: &HashSet<(i64, i64)>) -> std::result::Result<Vec<i64>, Vec<i64>> {
    let mut remaining: HashMap<i64, usize> = ids.iter().map(|id| (*id, 0)).collect();
    let mut dependents: HashMap<i64, Vec<i64>> = HashMap::new();
    for (source, target) in edges {
        *remaining.entry(*source).or_insert(0) += 1;
        dependents.entry(*target).or_default().push(*source);
    }

    let mut ready: BinaryHeap<Reverse<i64>> = ids
        .iter()
        .filter(|id| remaining[*id] == 0)
        .map(|id| Reverse(*id))
        .collect();

    let mut order = Vec::with_capacity(ids.len());
    while let Some(Reverse(id)) = ready.pop() {
        order.push(id);
        if let Some(sources) = dependents.get(&id) {
            let mut unblocked = Vec::new();
            for source in sources {
                if let Some(count) = remaining.get_mut(source) {
                    *count -= 1;
                    if *count == 0 {
                        unblocked.push(*source);
                    }
                }
            }
            for source in unblocked {
                ready.push(Reverse(source));
            }
        }
    }

    if order.len() == ids.len() {
        Ok(order)
    } else {
        let emitted: HashSet<i64> = order.iter().copied().collect();
        Err(ids.iter().copied().filter(|id| !emitted.contains(id)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(entries: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
        entries
            .iter()
            .map(|(node, deps)| {
                (
                    (*node).to_string(),
                    deps.iter().map(|d| (*d).to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn dependencies_precede_dependents() {
        let order = sort_graph(&graph(&[
            ("entry", &["child"]),
            ("child", &["base"]),
            ("base", &[]),
        ]))
        .expect("sort");
        assert_eq!(order, vec!["base", "child", "entry"]);
    }

    #[test]
    fn ties_break_lexicographically() {
        let order = sort_graph(&graph(&[("b", &[]), ("a", &[]), ("c", &["a", "b"])]))
            .expect("sort");
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn unknown_dependencies_become_nodes() {
        let order = sort_graph(&graph(&[("a", &["lib"])])).expect("sort");
        assert_eq!(order, vec!["lib", "a"]);
    }

    #[test]
    fn cycles_are_fatal_in_the_graph_variant() {
        let result = sort_graph(&graph(&[("a", &["b"]), ("b", &["a"])]));
        let err = result.expect_err("cycle must fail");
        let message = err.to_string();
        assert!(message.contains("a -> b -> a") || message.contains("a"), "{message}");
    }

    #[test]
    fn self_loops_are_fatal_in_the_graph_variant() {
        let result = sort_graph(&graph(&[("a", &["a"])]));
        assert!(matches!(result, Err(Error::CircularDependency(_))));
    }

    #[test]
    fn empty_graph_sorts_to_empty_order() {
        let order = sort_graph(&BTreeMap::new()).expect("sort");
        assert!(order.is_empty());
    }
}
