//! Merging ordered files into one output tree.
//!
//! External files are re-emitted verbatim (minus imports and directives,
//! plus a provenance comment). Project files are reduced to their rewritten
//! definition statements, grouped by namespace, and deduplicated by
//! fully-qualified name. The entry file keeps its executable statements,
//! emitted after every definition so the packed program runs against a
//! fully-loaded symbol table.
//!
//! Function duplicates whose bodies carry PHP-8 / PHP-7 version markers are
//! collapsed into a single `if (PHP_VERSION_ID >= 80000)` wrapper; this
//! mirrors the way version-guarded duplicates reach us from conditional
//! includes, and is admittedly a text heuristic.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info};

use crate::db::Store;
use crate::error::{Result, WarningKind, Warnings};
use crate::php::names::NameContext;
use crate::php::rewrite::{
    RewriteOptions, TopLevelKind, apply_edits, apply_edits_in_range, rewrite_edits,
    top_level_statements,
};
use crate::php::{PhpParser, node_kinds};
use crate::types::{FileId, StoredFile};

/// Options controlling the merge.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeOptions {
    /// Strip comments from the output
    pub strip_comments: bool,
    /// Remove unreferenced private members (only safe without reflection
    /// on private members)
    pub optimize: bool,
}

/// Counters reported by the merger.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeStats {
    /// Structurally-equivalent duplicates dropped
    pub duplicates_dropped: usize,
    /// Structurally-different duplicates kept in source order
    pub variants_kept: usize,
    /// Function pairs collapsed under a version guard
    pub functions_merged: usize,
    /// Private methods removed by the optimisation pass
    pub private_methods_removed: usize,
    /// Private properties removed by the optimisation pass
    pub private_properties_removed: usize,
}

/// What one merged node represents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergedNodeKind {
    /// An external file carried verbatim
    External {
        /// Root-relative path of the source file
        path: String,
    },
    /// Definitions without a namespace
    GlobalDefinitions,
    /// One `namespace X { … }` wrapper
    Namespace {
        /// The namespace string
        name: String,
    },
    /// The entry file's executable statements
    EntryStatements,
}

/// One node of the merged output tree.
#[derive(Debug, Clone)]
pub struct MergedNode {
    /// What this node represents
    pub kind: MergedNodeKind,
    /// Rendered source text of the node
    pub text: String,
}

/// The merged output tree.
#[derive(Debug, Clone, Default)]
pub struct MergedAst {
    /// Nodes in emission order
    pub nodes: Vec<MergedNode>,
}

impl MergedAst {
    /// Render the tree to output text.
    ///
    /// Deterministic: the same tree always renders to the same bytes.
    /// `minify` collapses blank lines.
    #[must_use]
    pub fn render(&self, minify: bool) -> String {
        let mut out = String::from("<?php\n");
        for node in &self.nodes {
            out.push('\n');
            out.push_str(node.text.trim_end());
            out.push('\n');
        }

        if minify {
            let lines: Vec<&str> = out.lines().filter(|l| !l.trim().is_empty()).collect();
            let mut collapsed = lines.join("\n");
            collapsed.push('\n');
            return collapsed;
        }
        out
    }
}

/// One definition awaiting deduplication.
#[derive(Debug)]
struct Definition {
    key: String,
    kind: DefinitionKind,
    text: String,
}

#[derive(Debug)]
enum DefinitionKind {
    ClassLike { methods: Vec<String> },
    Function { body: String },
    Const,
}

/// Merge the ordered file list into a single output tree.
pub fn merge(
    parser: &mut PhpParser,
    store: &Store,
    warnings: &mut Warnings,
    ordered: &[StoredFile],
    options: MergeOptions,
) -> Result<(MergedAst, MergeStats)> {
    let mut stats = MergeStats::default();
    let mut merged = MergedAst::default();

    // Partition preserving order within each group.
    let (external, project): (Vec<&StoredFile>, Vec<&StoredFile>) =
        ordered.iter().partition(|f| f.is_external);

    for file in &external {
        merged.nodes.push(external_node(parser, warnings, file));
    }

    // Namespace buckets in encounter order; "" is the global bucket.
    let mut buckets: Vec<(String, Vec<Definition>)> = Vec::new();
    let mut bucket_index: HashMap<String, usize> = HashMap::new();
    let mut entry_statements: Vec<String> = Vec::new();

    for file in &project {
        collect_project_definitions(
            parser,
            store,
            warnings,
            file,
            options,
            &mut buckets,
            &mut bucket_index,
            &mut entry_statements,
        )?;
    }

    // The global bucket always leads; namespaced buckets keep their
    // relative encounter order (stable sort).
    buckets.sort_by_key(|(namespace, _)| !namespace.is_empty());

    for (namespace, definitions) in &buckets {
        let mut kept = deduplicate(definitions, warnings, &mut stats);
        if options.optimize {
            for definition in &mut kept {
                optimize_definition(parser, definition, &mut stats);
            }
        }
        if kept.is_empty() {
            continue;
        }

        let body = kept.join("\n\n");
        if namespace.is_empty() {
            merged.nodes.push(MergedNode {
                kind: MergedNodeKind::GlobalDefinitions,
                text: body,
            });
        } else {
            merged.nodes.push(MergedNode {
                kind: MergedNodeKind::Namespace {
                    name: namespace.clone(),
                },
                text: format!("namespace {namespace} {{\n\n{body}\n\n}}"),
            });
        }
    }

    if !entry_statements.is_empty() {
        merged.nodes.push(MergedNode {
            kind: MergedNodeKind::EntryStatements,
            text: entry_statements.join("\n"),
        });
    }

    info!(
        external = external.len(),
        project = project.len(),
        duplicates_dropped = stats.duplicates_dropped,
        functions_merged = stats.functions_merged,
        "merge complete"
    );
    Ok((merged, stats))
}

/// Re-emit an external file with imports and directives removed and a
/// provenance comment on top.
fn external_node(parser: &mut PhpParser, warnings: &mut Warnings, file: &StoredFile) -> MergedNode {
    let header = format!("// External file: {}\n", file.path);
    let text = match parser.parse(&file.content) {
        Ok(tree) => {
            let ctx = NameContext::build(&tree, &file.content);
            let edits = rewrite_edits(&tree, &file.content, &ctx, &RewriteOptions::default());
            apply_edits(&file.content, &edits)
        }
        Err(e) => {
            warnings.push(
                WarningKind::ParseFailed,
                format!("external file {} failed to re-parse: {e}", file.path),
            );
            file.content.clone()
        }
    };

    MergedNode {
        kind: MergedNodeKind::External {
            path: file.path.clone(),
        },
        text: format!("{header}{}", text.trim()),
    }
}

#[allow(clippy::too_many_arguments)]
fn collect_project_definitions(
    parser: &mut PhpParser,
    store: &Store,
    warnings: &mut Warnings,
    file: &StoredFile,
    options: MergeOptions,
    buckets: &mut Vec<(String, Vec<Definition>)>,
    bucket_index: &mut HashMap<String, usize>,
    entry_statements: &mut Vec<String>,
) -> Result<()> {
    let tree = match parser.parse(&file.content) {
        Ok(tree) if !tree.root_node().has_error() => tree,
        Ok(_) | Err(_) => {
            warnings.push(
                WarningKind::ParseFailed,
                format!("{} failed to re-parse during merge", file.path),
            );
            return Ok(());
        }
    };

    let ctx = NameContext::build(&tree, &file.content);

    // Includes whose targets are packed must not run at load time.
    let mut drop_include_lines = HashSet::new();
    for (dep, _target) in store.dependencies_by_source(FileId::from(file.id))? {
        if dep.dependency_type.is_include_family() && dep.is_resolved {
            drop_include_lines.insert(dep.line);
        }
    }

    let rewrite_options = RewriteOptions {
        strip_comments: options.strip_comments,
        drop_include_lines,
    };
    let edits = rewrite_edits(&tree, &file.content, &ctx, &rewrite_options);

    for stmt in top_level_statements(&tree, &file.content, &ctx) {
        let text = apply_edits_in_range(&file.content, stmt.start, stmt.end, &edits);
        let namespace = stmt.namespace.clone().unwrap_or_default();

        match stmt.kind {
            TopLevelKind::ClassLike { kind, fqn, methods } => {
                push_definition(
                    buckets,
                    bucket_index,
                    namespace,
                    Definition {
                        key: format!("{}:{fqn}", kind.as_str()),
                        kind: DefinitionKind::ClassLike { methods },
                        text,
                    },
                );
            }
            TopLevelKind::Function { fqn, body } => {
                let body_text = file.content.get(body.0..body.1).unwrap_or("").to_string();
                push_definition(
                    buckets,
                    bucket_index,
                    namespace,
                    Definition {
                        key: format!("function:{fqn}"),
                        kind: DefinitionKind::Function { body: body_text },
                        text,
                    },
                );
            }
            TopLevelKind::Const { names } => {
                let mut sorted = names;
                sorted.sort();
                push_definition(
                    buckets,
                    bucket_index,
                    namespace,
                    Definition {
                        key: format!("const:{}", sorted.join(",")),
                        kind: DefinitionKind::Const,
                        text,
                    },
                );
            }
            TopLevelKind::Import | TopLevelKind::Directive => {}
            TopLevelKind::Statement => {
                if file.is_entry && !text.trim().is_empty() {
                    entry_statements.push(text.trim_end().to_string());
                }
            }
        }
    }

    Ok(())
}

fn push_definition(
    buckets: &mut Vec<(String, Vec<Definition>)>,
    bucket_index: &mut HashMap<String, usize>,
    namespace: String,
    definition: Definition,
) {
    let index = match bucket_index.get(&namespace) {
        Some(index) => *index,
        None => {
            buckets.push((namespace.clone(), Vec::new()));
            bucket_index.insert(namespace, buckets.len() - 1);
            buckets.len() - 1
        }
    };
    buckets[index].1.push(definition);
}

/// Deduplicate one namespace bucket, returning the surviving texts in
/// source order.
fn deduplicate(
    definitions: &[Definition],
    warnings: &mut Warnings,
    stats: &mut MergeStats,
) -> Vec<String> {
    // Group indices by key, preserving first-encounter order.
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
    for (index, definition) in definitions.iter().enumerate() {
        if !groups.contains_key(&definition.key) {
            order.push(definition.key.clone());
        }
        groups.entry(definition.key.clone()).or_default().push(index);
    }

    let mut kept = Vec::new();
    for key in order {
        let indices = &groups[&key];
        let first = &definitions[indices[0]];

        if indices.len() == 1 {
            kept.push(first.text.clone());
            continue;
        }

        match &first.kind {
            DefinitionKind::ClassLike { methods } => {
                let mut reference: Vec<&str> = methods.iter().map(String::as_str).collect();
                reference.sort_unstable();
                kept.push(first.text.clone());

                for &index in &indices[1..] {
                    let duplicate = &definitions[index];
                    let DefinitionKind::ClassLike { methods } = &duplicate.kind else {
                        continue;
                    };
                    let mut other: Vec<&str> = methods.iter().map(String::as_str).collect();
                    other.sort_unstable();

                    if other == reference {
                        stats.duplicates_dropped += 1;
                        warnings.push(
                            WarningKind::DuplicateDropped,
                            format!("dropped equivalent duplicate definition of {key}"),
                        );
                    } else {
                        stats.variants_kept += 1;
                        warnings.push(
                            WarningKind::DuplicateSymbol,
                            format!(
                                "{key} has structurally different definitions; keeping all in source order"
                            ),
                        );
                        kept.push(duplicate.text.clone());
                    }
                }
            }
            DefinitionKind::Function { body } => {
                if let Some(text) = merge_function_variants(definitions, indices, body, stats) {
                    kept.push(text);
                } else {
                    kept.push(first.text.clone());
                    for _ in &indices[1..] {
                        stats.duplicates_dropped += 1;
                    }
                    warnings.push(
                        WarningKind::DuplicateDropped,
                        format!("kept first of {} definitions of {key}", indices.len()),
                    );
                }
            }
            DefinitionKind::Const => {
                // Constants keep the first definition silently.
                kept.push(first.text.clone());
            }
        }
    }

    kept
}

/// Collapse exactly two version-marked function variants into one guarded
/// definition. Returns `None` when the variants do not match the pattern.
fn merge_function_variants(
    definitions: &[Definition],
    indices: &[usize],
    first_body: &str,
    stats: &mut MergeStats,
) -> Option<String> {
    if indices.len() != 2 {
        return None;
    }
    let second = &definitions[indices[1]];
    let DefinitionKind::Function { body: second_body } = &second.kind else {
        return None;
    };

    let first_marker = version_marker(first_body)?;
    let second_marker = version_marker(second_body)?;

    let first_text = definitions[indices[0]].text.as_str();
    let second_text = second.text.as_str();
    let (v8, v7) = match (first_marker, second_marker) {
        (8, 7) => (first_text, second_text),
        (7, 8) => (second_text, first_text),
        _ => return None,
    };

    stats.functions_merged += 1;
    debug!("merged version-guarded function variants");
    Some(format!(
        "if (PHP_VERSION_ID >= 80000) {{\n{v8}\n}} else {{\n{v7}\n}}"
    ))
}

/// Detect a PHP version marker in a function body.
fn version_marker(body: &str) -> Option<u8> {
    let lower = body.to_lowercase();
    if lower.contains("80000") || lower.contains("php 8") || lower.contains("version 8") {
        return Some(8);
    }
    if lower.contains("70000") || lower.contains("php 7") || lower.contains("version 7") {
        return Some(7);
    }
    None
}

/// Remove private methods and properties that are never referenced inside
/// their own class body.
fn optimize_definition(parser: &mut PhpParser, text: &mut String, stats: &mut MergeStats) {
    const HEADER: &str = "<?php\n";

    let source = format!("{HEADER}{text}");
    let Ok(tree) = parser.parse(&source) else {
        return;
    };
    if tree.root_node().has_error() {
        return;
    }

    let Some(class) = find_first_class(tree.root_node()) else {
        return;
    };
    let Some(body) = crate::php::first_child_of_kinds(class, &[node_kinds::DECLARATION_LIST])
    else {
        return;
    };
    let body_text = source.get(body.byte_range()).unwrap_or("");

    let mut removals: Vec<(usize, usize)> = Vec::new();
    let mut cursor = body.walk();
    for member in body.children(&mut cursor) {
        match member.kind() {
            node_kinds::METHOD_DECLARATION => {
                if !is_private(member, &source) {
                    continue;
                }
                let Some(name) = member.child_by_field_name("name") else {
                    continue;
                };
                let name = source.get(name.byte_range()).unwrap_or("");
                if name.is_empty() || name.starts_with("__") {
                    continue;
                }
                let needles = [
                    format!("$this->{name}"),
                    format!("self::{name}"),
                    format!("static::{name}"),
                ];
                if !referenced(body_text, &needles) {
                    removals.push((member.start_byte(), member.end_byte()));
                    stats.private_methods_removed += 1;
                }
            }
            node_kinds::PROPERTY_DECLARATION => {
                if !is_private(member, &source) {
                    continue;
                }
                let elements =
                    crate::php::children_of_kinds(member, &[node_kinds::PROPERTY_ELEMENT]);
                // Multi-property declarations are left alone.
                let [element] = elements.as_slice() else {
                    continue;
                };
                let Some(variable) =
                    crate::php::first_child_of_kinds(*element, &[node_kinds::VARIABLE_NAME])
                else {
                    continue;
                };
                let name = source
                    .get(variable.byte_range())
                    .unwrap_or("")
                    .trim_start_matches('$');
                if name.is_empty() {
                    continue;
                }
                let needles = [
                    format!("$this->{name}"),
                    format!("self::${name}"),
                    format!("static::${name}"),
                ];
                if !referenced(body_text, &needles) {
                    removals.push((member.start_byte(), member.end_byte()));
                    stats.private_properties_removed += 1;
                }
            }
            _ => {}
        }
    }

    if removals.is_empty() {
        return;
    }

    let mut rewritten = String::with_capacity(source.len());
    let mut last = HEADER.len();
    for (start, end) in removals {
        rewritten.push_str(source.get(last..start).unwrap_or(""));
        last = end;
        // Swallow the trailing newline of the removed member.
        let bytes = source.as_bytes();
        while last < bytes.len() && (bytes[last] == b' ' || bytes[last] == b'\t') {
            last += 1;
        }
        if last < bytes.len() && bytes[last] == b'\n' {
            last += 1;
        }
    }
    rewritten.push_str(source.get(last..).unwrap_or(""));
    *text = rewritten;
}

fn find_first_class(node: tree_sitter::Node<'_>) -> Option<tree_sitter::Node<'_>> {
    if matches!(
        node.kind(),
        node_kinds::CLASS_DECLARATION | node_kinds::TRAIT_DECLARATION
    ) {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<_> = node.children(&mut cursor).collect();
    children.into_iter().find_map(find_first_class)
}

fn is_private(member: tree_sitter::Node<'_>, source: &str) -> bool {
    crate::php::children_of_kinds(member, &[node_kinds::VISIBILITY_MODIFIER])
        .iter()
        .any(|m| source.get(m.byte_range()).unwrap_or("") == "private")
}

/// Whether any needle occurs in the haystack followed by a non-identifier
/// character (so `$this->x` does not match `$this->xyz`).
fn referenced(haystack: &str, needles: &[String]) -> bool {
    for needle in needles {
        let mut from = 0;
        while let Some(found) = haystack[from..].find(needle.as_str()) {
            let end = from + found + needle.len();
            let boundary = haystack[end..]
                .chars()
                .next()
                .is_none_or(|c| !c.is_alphanumeric() && c != '_');
            if boundary {
                return true;
            }
            from = end;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_marker_detects_both_generations() {
        assert_eq!(version_marker("return 'version 8';"), Some(8));
        assert_eq!(version_marker("PHP_VERSION_ID >= 80000"), Some(8));
        assert_eq!(version_marker("return 'version 7';"), Some(7));
        assert_eq!(version_marker("echo 'PHP 7 fallback';"), Some(7));
        assert_eq!(version_marker("return 42;"), None);
    }

    #[test]
    fn referenced_respects_identifier_boundaries() {
        let needles = vec!["$this->x".to_string()];
        assert!(referenced("return $this->x;", &needles));
        assert!(referenced("return $this->x + 1;", &needles));
        assert!(!referenced("return $this->xyz;", &needles));
    }

    #[test]
    fn render_is_deterministic() {
        let ast = MergedAst {
            nodes: vec![
                MergedNode {
                    kind: MergedNodeKind::GlobalDefinitions,
                    text: "function f() {}".to_string(),
                },
                MergedNode {
                    kind: MergedNodeKind::Namespace {
                        name: "App".to_string(),
                    },
                    text: "namespace App {\n\nclass A {}\n\n}".to_string(),
                },
            ],
        };
        assert_eq!(ast.render(false), ast.render(false));
        assert!(ast.render(false).starts_with("<?php\n"));
    }

    #[test]
    fn render_minify_collapses_blank_lines() {
        let ast = MergedAst {
            nodes: vec![MergedNode {
                kind: MergedNodeKind::GlobalDefinitions,
                text: "class A {}\n\n\nclass B {}".to_string(),
            }],
        };
        let rendered = ast.render(true);
        assert!(!rendered.contains("\n\n"));
        assert!(rendered.contains("class A {}\nclass B {}"));
    }

    #[test]
    fn optimize_removes_unused_private_members() {
        let mut parser = PhpParser::new().expect("parser init");
        let mut stats = MergeStats::default();
        let mut text = String::from(
            "class A {\n    private $unused;\n    private $used;\n    private function helper() {}\n    public function run() { return $this->used; }\n}",
        );
        optimize_definition(&mut parser, &mut text, &mut stats);

        assert!(!text.contains("$unused"));
        assert!(!text.contains("function helper"));
        assert!(text.contains("$used"));
        assert!(text.contains("function run"));
        assert_eq!(stats.private_methods_removed, 1);
        assert_eq!(stats.private_properties_removed, 1);
    }

    #[test]
    fn optimize_keeps_referenced_private_methods() {
        let mut parser = PhpParser::new().expect("parser init");
        let mut stats = MergeStats::default();
        let mut text = String::from(
            "class A {\n    private function helper() { return 1; }\n    public function run() { return $this->helper(); }\n}",
        );
        optimize_definition(&mut parser, &mut text, &mut stats);

        assert!(text.contains("function helper"));
        assert_eq!(stats.private_methods_removed, 0);
    }
}
