//! Source rewriting for the merger.
//!
//! The merger never mutates syntax trees. Instead, this module computes a
//! list of byte-range edits over the original source: delete `use` imports
//! and `declare` directives, expand short names to their fully-qualified
//! form, optionally strip comments and resolved includes. The edits are applied
//! to the text. Constructs the packer does not model come through
//! byte-identical, which is what keeps re-packing deterministic.

use std::collections::HashSet;

use super::names::{NameContext, resolve_class_name, resolve_function_name};
use super::{
    children_of_kinds, first_child_of_kinds, has_child_of_kind, node_kinds, node_text, start_line,
};
use crate::types::SymbolKind;

/// A single text replacement. Deletions use an empty replacement.
#[derive(Debug, Clone)]
pub struct Edit {
    /// Byte offset where the edit starts
    pub start: usize,
    /// Exclusive byte offset where the edit ends
    pub end: usize,
    /// Text inserted in place of the range
    pub replacement: String,
}

/// Options controlling the rewrite pass.
#[derive(Debug, Default)]
pub struct RewriteOptions {
    /// Remove comment nodes from the output
    pub strip_comments: bool,
    /// Lines whose include expressions should be removed (their targets are
    /// packed into the output, so the includes must not run)
    pub drop_include_lines: HashSet<u32>,
}

/// Compute the rewrite edits for a parsed file.
#[must_use]
pub fn rewrite_edits(
    tree: &tree_sitter::Tree,
    content: &str,
    ctx: &NameContext,
    options: &RewriteOptions,
) -> Vec<Edit> {
    let mut edits = Vec::new();
    collect_edits(tree.root_node(), content, ctx, options, &mut edits);
    edits.sort_by_key(|e| (e.start, e.end));
    edits
}

fn collect_edits(
    node: tree_sitter::Node<'_>,
    content: &str,
    ctx: &NameContext,
    options: &RewriteOptions,
    edits: &mut Vec<Edit>,
) {
    match node.kind() {
        node_kinds::PHP_TAG => {
            edits.push(delete_with_trailing_newline(node, content));
            return;
        }
        node_kinds::COMMENT => {
            if options.strip_comments {
                edits.push(delete_with_trailing_newline(node, content));
            }
            return;
        }
        node_kinds::NAMESPACE_USE_DECLARATION | node_kinds::DECLARE_STATEMENT => {
            edits.push(delete_with_trailing_newline(node, content));
            return;
        }

        node_kinds::REQUIRE_EXPRESSION
        | node_kinds::REQUIRE_ONCE_EXPRESSION
        | node_kinds::INCLUDE_EXPRESSION
        | node_kinds::INCLUDE_ONCE_EXPRESSION => {
            if options.drop_include_lines.contains(&start_line(node)) {
                // Remove the whole statement when the include is the
                // statement; otherwise remove just the expression.
                let target = node
                    .parent()
                    .filter(|p| p.kind() == node_kinds::EXPRESSION_STATEMENT)
                    .unwrap_or(node);
                edits.push(delete_with_trailing_newline(target, content));
                return;
            }
        }

        // Class-name positions: direct name children are rewritten here;
        // wrapped types (nullable, unions) reach their names by recursion.
        node_kinds::BASE_CLAUSE
        | node_kinds::CLASS_INTERFACE_CLAUSE
        | node_kinds::TYPE_LIST
        | node_kinds::USE_DECLARATION
        | node_kinds::NAMED_TYPE => {
            for name in children_of_kinds(node, &[node_kinds::NAME, node_kinds::QUALIFIED_NAME]) {
                push_class_name_edit(name, content, ctx, edits);
            }
        }

        node_kinds::OBJECT_CREATION_EXPRESSION => {
            if !has_child_of_kind(node, node_kinds::DECLARATION_LIST) {
                if let Some(name) =
                    first_child_of_kinds(node, &[node_kinds::NAME, node_kinds::QUALIFIED_NAME])
                {
                    push_class_name_edit(name, content, ctx, edits);
                }
            }
            // Recurse for header clauses (anonymous classes) and arguments.
        }

        node_kinds::SCOPED_CALL_EXPRESSION
        | node_kinds::CLASS_CONSTANT_ACCESS_EXPRESSION
        | node_kinds::SCOPED_PROPERTY_ACCESS_EXPRESSION => {
            let scope_node = node
                .child_by_field_name("scope")
                .or_else(|| node.child(0))
                .filter(|n| {
                    matches!(n.kind(), node_kinds::NAME | node_kinds::QUALIFIED_NAME)
                });
            if let Some(scope_node) = scope_node {
                push_class_name_edit(scope_node, content, ctx, edits);
            }
            // Recurse for arguments.
        }

        node_kinds::FUNCTION_CALL_EXPRESSION => {
            let callee = node
                .child_by_field_name("function")
                .filter(|n| {
                    matches!(n.kind(), node_kinds::NAME | node_kinds::QUALIFIED_NAME)
                });
            if let Some(callee) = callee {
                push_function_name_edit(callee, content, ctx, edits);
            }
            // Recurse for arguments.
        }

        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_edits(child, content, ctx, options, edits);
    }
}

fn push_class_name_edit(
    name: tree_sitter::Node<'_>,
    content: &str,
    ctx: &NameContext,
    edits: &mut Vec<Edit>,
) {
    let text = node_text(name, content);
    let scope = ctx.scope_at(name.start_byte());
    let Some(fqn) = resolve_class_name(scope, text) else {
        return;
    };
    let replacement = format!("\\{fqn}");
    if text != replacement {
        edits.push(Edit {
            start: name.start_byte(),
            end: name.end_byte(),
            replacement,
        });
    }
}

fn push_function_name_edit(
    name: tree_sitter::Node<'_>,
    content: &str,
    ctx: &NameContext,
    edits: &mut Vec<Edit>,
) {
    let text = node_text(name, content);
    let scope = ctx.scope_at(name.start_byte());
    // Unqualified calls fall back to the global function at run time;
    // resolution returns None for them unless an alias pins them down.
    let Some(fqn) = resolve_function_name(scope, text) else {
        return;
    };
    let replacement = format!("\\{fqn}");
    if text != replacement {
        edits.push(Edit {
            start: name.start_byte(),
            end: name.end_byte(),
            replacement,
        });
    }
}

/// Delete a node plus any trailing spaces and one trailing newline.
fn delete_with_trailing_newline(node: tree_sitter::Node<'_>, content: &str) -> Edit {
    let bytes = content.as_bytes();
    let mut end = node.end_byte();
    while end < bytes.len() && (bytes[end] == b' ' || bytes[end] == b'\t') {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'\n' {
        end += 1;
    }
    Edit {
        start: node.start_byte(),
        end,
        replacement: String::new(),
    }
}

/// Apply edits to the full source text.
///
/// Edits are assumed sorted by start offset; overlapping edits keep the
/// first and drop the rest.
#[must_use]
pub fn apply_edits(content: &str, edits: &[Edit]) -> String {
    let mut out = String::with_capacity(content.len());
    let mut last = 0usize;
    for edit in edits {
        if edit.start < last {
            continue;
        }
        out.push_str(content.get(last..edit.start).unwrap_or(""));
        out.push_str(&edit.replacement);
        last = edit.end.min(content.len());
    }
    out.push_str(content.get(last..).unwrap_or(""));
    out
}

/// Apply the subset of edits that start inside `[start, end)` to that
/// slice. Edits whose deleted range runs past the slice (a statement's
/// trailing newline, say) are clamped to it.
#[must_use]
pub fn apply_edits_in_range(content: &str, start: usize, end: usize, edits: &[Edit]) -> String {
    let slice = content.get(start..end).unwrap_or("");
    let local: Vec<Edit> = edits
        .iter()
        .filter(|e| e.start >= start && e.start < end)
        .map(|e| Edit {
            start: e.start - start,
            end: e.end.min(end) - start,
            replacement: e.replacement.clone(),
        })
        .collect();
    apply_edits(slice, &local)
}

// ============================================================================
// Top-level statement view
// ============================================================================

/// Classification of one top-level statement for the merger.
#[derive(Debug, Clone)]
pub enum TopLevelKind {
    /// Class, interface, trait, or enum definition
    ClassLike {
        /// Definition kind
        kind: SymbolKind,
        /// Fully-qualified name
        fqn: String,
        /// Method names, for structural-equivalence comparison
        methods: Vec<String>,
    },
    /// Top-level function definition
    Function {
        /// Fully-qualified name
        fqn: String,
        /// Byte range of the body, for version-marker detection
        body: (usize, usize),
    },
    /// Top-level `const` declaration
    Const {
        /// Fully-qualified names declared
        names: Vec<String>,
    },
    /// `use` import (deleted by the rewrite pass)
    Import,
    /// `declare` directive (deleted by the rewrite pass)
    Directive,
    /// Any other executable statement
    Statement,
}

/// One top-level statement with its namespace attribution.
#[derive(Debug, Clone)]
pub struct TopLevelStmt {
    /// What the statement is
    pub kind: TopLevelKind,
    /// Enclosing namespace (`None` for global code)
    pub namespace: Option<String>,
    /// Byte range of the statement
    pub start: usize,
    /// Exclusive end of the statement
    pub end: usize,
}

/// Enumerate the top-level statements of a file, descending into namespace
/// bodies so every returned statement carries its namespace attribution.
#[must_use]
pub fn top_level_statements(
    tree: &tree_sitter::Tree,
    content: &str,
    ctx: &NameContext,
) -> Vec<TopLevelStmt> {
    let mut out = Vec::new();
    collect_top_level(tree.root_node(), content, ctx, None, &mut out);
    out
}

fn collect_top_level(
    node: tree_sitter::Node<'_>,
    content: &str,
    ctx: &NameContext,
    namespace: Option<&str>,
    out: &mut Vec<TopLevelStmt>,
) {
    let mut current_ns: Option<String> = namespace.map(String::from);

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            node_kinds::PHP_TAG | node_kinds::COMMENT => {}

            node_kinds::NAMESPACE_DEFINITION => {
                let name = child
                    .child_by_field_name("name")
                    .map(|n| super::names::normalize_name(node_text(n, content)));
                if let Some(body) =
                    first_child_of_kinds(child, &[node_kinds::COMPOUND_STATEMENT])
                {
                    collect_top_level(body, content, ctx, name.as_deref(), out);
                } else {
                    current_ns = name;
                }
            }

            node_kinds::NAMESPACE_USE_DECLARATION => out.push(TopLevelStmt {
                kind: TopLevelKind::Import,
                namespace: current_ns.clone(),
                start: child.start_byte(),
                end: child.end_byte(),
            }),

            node_kinds::DECLARE_STATEMENT => out.push(TopLevelStmt {
                kind: TopLevelKind::Directive,
                namespace: current_ns.clone(),
                start: child.start_byte(),
                end: child.end_byte(),
            }),

            node_kinds::CLASS_DECLARATION
            | node_kinds::INTERFACE_DECLARATION
            | node_kinds::TRAIT_DECLARATION
            | node_kinds::ENUM_DECLARATION => {
                if let Some(stmt) = classify_class_like(child, content, current_ns.as_deref()) {
                    out.push(stmt);
                }
            }

            node_kinds::FUNCTION_DEFINITION => {
                if let Some(stmt) = classify_function(child, content, current_ns.as_deref()) {
                    out.push(stmt);
                }
            }

            node_kinds::CONST_DECLARATION => {
                let names = children_of_kinds(child, &[node_kinds::CONST_ELEMENT])
                    .into_iter()
                    .filter_map(|el| {
                        first_child_of_kinds(el, &[node_kinds::NAME]).map(|n| {
                            super::names::join_namespace(
                                current_ns.as_deref(),
                                node_text(n, content),
                            )
                        })
                    })
                    .collect();
                out.push(TopLevelStmt {
                    kind: TopLevelKind::Const { names },
                    namespace: current_ns.clone(),
                    start: child.start_byte(),
                    end: child.end_byte(),
                });
            }

            // Closing `?>` and trailing HTML are not statements.
            "text_interpolation" | "text" => {}

            _ => out.push(TopLevelStmt {
                kind: TopLevelKind::Statement,
                namespace: current_ns.clone(),
                start: child.start_byte(),
                end: child.end_byte(),
            }),
        }
    }
}

fn classify_class_like(
    node: tree_sitter::Node<'_>,
    content: &str,
    namespace: Option<&str>,
) -> Option<TopLevelStmt> {
    let name = node.child_by_field_name("name")?;
    let kind = match node.kind() {
        node_kinds::INTERFACE_DECLARATION => SymbolKind::Interface,
        node_kinds::TRAIT_DECLARATION => SymbolKind::Trait,
        _ => SymbolKind::Class,
    };
    let fqn = super::names::join_namespace(namespace, node_text(name, content));

    let mut methods = Vec::new();
    if let Some(body) = first_child_of_kinds(node, &[node_kinds::DECLARATION_LIST]) {
        for method in children_of_kinds(body, &[node_kinds::METHOD_DECLARATION]) {
            if let Some(method_name) = method.child_by_field_name("name") {
                methods.push(node_text(method_name, content).to_string());
            }
        }
    }

    Some(TopLevelStmt {
        kind: TopLevelKind::ClassLike { kind, fqn, methods },
        namespace: namespace.map(String::from),
        start: node.start_byte(),
        end: node.end_byte(),
    })
}

fn classify_function(
    node: tree_sitter::Node<'_>,
    content: &str,
    namespace: Option<&str>,
) -> Option<TopLevelStmt> {
    let name = node.child_by_field_name("name")?;
    let fqn = super::names::join_namespace(namespace, node_text(name, content));
    let body = node
        .child_by_field_name("body")
        .map_or((node.end_byte(), node.end_byte()), |b| {
            (b.start_byte(), b.end_byte())
        });

    Some(TopLevelStmt {
        kind: TopLevelKind::Function { fqn, body },
        namespace: namespace.map(String::from),
        start: node.start_byte(),
        end: node.end_byte(),
    })
}
