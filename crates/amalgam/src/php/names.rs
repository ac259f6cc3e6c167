//! Namespace and import-alias tracking for name resolution.
//!
//! PHP resolves unqualified names against the enclosing namespace and the
//! `use` imports in scope. A file may contain several namespace scopes
//! (braced or statement form); each scope carries its own alias tables.
//! Resolution here is purely syntactic: it produces the fully-qualified name
//! a reference denotes, without checking that a definition exists.

use std::collections::HashMap;

use super::{node_kinds, node_text, start_line};

/// What flavour of symbol a `use` import brings into scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    /// `use Foo\Bar;`
    Class,
    /// `use function Foo\bar;`
    Function,
    /// `use const Foo\BAR;`
    Constant,
}

/// One name imported by a `use` statement (group imports expand to several).
#[derive(Debug, Clone)]
pub struct UseImport {
    /// Fully-qualified target, no leading backslash
    pub fqn: String,
    /// Explicit alias, if `as` was present
    pub alias: Option<String>,
    /// Class, function, or constant import
    pub kind: ImportKind,
    /// Line of the `use` statement (1-indexed)
    pub line: u32,
}

impl UseImport {
    /// The short name this import is referenced by.
    #[must_use]
    pub fn local_name(&self) -> &str {
        match &self.alias {
            Some(alias) => alias,
            None => self.fqn.rsplit('\\').next().unwrap_or(&self.fqn),
        }
    }
}

/// One namespace scope within a file, with its alias tables.
#[derive(Debug, Default)]
pub struct NamespaceScope {
    /// Enclosing namespace, `None` in global code
    pub namespace: Option<String>,
    /// Byte range this scope covers
    pub start: usize,
    /// Exclusive end of the covered range
    pub end: usize,
    /// Short name → fully-qualified class name
    pub class_aliases: HashMap<String, String>,
    /// Short name → fully-qualified function name
    pub function_aliases: HashMap<String, String>,
    /// Short name → fully-qualified constant name
    pub const_aliases: HashMap<String, String>,
}

/// All namespace scopes of a file, in source order.
#[derive(Debug)]
pub struct NameContext {
    scopes: Vec<NamespaceScope>,
}

impl NameContext {
    /// Build the context for a parsed file.
    ///
    /// Both namespace forms are handled: a braced `namespace X { … }` scope
    /// covers its body, a statement `namespace X;` covers everything up to
    /// the next namespace statement or the end of the file. Files without a
    /// namespace get a single global scope.
    #[must_use]
    pub fn build(tree: &tree_sitter::Tree, content: &str) -> Self {
        let root = tree.root_node();
        let mut scopes = vec![NamespaceScope {
            namespace: None,
            start: 0,
            end: content.len(),
            ..NamespaceScope::default()
        }];

        // Pass 1: namespace scopes from the top-level statement list.
        let mut cursor = root.walk();
        let mut open_statement_scope: Option<usize> = None;
        for child in root.children(&mut cursor) {
            if child.kind() != node_kinds::NAMESPACE_DEFINITION {
                continue;
            }

            let name = child
                .child_by_field_name("name")
                .map(|n| normalize_name(node_text(n, content)));

            let body = super::first_child_of_kinds(child, &[node_kinds::COMPOUND_STATEMENT]);
            if let Some(body) = body {
                scopes.push(NamespaceScope {
                    namespace: name,
                    start: body.start_byte(),
                    end: body.end_byte(),
                    ..NamespaceScope::default()
                });
            } else {
                if let Some(open) = open_statement_scope {
                    scopes[open].end = child.start_byte();
                }
                scopes.push(NamespaceScope {
                    namespace: name,
                    start: child.end_byte(),
                    end: content.len(),
                    ..NamespaceScope::default()
                });
                open_statement_scope = Some(scopes.len() - 1);
            }
        }

        let mut ctx = Self { scopes };

        // Pass 2: assign use imports to the scope containing them.
        collect_uses(root, content, &mut ctx);

        ctx
    }

    /// The innermost scope containing the given byte offset.
    #[must_use]
    pub fn scope_at(&self, byte: usize) -> &NamespaceScope {
        self.scopes
            .iter()
            .filter(|s| s.start <= byte && byte < s.end.max(s.start + 1))
            .min_by_key(|s| s.end - s.start)
            .unwrap_or(&self.scopes[0])
    }

    /// All scopes, global first.
    #[must_use]
    pub fn scopes(&self) -> &[NamespaceScope] {
        &self.scopes
    }

    fn scope_at_mut(&mut self, byte: usize) -> &mut NamespaceScope {
        let idx = self
            .scopes
            .iter()
            .enumerate()
            .filter(|(_, s)| s.start <= byte && byte < s.end.max(s.start + 1))
            .min_by_key(|(_, s)| s.end - s.start)
            .map_or(0, |(i, _)| i);
        &mut self.scopes[idx]
    }
}

fn collect_uses(node: tree_sitter::Node<'_>, content: &str, ctx: &mut NameContext) {
    if node.kind() == node_kinds::NAMESPACE_USE_DECLARATION {
        let imports = parse_use_declaration(node, content);
        let scope = ctx.scope_at_mut(node.start_byte());
        for import in imports {
            let table = match import.kind {
                ImportKind::Class => &mut scope.class_aliases,
                ImportKind::Function => &mut scope.function_aliases,
                ImportKind::Constant => &mut scope.const_aliases,
            };
            table.insert(import.local_name().to_string(), import.fqn.clone());
        }
        return;
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_uses(child, content, ctx);
    }
}

/// Expand a `use` declaration into the names it imports.
///
/// Handles single clauses, comma lists, aliases, `use function` /
/// `use const`, and group imports with a shared prefix.
#[must_use]
pub fn parse_use_declaration(node: tree_sitter::Node<'_>, content: &str) -> Vec<UseImport> {
    let line = start_line(node);

    // Leading `function` / `const` keyword applies to the whole declaration.
    let mut declared_kind = ImportKind::Class;
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "function" => declared_kind = ImportKind::Function,
            "const" => declared_kind = ImportKind::Constant,
            node_kinds::NAMESPACE_USE_CLAUSE
            | node_kinds::NAMESPACE_USE_GROUP
            | node_kinds::NAMESPACE_USE_GROUP_CLAUSE => break,
            _ => {}
        }
    }

    // A group import carries the shared prefix as a direct name child of the
    // declaration (before the braces).
    let mut prefix: Option<String> = None;
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            node_kinds::NAMESPACE_NAME | node_kinds::QUALIFIED_NAME => {
                prefix = Some(normalize_name(node_text(child, content)));
            }
            node_kinds::NAMESPACE_USE_CLAUSE
            | node_kinds::NAMESPACE_USE_GROUP
            | node_kinds::NAMESPACE_USE_GROUP_CLAUSE => break,
            _ => {}
        }
    }

    let mut imports = Vec::new();
    collect_use_clauses(node, content, declared_kind, prefix.as_deref(), line, &mut imports);
    imports
}

fn collect_use_clauses(
    node: tree_sitter::Node<'_>,
    content: &str,
    declared_kind: ImportKind,
    prefix: Option<&str>,
    line: u32,
    out: &mut Vec<UseImport>,
) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            node_kinds::NAMESPACE_USE_CLAUSE | node_kinds::NAMESPACE_USE_GROUP_CLAUSE => {
                if let Some(import) = parse_use_clause(child, content, declared_kind, prefix, line)
                {
                    out.push(import);
                }
            }
            node_kinds::NAMESPACE_USE_GROUP => {
                collect_use_clauses(child, content, declared_kind, prefix, line, out);
            }
            _ => {}
        }
    }
}

fn parse_use_clause(
    clause: tree_sitter::Node<'_>,
    content: &str,
    declared_kind: ImportKind,
    prefix: Option<&str>,
    line: u32,
) -> Option<UseImport> {
    // Per-item `function` / `const` inside group imports.
    let mut kind = declared_kind;
    let mut name: Option<String> = None;
    let mut alias: Option<String> = None;

    let mut cursor = clause.walk();
    for child in clause.children(&mut cursor) {
        match child.kind() {
            "function" => kind = ImportKind::Function,
            "const" => kind = ImportKind::Constant,
            node_kinds::NAME | node_kinds::QUALIFIED_NAME | node_kinds::NAMESPACE_NAME
                if name.is_none() =>
            {
                name = Some(normalize_name(node_text(child, content)));
            }
            node_kinds::NAMESPACE_ALIASING_CLAUSE => {
                alias = super::first_child_of_kinds(child, &[node_kinds::NAME])
                    .map(|n| node_text(n, content).to_string());
            }
            _ => {}
        }
    }

    let name = name?;
    let fqn = match prefix {
        Some(p) => format!("{p}\\{name}"),
        None => name,
    };

    Some(UseImport {
        fqn,
        alias,
        kind,
        line,
    })
}

/// Strip a leading backslash and surrounding whitespace from a name.
#[must_use]
pub fn normalize_name(raw: &str) -> String {
    raw.trim().trim_start_matches('\\').to_string()
}

/// Whether a name is one of the relative class keywords that must be
/// preserved untouched.
#[must_use]
pub fn is_special_name(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "self" | "static" | "parent"
    )
}

/// Join a namespace and a local name.
#[must_use]
pub fn join_namespace(namespace: Option<&str>, name: &str) -> String {
    match namespace {
        Some(ns) if !ns.is_empty() => format!("{ns}\\{name}"),
        _ => name.to_string(),
    }
}

/// Resolve a class-position name to its fully-qualified form.
///
/// Returns `None` for `self` / `static` / `parent`, which have no
/// file-independent meaning.
#[must_use]
pub fn resolve_class_name(scope: &NamespaceScope, text: &str) -> Option<String> {
    let t = text.trim();
    if t.is_empty() || is_special_name(t) {
        return None;
    }
    if let Some(absolute) = t.strip_prefix('\\') {
        return Some(absolute.to_string());
    }
    if let Some(rest) = t
        .strip_prefix("namespace\\")
        .or_else(|| t.strip_prefix("Namespace\\"))
    {
        return Some(join_namespace(scope.namespace.as_deref(), rest));
    }
    if let Some((first, rest)) = t.split_once('\\') {
        // Aliases apply to the first segment of a relative qualified name.
        if let Some(target) = scope.class_aliases.get(first) {
            return Some(format!("{target}\\{rest}"));
        }
        return Some(join_namespace(scope.namespace.as_deref(), t));
    }
    if let Some(target) = scope.class_aliases.get(t) {
        return Some(target.clone());
    }
    Some(join_namespace(scope.namespace.as_deref(), t))
}

/// Resolve a function-call name.
///
/// Unqualified names fall back to the global function at run time, so they
/// are only rewritten when an explicit `use function` alias pins them down.
#[must_use]
pub fn resolve_function_name(scope: &NamespaceScope, text: &str) -> Option<String> {
    let t = text.trim();
    if t.is_empty() {
        return None;
    }
    if let Some(absolute) = t.strip_prefix('\\') {
        return Some(absolute.to_string());
    }
    if let Some((first, rest)) = t.split_once('\\') {
        if let Some(target) = scope.class_aliases.get(first) {
            return Some(format!("{target}\\{rest}"));
        }
        return Some(join_namespace(scope.namespace.as_deref(), t));
    }
    scope.function_aliases.get(t).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::php::PhpParser;

    fn context(content: &str) -> (tree_sitter::Tree, String) {
        let mut parser = PhpParser::new().expect("parser init");
        let tree = parser.parse(content).expect("parse");
        (tree, content.to_string())
    }

    #[test]
    fn global_file_has_single_scope() {
        let (tree, content) = context("<?php $x = 1;");
        let ctx = NameContext::build(&tree, &content);
        assert_eq!(ctx.scopes().len(), 1);
        assert_eq!(ctx.scope_at(5).namespace, None);
    }

    #[test]
    fn statement_namespace_covers_rest_of_file() {
        let (tree, content) = context("<?php\nnamespace App\\Service;\nclass Logger {}\n");
        let ctx = NameContext::build(&tree, &content);
        let class_pos = content.find("class").expect("class keyword");
        assert_eq!(
            ctx.scope_at(class_pos).namespace.as_deref(),
            Some("App\\Service")
        );
    }

    #[test]
    fn use_aliases_land_in_their_scope() {
        let (tree, content) =
            context("<?php\nnamespace App;\nuse Vendor\\Lib\\Widget as W;\nnew W();\n");
        let ctx = NameContext::build(&tree, &content);
        let pos = content.find("new W").expect("new expression");
        let scope = ctx.scope_at(pos);
        assert_eq!(
            scope.class_aliases.get("W").map(String::as_str),
            Some("Vendor\\Lib\\Widget")
        );
    }

    #[test]
    fn resolves_plain_names_against_namespace() {
        let scope = NamespaceScope {
            namespace: Some("App".to_string()),
            ..NamespaceScope::default()
        };
        assert_eq!(resolve_class_name(&scope, "Child").as_deref(), Some("App\\Child"));
        assert_eq!(
            resolve_class_name(&scope, "Sub\\Thing").as_deref(),
            Some("App\\Sub\\Thing")
        );
    }

    #[test]
    fn resolves_absolute_and_special_names() {
        let scope = NamespaceScope {
            namespace: Some("App".to_string()),
            ..NamespaceScope::default()
        };
        assert_eq!(
            resolve_class_name(&scope, "\\Other\\Thing").as_deref(),
            Some("Other\\Thing")
        );
        assert_eq!(resolve_class_name(&scope, "self"), None);
        assert_eq!(resolve_class_name(&scope, "parent"), None);
        assert_eq!(resolve_class_name(&scope, "static"), None);
    }

    #[test]
    fn alias_takes_precedence_over_namespace() {
        let mut scope = NamespaceScope {
            namespace: Some("App".to_string()),
            ..NamespaceScope::default()
        };
        scope
            .class_aliases
            .insert("W".to_string(), "Vendor\\Widget".to_string());
        assert_eq!(resolve_class_name(&scope, "W").as_deref(), Some("Vendor\\Widget"));
        assert_eq!(
            resolve_class_name(&scope, "W\\Inner").as_deref(),
            Some("Vendor\\Widget\\Inner")
        );
    }

    #[test]
    fn parses_simple_use_imports() {
        let (tree, content) = context("<?php use App\\Child;\nuse Foo\\Bar as Baz;\n");
        let ctx = NameContext::build(&tree, &content);
        let scope = ctx.scope_at(content.len() - 1);
        assert_eq!(
            scope.class_aliases.get("Child").map(String::as_str),
            Some("App\\Child")
        );
        assert_eq!(
            scope.class_aliases.get("Baz").map(String::as_str),
            Some("Foo\\Bar")
        );
    }

    #[test]
    fn parses_function_imports_into_their_own_table() {
        let (tree, content) = context("<?php use function App\\helpers\\dump;\n$x = 1;\n");
        let ctx = NameContext::build(&tree, &content);
        let scope = ctx.scope_at(content.len() - 1);
        assert_eq!(
            scope.function_aliases.get("dump").map(String::as_str),
            Some("App\\helpers\\dump")
        );
        assert!(scope.class_aliases.is_empty());
    }

    #[test]
    fn parses_group_imports_with_shared_prefix() {
        let (tree, content) = context("<?php use App\\{Logger, Cache as C};\n$x = 1;\n");
        let ctx = NameContext::build(&tree, &content);
        let scope = ctx.scope_at(content.len() - 1);
        assert_eq!(
            scope.class_aliases.get("Logger").map(String::as_str),
            Some("App\\Logger")
        );
        assert_eq!(
            scope.class_aliases.get("C").map(String::as_str),
            Some("App\\Cache")
        );
    }
}
