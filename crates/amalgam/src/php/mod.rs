//! PHP parsing boundary.
//!
//! This module wraps tree-sitter with the PHP grammar and is the only place
//! that touches raw syntax trees. The rest of the crate consumes three
//! services built on top of it:
//!
//! - [`names`] - namespace / import-alias tracking and name resolution
//! - [`extract`] - the single extraction visitor producing symbols,
//!   dependencies, and the stored AST projection
//! - [`rewrite`] - text edits that delete imports and directives and expand
//!   short names to fully-qualified ones, plus the top-level statement view
//!   the merger works from
//!
//! Trees are walked read-only; rewriting is expressed as byte-range edits
//! applied to the original source text, which keeps unmodelled constructs
//! byte-identical in the output.

pub mod extract;
pub mod names;
pub mod rewrite;

use crate::error::{Error, Result};

/// Tree-sitter node kind constants for the PHP grammar.
///
/// These match the node types defined in tree-sitter-php. Using constants
/// prevents typos and makes supported node types explicit.
pub(crate) mod node_kinds {
    // Structure
    pub const PROGRAM: &str = "program";
    pub const PHP_TAG: &str = "php_tag";
    pub const COMMENT: &str = "comment";
    pub const COMPOUND_STATEMENT: &str = "compound_statement";
    pub const EXPRESSION_STATEMENT: &str = "expression_statement";
    pub const DECLARATION_LIST: &str = "declaration_list";

    // Namespaces & imports
    pub const NAMESPACE_DEFINITION: &str = "namespace_definition";
    pub const NAMESPACE_NAME: &str = "namespace_name";
    pub const NAMESPACE_USE_DECLARATION: &str = "namespace_use_declaration";
    pub const NAMESPACE_USE_CLAUSE: &str = "namespace_use_clause";
    pub const NAMESPACE_USE_GROUP: &str = "namespace_use_group";
    pub const NAMESPACE_USE_GROUP_CLAUSE: &str = "namespace_use_group_clause";
    pub const NAMESPACE_ALIASING_CLAUSE: &str = "namespace_aliasing_clause";

    // Definitions
    pub const CLASS_DECLARATION: &str = "class_declaration";
    pub const INTERFACE_DECLARATION: &str = "interface_declaration";
    pub const TRAIT_DECLARATION: &str = "trait_declaration";
    pub const ENUM_DECLARATION: &str = "enum_declaration";
    pub const FUNCTION_DEFINITION: &str = "function_definition";
    pub const CONST_DECLARATION: &str = "const_declaration";
    pub const CONST_ELEMENT: &str = "const_element";
    pub const METHOD_DECLARATION: &str = "method_declaration";
    pub const PROPERTY_DECLARATION: &str = "property_declaration";
    pub const PROPERTY_ELEMENT: &str = "property_element";
    pub const USE_DECLARATION: &str = "use_declaration";

    // Class header clauses
    pub const BASE_CLAUSE: &str = "base_clause";
    pub const CLASS_INTERFACE_CLAUSE: &str = "class_interface_clause";

    // Modifiers
    pub const VISIBILITY_MODIFIER: &str = "visibility_modifier";
    pub const STATIC_MODIFIER: &str = "static_modifier";
    pub const ABSTRACT_MODIFIER: &str = "abstract_modifier";
    pub const FINAL_MODIFIER: &str = "final_modifier";

    // Names
    pub const NAME: &str = "name";
    pub const QUALIFIED_NAME: &str = "qualified_name";
    pub const RELATIVE_SCOPE: &str = "relative_scope";
    pub const VARIABLE_NAME: &str = "variable_name";

    // Expressions the extractor cares about
    pub const OBJECT_CREATION_EXPRESSION: &str = "object_creation_expression";
    pub const ANONYMOUS_CLASS: &str = "anonymous_class";
    pub const SCOPED_CALL_EXPRESSION: &str = "scoped_call_expression";
    pub const CLASS_CONSTANT_ACCESS_EXPRESSION: &str = "class_constant_access_expression";
    pub const SCOPED_PROPERTY_ACCESS_EXPRESSION: &str = "scoped_property_access_expression";
    pub const FUNCTION_CALL_EXPRESSION: &str = "function_call_expression";
    pub const REQUIRE_EXPRESSION: &str = "require_expression";
    pub const REQUIRE_ONCE_EXPRESSION: &str = "require_once_expression";
    pub const INCLUDE_EXPRESSION: &str = "include_expression";
    pub const INCLUDE_ONCE_EXPRESSION: &str = "include_once_expression";
    pub const BINARY_EXPRESSION: &str = "binary_expression";
    pub const PARENTHESIZED_EXPRESSION: &str = "parenthesized_expression";

    // Literals
    pub const STRING: &str = "string";
    pub const ENCAPSED_STRING: &str = "encapsed_string";
    pub const STRING_CONTENT: &str = "string_content";
    pub const ESCAPE_SEQUENCE: &str = "escape_sequence";

    // Control flow that makes descendant dependencies conditional
    pub const IF_STATEMENT: &str = "if_statement";
    pub const TRY_STATEMENT: &str = "try_statement";

    // Directives
    pub const DECLARE_STATEMENT: &str = "declare_statement";

    // Type positions
    pub const NAMED_TYPE: &str = "named_type";
    pub const TYPE_LIST: &str = "type_list";
}

/// The directory magic constant used in include paths.
pub(crate) const DIR_MAGIC: &str = "__DIR__";

/// Stateful wrapper around a tree-sitter parser configured for PHP.
///
/// Tree-sitter parsers keep internal state for incremental parsing, so one
/// instance is created per packer and reused for every file.
pub struct PhpParser {
    parser: tree_sitter::Parser,
}

impl std::fmt::Debug for PhpParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhpParser").finish_non_exhaustive()
    }
}

impl PhpParser {
    /// Create a parser for the full PHP grammar (with `<?php` tags).
    pub fn new() -> Result<Self> {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&tree_sitter_php::LANGUAGE_PHP.into())
            .map_err(|e| Error::Parser(e.to_string()))?;
        Ok(Self { parser })
    }

    /// Parse source text into a syntax tree.
    ///
    /// A tree is returned even for files with syntax errors; callers decide
    /// whether `root_node().has_error()` is fatal for them.
    pub fn parse(&mut self, content: &str) -> Result<tree_sitter::Tree> {
        self.parser
            .parse(content, None)
            .ok_or_else(|| Error::Parser("tree-sitter returned no tree".to_string()))
    }
}

/// Get the text of a tree-sitter node out of the source it was parsed from.
pub(crate) fn node_text<'a>(node: tree_sitter::Node<'_>, content: &'a str) -> &'a str {
    content.get(node.byte_range()).unwrap_or("")
}

/// Starting line of a node, 1-indexed.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn start_line(node: tree_sitter::Node<'_>) -> u32 {
    node.start_position().row as u32 + 1
}

/// Ending line of a node, 1-indexed.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn end_line(node: tree_sitter::Node<'_>) -> u32 {
    node.end_position().row as u32 + 1
}

/// First child (named or anonymous) whose kind is in `kinds`.
pub(crate) fn first_child_of_kinds<'t>(
    node: tree_sitter::Node<'t>,
    kinds: &[&str],
) -> Option<tree_sitter::Node<'t>> {
    let mut cursor = node.walk();
    node.children(&mut cursor)
        .find(|child| kinds.contains(&child.kind()))
}

/// All children (named or anonymous) whose kind is in `kinds`.
pub(crate) fn children_of_kinds<'t>(
    node: tree_sitter::Node<'t>,
    kinds: &[&str],
) -> Vec<tree_sitter::Node<'t>> {
    let mut cursor = node.walk();
    node.children(&mut cursor)
        .filter(|child| kinds.contains(&child.kind()))
        .collect()
}

/// Whether the node has a direct child of the given kind.
pub(crate) fn has_child_of_kind(node: tree_sitter::Node<'_>, kind: &str) -> bool {
    first_child_of_kinds(node, &[kind]).is_some()
}

/// Extract the value of a string literal node (single or double quoted).
///
/// Interpolated strings and heredocs with embedded expressions return `None`
/// because their value is not statically known.
pub(crate) fn string_literal_value(node: tree_sitter::Node<'_>, content: &str) -> Option<String> {
    match node.kind() {
        node_kinds::STRING | node_kinds::ENCAPSED_STRING => {}
        _ => return None,
    }

    let mut value = String::new();
    let mut cursor = node.walk();
    let mut saw_content = false;
    for child in node.children(&mut cursor) {
        match child.kind() {
            node_kinds::STRING_CONTENT => {
                saw_content = true;
                value.push_str(node_text(child, content));
            }
            node_kinds::ESCAPE_SEQUENCE => {
                saw_content = true;
                let esc = node_text(child, content);
                match esc {
                    "\\n" => value.push('\n'),
                    "\\t" => value.push('\t'),
                    "\\\\" => value.push('\\'),
                    "\\'" => value.push('\''),
                    "\\\"" => value.push('"'),
                    other => value.push_str(other),
                }
            }
            // Quote tokens
            "'" | "\"" => {}
            // Anything else (interpolation) makes the value dynamic.
            _ => return None,
        }
    }

    if saw_content {
        return Some(value);
    }

    // Empty string literal, or a grammar without separate content nodes:
    // fall back to trimming the quotes from the raw text.
    let raw = node_text(node, content);
    if raw.len() >= 2 {
        Some(raw[1..raw.len() - 1].to_string())
    } else {
        Some(String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> tree_sitter::Tree {
        let mut parser = PhpParser::new().expect("parser init");
        parser.parse(content).expect("parse")
    }

    #[test]
    fn parses_a_minimal_file() {
        let tree = parse("<?php $x = 1;");
        assert_eq!(tree.root_node().kind(), node_kinds::PROGRAM);
        assert!(!tree.root_node().has_error());
    }

    #[test]
    fn flags_syntax_errors_on_the_root() {
        let tree = parse("<?php class {{{");
        assert!(tree.root_node().has_error());
    }

    #[test]
    fn string_literal_value_strips_quotes() {
        let content = "<?php require 'lib/a.php';";
        let tree = parse(content);
        let mut found = None;
        visit(tree.root_node(), &mut |node| {
            if node.kind() == node_kinds::STRING || node.kind() == node_kinds::ENCAPSED_STRING {
                found = string_literal_value(node, content);
            }
        });
        assert_eq!(found.as_deref(), Some("lib/a.php"));
    }

    fn visit(node: tree_sitter::Node<'_>, f: &mut impl FnMut(tree_sitter::Node<'_>)) {
        f(node);
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            visit(child, f);
        }
    }
}
