//! Symbol and dependency extraction from parsed PHP files.
//!
//! One recursive visitor walks the syntax tree and, for each node it
//! recognizes, records exactly one of: a namespace change, an import, a
//! definition (symbol plus its structural dependencies), a class reference,
//! or an include. Branching statements set a conditional flag that sticks
//! for every descendant dependency.
//!
//! The visitor also produces a filtered projection of the tree (namespaces,
//! imports, definitions, members, includes) for the `ast_nodes` table; full
//! expression detail stays in the re-parsed tree the merger works from.

use super::names::{ImportKind, NameContext, join_namespace, parse_use_declaration};
use super::{
    DIR_MAGIC, children_of_kinds, end_line, first_child_of_kinds, has_child_of_kind, node_kinds,
    node_text, start_line, string_literal_value,
};
use crate::types::{DependencyKind, FileType, SymbolKind, Visibility};

/// A definition found in a file, before storage.
#[derive(Debug, Clone)]
pub struct ExtractedSymbol {
    /// Definition kind
    pub kind: SymbolKind,
    /// Name without namespace
    pub local_name: String,
    /// Namespace-qualified name, no leading backslash
    pub fqn: String,
    /// Enclosing namespace
    pub namespace: Option<String>,
    /// Declaration flavour
    pub visibility: Visibility,
    /// `abstract class`
    pub is_abstract: bool,
    /// `final class`
    pub is_final: bool,
    /// Declaration line (1-indexed)
    pub line: u32,
}

/// A dependency found in a file, before storage.
#[derive(Debug, Clone)]
pub struct ExtractedDependency {
    /// Edge flavour
    pub kind: DependencyKind,
    /// Fully-qualified target for class-family edges
    pub target_symbol: Option<String>,
    /// Path expression for include-family edges (`dynamic` / `complex`
    /// when it cannot be statically derived)
    pub context: Option<String>,
    /// Line of the reference (1-indexed)
    pub line: u32,
    /// Inside a branch, try/catch arm, or anonymous-class body
    pub is_conditional: bool,
}

/// One node of the stored AST projection.
#[derive(Debug, Clone)]
pub struct AstProjection {
    /// Parser node kind
    pub node_type: String,
    /// Declared name, if any
    pub node_name: Option<String>,
    /// Fully-qualified name, when resolution applies
    pub fqcn: Option<String>,
    /// Byte offset of the node start
    pub position: u32,
    /// Starting line (1-indexed)
    pub start_line: u32,
    /// Ending line (1-indexed)
    pub end_line: u32,
    /// Index of the parent projection node; `None` for the root
    pub parent: Option<usize>,
    /// JSON bag of auxiliary flags
    pub attributes: Option<String>,
}

/// Everything extracted from one file.
#[derive(Debug, Default)]
pub struct FileAnalysis {
    /// Namespace of the first definition scope, if any
    pub namespace: Option<String>,
    /// Classification by first definition
    pub file_type: FileType,
    /// Local name of the first class-like definition
    pub class_name: Option<String>,
    /// Definitions in source order
    pub symbols: Vec<ExtractedSymbol>,
    /// References in source order
    pub dependencies: Vec<ExtractedDependency>,
    /// Stored AST projection, root first
    pub nodes: Vec<AstProjection>,
}

/// Run the extraction visitor over a parsed file.
#[must_use]
pub fn analyze_tree(tree: &tree_sitter::Tree, content: &str) -> FileAnalysis {
    let ctx = NameContext::build(tree, content);
    let mut extractor = Extractor {
        content,
        ctx: &ctx,
        out: FileAnalysis::default(),
        conditional_depth: 0,
        inside_definition: false,
    };

    let root = tree.root_node();
    let root_index = extractor.record_node(root, None, None, None, None);
    let mut cursor = root.walk();
    for child in root.children(&mut cursor) {
        extractor.visit(child, root_index);
    }

    let mut analysis = extractor.out;

    // File-level classification from the first definition.
    analysis.file_type = analysis
        .symbols
        .iter()
        .find_map(|s| match s.kind {
            SymbolKind::Class => Some(FileType::Class),
            SymbolKind::Interface => Some(FileType::Interface),
            SymbolKind::Trait => Some(FileType::Trait),
            SymbolKind::Function | SymbolKind::Constant => None,
        })
        .unwrap_or(FileType::Script);
    analysis.class_name = analysis
        .symbols
        .iter()
        .find(|s| s.kind.is_class_like())
        .map(|s| s.local_name.clone());
    analysis.namespace = analysis
        .symbols
        .first()
        .and_then(|s| s.namespace.clone())
        .or_else(|| {
            ctx.scopes()
                .iter()
                .find_map(|scope| scope.namespace.clone())
        });

    analysis
}

struct Extractor<'a> {
    content: &'a str,
    ctx: &'a NameContext,
    out: FileAnalysis,
    conditional_depth: u32,
    inside_definition: bool,
}

impl Extractor<'_> {
    fn is_conditional(&self) -> bool {
        self.conditional_depth > 0
    }

    #[allow(clippy::cast_possible_truncation)]
    fn record_node(
        &mut self,
        node: tree_sitter::Node<'_>,
        name: Option<String>,
        fqcn: Option<String>,
        attributes: Option<String>,
        parent: Option<usize>,
    ) -> usize {
        self.out.nodes.push(AstProjection {
            node_type: node.kind().to_string(),
            node_name: name,
            fqcn,
            position: node.start_byte() as u32,
            start_line: start_line(node),
            end_line: end_line(node),
            parent,
            attributes,
        });
        self.out.nodes.len() - 1
    }

    fn push_class_dep(&mut self, kind: DependencyKind, fqn: String, line: u32) {
        self.out.dependencies.push(ExtractedDependency {
            kind,
            target_symbol: Some(fqn),
            context: None,
            line,
            is_conditional: self.is_conditional(),
        });
    }

    fn resolve_at(&self, node: tree_sitter::Node<'_>, text: &str) -> Option<String> {
        let scope = self.ctx.scope_at(node.start_byte());
        super::names::resolve_class_name(scope, text)
    }

    fn visit(&mut self, node: tree_sitter::Node<'_>, parent: usize) {
        match node.kind() {
            node_kinds::PHP_TAG | node_kinds::COMMENT => {}

            node_kinds::NAMESPACE_DEFINITION => {
                let name = node
                    .child_by_field_name("name")
                    .map(|n| super::names::normalize_name(node_text(n, self.content)));
                let index = self.record_node(node, name, None, None, Some(parent));
                if let Some(body) =
                    first_child_of_kinds(node, &[node_kinds::COMPOUND_STATEMENT])
                {
                    let mut cursor = body.walk();
                    for child in body.children(&mut cursor) {
                        self.visit(child, index);
                    }
                }
            }

            node_kinds::NAMESPACE_USE_DECLARATION => {
                self.record_node(node, None, None, None, Some(parent));
                for import in parse_use_declaration(node, self.content) {
                    let kind = match import.kind {
                        ImportKind::Function => DependencyKind::UseFunction,
                        // Constant imports resolve through the symbol table
                        // like class imports do.
                        ImportKind::Class | ImportKind::Constant => DependencyKind::UseClass,
                    };
                    self.push_class_dep(kind, import.fqn, import.line);
                }
            }

            node_kinds::CLASS_DECLARATION | node_kinds::ENUM_DECLARATION => {
                self.visit_class_like(node, SymbolKind::Class, parent);
            }
            node_kinds::INTERFACE_DECLARATION => {
                self.visit_class_like(node, SymbolKind::Interface, parent);
            }
            node_kinds::TRAIT_DECLARATION => {
                self.visit_class_like(node, SymbolKind::Trait, parent);
            }

            node_kinds::FUNCTION_DEFINITION => {
                self.visit_function(node, parent);
            }

            node_kinds::CONST_DECLARATION => {
                self.visit_const(node, parent);
            }

            node_kinds::IF_STATEMENT | node_kinds::TRY_STATEMENT => {
                self.conditional_depth += 1;
                self.visit_children(node, parent);
                self.conditional_depth -= 1;
            }

            node_kinds::OBJECT_CREATION_EXPRESSION => {
                self.visit_new_expression(node, parent);
            }

            node_kinds::SCOPED_CALL_EXPRESSION
            | node_kinds::CLASS_CONSTANT_ACCESS_EXPRESSION
            | node_kinds::SCOPED_PROPERTY_ACCESS_EXPRESSION => {
                self.visit_static_reference(node);
                self.visit_children(node, parent);
            }

            node_kinds::REQUIRE_EXPRESSION
            | node_kinds::REQUIRE_ONCE_EXPRESSION
            | node_kinds::INCLUDE_EXPRESSION
            | node_kinds::INCLUDE_ONCE_EXPRESSION => {
                self.visit_include(node, parent);
            }

            _ => self.visit_children(node, parent),
        }
    }

    fn visit_children(&mut self, node: tree_sitter::Node<'_>, parent: usize) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.visit(child, parent);
        }
    }

    fn visit_class_like(&mut self, node: tree_sitter::Node<'_>, kind: SymbolKind, parent: usize) {
        let Some(name_node) = node.child_by_field_name("name") else {
            // Malformed declaration; nothing to record.
            return;
        };
        let local_name = node_text(name_node, self.content).to_string();
        let scope = self.ctx.scope_at(node.start_byte());
        let namespace = scope.namespace.clone();
        let fqn = join_namespace(namespace.as_deref(), &local_name);

        let is_abstract = has_child_of_kind(node, node_kinds::ABSTRACT_MODIFIER);
        let is_final = has_child_of_kind(node, node_kinds::FINAL_MODIFIER);
        let visibility = if is_abstract {
            Visibility::Abstract
        } else if is_final {
            Visibility::Final
        } else {
            Visibility::Public
        };

        if !self.inside_definition {
            self.out.symbols.push(ExtractedSymbol {
                kind,
                local_name: local_name.clone(),
                fqn: fqn.clone(),
                namespace,
                visibility,
                is_abstract,
                is_final,
                line: start_line(node),
            });
        }

        let attributes = (is_abstract || is_final).then(|| {
            serde_json::json!({
                "abstract": is_abstract,
                "final": is_final,
            })
            .to_string()
        });
        let index = self.record_node(
            node,
            Some(local_name),
            Some(fqn),
            attributes,
            Some(parent),
        );

        self.visit_class_header(node);
        if let Some(body) = first_child_of_kinds(node, &[node_kinds::DECLARATION_LIST]) {
            self.visit_class_body(body, index);
        }
    }

    /// Record `extends` and `implements` edges from a class-like header.
    fn visit_class_header(&mut self, node: tree_sitter::Node<'_>) {
        if let Some(base) = first_child_of_kinds(node, &[node_kinds::BASE_CLAUSE]) {
            for name in children_of_kinds(base, &[node_kinds::NAME, node_kinds::QUALIFIED_NAME]) {
                if let Some(fqn) = self.resolve_at(name, node_text(name, self.content)) {
                    self.push_class_dep(DependencyKind::Extends, fqn, start_line(name));
                }
            }
        }
        if let Some(ifaces) = first_child_of_kinds(node, &[node_kinds::CLASS_INTERFACE_CLAUSE]) {
            for name in children_of_kinds(ifaces, &[node_kinds::NAME, node_kinds::QUALIFIED_NAME])
            {
                if let Some(fqn) = self.resolve_at(name, node_text(name, self.content)) {
                    self.push_class_dep(DependencyKind::Implements, fqn, start_line(name));
                }
            }
        }
    }

    fn visit_class_body(&mut self, body: tree_sitter::Node<'_>, class_index: usize) {
        let was_inside = self.inside_definition;
        self.inside_definition = true;

        let mut cursor = body.walk();
        for member in body.children(&mut cursor) {
            match member.kind() {
                node_kinds::USE_DECLARATION => {
                    self.record_node(member, None, None, None, Some(class_index));
                    for name in children_of_kinds(
                        member,
                        &[node_kinds::NAME, node_kinds::QUALIFIED_NAME],
                    ) {
                        if let Some(fqn) = self.resolve_at(name, node_text(name, self.content)) {
                            self.push_class_dep(DependencyKind::UseTrait, fqn, start_line(name));
                        }
                    }
                }
                node_kinds::METHOD_DECLARATION => {
                    let name = member
                        .child_by_field_name("name")
                        .map(|n| node_text(n, self.content).to_string());
                    let attributes = member_attributes(member, self.content);
                    let index =
                        self.record_node(member, name, None, attributes, Some(class_index));
                    self.visit_children(member, index);
                }
                node_kinds::PROPERTY_DECLARATION => {
                    let name = first_child_of_kinds(member, &[node_kinds::PROPERTY_ELEMENT])
                        .and_then(|el| {
                            first_child_of_kinds(el, &[node_kinds::VARIABLE_NAME])
                                .map(|v| node_text(v, self.content).to_string())
                        });
                    let attributes = member_attributes(member, self.content);
                    self.record_node(member, name, None, attributes, Some(class_index));
                    self.visit_children(member, class_index);
                }
                node_kinds::CONST_DECLARATION => {
                    let name = first_child_of_kinds(member, &[node_kinds::CONST_ELEMENT])
                        .and_then(|el| {
                            first_child_of_kinds(el, &[node_kinds::NAME])
                                .map(|n| node_text(n, self.content).to_string())
                        });
                    self.record_node(member, name, None, None, Some(class_index));
                    self.visit_children(member, class_index);
                }
                _ => self.visit(member, class_index),
            }
        }

        self.inside_definition = was_inside;
    }

    fn visit_function(&mut self, node: tree_sitter::Node<'_>, parent: usize) {
        let name = node
            .child_by_field_name("name")
            .map(|n| node_text(n, self.content).to_string());

        if let Some(local_name) = &name {
            if !self.inside_definition {
                let scope = self.ctx.scope_at(node.start_byte());
                let namespace = scope.namespace.clone();
                self.out.symbols.push(ExtractedSymbol {
                    kind: SymbolKind::Function,
                    local_name: local_name.clone(),
                    fqn: join_namespace(namespace.as_deref(), local_name),
                    namespace,
                    visibility: Visibility::Public,
                    is_abstract: false,
                    is_final: false,
                    line: start_line(node),
                });
            }
        }

        let index = self.record_node(node, name, None, None, Some(parent));

        let was_inside = self.inside_definition;
        self.inside_definition = true;
        if let Some(body) = node.child_by_field_name("body") {
            self.visit_children(body, index);
        }
        self.inside_definition = was_inside;
    }

    fn visit_const(&mut self, node: tree_sitter::Node<'_>, parent: usize) {
        let scope = self.ctx.scope_at(node.start_byte());
        let namespace = scope.namespace.clone();

        for element in children_of_kinds(node, &[node_kinds::CONST_ELEMENT]) {
            let Some(name_node) = first_child_of_kinds(element, &[node_kinds::NAME]) else {
                continue;
            };
            let local_name = node_text(name_node, self.content).to_string();
            if !self.inside_definition {
                self.out.symbols.push(ExtractedSymbol {
                    kind: SymbolKind::Constant,
                    fqn: join_namespace(namespace.as_deref(), &local_name),
                    local_name,
                    namespace: namespace.clone(),
                    visibility: Visibility::Public,
                    is_abstract: false,
                    is_final: false,
                    line: start_line(element),
                });
            }
        }

        self.record_node(node, None, None, None, Some(parent));
        self.visit_children(node, parent);
    }

    fn visit_new_expression(&mut self, node: tree_sitter::Node<'_>, parent: usize) {
        // Grammar versions differ on whether the anonymous class body hangs
        // directly off the creation expression or under its own node.
        let anonymous = if has_child_of_kind(node, node_kinds::DECLARATION_LIST) {
            Some(node)
        } else {
            first_child_of_kinds(node, &[node_kinds::ANONYMOUS_CLASS])
        };
        if let Some(class_node) = anonymous {
            // Anonymous class: structural edges, no symbol; everything it
            // pulls in is conditional on the construction site running.
            self.conditional_depth += 1;
            self.visit_class_header(class_node);
            let index = self.record_node(node, None, None, None, Some(parent));
            if let Some(body) =
                first_child_of_kinds(class_node, &[node_kinds::DECLARATION_LIST])
            {
                self.visit_class_body(body, index);
            }
            self.conditional_depth -= 1;
            return;
        }

        if let Some(name) =
            first_child_of_kinds(node, &[node_kinds::NAME, node_kinds::QUALIFIED_NAME])
        {
            if let Some(fqn) = self.resolve_at(name, node_text(name, self.content)) {
                self.push_class_dep(DependencyKind::UseClass, fqn, start_line(name));
            }
        }

        // Constructor arguments may contain further references.
        self.visit_children(node, parent);
    }

    /// `Foo::bar()`, `Foo::BAR`, `Foo::$x`: a reference to the scope class
    /// unless it is `self` / `static` / `parent`.
    fn visit_static_reference(&mut self, node: tree_sitter::Node<'_>) {
        let scope_node = node
            .child_by_field_name("scope")
            .or_else(|| node.child(0))
            .filter(|n| {
                matches!(
                    n.kind(),
                    node_kinds::NAME | node_kinds::QUALIFIED_NAME
                )
            });
        let Some(scope_node) = scope_node else {
            return;
        };
        if let Some(fqn) = self.resolve_at(scope_node, node_text(scope_node, self.content)) {
            self.push_class_dep(DependencyKind::UseClass, fqn, start_line(scope_node));
        }
    }

    fn visit_include(&mut self, node: tree_sitter::Node<'_>, parent: usize) {
        let kind = match node.kind() {
            node_kinds::REQUIRE_EXPRESSION => DependencyKind::Require,
            node_kinds::REQUIRE_ONCE_EXPRESSION => DependencyKind::RequireOnce,
            node_kinds::INCLUDE_EXPRESSION => DependencyKind::Include,
            _ => DependencyKind::IncludeOnce,
        };

        let context = node
            .named_child(0)
            .map_or_else(|| "complex".to_string(), |arg| self.include_context(arg));

        self.record_node(node, Some(context.clone()), None, None, Some(parent));
        self.out.dependencies.push(ExtractedDependency {
            kind,
            target_symbol: None,
            context: Some(context),
            line: start_line(node),
            is_conditional: self.is_conditional(),
        });
    }

    /// Classify an include argument into a literal path, a `__DIR__` +
    /// literal concatenation, or `dynamic` / `complex`.
    fn include_context(&self, arg: tree_sitter::Node<'_>) -> String {
        let arg = unwrap_parens(arg);

        if let Some(value) = string_literal_value(arg, self.content) {
            return value;
        }

        if node_text(arg, self.content) == DIR_MAGIC {
            return DIR_MAGIC.to_string();
        }
        match arg.kind() {
            node_kinds::VARIABLE_NAME => return "dynamic".to_string(),
            node_kinds::BINARY_EXPRESSION => {}
            _ => return "complex".to_string(),
        }

        // Flatten the concatenation chain left-to-right.
        let mut operands = Vec::new();
        if !flatten_concat(arg, self.content, &mut operands) {
            return "complex".to_string();
        }

        let mut result = String::new();
        for (i, operand) in operands.iter().enumerate() {
            let operand = unwrap_parens(*operand);
            if i == 0 && node_text(operand, self.content) == DIR_MAGIC {
                result.push_str(DIR_MAGIC);
                continue;
            }
            match string_literal_value(operand, self.content) {
                Some(value) => result.push_str(&value),
                None => {
                    return if operand.kind() == node_kinds::VARIABLE_NAME {
                        "dynamic".to_string()
                    } else {
                        "complex".to_string()
                    };
                }
            }
        }
        result
    }
}

/// Peel `(` … `)` wrappers off an expression.
fn unwrap_parens(node: tree_sitter::Node<'_>) -> tree_sitter::Node<'_> {
    let mut current = node;
    while current.kind() == node_kinds::PARENTHESIZED_EXPRESSION {
        match current.named_child(0) {
            Some(inner) => current = inner,
            None => break,
        }
    }
    current
}

/// Collect the leaves of a `.` concatenation chain in source order.
///
/// Returns `false` if a non-concatenation binary operator shows up.
fn flatten_concat<'t>(
    node: tree_sitter::Node<'t>,
    content: &str,
    out: &mut Vec<tree_sitter::Node<'t>>,
) -> bool {
    if node.kind() != node_kinds::BINARY_EXPRESSION {
        out.push(node);
        return true;
    }

    let operator = node
        .child_by_field_name("operator")
        .map(|op| node_text(op, content).to_string());
    if operator.as_deref() != Some(".") {
        return false;
    }

    let (Some(left), Some(right)) = (
        node.child_by_field_name("left"),
        node.child_by_field_name("right"),
    ) else {
        return false;
    };

    flatten_concat(left, content, out) && flatten_concat(right, content, out)
}

fn member_attributes(member: tree_sitter::Node<'_>, content: &str) -> Option<String> {
    let visibility = first_child_of_kinds(member, &[node_kinds::VISIBILITY_MODIFIER])
        .map(|n| node_text(n, content).to_string());
    let is_static = has_child_of_kind(member, node_kinds::STATIC_MODIFIER);
    if visibility.is_none() && !is_static {
        return None;
    }
    Some(
        serde_json::json!({
            "visibility": visibility.unwrap_or_else(|| "public".to_string()),
            "static": is_static,
        })
        .to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::php::PhpParser;

    fn analyze(content: &str) -> FileAnalysis {
        let mut parser = PhpParser::new().expect("parser init");
        let tree = parser.parse(content).expect("parse");
        analyze_tree(&tree, content)
    }

    #[test]
    fn extracts_namespaced_class_with_base() {
        let analysis = analyze("<?php\nnamespace App;\nclass Child extends Base {}\n");

        assert_eq!(analysis.symbols.len(), 1);
        let symbol = &analysis.symbols[0];
        assert_eq!(symbol.kind, SymbolKind::Class);
        assert_eq!(symbol.fqn, "App\\Child");
        assert_eq!(symbol.namespace.as_deref(), Some("App"));

        let extends: Vec<_> = analysis
            .dependencies
            .iter()
            .filter(|d| d.kind == DependencyKind::Extends)
            .collect();
        assert_eq!(extends.len(), 1);
        assert_eq!(extends[0].target_symbol.as_deref(), Some("App\\Base"));

        assert_eq!(analysis.file_type, FileType::Class);
        assert_eq!(analysis.class_name.as_deref(), Some("Child"));
    }

    #[test]
    fn extracts_interface_and_trait_definitions() {
        let analysis = analyze(
            "<?php\nnamespace App;\ninterface Jsonable extends Arrayable {}\ntrait Dumps {}\n",
        );

        let kinds: Vec<_> = analysis.symbols.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![SymbolKind::Interface, SymbolKind::Trait]);
        assert!(
            analysis
                .dependencies
                .iter()
                .any(|d| d.kind == DependencyKind::Extends
                    && d.target_symbol.as_deref() == Some("App\\Arrayable"))
        );
    }

    #[test]
    fn use_imports_become_use_class_dependencies() {
        let analysis = analyze("<?php\nuse App\\Child;\nuse function App\\helpers\\dump;\n");

        let classes: Vec<_> = analysis
            .dependencies
            .iter()
            .filter(|d| d.kind == DependencyKind::UseClass)
            .collect();
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].target_symbol.as_deref(), Some("App\\Child"));

        assert!(
            analysis
                .dependencies
                .iter()
                .any(|d| d.kind == DependencyKind::UseFunction
                    && d.target_symbol.as_deref() == Some("App\\helpers\\dump"))
        );
    }

    #[test]
    fn trait_use_inside_class_is_recorded() {
        let analysis = analyze("<?php\nnamespace App;\nclass A {\n    use Loggable;\n}\n");

        assert!(
            analysis
                .dependencies
                .iter()
                .any(|d| d.kind == DependencyKind::UseTrait
                    && d.target_symbol.as_deref() == Some("App\\Loggable"))
        );
    }

    #[test]
    fn new_and_static_access_record_references() {
        let analysis = analyze(
            "<?php\nuse App\\Widget;\nnew Widget();\nWidget::make();\n$x = Widget::LIMIT;\n",
        );

        let refs: Vec<_> = analysis
            .dependencies
            .iter()
            .filter(|d| {
                d.kind == DependencyKind::UseClass
                    && d.target_symbol.as_deref() == Some("App\\Widget")
            })
            .collect();
        // Import + new + static call + constant access.
        assert!(refs.len() >= 4, "expected 4 references, got {}", refs.len());
    }

    #[test]
    fn self_and_parent_are_not_references() {
        let analysis = analyze(
            "<?php\nclass A extends B {\n    public function f() { return parent::f() + self::G; }\n}\n",
        );

        assert!(
            !analysis
                .dependencies
                .iter()
                .any(|d| matches!(d.target_symbol.as_deref(), Some("parent" | "self")))
        );
    }

    #[test]
    fn include_with_literal_records_context() {
        let analysis = analyze("<?php\nrequire 'lib/a.php';\n");

        assert_eq!(analysis.dependencies.len(), 1);
        let dep = &analysis.dependencies[0];
        assert_eq!(dep.kind, DependencyKind::Require);
        assert_eq!(dep.context.as_deref(), Some("lib/a.php"));
        assert!(!dep.is_conditional);
    }

    #[test]
    fn include_with_dir_concat_records_marker() {
        let analysis = analyze("<?php\nrequire_once __DIR__ . '/lib/a.php';\n");

        let dep = &analysis.dependencies[0];
        assert_eq!(dep.kind, DependencyKind::RequireOnce);
        assert_eq!(dep.context.as_deref(), Some("__DIR__/lib/a.php"));
    }

    #[test]
    fn dynamic_include_is_marked_dynamic() {
        let analysis = analyze("<?php\n$f = $_GET['f'];\nrequire $f;\n");

        let dep = analysis
            .dependencies
            .iter()
            .find(|d| d.kind == DependencyKind::Require)
            .expect("require dependency");
        assert_eq!(dep.context.as_deref(), Some("dynamic"));
    }

    #[test]
    fn includes_inside_if_are_conditional() {
        let analysis =
            analyze("<?php\nif (PHP_VERSION_ID >= 80000) {\n    require 'a.php';\n} else {\n    require 'b.php';\n}\n");

        let includes: Vec<_> = analysis
            .dependencies
            .iter()
            .filter(|d| d.kind == DependencyKind::Require)
            .collect();
        assert_eq!(includes.len(), 2);
        assert!(includes.iter().all(|d| d.is_conditional));
    }

    #[test]
    fn anonymous_class_records_conditional_structural_edges() {
        let analysis =
            analyze("<?php\nnamespace App;\n$x = new class extends Base implements Jsonable {};\n");

        let extends = analysis
            .dependencies
            .iter()
            .find(|d| d.kind == DependencyKind::Extends)
            .expect("extends edge");
        assert_eq!(extends.target_symbol.as_deref(), Some("App\\Base"));
        assert!(extends.is_conditional);
        // No symbol for the anonymous class itself.
        assert!(analysis.symbols.is_empty());
    }

    #[test]
    fn top_level_function_and_const_are_symbols() {
        let analysis = analyze("<?php\nnamespace App;\nconst LIMIT = 3;\nfunction boot() {}\n");

        let kinds: Vec<_> = analysis.symbols.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![SymbolKind::Constant, SymbolKind::Function]);
        assert_eq!(analysis.symbols[0].fqn, "App\\LIMIT");
        assert_eq!(analysis.symbols[1].fqn, "App\\boot");
        assert_eq!(analysis.file_type, FileType::Script);
    }

    #[test]
    fn methods_are_not_symbols() {
        let analysis = analyze("<?php\nclass A {\n    public function f() {}\n}\n");

        assert_eq!(analysis.symbols.len(), 1);
        assert_eq!(analysis.symbols[0].kind, SymbolKind::Class);
    }

    #[test]
    fn projection_contains_root_and_definition_nodes() {
        let analysis = analyze("<?php\nnamespace App;\nclass A {\n    public function f() {}\n}\n");

        assert_eq!(analysis.nodes[0].node_type, "program");
        assert!(analysis.nodes[0].parent.is_none());
        assert!(
            analysis
                .nodes
                .iter()
                .any(|n| n.node_type == "class_declaration"
                    && n.fqcn.as_deref() == Some("App\\A"))
        );
        assert!(
            analysis
                .nodes
                .iter()
                .any(|n| n.node_type == "method_declaration"
                    && n.node_name.as_deref() == Some("f"))
        );
    }
}
