//! Domain types for the Amalgam packer.
//!
//! These types represent the core domain model:
//! - **Entities**: `StoredFile`, `Symbol`, `Dependency`, `AutoloadRule`,
//!   `AstNodeRecord`, `WorkItem` (stored in the database)
//! - **Transient**: extraction results produced by the analyzer before storage
//! - **Results**: `PackStats` and the merged-output types in `merge`
//!
//! All enums carry a stable string form (`as_str`/`parse`) because the
//! database stores them as text columns.

use std::time::Duration;

// ============================================================================
// Strongly-typed ID wrappers
// ============================================================================

/// A strongly-typed file ID to prevent mixing with symbol or dependency IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub i64);

impl FileId {
    /// Extract the raw i64 value.
    #[must_use]
    pub fn as_i64(self) -> i64 {
        self.0
    }
}

impl From<i64> for FileId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A strongly-typed symbol ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(pub i64);

impl SymbolId {
    /// Extract the raw i64 value.
    #[must_use]
    pub fn as_i64(self) -> i64 {
        self.0
    }
}

impl From<i64> for SymbolId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// A strongly-typed dependency ID, used to deduplicate warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DependencyId(pub i64);

impl DependencyId {
    /// Extract the raw i64 value.
    #[must_use]
    pub fn as_i64(self) -> i64 {
        self.0
    }
}

impl From<i64> for DependencyId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

// ============================================================================
// Enums
// ============================================================================

/// Classification of a stored file by its primary definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    /// File whose first definition is a class
    Class,
    /// File whose first definition is an interface
    Interface,
    /// File whose first definition is a trait
    Trait,
    /// File with executable statements but no class-like definition
    Script,
    /// Anything else (externals persisted without analysis)
    Unknown,
}

impl Default for FileType {
    fn default() -> Self {
        Self::Unknown
    }
}

impl FileType {
    /// Convert to database string representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Trait => "trait",
            Self::Script => "script",
            Self::Unknown => "unknown",
        }
    }

    /// Parse from the database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "class" => Some(Self::Class),
            "interface" => Some(Self::Interface),
            "trait" => Some(Self::Trait),
            "script" => Some(Self::Script),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

/// Symbol kinds tracked by the packer.
///
/// Only top-level definitions are symbols; methods and properties belong to
/// their class and are never indexed on their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    /// `class Foo { … }`
    Class,
    /// `interface Foo { … }`
    Interface,
    /// `trait Foo { … }`
    Trait,
    /// Top-level `function foo() { … }`
    Function,
    /// Top-level `const FOO = …;`
    Constant,
}

impl SymbolKind {
    /// Convert to database string representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Trait => "trait",
            Self::Function => "function",
            Self::Constant => "constant",
        }
    }

    /// Parse from the database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "class" => Some(Self::Class),
            "interface" => Some(Self::Interface),
            "trait" => Some(Self::Trait),
            "function" => Some(Self::Function),
            "constant" => Some(Self::Constant),
            _ => None,
        }
    }

    /// Whether this kind participates in class-map style autoloading.
    #[must_use]
    pub fn is_class_like(self) -> bool {
        matches!(self, Self::Class | Self::Interface | Self::Trait)
    }
}

/// Visibility of a symbol as recorded in the index.
///
/// Top-level definitions in PHP are always reachable, so for classes this
/// records the declaration flavour (`public`, `abstract`, `final`) rather
/// than an access level; members inside a class use the access levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    /// Default visibility
    Public,
    /// `protected` member
    Protected,
    /// `private` member
    Private,
    /// `abstract` class
    Abstract,
    /// `final` class
    Final,
}

impl Visibility {
    /// Convert to database string representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Protected => "protected",
            Self::Private => "private",
            Self::Abstract => "abstract",
            Self::Final => "final",
        }
    }

    /// Parse from the database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "public" => Some(Self::Public),
            "protected" => Some(Self::Protected),
            "private" => Some(Self::Private),
            "abstract" => Some(Self::Abstract),
            "final" => Some(Self::Final),
            _ => None,
        }
    }
}

/// How one file depends on another.
///
/// Include-family values carry a path expression in `Dependency::context`;
/// class-family values carry a fully-qualified name in
/// `Dependency::target_symbol`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyKind {
    /// `require` expression
    Require,
    /// `require_once` expression
    RequireOnce,
    /// `include` expression
    Include,
    /// `include_once` expression
    IncludeOnce,
    /// `class A extends B` (or interface extends)
    Extends,
    /// `class A implements B`
    Implements,
    /// `use SomeTrait;` inside a class body
    UseTrait,
    /// Any plain class reference: imports, `new`, static access
    UseClass,
    /// `use function Foo\bar;` imports
    UseFunction,
}

impl DependencyKind {
    /// Convert to database string representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Require => "require",
            Self::RequireOnce => "require_once",
            Self::Include => "include",
            Self::IncludeOnce => "include_once",
            Self::Extends => "extends",
            Self::Implements => "implements",
            Self::UseTrait => "use_trait",
            Self::UseClass => "use_class",
            Self::UseFunction => "use_function",
        }
    }

    /// Parse from the database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "require" => Some(Self::Require),
            "require_once" => Some(Self::RequireOnce),
            "include" => Some(Self::Include),
            "include_once" => Some(Self::IncludeOnce),
            "extends" => Some(Self::Extends),
            "implements" => Some(Self::Implements),
            "use_trait" => Some(Self::UseTrait),
            "use_class" => Some(Self::UseClass),
            "use_function" => Some(Self::UseFunction),
            _ => None,
        }
    }

    /// Whether this is one of the `require`/`include` path dependencies.
    #[must_use]
    pub fn is_include_family(self) -> bool {
        matches!(
            self,
            Self::Require | Self::RequireOnce | Self::Include | Self::IncludeOnce
        )
    }

    /// Whether this edge is required for class layout at load time.
    ///
    /// Cycles through structural edges are fatal; cycles through plain
    /// references are broken with a warning.
    #[must_use]
    pub fn is_structural(self) -> bool {
        matches!(self, Self::Extends | Self::Implements | Self::UseTrait)
    }
}

/// Outcome of analyzing a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisStatus {
    /// Stored but not yet analyzed
    Pending,
    /// Analysis finished and results are in the store
    Completed,
    /// The parser rejected the file; results are absent
    Failed,
}

impl AnalysisStatus {
    /// Convert to database string representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parse from the database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// State of a work-queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkStatus {
    /// Waiting to be picked up
    Pending,
    /// Currently being analyzed
    InProgress,
    /// Finished successfully
    Done,
    /// Analysis failed; the item is not retried
    Failed,
}

impl WorkStatus {
    /// Convert to database string representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Parse from the database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// The four autoload rule families read from the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoloadKind {
    /// PSR-4: prefix stripped, remainder maps to a path
    Psr4,
    /// PSR-0: full name maps to a path, `_` splits the class part
    Psr0,
    /// Precomputed FQN → file table built by scanning directories
    Classmap,
    /// Files included unconditionally
    Files,
}

impl AutoloadKind {
    /// Convert to database string representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Psr4 => "psr4",
            Self::Psr0 => "psr0",
            Self::Classmap => "classmap",
            Self::Files => "files",
        }
    }

    /// Parse from the database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "psr4" => Some(Self::Psr4),
            "psr0" => Some(Self::Psr0),
            "classmap" => Some(Self::Classmap),
            "files" => Some(Self::Files),
            _ => None,
        }
    }
}

// ============================================================================
// Core Entities (stored in database)
// ============================================================================

/// A source file in the store.
///
/// `path` is always project-root-relative with forward slashes. External
/// files (anything under the vendor directory) are persisted with
/// `skip_ast = true` and re-emitted verbatim by the merger.
#[derive(Debug, Clone)]
pub struct StoredFile {
    /// Database primary key
    pub id: i64,
    /// Path relative to the project root
    pub path: String,
    /// Full source text
    pub content: String,
    /// xxh3-64 hex digest of `content`
    pub content_hash: String,
    /// Classification by first definition
    pub file_type: FileType,
    /// Local name of the first class-like definition, if any
    pub class_name: Option<String>,
    /// Namespace of the first definition scope, if any
    pub namespace: Option<String>,
    /// Whether this is the entry file of the pack
    pub is_entry: bool,
    /// Whether the path lies under the external-package directory
    pub is_external: bool,
    /// External files skip the AST walk entirely
    pub skip_ast: bool,
    /// Root of the stored AST projection, once analysis completes
    pub ast_root_id: Option<i64>,
    /// Analysis outcome
    pub analysis_status: AnalysisStatus,
}

/// A top-level definition extracted from a file.
#[derive(Debug, Clone)]
pub struct Symbol {
    /// Database primary key
    pub id: i64,
    /// File that defines this symbol
    pub file_id: i64,
    /// What kind of definition this is
    pub kind: SymbolKind,
    /// Name without namespace qualification
    pub local_name: String,
    /// Complete namespace path plus local name, no leading backslash
    pub fully_qualified_name: String,
    /// Enclosing namespace, if any
    pub namespace: Option<String>,
    /// Declaration flavour
    pub visibility: Visibility,
    /// `abstract class`
    pub is_abstract: bool,
    /// `final class`
    pub is_final: bool,
}

/// An edge from one file to a file or symbol it needs.
#[derive(Debug, Clone)]
pub struct Dependency {
    /// Database primary key
    pub id: i64,
    /// File containing the reference
    pub source_file_id: i64,
    /// Resolved target file, once known
    pub target_file_id: Option<i64>,
    /// Edge flavour
    pub dependency_type: DependencyKind,
    /// Fully-qualified name for class-family edges
    pub target_symbol: Option<String>,
    /// Line of the reference (1-indexed)
    pub line: u32,
    /// Inside a branch, try/catch arm, or anonymous-class body
    pub is_conditional: bool,
    /// Whether `target_file_id` has been filled in
    pub is_resolved: bool,
    /// Literal or partially-resolved path expression for include-family edges
    pub context: Option<String>,
}

/// An autoload rule read from the manifest.
#[derive(Debug, Clone)]
pub struct AutoloadRule {
    /// Rule family
    pub kind: AutoloadKind,
    /// Namespace prefix for psr rules, `None` for classmap/files
    pub prefix: Option<String>,
    /// Base directory (psr, classmap) or file path (files)
    pub path: String,
    /// Higher priority resolves first
    pub priority: i32,
}

/// One row of the stored AST projection.
///
/// The projection keeps the nodes the merger and reporting care about
/// (namespaces, imports, definitions, members, includes); expression detail
/// stays in the re-parsed tree.
#[derive(Debug, Clone)]
pub struct AstNodeRecord {
    /// Database primary key
    pub id: i64,
    /// Owning file
    pub file_id: i64,
    /// Parent node; `None` for each file's root
    pub parent_id: Option<i64>,
    /// Tagged node kind (parser node type)
    pub node_type: String,
    /// Declared or referenced name, if any
    pub node_name: Option<String>,
    /// Byte offset of the node start
    pub position: u32,
    /// Starting line (1-indexed)
    pub start_line: u32,
    /// Ending line (1-indexed)
    pub end_line: u32,
    /// Fully-qualified name, when resolution applies
    pub fqcn: Option<String>,
    /// JSON bag of auxiliary flags (modifiers, conditional, …)
    pub attributes: Option<String>,
}

/// A pending analysis task.
#[derive(Debug, Clone)]
pub struct WorkItem {
    /// Database primary key; FIFO tiebreak within a priority
    pub id: i64,
    /// Root-relative path to analyze
    pub file_path: String,
    /// Higher pops first
    pub priority: i32,
    /// Queue state
    pub status: WorkStatus,
}

// ============================================================================
// Operation Results
// ============================================================================

/// Statistics from a full `pack` run.
#[derive(Debug, Clone, Default)]
pub struct PackStats {
    /// Project files that ended up in the merged output
    pub files_packed: usize,
    /// External (vendor) files re-emitted verbatim
    pub external_files: usize,
    /// Total symbols recorded during analysis
    pub symbols_found: usize,
    /// Total dependencies recorded during analysis
    pub dependencies_found: usize,
    /// Structurally-equivalent duplicate definitions dropped by the merger
    pub duplicates_dropped: usize,
    /// Function pairs merged under a version guard
    pub functions_merged: usize,
    /// Private methods removed by the optimisation pass
    pub private_methods_removed: usize,
    /// Private properties removed by the optimisation pass
    pub private_properties_removed: usize,
    /// Wall-clock duration of the run
    pub duration: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependency_kind_round_trips_through_strings() {
        for kind in [
            DependencyKind::Require,
            DependencyKind::RequireOnce,
            DependencyKind::Include,
            DependencyKind::IncludeOnce,
            DependencyKind::Extends,
            DependencyKind::Implements,
            DependencyKind::UseTrait,
            DependencyKind::UseClass,
            DependencyKind::UseFunction,
        ] {
            assert_eq!(DependencyKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn include_family_classification() {
        assert!(DependencyKind::Require.is_include_family());
        assert!(DependencyKind::IncludeOnce.is_include_family());
        assert!(!DependencyKind::Extends.is_include_family());
        assert!(!DependencyKind::UseClass.is_include_family());
    }

    #[test]
    fn structural_classification() {
        assert!(DependencyKind::Extends.is_structural());
        assert!(DependencyKind::Implements.is_structural());
        assert!(DependencyKind::UseTrait.is_structural());
        assert!(!DependencyKind::UseClass.is_structural());
        assert!(!DependencyKind::Require.is_structural());
    }

    #[test]
    fn symbol_kind_class_like() {
        assert!(SymbolKind::Class.is_class_like());
        assert!(SymbolKind::Interface.is_class_like());
        assert!(SymbolKind::Trait.is_class_like());
        assert!(!SymbolKind::Function.is_class_like());
        assert!(!SymbolKind::Constant.is_class_like());
    }

    #[test]
    fn parse_rejects_unknown_values() {
        assert_eq!(SymbolKind::parse("method"), None);
        assert_eq!(FileType::parse(""), None);
        assert_eq!(WorkStatus::parse("running"), None);
    }
}
