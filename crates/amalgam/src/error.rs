//! Error types for packer operations.
//!
//! Errors are split into two levels:
//!
//! - **`Error`**: fatal conditions that abort the current `pack` run
//!   (database failures, a broken entry file, structural cycles)
//! - **`PackWarning`**: recoverable findings that are collected in a sink
//!   and reported once at the end of the run
//!
//! The packer is best-effort everywhere the specification allows it: an
//! unresolvable include or a missing class produces a warning and the run
//! continues; only the entry file and the store get to stop it.

use std::path::PathBuf;
use thiserror::Error;

use crate::types::DependencyId;

/// Result type for packer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for packer operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The tree-sitter infrastructure itself failed (not a syntax error)
    #[error("parser error: {0}")]
    Parser(String),

    /// A file could not be parsed or read during analysis
    #[error("failed to analyze {path}: {message}")]
    Analysis {
        /// File that failed
        path: PathBuf,
        /// Parser or I/O message
        message: String,
    },

    /// A structural dependency cycle (extends / implements / trait use)
    #[error("circular dependency: {0}")]
    CircularDependency(String),

    /// Missing or invalid configuration, or an unreadable entry file
    #[error("configuration error: {0}")]
    Config(String),

    /// A bug in the packer surfaced as an impossible state
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an analysis error for a file.
    #[must_use]
    pub fn analysis(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Analysis {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Categorization of collected warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// Include argument could not be statically derived
    DynamicInclude,
    /// A resolved include path does not exist on disk
    FileNotFound,
    /// Class-family dependency with no match after the fixed-point phase
    UnresolvedSymbol,
    /// Structurally-different definitions of the same fully-qualified name
    DuplicateSymbol,
    /// Equivalent duplicate definition dropped by the merger
    DuplicateDropped,
    /// Non-structural dependency cycle broken deterministically
    ReferenceCycle,
    /// A non-entry file failed to parse and was skipped
    ParseFailed,
    /// Missing or malformed autoload manifest
    Manifest,
    /// A queued file was already being analyzed (immediate cycle)
    QueueSkip,
}

impl std::fmt::Display for WarningKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DynamicInclude => write!(f, "dynamic include"),
            Self::FileNotFound => write!(f, "file not found"),
            Self::UnresolvedSymbol => write!(f, "unresolved symbol"),
            Self::DuplicateSymbol => write!(f, "duplicate symbol"),
            Self::DuplicateDropped => write!(f, "duplicate dropped"),
            Self::ReferenceCycle => write!(f, "reference cycle"),
            Self::ParseFailed => write!(f, "parse failed"),
            Self::Manifest => write!(f, "manifest"),
            Self::QueueSkip => write!(f, "queue skip"),
        }
    }
}

/// A recoverable finding collected during a pack run.
#[derive(Debug, Clone)]
pub struct PackWarning {
    /// Category of the warning
    pub kind: WarningKind,
    /// Human-readable message with path / FQN context
    pub message: String,
}

impl std::fmt::Display for PackWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Warning sink owned by the orchestrator.
///
/// Warnings about the same dependency id are recorded at most once; the
/// resolver also uses the seen-set to silence edges that resolve to
/// built-in or well-known external symbols.
#[derive(Debug, Default)]
pub struct Warnings {
    items: Vec<PackWarning>,
    seen_dependencies: std::collections::HashSet<i64>,
}

impl Warnings {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a warning unconditionally.
    pub fn push(&mut self, kind: WarningKind, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(kind = %kind, "{message}");
        self.items.push(PackWarning { kind, message });
    }

    /// Record a warning about a dependency, at most once per dependency id.
    ///
    /// Returns `true` if the warning was recorded.
    pub fn push_for_dependency(
        &mut self,
        dep: DependencyId,
        kind: WarningKind,
        message: impl Into<String>,
    ) -> bool {
        if !self.seen_dependencies.insert(dep.as_i64()) {
            return false;
        }
        self.push(kind, message);
        true
    }

    /// Mark a dependency id as handled without emitting anything.
    ///
    /// Used for built-in and well-known external symbols, which resolve to
    /// nothing silently.
    pub fn suppress_dependency(&mut self, dep: DependencyId) {
        self.seen_dependencies.insert(dep.as_i64());
    }

    /// Whether a dependency id has already been warned about or suppressed.
    #[must_use]
    pub fn has_seen_dependency(&self, dep: DependencyId) -> bool {
        self.seen_dependencies.contains(&dep.as_i64())
    }

    /// All collected warnings, in emission order.
    #[must_use]
    pub fn items(&self) -> &[PackWarning] {
        &self.items
    }

    /// Number of collected warnings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the sink is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependency_warnings_deduplicate_by_id() {
        let mut sink = Warnings::new();
        let dep = DependencyId(7);

        assert!(sink.push_for_dependency(dep, WarningKind::UnresolvedSymbol, "class not found: A"));
        assert!(!sink.push_for_dependency(dep, WarningKind::UnresolvedSymbol, "class not found: A"));

        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn suppressed_dependencies_do_not_warn_later() {
        let mut sink = Warnings::new();
        let dep = DependencyId(3);

        sink.suppress_dependency(dep);
        assert!(!sink.push_for_dependency(dep, WarningKind::UnresolvedSymbol, "ignored"));
        assert!(sink.is_empty());
    }

    #[test]
    fn plain_warnings_accumulate_in_order() {
        let mut sink = Warnings::new();
        sink.push(WarningKind::DynamicInclude, "first");
        sink.push(WarningKind::Manifest, "second");

        let kinds: Vec<_> = sink.items().iter().map(|w| w.kind).collect();
        assert_eq!(kinds, vec![WarningKind::DynamicInclude, WarningKind::Manifest]);
    }
}
