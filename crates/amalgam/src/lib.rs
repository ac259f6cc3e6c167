//! # Amalgam: pack a multi-file PHP application into one file
//!
//! Amalgam discovers every source file an entry file transitively requires,
//! resolves class and include references through the composer autoload
//! rules, orders the files so definitions precede their first use, and
//! merges everything into a single output tree with fully-qualified names,
//! no autoloader needed at run time.
//!
//! ## Design Philosophy
//!
//! - **Store-centric** - `SQLite` is the source of truth; analysis results
//!   survive between runs and unchanged files are never re-parsed
//! - **Best effort** - a missing class or a dynamic include is a warning,
//!   not a failure; only the entry file and structural cycles can stop a run
//! - **Deterministic** - one file at a time, FIFO queues, smallest-id
//!   tie-breaks: the same tree packs to the same bytes
//! - **Embeddable** - library first, CLI second
//!
//! ## Quick Start
//!
//! ```no_run
//! use amalgam::{PackConfig, Packer};
//! use std::path::Path;
//!
//! let config = PackConfig::load(Path::new("amalgam.json"))?;
//! let mut packer = Packer::new(Path::new("."), config)?;
//!
//! let output = packer.pack()?;
//! println!(
//!     "packed {} files ({} warnings)",
//!     output.stats.files_packed,
//!     packer.warnings().len()
//! );
//! std::fs::write("dist/app.php", output.merged.render(false))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod analyzer;
mod autoload;
mod config;
mod db;
mod error;
mod merge;
pub mod paths;
mod php;
mod resolver;
mod sort;
mod types;

pub use autoload::AutoloadResolver;
pub use config::{PackConfig, glob_match};
pub use db::{Store, SymbolInsert, content_hash};
pub use php::PhpParser;
pub use error::{Error, PackWarning, Result, WarningKind, Warnings};
pub use merge::{MergeOptions, MergeStats, MergedAst, MergedNode, MergedNodeKind};
pub use sort::sort_graph;
pub use types::{
    AnalysisStatus, AstNodeRecord, AutoloadKind, AutoloadRule, Dependency, DependencyId,
    DependencyKind, FileId, FileType, PackStats, StoredFile, Symbol, SymbolId, SymbolKind,
    Visibility, WorkItem, WorkStatus,
};

use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::info;

use analyzer::FileAnalyzer;
use resolver::DependencyResolver;

/// Result of a successful pack run.
#[derive(Debug)]
pub struct PackOutput {
    /// The merged output tree
    pub merged: MergedAst,
    /// Load order the merge was performed in
    pub order: Vec<StoredFile>,
    /// Run statistics
    pub stats: PackStats,
}

/// The orchestrator: ties autoload resolution, analysis, ordering, and
/// merging together for a single `pack` invocation.
///
/// A `Packer` owns the store connection and the parser. Each call to
/// [`Packer::pack`] runs inside one store transaction: on any fatal error
/// the transaction rolls back and the store keeps its previous contents.
#[derive(Debug)]
pub struct Packer {
    root: PathBuf,
    config: PackConfig,
    store: Store,
    parser: PhpParser,
    warnings: Warnings,
}

impl Packer {
    /// Create a packer for a project root.
    ///
    /// Fails with a configuration error when the root or the entry file do
    /// not exist, or when the database cannot be opened.
    pub fn new(root: &Path, config: PackConfig) -> Result<Self> {
        let root = root.canonicalize().map_err(|e| {
            Error::Config(format!("project root not found: {} ({e})", root.display()))
        })?;
        config.validate(&root)?;

        let store = Store::open(&root.join(&config.database))?;

        Ok(Self {
            root,
            config,
            store,
            parser: PhpParser::new()?,
            warnings: Warnings::new(),
        })
    }

    /// Run the full pipeline: autoload rules, dependency closure, load
    /// order, merge.
    ///
    /// Atomic from the caller's viewpoint: a fatal error rolls the store
    /// back and no partial output is produced.
    pub fn pack(&mut self) -> Result<PackOutput> {
        let start = Instant::now();
        self.warnings = Warnings::new();

        self.store.begin()?;
        match self.run() {
            Ok(mut output) => {
                self.store.commit()?;
                output.stats.duration = start.elapsed();
                info!(
                    files = output.order.len(),
                    warnings = self.warnings.len(),
                    "pack finished"
                );
                Ok(output)
            }
            Err(e) => {
                self.store.rollback()?;
                Err(e)
            }
        }
    }

    /// Compute the load order without merging (used by `amalgam order`).
    pub fn load_order(&mut self) -> Result<Vec<StoredFile>> {
        self.warnings = Warnings::new();
        self.store.begin()?;
        match self.resolve_and_sort() {
            Ok((_, order)) => {
                self.store.commit()?;
                Ok(order)
            }
            Err(e) => {
                self.store.rollback()?;
                Err(e)
            }
        }
    }

    fn run(&mut self) -> Result<PackOutput> {
        let (_entry_id, order) = self.resolve_and_sort()?;

        let merge_options = MergeOptions {
            strip_comments: !self.config.comments,
            optimize: self.config.optimize_code,
        };
        let (merged, merge_stats) = merge::merge(
            &mut self.parser,
            &self.store,
            &mut self.warnings,
            &order,
            merge_options,
        )?;

        let (_, symbols_found, dependencies_found) = self.store.counts()?;
        let external_files = order.iter().filter(|f| f.is_external).count();
        let stats = PackStats {
            files_packed: order.len() - external_files,
            external_files,
            symbols_found,
            dependencies_found,
            duplicates_dropped: merge_stats.duplicates_dropped,
            functions_merged: merge_stats.functions_merged,
            private_methods_removed: merge_stats.private_methods_removed,
            private_properties_removed: merge_stats.private_properties_removed,
            duration: std::time::Duration::default(),
        };

        Ok(PackOutput {
            merged,
            order,
            stats,
        })
    }

    fn resolve_and_sort(&mut self) -> Result<(FileId, Vec<StoredFile>)> {
        let mut autoload = AutoloadResolver::new(&self.root);
        autoload.load_manifest(&mut self.parser, &mut self.store, &mut self.warnings)?;

        let analyzer = FileAnalyzer::new(&self.root);
        let mut resolver = DependencyResolver::new(&self.root);
        let entry = self.config.entry.to_string_lossy().into_owned();
        let entry_id = resolver.resolve_all(
            &mut self.parser,
            &mut self.store,
            &autoload,
            &analyzer,
            &mut self.warnings,
            &entry,
        )?;

        let mut order = sort::sort_files(&self.store, entry_id, &mut self.warnings)?;
        order.retain(|f| f.is_entry || !self.config.is_excluded(&f.path));

        Ok((entry_id, order))
    }

    /// Warnings collected by the most recent run.
    #[must_use]
    pub fn warnings(&self) -> &[PackWarning] {
        self.warnings.items()
    }

    /// Read access to the persistent store, for inspection commands.
    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &PackConfig {
        &self.config
    }

    /// The canonicalized project root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}
