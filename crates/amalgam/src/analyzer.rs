//! Per-file analysis: parse, extract, store.
//!
//! `analyze` is the single entry point the dependency resolver drives. It
//! classifies the file (external, non-source, project source), parses it,
//! runs the extraction visitor, and writes everything into the store.
//! Parse failures surface as [`Error::Analysis`]; the caller decides whether
//! they are fatal (entry file) or a warning (everything else).

use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::db::{Store, SymbolInsert};
use crate::error::{Error, Result, WarningKind, Warnings};
use crate::paths;
use crate::php::PhpParser;
use crate::php::extract::analyze_tree;
use crate::types::{AnalysisStatus, FileId};

/// File extensions treated as PHP source.
const SOURCE_EXTENSIONS: &[&str] = &["php", "inc"];

/// The directory segment that marks externally-managed code.
const EXTERNAL_SEGMENT: &str = "vendor";

/// Analyzes one file at a time and records the results in the store.
#[derive(Debug)]
pub struct FileAnalyzer {
    root: PathBuf,
}

impl FileAnalyzer {
    /// Create an analyzer for a project root.
    #[must_use]
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    /// The project root this analyzer resolves paths against.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Convert any path into the stored root-relative form.
    #[must_use]
    pub fn relative_path(&self, path: &Path) -> String {
        let absolute = paths::make_absolute(
            &path.to_string_lossy(),
            &self.root.to_string_lossy(),
        );
        paths::relative_to(&absolute, &self.root.to_string_lossy())
    }

    /// Analyze a file and persist the results.
    ///
    /// Returns `Ok(None)` for non-source files (they are ignored), otherwise
    /// the stored file id. Unchanged files with a completed analysis are
    /// reused without re-parsing.
    pub fn analyze(
        &self,
        parser: &mut PhpParser,
        store: &mut Store,
        warnings: &mut Warnings,
        path: &str,
        is_entry: bool,
    ) -> Result<Option<FileId>> {
        let relative = paths::normalize(path);
        if !is_source_file(&relative) {
            trace!(path = %relative, "ignoring non-source file");
            return Ok(None);
        }

        let absolute = paths::make_absolute(&relative, &self.root.to_string_lossy());
        let content = std::fs::read_to_string(Path::new(&absolute))
            .map_err(|e| Error::analysis(&relative, e.to_string()))?;

        let external = is_external_path(&relative);
        let entry_override = is_entry.then_some(true);
        let (file_id, changed) =
            store.upsert_file(&relative, &content, entry_override, external, external)?;

        if !changed {
            debug!(path = %relative, "content unchanged, skipping re-analysis");
            return Ok(Some(file_id));
        }

        if external {
            // External files are re-emitted verbatim by the merger; no AST
            // walk, no symbols.
            store.set_analysis_status(file_id, AnalysisStatus::Completed)?;
            debug!(path = %relative, "stored external file verbatim");
            return Ok(Some(file_id));
        }

        let tree = match parser.parse(&content) {
            Ok(tree) if !tree.root_node().has_error() => tree,
            Ok(_) => {
                store.set_analysis_status(file_id, AnalysisStatus::Failed)?;
                return Err(Error::analysis(&relative, "syntax error"));
            }
            Err(e) => {
                store.set_analysis_status(file_id, AnalysisStatus::Failed)?;
                return Err(Error::analysis(&relative, e.to_string()));
            }
        };

        let analysis = analyze_tree(&tree, &content);

        let mut symbol_count = 0usize;
        for symbol in &analysis.symbols {
            match store.insert_symbol(file_id, symbol)? {
                SymbolInsert::Inserted(_) => symbol_count += 1,
                SymbolInsert::Duplicate => {
                    warnings.push(
                        WarningKind::DuplicateSymbol,
                        format!(
                            "{} {} in {relative} is already defined elsewhere",
                            symbol.kind.as_str(),
                            symbol.fqn
                        ),
                    );
                }
            }
        }

        let mut dependency_count = 0usize;
        for dep in &analysis.dependencies {
            store.insert_dependency(file_id, dep)?;
            dependency_count += 1;
        }

        store.store_ast(file_id, &analysis.nodes)?;
        store.set_file_details(
            file_id,
            analysis.file_type,
            analysis.class_name.as_deref(),
            analysis.namespace.as_deref(),
        )?;
        store.set_analysis_status(file_id, AnalysisStatus::Completed)?;

        debug!(
            path = %relative,
            symbol_count, dependency_count, "analysis complete"
        );
        Ok(Some(file_id))
    }
}

/// Whether a path has a PHP source extension.
#[must_use]
pub fn is_source_file(path: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

/// Whether a root-relative path lies under the external-package directory.
#[must_use]
pub fn is_external_path(path: &str) -> bool {
    paths::normalize(path)
        .split('/')
        .any(|segment| segment == EXTERNAL_SEGMENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn setup(files: &[(&str, &str)]) -> (TempDir, FileAnalyzer, PhpParser, Store, Warnings) {
        let dir = tempfile::tempdir().expect("temp dir");
        for (path, content) in files {
            let full = dir.path().join(path);
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent).expect("create dirs");
            }
            fs::write(&full, content).expect("write file");
        }
        let analyzer = FileAnalyzer::new(dir.path());
        let parser = PhpParser::new().expect("parser init");
        let store = Store::open(&dir.path().join("pack.db")).expect("open store");
        (dir, analyzer, parser, store, Warnings::new())
    }

    #[test]
    fn analyzes_a_project_class_file() {
        let (_dir, analyzer, mut parser, mut store, mut warnings) = setup(&[(
            "src/Child.php",
            "<?php\nnamespace App;\nclass Child extends Base {}\n",
        )]);

        let id = analyzer
            .analyze(&mut parser, &mut store, &mut warnings, "src/Child.php", false)
            .expect("analyze")
            .expect("stored");

        let file = store.file_by_id(id).expect("query").expect("exists");
        assert_eq!(file.analysis_status, AnalysisStatus::Completed);
        assert_eq!(file.class_name.as_deref(), Some("Child"));
        assert_eq!(file.namespace.as_deref(), Some("App"));
        assert!(file.ast_root_id.is_some());

        let symbols = store.symbols_by_file(id).expect("symbols");
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].fully_qualified_name, "App\\Child");

        let deps = store.unresolved_dependencies_for(id).expect("deps");
        assert!(
            deps.iter()
                .any(|d| d.target_symbol.as_deref() == Some("App\\Base"))
        );
    }

    #[test]
    fn ignores_non_source_files() {
        let (_dir, analyzer, mut parser, mut store, mut warnings) =
            setup(&[("assets/style.css", "body {}")]);

        let result = analyzer
            .analyze(&mut parser, &mut store, &mut warnings, "assets/style.css", false)
            .expect("analyze");
        assert!(result.is_none());
    }

    #[test]
    fn external_files_skip_the_ast_walk() {
        let (_dir, analyzer, mut parser, mut store, mut warnings) = setup(&[(
            "vendor/acme/lib/src/Thing.php",
            "<?php namespace Acme; class Thing {}\n",
        )]);

        let id = analyzer
            .analyze(
                &mut parser,
                &mut store,
                &mut warnings,
                "vendor/acme/lib/src/Thing.php",
                false,
            )
            .expect("analyze")
            .expect("stored");

        let file = store.file_by_id(id).expect("query").expect("exists");
        assert!(file.is_external);
        assert!(file.skip_ast);
        assert!(file.ast_root_id.is_none());
        assert!(store.symbols_by_file(id).expect("symbols").is_empty());
    }

    #[test]
    fn parse_errors_mark_the_file_failed() {
        let (_dir, analyzer, mut parser, mut store, mut warnings) =
            setup(&[("broken.php", "<?php class {{{")]);

        let result =
            analyzer.analyze(&mut parser, &mut store, &mut warnings, "broken.php", false);
        assert!(matches!(result, Err(Error::Analysis { .. })));

        let file = store
            .file_by_path("broken.php")
            .expect("query")
            .expect("exists");
        assert_eq!(file.analysis_status, AnalysisStatus::Failed);
    }

    #[test]
    fn duplicate_symbols_warn_but_do_not_fail() {
        let (_dir, analyzer, mut parser, mut store, mut warnings) = setup(&[
            ("a.php", "<?php class Helper {}\n"),
            ("b.php", "<?php class Helper {}\n"),
        ]);

        analyzer
            .analyze(&mut parser, &mut store, &mut warnings, "a.php", false)
            .expect("analyze a");
        analyzer
            .analyze(&mut parser, &mut store, &mut warnings, "b.php", false)
            .expect("analyze b");

        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings.items()[0].kind, WarningKind::DuplicateSymbol);
    }

    #[test]
    fn external_detection_matches_vendor_segment_only() {
        assert!(is_external_path("vendor/acme/a.php"));
        assert!(is_external_path("sub/vendor/acme/a.php"));
        assert!(!is_external_path("src/vendored/a.php"));
        assert!(!is_external_path("src/a.php"));
    }
}
