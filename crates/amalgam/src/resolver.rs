//! Work-queue driver over the include/use/extends/implements closure.
//!
//! `resolve_all` drains the store-backed work queue, analyzing one file at a
//! time and resolving each new dependency as it appears: include paths
//! against the filesystem, class references against the symbol table and the
//! autoload rules. Discovered targets are enqueued; whatever remains
//! unresolved is retried in a fixed-point phase (up to five iterations)
//! before the leftovers are reported, once per dependency id.
//!
//! Built-in PHP symbols and well-known external namespaces resolve to
//! nothing silently: their definitions come from the host runtime or the
//! verbatim external copies the merger carries.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info, trace};

use crate::analyzer::FileAnalyzer;
use crate::autoload::AutoloadResolver;
use crate::db::Store;
use crate::error::{Error, Result, WarningKind, Warnings};
use crate::paths;
use crate::php::PhpParser;
use crate::types::{Dependency, DependencyId, DependencyKind, FileId};

/// Queue priority for the entry file.
const ENTRY_PRIORITY: i32 = 1000;
/// Queue priority for manifest `files` entries.
const FILES_RULE_PRIORITY: i32 = 500;
/// Queue priority for files discovered during resolution.
const DISCOVERED_PRIORITY: i32 = 100;
/// Upper bound on fixed-point iterations.
const MAX_FIXED_POINT_ITERATIONS: usize = 5;

/// Include contexts that can never be resolved statically.
const DYNAMIC_CONTEXTS: &[&str] = &["dynamic", "complex"];

/// Classes, interfaces, and traits provided by the PHP runtime.
///
/// Compared case-insensitively, as PHP does.
const BUILTIN_SYMBOLS: &[&str] = &[
    // Errors and exceptions
    "throwable",
    "exception",
    "error",
    "typeerror",
    "valueerror",
    "argumentcounterror",
    "arithmeticerror",
    "divisionbyzeroerror",
    "errorexception",
    "runtimeexception",
    "logicexception",
    "invalidargumentexception",
    "outofrangeexception",
    "outofboundsexception",
    "lengthexception",
    "domainexception",
    "rangeexception",
    "unexpectedvalueexception",
    "badfunctioncallexception",
    "badmethodcallexception",
    "overflowexception",
    "underflowexception",
    "jsonexception",
    // Core types
    "stdclass",
    "closure",
    "generator",
    "fiber",
    "weakmap",
    "weakreference",
    "arrayaccess",
    "arrayobject",
    "arrayiterator",
    "countable",
    "iterator",
    "iteratoraggregate",
    "traversable",
    "stringable",
    "jsonserializable",
    "serializable",
    // SPL
    "splobjectstorage",
    "splstack",
    "splqueue",
    "spldoublylinkedlist",
    "splpriorityqueue",
    "splfixedarray",
    "splfileinfo",
    "splfileobject",
    "spltempfileobject",
    "directoryiterator",
    "recursivedirectoryiterator",
    "recursiveiteratoriterator",
    "filteriterator",
    "callbackfilteriterator",
    "limititerator",
    // Date/time
    "datetime",
    "datetimeimmutable",
    "datetimeinterface",
    "dateinterval",
    "datetimezone",
    "dateperiod",
    // Database
    "pdo",
    "pdostatement",
    "pdoexception",
    "mysqli",
    // Reflection
    "reflectionclass",
    "reflectionobject",
    "reflectionmethod",
    "reflectionfunction",
    "reflectionproperty",
    "reflectionparameter",
    "reflectionnamedtype",
    // Attributes
    "attribute",
    "sensitiveparameter",
    "returntypewillchange",
    "allowdynamicproperties",
    // Extensions commonly treated as part of the platform
    "curlfile",
    "simplexmlelement",
    "domdocument",
    "domelement",
    "domnode",
    "xmlreader",
    "xmlwriter",
    "ziparchive",
    "phar",
    "phardata",
];

/// Functions provided by the PHP runtime, for `use function` imports.
///
/// Compared case-insensitively, as PHP does.
const BUILTIN_FUNCTIONS: &[&str] = &[
    // Strings
    "strlen",
    "strtolower",
    "strtoupper",
    "substr",
    "str_replace",
    "str_contains",
    "str_starts_with",
    "str_ends_with",
    "str_repeat",
    "str_pad",
    "str_split",
    "trim",
    "ltrim",
    "rtrim",
    "sprintf",
    "printf",
    "implode",
    "explode",
    "ucfirst",
    "lcfirst",
    "ucwords",
    "strpos",
    "strrpos",
    "htmlspecialchars",
    "nl2br",
    "number_format",
    // Arrays
    "count",
    "in_array",
    "array_map",
    "array_filter",
    "array_merge",
    "array_keys",
    "array_values",
    "array_key_exists",
    "array_slice",
    "array_splice",
    "array_search",
    "array_unique",
    "array_reduce",
    "array_reverse",
    "array_combine",
    "array_flip",
    "array_push",
    "array_pop",
    "array_shift",
    "array_unshift",
    "sort",
    "rsort",
    "usort",
    "uasort",
    "uksort",
    "ksort",
    "krsort",
    "range",
    "compact",
    "extract",
    // Types and variables
    "is_array",
    "is_string",
    "is_int",
    "is_float",
    "is_bool",
    "is_null",
    "is_numeric",
    "is_callable",
    "is_object",
    "intval",
    "floatval",
    "strval",
    "boolval",
    "settype",
    "gettype",
    // Regular expressions
    "preg_match",
    "preg_match_all",
    "preg_replace",
    "preg_replace_callback",
    "preg_split",
    "preg_quote",
    // JSON and serialization
    "json_encode",
    "json_decode",
    "serialize",
    "unserialize",
    // Filesystem
    "file_get_contents",
    "file_put_contents",
    "file_exists",
    "is_file",
    "is_dir",
    "is_readable",
    "is_writable",
    "dirname",
    "basename",
    "pathinfo",
    "realpath",
    "mkdir",
    "rmdir",
    "unlink",
    "rename",
    "copy",
    "glob",
    "scandir",
    "fopen",
    "fclose",
    "fread",
    "fwrite",
    "fgets",
    "feof",
    // Math
    "abs",
    "max",
    "min",
    "round",
    "floor",
    "ceil",
    "pow",
    "sqrt",
    "intdiv",
    "rand",
    "mt_rand",
    "random_int",
    // Hashing
    "md5",
    "sha1",
    "hash",
    "crc32",
    "base64_encode",
    "base64_decode",
    // Time
    "time",
    "date",
    "microtime",
    "strtotime",
    "sleep",
    "usleep",
    // Runtime introspection
    "define",
    "defined",
    "constant",
    "function_exists",
    "class_exists",
    "interface_exists",
    "trait_exists",
    "method_exists",
    "property_exists",
    "get_class",
    "call_user_func",
    "call_user_func_array",
    "func_get_args",
    "spl_autoload_register",
    // Output and diagnostics
    "var_dump",
    "var_export",
    "print_r",
    "error_log",
    "trigger_error",
    "ob_start",
    "ob_get_clean",
    "header",
];

/// Namespace prefixes whose symbols are assumed to come with the host or
/// the embedded external code even when nothing resolves them.
const WELL_KNOWN_EXTERNAL_PREFIXES: &[&str] = &["Composer\\", "Psr\\", "PHPUnit\\"];

/// Outcome of a single `resolve_one` attempt.
#[derive(Debug)]
enum Resolution {
    /// Target is stored; the edge can be completed.
    Linked(FileId),
    /// Target exists on disk but is not stored yet (root-relative path).
    Discovered(String),
    /// Built-in or well-known external symbol; no edge, no warning.
    Builtin,
    /// Nothing matched.
    Unresolved,
}

/// Drives analysis over the transitive dependency closure of an entry file.
#[derive(Debug)]
pub struct DependencyResolver {
    root: PathBuf,
    /// Paths already picked up this run, for immediate cycle detection.
    in_progress: HashSet<String>,
}

impl DependencyResolver {
    /// Create a resolver for a project root.
    #[must_use]
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            in_progress: HashSet::new(),
        }
    }

    /// Discover and analyze every file the entry transitively requires,
    /// resolving dependencies until a fixed point.
    ///
    /// Returns the entry's file id. Entry failures (missing, unparsable,
    /// non-source) are fatal; everything else degrades to warnings.
    pub fn resolve_all(
        &mut self,
        parser: &mut PhpParser,
        store: &mut Store,
        autoload: &AutoloadResolver,
        analyzer: &FileAnalyzer,
        warnings: &mut Warnings,
        entry: &str,
    ) -> Result<FileId> {
        let entry_rel = analyzer.relative_path(Path::new(entry));

        store.reset_work_queue()?;
        self.in_progress.clear();
        store.enqueue(&entry_rel, ENTRY_PRIORITY)?;

        // Manifest `files` entries load unconditionally, after the entry but
        // before anything class resolution discovers.
        let files_rules: Vec<String> = autoload
            .files()
            .iter()
            .map(|f| analyzer.relative_path(f))
            .collect();
        for path in &files_rules {
            store.enqueue(path, FILES_RULE_PRIORITY)?;
        }

        self.drain(parser, store, autoload, analyzer, warnings, &entry_rel)?;

        let entry_id = store
            .file_id_by_path(&entry_rel)?
            .ok_or_else(|| Error::Config(format!("entry file {entry_rel} is not a source file")))?;

        // Synthetic resolved edges pull the `files` entries into the load
        // closure ahead of the entry.
        for path in &files_rules {
            if let Some(target) = store.file_id_by_path(path)? {
                if target != entry_id && !store.has_resolved_edge(entry_id, target)? {
                    store.insert_resolved_dependency(
                        entry_id,
                        target,
                        DependencyKind::RequireOnce,
                        Some(path),
                    )?;
                }
            }
        }

        self.fixed_point(parser, store, autoload, analyzer, warnings, &entry_rel)?;
        self.report_unresolved(store, warnings)?;

        Ok(entry_id)
    }

    /// Drain the work queue, analyzing each file and resolving its newly
    /// recorded dependencies.
    fn drain(
        &mut self,
        parser: &mut PhpParser,
        store: &mut Store,
        autoload: &AutoloadResolver,
        analyzer: &FileAnalyzer,
        warnings: &mut Warnings,
        entry_rel: &str,
    ) -> Result<()> {
        while let Some(item) = store.next_work_item()? {
            if !self.in_progress.insert(item.file_path.clone()) {
                warnings.push(
                    WarningKind::QueueSkip,
                    format!("{} is already being analyzed", item.file_path),
                );
                store.finish_work_item(item.id, crate::types::WorkStatus::Done)?;
                continue;
            }

            let is_entry = item.file_path == entry_rel;
            match analyzer.analyze(parser, store, warnings, &item.file_path, is_entry) {
                Ok(Some(file_id)) => {
                    store.finish_work_item(item.id, crate::types::WorkStatus::Done)?;
                    for dep in store.unresolved_dependencies_for(file_id)? {
                        self.process_dependency(store, autoload, warnings, &dep)?;
                    }
                }
                Ok(None) => {
                    store.finish_work_item(item.id, crate::types::WorkStatus::Done)?;
                }
                Err(e @ Error::Analysis { .. }) => {
                    store.finish_work_item(item.id, crate::types::WorkStatus::Failed)?;
                    if is_entry {
                        return Err(e);
                    }
                    warnings.push(WarningKind::ParseFailed, e.to_string());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Attempt resolution of one dependency and act on the outcome.
    fn process_dependency(
        &mut self,
        store: &mut Store,
        autoload: &AutoloadResolver,
        warnings: &mut Warnings,
        dep: &Dependency,
    ) -> Result<bool> {
        let id = DependencyId::from(dep.id);
        match self.resolve_one(store, autoload, dep)? {
            Resolution::Linked(target) => {
                store.mark_dependency_resolved(id, target)?;
                Ok(true)
            }
            Resolution::Discovered(path) => {
                if store.file_id_by_path(&path)?.is_none() {
                    store.enqueue(&path, DISCOVERED_PRIORITY)?;
                }
                Ok(false)
            }
            Resolution::Builtin => {
                warnings.suppress_dependency(id);
                Ok(false)
            }
            Resolution::Unresolved => {
                if dep.dependency_type.is_include_family() {
                    if let Some(context) = &dep.context {
                        if DYNAMIC_CONTEXTS.contains(&context.as_str()) {
                            warnings.push_for_dependency(
                                id,
                                WarningKind::DynamicInclude,
                                format!(
                                    "{} include on line {} cannot be resolved statically",
                                    context, dep.line
                                ),
                            );
                        }
                    }
                }
                Ok(false)
            }
        }
    }

    /// Re-run resolution over every still-unresolved dependency until an
    /// iteration makes no progress, bounded at five iterations.
    fn fixed_point(
        &mut self,
        parser: &mut PhpParser,
        store: &mut Store,
        autoload: &AutoloadResolver,
        analyzer: &FileAnalyzer,
        warnings: &mut Warnings,
        entry_rel: &str,
    ) -> Result<()> {
        for iteration in 0..MAX_FIXED_POINT_ITERATIONS {
            let mut progress = false;

            for dep in store.unresolved_dependencies()? {
                let resolved = self.process_dependency(store, autoload, warnings, &dep)?;
                progress = progress || resolved;
            }

            // Anything newly discovered needs analysis before the next
            // iteration can link edges to it.
            let queued_before = self.in_progress.len();
            self.drain(parser, store, autoload, analyzer, warnings, entry_rel)?;
            progress = progress || self.in_progress.len() > queued_before;

            debug!(iteration, progress, "fixed-point iteration complete");
            if !progress {
                break;
            }
        }
        Ok(())
    }

    /// Report everything that stayed unresolved, once per dependency id.
    fn report_unresolved(&self, store: &mut Store, warnings: &mut Warnings) -> Result<()> {
        let unresolved = store.unresolved_dependencies()?;
        if unresolved.is_empty() {
            info!("all dependencies resolved");
            return Ok(());
        }

        for dep in unresolved {
            let id = DependencyId::from(dep.id);
            if warnings.has_seen_dependency(id) {
                continue;
            }
            let source = store
                .file_by_id(FileId::from(dep.source_file_id))?
                .map_or_else(|| format!("file #{}", dep.source_file_id), |f| f.path);

            if dep.dependency_type.is_include_family() {
                let context = dep.context.as_deref().unwrap_or("<none>");
                warnings.push_for_dependency(
                    id,
                    WarningKind::FileNotFound,
                    format!("include '{context}' in {source} does not exist"),
                );
            } else {
                let fqn = dep.target_symbol.as_deref().unwrap_or("<none>");
                warnings.push_for_dependency(
                    id,
                    WarningKind::UnresolvedSymbol,
                    format!("class not found: {fqn} (referenced in {source})"),
                );
            }
        }
        Ok(())
    }

    /// Dispatch resolution on the dependency type.
    fn resolve_one(
        &self,
        store: &Store,
        autoload: &AutoloadResolver,
        dep: &Dependency,
    ) -> Result<Resolution> {
        if dep.dependency_type.is_include_family() {
            self.resolve_include(store, dep)
        } else {
            self.resolve_class_family(store, autoload, dep)
        }
    }

    fn resolve_include(&self, store: &Store, dep: &Dependency) -> Result<Resolution> {
        let Some(context) = dep.context.as_deref() else {
            return Ok(Resolution::Unresolved);
        };
        if DYNAMIC_CONTEXTS.contains(&context) {
            return Ok(Resolution::Unresolved);
        }

        let root = self.root.to_string_lossy();
        let source_dir = {
            let source = store
                .file_by_id(FileId::from(dep.source_file_id))?
                .ok_or_else(|| {
                    Error::Internal(format!("dependency {} has no source file", dep.id))
                })?;
            let absolute = paths::make_absolute(&source.path, &root);
            match absolute.rsplit_once('/') {
                Some((dir, _)) => dir.to_string(),
                None => root.to_string(),
            }
        };

        let candidates: Vec<String> = if let Some(suffix) =
            context.strip_prefix(crate::php::DIR_MAGIC)
        {
            vec![paths::normalize(&format!("{source_dir}/{suffix}"))]
        } else if paths::is_absolute(context) {
            vec![paths::normalize(context)]
        } else {
            vec![
                paths::normalize(&format!("{source_dir}/{context}")),
                paths::normalize(&format!("{root}/{context}")),
                paths::normalize(context),
            ]
        };

        for candidate in candidates {
            if Path::new(&candidate).is_file() {
                let relative = paths::relative_to(&candidate, &root);
                trace!(context, candidate = %relative, "include resolved");
                return Ok(match store.file_id_by_path(&relative)? {
                    Some(target) => Resolution::Linked(target),
                    None => Resolution::Discovered(relative),
                });
            }
        }

        Ok(Resolution::Unresolved)
    }

    fn resolve_class_family(
        &self,
        store: &Store,
        autoload: &AutoloadResolver,
        dep: &Dependency,
    ) -> Result<Resolution> {
        let Some(fqn) = dep.target_symbol.as_deref() else {
            return Ok(Resolution::Unresolved);
        };

        if let Some(file) = store.find_file_by_symbol(fqn)? {
            return Ok(Resolution::Linked(FileId::from(file.id)));
        }

        if let Some(path) = autoload.resolve(fqn) {
            let root = self.root.to_string_lossy();
            let absolute = paths::normalize(&path.to_string_lossy());
            let relative = paths::relative_to(&absolute, &root);
            return Ok(match store.file_id_by_path(&relative)? {
                Some(target) => Resolution::Linked(target),
                None => Resolution::Discovered(relative),
            });
        }

        if is_builtin_symbol(fqn)
            || is_well_known_external(fqn)
            || (dep.dependency_type == DependencyKind::UseFunction && is_builtin_function(fqn))
        {
            return Ok(Resolution::Builtin);
        }

        Ok(Resolution::Unresolved)
    }
}

/// Whether a name is provided by the PHP runtime.
#[must_use]
pub fn is_builtin_symbol(fqn: &str) -> bool {
    !fqn.contains('\\') && BUILTIN_SYMBOLS.contains(&fqn.to_ascii_lowercase().as_str())
}

/// Whether a function name is provided by the PHP runtime.
#[must_use]
pub fn is_builtin_function(fqn: &str) -> bool {
    !fqn.contains('\\') && BUILTIN_FUNCTIONS.contains(&fqn.to_ascii_lowercase().as_str())
}

/// Whether a name lives in a namespace assumed to ship with the host or
/// the embedded external code.
#[must_use]
pub fn is_well_known_external(fqn: &str) -> bool {
    WELL_KNOWN_EXTERNAL_PREFIXES
        .iter()
        .any(|prefix| fqn.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_symbols_match_case_insensitively() {
        assert!(is_builtin_symbol("Exception"));
        assert!(is_builtin_symbol("EXCEPTION"));
        assert!(is_builtin_symbol("ArrayAccess"));
        assert!(!is_builtin_symbol("App\\Exception"));
        assert!(!is_builtin_symbol("Widget"));
    }

    #[test]
    fn builtin_functions_match_case_insensitively() {
        assert!(is_builtin_function("strlen"));
        assert!(is_builtin_function("Array_Map"));
        assert!(!is_builtin_function("App\\strlen"));
        assert!(!is_builtin_function("definitely_not_builtin"));
    }

    #[test]
    fn well_known_prefixes_cover_psr_and_composer() {
        assert!(is_well_known_external("Psr\\Log\\LoggerInterface"));
        assert!(is_well_known_external("Composer\\Autoload\\ClassLoader"));
        assert!(!is_well_known_external("App\\Psr\\Thing"));
    }
}
