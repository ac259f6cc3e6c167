//! Autoload resolution: mapping fully-qualified names to file paths.
//!
//! The resolver ingests `composer.json` (and the installed-packages manifest
//! under `vendor/composer/`) into four rule families and answers
//! `resolve(fqn)` lookups for the dependency resolver:
//!
//! 1. **classmap** - a direct FQN-to-path table built by scanning directories
//! 2. **psr-4** - prefix stripped, remainder maps under the base paths
//! 3. **psr-0** - full name maps under the base paths, `_` splits the class
//!    part
//! 4. **files** - unconditional includes, surfaced to the orchestrator
//!
//! Rules apply priority-descending (classmap 110, files 120, root psr-4 100,
//! psr-0 90, dev 50/40, vendor packages 10) with a stable order inside each
//! priority. A missing or malformed manifest is a warning, never a failure.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, trace};

use crate::db::Store;
use crate::error::{Result, Warnings, WarningKind};
use crate::php::PhpParser;
use crate::php::extract::analyze_tree;
use crate::types::{AutoloadKind, AutoloadRule};

const MANIFEST_NAME: &str = "composer.json";
const INSTALLED_MANIFEST: &str = "vendor/composer/installed.json";

/// One namespace-prefix rule for PSR-4 or PSR-0.
#[derive(Debug, Clone)]
struct PrefixRule {
    /// Namespace prefix including the trailing backslash (empty = fallback)
    prefix: String,
    /// Base directories tried in order
    base_paths: Vec<PathBuf>,
    /// Resolution priority, higher first
    priority: i32,
}

/// Maps fully-qualified names to file paths using the manifest's rules.
#[derive(Debug)]
pub struct AutoloadResolver {
    root: PathBuf,
    classmap: BTreeMap<String, PathBuf>,
    psr4: Vec<PrefixRule>,
    psr0: Vec<PrefixRule>,
    files: Vec<PathBuf>,
    pending_classmap_dirs: Vec<PathBuf>,
    scanned_classmap_dirs: Vec<PathBuf>,
}

impl AutoloadResolver {
    /// Create an empty resolver for a project root.
    #[must_use]
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            classmap: BTreeMap::new(),
            psr4: Vec::new(),
            psr0: Vec::new(),
            files: Vec::new(),
            pending_classmap_dirs: Vec::new(),
            scanned_classmap_dirs: Vec::new(),
        }
    }

    /// Ingest the project manifest and every installed package's autoload
    /// section, persisting the rules to the store.
    ///
    /// Missing and malformed manifests leave the resolver empty and record
    /// a warning.
    pub fn load_manifest(
        &mut self,
        parser: &mut PhpParser,
        store: &mut Store,
        warnings: &mut Warnings,
    ) -> Result<()> {
        store.clear_autoload_rules()?;

        let root = self.root.clone();
        let manifest_path = root.join(MANIFEST_NAME);
        match std::fs::read_to_string(&manifest_path) {
            Ok(text) => match serde_json::from_str::<ComposerManifest>(&text) {
                Ok(manifest) => {
                    if let Some(autoload) = &manifest.autoload {
                        self.ingest_section(autoload, &root, 100, 90);
                    }
                    if let Some(dev) = &manifest.autoload_dev {
                        self.ingest_section(dev, &root, 50, 40);
                    }
                }
                Err(e) => {
                    warnings.push(
                        WarningKind::Manifest,
                        format!("malformed manifest {}: {e}", manifest_path.display()),
                    );
                }
            },
            Err(_) => {
                warnings.push(
                    WarningKind::Manifest,
                    format!("no manifest at {}", manifest_path.display()),
                );
            }
        }

        self.load_installed_packages(warnings);

        // Stable sort keeps ingestion order inside each priority.
        self.psr4.sort_by_key(|r| std::cmp::Reverse(r.priority));
        self.psr0.sort_by_key(|r| std::cmp::Reverse(r.priority));

        self.scan_classmaps(parser);
        self.persist_rules(store)?;

        debug!(
            classmap = self.classmap.len(),
            psr4 = self.psr4.len(),
            psr0 = self.psr0.len(),
            files = self.files.len(),
            "autoload rules loaded"
        );
        Ok(())
    }

    fn load_installed_packages(&mut self, warnings: &mut Warnings) {
        let installed_path = self.root.join(INSTALLED_MANIFEST);
        let Ok(text) = std::fs::read_to_string(&installed_path) else {
            return;
        };

        let packages = match serde_json::from_str::<InstalledManifest>(&text) {
            Ok(InstalledManifest::V2 { packages }) | Ok(InstalledManifest::V1(packages)) => {
                packages
            }
            Err(e) => {
                warnings.push(
                    WarningKind::Manifest,
                    format!("malformed installed manifest {}: {e}", installed_path.display()),
                );
                return;
            }
        };

        for package in packages {
            let base = match &package.install_path {
                // Composer 2 records the install path relative to
                // vendor/composer/.
                Some(rel) => {
                    let joined = self.root.join("vendor/composer").join(rel);
                    PathBuf::from(crate::paths::normalize(&joined.to_string_lossy()))
                }
                None => self.root.join("vendor").join(&package.name),
            };
            if let Some(autoload) = &package.autoload {
                self.ingest_section(autoload, &base, 10, 10);
            }
        }
    }

    fn ingest_section(
        &mut self,
        section: &AutoloadSection,
        base: &Path,
        psr4_priority: i32,
        psr0_priority: i32,
    ) {
        for (prefix, dirs) in &section.psr4 {
            self.psr4.push(PrefixRule {
                prefix: prefix.clone(),
                base_paths: dirs.iter().map(|d| base.join(d)).collect(),
                priority: psr4_priority,
            });
        }
        for (prefix, dirs) in &section.psr0 {
            self.psr0.push(PrefixRule {
                prefix: prefix.clone(),
                base_paths: dirs.iter().map(|d| base.join(d)).collect(),
                priority: psr0_priority,
            });
        }
        for dir in &section.classmap {
            self.pending_classmap_dirs.push(base.join(dir));
        }
        for file in &section.files {
            self.files.push(base.join(file));
        }
    }

    /// Scan classmap directories once, tokenizing each file into its
    /// class-like definitions.
    fn scan_classmaps(&mut self, parser: &mut PhpParser) {
        let dirs = std::mem::take(&mut self.pending_classmap_dirs);
        for dir in &dirs {
            let mut files = Vec::new();
            collect_php_files(dir, &mut files);
            files.sort();
            for file in files {
                let Ok(content) = std::fs::read_to_string(&file) else {
                    continue;
                };
                let Ok(tree) = parser.parse(&content) else {
                    continue;
                };
                let analysis = analyze_tree(&tree, &content);
                for symbol in &analysis.symbols {
                    if symbol.kind.is_class_like() {
                        // First definition wins, matching prefix-walk order.
                        self.classmap
                            .entry(symbol.fqn.clone())
                            .or_insert_with(|| file.clone());
                    }
                }
            }
        }
        self.scanned_classmap_dirs = dirs;
    }

    fn persist_rules(&self, store: &mut Store) -> Result<()> {
        for rule in &self.psr4 {
            for base in &rule.base_paths {
                store.insert_autoload_rule(&AutoloadRule {
                    kind: AutoloadKind::Psr4,
                    prefix: Some(rule.prefix.clone()),
                    path: base.to_string_lossy().into_owned(),
                    priority: rule.priority,
                })?;
            }
        }
        for rule in &self.psr0 {
            for base in &rule.base_paths {
                store.insert_autoload_rule(&AutoloadRule {
                    kind: AutoloadKind::Psr0,
                    prefix: Some(rule.prefix.clone()),
                    path: base.to_string_lossy().into_owned(),
                    priority: rule.priority,
                })?;
            }
        }
        for dir in &self.scanned_classmap_dirs {
            store.insert_autoload_rule(&AutoloadRule {
                kind: AutoloadKind::Classmap,
                prefix: None,
                path: dir.to_string_lossy().into_owned(),
                priority: 110,
            })?;
        }
        for file in &self.files {
            store.insert_autoload_rule(&AutoloadRule {
                kind: AutoloadKind::Files,
                prefix: None,
                path: file.to_string_lossy().into_owned(),
                priority: 120,
            })?;
        }
        Ok(())
    }

    /// Resolve a fully-qualified name to an existing file path.
    ///
    /// Consults the classmap, then PSR-4, then PSR-0; the first existing
    /// candidate wins. Returns `None` when every family misses.
    #[must_use]
    pub fn resolve(&self, fqn: &str) -> Option<PathBuf> {
        let fqn = fqn.trim_start_matches('\\');
        if fqn.is_empty() {
            return None;
        }

        if let Some(path) = self.classmap.get(fqn) {
            trace!(fqn, path = %path.display(), "classmap hit");
            return Some(path.clone());
        }

        if let Some(path) = self.resolve_psr4(fqn) {
            return Some(path);
        }

        self.resolve_psr0(fqn)
    }

    fn resolve_psr4(&self, fqn: &str) -> Option<PathBuf> {
        for rule in &self.psr4 {
            let Some(rest) = fqn.strip_prefix(rule.prefix.as_str()) else {
                continue;
            };
            let relative = format!("{}.php", rest.replace('\\', "/"));
            for base in &rule.base_paths {
                let candidate = base.join(&relative);
                if candidate.is_file() {
                    trace!(fqn, path = %candidate.display(), "psr-4 hit");
                    return Some(candidate);
                }
            }
        }
        None
    }

    fn resolve_psr0(&self, fqn: &str) -> Option<PathBuf> {
        // PSR-0 keeps the prefix in the path and splits the class part on
        // underscores.
        let relative = {
            let (namespace, class) = match fqn.rsplit_once('\\') {
                Some((ns, class)) => (ns.replace('\\', "/"), class),
                None => (String::new(), fqn),
            };
            let class_path = class.replace('_', "/");
            if namespace.is_empty() {
                format!("{class_path}.php")
            } else {
                format!("{namespace}/{class_path}.php")
            }
        };

        // Non-empty prefixes first; empty prefixes act as a fallback.
        for fallback in [false, true] {
            for rule in &self.psr0 {
                if rule.prefix.is_empty() != fallback {
                    continue;
                }
                if !fallback && !fqn.starts_with(rule.prefix.as_str()) {
                    continue;
                }
                for base in &rule.base_paths {
                    let candidate = base.join(&relative);
                    if candidate.is_file() {
                        trace!(fqn, path = %candidate.display(), "psr-0 hit");
                        return Some(candidate);
                    }
                }
            }
        }
        None
    }

    /// Files the manifest includes unconditionally.
    #[must_use]
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Entries of the scanned classmap, for diagnostics and tests.
    #[must_use]
    pub fn classmap(&self) -> &BTreeMap<String, PathBuf> {
        &self.classmap
    }
}

#[derive(Debug, Deserialize)]
struct ComposerManifest {
    autoload: Option<AutoloadSection>,
    #[serde(rename = "autoload-dev")]
    autoload_dev: Option<AutoloadSection>,
}

#[derive(Debug, Default, Deserialize)]
struct AutoloadSection {
    #[serde(rename = "psr-4", default)]
    psr4: BTreeMap<String, PathsValue>,
    #[serde(rename = "psr-0", default)]
    psr0: BTreeMap<String, PathsValue>,
    #[serde(default)]
    classmap: Vec<String>,
    #[serde(default)]
    files: Vec<String>,
}

/// Composer accepts either a single directory or a list of directories.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PathsValue {
    One(String),
    Many(Vec<String>),
}

impl PathsValue {
    fn iter(&self) -> impl Iterator<Item = &str> {
        match self {
            Self::One(path) => std::slice::from_ref(path).iter().map(String::as_str),
            Self::Many(paths) => paths.as_slice().iter().map(String::as_str),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InstalledManifest {
    V2 { packages: Vec<InstalledPackage> },
    V1(Vec<InstalledPackage>),
}

#[derive(Debug, Deserialize)]
struct InstalledPackage {
    name: String,
    #[serde(rename = "install-path", default)]
    install_path: Option<String>,
    #[serde(default)]
    autoload: Option<AutoloadSection>,
}

fn collect_php_files(dir: &Path, out: &mut Vec<PathBuf>) {
    if dir.is_file() {
        out.push(dir.to_path_buf());
        return;
    }
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_php_files(&path, out);
        } else if matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("php" | "inc")
        ) {
            out.push(path);
        }
    }
}
