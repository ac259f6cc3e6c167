//! Pack configuration.
//!
//! Loaded from a JSON file (`amalgam.json` by convention). `entry`,
//! `output`, and `database` are required; everything else defaults to the
//! conservative choice (keep comments, no minification, no optimisation).

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::paths;

/// Configuration for one pack run.
#[derive(Debug, Clone, Deserialize)]
pub struct PackConfig {
    /// Entry file, relative to the project root
    pub entry: PathBuf,
    /// Where the packed output is written
    pub output: PathBuf,
    /// Location of the SQLite state database
    pub database: PathBuf,
    /// Glob patterns of files to drop from the load list
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Non-source files copied next to the output
    #[serde(default)]
    pub assets: Vec<PathBuf>,
    /// Collapse blank lines in the rendered output
    #[serde(default)]
    pub minify: bool,
    /// Keep comments (`false` strips them)
    #[serde(default = "default_true")]
    pub comments: bool,
    /// Verbose diagnostics
    #[serde(default)]
    pub debug: bool,
    /// Remove unreferenced private members after merging
    #[serde(default)]
    pub optimize_code: bool,
}

fn default_true() -> bool {
    true
}

impl PackConfig {
    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("invalid configuration {}: {e}", path.display())))
    }

    /// Check that the entry file exists under the project root.
    pub fn validate(&self, root: &Path) -> Result<()> {
        let entry = root.join(&self.entry);
        if !entry.is_file() {
            return Err(Error::Config(format!(
                "entry file {} does not exist",
                entry.display()
            )));
        }
        Ok(())
    }

    /// Whether a root-relative path matches any exclude pattern.
    #[must_use]
    pub fn is_excluded(&self, path: &str) -> bool {
        let normalized = paths::normalize(path);
        self.exclude
            .iter()
            .any(|pattern| glob_match(pattern, &normalized))
    }
}

/// Minimal glob matching over `/`-separated paths.
///
/// `*` matches within a segment, `**` matches across segments, `?` matches
/// one character. This covers the patterns a manifest realistically uses
/// without pulling in a full glob engine.
#[must_use]
pub fn glob_match(pattern: &str, path: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let path: Vec<char> = path.chars().collect();
    glob_match_at(&pattern, 0, &path, 0)
}

fn glob_match_at(pattern: &[char], mut p: usize, path: &[char], mut s: usize) -> bool {
    while p < pattern.len() {
        match pattern[p] {
            '*' => {
                let double = pattern.get(p + 1) == Some(&'*');
                let rest = if double { p + 2 } else { p + 1 };
                // Try every split point; `*` stops at separators, `**`
                // crosses them.
                let mut i = s;
                loop {
                    if glob_match_at(pattern, rest, path, i) {
                        return true;
                    }
                    if i >= path.len() || (!double && path[i] == '/') {
                        return false;
                    }
                    i += 1;
                }
            }
            '?' => {
                if s >= path.len() || path[s] == '/' {
                    return false;
                }
                s += 1;
                p += 1;
            }
            c => {
                if s >= path.len() || path[s] != c {
                    return false;
                }
                s += 1;
                p += 1;
            }
        }
    }
    s == path.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("src/a.php", "src/a.php", true)]
    #[case("src/a.php", "src/b.php", false)]
    #[case("src/*.php", "src/a.php", true)]
    #[case("src/*.php", "src/sub/a.php", false)]
    #[case("src/**/*.php", "src/sub/deep/a.php", true)]
    #[case("src/**/*.php", "lib/a.php", false)]
    #[case("**/tests/**", "lib/tests/unit/a.php", true)]
    #[case("a?.php", "ab.php", true)]
    #[case("a?.php", "abc.php", false)]
    #[case("a?.php", "a/.php", false)]
    fn glob_patterns(#[case] pattern: &str, #[case] path: &str, #[case] expected: bool) {
        assert_eq!(glob_match(pattern, path), expected, "{pattern} vs {path}");
    }

    #[test]
    fn config_parses_with_defaults() {
        let config: PackConfig = serde_json::from_str(
            r#"{"entry": "index.php", "output": "dist/app.php", "database": "pack.db"}"#,
        )
        .expect("parse");
        assert!(config.comments);
        assert!(!config.minify);
        assert!(!config.optimize_code);
        assert!(config.exclude.is_empty());
    }

    #[test]
    fn missing_required_keys_fail() {
        let result: std::result::Result<PackConfig, _> =
            serde_json::from_str(r#"{"entry": "index.php"}"#);
        assert!(result.is_err());
    }
}
