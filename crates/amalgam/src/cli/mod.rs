//! CLI command implementations.

pub mod order;
pub mod pack;
pub mod stats;
pub mod symbols;

use std::path::{Path, PathBuf};

use amalgam::{PackConfig, Packer};

/// Load the configuration and build a packer for a command.
pub fn packer_for(root: &Path, config_path: &Path) -> Result<Packer, amalgam::Error> {
    let config_path = if config_path.is_absolute() {
        config_path.to_path_buf()
    } else {
        root.join(config_path)
    };
    let config = PackConfig::load(&config_path)?;
    Packer::new(root, config)
}

/// Resolve a configured path against the project root.
pub fn under_root(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}
