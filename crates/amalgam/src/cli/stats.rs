//! `amalgam stats` command implementation.

use std::path::Path;

use colored::Colorize;

/// Show store counts.
pub fn run(root: &Path, config_path: &Path) -> Result<(), amalgam::Error> {
    let packer = super::packer_for(root, config_path)?;
    let (files, symbols, dependencies) = packer.store().counts()?;

    println!("{}", "store contents".bold());
    println!("  files:        {files}");
    println!("  symbols:      {symbols}");
    println!("  dependencies: {dependencies}");
    Ok(())
}
