//! `amalgam order` command implementation.

use std::path::Path;

use colored::Colorize;

/// Print the computed load order, definitions first.
pub fn run(root: &Path, config_path: &Path) -> Result<(), amalgam::Error> {
    let mut packer = super::packer_for(root, config_path)?;
    let order = packer.load_order()?;

    if order.is_empty() {
        println!("{}", "nothing to load".dimmed());
        return Ok(());
    }

    for (position, file) in order.iter().enumerate() {
        let marker = if file.is_external {
            "ext".yellow()
        } else if file.is_entry {
            "entry".green().bold()
        } else {
            "src".normal()
        };
        println!("{:>4}  {:<5} {}", position + 1, marker, file.path);
    }

    for warning in packer.warnings() {
        println!("  {} {warning}", "!".yellow());
    }
    Ok(())
}
