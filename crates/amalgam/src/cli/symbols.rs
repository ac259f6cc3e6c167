//! `amalgam symbols` command implementation.

use std::path::Path;

use colored::Colorize;

/// List stored symbols, optionally filtered by a substring.
pub fn run(root: &Path, config_path: &Path, query: Option<&str>) -> Result<(), amalgam::Error> {
    let packer = super::packer_for(root, config_path)?;
    let symbols = packer.store().all_symbols()?;

    let mut shown = 0usize;
    for symbol in &symbols {
        if let Some(query) = query {
            if !symbol
                .fully_qualified_name
                .to_lowercase()
                .contains(&query.to_lowercase())
            {
                continue;
            }
        }
        shown += 1;
        println!(
            "{:<10} {}",
            symbol.kind.as_str().cyan(),
            symbol.fully_qualified_name
        );
    }

    if shown == 0 {
        println!("{}", "no symbols found (run `amalgam pack` first)".dimmed());
    }
    Ok(())
}
