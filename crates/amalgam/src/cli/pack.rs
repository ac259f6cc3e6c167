//! `amalgam pack` command implementation.

use std::path::Path;

use colored::Colorize;

/// Run the pack command: full pipeline, output file, assets.
pub fn run(root: &Path, config_path: &Path) -> Result<(), amalgam::Error> {
    let mut packer = super::packer_for(root, config_path)?;
    let output = packer.pack()?;

    let config = packer.config().clone();
    let rendered = output.merged.render(config.minify);

    let output_path = super::under_root(packer.root(), &config.output);
    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&output_path, &rendered)?;

    // Bundle non-source assets next to the output.
    if let Some(output_dir) = output_path.parent() {
        for asset in &config.assets {
            let source = super::under_root(packer.root(), asset);
            let Some(name) = source.file_name() else {
                continue;
            };
            std::fs::copy(&source, output_dir.join(name))?;
        }
    }

    println!(
        "{} {} ({} project files, {} external, {} symbols)",
        "packed".green().bold(),
        output_path.display(),
        output.stats.files_packed,
        output.stats.external_files,
        output.stats.symbols_found,
    );
    if output.stats.duplicates_dropped > 0 || output.stats.functions_merged > 0 {
        println!(
            "  deduplicated {} definitions, merged {} version-guarded functions",
            output.stats.duplicates_dropped, output.stats.functions_merged
        );
    }
    if config.optimize_code {
        println!(
            "  optimisation removed {} private methods, {} private properties",
            output.stats.private_methods_removed, output.stats.private_properties_removed
        );
    }

    if config.debug {
        println!("{}", "load order:".bold());
        for file in &output.order {
            let marker = if file.is_external { "ext" } else { "src" };
            println!("  {} {}", marker.dimmed(), file.path);
        }
    }

    print_warnings(packer.warnings());
    Ok(())
}

fn print_warnings(warnings: &[amalgam::PackWarning]) {
    if warnings.is_empty() {
        return;
    }
    println!(
        "{} {} warning(s):",
        "!".yellow().bold(),
        warnings.len().to_string().yellow().bold()
    );
    for warning in warnings {
        println!("  {} {warning}", "•".dimmed());
    }
}
