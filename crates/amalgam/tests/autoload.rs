//! Integration tests for autoload resolution.
//!
//! These exercise manifest ingestion and the classmap / PSR-4 / PSR-0
//! lookup rules against real files in a temp directory.

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use amalgam::{AutoloadResolver, PhpParser, Store, Warnings};

fn workspace(files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    for (path, content) in files {
        let full = dir.path().join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).expect("failed to create parent dirs");
        }
        fs::write(&full, content).expect("failed to write file");
    }
    dir
}

fn resolver_for(root: &Path) -> (AutoloadResolver, Warnings) {
    let mut parser = PhpParser::new().expect("parser init");
    let mut store = Store::open(&root.join(".amalgam/pack.db")).expect("open store");
    let mut warnings = Warnings::new();

    let mut resolver = AutoloadResolver::new(root);
    resolver
        .load_manifest(&mut parser, &mut store, &mut warnings)
        .expect("load manifest");
    (resolver, warnings)
}

#[test]
fn psr4_strips_the_prefix_and_appends_php() {
    let dir = workspace(&[
        (
            "composer.json",
            r#"{"autoload": {"psr-4": {"App\\": "src/"}}}"#,
        ),
        ("src/Service/Logger.php", "<?php namespace App\\Service; class Logger {}"),
    ]);
    let (resolver, warnings) = resolver_for(dir.path());

    let resolved = resolver
        .resolve("App\\Service\\Logger")
        .expect("psr-4 resolution");
    assert!(resolved.ends_with("src/Service/Logger.php"));
    assert!(warnings.is_empty());
}

#[test]
fn psr4_tries_base_paths_in_order() {
    let dir = workspace(&[
        (
            "composer.json",
            r#"{"autoload": {"psr-4": {"App\\": ["first/", "second/"]}}}"#,
        ),
        ("second/Thing.php", "<?php namespace App; class Thing {}"),
    ]);
    let (resolver, _) = resolver_for(dir.path());

    let resolved = resolver.resolve("App\\Thing").expect("fallback base path");
    assert!(resolved.ends_with("second/Thing.php"));
}

#[test]
fn leading_backslash_is_stripped_before_lookup() {
    let dir = workspace(&[
        (
            "composer.json",
            r#"{"autoload": {"psr-4": {"App\\": "src/"}}}"#,
        ),
        ("src/Thing.php", "<?php namespace App; class Thing {}"),
    ]);
    let (resolver, _) = resolver_for(dir.path());

    assert_eq!(
        resolver.resolve("\\App\\Thing"),
        resolver.resolve("App\\Thing")
    );
}

#[test]
fn psr0_keeps_the_prefix_and_splits_underscores() {
    let dir = workspace(&[
        (
            "composer.json",
            r#"{"autoload": {"psr-0": {"Legacy_": "lib/"}}}"#,
        ),
        ("lib/Legacy/Util/Text.php", "<?php class Legacy_Util_Text {}"),
    ]);
    let (resolver, _) = resolver_for(dir.path());

    let resolved = resolver
        .resolve("Legacy_Util_Text")
        .expect("psr-0 resolution");
    assert!(resolved.ends_with("lib/Legacy/Util/Text.php"));
}

#[test]
fn psr0_underscores_split_only_the_class_part() {
    let dir = workspace(&[
        (
            "composer.json",
            r#"{"autoload": {"psr-0": {"Acme\\": "lib/"}}}"#,
        ),
        (
            "lib/Acme/Db_Layer/Conn_Pool.php",
            "<?php namespace Acme\\Db_Layer; class Conn_Pool {}",
        ),
    ]);
    let (resolver, _) = resolver_for(dir.path());

    // Namespace separators map to directories as-is; only the class part
    // splits on underscores.
    let resolved = resolver
        .resolve("Acme\\Db_Layer\\Conn_Pool")
        .expect("psr-0 resolution");
    assert!(resolved.ends_with("lib/Acme/Db_Layer/Conn/Pool.php"));
}

#[test]
fn classmap_scan_indexes_every_definition() {
    let dir = workspace(&[
        (
            "composer.json",
            r#"{"autoload": {"classmap": ["src/"]}}"#,
        ),
        (
            "src/mixed.php",
            "<?php\nnamespace App;\nclass One {}\ninterface Two {}\ntrait Three {}\n",
        ),
        ("src/deep/Four.php", "<?php\nnamespace App\\Deep;\nclass Four {}\n"),
    ]);
    let (resolver, _) = resolver_for(dir.path());

    for fqn in ["App\\One", "App\\Two", "App\\Three", "App\\Deep\\Four"] {
        assert!(resolver.resolve(fqn).is_some(), "classmap must index {fqn}");
    }
}

#[test]
fn every_scanned_classmap_entry_resolves_to_its_file() {
    let dir = workspace(&[
        (
            "composer.json",
            r#"{"autoload": {"classmap": ["src/"]}}"#,
        ),
        ("src/A.php", "<?php class MapA {}"),
        ("src/B.php", "<?php namespace Deep; class MapB {}"),
        ("src/C.php", "<?php interface MapC {}"),
    ]);
    let (resolver, _) = resolver_for(dir.path());

    let entries: Vec<_> = resolver
        .classmap()
        .iter()
        .map(|(fqn, path)| (fqn.clone(), path.clone()))
        .collect();
    assert_eq!(entries.len(), 3);
    for (fqn, path) in entries {
        assert_eq!(resolver.resolve(&fqn), Some(path), "round trip for {fqn}");
    }
}

#[test]
fn classmap_outranks_psr4_for_the_same_name() {
    let dir = workspace(&[
        (
            "composer.json",
            r#"{"autoload": {"classmap": ["gen/"], "psr-4": {"App\\": "src/"}}}"#,
        ),
        ("gen/AppThing.php", "<?php namespace App; class Thing {}"),
        ("src/Thing.php", "<?php namespace App; class Thing {}"),
    ]);
    let (resolver, _) = resolver_for(dir.path());

    let resolved = resolver.resolve("App\\Thing").expect("resolution");
    assert!(
        resolved.ends_with("gen/AppThing.php"),
        "classmap must win: {}",
        resolved.display()
    );
}

#[test]
fn vendor_package_rules_resolve_at_lowest_priority() {
    let dir = workspace(&[
        ("composer.json", r#"{"autoload": {"psr-4": {"App\\": "src/"}}}"#),
        (
            "vendor/composer/installed.json",
            r#"{"packages": [{"name": "acme/lib", "install-path": "../acme/lib",
                "autoload": {"psr-4": {"Acme\\Lib\\": "src/"}}}]}"#,
        ),
        (
            "vendor/acme/lib/src/Widget.php",
            "<?php namespace Acme\\Lib; class Widget {}",
        ),
    ]);
    let (resolver, _) = resolver_for(dir.path());

    let resolved = resolver.resolve("Acme\\Lib\\Widget").expect("vendor rule");
    assert!(resolved.ends_with("vendor/acme/lib/src/Widget.php"));
}

#[test]
fn files_entries_are_collected_for_unconditional_loading() {
    let dir = workspace(&[
        (
            "composer.json",
            r#"{"autoload": {"files": ["helpers.php", "lib/boot.php"]}}"#,
        ),
        ("helpers.php", "<?php function h() {}"),
        ("lib/boot.php", "<?php function b() {}"),
    ]);
    let (resolver, _) = resolver_for(dir.path());

    let files: Vec<_> = resolver
        .files()
        .iter()
        .map(|p| p.file_name().and_then(|n| n.to_str()).unwrap_or(""))
        .collect();
    assert_eq!(files, vec!["helpers.php", "boot.php"]);
}

#[test]
fn missing_manifest_leaves_the_resolver_empty_with_a_warning() {
    let dir = workspace(&[("src/Thing.php", "<?php class Thing {}")]);
    let (resolver, warnings) = resolver_for(dir.path());

    assert!(resolver.resolve("Thing").is_none());
    assert_eq!(warnings.len(), 1);
}

#[test]
fn malformed_manifest_is_a_warning_not_a_failure() {
    let dir = workspace(&[("composer.json", "{not json")]);
    let (resolver, warnings) = resolver_for(dir.path());

    assert!(resolver.resolve("Anything").is_none());
    assert_eq!(warnings.len(), 1);
}

#[test]
fn unknown_names_return_none() {
    let dir = workspace(&[
        ("composer.json", r#"{"autoload": {"psr-4": {"App\\": "src/"}}}"#),
        ("src/Thing.php", "<?php namespace App; class Thing {}"),
    ]);
    let (resolver, _) = resolver_for(dir.path());

    assert!(resolver.resolve("App\\Nothing").is_none());
    assert!(resolver.resolve("Other\\Thing").is_none());
    assert!(resolver.resolve("").is_none());
}
