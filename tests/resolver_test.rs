use deadwood::resolver::{module_path, ImportResolver, ImportTarget};
use deadwood::symbols::{ImportRecord, Location, ModuleRecord};
use std::collections::{BTreeMap, BTreeSet};

fn layout(entries: &[(&str, bool)]) -> BTreeMap<String, ModuleRecord> {
    entries
        .iter()
        .map(|(module, is_package)| {
            let file = if *is_package {
                format!("{}/__init__.py", module.replace('.', "/"))
            } else {
                format!("{}.py", module.replace('.', "/"))
            };
            (
                module.to_string(),
                ModuleRecord {
                    file,
                    module: module.to_string(),
                    is_package: *is_package,
                    has_main_block: false,
                    parse_failed: false,
                },
            )
        })
        .collect()
}

fn record(
    from: &str,
    module_text: &str,
    imported: Option<&str>,
    level: usize,
    is_star: bool,
) -> ImportRecord {
    let local_name = if is_star {
        String::new()
    } else {
        imported
            .map(str::to_string)
            .unwrap_or_else(|| module_text.split('.').next().unwrap_or("").to_string())
    };
    ImportRecord {
        module_text: module_text.to_string(),
        imported_name: imported.map(str::to_string),
        alias: None,
        level,
        is_star,
        local_name,
        location: Location {
            file: format!("{}.py", from.replace('.', "/")),
            line: 1,
            col: 0,
        },
        from_module: from.to_string(),
    }
}

#[test]
fn test_absolute_from_import_resolves_symbol() {
    let modules = layout(&[("pkg", true), ("pkg.helpers", false), ("pkg.mod", false)]);
    let symbols: BTreeSet<String> = ["pkg.helpers.go".to_string()].into_iter().collect();
    let resolver = ImportResolver::new(&modules, &symbols);

    let resolved = resolver.resolve_all(&[record("pkg.mod", "pkg.helpers", Some("go"), 0, false)]);

    assert_eq!(
        resolved.import_targets.get("pkg.mod.go"),
        Some(&ImportTarget::Symbol("pkg.helpers.go".to_string()))
    );
    assert!(resolved.module_edges["pkg.mod"].contains("pkg.helpers"));
}

#[test]
fn test_from_import_prefers_submodule() {
    let modules = layout(&[("pkg", true), ("pkg.sub", true), ("pkg.sub.api", false)]);
    let symbols = BTreeSet::new();
    let resolver = ImportResolver::new(&modules, &symbols);

    let resolved = resolver.resolve_all(&[record("pkg", "pkg.sub", Some("api"), 0, false)]);

    assert_eq!(
        resolved.import_targets.get("pkg.api"),
        Some(&ImportTarget::Module("pkg.sub.api".to_string()))
    );
}

#[test]
fn test_relative_import_from_module() {
    let modules = layout(&[("pkg", true), ("pkg.mod", false), ("pkg.helpers", false)]);
    let symbols = BTreeSet::new();
    let resolver = ImportResolver::new(&modules, &symbols);

    // from . import helpers (inside pkg/mod.py)
    let resolved = resolver.resolve_all(&[record("pkg.mod", "", Some("helpers"), 1, false)]);

    assert_eq!(
        resolved.import_targets.get("pkg.mod.helpers"),
        Some(&ImportTarget::Module("pkg.helpers".to_string()))
    );
    assert!(resolved.module_edges["pkg.mod"].contains("pkg.helpers"));
}

#[test]
fn test_relative_import_from_package_init() {
    let modules = layout(&[("pkg", true), ("pkg.mod", false)]);
    let symbols = BTreeSet::new();
    let resolver = ImportResolver::new(&modules, &symbols);

    // from . import mod (inside pkg/__init__.py)
    let resolved = resolver.resolve_all(&[record("pkg", "", Some("mod"), 1, false)]);

    assert_eq!(
        resolved.import_targets.get("pkg.mod"),
        Some(&ImportTarget::Module("pkg.mod".to_string()))
    );
}

#[test]
fn test_two_level_relative_import() {
    let modules = layout(&[
        ("pkg", true),
        ("pkg.sub", true),
        ("pkg.sub.mod", false),
        ("pkg.common", false),
    ]);
    let symbols = BTreeSet::new();
    let resolver = ImportResolver::new(&modules, &symbols);

    // from ..common import helpers (inside pkg/sub/mod.py)
    let resolved = resolver.resolve_all(&[record("pkg.sub.mod", "common", Some("helpers"), 2, false)]);

    assert!(resolved.module_edges["pkg.sub.mod"].contains("pkg.common"));
}

#[test]
fn test_external_import_is_marked() {
    let modules = layout(&[("app", false)]);
    let symbols = BTreeSet::new();
    let resolver = ImportResolver::new(&modules, &symbols);

    let resolved = resolver.resolve_all(&[record("app", "flask", Some("Flask"), 0, false)]);

    assert_eq!(
        resolved.import_targets.get("app.Flask"),
        Some(&ImportTarget::External)
    );
    assert!(resolved.edges[0].external);
    assert!(resolved.module_edges.is_empty());
}

#[test]
fn test_star_import_edge_without_bindings() {
    let modules = layout(&[("app", false), ("utils", false)]);
    let symbols = BTreeSet::new();
    let resolver = ImportResolver::new(&modules, &symbols);

    let resolved = resolver.resolve_all(&[record("app", "utils", None, 0, true)]);

    assert_eq!(resolved.edges.len(), 1);
    assert!(resolved.edges[0].is_star);
    assert!(!resolved.edges[0].external);
    assert!(resolved.module_edges["app"].contains("utils"));
    assert!(resolved.import_targets.is_empty());
}

#[test]
fn test_plain_import_binds_top_package() {
    let modules = layout(&[("app", false), ("pkg", true), ("pkg.sub", false)]);
    let symbols = BTreeSet::new();
    let resolver = ImportResolver::new(&modules, &symbols);

    // import pkg.sub (binding name is "pkg")
    let resolved = resolver.resolve_all(&[record("app", "pkg.sub", None, 0, false)]);

    assert!(resolved.module_edges["app"].contains("pkg.sub"));
    assert_eq!(
        resolved.import_targets.get("app.pkg"),
        Some(&ImportTarget::Module("pkg".to_string()))
    );
}

#[test]
fn test_module_path_forms() {
    assert_eq!(module_path("app.py").as_deref(), Some("app"));
    assert_eq!(
        module_path("pkg/sub/mod.py").as_deref(),
        Some("pkg.sub.mod")
    );
    assert_eq!(module_path("pkg/__init__.py").as_deref(), Some("pkg"));
    assert_eq!(module_path("README.md"), None);
}
