use crate::symbols::{ImportEdge, ImportRecord, ModuleRecord, Symbol, SymbolKind};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// What an import binding points at after resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportTarget {
    /// An in-project module.
    Module(String),
    /// An in-project symbol (qualified name).
    Symbol(String),
    /// Outside the project; ignored by reachability.
    External,
}

/// Output of import resolution over the whole project.
#[derive(Debug, Default)]
pub struct ResolvedImports {
    /// One edge per import statement name (star imports included).
    pub edges: Vec<ImportEdge>,
    /// Project-internal module dependency graph.
    pub module_edges: BTreeMap<String, BTreeSet<String>>,
    /// Import-symbol qualified name to its resolved target.
    pub import_targets: BTreeMap<String, ImportTarget>,
}

/// Resolves import statements against the project layout: the set of
/// in-project module paths plus package flags for relative imports.
pub struct ImportResolver<'a> {
    modules: &'a BTreeMap<String, ModuleRecord>,
    symbols: &'a BTreeSet<String>,
}

/// Derives a dotted module path from a repository-relative POSIX path:
/// strip the extension, `/` becomes `.`, `__init__` components collapse.
pub fn module_path(rel: &str) -> Option<String> {
    let trimmed = rel.strip_suffix(".py")?;
    let mut parts: Vec<&str> = trimmed.split('/').filter(|p| !p.is_empty()).collect();
    if parts.last() == Some(&"__init__") {
        parts.pop();
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("."))
}

impl<'a> ImportResolver<'a> {
    pub fn new(modules: &'a BTreeMap<String, ModuleRecord>, symbols: &'a BTreeSet<String>) -> Self {
        Self { modules, symbols }
    }

    pub fn resolve_all(&self, imports: &[ImportRecord]) -> ResolvedImports {
        let mut resolved = ResolvedImports::default();

        for record in imports {
            self.resolve_one(record, &mut resolved);
        }

        debug!(
            edges = resolved.edges.len(),
            internal = resolved.module_edges.values().map(|s| s.len()).sum::<usize>(),
            "resolved imports"
        );
        resolved
    }

    fn resolve_one(&self, record: &ImportRecord, out: &mut ResolvedImports) {
        let Some(text) = self.absolute_text(record) else {
            return;
        };

        // For `from X import c`, c may be a sub-module of X or a symbol
        // in X; the full dotted form is tried first.
        let full = match &record.imported_name {
            Some(name) => format!("{}.{}", text, name),
            None => text.clone(),
        };

        let prefix = self.longest_module_prefix(&full);
        let external = prefix.is_none();

        let to_module = match &prefix {
            Some(p) => p.clone(),
            None => full.clone(),
        };
        out.edges.push(ImportEdge {
            from_module: record.from_module.clone(),
            to_module: to_module.clone(),
            imported_name: record.imported_name.clone(),
            alias: record.alias.clone(),
            is_star: record.is_star,
            external,
        });

        if let Some(p) = &prefix {
            // Importing a.b also imports a; every ancestor package is an
            // edge of its own.
            let segments: Vec<&str> = p.split('.').collect();
            for end in 1..=segments.len() {
                let ancestor = segments[..end].join(".");
                if ancestor != record.from_module && self.modules.contains_key(&ancestor) {
                    out.module_edges
                        .entry(record.from_module.clone())
                        .or_default()
                        .insert(ancestor);
                }
            }
        }

        if record.is_star || record.local_name.is_empty() {
            return;
        }

        let target = if record.imported_name.is_none() {
            // Plain `import a.b` binds `a.b` under an alias, otherwise
            // the top package `a`.
            let bound = match &record.alias {
                Some(_) => full.clone(),
                None => full.split('.').next().unwrap_or(&full).to_string(),
            };
            if self.modules.contains_key(&bound) {
                ImportTarget::Module(bound)
            } else {
                ImportTarget::External
            }
        } else {
            match &prefix {
                None => ImportTarget::External,
                Some(p) => {
                    if *p == full {
                        ImportTarget::Module(full.clone())
                    } else {
                        // Deepest symbol along the imported path, if any.
                        match self.longest_symbol_prefix(&full, p) {
                            Some(symbol) => ImportTarget::Symbol(symbol),
                            None => ImportTarget::Module(p.clone()),
                        }
                    }
                }
            }
        };
        let binding_qname = format!("{}.{}", record.from_module, record.local_name);
        out.import_targets.insert(binding_qname, target);
    }

    /// The absolute dotted text of an import, resolving relative levels
    /// against the importing module's package.
    fn absolute_text(&self, record: &ImportRecord) -> Option<String> {
        if record.level == 0 {
            if record.module_text.is_empty() {
                return None;
            }
            return Some(record.module_text.clone());
        }

        let is_package = self
            .modules
            .get(&record.from_module)
            .map_or(false, |m| m.is_package);
        let mut parts: Vec<&str> = record.from_module.split('.').collect();
        // Level 1 is the importing module's own package.
        if !is_package {
            parts.pop();
        }
        for _ in 1..record.level {
            parts.pop()?;
        }
        if record.module_text.is_empty() {
            if parts.is_empty() {
                return None;
            }
            return Some(parts.join("."));
        }
        let mut owned: Vec<String> = parts.iter().map(|p| p.to_string()).collect();
        owned.push(record.module_text.clone());
        Some(owned.join("."))
    }

    /// Longest dotted prefix of `text` that is an in-project module.
    fn longest_module_prefix(&self, text: &str) -> Option<String> {
        let segments: Vec<&str> = text.split('.').collect();
        for end in (1..=segments.len()).rev() {
            let candidate = segments[..end].join(".");
            if self.modules.contains_key(&candidate) {
                return Some(candidate);
            }
        }
        None
    }

    /// Deepest symbol qualified name that is a dotted prefix of `full`
    /// and extends beyond the module prefix `base`.
    fn longest_symbol_prefix(&self, full: &str, base: &str) -> Option<String> {
        let segments: Vec<&str> = full.split('.').collect();
        let base_len = base.split('.').count();
        for end in (base_len + 1..=segments.len()).rev() {
            let candidate = segments[..end].join(".");
            if self.symbols.contains(&candidate) {
                return Some(candidate);
            }
        }
        None
    }
}

/// What a local name in a module's top-level namespace refers to.
#[derive(Debug, Clone)]
pub enum BindingTarget {
    /// A symbol defined in the module itself.
    Def(String),
    /// An import binding: the local IMPORT symbol plus what it resolved to.
    Import {
        local: String,
        target: ImportTarget,
    },
}

/// Per-module name bindings: module path to (local name -> target).
pub type Bindings = BTreeMap<String, BTreeMap<String, BindingTarget>>;

/// Builds the per-module binding tables from the symbol table and the
/// resolved import targets.
pub fn build_bindings(
    symbols: &BTreeMap<String, Symbol>,
    modules: &BTreeMap<String, ModuleRecord>,
    resolved: &ResolvedImports,
) -> Bindings {
    let mut bindings = Bindings::new();

    for (qname, symbol) in symbols {
        let Some(module) = owning_module(qname, modules) else {
            continue;
        };
        // Only top-level names bind in the module namespace.
        let local = match qname.strip_prefix(&format!("{}.", module)) {
            Some(rest) if !rest.contains('.') => rest.to_string(),
            _ => continue,
        };
        let target = if symbol.kind == SymbolKind::Import {
            let target = resolved
                .import_targets
                .get(qname)
                .cloned()
                .unwrap_or(ImportTarget::External);
            BindingTarget::Import {
                local: qname.clone(),
                target,
            }
        } else {
            BindingTarget::Def(qname.clone())
        };
        bindings.entry(module.to_string()).or_default().insert(local, target);
    }

    bindings
}

/// Finds the module that owns a qualified name (its longest module-path
/// prefix).
pub fn owning_module<'m>(
    qname: &str,
    modules: &'m BTreeMap<String, ModuleRecord>,
) -> Option<&'m str> {
    let segments: Vec<&str> = qname.split('.').collect();
    for end in (1..segments.len()).rev() {
        let candidate = segments[..end].join(".");
        if let Some((key, _)) = modules.get_key_value(&candidate) {
            return Some(key.as_str());
        }
    }
    None
}

/// Resolves dotted usage chains to the project symbols they affect.
pub struct NameResolver<'a> {
    pub symbols: &'a BTreeMap<String, Symbol>,
    pub bindings: &'a Bindings,
}

impl<'a> NameResolver<'a> {
    /// All project symbols a chain refers to, from the perspective of
    /// `module`. A chain through an import binding yields both the local
    /// IMPORT symbol and the resolved target.
    pub fn resolve_chain(&self, module: &str, chain: &str) -> Vec<String> {
        let mut out = Vec::new();

        // Fully qualified chains (e.g. self-calls rewritten by the
        // collector) resolve directly.
        if self.symbols.contains_key(chain) {
            out.push(chain.to_string());
            return out;
        }

        let segments: Vec<&str> = chain.split('.').collect();
        let Some(module_bindings) = self.bindings.get(module) else {
            return out;
        };
        let Some(binding) = module_bindings.get(segments[0]) else {
            return out;
        };

        match binding {
            BindingTarget::Def(qname) => {
                if let Some(hit) = self.longest_symbol(qname, &segments[1..]) {
                    out.push(hit);
                }
            }
            BindingTarget::Import { local, target } => {
                out.push(local.clone());
                match target {
                    ImportTarget::Symbol(qname) => {
                        if let Some(hit) = self.longest_symbol(qname, &segments[1..]) {
                            out.push(hit);
                        }
                    }
                    ImportTarget::Module(module_path) => {
                        if segments.len() > 1 {
                            let mut anchor = module_path.clone();
                            // The anchor itself is a module, not a symbol.
                            anchor.push('.');
                            anchor.push_str(segments[1]);
                            if let Some(hit) = self.longest_symbol(&anchor, &segments[2..]) {
                                out.push(hit);
                            }
                        }
                    }
                    ImportTarget::External => {}
                }
            }
        }

        out.dedup();
        out
    }

    /// Deepest existing symbol formed by `anchor` plus a prefix of
    /// `rest`; attribute access on a known symbol counts as usage of
    /// that symbol.
    fn longest_symbol(&self, anchor: &str, rest: &[&str]) -> Option<String> {
        for end in (0..=rest.len()).rev() {
            let candidate = if end == 0 {
                anchor.to_string()
            } else {
                format!("{}.{}", anchor, rest[..end].join("."))
            };
            if self.symbols.contains_key(&candidate) {
                return Some(candidate);
            }
        }
        None
    }
}
