use crate::resolver::{owning_module, Bindings, ImportTarget, NameResolver, ResolvedImports};
use crate::symbols::{
    Diagnostic, DiagnosticKind, ModuleRecord, Symbol, SymbolKind, Usage, UsageKind,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Result of the reachability pass. Frozen before scoring runs.
#[derive(Debug, Default)]
pub struct Reachability {
    pub reachable_symbols: BTreeSet<String>,
    pub reachable_modules: BTreeSet<String>,
    pub orphaned_modules: BTreeSet<String>,
    /// Usages per symbol qualified name, excluding definition sites and
    /// usages inside orphaned files.
    pub usage_counts: BTreeMap<String, usize>,
    /// Names referenced through SQLAlchemy ORM patterns: class names,
    /// table names, and backref names. The scorer treats a model whose
    /// name appears here as used.
    pub orm_names: BTreeSet<String>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Reachability {
    pub fn usage_count(&self, qname: &str) -> usize {
        self.usage_counts.get(qname).copied().unwrap_or(0)
    }
}

/// Builds the call, import, and containment relations and propagates
/// reachability from the entrypoint set to a fixed point. Worklist-style
/// iteration, correct under cycles in both graphs.
pub struct ReachabilityEngine<'a> {
    symbols: &'a BTreeMap<String, Symbol>,
    modules: &'a BTreeMap<String, ModuleRecord>,
    resolved: &'a ResolvedImports,
    bindings: &'a Bindings,
}

impl<'a> ReachabilityEngine<'a> {
    pub fn new(
        symbols: &'a BTreeMap<String, Symbol>,
        modules: &'a BTreeMap<String, ModuleRecord>,
        resolved: &'a ResolvedImports,
        bindings: &'a Bindings,
    ) -> Self {
        Self {
            symbols,
            modules,
            resolved,
            bindings,
        }
    }

    pub fn run(
        &self,
        usages: &[Usage],
        entry_symbols: &BTreeSet<String>,
        entry_modules: &BTreeSet<String>,
    ) -> Reachability {
        let mut result = Reachability::default();

        // Orphan determination uses only the import graph rooted at
        // entrypoint modules; parse-failed files are excluded.
        let import_reach = self.import_closure(entry_modules);
        for (module, record) in self.modules {
            if record.parse_failed {
                continue;
            }
            if !import_reach.contains(module) && !entry_modules.contains(module) {
                result.orphaned_modules.insert(module.clone());
            }
        }

        // Resolve every usage once; call edges and usage counts share
        // the resolution.
        let resolver = NameResolver {
            symbols: self.symbols,
            bindings: self.bindings,
        };
        let visible_classes = self.visible_class_targets();
        let methods_by_name = self.methods_by_name();
        let methods_by_class = self.methods_by_class();

        let mut calls_from_symbol: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut calls_from_module: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut resolved_usages: Vec<(usize, Vec<String>)> = Vec::new();
        let mut ambiguous: BTreeSet<(String, usize, String)> = BTreeSet::new();

        for (index, usage) in usages.iter().enumerate() {
            if usage.kind == UsageKind::ImportRef {
                continue;
            }
            // ORM references are collected by name; string targets like
            // relationship("User") never resolve through bindings.
            if usage.kind == UsageKind::OrmRef
                && !result.orphaned_modules.contains(&usage.module)
            {
                result.orm_names.insert(usage.name.clone());
            }
            let mut targets = resolver.resolve_chain(&usage.module, usage.chain());
            if targets.is_empty() {
                // Names defined in the enclosing function's scope, e.g.
                // a nested helper called from its parent.
                if let Some(caller) = &usage.caller {
                    let candidate = format!("{}.{}", caller, usage.chain());
                    if self.symbols.contains_key(&candidate) {
                        targets.push(candidate);
                    }
                }
            }
            if targets.is_empty() {
                let method_like = match usage.kind {
                    UsageKind::Call => usage.chain().contains('.'),
                    UsageKind::Attribute => usage.attribute_chain.is_none(),
                    _ => false,
                };
                if method_like {
                    targets = self.method_fallback(
                        usage,
                        &visible_classes,
                        &methods_by_name,
                        &mut ambiguous,
                    );
                }
            }
            if matches!(usage.kind, UsageKind::Call | UsageKind::DecoratorRef) {
                for target in &targets {
                    match &usage.caller {
                        Some(caller) => {
                            calls_from_symbol
                                .entry(caller.clone())
                                .or_default()
                                .insert(target.clone());
                        }
                        None => {
                            calls_from_module
                                .entry(usage.module.clone())
                                .or_default()
                                .insert(target.clone());
                        }
                    }
                }
            }
            resolved_usages.push((index, targets));
        }

        for (file, line, name) in ambiguous {
            result.diagnostics.push(Diagnostic {
                file,
                line,
                kind: DiagnosticKind::Ambiguity,
                message: format!("method call '{}' resolves to multiple candidates", name),
            });
        }

        // Seed and propagate to a fixed point.
        let mut reachable: BTreeSet<String> = entry_symbols
            .iter()
            .filter(|q| self.symbols.contains_key(*q))
            .cloned()
            .collect();
        let mut reachable_modules: BTreeSet<String> = entry_modules.clone();

        let mut changed = true;
        while changed {
            changed = false;

            let modules_now: Vec<String> = reachable_modules.iter().cloned().collect();
            for module in modules_now {
                // A reachable module pulls in everything it imports.
                if let Some(targets) = self.resolved.module_edges.get(&module) {
                    for target in targets {
                        if self.modules.contains_key(target)
                            && reachable_modules.insert(target.clone())
                        {
                            changed = true;
                        }
                    }
                }
                // Module top-level code runs at import time.
                if let Some(callees) = calls_from_module.get(&module) {
                    for callee in callees {
                        if reachable.insert(callee.clone()) {
                            changed = true;
                        }
                    }
                }
            }

            let symbols_now: Vec<String> = reachable.iter().cloned().collect();
            for qname in symbols_now {
                if let Some(callees) = calls_from_symbol.get(&qname) {
                    for callee in callees {
                        if reachable.insert(callee.clone()) {
                            changed = true;
                        }
                    }
                }
                if let Some(module) = owning_module(&qname, self.modules) {
                    if reachable_modules.insert(module.to_string()) {
                        changed = true;
                    }
                }
                if let Some(symbol) = self.symbols.get(&qname) {
                    match symbol.kind {
                        SymbolKind::Class => {
                            if let Some(methods) = methods_by_class.get(&qname) {
                                for method in methods {
                                    if method.is_dunder()
                                        && reachable.insert(method.qualified_name.clone())
                                    {
                                        changed = true;
                                    }
                                }
                            }
                        }
                        SymbolKind::Method => {
                            if let Some(parent) = &symbol.parent_class {
                                if self.symbols.contains_key(parent)
                                    && reachable.insert(parent.clone())
                                {
                                    changed = true;
                                }
                            }
                        }
                        _ => {}
                    }
                }
            }
        }

        // Module-level imports execute when their module is imported.
        for (qname, symbol) in self.symbols {
            if symbol.kind == SymbolKind::Import {
                if let Some(module) = owning_module(qname, self.modules) {
                    if reachable_modules.contains(module) {
                        reachable.insert(qname.clone());
                    }
                }
            }
        }

        // A top-level variable is reachable iff some usage of it comes
        // from a reachable symbol or from reachable module scope.
        for (index, targets) in &resolved_usages {
            let usage = &usages[*index];
            let active = match &usage.caller {
                Some(caller) => reachable.contains(caller),
                None => reachable_modules.contains(&usage.module),
            };
            if !active {
                continue;
            }
            for target in targets {
                if let Some(symbol) = self.symbols.get(target) {
                    if symbol.kind == SymbolKind::Variable {
                        reachable.insert(target.clone());
                    }
                }
            }
        }

        // Usage counts, excluding definition sites and orphaned files.
        for (index, targets) in &resolved_usages {
            let usage = &usages[*index];
            if result.orphaned_modules.contains(&usage.module) {
                continue;
            }
            for target in targets {
                if let Some(symbol) = self.symbols.get(target) {
                    if symbol.location == usage.location {
                        continue;
                    }
                }
                *result.usage_counts.entry(target.clone()).or_insert(0) += 1;
            }
        }
        // Being imported is a usage of the imported symbol.
        for (binding, target) in &self.resolved.import_targets {
            if let ImportTarget::Symbol(qname) = target {
                let importer = owning_module(binding, self.modules);
                if let Some(importer) = importer {
                    if result.orphaned_modules.contains(importer) {
                        continue;
                    }
                }
                *result.usage_counts.entry(qname.clone()).or_insert(0) += 1;
            }
        }

        debug!(
            reachable = reachable.len(),
            modules = reachable_modules.len(),
            orphans = result.orphaned_modules.len(),
            "reachability fixed point"
        );
        result.reachable_symbols = reachable;
        result.reachable_modules = reachable_modules;
        result
    }

    fn import_closure(&self, roots: &BTreeSet<String>) -> BTreeSet<String> {
        let mut seen: BTreeSet<String> = roots.clone();
        let mut stack: Vec<String> = roots.iter().cloned().collect();
        while let Some(module) = stack.pop() {
            if let Some(targets) = self.resolved.module_edges.get(&module) {
                for target in targets {
                    if self.modules.contains_key(target) && seen.insert(target.clone()) {
                        stack.push(target.clone());
                    }
                }
            }
        }
        seen
    }

    /// Per module, the leaf names of classes that calls in that module
    /// could dispatch to: classes defined or imported there, plus their
    /// transitive bases.
    fn visible_class_targets(&self) -> BTreeMap<String, BTreeSet<String>> {
        let mut visible: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        let add_class = |module: &str, symbol: &Symbol, out: &mut BTreeMap<String, BTreeSet<String>>| {
            let entry = out.entry(module.to_string()).or_default();
            entry.insert(symbol.name.clone());
            for base in &symbol.parent_class_bases {
                if let Some(leaf) = base.rsplit('.').next() {
                    entry.insert(leaf.to_string());
                }
            }
        };

        for (qname, symbol) in self.symbols {
            if symbol.kind != SymbolKind::Class {
                continue;
            }
            if let Some(module) = owning_module(qname, self.modules) {
                add_class(module, symbol, &mut visible);
            }
        }
        for (module, names) in self.bindings {
            for binding in names.values() {
                if let crate::resolver::BindingTarget::Import {
                    target: ImportTarget::Symbol(qname),
                    ..
                } = binding
                {
                    if let Some(symbol) = self.symbols.get(qname) {
                        if symbol.kind == SymbolKind::Class {
                            add_class(module, symbol, &mut visible);
                        }
                    }
                }
            }
        }
        visible
    }

    fn methods_by_name(&self) -> BTreeMap<&'a str, Vec<&'a Symbol>> {
        let mut map: BTreeMap<&str, Vec<&Symbol>> = BTreeMap::new();
        for symbol in self.symbols.values() {
            if symbol.kind == SymbolKind::Method {
                map.entry(symbol.name.as_str()).or_default().push(symbol);
            }
        }
        map
    }

    fn methods_by_class(&self) -> BTreeMap<String, Vec<&'a Symbol>> {
        let mut map: BTreeMap<String, Vec<&Symbol>> = BTreeMap::new();
        for symbol in self.symbols.values() {
            if symbol.kind == SymbolKind::Method {
                if let Some(parent) = &symbol.parent_class {
                    map.entry(parent.clone()).or_default().push(symbol);
                }
            }
        }
        map
    }

    /// Conservative method-call resolution: `x.m()` links to every
    /// method named `m` whose class is assignable from a class visible
    /// in the caller's module. Ties are preserved as multiple edges and
    /// recorded as an ambiguity.
    fn method_fallback(
        &self,
        usage: &Usage,
        visible: &BTreeMap<String, BTreeSet<String>>,
        methods_by_name: &BTreeMap<&'a str, Vec<&'a Symbol>>,
        ambiguous: &mut BTreeSet<(String, usize, String)>,
    ) -> Vec<String> {
        let Some(candidates) = methods_by_name.get(usage.name.as_str()) else {
            return Vec::new();
        };
        let Some(targets) = visible.get(&usage.module) else {
            return Vec::new();
        };

        let mut matched = Vec::new();
        for method in candidates {
            let class_leaf = method
                .parent_class
                .as_deref()
                .and_then(|c| c.rsplit('.').next());
            if let Some(leaf) = class_leaf {
                if targets.contains(leaf) {
                    matched.push(method.qualified_name.clone());
                }
            }
        }
        if matched.len() > 1 {
            ambiguous.insert((
                usage.location.file.clone(),
                usage.location.line,
                usage.name.clone(),
            ));
        }
        matched
    }
}
