use crate::config::Config;
use crate::entry_point::detect_main_block;
use crate::error::Error;
use crate::noqa;
use crate::plugins::PluginRegistry;
use crate::reachability::ReachabilityEngine;
use crate::report::{build_report, Report};
use crate::resolver::{
    build_bindings, module_path, owning_module, BindingTarget, ImportResolver, NameResolver,
};
use crate::scoring::{ScoreContext, Scorer};
use crate::symbols::{
    DependencyNode, Diagnostic, DiagnosticKind, ImportRecord, ModuleRecord, Symbol, SymbolKind,
    Usage, UsageKind,
};
use crate::utils::LineIndex;
use crate::visitor::Collector;
use crate::walker::{SourceFile, SourceWalker};
use rayon::prelude::*;
use rustpython_parser::{parse, Mode};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Cooperative cancellation handle. Checked at file boundaries and
/// before each major stage; a cancelled analysis yields no report.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Everything collected from one file. ASTs are released as soon as
/// this is built.
struct FileAnalysis {
    record: ModuleRecord,
    symbols: Vec<Symbol>,
    usages: Vec<Usage>,
    imports: Vec<ImportRecord>,
    diagnostics: Vec<Diagnostic>,
    /// Names referenced inside a main block, when one exists.
    main_names: Option<BTreeSet<String>>,
    /// Objects of non-literal dynamic attribute forms.
    dynamic_targets: Vec<String>,
    /// `(class name, table name)` pairs from `__tablename__` strings.
    model_tables: Vec<(String, String)>,
}

/// The analysis engine: a pure function of (root, config) to Report.
/// Files are parsed and collected in parallel; the global stages run
/// single-threaded over frozen tables.
pub struct Deadwood {
    config: Config,
}

impl Deadwood {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Runs the analysis on the given root.
    ///
    /// This method:
    /// 1. Walks the tree to find source files matching the configured globs.
    /// 2. Parses and collects each file in parallel using `rayon`.
    /// 3. Merges the per-file results into frozen global tables.
    /// 4. Resolves imports against the project layout.
    /// 5. Recognizes entrypoints through the enabled plugins.
    /// 6. Propagates reachability from the entrypoint set to a fixed point.
    /// 7. Scores every symbol and builds the deterministic report.
    pub fn analyze(&self, root: &Path) -> Result<Report, Error> {
        self.analyze_with_cancel(root, &CancelToken::new())
    }

    pub fn analyze_with_cancel(&self, root: &Path, cancel: &CancelToken) -> Result<Report, Error> {
        // Configuration problems surface before any work starts. Both
        // the walker and the scorer compile user-supplied glob patterns,
        // so building them here makes a malformed config fatal up front.
        let walker = SourceWalker::new(&self.config.analysis)?;
        let registry = PluginRegistry::with_enabled(&self.config.plugins.enabled);
        let scorer = Scorer::new(&self.config.linting, &registry)?;

        // Walk the directory tree to find the files to analyze.
        // A missing root is fatal; unreadable entries become diagnostics.
        let (files, mut diagnostics) = walker.walk(root)?;
        info!(files = files.len(), root = %root.display(), "starting analysis");
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        // Stages 1-4: per-file parse and collection. Each file is
        // independent, so rayon distributes the work across threads;
        // everything after the join runs single-threaded over frozen
        // tables.
        let timeout = self
            .config
            .analysis
            .per_file_timeout_ms
            .map(Duration::from_millis);
        let noqa_patterns = self.config.linting.noqa_patterns.clone();
        let analyses: Vec<FileAnalysis> = files
            .par_iter()
            .filter_map(|file| {
                // Cooperative cancellation at file boundaries.
                if cancel.is_cancelled() {
                    return None;
                }
                Some(analyze_file(file, &noqa_patterns, timeout))
            })
            .collect();
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        // Merge the per-file results into frozen global tables. Ordered
        // maps keep everything downstream deterministic.
        let mut modules: BTreeMap<String, ModuleRecord> = BTreeMap::new();
        let mut symbols: BTreeMap<String, Symbol> = BTreeMap::new();
        let mut usages: Vec<Usage> = Vec::new();
        let mut imports: Vec<ImportRecord> = Vec::new();
        let mut main_blocks: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut dynamic_targets: Vec<(String, String)> = Vec::new();
        let mut model_tables: BTreeMap<String, String> = BTreeMap::new();
        let mut redefined: BTreeSet<String> = BTreeSet::new();

        for analysis in analyses {
            diagnostics.extend(analysis.diagnostics);
            let module = analysis.record.module.clone();
            modules.insert(module.clone(), analysis.record);
            if let Some(names) = analysis.main_names {
                main_blocks.insert(module.clone(), names);
            }
            for name in analysis.dynamic_targets {
                dynamic_targets.push((module.clone(), name));
            }
            for (class_name, table) in analysis.model_tables {
                model_tables.insert(class_name, table);
            }
            for symbol in analysis.symbols {
                let qname = symbol.qualified_name.clone();
                if symbols.insert(qname.clone(), symbol).is_some() && redefined.insert(qname.clone())
                {
                    // Last definition wins, reported once.
                    let kept = &symbols[&qname];
                    diagnostics.push(Diagnostic {
                        file: kept.location.file.clone(),
                        line: kept.location.line,
                        kind: DiagnosticKind::Redefinition,
                        message: format!("'{}' is redefined; keeping the last definition", qname),
                    });
                }
            }
            usages.extend(analysis.usages);
            imports.extend(analysis.imports);
        }

        expand_base_closure(&mut symbols);
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        // Stage 5: import resolution. Every import statement is matched
        // against the discovered module layout; the binding tables built
        // here drive all later name resolution.
        let symbol_names: BTreeSet<String> = symbols.keys().cloned().collect();
        let resolver = ImportResolver::new(&modules, &symbol_names);
        let resolved = resolver.resolve_all(&imports);
        let bindings = build_bindings(&symbols, &modules, &resolved);

        // Dynamic getattr objects carry resolution risk.
        for (module, name) in &dynamic_targets {
            if let Some(binding) = bindings.get(module).and_then(|b| b.get(name)) {
                let target = match binding {
                    BindingTarget::Def(qname) => Some(qname.clone()),
                    BindingTarget::Import { local, .. } => Some(local.clone()),
                };
                if let Some(qname) = target {
                    if let Some(symbol) = symbols.get_mut(&qname) {
                        symbol.dynamic_risk = true;
                    }
                }
            }
        }

        // Stage 6: entrypoint recognition. Every enabled plugin runs
        // over every symbol; all matching reasons are recorded, and the
        // symbol's module becomes a root for orphan detection.
        let mut entry_symbols: BTreeSet<String> = BTreeSet::new();
        let mut entry_modules: BTreeSet<String> = BTreeSet::new();
        for (qname, symbol) in symbols.iter_mut() {
            let reasons = registry.recognize(symbol);
            if !reasons.is_empty() {
                symbol.is_entrypoint = true;
                symbol.entrypoint_reasons = reasons;
                entry_symbols.insert(qname.clone());
                if let Some(module) = owning_module(qname, &modules) {
                    entry_modules.insert(module.to_string());
                }
            }
        }
        for (module, names) in &main_blocks {
            entry_modules.insert(module.clone());
            for name in names {
                let qname = format!("{}.{}", module, name);
                if let Some(symbol) = symbols.get_mut(&qname) {
                    if symbol.kind == SymbolKind::Function {
                        symbol.is_entrypoint = true;
                        symbol
                            .entrypoint_reasons
                            .push("main-block:__main__".to_string());
                        entry_symbols.insert(qname);
                    }
                }
            }
        }
        for extra in &self.config.entrypoints.extra {
            entry_symbols.insert(extra.clone());
            if let Some(symbol) = symbols.get_mut(extra) {
                symbol.is_entrypoint = true;
                symbol
                    .entrypoint_reasons
                    .push("config:entrypoints.extra".to_string());
            }
            if let Some(module) = owning_module(extra, &modules) {
                entry_modules.insert(module.to_string());
            } else if modules.contains_key(extra) {
                entry_modules.insert(extra.clone());
            }
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        // Stage 7: reachability. Every symbol in a main-block module is
        // a root; its top-level code runs on execution.
        let mut seeds = entry_symbols.clone();
        for qname in symbols.keys() {
            if let Some(module) = owning_module(qname, &modules) {
                if main_blocks.contains_key(module) {
                    seeds.insert(qname.clone());
                }
            }
        }
        let engine = ReachabilityEngine::new(&symbols, &modules, &resolved, &bindings);
        let mut reach = engine.run(&usages, &seeds, &entry_modules);
        diagnostics.extend(reach.diagnostics.iter().cloned());

        // A ForeignKey("users.id") reference names a table; translate
        // it to the model class that declared __tablename__ = 'users'.
        for (class_name, table) in &model_tables {
            if reach.orm_names.contains(table) {
                reach.orm_names.insert(class_name.clone());
            }
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        // Symbols referenced from entrypoint-pattern decorators, e.g.
        // the `shared_task` import behind `@shared_task`.
        let name_resolver = NameResolver {
            symbols: &symbols,
            bindings: &bindings,
        };
        let mut decorator_referenced: BTreeSet<String> = BTreeSet::new();
        for usage in &usages {
            if usage.kind != UsageKind::DecoratorRef {
                continue;
            }
            if !registry.chain_is_entrypoint_decorator(usage.chain()) {
                continue;
            }
            for target in name_resolver.resolve_chain(&usage.module, usage.chain()) {
                decorator_referenced.insert(target);
            }
        }

        // Stage 8: scoring. Each symbol gets its confidence and reason
        // trace from the frozen reachability result; nothing is mutated
        // past this point.
        let mut nodes: Vec<DependencyNode> = Vec::new();
        for (qname, symbol) in &symbols {
            let module = owning_module(qname, &modules);
            let context = ScoreContext {
                orphaned_file: module.map_or(false, |m| reach.orphaned_modules.contains(m)),
                module_reachable: module.map_or(false, |m| reach.reachable_modules.contains(m)),
                decorator_referenced: decorator_referenced.contains(qname),
            };
            let (confidence, reasons) = scorer.score(symbol, &reach, context);
            nodes.push(DependencyNode {
                symbol: symbol.clone(),
                confidence,
                reachable: reach.reachable_symbols.contains(qname),
                reasons,
                usage_count: reach.usage_count(qname),
            });
        }

        debug!(symbols = nodes.len(), "scoring complete");
        Ok(build_report(
            nodes,
            entry_symbols.into_iter().collect(),
            reach.orphaned_modules.len(),
            diagnostics,
        ))
    }
}

fn analyze_file(
    file: &SourceFile,
    noqa_patterns: &[String],
    timeout: Option<Duration>,
) -> FileAnalysis {
    // Determine the dotted module path from the relative file path.
    let module = module_path(&file.rel).unwrap_or_else(|| file.rel.replace('/', "."));
    let is_package = file.rel.ends_with("__init__.py");
    let mut record = ModuleRecord {
        file: file.rel.clone(),
        module,
        is_package,
        has_main_block: false,
        parse_failed: false,
    };
    let mut diagnostics = Vec::new();

    // Read the file. An unreadable file is skipped with a diagnostic
    // and never counted as orphaned.
    let source = match std::fs::read_to_string(&file.path) {
        Ok(source) => source,
        Err(err) => {
            diagnostics.push(Diagnostic {
                file: file.rel.clone(),
                line: 0,
                kind: DiagnosticKind::Io,
                message: err.to_string(),
            });
            record.parse_failed = true;
            return empty_analysis(record, diagnostics);
        }
    };

    // Parse the Python source into an AST. A syntax error excludes the
    // file from the graph but does not abort the run.
    let started = Instant::now();
    let parsed = parse(&source, Mode::Module, &file.rel);
    let tree = match parsed {
        Ok(tree) => tree,
        Err(err) => {
            diagnostics.push(Diagnostic {
                file: file.rel.clone(),
                line: 0,
                kind: DiagnosticKind::Parse,
                message: err.to_string(),
            });
            record.parse_failed = true;
            return empty_analysis(record, diagnostics);
        }
    };
    if let Some(budget) = timeout {
        if started.elapsed() > budget {
            diagnostics.push(Diagnostic {
                file: file.rel.clone(),
                line: 0,
                kind: DiagnosticKind::Timeout,
                message: format!("parse exceeded {}ms budget", budget.as_millis()),
            });
            record.parse_failed = true;
            return empty_analysis(record, diagnostics);
        }
    }

    let body = match &tree {
        rustpython_ast::Mod::Module(module) => &module.body,
        _ => {
            record.parse_failed = true;
            return empty_analysis(record, diagnostics);
        }
    };

    // Build the line index for mapping byte offsets to positions, and
    // scan for suppression comments.
    let line_index = LineIndex::new(&source);
    let noqa_index = noqa::scan(&source, noqa_patterns);

    // Detect the `if __name__ == "__main__"` block; the names called
    // there are execution roots.
    let main_names = detect_main_block(body);
    record.has_main_block = main_names.is_some();

    // Run the collector over the tree, then stamp each definition with
    // the suppression codes in effect on its line.
    let mut collector = Collector::new(file.rel.clone(), record.module.clone(), &line_index);
    collector.collect(body);

    let mut symbols = collector.definitions;
    for symbol in &mut symbols {
        if let Some(codes) = noqa_index.get(&symbol.location.line) {
            symbol.noqa_codes = codes.clone();
        }
    }
    diagnostics.extend(collector.diagnostics);

    FileAnalysis {
        record,
        symbols,
        usages: collector.usages,
        imports: collector.imports,
        diagnostics,
        main_names,
        dynamic_targets: collector.dynamic_targets,
        model_tables: collector.model_tables,
    }
}

fn empty_analysis(record: ModuleRecord, diagnostics: Vec<Diagnostic>) -> FileAnalysis {
    FileAnalysis {
        record,
        symbols: Vec::new(),
        usages: Vec::new(),
        imports: Vec::new(),
        diagnostics,
        main_names: None,
        dynamic_targets: Vec::new(),
        model_tables: Vec::new(),
    }
}

/// Expands each class's direct base list to the transitive in-project
/// closure, then mirrors the closure onto the class's methods. Plugin
/// predicates stay pure functions of the symbol this way.
fn expand_base_closure(symbols: &mut BTreeMap<String, Symbol>) {
    let mut direct: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut by_leaf: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (qname, symbol) in symbols.iter() {
        if symbol.kind == SymbolKind::Class {
            direct.insert(qname.clone(), symbol.parent_class_bases.clone());
            by_leaf
                .entry(symbol.name.clone())
                .or_default()
                .push(qname.clone());
        }
    }

    let mut expanded: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (qname, bases) in &direct {
        let mut closure: BTreeSet<String> = bases.iter().cloned().collect();
        let mut worklist: Vec<String> = bases
            .iter()
            .filter_map(|b| b.rsplit('.').next().map(str::to_string))
            .collect();
        let mut seen_leaves: BTreeSet<String> = BTreeSet::new();
        while let Some(leaf) = worklist.pop() {
            if !seen_leaves.insert(leaf.clone()) {
                continue;
            }
            for class_qname in by_leaf.get(&leaf).into_iter().flatten() {
                for base in direct.get(class_qname).into_iter().flatten() {
                    if closure.insert(base.clone()) {
                        if let Some(base_leaf) = base.rsplit('.').next() {
                            worklist.push(base_leaf.to_string());
                        }
                    }
                }
            }
        }
        expanded.insert(qname.clone(), closure.into_iter().collect());
    }

    for symbol in symbols.values_mut() {
        match symbol.kind {
            SymbolKind::Class => {
                if let Some(closure) = expanded.get(&symbol.qualified_name) {
                    symbol.parent_class_bases = closure.clone();
                }
            }
            SymbolKind::Method => {
                if let Some(parent) = symbol.parent_class.clone() {
                    if let Some(closure) = expanded.get(&parent) {
                        symbol.parent_class_bases = closure.clone();
                    }
                }
            }
            _ => {}
        }
    }
}
