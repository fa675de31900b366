use crate::config::LintingConfig;
use crate::error::Error;
use crate::plugins::{ignored_decorator_matches, PluginRegistry};
use crate::reachability::Reachability;
use crate::symbols::{Symbol, SymbolKind};
use crate::walker::name_glob_set;
use globset::GlobSet;

/// Facts about a symbol's surroundings that the scorer needs but that
/// are not part of the symbol itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreContext {
    /// The symbol's file is orphaned.
    pub orphaned_file: bool,
    /// The symbol's module is reachable.
    pub module_reachable: bool,
    /// The symbol is referenced by a decorator expression that matches
    /// an entrypoint plugin pattern (e.g. the `shared_task` import used
    /// as `@shared_task`).
    pub decorator_referenced: bool,
}

/// Computes the 0-100 confidence and the ordered reason trace for each
/// symbol. The rule order is fixed; each rule contributes a signed delta
/// and one human-readable reason.
pub struct Scorer<'a> {
    linting: &'a LintingConfig,
    registry: &'a PluginRegistry,
    ignore_names: GlobSet,
}

impl<'a> Scorer<'a> {
    pub fn new(linting: &'a LintingConfig, registry: &'a PluginRegistry) -> Result<Self, Error> {
        Ok(Self {
            linting,
            registry,
            ignore_names: name_glob_set(&linting.ignore_names)?,
        })
    }

    pub fn score(
        &self,
        symbol: &Symbol,
        reach: &Reachability,
        context: ScoreContext,
    ) -> (u8, Vec<String>) {
        // Everything in an orphaned file is dead with certainty; no
        // other rule applies.
        if context.orphaned_file {
            return (
                100,
                vec![format!("Orphaned file: {}", symbol.location.file)],
            );
        }

        let mut reasons: Vec<String> = Vec::new();
        let base: i32 = match symbol.kind {
            SymbolKind::Function | SymbolKind::Method => 60,
            SymbolKind::Class => 55,
            SymbolKind::Variable => 60,
            SymbolKind::Import => 70,
        };
        let mut score = base;
        reasons.push(format!(
            "Base confidence for {}: +{}",
            kind_label(symbol.kind),
            base
        ));

        let usage_count = reach.usage_count(&symbol.qualified_name);
        let reachable = reach.reachable_symbols.contains(&symbol.qualified_name);
        // A model referenced only through the ORM (relationship
        // strings, ForeignKey tables, Model.query) is used even when no
        // resolvable usage exists.
        let orm_model = is_sqlalchemy_model(symbol);
        let orm_used = orm_model && reach.orm_names.contains(&symbol.name);

        if symbol.is_entrypoint {
            score -= 40;
            reasons.push(format!(
                "Marked as entrypoint ({}): -40",
                symbol.entrypoint_reasons.join(", ")
            ));
        } else if !reachable && usage_count < 5 && !orm_used {
            // Heavy usage outweighs a missing path from the entrypoint
            // set; see the usage rule below.
            score += 30;
            reasons.push("Not reachable from any entrypoint: +30".to_string());
        }

        if usage_count == 0 {
            // An entrypoint is invoked from outside, and an ORM-used
            // model is dispatched by the library; zero internal usages
            // are expected there, not suspicious.
            if !symbol.is_entrypoint && !orm_used {
                score += 20;
                reasons.push("No usages found: +20".to_string());
            }
        } else {
            let penalty = 40.min(10 * usage_count as i32);
            score -= penalty;
            reasons.push(format!("Used {} time(s): -{}", usage_count, penalty));
        }

        // Decorator-based plugin penalties, capped at -40. A plugin that
        // recognized the symbol counts, as does being the target of an
        // entrypoint-pattern decorator reference.
        let mut plugin_penalty = 20 * symbol.entrypoint_reasons.len() as i32;
        if context.decorator_referenced {
            plugin_penalty += 20;
        }
        let plugin_penalty = plugin_penalty.min(40);
        if plugin_penalty > 0 {
            score -= plugin_penalty;
            if context.decorator_referenced && symbol.entrypoint_reasons.is_empty() {
                reasons.push(format!(
                    "Referenced by entrypoint decorator: -{}",
                    plugin_penalty
                ));
            } else {
                reasons.push(format!(
                    "Entrypoint plugin decorator pattern: -{}",
                    plugin_penalty
                ));
            }
        }

        if let Some(ignored) = self.matched_ignored_decorator(symbol) {
            score -= 50;
            reasons.push(format!("Decorator in ignore list ({}): -50", ignored));
        }

        if symbol.is_dunder() {
            score -= 40;
            reasons.push("Dunder name: -40".to_string());
        } else if symbol.is_private() && context.module_reachable {
            score -= 10;
            reasons.push("Private name in reachable module: -10".to_string());
        }
        if !self.linting.ignore_names.is_empty() && self.ignore_names.is_match(&symbol.name) {
            score -= 50;
            reasons.push("Name matches ignore pattern: -50".to_string());
        }

        if orm_model {
            if orm_used {
                score -= 20;
                reasons.push("SQLAlchemy model with ORM usages: -20".to_string());
            } else if usage_count < 5 {
                score += 30;
                reasons.push("SQLAlchemy model with no ORM usages: +30".to_string());
            }
        }

        if self.linting.respect_noqa && !symbol.noqa_codes.is_empty() {
            score -= 50;
            reasons.push("Suppressed by noqa comment: -50".to_string());
        }

        let mut confidence = score.clamp(0, 100) as u8;
        if symbol.dynamic_risk && confidence > 50 {
            confidence = 50;
            reasons.push("Dynamic attribute access risk: capped at 50".to_string());
        }
        (confidence, reasons)
    }

    fn matched_ignored_decorator(&self, symbol: &Symbol) -> Option<&str> {
        for pattern in &self.linting.ignore_decorators {
            for decorator in &symbol.decorators {
                if ignored_decorator_matches(pattern, decorator) {
                    return Some(pattern.as_str());
                }
            }
        }
        None
    }

    /// Whether a decorator chain should mark its referenced symbols, per
    /// the enabled plugins.
    pub fn chain_is_entrypoint_decorator(&self, chain: &str) -> bool {
        self.registry.chain_is_entrypoint_decorator(chain)
    }
}

/// Base classes that mark a class as a SQLAlchemy model, matched on the
/// leaf segment so `db.Model` counts.
const MODEL_BASES: [&str; 4] = ["Model", "Base", "DeclarativeBase", "AbstractConcreteBase"];

fn is_sqlalchemy_model(symbol: &Symbol) -> bool {
    symbol.kind == SymbolKind::Class
        && symbol.parent_class_bases.iter().any(|base| {
            base.rsplit('.')
                .next()
                .map_or(false, |leaf| MODEL_BASES.contains(&leaf))
        })
}

fn kind_label(kind: SymbolKind) -> &'static str {
    match kind {
        SymbolKind::Function => "function",
        SymbolKind::Method => "method",
        SymbolKind::Class => "class",
        SymbolKind::Variable => "variable",
        SymbolKind::Import => "import",
    }
}
