use super::{decorator_matches, FrameworkPlugin};
use crate::symbols::{Symbol, SymbolKind};

const PATTERNS: [&str; 6] = [
    "*.route",
    "*.before_request",
    "*.after_request",
    "*.errorhandler",
    "*.teardown_*",
    "*.cli.command",
];

/// Recognizes Flask route handlers, request hooks, error handlers, CLI
/// commands, and the `create_app` factory.
pub struct FlaskPlugin;

impl FrameworkPlugin for FlaskPlugin {
    fn name(&self) -> &'static str {
        "flask"
    }

    fn match_symbol(&self, symbol: &Symbol) -> Option<String> {
        for pattern in PATTERNS {
            if symbol
                .decorators
                .iter()
                .any(|decorator| decorator_matches(pattern, decorator))
            {
                return Some(format!("flask:{}", pattern));
            }
        }
        if symbol.kind == SymbolKind::Function && symbol.name == "create_app" {
            return Some("flask:create_app".to_string());
        }
        None
    }

    fn decorator_patterns(&self) -> &'static [&'static str] {
        &PATTERNS
    }
}
