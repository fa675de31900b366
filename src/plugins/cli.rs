use super::{decorator_matches, FrameworkPlugin};
use crate::symbols::Symbol;

const PATTERNS: [&str; 2] = ["*.command", "*.group"];

fn match_cli(symbol: &Symbol, plugin: &str) -> Option<String> {
    for pattern in PATTERNS {
        if symbol
            .decorators
            .iter()
            .any(|decorator| decorator_matches(pattern, decorator))
        {
            return Some(format!("{}:{}", plugin, pattern));
        }
    }
    None
}

/// Recognizes Click command and group callbacks.
pub struct ClickPlugin;

impl FrameworkPlugin for ClickPlugin {
    fn name(&self) -> &'static str {
        "click"
    }

    fn match_symbol(&self, symbol: &Symbol) -> Option<String> {
        match_cli(symbol, "click")
    }

    fn decorator_patterns(&self) -> &'static [&'static str] {
        &PATTERNS
    }
}

/// Recognizes Typer command and group callbacks.
pub struct TyperPlugin;

impl FrameworkPlugin for TyperPlugin {
    fn name(&self) -> &'static str {
        "typer"
    }

    fn match_symbol(&self, symbol: &Symbol) -> Option<String> {
        match_cli(symbol, "typer")
    }

    fn decorator_patterns(&self) -> &'static [&'static str] {
        &PATTERNS
    }
}
