use super::{decorator_matches, FrameworkPlugin};
use crate::symbols::{Symbol, SymbolKind};

const PATTERNS: [&str; 1] = ["pytest.fixture"];

/// Recognizes code the test runner discovers by naming convention:
/// `test_*` functions, `Test*` classes, and pytest fixtures.
pub struct PytestPlugin;

impl FrameworkPlugin for PytestPlugin {
    fn name(&self) -> &'static str {
        "pytest"
    }

    fn match_symbol(&self, symbol: &Symbol) -> Option<String> {
        match symbol.kind {
            SymbolKind::Function | SymbolKind::Method => {
                if symbol.name.starts_with("test_") {
                    return Some("pytest:test_*".to_string());
                }
            }
            SymbolKind::Class => {
                if symbol.name.starts_with("Test") {
                    return Some("pytest:Test*".to_string());
                }
            }
            _ => {}
        }
        for pattern in PATTERNS {
            if symbol
                .decorators
                .iter()
                .any(|decorator| decorator_matches(pattern, decorator))
            {
                return Some(format!("pytest:{}", pattern));
            }
        }
        None
    }

    fn decorator_patterns(&self) -> &'static [&'static str] {
        &PATTERNS
    }
}
