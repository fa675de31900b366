use super::{decorator_matches, FrameworkPlugin};
use crate::symbols::Symbol;

const PATTERNS: [&str; 3] = ["validates", "hybrid_property", "event.listens_for"];

/// Recognizes SQLAlchemy ORM hooks: column validators, hybrid
/// properties, and event listeners.
pub struct SqlAlchemyPlugin;

impl FrameworkPlugin for SqlAlchemyPlugin {
    fn name(&self) -> &'static str {
        "sqlalchemy"
    }

    fn match_symbol(&self, symbol: &Symbol) -> Option<String> {
        for pattern in PATTERNS {
            if symbol
                .decorators
                .iter()
                .any(|decorator| decorator_matches(pattern, decorator))
            {
                return Some(format!("sqlalchemy:{}", pattern));
            }
        }
        None
    }

    fn decorator_patterns(&self) -> &'static [&'static str] {
        &PATTERNS
    }
}
