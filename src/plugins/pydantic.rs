use super::{decorator_matches, FrameworkPlugin};
use crate::symbols::{Symbol, SymbolKind};

const PATTERNS: [&str; 3] = ["field_validator", "model_validator", "computed_field"];

/// Recognizes Pydantic validator methods and BaseModel subclasses, whose
/// fields and hooks the library invokes reflectively.
pub struct PydanticPlugin;

impl FrameworkPlugin for PydanticPlugin {
    fn name(&self) -> &'static str {
        "pydantic"
    }

    fn match_symbol(&self, symbol: &Symbol) -> Option<String> {
        for pattern in PATTERNS {
            if symbol
                .decorators
                .iter()
                .any(|decorator| decorator_matches(pattern, decorator))
            {
                return Some(format!("pydantic:{}", pattern));
            }
        }
        if symbol.kind == SymbolKind::Class {
            let is_model = symbol
                .parent_class_bases
                .iter()
                .any(|base| base.rsplit('.').next() == Some("BaseModel"));
            if is_model {
                return Some("pydantic:BaseModel".to_string());
            }
        }
        None
    }

    fn decorator_patterns(&self) -> &'static [&'static str] {
        &PATTERNS
    }
}
