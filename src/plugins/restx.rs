use super::FrameworkPlugin;
use crate::symbols::{Symbol, SymbolKind};

/// HTTP verbs dispatched by the framework on Resource subclasses.
const HTTP_METHODS: [&str; 7] = ["get", "post", "put", "delete", "patch", "head", "options"];

/// Recognizes Flask-RESTPlus / RESTX Resource handler methods: a method
/// named after an HTTP verb on a class that (transitively) inherits from
/// `Resource`.
pub struct RestxPlugin;

impl FrameworkPlugin for RestxPlugin {
    fn name(&self) -> &'static str {
        "flask-restplus"
    }

    fn match_symbol(&self, symbol: &Symbol) -> Option<String> {
        if symbol.kind != SymbolKind::Method {
            return None;
        }
        if !HTTP_METHODS.contains(&symbol.name.as_str()) {
            return None;
        }
        let inherits_resource = symbol
            .parent_class_bases
            .iter()
            .any(|base| base.rsplit('.').next() == Some("Resource"));
        if inherits_resource {
            return Some(format!("flask-restplus:Resource.{}", symbol.name));
        }
        None
    }
}
