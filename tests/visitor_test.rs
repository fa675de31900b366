use deadwood::symbols::{Diagnostic, ImportRecord, Symbol, SymbolKind, Usage, UsageKind};
use deadwood::utils::LineIndex;
use deadwood::visitor::Collector;
use rustpython_parser::{parse, Mode};

struct Collected {
    symbols: Vec<Symbol>,
    usages: Vec<Usage>,
    imports: Vec<ImportRecord>,
    diagnostics: Vec<Diagnostic>,
    dynamic_targets: Vec<String>,
    model_tables: Vec<(String, String)>,
}

fn collect(source: &str) -> Collected {
    let line_index = LineIndex::new(source);
    let tree = parse(source, Mode::Module, "mod.py").expect("parse failed");
    let body = match &tree {
        rustpython_ast::Mod::Module(module) => &module.body,
        _ => panic!("not a module"),
    };
    let mut collector = Collector::new("mod.py".to_string(), "mod".to_string(), &line_index);
    collector.collect(body);
    Collected {
        symbols: collector.definitions,
        usages: collector.usages,
        imports: collector.imports,
        diagnostics: collector.diagnostics,
        dynamic_targets: collector.dynamic_targets,
        model_tables: collector.model_tables,
    }
}

fn symbol<'a>(collected: &'a Collected, qname: &str) -> &'a Symbol {
    collected
        .symbols
        .iter()
        .find(|s| s.qualified_name == qname)
        .unwrap_or_else(|| panic!("no symbol {}", qname))
}

#[test]
fn test_definition_kinds() {
    let collected = collect(
        r#"import os
from json import dumps as to_json

LIMIT = 10

class Store:
    retries = 3

    def save(self):
        pass

def main():
    pass
"#,
    );

    assert_eq!(symbol(&collected, "mod.os").kind, SymbolKind::Import);
    assert_eq!(symbol(&collected, "mod.to_json").kind, SymbolKind::Import);
    assert_eq!(symbol(&collected, "mod.LIMIT").kind, SymbolKind::Variable);
    assert_eq!(symbol(&collected, "mod.Store").kind, SymbolKind::Class);
    assert_eq!(
        symbol(&collected, "mod.Store.retries").kind,
        SymbolKind::Variable
    );
    let save = symbol(&collected, "mod.Store.save");
    assert_eq!(save.kind, SymbolKind::Method);
    assert_eq!(save.parent_class.as_deref(), Some("mod.Store"));
    assert_eq!(symbol(&collected, "mod.main").kind, SymbolKind::Function);
}

#[test]
fn test_tuple_unpacking_defines_each_name() {
    let collected = collect("a, b = 1, 2\n");
    assert!(collected.symbols.iter().any(|s| s.qualified_name == "mod.a"));
    assert!(collected.symbols.iter().any(|s| s.qualified_name == "mod.b"));
}

#[test]
fn test_decorator_normalization() {
    let collected = collect(
        r#"@app.route('/x', methods=['POST'])
def index():
    pass

@register(make_key())
def handler():
    pass
"#,
    );
    assert_eq!(
        symbol(&collected, "mod.index").decorators,
        vec!["app.route('/x', methods=['POST'])".to_string()]
    );
    assert_eq!(
        symbol(&collected, "mod.handler").decorators,
        vec!["register(…)".to_string()]
    );
}

#[test]
fn test_decorator_argument_truncation() {
    let long = "a".repeat(80);
    let source = format!("@app.route('{}')\ndef index():\n    pass\n", long);
    let collected = collect(&source);
    let decorator = &symbol(&collected, "mod.index").decorators[0];
    let inner = decorator
        .strip_prefix("app.route(")
        .and_then(|d| d.strip_suffix(')'))
        .unwrap();
    assert_eq!(inner.chars().count(), 64);
}

#[test]
fn test_caller_attribution() {
    let collected = collect(
        r#"def outer():
    helper()

top_level = helper
"#,
    );
    let call = collected
        .usages
        .iter()
        .find(|u| u.kind == UsageKind::Call && u.name == "helper")
        .unwrap();
    assert_eq!(call.caller.as_deref(), Some("mod.outer"));

    let module_ref = collected
        .usages
        .iter()
        .find(|u| u.kind == UsageKind::NameRef && u.name == "helper")
        .unwrap();
    assert!(module_ref.caller.is_none());
}

#[test]
fn test_self_method_call_is_qualified() {
    let collected = collect(
        r#"class Store:
    def save(self):
        self.flush()

    def flush(self):
        pass
"#,
    );
    let call = collected
        .usages
        .iter()
        .find(|u| u.kind == UsageKind::Call && u.name == "flush")
        .unwrap();
    assert_eq!(call.attribute_chain.as_deref(), Some("mod.Store.flush"));
    assert_eq!(call.caller.as_deref(), Some("mod.Store.save"));
}

#[test]
fn test_getattr_literal_becomes_reference() {
    let collected = collect("value = getattr(config, 'timeout')\n");
    assert!(collected
        .usages
        .iter()
        .any(|u| u.kind == UsageKind::NameRef && u.name == "timeout"));
    assert!(collected.diagnostics.is_empty());
}

#[test]
fn test_getattr_dynamic_flags_object() {
    let collected = collect("def pick(registry, key):\n    return getattr(registry, key)\n");
    assert_eq!(collected.diagnostics.len(), 1);
    assert!(collected.dynamic_targets.contains(&"registry".to_string()));
}

#[test]
fn test_dunder_all_reexports() {
    let collected = collect(
        r#"__all__ = ["save", "load"]

def save():
    pass

def load():
    pass
"#,
    );
    assert!(collected
        .usages
        .iter()
        .any(|u| u.kind == UsageKind::NameRef && u.name == "save"));
    assert!(collected
        .usages
        .iter()
        .any(|u| u.kind == UsageKind::NameRef && u.name == "load"));
}

#[test]
fn test_framework_factory_reference() {
    let collected = collect("from flask import Flask\napp = Flask(__name__)\n");
    let synthetic = collected
        .usages
        .iter()
        .find(|u| u.kind == UsageKind::NameRef && u.name == "app")
        .expect("factory target not referenced");
    // Anchored at the value, not at the assignment target.
    let app = symbol(&collected, "mod.app");
    assert_ne!(synthetic.location, app.location);
}

#[test]
fn test_factory_function_reference() {
    let collected = collect("app = make_app()\n");
    assert!(collected
        .usages
        .iter()
        .any(|u| u.kind == UsageKind::NameRef && u.name == "app"));
}

#[test]
fn test_model_query_is_orm_reference() {
    let collected = collect("def list_users():\n    return User.query.all()\n");
    assert!(collected
        .usages
        .iter()
        .any(|u| u.kind == UsageKind::OrmRef && u.name == "User"));
}

#[test]
fn test_session_query_is_orm_reference() {
    let collected = collect("def fetch(session):\n    return session.query(User).all()\n");
    assert!(collected
        .usages
        .iter()
        .any(|u| u.kind == UsageKind::OrmRef && u.name == "User"));
}

#[test]
fn test_relationship_foreignkey_backref_strings() {
    let collected = collect(
        r#"class Post(db.Model):
    author = relationship('User', backref='posts')
    user_id = Column(ForeignKey('users.id'))
"#,
    );
    let orm_names: Vec<&str> = collected
        .usages
        .iter()
        .filter(|u| u.kind == UsageKind::OrmRef)
        .map(|u| u.name.as_str())
        .collect();
    assert!(orm_names.contains(&"User"));
    assert!(orm_names.contains(&"posts"));
    assert!(orm_names.contains(&"users"));
}

#[test]
fn test_tablename_maps_class_to_table() {
    let collected = collect("class User(db.Model):\n    __tablename__ = 'users'\n");
    assert_eq!(
        collected.model_tables,
        vec![("User".to_string(), "users".to_string())]
    );
}

#[test]
fn test_locals_do_not_leak_usages() {
    let collected = collect(
        r#"def compute(x):
    total = x + 1
    return total
"#,
    );
    assert!(!collected
        .usages
        .iter()
        .any(|u| u.name == "total" || u.name == "x"));
}

#[test]
fn test_future_import_skipped() {
    let collected = collect("from __future__ import annotations\n");
    assert!(collected.symbols.is_empty());
    assert!(collected.imports.is_empty());
}

#[test]
fn test_annotations_are_references() {
    let collected = collect(
        r#"from models import User

def load(user_id: int) -> User:
    ...
"#,
    );
    assert!(collected
        .usages
        .iter()
        .any(|u| u.kind == UsageKind::NameRef && u.name == "User"));
}

#[test]
fn test_registry_call_keeps_handler_alive() {
    let collected = collect(
        r#"def on_save(sender):
    pass

post_save.connect(on_save)
"#,
    );
    assert!(collected
        .usages
        .iter()
        .any(|u| u.kind == UsageKind::NameRef && u.name == "on_save"));
}

#[test]
fn test_import_records_capture_relative_level() {
    let collected = collect("from ..common import helpers\n");
    assert_eq!(collected.imports.len(), 1);
    assert_eq!(collected.imports[0].level, 2);
    assert_eq!(collected.imports[0].module_text, "common");
    assert_eq!(collected.imports[0].local_name, "helpers");
}

#[test]
fn test_star_import_record() {
    let collected = collect("from utils import *\n");
    assert_eq!(collected.imports.len(), 1);
    assert!(collected.imports[0].is_star);
    assert!(collected.symbols.is_empty());
}
