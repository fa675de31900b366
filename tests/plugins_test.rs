use deadwood::plugins::PluginRegistry;
use deadwood::symbols::{Location, Symbol, SymbolKind};

fn all_plugins() -> PluginRegistry {
    PluginRegistry::with_enabled(&[
        "flask".to_string(),
        "celery".to_string(),
        "flask-restplus".to_string(),
        "sqlalchemy".to_string(),
        "pydantic".to_string(),
        "pytest".to_string(),
        "click".to_string(),
        "typer".to_string(),
    ])
}

fn symbol(kind: SymbolKind, name: &str) -> Symbol {
    Symbol {
        qualified_name: format!("mod.{}", name),
        name: name.to_string(),
        kind,
        location: Location {
            file: "mod.py".to_string(),
            line: 1,
            col: 0,
        },
        decorators: Vec::new(),
        is_entrypoint: false,
        entrypoint_reasons: Vec::new(),
        parent_class: None,
        parent_class_bases: Vec::new(),
        noqa_codes: Default::default(),
        dynamic_risk: false,
    }
}

fn decorated(kind: SymbolKind, name: &str, decorator: &str) -> Symbol {
    let mut s = symbol(kind, name);
    s.decorators.push(decorator.to_string());
    s
}

#[test]
fn test_flask_decorators() {
    let registry = all_plugins();
    for decorator in [
        "app.route('/')",
        "bp.route('/x', methods=['POST'])",
        "app.before_request",
        "app.errorhandler(404)",
        "app.teardown_appcontext",
        "app.cli.command('sync')",
    ] {
        let s = decorated(SymbolKind::Function, "handler", decorator);
        let reasons = registry.recognize(&s);
        assert!(
            reasons.iter().any(|r| r.starts_with("flask:")),
            "{} not recognized",
            decorator
        );
    }
}

#[test]
fn test_flask_factory_function() {
    let registry = all_plugins();
    let reasons = registry.recognize(&symbol(SymbolKind::Function, "create_app"));
    assert!(reasons.contains(&"flask:create_app".to_string()));
}

#[test]
fn test_celery_task_and_signals() {
    let registry = all_plugins();
    let task = decorated(SymbolKind::Function, "send", "celery.task(bind=True)");
    assert!(registry
        .recognize(&task)
        .iter()
        .any(|r| r.starts_with("celery:")));

    let signal = decorated(SymbolKind::Function, "on_ready", "worker_ready.connect");
    let reasons = registry.recognize(&signal);
    assert!(reasons.contains(&"celery:worker_ready.connect".to_string()));

    let not_signal = decorated(SymbolKind::Function, "on_x", "random_thing.connect");
    assert!(registry.recognize(&not_signal).is_empty());
}

#[test]
fn test_restx_resource_method() {
    let registry = all_plugins();
    let mut get = symbol(SymbolKind::Method, "get");
    get.parent_class = Some("mod.UserResource".to_string());
    get.parent_class_bases = vec!["Resource".to_string()];
    assert!(registry
        .recognize(&get)
        .contains(&"flask-restplus:Resource.get".to_string()));

    // Same method on a class that does not inherit Resource.
    let mut plain = symbol(SymbolKind::Method, "get");
    plain.parent_class = Some("mod.Bag".to_string());
    assert!(registry.recognize(&plain).is_empty());

    // Non-HTTP method names are not entrypoints.
    let mut other = symbol(SymbolKind::Method, "fetch");
    other.parent_class_bases = vec!["Resource".to_string()];
    assert!(registry.recognize(&other).is_empty());
}

#[test]
fn test_sqlalchemy_hooks() {
    let registry = all_plugins();
    let validator = decorated(SymbolKind::Method, "check_email", "validates('email')");
    assert!(registry
        .recognize(&validator)
        .contains(&"sqlalchemy:validates".to_string()));

    let listener = decorated(
        SymbolKind::Function,
        "on_connect",
        "event.listens_for(Engine, 'connect')",
    );
    assert!(registry
        .recognize(&listener)
        .contains(&"sqlalchemy:event.listens_for".to_string()));
}

#[test]
fn test_pydantic_model_and_validators() {
    let registry = all_plugins();
    let mut model = symbol(SymbolKind::Class, "UserModel");
    model.parent_class_bases = vec!["BaseModel".to_string()];
    assert!(registry
        .recognize(&model)
        .contains(&"pydantic:BaseModel".to_string()));

    let validator = decorated(
        SymbolKind::Method,
        "check_name",
        "field_validator('name')",
    );
    assert!(registry
        .recognize(&validator)
        .contains(&"pydantic:field_validator".to_string()));
}

#[test]
fn test_pytest_naming_and_fixture() {
    let registry = all_plugins();
    assert!(registry
        .recognize(&symbol(SymbolKind::Function, "test_login"))
        .contains(&"pytest:test_*".to_string()));
    assert!(registry
        .recognize(&symbol(SymbolKind::Class, "TestLogin"))
        .contains(&"pytest:Test*".to_string()));
    let fixture = decorated(SymbolKind::Function, "db_session", "pytest.fixture");
    assert!(registry
        .recognize(&fixture)
        .contains(&"pytest:pytest.fixture".to_string()));
}

#[test]
fn test_click_and_typer_commands() {
    let registry = all_plugins();
    let command = decorated(SymbolKind::Function, "sync", "cli.command()");
    let reasons = registry.recognize(&command);
    assert!(reasons.contains(&"click:*.command".to_string()));
    assert!(reasons.contains(&"typer:*.command".to_string()));
}

#[test]
fn test_disabled_plugins_do_not_match() {
    let registry = PluginRegistry::with_enabled(&["flask".to_string()]);
    let task = decorated(SymbolKind::Function, "send", "shared_task");
    assert!(registry.recognize(&task).is_empty());

    let test_fn = symbol(SymbolKind::Function, "test_x");
    assert!(registry.recognize(&test_fn).is_empty());
}

#[test]
fn test_all_reasons_recorded() {
    let registry = all_plugins();
    // A test_* function that is also a fixture matches pytest once per
    // rule path, first rule wins within the plugin, but distinct
    // plugins all record.
    let mut s = decorated(SymbolKind::Function, "test_cmd", "cli.command()");
    s.decorators.push("app.route('/')".to_string());
    let reasons = registry.recognize(&s);
    assert!(reasons.iter().any(|r| r.starts_with("flask:")));
    assert!(reasons.iter().any(|r| r.starts_with("pytest:")));
    assert!(reasons.iter().any(|r| r.starts_with("click:")));
}
