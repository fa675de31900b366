// Entrypoint recognizer plugins. Each plugin is a pure predicate over a
// symbol's decorators, base classes, name, and kind; the registry runs
// every enabled plugin and records all matching reasons.

/// Flask routes, hooks, error handlers, and CLI commands.
pub mod flask;

/// Celery tasks and signal handlers.
pub mod celery;

/// Flask-RESTPlus / RESTX Resource HTTP method handlers.
pub mod restx;

/// SQLAlchemy ORM hooks.
pub mod sqlalchemy;

/// Pydantic validators and models.
pub mod pydantic;

/// Pytest tests and fixtures.
pub mod pytest;

/// Click and Typer CLI commands.
pub mod cli;

use crate::symbols::Symbol;

/// A framework recognizer. `match_symbol` returns a reason string
/// (`<plugin>:<pattern>`) when the symbol is an entrypoint for this
/// framework.
pub trait FrameworkPlugin: Send + Sync {
    fn name(&self) -> &'static str;

    fn match_symbol(&self, symbol: &Symbol) -> Option<String>;

    /// Decorator patterns this plugin treats as entrypoint markers; used
    /// by the scorer for decorator-based penalties.
    fn decorator_patterns(&self) -> &'static [&'static str] {
        &[]
    }
}

/// Holds the enabled plugins. Built-ins are instantiated from the
/// configured `plugins.enabled` list; unknown names are ignored.
pub struct PluginRegistry {
    plugins: Vec<Box<dyn FrameworkPlugin>>,
}

impl PluginRegistry {
    pub fn with_enabled(enabled: &[String]) -> Self {
        let mut plugins: Vec<Box<dyn FrameworkPlugin>> = Vec::new();
        for name in enabled {
            match name.as_str() {
                "flask" => plugins.push(Box::new(flask::FlaskPlugin)),
                "celery" => plugins.push(Box::new(celery::CeleryPlugin)),
                "flask-restplus" | "flask-restx" => plugins.push(Box::new(restx::RestxPlugin)),
                "sqlalchemy" => plugins.push(Box::new(sqlalchemy::SqlAlchemyPlugin)),
                "pydantic" => plugins.push(Box::new(pydantic::PydanticPlugin)),
                "pytest" => plugins.push(Box::new(pytest::PytestPlugin)),
                "click" => plugins.push(Box::new(cli::ClickPlugin)),
                "typer" => plugins.push(Box::new(cli::TyperPlugin)),
                _ => {}
            }
        }
        Self { plugins }
    }

    /// Runs every plugin; returns all matching reasons in registration
    /// order.
    pub fn recognize(&self, symbol: &Symbol) -> Vec<String> {
        self.plugins
            .iter()
            .filter_map(|plugin| plugin.match_symbol(symbol))
            .collect()
    }

    /// Names of plugins whose decorator patterns match any of the given
    /// normalized decorator strings.
    pub fn decorator_plugin_matches(&self, decorators: &[String]) -> Vec<&'static str> {
        let mut matched = Vec::new();
        for plugin in &self.plugins {
            let hit = plugin.decorator_patterns().iter().any(|pattern| {
                decorators
                    .iter()
                    .any(|decorator| decorator_matches(pattern, decorator))
            });
            if hit {
                matched.push(plugin.name());
            }
        }
        matched
    }

    /// Whether a decorator chain matches any enabled plugin's entrypoint
    /// decorator patterns. Used to down-weight symbols referenced from
    /// such decorators.
    pub fn chain_is_entrypoint_decorator(&self, chain: &str) -> bool {
        self.plugins.iter().any(|plugin| {
            plugin
                .decorator_patterns()
                .iter()
                .any(|pattern| decorator_matches(pattern, chain))
        })
    }
}

/// Suffix-of-dotted-chain matching for decorator patterns. A pattern
/// `*.X` matches a decorator whose last chain segment equals `X`;
/// segments may carry `*` wildcards (`*.teardown_*`). A pattern without
/// the leading `*.` matches when its segments equal the chain's trailing
/// segments, so `shared_task` matches both `shared_task` and
/// `celery.shared_task`.
pub fn decorator_matches(pattern: &str, decorator: &str) -> bool {
    let chain = decorator_chain(decorator);
    let chain_segments: Vec<&str> = chain.split('.').collect();

    let pattern_segments: Vec<&str> = pattern.split('.').collect();
    let tail: &[&str] = if pattern_segments.first() == Some(&"*") {
        &pattern_segments[1..]
    } else {
        &pattern_segments
    };
    if tail.is_empty() || chain_segments.len() < tail.len() {
        return false;
    }

    let offset = chain_segments.len() - tail.len();
    tail.iter()
        .zip(&chain_segments[offset..])
        .all(|(pattern_segment, chain_segment)| segment_matches(pattern_segment, chain_segment))
}

/// The dotted chain of a normalized decorator string: the part before
/// the argument list, without any leading `@`.
pub fn decorator_chain(decorator: &str) -> &str {
    let trimmed = decorator.trim_start_matches('@');
    match trimmed.find('(') {
        Some(pos) => &trimmed[..pos],
        None => trimmed,
    }
}

fn segment_matches(pattern: &str, segment: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(pos) = pattern.find('*') {
        let (prefix, suffix) = (&pattern[..pos], &pattern[pos + 1..]);
        return segment.len() >= prefix.len() + suffix.len()
            && segment.starts_with(prefix)
            && segment.ends_with(suffix);
    }
    pattern == segment
}

/// Matches a user-configured `ignore_decorators` entry (`@pytest.fixture`,
/// `@pytest.mark.*`) against a normalized decorator string.
pub fn ignored_decorator_matches(pattern: &str, decorator: &str) -> bool {
    let pattern = pattern.trim_start_matches('@');
    let chain = decorator_chain(decorator);
    match pattern.strip_suffix(".*") {
        Some(prefix) => chain == prefix || chain.starts_with(&format!("{}.", prefix)),
        None => match pattern.strip_suffix('*') {
            Some(prefix) => chain.starts_with(prefix),
            None => chain == pattern,
        },
    }
}
