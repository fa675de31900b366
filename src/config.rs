use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Engine configuration, loaded from a JSON document. Every section has
/// serde defaults so a partial (or absent) document is valid; a document
/// that fails to deserialize is a fatal [`Error::Config`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub analysis: AnalysisConfig,
    pub linting: LintingConfig,
    pub entrypoints: EntrypointsConfig,
    pub plugins: PluginsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Include globs, matched against repository-relative paths.
    pub include: Vec<String>,
    /// Exclude globs; take precedence over includes.
    pub exclude: Vec<String>,
    /// Optional per-file parse budget in milliseconds. Files exceeding it
    /// are dropped with a diagnostic. Unset means unbounded.
    pub per_file_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LintingConfig {
    /// Honor suppression comments when scoring.
    pub respect_noqa: bool,
    /// Trailing-comment markers that count as suppressions.
    pub noqa_patterns: Vec<String>,
    /// Decorator patterns whose carriers are never strong candidates,
    /// e.g. `@pytest.fixture` or `@pytest.mark.*`.
    pub ignore_decorators: Vec<String>,
    /// Name globs whose carriers are never strong candidates.
    pub ignore_names: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EntrypointsConfig {
    /// Additional entrypoint qualified names supplied externally (for
    /// example by an infrastructure-file scan).
    pub extra: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    /// Enabled entrypoint recognizer plugins.
    pub enabled: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            analysis: AnalysisConfig::default(),
            linting: LintingConfig::default(),
            entrypoints: EntrypointsConfig::default(),
            plugins: PluginsConfig::default(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            include: vec!["**/*.py".to_string()],
            exclude: vec![
                "**/__pycache__/**".to_string(),
                "**/tests/**".to_string(),
                "**/test_*.py".to_string(),
                "**/*_test.py".to_string(),
                "**/conftest.py".to_string(),
                "**/migrations/**".to_string(),
                "**/alembic/**".to_string(),
                "**/.venv/**".to_string(),
                "**/venv/**".to_string(),
                "**/.git/**".to_string(),
                "**/node_modules/**".to_string(),
                "**/build/**".to_string(),
                "**/dist/**".to_string(),
            ],
            per_file_timeout_ms: None,
        }
    }
}

impl Default for LintingConfig {
    fn default() -> Self {
        Self {
            respect_noqa: true,
            noqa_patterns: vec!["# noqa".to_string(), "# type: ignore".to_string()],
            ignore_decorators: Vec::new(),
            ignore_names: Vec::new(),
        }
    }
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            enabled: vec![
                "flask".to_string(),
                "celery".to_string(),
                "flask-restplus".to_string(),
                "sqlalchemy".to_string(),
                "pydantic".to_string(),
                "pytest".to_string(),
                "click".to_string(),
                "typer".to_string(),
            ],
        }
    }
}

impl Config {
    /// Loads a configuration document from disk. Any read or parse
    /// failure is fatal.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }
}
