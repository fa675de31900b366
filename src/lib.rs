// Library root: exposes the engine for embedding and for the
// integration tests.

/// The orchestrator: `Deadwood::analyze(root) -> Report` plus
/// cooperative cancellation.
pub mod analyzer;

/// Configuration document loading and defaults.
pub mod config;

/// Main-block (`if __name__ == "__main__"`) detection.
pub mod entry_point;

/// Fatal error types; recoverable problems become report diagnostics.
pub mod error;

/// Suppression-comment index (`# noqa`, `# type: ignore`).
pub mod noqa;

/// Entrypoint recognizer plugins (flask, celery, restx, sqlalchemy,
/// pydantic, pytest, click, typer).
pub mod plugins;

/// Call/import/containment graphs and fixed-point reachability.
pub mod reachability;

/// The deterministic results document.
pub mod report;

/// Import resolution against the project layout and name binding tables.
pub mod resolver;

/// The confidence scorer and its reason traces.
pub mod scoring;

/// Core data model: symbols, usages, imports, diagnostics.
pub mod symbols;

/// Byte-offset line index and path helpers.
pub mod utils;

/// The per-file AST collector.
pub mod visitor;

/// Source tree walking with include/exclude globs.
pub mod walker;
