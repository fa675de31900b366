use anyhow::Result;
use clap::Parser;
use colored::*;
use deadwood::analyzer::Deadwood;
use deadwood::config::Config;
use deadwood::report::Report;
use std::path::PathBuf;

/// Command line interface configuration using `clap`.
/// Dead-code analysis for decorator-heavy Python web applications.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Root of the Python source tree to analyze.
    /// This is the directory where the scan begins; every file matching
    /// the configured include globs under it is parsed.
    path: PathBuf,

    /// Configuration document (JSON).
    /// Controls include/exclude globs, noqa handling, ignore lists,
    /// extra entrypoints, and enabled plugins. Defaults apply when
    /// omitted; a malformed document is fatal before any work starts.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Emit the raw results document instead of the human summary.
    /// The JSON output is deterministic and meant for machine
    /// consumption by downstream tooling.
    #[arg(long)]
    json: bool,

    /// Hide items below this confidence in the human summary.
    /// Display-only; the engine always computes the full report.
    #[arg(long, default_value_t = 50)]
    min_confidence: u8,
}

/// Main entry point of the application.
///
/// Handles argument parsing, configuration loading, running the engine,
/// and output formatting.
fn main() -> Result<()> {
    // Logging goes to stderr so the JSON output stays clean on stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Parse command line arguments using the Cli struct definition.
    let cli = Cli::parse();

    // Load the configuration document if one was given; a parse failure
    // here is fatal, surfaced before any analysis work.
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    // Run the analysis on the provided path and propagate any fatal
    // error with `?`.
    let engine = Deadwood::new(config);
    let report = engine.analyze(&cli.path)?;

    // Machine output: the raw results document, pretty-printed.
    if cli.json {
        println!("{}", report.to_json()?);
        return Ok(());
    }
    // Human output: a colored summary grouped by suggested action.
    print_summary(&report, cli.min_confidence);
    Ok(())
}

fn print_summary(report: &Report, min_confidence: u8) {
    println!("\n{}", "Dead Code Analysis".bold());
    println!("==================\n");

    println!("Summary:");
    println!(" * Candidates: {}", report.summary.total);
    println!(
        " * High confidence (delete): {}",
        report.summary.high.to_string().red()
    );
    println!(
        " * Medium confidence (review): {}",
        report.summary.medium.to_string().yellow()
    );
    println!(" * Low confidence (keep): {}", report.summary.low);
    println!(" * Orphaned files: {}", report.summary.orphaned_files);
    println!(" * Entrypoints: {}", report.entrypoints.len());
    if !report.diagnostics.is_empty() {
        println!(" * Diagnostics: {}", report.diagnostics.len());
    }

    let visible: Vec<_> = report
        .items
        .iter()
        .filter(|item| item.confidence >= min_confidence)
        .collect();
    if !visible.is_empty() {
        println!("\n - Candidates (confidence >= {})", min_confidence);
        println!("==============================");
        for (i, item) in visible.iter().enumerate() {
            let confidence = match item.suggested_action {
                "delete" => item.confidence.to_string().red(),
                "review" => item.confidence.to_string().yellow(),
                _ => item.confidence.to_string().normal(),
            };
            println!(
                " {}. {} [{} | {}]",
                i + 1,
                item.qualified_name,
                confidence,
                item.suggested_action
            );
            println!("    └─ {}:{}", item.file, item.line);
        }
    }

    if !report.diagnostics.is_empty() {
        println!("\n - Diagnostics");
        println!("==============");
        for (i, diagnostic) in report.diagnostics.iter().enumerate() {
            println!(
                " {}. {}:{} {}",
                i + 1,
                diagnostic.file,
                diagnostic.line,
                diagnostic.message
            );
        }
    }
}
