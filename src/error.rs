use std::path::PathBuf;
use thiserror::Error;

/// Fatal engine errors. Anything recoverable (unreadable or unparsable
/// files, ambiguous resolutions) becomes a [`crate::symbols::Diagnostic`]
/// on the report instead.
#[derive(Debug, Error)]
pub enum Error {
    /// The configuration document could not be read or deserialized.
    /// Surfaced to the caller before any analysis work starts.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The analysis root does not exist or is not a directory.
    #[error("analysis root does not exist: {0}")]
    RootNotFound(PathBuf),

    /// The run was cancelled through its [`crate::analyzer::CancelToken`].
    /// A cancelled analysis produces no result.
    #[error("analysis cancelled")]
    Cancelled,
}
