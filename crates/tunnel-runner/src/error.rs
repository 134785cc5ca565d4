//! Errors surfaced by the runner engine.
//!
//! Any of these aborts the whole request; the caller receives either a
//! complete [`tunnel_core::protocol::RunResponse`] or one of these kinds.
//! Container removal is guaranteed on every path regardless.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Failed to create execution container: {0}")]
    EnvironmentCreation(String),

    #[error("Failed to write command stream: {0}")]
    StreamWrite(#[source] std::io::Error),

    #[error("Container did not exit within {0} seconds")]
    WaitTimeout(u64),

    #[error("Failed to retrieve archive at '{path}': {reason}")]
    ArchiveRetrieval { path: String, reason: String },

    #[error("Malformed tar archive: {0}")]
    ArchiveFormat(#[source] std::io::Error),

    #[error("Invalid artifact pattern '{pattern}': {source}")]
    ArtifactPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("Transport encoding error: {0}")]
    Encoding(String),

    #[error("Container runtime command failed: {0}")]
    Runtime(String),
}
