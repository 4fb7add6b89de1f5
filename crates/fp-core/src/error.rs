//! Unified error type for the framepick crates.
//!
//! Internal steps return [`Result`]; the extraction orchestrator converts
//! failures into log lines and an absent result, so these errors rarely reach
//! a caller of the top-level API.

/// Unified error type covering every internal failure mode.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// An external tool could not be spawned, timed out, or was not found.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// The operation was cancelled by the caller.
    #[error("Cancelled")]
    Cancelled,

    /// Media probing produced unusable output.
    #[error("Probe error: {0}")]
    Probe(String),

    /// No acceptable tone-mapping strategy exists for the source.
    #[error("Tone mapping error: {0}")]
    ToneMap(String),

    /// Configuration failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Whether this error came from a cancellation request.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
