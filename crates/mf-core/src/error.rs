//! Unified error type for the mp3forge service.
//!
//! Every crate in the workspace funnels its failures into [`Error`], which
//! carries enough context for API handlers to derive an HTTP status code via
//! [`Error::http_status`]. Per-file conversion failures are *not* part of this
//! taxonomy; they are recorded on the file task and never fail a request.

use std::fmt;

/// Unified error type covering all request-level failure modes.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The submission was empty or malformed.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// One or more uploaded files have an extension we cannot convert.
    #[error("Unsupported format: {}", files.join(", "))]
    UnsupportedFormat {
        /// Names of the offending files, sorted.
        files: Vec<String>,
    },

    /// An uploaded file exceeds the configured size limit.
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "job", "file task").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// The job has not reached a terminal state yet.
    #[error("Not ready: {0}")]
    NotReady(String),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Building the result archive failed.
    #[error("Archive error: {0}")]
    Archive(String),

    /// An external tool (ffmpeg) could not be used.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::InvalidInput(_) => 400,
            Error::UnsupportedFormat { .. } => 400,
            Error::PayloadTooLarge(_) => 413,
            Error::NotFound { .. } => 404,
            Error::NotReady(_) => 409,
            Error::Io { .. } => 500,
            Error::Archive(_) => 500,
            Error::Tool { .. } => 502,
            Error::Internal(_) => 500,
        }
    }

    /// Short machine-readable code used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidInput(_) => "invalid_input",
            Error::UnsupportedFormat { .. } => "unsupported_format",
            Error::PayloadTooLarge(_) => "payload_too_large",
            Error::NotFound { .. } => "not_found",
            Error::NotReady(_) => "not_ready",
            Error::Io { .. } => "io_error",
            Error::Archive(_) => "archive_error",
            Error::Tool { .. } => "tool_error",
            Error::Internal(_) => "internal_error",
        }
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::UnsupportedFormat`].
    ///
    /// The file list is sorted so responses are stable regardless of upload order.
    pub fn unsupported_format(mut files: Vec<String>) -> Self {
        files.sort();
        Error::UnsupportedFormat { files }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
