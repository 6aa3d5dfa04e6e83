//! Error types for jira-attachment-dl
//!
//! This module provides the error taxonomy for the library:
//! - Run-level fatal errors (query rejected, output directory unusable, search failed)
//! - Per-issue and per-attachment errors that are recorded and skipped
//! - Transport errors from the Jira REST API
//! - Stable machine-readable error codes for JSON reports

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for jira-attachment-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for jira-attachment-dl
///
/// Each variant carries enough context to attribute the failure to a query,
/// an issue, an attachment or a path.
#[derive(Debug, Error)]
pub enum Error {
    /// The search query was empty or rejected by the server
    #[error("invalid query {query:?}: {message}")]
    QuerySyntax {
        /// The query that was rejected
        query: String,
        /// The reason reported by the server (or by local validation)
        message: String,
    },

    /// The output directory does not exist or is not writable
    #[error("output directory {path} unusable: {reason}")]
    OutputDir {
        /// The directory that was checked
        path: PathBuf,
        /// Why it cannot be used
        reason: String,
    },

    /// Paging through search results failed
    #[error("search failed: {0}")]
    SearchTransport(String),

    /// Fetching a single issue failed (the run continues)
    #[error("failed to fetch issue {key}: {reason}")]
    IssueFetch {
        /// The issue key
        key: String,
        /// Why the fetch failed
        reason: String,
    },

    /// Downloading a single attachment failed (after retries)
    #[error("failed to download attachment {id}: {reason}")]
    AttachmentDownload {
        /// The attachment id
        id: String,
        /// Why the download failed
        reason: String,
    },

    /// The run was cancelled before the operation could complete
    #[error("cancelled")]
    Cancelled,

    /// The server refused the credentials (401/403)
    #[error("authentication error: {0}")]
    Authentication(String),

    /// The server returned an unexpected HTTP status
    #[error("http {status}: {message}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Response body or summarized error messages
        message: String,
    },

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "download.output_dir")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A request produced no response, or a body stalled, within the allotted time
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// What was being waited on
        operation: String,
        /// The limit that elapsed
        after: Duration,
    },

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No free destination name could be found
    #[error("file collision at {path}: {reason}")]
    FileCollision {
        /// The path where the collision occurred
        path: PathBuf,
        /// The reason for the collision
        reason: String,
    },
}

impl Error {
    /// Create a configuration error for a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Get the machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::QuerySyntax { .. } => "query_syntax",
            Error::OutputDir { .. } => "output_dir",
            Error::SearchTransport(_) => "search_transport",
            Error::IssueFetch { .. } => "issue_fetch",
            Error::AttachmentDownload { .. } => "attachment_download",
            Error::Cancelled => "cancelled",
            Error::Authentication(_) => "authentication",
            Error::Http { .. } => "http_error",
            Error::Config { .. } => "config_error",
            Error::Io(_) => "io_error",
            Error::Timeout { .. } => "timeout",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::FileCollision { .. } => "file_collision",
        }
    }

    /// True for errors that end the whole run rather than a single issue or attachment
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::QuerySyntax { .. }
                | Error::OutputDir { .. }
                | Error::SearchTransport(_)
                | Error::Config { .. }
        )
    }
}
