//! # jira-attachment-dl
//!
//! Bulk-download image attachments from the Jira issues matching a JQL query.
//!
//! A run pages through the search results, fetches each issue, keeps the
//! attachments whose extension is on the image allow-list and streams them
//! into an output directory with bounded concurrency. Every attachment ends
//! up succeeded, failed or skipped in the returned [`PipelineResult`]; one
//! failure never aborts the rest of the run.
//!
//! ## Quick Start
//!
//! ```no_run
//! use jira_attachment_dl::{AttachmentPipeline, Config};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.jira.base_url = "https://jira.example.com".to_string();
//!     config.jira.username = Some("me".to_string());
//!     config.jira.token = Some("api-token".to_string());
//!
//!     let pipeline = AttachmentPipeline::from_config(config)?;
//!
//!     let mut events = pipeline.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let result = pipeline
//!         .run("labels IN (screenshots)", std::path::Path::new("."))
//!         .await?;
//!     println!("{} downloaded, {} failed", result.succeeded.len(), result.failed.len());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Command-line interface
pub mod cli;
/// Comment author tally
pub mod comments;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Jira collaborators and REST client
pub mod jira;
/// Attachment fetch pipeline
pub mod pipeline;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use comments::CommentTally;
pub use config::{Config, DownloadConfig, JiraConfig, RetryConfig};
pub use error::{Error, Result};
pub use jira::{IssueAttachmentClient, IssueSearchClient, JiraClient};
pub use pipeline::{AttachmentPipeline, FilenameRegistry};
pub use types::{
    CommentTallyResult, DownloadTask, Event, FailureReason, PipelineResult, TaskId, TaskState,
};

use tokio_util::sync::CancellationToken;

/// Cancel `token` when the process receives a termination signal.
///
/// - **Unix:** SIGTERM or SIGINT.
/// - **Windows/other:** Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// The returned handle can be aborted once the work it guards has finished.
///
/// # Example
///
/// ```no_run
/// use jira_attachment_dl::{AttachmentPipeline, Config, cancel_on_signal};
///
/// # async fn example() -> jira_attachment_dl::Result<()> {
/// let pipeline = AttachmentPipeline::from_config(Config::default())?;
/// let watcher = cancel_on_signal(pipeline.cancel_token());
/// let result = pipeline.run_query("project = DOCS").await?;
/// watcher.abort();
/// # Ok(())
/// # }
/// ```
pub fn cancel_on_signal(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::warn!("Cancelling run, in-flight downloads will be discarded");
        token.cancel();
    })
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register signal handlers, using ctrl_c fallback");
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl+C signal");
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
