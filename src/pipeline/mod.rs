//! Attachment fetch-and-materialize pipeline.
//!
//! Split into focused submodules:
//! - [`registry`] - run-scoped destination name reservation
//! - `enumerate` - search paging, issue fetch, classification and dispatch
//! - `worker` - download execution with retry and partial-file cleanup
//!
//! Enumeration feeds a bounded queue; downloads drain it through
//! `buffer_unordered`, so at most `max_concurrent_downloads` transfers are in
//! flight and a slow worker pool applies backpressure to enumeration. Both
//! stages run concurrently and the run returns once every dispatched task is
//! terminal.

mod enumerate;
mod registry;
mod worker;


pub use registry::FilenameRegistry;

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::jira::{IssueAttachmentClient, IssueSearchClient, JiraClient};
use crate::types::{DownloadTask, Event, FailureReason, PipelineResult, TaskState};
use crate::utils::ensure_output_dir;

/// Buffered events per subscriber before slow receivers start lagging
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Queries Jira and downloads every qualifying attachment of every matching issue.
pub struct AttachmentPipeline {
    config: Arc<Config>,
    search: Arc<dyn IssueSearchClient>,
    issues: Arc<dyn IssueAttachmentClient>,
    event_tx: broadcast::Sender<Event>,
    cancel_token: CancellationToken,
}

impl AttachmentPipeline {
    /// Create a pipeline over explicit collaborators.
    ///
    /// Only the download and retry sections of `config` are validated here;
    /// the Jira section belongs to whoever built the clients.
    pub fn new(
        config: Config,
        search: Arc<dyn IssueSearchClient>,
        issues: Arc<dyn IssueAttachmentClient>,
    ) -> Result<Self> {
        config.validate_pipeline()?;
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            config: Arc::new(config),
            search,
            issues,
            event_tx,
            cancel_token: CancellationToken::new(),
        })
    }

    /// Create a pipeline talking to the Jira server described by `config.jira`
    pub fn from_config(config: Config) -> Result<Self> {
        config.validate()?;
        let client = Arc::new(JiraClient::new(&config.jira)?);
        Self::new(config, client.clone(), client)
    }

    /// Use an externally owned cancellation token (e.g. one fired on Ctrl-C)
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    /// Token that cancels every run of this pipeline
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Request cancellation of the current run
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Subscribe to run events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    pub(crate) fn emit(&self, event: Event) {
        // No subscribers is fine
        self.event_tx.send(event).ok();
    }

    /// Run the pipeline into the configured output directory
    pub async fn run_query(&self, query: &str) -> Result<PipelineResult> {
        let output_dir = self.config.output_dir().clone();
        self.run(query, &output_dir).await
    }

    /// Run the pipeline for `query`, writing files into `output_dir`.
    ///
    /// Fails before any network call if the query is empty or the directory
    /// is unusable, and fails without partial results if the very first
    /// search page cannot be fetched. Every other error is recorded in the
    /// returned [`PipelineResult`].
    pub async fn run(&self, query: &str, output_dir: &Path) -> Result<PipelineResult> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::QuerySyntax {
                query: query.to_string(),
                message: "query must not be empty".to_string(),
            });
        }
        ensure_output_dir(output_dir).await?;

        let started_at = Utc::now();
        let run_cancel = self.cancel_token.child_token();
        let deadline = self.spawn_deadline(&run_cancel);
        let registry = FilenameRegistry::new(output_dir);
        let workers = self.config.download.max_concurrent_downloads.max(1);
        let (task_tx, task_rx) = mpsc::channel::<DownloadTask>(workers * 2);

        tracing::info!(
            query,
            output_dir = %output_dir.display(),
            workers,
            "Starting attachment pipeline run"
        );

        let enumeration = self.enumerate(query, &registry, task_tx, &run_cancel);
        let downloads = ReceiverStream::new(task_rx)
            .map(|task| self.execute(task, &registry, &run_cancel))
            .buffer_unordered(workers)
            .collect::<Vec<DownloadTask>>();
        let (enumerated, finished) = tokio::join!(enumeration, downloads);

        if let Some(handle) = deadline {
            handle.abort();
        }
        let cancelled = run_cancel.is_cancelled();

        let search_error = match enumerated.search_error {
            Some(error) if enumerated.pages == 0 => return Err(error),
            other => other.as_ref().map(FailureReason::from),
        };

        let (succeeded, failed): (Vec<_>, Vec<_>) = finished
            .into_iter()
            .chain(enumerated.unreserved)
            .partition(|task| matches!(task.state, TaskState::Succeeded { .. }));

        let result = PipelineResult {
            query: query.to_string(),
            output_dir: output_dir.to_path_buf(),
            succeeded,
            failed,
            skipped: enumerated.skipped,
            issue_failures: enumerated.issue_failures,
            search_error,
            issues_seen: enumerated.issues_seen,
            cancelled,
            started_at,
            finished_at: Utc::now(),
        };

        tracing::info!(
            issues = result.issues_seen,
            succeeded = result.succeeded.len(),
            failed = result.failed.len(),
            skipped = result.skipped.len(),
            issue_failures = result.issue_failures.len(),
            cancelled,
            "Attachment pipeline run finished"
        );
        self.emit(Event::RunFinished {
            succeeded: result.succeeded.len(),
            failed: result.failed.len(),
            skipped: result.skipped.len(),
        });

        Ok(result)
    }

    /// Fire the run token once the configured run timeout elapses
    fn spawn_deadline(&self, token: &CancellationToken) -> Option<tokio::task::JoinHandle<()>> {
        let limit = self.config.download.run_timeout?;
        let token = token.clone();
        Some(tokio::spawn(async move {
            tokio::time::sleep(limit).await;
            tracing::warn!(timeout_secs = limit.as_secs(), "Run timeout reached, cancelling");
            token.cancel();
        }))
    }
}
