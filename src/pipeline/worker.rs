//! Download stage: fetch one attachment into its reserved destination.

use std::path::Path;

use chrono::Utc;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::jira::IssueAttachmentClient;
use crate::retry::download_with_retry;
use crate::types::{DownloadTask, Event, FailureReason, TaskState};

use super::{AttachmentPipeline, FilenameRegistry};

impl AttachmentPipeline {
    /// Drive a dispatched task to a terminal state.
    ///
    /// A failed task never leaves a file behind: whatever was written to the
    /// reserved destination is removed.
    pub(super) async fn execute(
        &self,
        mut task: DownloadTask,
        registry: &FilenameRegistry,
        cancel: &CancellationToken,
    ) -> DownloadTask {
        let mut attempts = 0u32;
        let outcome = {
            let client = self.issues.as_ref();
            let attachment_id = task.attachment_id.as_str();
            let destination = task.destination.as_path();
            let task_id = task.id;

            download_with_retry(&self.config.retry, cancel, || {
                attempts += 1;
                let attempt = attempts;
                async move {
                    if attempt > 1 {
                        tracing::debug!(task_id = %task_id, attempt, "Retrying attachment download");
                        self.emit(Event::TaskRetrying { task_id, attempt });
                    }
                    write_attachment(client, attachment_id, destination).await
                }
            })
            .await
        };
        task.attempts = attempts;
        task.finished_at = Some(Utc::now());

        match outcome {
            Ok(bytes) => {
                tracing::info!(
                    task_id = %task.id,
                    source = %task.source,
                    destination = %task.destination.display(),
                    bytes,
                    "{} --> {}",
                    task.source,
                    task.destination.display()
                );
                self.emit(Event::TaskSucceeded {
                    task_id: task.id,
                    destination: task.destination.clone(),
                    bytes,
                });
                task.state = TaskState::Succeeded { bytes };
            }
            Err(e) => {
                registry.release(&task.destination).await;
                let error = match e {
                    Error::Cancelled => Error::Cancelled,
                    other => Error::AttachmentDownload {
                        id: task.attachment_id.clone(),
                        reason: other.to_string(),
                    },
                };
                if matches!(error, Error::Cancelled) {
                    tracing::info!(task_id = %task.id, "Attachment download cancelled");
                } else {
                    tracing::error!(
                        task_id = %task.id,
                        issue = %task.issue_key,
                        source = %task.source,
                        attempts = task.attempts,
                        error = %error,
                        "Attachment download failed"
                    );
                }
                self.emit(Event::TaskFailed {
                    task_id: task.id,
                    destination: task.destination.clone(),
                    error: error.to_string(),
                });
                task.state = TaskState::Failed {
                    reason: FailureReason::from(&error),
                };
            }
        }

        task
    }
}

/// Stream an attachment's bytes into `destination`, truncating earlier attempts.
///
/// Returns the number of bytes written.
async fn write_attachment(
    client: &dyn IssueAttachmentClient,
    attachment_id: &str,
    destination: &Path,
) -> Result<u64> {
    let mut stream = client.download_attachment(attachment_id).await?;
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(destination)
        .await?;

    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    Ok(written)
}
