//! Enumeration stage: search paging, issue fetch, classification and dispatch.

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::jira::{Attachment, PageToken, search_failure};
use crate::types::{
    DownloadTask, Event, FailureReason, IssueFailure, SkipReason, SkippedAttachment, TaskId,
    TaskState,
};
use crate::utils::{candidate_name, destination_stem, extension_of, is_allowed_extension};

use super::{AttachmentPipeline, FilenameRegistry};

/// Everything enumeration learned, handed back once the queue is closed.
#[derive(Default)]
pub(super) struct Enumerated {
    pub(super) skipped: Vec<SkippedAttachment>,
    pub(super) issue_failures: Vec<IssueFailure>,
    /// Qualifying attachments that failed before dispatch (no destination could be reserved)
    pub(super) unreserved: Vec<DownloadTask>,
    pub(super) search_error: Option<Error>,
    pub(super) pages: usize,
    pub(super) issues_seen: usize,
    next_task_id: u64,
}

impl Enumerated {
    fn next_task_id(&mut self) -> TaskId {
        self.next_task_id += 1;
        TaskId(self.next_task_id)
    }
}

enum Flow {
    Continue,
    Stop,
}

impl AttachmentPipeline {
    /// Page through search results and dispatch a task per qualifying attachment.
    ///
    /// Dropping `task_tx` on return closes the queue, which lets the download
    /// stage finish.
    pub(super) async fn enumerate(
        &self,
        query: &str,
        registry: &FilenameRegistry,
        task_tx: mpsc::Sender<DownloadTask>,
        cancel: &CancellationToken,
    ) -> Enumerated {
        let mut state = Enumerated::default();
        let mut page: Option<PageToken> = None;

        loop {
            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("Cancellation observed, no further issues will be dispatched");
                    break;
                }
                fetched = self.search.search(query, page) => fetched,
            };

            let search_page = match fetched {
                Ok(search_page) => search_page,
                Err(e) => {
                    let e = search_failure(e);
                    tracing::error!(
                        query,
                        start_at = page.unwrap_or_default().start_at(),
                        error = %e,
                        "Search failed, no further issues will be dispatched"
                    );
                    state.search_error = Some(e);
                    break;
                }
            };
            state.pages += 1;
            tracing::debug!(
                page = state.pages,
                issues = search_page.issues.len(),
                total = ?search_page.total,
                "Fetched search page"
            );

            for issue_ref in &search_page.issues {
                state.issues_seen += 1;
                if let Flow::Stop = self
                    .process_issue(&issue_ref.key, registry, &task_tx, cancel, &mut state)
                    .await
                {
                    return state;
                }
            }

            match search_page.next_page {
                Some(next) => page = Some(next),
                None => break,
            }
        }

        state
    }

    async fn process_issue(
        &self,
        key: &str,
        registry: &FilenameRegistry,
        task_tx: &mpsc::Sender<DownloadTask>,
        cancel: &CancellationToken,
        state: &mut Enumerated,
    ) -> Flow {
        if key.trim().is_empty() {
            self.record_issue_failure(
                state,
                key,
                Error::IssueFetch {
                    key: key.to_string(),
                    reason: "issue key is empty".to_string(),
                },
            );
            return Flow::Continue;
        }

        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Flow::Stop,
            fetched = self.issues.get_issue(key) => fetched,
        };
        let issue = match fetched {
            Ok(issue) => issue,
            Err(e) => {
                self.record_issue_failure(
                    state,
                    key,
                    Error::IssueFetch {
                        key: key.to_string(),
                        reason: e.to_string(),
                    },
                );
                return Flow::Continue;
            }
        };

        self.emit(Event::IssueFetched {
            issue_key: key.to_string(),
            attachments: issue.attachments().len(),
        });

        let allowed = &self.config.download.image_extensions;
        for attachment in issue.attachments() {
            let source = attachment.content_ref();
            let naming = attachment.naming_ref();
            let extension = match extension_of(naming) {
                Some(extension) if is_allowed_extension(&extension, allowed) => extension,
                other => {
                    self.record_skip(state, key, attachment, other);
                    continue;
                }
            };

            if cancel.is_cancelled() {
                return Flow::Stop;
            }

            let task_id = state.next_task_id();
            let stem = destination_stem(naming, &attachment.id);
            let destination = match registry.reserve(&stem, &extension).await {
                Ok(destination) => destination,
                Err(e) => {
                    let destination = registry.dir().join(candidate_name(&stem, &extension, 0));
                    tracing::error!(
                        task_id = %task_id,
                        issue = key,
                        destination = %destination.display(),
                        error = %e,
                        "Failed to reserve destination file"
                    );
                    self.emit(Event::TaskFailed {
                        task_id,
                        destination: destination.clone(),
                        error: e.to_string(),
                    });
                    let now = Utc::now();
                    state.unreserved.push(DownloadTask {
                        id: task_id,
                        issue_key: key.to_string(),
                        attachment_id: attachment.id.clone(),
                        source: source.to_string(),
                        destination,
                        state: TaskState::Failed {
                            reason: FailureReason::from(&e),
                        },
                        attempts: 0,
                        dispatched_at: now,
                        finished_at: Some(now),
                    });
                    continue;
                }
            };

            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = task_tx.reserve() => permit.ok(),
            };
            let Some(permit) = permit else {
                // Never dispatched; give the claimed name back to the filesystem
                registry.release(&destination).await;
                return Flow::Stop;
            };

            tracing::info!(
                task_id = %task_id,
                issue = key,
                source,
                destination = %destination.display(),
                "Queued attachment download"
            );
            self.emit(Event::TaskQueued {
                task_id,
                issue_key: key.to_string(),
                source: source.to_string(),
                destination: destination.clone(),
            });
            permit.send(DownloadTask {
                id: task_id,
                issue_key: key.to_string(),
                attachment_id: attachment.id.clone(),
                source: source.to_string(),
                destination,
                state: TaskState::Pending,
                attempts: 0,
                dispatched_at: Utc::now(),
                finished_at: None,
            });
        }

        Flow::Continue
    }

    fn record_issue_failure(&self, state: &mut Enumerated, key: &str, error: Error) {
        tracing::warn!(issue = key, error = %error, "Skipping issue");
        self.emit(Event::IssueFailed {
            issue_key: key.to_string(),
            error: error.to_string(),
        });
        state.issue_failures.push(IssueFailure {
            issue_key: key.to_string(),
            reason: FailureReason::from(&error),
        });
    }

    fn record_skip(
        &self,
        state: &mut Enumerated,
        key: &str,
        attachment: &Attachment,
        extension: Option<String>,
    ) {
        let source = attachment.content_ref();
        tracing::info!(issue = key, source, "Skipping attachment because it's not an image");
        self.emit(Event::AttachmentSkipped {
            issue_key: key.to_string(),
            source: source.to_string(),
            extension: extension.clone(),
        });
        state.skipped.push(SkippedAttachment {
            issue_key: key.to_string(),
            attachment_id: attachment.id.clone(),
            source: source.to_string(),
            reason: SkipReason::NotAnImage { extension },
        });
    }
}
