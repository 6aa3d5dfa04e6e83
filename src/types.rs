//! Core types for jira-attachment-dl: download tasks, run results and events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::Error;

/// Run-unique identifier for a download task
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Machine-readable failure attached to a task, issue or run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReason {
    /// Stable error code (see [`Error::error_code`])
    pub code: String,
    /// Human-readable message
    pub message: String,
}

impl FailureReason {
    /// True when the failure was caused by cancellation
    pub fn is_cancelled(&self) -> bool {
        self.code == "cancelled"
    }
}

impl From<&Error> for FailureReason {
    fn from(error: &Error) -> Self {
        Self {
            code: error.error_code().to_string(),
            message: error.to_string(),
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

/// Completion state of a download task
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TaskState {
    /// Queued or in flight
    Pending,
    /// All bytes written to the destination
    Succeeded {
        /// Bytes written
        bytes: u64,
    },
    /// Gave up; the destination file has been removed
    Failed {
        /// Why the task failed
        reason: FailureReason,
    },
}

/// One qualifying attachment and where it is being written
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadTask {
    /// Run-unique task id
    pub id: TaskId,
    /// Key of the issue the attachment belongs to
    pub issue_key: String,
    /// Attachment id used to fetch the bytes
    pub attachment_id: String,
    /// Content reference the destination name was derived from
    pub source: String,
    /// Reserved destination path
    pub destination: PathBuf,
    /// Completion state
    pub state: TaskState,
    /// Download attempts made
    pub attempts: u32,
    /// When the task was handed to the worker pool
    pub dispatched_at: DateTime<Utc>,
    /// When the task reached a terminal state
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl DownloadTask {
    /// True once the task succeeded or failed
    pub fn is_terminal(&self) -> bool {
        !matches!(self.state, TaskState::Pending)
    }

    /// Failure reason, if the task failed
    pub fn failure(&self) -> Option<&FailureReason> {
        match &self.state {
            TaskState::Failed { reason } => Some(reason),
            _ => None,
        }
    }
}

/// Why an attachment was not downloaded
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// Extension not in the allow-list
    NotAnImage {
        /// Lower-cased extension (with dot), if any
        extension: Option<String>,
    },
}

/// An attachment that was seen but not downloaded
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SkippedAttachment {
    /// Issue key
    pub issue_key: String,
    /// Attachment id
    pub attachment_id: String,
    /// Content reference
    pub source: String,
    /// Why it was skipped
    #[serde(flatten)]
    pub reason: SkipReason,
}

/// An issue whose record could not be fetched
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IssueFailure {
    /// Issue key
    pub issue_key: String,
    /// Why the fetch failed
    pub reason: FailureReason,
}

/// Aggregated outcome of one pipeline run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineResult {
    /// Query that was executed
    pub query: String,
    /// Directory files were written to
    pub output_dir: PathBuf,
    /// Tasks that wrote their file
    pub succeeded: Vec<DownloadTask>,
    /// Tasks that failed (state carries the reason)
    pub failed: Vec<DownloadTask>,
    /// Attachments that did not qualify
    pub skipped: Vec<SkippedAttachment>,
    /// Issues that could not be fetched
    pub issue_failures: Vec<IssueFailure>,
    /// Search error that stopped enumeration after work had started
    pub search_error: Option<FailureReason>,
    /// Issues returned by search
    pub issues_seen: usize,
    /// True if the run was cancelled (signal, timeout or caller)
    pub cancelled: bool,
    /// Run start
    pub started_at: DateTime<Utc>,
    /// Run end
    pub finished_at: DateTime<Utc>,
}

impl PipelineResult {
    /// Number of download tasks that were created in this run
    pub fn dispatched(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    /// Failed tasks paired with their reasons
    pub fn failures(&self) -> impl Iterator<Item = (&DownloadTask, &FailureReason)> {
        self.failed
            .iter()
            .filter_map(|task| task.failure().map(|reason| (task, reason)))
    }

    /// True when nothing failed, nothing was cancelled and search completed
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
            && self.issue_failures.is_empty()
            && self.search_error.is_none()
            && !self.cancelled
    }

    /// Total bytes written by successful tasks
    pub fn bytes_written(&self) -> u64 {
        self.succeeded
            .iter()
            .map(|task| match task.state {
                TaskState::Succeeded { bytes } => bytes,
                _ => 0,
            })
            .sum()
    }
}

/// Outcome of a comment-author tally
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CommentTallyResult {
    /// Comment count per author
    pub counts: BTreeMap<String, usize>,
    /// Issues whose comments were counted
    pub issues_scanned: usize,
    /// Issues that could not be fetched
    pub issue_failures: Vec<IssueFailure>,
    /// Search error that stopped enumeration after work had started
    pub search_error: Option<FailureReason>,
    /// True if the tally was cancelled
    pub cancelled: bool,
}

impl CommentTallyResult {
    /// Authors ordered by descending comment count, then by name
    pub fn ranked(&self) -> Vec<(&str, usize)> {
        let mut ranked: Vec<_> = self
            .counts
            .iter()
            .map(|(author, count)| (author.as_str(), *count))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked
    }

    /// Total comments counted
    pub fn total_comments(&self) -> usize {
        self.counts.values().sum()
    }
}

/// Event emitted during a pipeline run
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// An issue record was fetched
    IssueFetched {
        /// Issue key
        issue_key: String,
        /// Attachments on the issue
        attachments: usize,
    },
    /// An issue record could not be fetched
    IssueFailed {
        /// Issue key
        issue_key: String,
        /// Error message
        error: String,
    },
    /// An attachment did not qualify for download
    AttachmentSkipped {
        /// Issue key
        issue_key: String,
        /// Content reference
        source: String,
        /// Lower-cased extension, if any
        extension: Option<String>,
    },
    /// A task was reserved a destination and handed to the worker pool
    TaskQueued {
        /// Task id
        task_id: TaskId,
        /// Issue key
        issue_key: String,
        /// Content reference
        source: String,
        /// Reserved destination
        destination: PathBuf,
    },
    /// A download attempt is being retried
    TaskRetrying {
        /// Task id
        task_id: TaskId,
        /// Attempt about to start (2 = first retry)
        attempt: u32,
    },
    /// A task wrote its file
    TaskSucceeded {
        /// Task id
        task_id: TaskId,
        /// Destination
        destination: PathBuf,
        /// Bytes written
        bytes: u64,
    },
    /// A task failed
    TaskFailed {
        /// Task id
        task_id: TaskId,
        /// Destination (already removed)
        destination: PathBuf,
        /// Error message
        error: String,
    },
    /// The run finished and every task is terminal
    RunFinished {
        /// Successful tasks
        succeeded: usize,
        /// Failed tasks
        failed: usize,
        /// Skipped attachments
        skipped: usize,
    },
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: u64, state: TaskState) -> DownloadTask {
        DownloadTask {
            id: TaskId(id),
            issue_key: "SOC-1".into(),
            attachment_id: id.to_string(),
            source: format!("https://jira.example.com/secure/attachment/{id}/a.png"),
            destination: PathBuf::from(format!("a ({id}).png")),
            state,
            attempts: 1,
            dispatched_at: Utc::now(),
            finished_at: None,
        }
    }

    fn result_with(succeeded: Vec<DownloadTask>, failed: Vec<DownloadTask>) -> PipelineResult {
        PipelineResult {
            query: "labels IN (x)".into(),
            output_dir: PathBuf::from("."),
            succeeded,
            failed,
            skipped: vec![],
            issue_failures: vec![],
            search_error: None,
            issues_seen: 1,
            cancelled: false,
            started_at: Utc::now(),
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn failure_reason_from_error_keeps_code() {
        let reason = FailureReason::from(&Error::Cancelled);
        assert!(reason.is_cancelled());
        assert_eq!(reason.to_string(), "cancelled (cancelled)");
    }

    #[test]
    fn result_counts_and_bytes() {
        let failed_reason = FailureReason {
            code: "http_error".into(),
            message: "http 503: unavailable".into(),
        };
        let result = result_with(
            vec![
                task(1, TaskState::Succeeded { bytes: 10 }),
                task(2, TaskState::Succeeded { bytes: 32 }),
            ],
            vec![task(
                3,
                TaskState::Failed {
                    reason: failed_reason.clone(),
                },
            )],
        );

        assert_eq!(result.dispatched(), 3);
        assert_eq!(result.bytes_written(), 42);
        assert!(!result.is_clean());
        let failures: Vec<_> = result.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].1, &failed_reason);
        assert!(result.succeeded.iter().all(DownloadTask::is_terminal));
    }

    #[test]
    fn clean_result_has_no_failures_of_any_kind() {
        let mut result = result_with(vec![task(1, TaskState::Succeeded { bytes: 1 })], vec![]);
        assert!(result.is_clean());

        result.cancelled = true;
        assert!(!result.is_clean());
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let event = Event::TaskRetrying {
            task_id: TaskId(7),
            attempt: 2,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "task_retrying");
        assert_eq!(json["task_id"], 7);
    }

    #[test]
    fn skipped_attachment_flattens_reason() {
        let skipped = SkippedAttachment {
            issue_key: "SOC-1".into(),
            attachment_id: "3".into(),
            source: "notes.txt".into(),
            reason: SkipReason::NotAnImage {
                extension: Some(".txt".into()),
            },
        };
        let json = serde_json::to_value(&skipped).unwrap();
        assert_eq!(json["reason"], "not_an_image");
        assert_eq!(json["extension"], ".txt");
    }

    #[test]
    fn tally_ranks_by_count_then_name() {
        let mut tally = CommentTallyResult::default();
        tally.counts.insert("carol".into(), 1);
        tally.counts.insert("alice".into(), 3);
        tally.counts.insert("bob".into(), 3);

        assert_eq!(tally.ranked(), vec![("alice", 3), ("bob", 3), ("carol", 1)]);
        assert_eq!(tally.total_comments(), 7);
    }
}
