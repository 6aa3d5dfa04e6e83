//! In-memory Jira fake shared by the pipeline and comment tally tests.

use super::{
    Attachment, ByteStream, Comment, CommentPage, Issue, IssueAttachmentClient, IssueFields,
    IssueRef, IssueSearchClient, PageToken, SearchPage, User,
};
use crate::error::{Error, Result};
use bytes::Bytes;
use futures::StreamExt;
use futures::stream;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Scripted search page
pub(crate) enum PageSpec {
    Issues(Vec<String>),
    Fail(u16),
    Syntax,
}

/// Scripted attachment body
#[derive(Clone)]
pub(crate) enum DownloadBehavior {
    Bytes(Vec<u8>),
    /// Fails with 503 `failures` times, then serves `bytes`
    Flaky { failures: usize, bytes: Vec<u8> },
    /// Fails every attempt with the given HTTP status
    Fail(u16),
    /// Opens a stream that never yields
    Hang,
    /// Yields one chunk, then a retryable error
    BreakMidStream,
}

#[derive(Default)]
pub(crate) struct FakeJira {
    pages: Vec<PageSpec>,
    issues: HashMap<String, Issue>,
    downloads: HashMap<String, DownloadBehavior>,
    download_delay: Duration,
    searches: AtomicUsize,
    issue_fetches: AtomicUsize,
    attempts: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// Attachment whose content URL ends in `name`
pub(crate) fn attachment(id: &str, name: &str) -> Attachment {
    Attachment {
        id: id.to_string(),
        filename: Some(name.to_string()),
        content: Some(format!("https://jira.test/secure/attachment/{id}/{name}")),
        mime_type: None,
        size: None,
    }
}

/// Attachment served the Jira Cloud way: the content URL ends in the bare id
pub(crate) fn cloud_attachment(id: &str, name: &str) -> Attachment {
    Attachment {
        content: Some(format!("https://jira.test/rest/api/2/attachment/content/{id}")),
        ..attachment(id, name)
    }
}

/// Default body served for attachments without a scripted download
pub(crate) fn default_body(id: &str) -> Vec<u8> {
    format!("bytes of {id}").into_bytes()
}

impl FakeJira {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn page(mut self, keys: &[&str]) -> Self {
        self.pages
            .push(PageSpec::Issues(keys.iter().map(|k| k.to_string()).collect()));
        self
    }

    pub(crate) fn failing_page(mut self, status: u16) -> Self {
        self.pages.push(PageSpec::Fail(status));
        self
    }

    pub(crate) fn syntax_error_page(mut self) -> Self {
        self.pages.push(PageSpec::Syntax);
        self
    }

    pub(crate) fn issue(mut self, key: &str, attachments: Vec<Attachment>) -> Self {
        self.issues.insert(
            key.to_string(),
            Issue {
                key: key.to_string(),
                fields: IssueFields {
                    attachment: attachments,
                    comment: None,
                },
            },
        );
        self
    }

    /// Issue with one comment per entry; `None` is an author-less comment
    pub(crate) fn commented_issue(mut self, key: &str, authors: &[Option<&str>]) -> Self {
        let comments = authors
            .iter()
            .enumerate()
            .map(|(i, author)| Comment {
                id: Some(i.to_string()),
                author: author.map(|name| User {
                    name: Some(name.to_string()),
                    ..Default::default()
                }),
            })
            .collect();
        self.issues.insert(
            key.to_string(),
            Issue {
                key: key.to_string(),
                fields: IssueFields {
                    attachment: Vec::new(),
                    comment: Some(CommentPage { comments }),
                },
            },
        );
        self
    }

    pub(crate) fn download(mut self, id: &str, behavior: DownloadBehavior) -> Self {
        self.downloads.insert(id.to_string(), behavior);
        self
    }

    pub(crate) fn download_delay(mut self, delay: Duration) -> Self {
        self.download_delay = delay;
        self
    }

    pub(crate) fn search_calls(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    pub(crate) fn issue_fetches(&self) -> usize {
        self.issue_fetches.load(Ordering::SeqCst)
    }

    pub(crate) fn attempts(&self, id: &str) -> usize {
        self.attempts.lock().unwrap().get(id).copied().unwrap_or(0)
    }

    pub(crate) fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn http(status: u16) -> Error {
    Error::Http {
        status,
        message: "scripted failure".to_string(),
    }
}

#[async_trait::async_trait]
impl IssueSearchClient for FakeJira {
    async fn search(&self, _query: &str, page: Option<PageToken>) -> Result<SearchPage> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        let index = page.map(|p| p.0 as usize).unwrap_or(0);
        let next_page =
            (index + 1 < self.pages.len()).then(|| PageToken(index as u32 + 1));

        match self.pages.get(index) {
            None => Ok(SearchPage::default()),
            Some(PageSpec::Fail(status)) => Err(http(*status)),
            Some(PageSpec::Syntax) => Err(Error::QuerySyntax {
                query: "scripted".to_string(),
                message: "Error in the JQL Query".to_string(),
            }),
            Some(PageSpec::Issues(keys)) => Ok(SearchPage {
                issues: keys.iter().map(IssueRef::new).collect(),
                next_page,
                total: None,
            }),
        }
    }
}

#[async_trait::async_trait]
impl IssueAttachmentClient for FakeJira {
    async fn get_issue(&self, key: &str) -> Result<Issue> {
        self.issue_fetches.fetch_add(1, Ordering::SeqCst);
        self.issues.get(key).cloned().ok_or_else(|| http(404))
    }

    async fn download_attachment(&self, attachment_id: &str) -> Result<ByteStream> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let count = attempts.entry(attachment_id.to_string()).or_default();
            *count += 1;
            *count
        };
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if !self.download_delay.is_zero() {
            tokio::time::sleep(self.download_delay).await;
        }

        let behavior = self
            .downloads
            .get(attachment_id)
            .cloned()
            .unwrap_or_else(|| DownloadBehavior::Bytes(default_body(attachment_id)));
        match behavior {
            DownloadBehavior::Bytes(body) => Ok(stream::iter(vec![Ok(Bytes::from(body))]).boxed()),
            DownloadBehavior::Flaky { failures, bytes } if attempt > failures => {
                Ok(stream::iter(vec![Ok(Bytes::from(bytes))]).boxed())
            }
            DownloadBehavior::Flaky { .. } => Err(http(503)),
            DownloadBehavior::Fail(status) => Err(http(status)),
            DownloadBehavior::Hang => Ok(stream::pending().boxed()),
            DownloadBehavior::BreakMidStream => Ok(stream::iter(vec![
                Ok(Bytes::from_static(b"partial")),
                Err(http(502)),
            ])
            .boxed()),
        }
    }
}
