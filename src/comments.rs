//! Comment author tally over the issues matching a query.

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use futures::stream;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::jira::{
    Issue, IssueAttachmentClient, IssueSearchClient, PageToken, User, search_failure,
};
use crate::types::{CommentTallyResult, FailureReason, IssueFailure};

/// Label used for comments whose author carries no usable identifier
pub const UNKNOWN_AUTHOR: &str = "unknown";

/// Counts comments per author across every issue a query returns.
pub struct CommentTally {
    search: Arc<dyn IssueSearchClient>,
    issues: Arc<dyn IssueAttachmentClient>,
    concurrency: usize,
    cancel_token: CancellationToken,
}

impl CommentTally {
    /// Create a tally that fetches up to `concurrency` issues at a time
    pub fn new(
        search: Arc<dyn IssueSearchClient>,
        issues: Arc<dyn IssueAttachmentClient>,
        concurrency: usize,
    ) -> Self {
        Self {
            search,
            issues,
            concurrency: concurrency.max(1),
            cancel_token: CancellationToken::new(),
        }
    }

    /// Use an externally owned cancellation token
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    /// Count comments per author for every issue matching `query`.
    ///
    /// Search errors follow the pipeline's rules: the first page failing is
    /// fatal, a later page failing is recorded and the issues seen so far are
    /// still counted.
    pub async fn tally_comment_authors(&self, query: &str) -> Result<CommentTallyResult> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::QuerySyntax {
                query: query.to_string(),
                message: "query must not be empty".to_string(),
            });
        }

        let mut result = CommentTallyResult::default();
        let keys = match self.collect_keys(query).await {
            (_, 0, Some(error)) => return Err(error),
            (keys, _, error) => {
                result.search_error = error.as_ref().map(FailureReason::from);
                keys
            }
        };

        let cancel = &self.cancel_token;
        let mut fetches = stream::iter(keys)
            .map(|key| async move {
                let fetched = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    fetched = self.issues.get_issue(&key) => Some(fetched),
                };
                (key, fetched)
            })
            .buffer_unordered(self.concurrency);

        while let Some((key, fetched)) = fetches.next().await {
            match fetched {
                Some(Ok(issue)) => {
                    for (author, count) in count_authors(&issue) {
                        *result.counts.entry(author).or_default() += count;
                    }
                    result.issues_scanned += 1;
                }
                Some(Err(e)) => {
                    let error = Error::IssueFetch {
                        key: key.clone(),
                        reason: e.to_string(),
                    };
                    tracing::warn!(issue = %key, error = %error, "Skipping issue in comment tally");
                    result.issue_failures.push(IssueFailure {
                        issue_key: key,
                        reason: FailureReason::from(&error),
                    });
                }
                None => {}
            }
        }
        result.cancelled = cancel.is_cancelled();

        tracing::info!(
            issues = result.issues_scanned,
            authors = result.counts.len(),
            comments = result.total_comments(),
            "Comment tally finished"
        );
        Ok(result)
    }

    /// Page through the search and return every issue key, the number of
    /// pages fetched and the error that stopped paging, if any.
    async fn collect_keys(&self, query: &str) -> (Vec<String>, usize, Option<Error>) {
        let mut keys = Vec::new();
        let mut pages = 0usize;
        let mut page: Option<PageToken> = None;

        loop {
            let fetched = tokio::select! {
                biased;
                _ = self.cancel_token.cancelled() => break,
                fetched = self.search.search(query, page) => fetched,
            };
            match fetched {
                Ok(search_page) => {
                    pages += 1;
                    keys.extend(
                        search_page
                            .issues
                            .into_iter()
                            .map(|issue| issue.key)
                            .filter(|key| !key.trim().is_empty()),
                    );
                    match search_page.next_page {
                        Some(next) => page = Some(next),
                        None => break,
                    }
                }
                Err(e) => {
                    let error = search_failure(e);
                    tracing::error!(
                        query,
                        pages,
                        error = %error,
                        "Search failed during comment tally"
                    );
                    return (keys, pages, Some(error));
                }
            }
        }

        (keys, pages, None)
    }
}

/// Per-issue author counts, merged by the caller
fn count_authors(issue: &Issue) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for comment in issue.comments() {
        let author = comment
            .author
            .as_ref()
            .and_then(User::label)
            .unwrap_or(UNKNOWN_AUTHOR);
        *counts.entry(author.to_string()).or_default() += 1;
    }
    counts
}
