//! Jira collaborators: the traits the pipeline consumes and the REST client
//! that implements them.
//!
//! - [`IssueSearchClient`] - paginated search by JQL
//! - [`IssueAttachmentClient`] - issue lookup and attachment byte streams
//! - [`JiraClient`] - production implementation over the Jira REST API v2

mod client;
mod models;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

pub use client::JiraClient;
pub use models::{
    Attachment, Comment, CommentPage, Issue, IssueFields, IssueRef, PageToken, SearchPage, User,
};

use crate::error::{Error, Result};
use bytes::Bytes;
use futures::stream::BoxStream;

/// Attachment body as a stream of chunks
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Paginated issue search.
///
/// Implementations own the pagination semantics; callers pass back the
/// `next_page` token they were given and stop when it is `None`.
#[async_trait::async_trait]
pub trait IssueSearchClient: Send + Sync {
    /// Fetch one page of issues matching `query`, starting at `page` (first page when `None`)
    async fn search(&self, query: &str, page: Option<PageToken>) -> Result<SearchPage>;
}

/// Issue lookup and attachment download.
#[async_trait::async_trait]
pub trait IssueAttachmentClient: Send + Sync {
    /// Fetch the full issue record, including attachments and comments
    async fn get_issue(&self, key: &str) -> Result<Issue>;

    /// Open a byte stream for the attachment with the given id
    async fn download_attachment(&self, attachment_id: &str) -> Result<ByteStream>;
}

/// Classify a search failure: rejected queries stay `QuerySyntax`, anything
/// else becomes `SearchTransport`.
pub(crate) fn search_failure(error: Error) -> Error {
    match error {
        Error::QuerySyntax { .. } => error,
        other => Error::SearchTransport(other.to_string()),
    }
}
