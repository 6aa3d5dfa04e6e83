//! Jira REST API v2 client with basic authentication.

use std::future::Future;
use std::time::Duration;

use crate::config::JiraConfig;
use crate::error::{Error, Result};
use bytes::Bytes;
use futures::stream::{self, Stream};
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client as HttpClient, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::models::{Issue, PageToken, SearchPage, SearchResponse};
use super::{ByteStream, IssueAttachmentClient, IssueSearchClient};

/// Only the key is needed from search; everything else comes from the issue fetch
const SEARCH_FIELDS: &str = "key";
const ISSUE_FIELDS: &str = "attachment,comment";

/// Jira REST client implementing both pipeline collaborators
///
/// API calls must finish within `request_timeout`. Attachment downloads only
/// need their response headers within that limit; the body may take as long
/// as it keeps flowing, with at most `read_timeout` between chunks.
#[derive(Clone)]
pub struct JiraClient {
    http: HttpClient,
    base_url: String,
    username: Option<String>,
    token: Option<String>,
    page_size: u32,
    request_timeout: Duration,
    read_timeout: Duration,
}

impl JiraClient {
    /// Build a client from the Jira section of the configuration
    pub fn new(config: &JiraConfig) -> Result<Self> {
        let http = build_http_client(config)?;
        Ok(Self {
            http,
            base_url: config.api_base().to_string(),
            username: config.username.clone(),
            token: config.token.clone(),
            page_size: config.page_size.max(1),
            request_timeout: config.request_timeout,
            read_timeout: config.read_timeout,
        })
    }

    /// Base URL requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn get(&self, path: &str) -> RequestBuilder {
        let request = self.http.get(self.url_for(path));
        match &self.username {
            Some(username) => request.basic_auth(username, self.token.as_deref()),
            None => request,
        }
    }

    /// Bound `future` by the request timeout
    async fn within<T>(
        &self,
        operation: &str,
        future: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.request_timeout, future).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                operation: operation.to_string(),
                after: self.request_timeout,
            }),
        }
    }

    async fn parse_json<T>(response: Response) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let response = Self::ensure_success(response).await?;
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(Error::from)
    }

    async fn ensure_success(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = extract_error_message(&body);
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            Err(Error::Authentication(format!(
                "Access denied ({}) - {}",
                status, message
            )))
        } else {
            Err(Error::Http {
                status: status.as_u16(),
                message,
            })
        }
    }

    async fn search_page(&self, query: &str, page: Option<PageToken>) -> Result<SearchPage> {
        let start_at = page.unwrap_or_default().start_at().to_string();
        let max_results = self.page_size.to_string();
        tracing::debug!(query, start_at = %start_at, "Searching issues");

        let response = self
            .get("rest/api/2/search")
            .query(&[
                ("jql", query),
                ("startAt", start_at.as_str()),
                ("maxResults", max_results.as_str()),
                ("fields", SEARCH_FIELDS),
            ])
            .send()
            .await?;

        // Jira answers an unparsable JQL query with 400 and a list of error messages
        if response.status() == StatusCode::BAD_REQUEST {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::QuerySyntax {
                query: query.to_string(),
                message: extract_error_message(&body),
            });
        }

        let raw: SearchResponse = Self::parse_json(response).await?;
        Ok(raw.into_page())
    }

    async fn fetch_issue(&self, key: &str) -> Result<Issue> {
        let path = format!("rest/api/2/issue/{}", urlencoding::encode(key));
        let response = self
            .get(&path)
            .query(&[("fields", ISSUE_FIELDS)])
            .send()
            .await?;
        Self::parse_json(response).await
    }

    async fn open_download(&self, attachment_id: &str) -> Result<Response> {
        let path = format!("secure/attachment/{}/", urlencoding::encode(attachment_id));
        let response = self.get(&path).send().await?;
        Self::ensure_success(response).await
    }
}

#[async_trait::async_trait]
impl IssueSearchClient for JiraClient {
    async fn search(&self, query: &str, page: Option<PageToken>) -> Result<SearchPage> {
        self.within("issue search", self.search_page(query, page))
            .await
    }
}

#[async_trait::async_trait]
impl IssueAttachmentClient for JiraClient {
    async fn get_issue(&self, key: &str) -> Result<Issue> {
        self.within("issue fetch", self.fetch_issue(key)).await
    }

    async fn download_attachment(&self, attachment_id: &str) -> Result<ByteStream> {
        let response = self
            .within("attachment download", self.open_download(attachment_id))
            .await?;
        Ok(idle_timeout(
            response.bytes_stream().map_err(Error::from),
            self.read_timeout,
        ))
    }
}

/// Fail a body stream once it goes `idle` without producing a chunk.
fn idle_timeout<S>(body: S, idle: Duration) -> ByteStream
where
    S: Stream<Item = Result<Bytes>> + Send + 'static,
{
    stream::unfold(Some(Box::pin(body)), move |state| async move {
        let Some(mut body) = state else {
            return None;
        };
        match tokio::time::timeout(idle, body.next()).await {
            Ok(Some(chunk)) => Some((chunk, Some(body))),
            Ok(None) => None,
            Err(_) => Some((
                Err(Error::Timeout {
                    operation: "attachment body read".to_string(),
                    after: idle,
                }),
                None,
            )),
        }
    })
    .boxed()
}

// No total `timeout` on the client: it would cap how long a body may take to
// stream. Deadlines are applied per call instead.
fn build_http_client(config: &JiraConfig) -> Result<HttpClient> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&config.user_agent)
            .map_err(|e| Error::config("jira.user_agent", e.to_string()))?,
    );

    HttpClient::builder()
        .default_headers(headers)
        .connect_timeout(config.connect_timeout)
        .build()
        .map_err(Error::from)
}

/// Summarize a Jira error body: `errorMessages` plus field `errors`, or the raw body.
fn extract_error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return body.trim().to_string();
    };

    let mut messages: Vec<String> = value
        .get("errorMessages")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    if let Some(errors) = value.get("errors").and_then(Value::as_object) {
        for (field, message) in errors {
            if let Some(message) = message.as_str() {
                messages.push(format!("{field}: {message}"));
            }
        }
    }

    if messages.is_empty() {
        body.trim().to_string()
    } else {
        messages.join("; ")
    }
}
