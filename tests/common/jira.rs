//! Wiremock-backed Jira server speaking the REST v2 endpoints the client uses

use serde_json::{Value, json};
use wiremock::matchers::{basic_auth, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::config::{TEST_TOKEN, TEST_USERNAME};

/// Mock Jira instance
pub struct MockJira {
    pub server: MockServer,
}

impl MockJira {
    /// Start an empty mock server
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Base URL to configure the client with
    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Content URL Jira reports for an attachment
    pub fn content_url(&self, id: &str, filename: &str) -> String {
        format!("{}/secure/attachment/{}/{}", self.uri(), id, filename)
    }

    /// Serve one search page for `jql` starting at `start_at`
    pub async fn search_page(&self, jql: &str, start_at: u32, total: u32, keys: &[&str]) {
        let issues: Vec<Value> = keys
            .iter()
            .enumerate()
            .map(|(i, key)| json!({"id": (start_at as usize + i + 1).to_string(), "key": key}))
            .collect();
        Mock::given(method("GET"))
            .and(path("/rest/api/2/search"))
            .and(query_param("jql", jql))
            .and(query_param("startAt", start_at.to_string()))
            .and(basic_auth(TEST_USERNAME, TEST_TOKEN))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "startAt": start_at,
                "maxResults": keys.len(),
                "total": total,
                "issues": issues,
            })))
            .mount(&self.server)
            .await;
    }

    /// Answer every search with `status` and a Jira-style error body
    pub async fn search_error(&self, status: u16, message: &str) {
        Mock::given(method("GET"))
            .and(path("/rest/api/2/search"))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({
                "errorMessages": [message],
                "errors": {}
            })))
            .mount(&self.server)
            .await;
    }

    /// Serve an issue with the given `(id, filename)` attachments
    pub async fn issue(&self, key: &str, attachments: &[(&str, &str)]) {
        let attachments: Vec<Value> = attachments
            .iter()
            .map(|(id, filename)| {
                json!({
                    "id": id,
                    "filename": filename,
                    "content": self.content_url(id, filename),
                    "mimeType": "application/octet-stream",
                    "size": 0
                })
            })
            .collect();
        self.issue_json(key, json!({"attachment": attachments})).await;
    }

    /// Serve an issue whose comments are written by `authors`, in order
    pub async fn commented_issue(&self, key: &str, authors: &[&str]) {
        let comments: Vec<Value> = authors
            .iter()
            .enumerate()
            .map(|(i, author)| {
                json!({
                    "id": i.to_string(),
                    "author": {"name": author, "displayName": author.to_uppercase()}
                })
            })
            .collect();
        self.issue_json(
            key,
            json!({"attachment": [], "comment": {"comments": comments, "total": authors.len()}}),
        )
        .await;
    }

    async fn issue_json(&self, key: &str, fields: Value) {
        Mock::given(method("GET"))
            .and(path(format!("/rest/api/2/issue/{key}")))
            .and(query_param("fields", "attachment,comment"))
            .and(basic_auth(TEST_USERNAME, TEST_TOKEN))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "1",
                "key": key,
                "fields": fields
            })))
            .mount(&self.server)
            .await;
    }

    /// Serve attachment bytes
    pub async fn attachment(&self, id: &str, body: &[u8]) {
        Mock::given(method("GET"))
            .and(path(format!("/secure/attachment/{id}/")))
            .and(basic_auth(TEST_USERNAME, TEST_TOKEN))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
            .mount(&self.server)
            .await;
    }

    /// Fail the first `failures` downloads of an attachment with `status`, then serve `body`
    pub async fn flaky_attachment(&self, id: &str, status: u16, failures: u64, body: &[u8]) {
        Mock::given(method("GET"))
            .and(path(format!("/secure/attachment/{id}/")))
            .respond_with(ResponseTemplate::new(status))
            .up_to_n_times(failures)
            .with_priority(1)
            .mount(&self.server)
            .await;
        self.attachment(id, body).await;
    }

    /// Fail every download of an attachment with `status`
    pub async fn broken_attachment(&self, id: &str, status: u16) {
        Mock::given(method("GET"))
            .and(path(format!("/secure/attachment/{id}/")))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Number of requests the server received for `request_path`
    pub async fn hits(&self, request_path: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|request| request.url.path() == request_path)
            .count()
    }
}
