//! Jira REST API v2 payloads used by the search and issue endpoints.

use serde::{Deserialize, Serialize};

use crate::utils::extension_of;

/// Offset into the search result set (`startAt` in Jira terms)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageToken(pub u32);

impl PageToken {
    /// Offset of the first issue on this page
    pub fn start_at(&self) -> u32 {
        self.0
    }
}

/// One page of search results, as seen by the pipeline
#[derive(Clone, Debug, Default)]
pub struct SearchPage {
    /// Issues on this page, in server order
    pub issues: Vec<IssueRef>,
    /// Token for the following page, `None` when this was the last one
    pub next_page: Option<PageToken>,
    /// Total number of matching issues, when the server reports it
    pub total: Option<u32>,
}

/// Raw `/rest/api/2/search` response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SearchResponse {
    #[serde(default)]
    pub start_at: u32,
    #[serde(default)]
    pub total: Option<u32>,
    #[serde(default)]
    pub issues: Vec<IssueRef>,
}

impl SearchResponse {
    /// Convert into a [`SearchPage`], computing the next offset the way the
    /// Jira pagination contract describes it.
    pub(crate) fn into_page(self) -> SearchPage {
        let fetched = self.issues.len() as u32;
        let next_start = self.start_at.saturating_add(fetched);
        let next_page = match self.total {
            Some(total) if fetched > 0 && next_start < total => Some(PageToken(next_start)),
            _ => None,
        };
        SearchPage {
            issues: self.issues,
            next_page,
            total: self.total,
        }
    }
}

/// Minimal issue reference returned by search
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct IssueRef {
    /// Numeric issue id (as a string)
    #[serde(default)]
    pub id: Option<String>,
    /// Issue key, e.g. `SOC-42`
    pub key: String,
}

impl IssueRef {
    /// Reference an issue by key only
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            id: None,
            key: key.into(),
        }
    }
}

/// Full issue record with the fields this crate reads
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Issue {
    /// Issue key
    pub key: String,
    /// Issue fields
    #[serde(default)]
    pub fields: IssueFields,
}

impl Issue {
    /// Attachments in server order
    pub fn attachments(&self) -> &[Attachment] {
        &self.fields.attachment
    }

    /// Comments in server order (empty when comments were not requested)
    pub fn comments(&self) -> &[Comment] {
        self.fields
            .comment
            .as_ref()
            .map(|page| page.comments.as_slice())
            .unwrap_or_default()
    }
}

/// Issue fields (`?fields=attachment,comment`)
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct IssueFields {
    /// Attachments on the issue
    #[serde(default)]
    pub attachment: Vec<Attachment>,
    /// Comment page
    #[serde(default)]
    pub comment: Option<CommentPage>,
}

/// Attachment metadata
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// Opaque id used to download the bytes
    pub id: String,
    /// File name as uploaded
    #[serde(default)]
    pub filename: Option<String>,
    /// Content URL
    #[serde(default)]
    pub content: Option<String>,
    /// MIME type reported by the server
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Size in bytes
    #[serde(default)]
    pub size: Option<u64>,
}

impl Attachment {
    /// The reference used to name and classify the attachment: the content
    /// URL, falling back to the uploaded file name.
    pub fn content_ref(&self) -> &str {
        self.content
            .as_deref()
            .or(self.filename.as_deref())
            .unwrap_or_default()
    }

    /// The reference whose file name drives classification and naming: the
    /// content URL when it carries an extension, otherwise the uploaded file
    /// name. Jira Cloud content URLs end in the bare attachment id.
    pub fn naming_ref(&self) -> &str {
        match (self.content.as_deref(), self.filename.as_deref()) {
            (Some(content), Some(filename)) if extension_of(content).is_none() => filename,
            _ => self.content_ref(),
        }
    }
}

/// Comment container embedded in issue fields
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct CommentPage {
    /// Comments in server order
    #[serde(default)]
    pub comments: Vec<Comment>,
}

/// Issue comment
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Comment {
    /// Comment id
    #[serde(default)]
    pub id: Option<String>,
    /// Comment author
    #[serde(default)]
    pub author: Option<User>,
}

/// Jira user as embedded in comments
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Username (Jira Server)
    #[serde(default)]
    pub name: Option<String>,
    /// Display name
    #[serde(default)]
    pub display_name: Option<String>,
    /// Account id (Jira Cloud)
    #[serde(default)]
    pub account_id: Option<String>,
}

impl User {
    /// Best available identifier: name, then display name, then account id
    pub fn label(&self) -> Option<&str> {
        [&self.name, &self.display_name, &self.account_id]
            .into_iter()
            .filter_map(|value| value.as_deref())
            .find(|value| !value.trim().is_empty())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_response_computes_next_page() {
        let response: SearchResponse = serde_json::from_str(
            r#"{"startAt": 0, "maxResults": 2, "total": 5,
                "issues": [{"id": "1", "key": "SOC-1"}, {"id": "2", "key": "SOC-2"}]}"#,
        )
        .unwrap();
        let page = response.into_page();
        assert_eq!(page.issues.len(), 2);
        assert_eq!(page.next_page, Some(PageToken(2)));
        assert_eq!(page.total, Some(5));
    }

    #[test]
    fn last_or_empty_page_has_no_successor() {
        let last: SearchResponse = serde_json::from_str(
            r#"{"startAt": 4, "total": 5, "issues": [{"key": "SOC-5"}]}"#,
        )
        .unwrap();
        assert_eq!(last.into_page().next_page, None);

        // An empty page must not loop forever even if total claims more
        let empty: SearchResponse =
            serde_json::from_str(r#"{"startAt": 0, "total": 10, "issues": []}"#).unwrap();
        assert_eq!(empty.into_page().next_page, None);
    }

    #[test]
    fn issue_exposes_attachments_and_comments() {
        let issue: Issue = serde_json::from_str(
            r#"{"key": "SOC-1", "fields": {
                "attachment": [{"id": "10001", "filename": "shot.PNG",
                    "content": "https://jira.example.com/secure/attachment/10001/shot.PNG",
                    "mimeType": "image/png", "size": 12}],
                "comment": {"comments": [
                    {"id": "1", "author": {"name": "alice"}},
                    {"id": "2", "author": {"displayName": "Bob B"}}
                ]}
            }}"#,
        )
        .unwrap();

        assert_eq!(issue.attachments().len(), 1);
        assert_eq!(issue.attachments()[0].mime_type.as_deref(), Some("image/png"));
        assert_eq!(
            issue.attachments()[0].content_ref(),
            "https://jira.example.com/secure/attachment/10001/shot.PNG"
        );
        let authors: Vec<_> = issue
            .comments()
            .iter()
            .filter_map(|c| c.author.as_ref().and_then(User::label))
            .collect();
        assert_eq!(authors, vec!["alice", "Bob B"]);
    }

    #[test]
    fn issue_without_fields_is_empty() {
        let issue: Issue = serde_json::from_str(r#"{"key": "SOC-9"}"#).unwrap();
        assert!(issue.attachments().is_empty());
        assert!(issue.comments().is_empty());
    }

    #[test]
    fn attachment_falls_back_to_filename() {
        let attachment = Attachment {
            id: "1".into(),
            filename: Some("diagram.svg".into()),
            ..Default::default()
        };
        assert_eq!(attachment.content_ref(), "diagram.svg");
        assert_eq!(attachment.naming_ref(), "diagram.svg");
    }

    #[test]
    fn naming_uses_filename_when_content_url_has_no_extension() {
        let cloud = Attachment {
            id: "10001".into(),
            filename: Some("shot.png".into()),
            content: Some("https://acme.atlassian.net/rest/api/2/attachment/content/10001".into()),
            ..Default::default()
        };
        assert_eq!(
            cloud.content_ref(),
            "https://acme.atlassian.net/rest/api/2/attachment/content/10001"
        );
        assert_eq!(cloud.naming_ref(), "shot.png");

        let server = Attachment {
            id: "10002".into(),
            filename: Some("renamed.gif".into()),
            content: Some("https://jira.example.com/secure/attachment/10002/shot.png".into()),
            ..Default::default()
        };
        assert_eq!(
            server.naming_ref(),
            "https://jira.example.com/secure/attachment/10002/shot.png"
        );
    }

    #[test]
    fn user_label_skips_blank_values() {
        let user = User {
            name: Some("  ".into()),
            display_name: None,
            account_id: Some("5b10ac8d82e05b22cc7d4ef5".into()),
        };
        assert_eq!(user.label(), Some("5b10ac8d82e05b22cc7d4ef5"));
    }
}
