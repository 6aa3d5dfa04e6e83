//! Configuration types for jira-attachment-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Extensions downloaded when no explicit allow-list is configured
pub const DEFAULT_IMAGE_EXTENSIONS: &[&str] =
    &[".png", ".gif", ".jpg", ".pdf", ".bpm", ".tiff", ".svg"];

/// Top-level configuration for a pipeline run
///
/// Every section has sensible defaults; only the Jira base URL has to be set.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Jira server connection settings
    #[serde(default)]
    pub jira: JiraConfig,

    /// Download behavior (destination, concurrency, allow-list)
    #[serde(default)]
    pub download: DownloadConfig,

    /// Retry configuration for transient attachment failures
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    /// Load a configuration from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("cannot read {}: {}", path.display(), e),
            key: None,
        })?;
        serde_json::from_str(&raw).map_err(|e| Error::Config {
            message: format!("cannot parse {}: {}", path.display(), e),
            key: None,
        })
    }

    /// Check that every setting is usable before any work starts
    pub fn validate(&self) -> Result<()> {
        let base_url = self.jira.base_url.trim();
        if base_url.is_empty() {
            return Err(Error::config("jira.base_url", "Jira URL is required"));
        }
        url::Url::parse(base_url)
            .map_err(|e| Error::config("jira.base_url", format!("invalid URL {base_url}: {e}")))?;

        if self.jira.page_size == 0 {
            return Err(Error::config("jira.page_size", "must be at least 1"));
        }
        self.validate_pipeline()
    }

    /// Check the download and retry settings (everything except the Jira connection)
    pub fn validate_pipeline(&self) -> Result<()> {
        if self.download.max_concurrent_downloads == 0 {
            return Err(Error::config(
                "download.max_concurrent_downloads",
                "must be at least 1",
            ));
        }
        if self.download.image_extensions.is_empty() {
            return Err(Error::config(
                "download.image_extensions",
                "at least one extension is required",
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::config("retry.max_attempts", "must be at least 1"));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(Error::config(
                "retry.backoff_multiplier",
                "must be greater than or equal to 1.0",
            ));
        }
        Ok(())
    }

    /// Output directory
    pub fn output_dir(&self) -> &PathBuf {
        &self.download.output_dir
    }
}

/// Jira server configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JiraConfig {
    /// Base URL where Jira is running, e.g. `https://example.atlassian.net`
    #[serde(default)]
    pub base_url: String,

    /// Username (usually the account email) for basic auth
    #[serde(default)]
    pub username: Option<String>,

    /// API token or password for basic auth
    #[serde(default, skip_serializing)]
    pub token: Option<String>,

    /// Issues requested per search page (default: 50)
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Time allowed for an API call to complete, or for an attachment
    /// download to start responding (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Longest gap between two chunks of an attachment body (default: 60 seconds)
    #[serde(default = "default_read_timeout", with = "duration_serde")]
    pub read_timeout: Duration,

    /// TCP connect timeout (default: 10 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,
}

impl Default for JiraConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            username: None,
            token: None,
            page_size: default_page_size(),
            user_agent: default_user_agent(),
            request_timeout: default_request_timeout(),
            read_timeout: default_read_timeout(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

impl JiraConfig {
    /// Base URL without a trailing slash
    pub fn api_base(&self) -> &str {
        self.base_url.trim().trim_end_matches('/')
    }
}

/// Download behavior configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Directory attachments are written to (default: current directory)
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Maximum concurrent attachment downloads (default: 4)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: usize,

    /// Extensions (with leading dot, case-insensitive) that qualify for download
    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,

    /// Cancel the run after this long (None = no limit)
    #[serde(default, with = "optional_duration_serde")]
    pub run_timeout: Option<Duration>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            max_concurrent_downloads: default_max_concurrent(),
            image_extensions: default_image_extensions(),
            run_timeout: None,
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per attachment, including the first one (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (default: 500 milliseconds)
    #[serde(default = "default_initial_delay", with = "duration_ms_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 10 seconds)
    #[serde(default = "default_max_delay", with = "duration_ms_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

fn default_page_size() -> u32 {
    50
}

fn default_user_agent() -> String {
    format!("jira-attachment-dl/{}", env!("CARGO_PKG_VERSION"))
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_read_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_max_concurrent() -> usize {
    4
}

fn default_image_extensions() -> Vec<String> {
    DEFAULT_IMAGE_EXTENSIONS
        .iter()
        .map(|ext| ext.to_string())
        .collect()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(10)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds, for retry delays)
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
