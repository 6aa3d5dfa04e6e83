//! Test configuration helpers

use std::path::{Path, PathBuf};
use std::time::Duration;

use jira_attachment_dl::{Config, DownloadConfig, JiraConfig, RetryConfig};

/// Username every mock expects in its basic auth header
pub const TEST_USERNAME: &str = "auditor";
/// API token every mock expects in its basic auth header
pub const TEST_TOKEN: &str = "s3cr3t";

/// Configuration pointing at a mock Jira server, with fast retries
pub fn test_config(base_url: &str, output_dir: &Path) -> Config {
    Config {
        jira: JiraConfig {
            base_url: base_url.to_string(),
            username: Some(TEST_USERNAME.to_string()),
            token: Some(TEST_TOKEN.to_string()),
            page_size: 1,
            request_timeout: Duration::from_secs(5),
            ..Default::default()
        },
        download: DownloadConfig {
            output_dir: output_dir.to_path_buf(),
            max_concurrent_downloads: 2,
            ..Default::default()
        },
        retry: RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            backoff_multiplier: 2.0,
            jitter: false,
        },
    }
}

/// Sorted file names in `dir`
pub fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("output dir is readable")
        .map(|entry| {
            entry
                .expect("dir entry")
                .file_name()
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    names.sort();
    names
}

/// Path of `name` inside `dir`
pub fn output_file(dir: &Path, name: &str) -> PathBuf {
    dir.join(name)
}
