//! Command-line front end: flag parsing, config layering and report output.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use crate::comments::CommentTally;
use crate::config::Config;
use crate::error::Result;
use crate::jira::JiraClient;
use crate::pipeline::AttachmentPipeline;
use crate::types::{CommentTallyResult, Event, PipelineResult};
use crate::utils::normalize_extension;

/// Top-level CLI parser for `jira-attachment-dl`.
#[derive(Debug, Parser)]
#[command(
    name = "jira-attachment-dl",
    version,
    about = "Download image attachments from the Jira issues matching a JQL query"
)]
pub struct Cli {
    /// URL where Jira is running
    #[arg(long = "jira-url", alias = "jiraURL", env = "JIRA_URL")]
    pub jira_url: Option<String>,

    /// Jira username
    #[arg(long, env = "JIRA_USERNAME")]
    pub username: Option<String>,

    /// Jira API token or password
    #[arg(long, env = "JIRA_TOKEN", hide_env_values = true)]
    pub password: Option<String>,

    /// JQL query selecting the issues whose attachments are fetched
    #[arg(long, alias = "jiraQuery", env = "JIRA_QUERY")]
    pub query: String,

    /// Directory files are written to
    #[arg(long, short = 'o')]
    pub output_dir: Option<PathBuf>,

    /// Maximum concurrent downloads
    #[arg(long, short = 'w')]
    pub workers: Option<usize>,

    /// Total attempts per attachment, including the first
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Cancel the whole run after this many seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Seconds allowed for an API call, or for a download to start responding
    #[arg(long)]
    pub request_timeout: Option<u64>,

    /// Seconds an attachment body may stall before the attempt fails
    #[arg(long)]
    pub read_timeout: Option<u64>,

    /// Issues requested per search page
    #[arg(long)]
    pub page_size: Option<u32>,

    /// Comma-separated extension allow-list (e.g. `png,svg`)
    #[arg(long, value_delimiter = ',')]
    pub extensions: Option<Vec<String>>,

    /// Count comments per author instead of downloading attachments
    #[arg(long, alias = "searchComments")]
    pub search_comments: bool,

    /// Print the final report as JSON
    #[arg(long)]
    pub json: bool,

    /// JSON configuration file; flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Camel-case flags that older scripts pass with a single dash
const LEGACY_FLAGS: [&str; 3] = ["jiraURL", "jiraQuery", "searchComments"];

/// Rewrite single-dash legacy flags (`-jiraURL x`, `-jiraQuery=...`) into the
/// double-dash aliases clap understands. Everything else passes through.
pub fn normalize_legacy_flags<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    args.into_iter()
        .map(Into::into)
        .map(|arg| {
            let Some(flag) = arg.to_str().and_then(|s| s.strip_prefix('-')) else {
                return arg;
            };
            let name = flag.split('=').next().unwrap_or_default();
            if LEGACY_FLAGS.contains(&name) {
                OsString::from(format!("--{flag}"))
            } else {
                arg
            }
        })
        .collect()
}

impl Cli {
    /// Parse process arguments, accepting the legacy single-dash flags
    pub fn parse_args() -> Self {
        Self::parse_from(normalize_legacy_flags(std::env::args_os()))
    }

    /// Layer flags over the config file (or defaults) and validate the result
    pub fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        if let Some(url) = &self.jira_url {
            config.jira.base_url = url.clone();
        }
        if let Some(username) = &self.username {
            config.jira.username = Some(username.clone());
        }
        if let Some(token) = &self.password {
            config.jira.token = Some(token.clone());
        }
        if let Some(page_size) = self.page_size {
            config.jira.page_size = page_size;
        }
        if let Some(secs) = self.request_timeout {
            config.jira.request_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.read_timeout {
            config.jira.read_timeout = Duration::from_secs(secs);
        }
        if let Some(dir) = &self.output_dir {
            config.download.output_dir = dir.clone();
        }
        if let Some(workers) = self.workers {
            config.download.max_concurrent_downloads = workers;
        }
        if let Some(secs) = self.timeout {
            config.download.run_timeout = Some(Duration::from_secs(secs));
        }
        if let Some(extensions) = &self.extensions {
            config.download.image_extensions = extensions
                .iter()
                .filter(|ext| !ext.trim().trim_start_matches('.').is_empty())
                .map(|ext| normalize_extension(ext))
                .collect();
        }
        if let Some(attempts) = self.max_attempts {
            config.retry.max_attempts = attempts;
        }

        config.validate()?;
        Ok(config)
    }
}

/// How a completed command should exit
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Everything succeeded
    Clean,
    /// Completed, but something failed or the run was cancelled
    Partial,
}

impl Outcome {
    /// Process exit code: 0 for clean, 2 for partial
    pub fn exit_code(self) -> ExitCode {
        match self {
            Outcome::Clean => ExitCode::SUCCESS,
            Outcome::Partial => ExitCode::from(2),
        }
    }
}

/// Execute the command described by `cli`
pub async fn run(cli: Cli) -> Result<Outcome> {
    let config = cli.load_config()?;
    let client = Arc::new(JiraClient::new(&config.jira)?);
    let cancel = CancellationToken::new();
    let watcher = crate::cancel_on_signal(cancel.clone());

    let outcome = if cli.search_comments {
        let tally = CommentTally::new(
            client.clone(),
            client,
            config.download.max_concurrent_downloads,
        )
        .with_cancel_token(cancel);
        let result = tally.tally_comment_authors(&cli.query).await;
        watcher.abort();
        report_tally(&result?, cli.json)?
    } else {
        let pipeline =
            AttachmentPipeline::new(config, client.clone(), client)?.with_cancel_token(cancel);
        let printer = (!cli.json).then(|| spawn_printer(pipeline.subscribe()));
        let result = pipeline.run_query(&cli.query).await;
        watcher.abort();
        // Closing the event channel lets the printer drain and exit
        drop(pipeline);
        if let Some(printer) = printer {
            printer.await.ok();
        }
        report_run(&result?, cli.json)?
    };

    Ok(outcome)
}

/// Human-readable line for a run event, if it is worth printing
pub fn describe(event: &Event) -> Option<String> {
    match event {
        Event::TaskQueued {
            source,
            destination,
            ..
        } => Some(format!("{} --> {}", source, destination.display())),
        Event::AttachmentSkipped { source, .. } => {
            Some(format!("Skipping {} because it's not an image", source))
        }
        Event::IssueFailed { issue_key, error } => {
            Some(format!("error fetching: {}: {}", issue_key, error))
        }
        Event::TaskFailed {
            destination, error, ..
        } => Some(format!("failed: {}: {}", destination.display(), error)),
        _ => None,
    }
}

fn spawn_printer(mut events: broadcast::Receiver<Event>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Some(line) = describe(&event) {
                        println!("{line}");
                    }
                    if matches!(event, Event::RunFinished { .. }) {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event printer fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn report_run(result: &PipelineResult, json: bool) -> Result<Outcome> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else {
        println!(
            "{} downloaded ({} bytes), {} failed, {} skipped, {} issues unreadable",
            result.succeeded.len(),
            result.bytes_written(),
            result.failed.len(),
            result.skipped.len(),
            result.issue_failures.len()
        );
        if let Some(error) = &result.search_error {
            println!("search stopped early: {error}");
        }
        if result.cancelled {
            println!("run was cancelled");
        }
    }

    Ok(if result.is_clean() {
        Outcome::Clean
    } else {
        Outcome::Partial
    })
}

fn report_tally(result: &CommentTallyResult, json: bool) -> Result<Outcome> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else {
        for (author, count) in result.ranked() {
            println!("{author} {count}");
        }
        println!(
            "{} comments by {} authors across {} issues",
            result.total_comments(),
            result.counts.len(),
            result.issues_scanned
        );
    }

    let clean = result.issue_failures.is_empty()
        && result.search_error.is_none()
        && !result.cancelled;
    Ok(if clean { Outcome::Clean } else { Outcome::Partial })
}
