//! Binary entrypoint for the `jira-attachment-dl` CLI.

use std::process::ExitCode;

use jira_attachment_dl::cli::{self, Cli};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine; real environment variables still apply
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse_args();
    match cli::run(args).await {
        Ok(outcome) => outcome.exit_code(),
        Err(err) => {
            tracing::error!(code = err.error_code(), error = %err, "Run failed");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
