//! Common test utilities for jira-attachment-dl integration tests

#[allow(dead_code)]
pub mod config;
#[allow(dead_code)]
pub mod jira;

pub use config::*;
pub use jira::*;
