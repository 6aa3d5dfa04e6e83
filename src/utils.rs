//! Utility functions for attachment classification and destination naming

use crate::error::{Error, Result};
use std::path::Path;

/// Return the last path segment of a content reference, percent-decoded.
///
/// Works for absolute URLs (query and fragment ignored) and for bare file
/// names or relative paths.
///
/// # Examples
///
/// ```
/// use jira_attachment_dl::utils::last_path_segment;
///
/// let segment = last_path_segment("https://jira.example.com/secure/attachment/1/My%20Shot.png?x=1");
/// assert_eq!(segment, "My Shot.png");
/// ```
pub fn last_path_segment(reference: &str) -> String {
    let raw = match url::Url::parse(reference) {
        Ok(url) => url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or_default()
            .to_string(),
        Err(_) => {
            let without_query = reference
                .split(['?', '#'])
                .next()
                .unwrap_or_default();
            without_query
                .rsplit(['/', '\\'])
                .next()
                .unwrap_or_default()
                .to_string()
        }
    };

    match urlencoding::decode(&raw) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => raw,
    }
}

/// Split a file name at its final dot into `(stem, extension)`.
///
/// The extension keeps its leading dot. A name with no dot, or ending in a
/// dot, has no extension. A leading dot starts the extension (`.png` has an
/// empty stem).
fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(idx) if idx + 1 < name.len() => (&name[..idx], Some(&name[idx..])),
        _ => (name, None),
    }
}

/// Lower-cased extension (with leading dot) of a content reference's file name
pub fn extension_of(reference: &str) -> Option<String> {
    let segment = sanitize_segment(&last_path_segment(reference));
    split_extension(&segment).1.map(str::to_lowercase)
}

/// Normalize a configured extension to the `.ext` lower-case form
pub fn normalize_extension(extension: &str) -> String {
    let trimmed = extension.trim().trim_start_matches('.');
    format!(".{}", trimmed.to_lowercase())
}

/// Case-insensitive allow-list check
pub fn is_allowed_extension(extension: &str, allowed: &[String]) -> bool {
    let extension = normalize_extension(extension);
    allowed
        .iter()
        .any(|candidate| normalize_extension(candidate) == extension)
}

/// Derive the destination file stem for an attachment.
///
/// The stem is the decoded last path segment without its extension. Characters
/// that would escape the output directory or are invalid on common filesystems
/// are replaced with `_`. An empty result falls back to `attachment-<id>`.
pub fn destination_stem(reference: &str, attachment_id: &str) -> String {
    let segment = sanitize_segment(&last_path_segment(reference));
    let (stem, _) = split_extension(&segment);
    let stem = stem.trim().trim_matches('.');

    if stem.is_empty() {
        format!("attachment-{}", attachment_id)
    } else {
        stem.to_string()
    }
}

/// Replace path separators and characters invalid on common filesystems with `_`
fn sanitize_segment(segment: &str) -> String {
    segment
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// Candidate file name for collision round `round` (0 = no suffix).
///
/// Produces `stem.ext`, then `stem (1).ext`, `stem (2).ext`, ...
pub fn candidate_name(stem: &str, extension: &str, round: u32) -> String {
    if round == 0 {
        format!("{}{}", stem, extension)
    } else {
        format!("{} ({}){}", stem, round, extension)
    }
}

/// Fail unless `path` is an existing, writable directory.
///
/// Writability is probed by creating and removing a hidden file.
pub async fn ensure_output_dir(path: &Path) -> Result<()> {
    let output_dir_error = |reason: String| Error::OutputDir {
        path: path.to_path_buf(),
        reason,
    };

    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| output_dir_error(e.to_string()))?;
    if !metadata.is_dir() {
        return Err(output_dir_error("not a directory".to_string()));
    }

    let probe = path.join(format!(".jira-attachment-dl-probe-{}", std::process::id()));
    tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&probe)
        .await
        .map_err(|e| output_dir_error(format!("not writable: {}", e)))?;
    if let Err(e) = tokio::fs::remove_file(&probe).await {
        tracing::warn!(path = %probe.display(), error = %e, "Failed to remove write probe");
    }
    Ok(())
}
