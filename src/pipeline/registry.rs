//! Run-scoped destination name reservation.

use crate::error::{Error, Result};
use crate::utils::candidate_name;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Maximum number of rename attempts when resolving file collisions
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Hands out destination paths that are unique within a run and do not
/// collide with files already in the output directory.
///
/// A name is claimed on disk (create-new) while the registry lock is held,
/// so concurrent reservations and files created by other processes in the
/// meantime are both handled.
pub struct FilenameRegistry {
    dir: PathBuf,
    taken: Mutex<HashSet<String>>,
}

impl FilenameRegistry {
    /// Create an empty registry for `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            taken: Mutex::new(HashSet::new()),
        }
    }

    /// Directory names are reserved in
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reserve `stem.ext`, or the first free `stem (n).ext`, and create it empty.
    pub async fn reserve(&self, stem: &str, extension: &str) -> Result<PathBuf> {
        let mut taken = self.taken.lock().await;

        for round in 0..=MAX_RENAME_ATTEMPTS {
            let name = candidate_name(stem, extension, round);
            if taken.contains(&name) {
                continue;
            }
            let path = self.dir.join(&name);
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(_) => {
                    taken.insert(name);
                    return Ok(path);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    // Pre-existing file; never overwrite it
                    taken.insert(name);
                }
                Err(e) => return Err(Error::Io(e)),
            }
        }

        Err(Error::FileCollision {
            path: self.dir.join(candidate_name(stem, extension, 0)),
            reason: format!(
                "Could not find unique filename after {} attempts",
                MAX_RENAME_ATTEMPTS
            ),
        })
    }

    /// Remove a reserved file from disk after its task failed.
    ///
    /// The name stays taken for the rest of the run.
    pub async fn release(&self, path: &Path) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial file");
            }
        }
    }

    /// Number of names taken so far (reserved or found on disk)
    pub async fn taken_count(&self) -> usize {
        self.taken.lock().await.len()
    }
}
