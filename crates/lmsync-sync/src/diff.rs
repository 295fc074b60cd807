//! Diff-set computation
//!
//! A remote file is queued when it has no local copy, when the local mtime
//! (whole seconds) differs from the remote modification time, or when the
//! sizes differ. A remote size of exactly zero skips the size comparison.

use std::path::Path;
use std::time::UNIX_EPOCH;

use lmsync_core::domain::FileDescriptor;
use tracing::debug;

/// Stats of an existing local copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalStat {
    /// Modification time, seconds since the epoch
    pub modified_secs: i64,
    pub size: u64,
}

impl LocalStat {
    pub fn from_metadata(metadata: &std::fs::Metadata) -> Self {
        let modified_secs = metadata
            .modified()
            .ok()
            .and_then(|t| match t.duration_since(UNIX_EPOCH) {
                Ok(d) => i64::try_from(d.as_secs()).ok(),
                Err(e) => i64::try_from(e.duration().as_secs()).ok().map(|s| -s),
            })
            .unwrap_or(i64::MIN);
        Self {
            modified_secs,
            size: metadata.len(),
        }
    }
}

/// Why a file is or is not in the diff set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    UpToDate,
    Missing,
    Changed,
}

/// Compares one remote file against its local copy
pub fn compare(file: &FileDescriptor, local: Option<LocalStat>) -> Decision {
    let Some(local) = local else {
        return Decision::Missing;
    };
    if local.modified_secs != file.modified_at.timestamp() {
        return Decision::Changed;
    }
    if file.size_bytes != 0 && local.size != file.size_bytes {
        return Decision::Changed;
    }
    Decision::UpToDate
}

/// Stats every file under `root` and keeps the ones that need downloading
///
/// Files replacing an existing local copy are flagged `is_update`.
pub async fn resolve_diff(files: Vec<FileDescriptor>, root: &Path) -> Vec<FileDescriptor> {
    let mut queued = Vec::new();
    for mut file in files {
        let destination = file.destination(root);
        let local = tokio::fs::metadata(&destination)
            .await
            .ok()
            .map(|m| LocalStat::from_metadata(&m));
        match compare(&file, local) {
            Decision::UpToDate => {}
            Decision::Missing => queued.push(file),
            Decision::Changed => {
                debug!(path = %destination.display(), "Local copy differs from remote");
                file.is_update = true;
                queued.push(file);
            }
        }
    }
    queued
}
