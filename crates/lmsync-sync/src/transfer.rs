//! Streaming transfer of one file
//!
//! The body is written chunk by chunk straight to the destination; the
//! modification time is stamped only after the last byte is flushed, so a
//! file with the remote mtime is known to be complete.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use lmsync_core::ports::ICourseProvider;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::session::{Claim, SyncSession};
use crate::SyncError;

/// Downloads a claimed file under `root` and returns its absolute path
///
/// Cancellation of the session ends the transfer with [`SyncError::Stopped`]
/// at the next suspension point.
#[tracing::instrument(skip_all, fields(path = %claim.file.local_relative_path().display()))]
pub async fn download(
    provider: &dyn ICourseProvider,
    session: &SyncSession,
    claim: &Claim,
    root: &Path,
) -> Result<PathBuf, SyncError> {
    let cancel = session.cancel_token();
    let destination = claim.file.destination(root);

    let mut stream = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(SyncError::Stopped),
        opened = provider.open_download(&claim.file) => opened?,
    };
    if let Some(length) = stream.content_length() {
        session.set_expected(claim.id, length);
    }

    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| SyncError::fs(parent, e))?;
    }
    let mut out = match tokio::fs::File::create(&destination).await {
        Ok(out) => out,
        Err(e) => {
            let is_dir = tokio::fs::metadata(&destination)
                .await
                .is_ok_and(|m| m.is_dir());
            return Err(if is_dir {
                SyncError::IsDirectory(destination)
            } else {
                SyncError::fs(&destination, e)
            });
        }
    };

    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SyncError::Stopped),
            chunk = stream.next_chunk() => chunk?,
        };
        let Some(bytes) = chunk else {
            break;
        };
        out.write_all(&bytes)
            .await
            .map_err(|e| SyncError::fs(&destination, e))?;
        session.record_chunk(claim.id, bytes.len() as u64);
    }
    out.flush()
        .await
        .map_err(|e| SyncError::fs(&destination, e))?;
    drop(out);

    set_times(&destination, claim.file.modified_at).await?;
    debug!(bytes = claim.file.size_bytes, "Transfer complete");
    Ok(destination)
}

fn to_system_time(at: DateTime<Utc>) -> SystemTime {
    let secs = at.timestamp();
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs.unsigned_abs())
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs())
    }
}

/// Sets the modification time to `modified` and the access time to now
pub async fn set_times(path: &Path, modified: DateTime<Utc>) -> Result<(), SyncError> {
    let owned = path.to_path_buf();
    let mtime = to_system_time(modified);
    let result = tokio::task::spawn_blocking(move || {
        let file = std::fs::OpenOptions::new().write(true).open(&owned)?;
        file.set_times(
            std::fs::FileTimes::new()
                .set_accessed(SystemTime::now())
                .set_modified(mtime),
        )
    })
    .await
    .map_err(|e| SyncError::fs(path, std::io::Error::other(e)))?;
    result.map_err(|e| SyncError::fs(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_times_stamps_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"x").unwrap();

        let modified = DateTime::from_timestamp(1_700_000_500, 0).unwrap();
        set_times(&path, modified).await.unwrap();

        let mtime = std::fs::metadata(&path).unwrap().modified().unwrap();
        assert_eq!(
            mtime.duration_since(UNIX_EPOCH).unwrap().as_secs(),
            1_700_000_500
        );
    }
}
