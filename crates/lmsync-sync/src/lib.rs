//! lmsync Sync - Download engine
//!
//! Provides:
//! - Diff-set computation between remote descriptors and the local mirror
//! - A bounded, cancellable pool of streaming downloads
//! - Progress snapshots cheap enough to poll
//! - A minute-aligned autosync scheduler
//!
//! ## Modules
//!
//! - [`engine`] - [`SyncEngine`], the sync state machine and worker pool
//! - [`session`] - per-run queue, in-flight set and byte counters
//! - [`diff`] - decides which remote files need downloading
//! - [`transfer`] - streams one file to disk and stamps its times
//! - [`scheduler`] - [`AutosyncScheduler`]

pub mod diff;
pub mod engine;
pub mod scheduler;
pub mod session;
pub mod transfer;

use std::path::{Path, PathBuf};

use lmsync_core::domain::{ProviderError, SyncOutcome};
use thiserror::Error;

pub use engine::SyncEngine;
pub use scheduler::AutosyncScheduler;

/// Errors that end a sync run
#[derive(Debug, Error)]
pub enum SyncError {
    /// A stop was requested, or a sibling transfer aborted the run
    #[error("Sync stopped")]
    Stopped,

    /// Transport failure during discovery or a transfer
    #[error("Network error: {0}")]
    Network(String),

    /// Writing to the local mirror failed
    #[error("Filesystem error on {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The destination of a file exists as a directory
    #[error("Destination is a directory: {0}")]
    IsDirectory(PathBuf),

    /// Any other provider failure
    #[error("Provider error: {0}")]
    Provider(ProviderError),

    /// The settings store failed
    #[error("Store error: {0:#}")]
    Store(anyhow::Error),
}

impl SyncError {
    pub(crate) fn fs(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        SyncError::Filesystem {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Terminal outcome reported for this error
    pub fn outcome(&self) -> SyncOutcome {
        match self {
            SyncError::Stopped => SyncOutcome::Stopped,
            SyncError::Network(_) => SyncOutcome::NetworkError,
            SyncError::Filesystem { .. } | SyncError::IsDirectory(_) => SyncOutcome::FsError,
            SyncError::Provider(_) | SyncError::Store(_) => SyncOutcome::UnknownError,
        }
    }
}

impl From<ProviderError> for SyncError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Network(message) => SyncError::Network(message),
            other => SyncError::Provider(other),
        }
    }
}
