//! Sync states, outcomes, progress snapshots and observer events

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ============================================================================
// State machine
// ============================================================================

/// Phase of the sync engine
///
/// `Idle -> FetchingCourses -> FetchingFiles -> Downloading -> Idle`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    #[default]
    Idle,
    FetchingCourses,
    FetchingFiles,
    Downloading,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncState::Idle => write!(f, "idle"),
            SyncState::FetchingCourses => write!(f, "fetching_courses"),
            SyncState::FetchingFiles => write!(f, "fetching_files"),
            SyncState::Downloading => write!(f, "downloading"),
        }
    }
}

/// Terminal result of one sync invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Discovery and all downloads completed; the new-file list may be empty
    Success,
    /// Another sync was running; nothing was done
    AlreadySyncing,
    /// A stop was requested
    Stopped,
    /// A transfer or metadata call failed at the transport level
    NetworkError,
    /// Writing to the local mirror failed
    FsError,
    /// Anything else
    UnknownError,
}

impl SyncOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SyncOutcome::Success)
    }
}

impl std::fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncOutcome::Success => write!(f, "success"),
            SyncOutcome::AlreadySyncing => write!(f, "already_syncing"),
            SyncOutcome::Stopped => write!(f, "stopped"),
            SyncOutcome::NetworkError => write!(f, "network_error"),
            SyncOutcome::FsError => write!(f, "fs_error"),
            SyncOutcome::UnknownError => write!(f, "unknown_error"),
        }
    }
}

// ============================================================================
// Progress
// ============================================================================

/// Progress of one in-flight transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileProgress {
    pub filename: String,
    /// Destination relative to the download root
    pub path: PathBuf,
    pub downloaded: u64,
    pub total: u64,
}

/// Aggregate progress while downloads are in flight
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// Bytes of every file queued in this session
    pub total: u64,
    /// Completed bytes plus bytes received by in-flight transfers
    pub downloaded: u64,
    /// One entry per in-flight transfer
    pub files: Vec<FileProgress>,
}

impl Progress {
    /// Completion ratio in `0.0..=1.0`
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.downloaded as f64 / self.total as f64).min(1.0)
    }
}

// ============================================================================
// Reporting
// ============================================================================

/// A file written by a successful transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFile {
    pub filename: String,
    pub absolute_path: PathBuf,
    pub size: u64,
    /// True when an older local copy was replaced
    pub updated: bool,
}

/// Files written during one sync, keyed by course local name
///
/// Entries are appended in completion order; no ordering is implied.
pub type NewFilesList = HashMap<String, Vec<NewFile>>;

// ============================================================================
// Events
// ============================================================================

/// Events broadcast by the sync engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    SyncStarted,
    SyncStopped(SyncOutcome),
    StateChanged(SyncState),
    NewFiles(NewFilesList),
}

/// Connectivity transitions of the API client; emitted once per edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityEvent {
    Connected,
    Disconnected,
}

/// Events broadcast by the login collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginEvent {
    TokenRefreshed(String),
    LoggedOut,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_display_and_success() {
        assert_eq!(SyncOutcome::FsError.to_string(), "fs_error");
        assert_eq!(SyncOutcome::AlreadySyncing.to_string(), "already_syncing");
        assert!(SyncOutcome::Success.is_success());
        assert!(!SyncOutcome::Stopped.is_success());
    }

    #[test]
    fn test_outcome_serializes_snake_case() {
        let json = serde_json::to_string(&SyncOutcome::NetworkError).unwrap();
        assert_eq!(json, "\"network_error\"");
    }

    #[test]
    fn test_progress_ratio() {
        let progress = Progress {
            total: 200,
            downloaded: 50,
            files: vec![],
        };
        assert!((progress.ratio() - 0.25).abs() < f64::EPSILON);

        let empty = Progress {
            total: 0,
            downloaded: 0,
            files: vec![],
        };
        assert_eq!(empty.ratio(), 0.0);
    }

    #[test]
    fn test_default_state_is_idle() {
        assert_eq!(SyncState::default(), SyncState::Idle);
        assert_eq!(SyncState::FetchingFiles.to_string(), "fetching_files");
    }
}
