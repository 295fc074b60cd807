//! Remote file descriptor
//!
//! A [`FileDescriptor`] is rebuilt on every discovery pass and never persisted.
//! Its identity for diffing is `(relative_path, filename)` together with the
//! local filesystem's own mtime and size.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One downloadable file of a course
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// Local name of the owning course
    pub course_name: String,
    /// Sanitized display filename
    pub filename: String,
    /// Sanitized folder relative to the download root, starting with the course folder
    pub relative_path: PathBuf,
    /// Remote size in bytes; zero for placeholder entries
    pub size_bytes: u64,
    /// Download URL, without the token
    pub download_url: String,
    /// Remote creation time
    pub created_at: DateTime<Utc>,
    /// Remote modification time
    pub modified_at: DateTime<Utc>,
    /// Set when a local copy exists with different stats
    pub is_update: bool,
}

impl FileDescriptor {
    /// Path relative to the download root, including the filename
    pub fn local_relative_path(&self) -> PathBuf {
        self.relative_path.join(&self.filename)
    }

    /// Absolute destination under `root`
    pub fn destination(&self, root: &Path) -> PathBuf {
        root.join(self.local_relative_path())
    }
}
