//! Course provider port (driven/secondary port)
//!
//! This module defines how the sync engine reaches the remote platform:
//! course enumeration, per-course file discovery and streaming downloads.
//!
//! ## Design Notes
//!
//! - Unlike the storage ports, these methods return the typed
//!   [`ProviderError`] so the engine maps failures to a sync outcome by
//!   variant, never by inspecting messages.
//! - Downloads are pulled chunk by chunk through [`IDownloadStream`]; the
//!   engine never holds a whole file in memory.

use crate::domain::{Course, FileDescriptor, ProviderError};

/// A streaming response body
#[async_trait::async_trait]
pub trait IDownloadStream: Send {
    /// Declared body length, if the server sent one
    fn content_length(&self) -> Option<u64>;

    /// Next chunk of the body; `Ok(None)` at end of stream
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, ProviderError>;
}

/// Port trait for the remote learning platform
#[async_trait::async_trait]
pub trait ICourseProvider: Send + Sync {
    /// Enumerates enrolled courses with their persisted folder names
    ///
    /// Courses seen for the first time are persisted with `should_sync`
    /// defaulted from the settings. Returns an empty list when not logged in.
    async fn list_enrolled_courses(&self) -> Result<Vec<Course>, ProviderError>;

    /// Lists the downloadable files of one course, with sanitized and
    /// collision-free paths
    async fn list_files(&self, course: &Course) -> Result<Vec<FileDescriptor>, ProviderError>;

    /// Opens an authenticated streaming download
    async fn open_download(
        &self,
        file: &FileDescriptor,
    ) -> Result<Box<dyn IDownloadStream>, ProviderError>;
}
