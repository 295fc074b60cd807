//! lmsync Store - Persisted settings and course map
//!
//! JSON-file persistence for:
//! - user settings (download path, concurrency, autosync)
//! - the per-course `{name, should_sync}` map
//! - the last successful sync time
//! - the first-notification flag
//!
//! ## Architecture
//!
//! This crate implements the `ISettingsStore` port from `lmsync-core`. It is
//! a driven (secondary) adapter in the hexagonal architecture.
//!
//! ## Key Components
//!
//! - [`JsonStore`] - file-backed store with a lazy readiness barrier,
//!   shape repair, manifest migrations and atomic writes
//! - [`MemoryStore`] - in-process store for tests and dry runs
//! - [`StoreError`] - error types for store operations
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::PathBuf;
//! use lmsync_core::domain::Settings;
//! use lmsync_core::ports::ISettingsStore;
//! use lmsync_store::JsonStore;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let path = PathBuf::from("/home/user/.local/share/lmsync/store.json");
//! let store = JsonStore::new(path, Settings::default());
//! store.ready().await?;
//! println!("{}", store.settings().await?.download_path.display());
//! # Ok(())
//! # }
//! ```

pub mod document;
pub mod json;
pub mod memory;

use std::path::PathBuf;

pub use document::StoreDocument;
pub use json::JsonStore;
pub use memory::MemoryStore;

/// Errors that can occur during store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing the store file failed
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serialization or deserialization of the document failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}
