//! Domain entities and value types
//!
//! - [`course`] - enrolled courses and their persisted folder entries
//! - [`file`] - remote file descriptors produced by each discovery pass
//! - [`settings`] - user-editable sync settings
//! - [`sync`] - sync states, outcomes, progress and observer events
//! - [`errors`] - domain and provider error types

pub mod course;
pub mod errors;
pub mod file;
pub mod settings;
pub mod sync;

pub use course::{Course, CourseEntry};
pub use errors::{DomainError, ProviderError};
pub use file::FileDescriptor;
pub use settings::Settings;
pub use sync::{
    ConnectivityEvent, FileProgress, LoginEvent, NewFile, NewFilesList, Progress, SyncEvent,
    SyncOutcome, SyncState,
};
