//! Port definitions (hexagonal architecture interfaces)
//!
//! ## Ports Overview
//!
//! - [`ICourseProvider`] / [`IDownloadStream`] - course enumeration, file
//!   discovery and streaming downloads
//! - [`ISettingsStore`] - persisted settings, course map and sync bookkeeping
//! - [`ICredentialStore`] - opaque token storage
//! - [`ILoginProvider`] / [`IReauthPrompt`] - token ownership and the
//!   interactive re-login surface

pub mod course_provider;
pub mod credential_store;
pub mod login;
pub mod settings_store;

pub use course_provider::{ICourseProvider, IDownloadStream};
pub use credential_store::ICredentialStore;
pub use login::{ILoginProvider, IReauthPrompt};
pub use settings_store::ISettingsStore;
