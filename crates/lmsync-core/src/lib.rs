//! lmsync Core - Domain types, ports and path utilities
//!
//! This crate contains the hexagonal core of the course mirror:
//! - **Domain types** - `Course`, `FileDescriptor`, `Settings`, sync states,
//!   outcomes, progress snapshots and the events observers receive
//! - **Port definitions** - Traits for adapters: `ICourseProvider`,
//!   `ISettingsStore`, `ICredentialStore`, `ILoginProvider`, `IReauthPrompt`
//! - **Path utilities** - sanitization, size formatting, short call ids
//! - **Configuration** - the YAML `Config` loaded by the binaries
//!
//! # Architecture
//!
//! The domain module has no I/O. Ports define the trait interfaces that the
//! adapter crates (`lmsync-moodle`, `lmsync-store`) implement and that the
//! sync engine consumes.

pub mod config;
pub mod domain;
pub mod ports;
pub mod sanitize;
