//! Subcommand implementations

pub mod auth;
pub mod config;
pub mod courses;
pub mod notifications;
pub mod settings;
pub mod sync;
