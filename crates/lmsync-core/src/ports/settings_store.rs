//! Settings store port (driven/secondary port)
//!
//! Persisted key-value state consumed by the resolver and the sync engine.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific.
//! - Every accessor awaits the readiness barrier itself, so callers may use
//!   the store right after construction; [`ISettingsStore::ready`] exists for
//!   callers that want to surface load errors early.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::domain::{CourseEntry, Settings};

/// Port trait for persisted settings and bookkeeping
#[async_trait::async_trait]
pub trait ISettingsStore: Send + Sync {
    /// Waits until the backing data is loaded, repaired and migrated
    async fn ready(&self) -> anyhow::Result<()>;

    async fn settings(&self) -> anyhow::Result<Settings>;

    async fn save_settings(&self, settings: &Settings) -> anyhow::Result<()>;

    /// Wall-clock time of the last successful sync
    async fn last_synced(&self) -> anyhow::Result<Option<DateTime<Utc>>>;

    async fn set_last_synced(&self, at: DateTime<Utc>) -> anyhow::Result<()>;

    /// All persisted course entries keyed by platform course id
    async fn courses(&self) -> anyhow::Result<BTreeMap<u64, CourseEntry>>;

    async fn course(&self, id: u64) -> anyhow::Result<Option<CourseEntry>>;

    /// Inserts or replaces entries in one write
    async fn save_courses(&self, entries: &[(u64, CourseEntry)]) -> anyhow::Result<()>;

    /// Inserts or replaces one entry
    async fn save_course(&self, id: u64, entry: &CourseEntry) -> anyhow::Result<()> {
        self.save_courses(&[(id, entry.clone())]).await
    }

    /// Whether the "new notifications" hint was already shown
    async fn notifications_sent(&self) -> anyhow::Result<bool>;

    async fn set_notifications_sent(&self, sent: bool) -> anyhow::Result<()>;
}
