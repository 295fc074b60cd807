//! On-disk document shape, repair and migrations
//!
//! ```json
//! {
//!   "manifest_version": 2,
//!   "settings": { "download_path": "...", "max_concurrent_downloads": 5, ... },
//!   "persistence": {
//!     "courses": { "1234": { "name": "Algorithms", "should_sync": true } },
//!     "last_synced": "2026-10-19T08:00:00Z",
//!     "notifications_sent": false
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::io::ErrorKind;

use chrono::{DateTime, Utc};
use lmsync_core::domain::{CourseEntry, Settings};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::StoreError;

/// Version written by this build; older documents are migrated on load
pub const CURRENT_MANIFEST_VERSION: u32 = 2;

/// The whole persisted state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreDocument {
    #[serde(default)]
    pub manifest_version: u32,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub persistence: Persistence,
}

/// Bookkeeping owned by the application rather than the user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persistence {
    #[serde(default)]
    pub courses: BTreeMap<u64, CourseEntry>,
    #[serde(default)]
    pub last_synced: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notifications_sent: bool,
}

impl StoreDocument {
    /// A fresh document with the given settings
    pub fn with_settings(settings: Settings) -> Self {
        Self {
            manifest_version: CURRENT_MANIFEST_VERSION,
            settings,
            persistence: Persistence::default(),
        }
    }

    /// Builds a document from raw JSON, repairing its shape first
    pub fn from_value(mut value: Value, defaults: &Settings) -> Result<Self, StoreError> {
        repair(&mut value, defaults)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Applies every migration newer than the document's manifest version
    ///
    /// Returns true when the document changed and should be written back.
    pub async fn migrate(&mut self) -> bool {
        let version = self.manifest_version;
        if version >= CURRENT_MANIFEST_VERSION {
            return false;
        }
        info!(
            from = version,
            to = CURRENT_MANIFEST_VERSION,
            "Applying fixes for outdated manifest version"
        );

        if version < 2 {
            self.trim_course_names().await;
        }

        self.manifest_version = CURRENT_MANIFEST_VERSION;
        true
    }

    /// Version 2: course folder names lose leading and trailing whitespace
    async fn trim_course_names(&mut self) {
        let root = self.settings.download_path.clone();
        for (id, entry) in self.persistence.courses.iter_mut() {
            let trimmed = entry.name.trim();
            if trimmed == entry.name {
                continue;
            }
            let from = root.join(&entry.name);
            let to = root.join(trimmed);
            match tokio::fs::rename(&from, &to).await {
                Ok(()) => info!(course = id, to = %to.display(), "Renamed untrimmed course folder"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(course = id, error = %e, "Failed to rename untrimmed course folder");
                }
            }
            entry.name = trimmed.to_string();
        }
    }
}

/// Restores the expected shape of a raw document
///
/// - non-object sections are replaced by empty ones
/// - a course entry missing `name` or `should_sync` resets the whole course map
/// - settings missing from the document take the given defaults
fn repair(value: &mut Value, defaults: &Settings) -> Result<(), StoreError> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    let Some(root) = value.as_object_mut() else {
        return Ok(());
    };

    let settings = root
        .entry("settings")
        .or_insert_with(|| Value::Object(Map::new()));
    if !settings.is_object() {
        *settings = Value::Object(Map::new());
    }
    if let (Some(settings), Value::Object(default_map)) =
        (settings.as_object_mut(), serde_json::to_value(defaults)?)
    {
        for (key, default) in default_map {
            settings.entry(key).or_insert(default);
        }
    }

    let persistence = root
        .entry("persistence")
        .or_insert_with(|| Value::Object(Map::new()));
    if !persistence.is_object() {
        *persistence = Value::Object(Map::new());
    }
    if let Some(persistence) = persistence.as_object_mut() {
        let courses = persistence
            .entry("courses")
            .or_insert_with(|| Value::Object(Map::new()));
        let well_formed = courses.as_object().is_some_and(|map| {
            map.iter().all(|(id, entry)| {
                id.parse::<u64>().is_ok()
                    && entry.get("name").is_some_and(Value::is_string)
                    && entry.get("should_sync").is_some_and(Value::is_boolean)
            })
        });
        if !well_formed {
            warn!("Course map has an unexpected shape, resetting it");
            *courses = Value::Object(Map::new());
        }
    }

    Ok(())
}
