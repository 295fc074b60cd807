//! JSON-file implementation of the settings store
//!
//! The document is loaded lazily on first access: missing files start empty,
//! unreadable JSON is moved aside, the shape is repaired, migrations run, and
//! the result is written back. Every mutation writes the whole document to a
//! temporary sibling and renames it over the original.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Utc};
use lmsync_core::domain::{CourseEntry, Settings};
use lmsync_core::ports::ISettingsStore;
use serde_json::Value;
use tokio::sync::{Mutex, MutexGuard, OnceCell};
use tracing::{debug, info, warn};

use crate::document::StoreDocument;
use crate::StoreError;

/// File-backed settings store
pub struct JsonStore {
    path: PathBuf,
    defaults: Settings,
    doc: OnceCell<Mutex<StoreDocument>>,
}

impl JsonStore {
    /// Creates a store for `path`; nothing is read until first use
    ///
    /// `defaults` fills any setting the file does not define.
    pub fn new(path: impl Into<PathBuf>, defaults: Settings) -> Self {
        Self {
            path: path.into(),
            defaults,
            doc: OnceCell::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the whole document
    pub async fn document(&self) -> Result<StoreDocument, StoreError> {
        Ok(self.lock().await?.clone())
    }

    async fn lock(&self) -> Result<MutexGuard<'_, StoreDocument>, StoreError> {
        let cell = self
            .doc
            .get_or_try_init(|| async { self.load().await.map(Mutex::new) })
            .await?;
        Ok(cell.lock().await)
    }

    #[tracing::instrument(skip(self), fields(path = %self.path.display()))]
    async fn load(&self) -> Result<StoreDocument, StoreError> {
        let (value, existed) = match tokio::fs::read(&self.path).await {
            Ok(bytes) => match serde_json::from_slice::<Value>(&bytes) {
                Ok(value) => (value, true),
                Err(e) => {
                    let backup = self.path.with_extension("json.corrupt");
                    warn!(
                        error = %e,
                        backup = %backup.display(),
                        "Store file is not valid JSON, starting over"
                    );
                    tokio::fs::rename(&self.path, &backup)
                        .await
                        .map_err(|e| StoreError::io(&self.path, e))?;
                    (Value::Null, false)
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No store file yet");
                (Value::Null, false)
            }
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };

        let mut doc = StoreDocument::from_value(value, &self.defaults)?;
        if !existed {
            doc.manifest_version = crate::document::CURRENT_MANIFEST_VERSION;
        }
        let migrated = doc.migrate().await;
        if migrated || !existed {
            self.write(&doc).await?;
        }
        info!(courses = doc.persistence.courses.len(), "Store ready");
        Ok(doc)
    }

    async fn write(&self, doc: &StoreDocument) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(parent, e))?;
        }
        let json = serde_json::to_vec_pretty(doc)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| StoreError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StoreError::io(&self.path, e))
    }

    /// Applies `change` and persists it; memory is only updated after the write succeeds
    async fn update<F>(&self, change: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut StoreDocument),
    {
        let mut guard = self.lock().await?;
        let mut next = guard.clone();
        change(&mut next);
        if next == *guard {
            return Ok(());
        }
        self.write(&next).await?;
        *guard = next;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ISettingsStore for JsonStore {
    async fn ready(&self) -> Result<()> {
        self.lock().await?;
        Ok(())
    }

    async fn settings(&self) -> Result<Settings> {
        Ok(self.lock().await?.settings.clone())
    }

    async fn save_settings(&self, settings: &Settings) -> Result<()> {
        let settings = settings.clone();
        self.update(|doc| doc.settings = settings).await?;
        Ok(())
    }

    async fn last_synced(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.lock().await?.persistence.last_synced)
    }

    async fn set_last_synced(&self, at: DateTime<Utc>) -> Result<()> {
        self.update(|doc| doc.persistence.last_synced = Some(at))
            .await?;
        Ok(())
    }

    async fn courses(&self) -> Result<BTreeMap<u64, CourseEntry>> {
        Ok(self.lock().await?.persistence.courses.clone())
    }

    async fn course(&self, id: u64) -> Result<Option<CourseEntry>> {
        Ok(self.lock().await?.persistence.courses.get(&id).cloned())
    }

    async fn save_courses(&self, entries: &[(u64, CourseEntry)]) -> Result<()> {
        self.update(|doc| {
            for (id, entry) in entries {
                doc.persistence.courses.insert(*id, entry.clone());
            }
        })
        .await?;
        Ok(())
    }

    async fn notifications_sent(&self) -> Result<bool> {
        Ok(self.lock().await?.persistence.notifications_sent)
    }

    async fn set_notifications_sent(&self, sent: bool) -> Result<()> {
        self.update(|doc| doc.persistence.notifications_sent = sent)
            .await?;
        Ok(())
    }
}
