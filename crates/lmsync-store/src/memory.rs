//! In-memory settings store

use std::collections::BTreeMap;
use std::sync::Mutex;

use anyhow::Result;
use chrono::{DateTime, Utc};
use lmsync_core::domain::{CourseEntry, Settings};
use lmsync_core::ports::ISettingsStore;

use crate::document::StoreDocument;

/// Store that keeps everything in process memory
///
/// Never touches disk.
pub struct MemoryStore {
    doc: Mutex<StoreDocument>,
}

impl MemoryStore {
    pub fn new(settings: Settings) -> Self {
        Self {
            doc: Mutex::new(StoreDocument::with_settings(settings)),
        }
    }

    /// Seeds the course map
    pub fn with_courses(self, courses: impl IntoIterator<Item = (u64, CourseEntry)>) -> Self {
        self.with(|doc| doc.persistence.courses.extend(courses));
        self
    }

    fn with<T>(&self, f: impl FnOnce(&mut StoreDocument) -> T) -> T {
        let mut doc = self.doc.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut doc)
    }
}

#[async_trait::async_trait]
impl ISettingsStore for MemoryStore {
    async fn ready(&self) -> Result<()> {
        Ok(())
    }

    async fn settings(&self) -> Result<Settings> {
        Ok(self.with(|doc| doc.settings.clone()))
    }

    async fn save_settings(&self, settings: &Settings) -> Result<()> {
        self.with(|doc| doc.settings = settings.clone());
        Ok(())
    }

    async fn last_synced(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.with(|doc| doc.persistence.last_synced))
    }

    async fn set_last_synced(&self, at: DateTime<Utc>) -> Result<()> {
        self.with(|doc| doc.persistence.last_synced = Some(at));
        Ok(())
    }

    async fn courses(&self) -> Result<BTreeMap<u64, CourseEntry>> {
        Ok(self.with(|doc| doc.persistence.courses.clone()))
    }

    async fn course(&self, id: u64) -> Result<Option<CourseEntry>> {
        Ok(self.with(|doc| doc.persistence.courses.get(&id).cloned()))
    }

    async fn save_courses(&self, entries: &[(u64, CourseEntry)]) -> Result<()> {
        self.with(|doc| {
            for (id, entry) in entries {
                doc.persistence.courses.insert(*id, entry.clone());
            }
        });
        Ok(())
    }

    async fn notifications_sent(&self) -> Result<bool> {
        Ok(self.with(|doc| doc.persistence.notifications_sent))
    }

    async fn set_notifications_sent(&self, sent: bool) -> Result<()> {
        self.with(|doc| doc.persistence.notifications_sent = sent);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_seeded_courses_and_updates() {
        let store = MemoryStore::new(Settings::default()).with_courses([(
            4,
            CourseEntry {
                name: "Algorithms".into(),
                should_sync: true,
            },
        )]);

        assert_eq!(store.courses().await.unwrap().len(), 1);
        store
            .save_course(
                4,
                &CourseEntry {
                    name: "Algo".into(),
                    should_sync: false,
                },
            )
            .await
            .unwrap();
        let entry = store.course(4).await.unwrap().unwrap();
        assert_eq!(entry.name, "Algo");
        assert!(!entry.should_sync);

        assert!(store.last_synced().await.unwrap().is_none());
        let now = Utc::now();
        store.set_last_synced(now).await.unwrap();
        assert_eq!(store.last_synced().await.unwrap(), Some(now));
    }
}
