//! Autosync scheduler
//!
//! Ticks once per minute, aligned to the wall-clock minute boundary. On each
//! tick an unattended sync starts when autosync is enabled, no sync is
//! running, and more than the configured interval has passed since the last
//! successful sync. Missed ticks are skipped, not queued; the elapsed-time
//! comparison catches up on the next tick.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use lmsync_core::ports::ISettingsStore;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::SyncEngine;

const MINUTE: Duration = Duration::from_secs(60);

/// Whether an unattended sync should start now
pub fn autosync_due(
    enabled: bool,
    syncing: bool,
    last_synced: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    interval: Duration,
) -> bool {
    if !enabled || syncing {
        return false;
    }
    match last_synced {
        None => true,
        Some(last) => (now - last).to_std().is_ok_and(|elapsed| elapsed > interval),
    }
}

/// Time left until the next wall-clock minute boundary
fn until_next_minute(now: DateTime<Utc>) -> Duration {
    let into_minute = Duration::from_secs(now.timestamp().rem_euclid(60).unsigned_abs())
        + Duration::from_nanos(u64::from(now.timestamp_subsec_nanos()));
    MINUTE.saturating_sub(into_minute)
}

/// Starts unattended syncs on a timer
pub struct AutosyncScheduler {
    engine: Arc<SyncEngine>,
    store: Arc<dyn ISettingsStore>,
    period: Duration,
    align_to_minute: bool,
}

impl AutosyncScheduler {
    pub fn new(engine: Arc<SyncEngine>, store: Arc<dyn ISettingsStore>) -> Self {
        Self {
            engine,
            store,
            period: MINUTE,
            align_to_minute: true,
        }
    }

    /// Uses a custom, unaligned tick period (useful for testing)
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self.align_to_minute = false;
        self
    }

    /// Runs until `shutdown` is cancelled
    pub async fn run(&self, shutdown: CancellationToken) {
        let start = if self.align_to_minute {
            Instant::now() + until_next_minute(Utc::now())
        } else {
            Instant::now() + self.period
        };
        let mut ticker = tokio::time::interval_at(start, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(period_secs = self.period.as_secs(), "Autosync scheduler started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => self.tick().await,
            }
        }
        info!("Autosync scheduler stopped");
    }

    async fn tick(&self) {
        let stored = (self.store.settings().await, self.store.last_synced().await);
        let (settings, last_synced) = match stored {
            (Ok(settings), Ok(last_synced)) => (settings, last_synced),
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "Autosync check failed to read the store");
                return;
            }
        };
        if !autosync_due(
            settings.autosync_enabled,
            self.engine.is_syncing(),
            last_synced,
            Utc::now(),
            settings.autosync_interval(),
        ) {
            return;
        }

        debug!(?last_synced, "Autosync due, starting sync");
        let engine = Arc::clone(&self.engine);
        tokio::spawn(async move {
            let outcome = engine.run_sync().await;
            info!(outcome = %outcome, "Autosync finished");
        });
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use lmsync_core::domain::{Course, FileDescriptor, ProviderError, Settings};
    use lmsync_core::ports::{ICourseProvider, IDownloadStream};
    use lmsync_store::MemoryStore;

    use super::*;

    struct NoCourses;

    #[async_trait::async_trait]
    impl ICourseProvider for NoCourses {
        async fn list_enrolled_courses(&self) -> Result<Vec<Course>, ProviderError> {
            Ok(Vec::new())
        }

        async fn list_files(&self, _course: &Course) -> Result<Vec<FileDescriptor>, ProviderError> {
            Ok(Vec::new())
        }

        async fn open_download(
            &self,
            _file: &FileDescriptor,
        ) -> Result<Box<dyn IDownloadStream>, ProviderError> {
            Err(ProviderError::NotAuthenticated)
        }
    }

    #[test]
    fn test_autosync_due_rules() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        let hour = Duration::from_secs(3600);
        let two_hours_ago = Some(now - chrono::Duration::hours(2));
        let ten_minutes_ago = Some(now - chrono::Duration::minutes(10));

        assert!(autosync_due(true, false, None, now, hour));
        assert!(autosync_due(true, false, two_hours_ago, now, hour));
        assert!(!autosync_due(true, false, ten_minutes_ago, now, hour));
        assert!(!autosync_due(false, false, two_hours_ago, now, hour));
        assert!(!autosync_due(true, true, two_hours_ago, now, hour));
        assert!(!autosync_due(true, false, Some(now + chrono::Duration::hours(1)), now, hour));
    }

    #[test]
    fn test_until_next_minute() {
        let at = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 45).unwrap();
        assert_eq!(until_next_minute(at), Duration::from_secs(15));
        let at = Utc.with_ymd_and_hms(2026, 10, 19, 12, 1, 0).unwrap();
        assert_eq!(until_next_minute(at), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_scheduler_starts_due_sync() {
        let store = Arc::new(MemoryStore::new(Settings::default()));
        let engine = Arc::new(SyncEngine::new(Arc::new(NoCourses), store.clone()));
        let scheduler = AutosyncScheduler::new(Arc::clone(&engine), store.clone())
            .with_period(Duration::from_millis(10));
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn({
            let shutdown = shutdown.clone();
            async move { scheduler.run(shutdown).await }
        });

        let deadline = Instant::now() + Duration::from_secs(5);
        while store.last_synced().await.unwrap().is_none() {
            assert!(Instant::now() < deadline, "autosync never ran");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_scheduler_respects_disabled_autosync() {
        let store = Arc::new(MemoryStore::new(Settings {
            autosync_enabled: false,
            ..Settings::default()
        }));
        let engine = Arc::new(SyncEngine::new(Arc::new(NoCourses), store.clone()));
        let scheduler = AutosyncScheduler::new(engine, store.clone())
            .with_period(Duration::from_millis(5));
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn({
            let shutdown = shutdown.clone();
            async move { scheduler.run(shutdown).await }
        });
        tokio::time::sleep(Duration::from_millis(60)).await;
        shutdown.cancel();
        handle.await.unwrap();

        assert!(store.last_synced().await.unwrap().is_none());
    }
}
