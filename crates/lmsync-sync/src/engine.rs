//! Download engine
//!
//! The [`SyncEngine`] mirrors every course flagged `should_sync` into the
//! download folder.
//!
//! ## Sync Flow
//!
//! 1. **Courses**: enumerate enrolled courses (`FetchingCourses`)
//! 2. **Files**: list each synced course's files and keep the ones whose
//!    local copy is missing or differs (`FetchingFiles`)
//! 3. **Downloads**: run a bounded pool of streaming transfers
//!    (`Downloading`), then report the files written
//!
//! ## Worker Pool
//!
//! `min(max_concurrent_downloads, queued)` workers run inside the calling
//! task, driven by a `FuturesUnordered`. Each worker claims a file, streams
//! it, and claims the next until the queue is empty or the run is cancelled.
//! The first failing worker cancels its siblings; its error decides the
//! outcome.
//!
//! ## Outcomes
//!
//! Every run ends with exactly one [`SyncEvent::SyncStopped`] carrying a
//! [`SyncOutcome`]. `last_synced` is recorded only on success.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use futures_util::stream::{FuturesUnordered, StreamExt};
use lmsync_core::domain::{
    FileDescriptor, Progress, ProviderError, SyncEvent, SyncOutcome, SyncState,
};
use lmsync_core::ports::{ICourseProvider, ISettingsStore};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::diff::resolve_diff;
use crate::session::SyncSession;
use crate::transfer;
use crate::SyncError;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Number of workers for a requested pool size and a queue length
///
/// Requests below one are clamped to one.
pub fn worker_count(max_concurrent_downloads: i64, queued: usize) -> usize {
    let requested = if max_concurrent_downloads < 1 {
        1
    } else {
        usize::try_from(max_concurrent_downloads).unwrap_or(usize::MAX)
    };
    requested.min(queued)
}

/// Cancellation handle and session of the running sync
#[derive(Default)]
struct ActiveRun {
    cancel: CancellationToken,
    session: Option<Arc<SyncSession>>,
}

// ============================================================================
// SyncEngine
// ============================================================================

/// Course mirror engine
///
/// Constructed with its collaborators; several engines may coexist.
pub struct SyncEngine {
    provider: Arc<dyn ICourseProvider>,
    store: Arc<dyn ISettingsStore>,
    syncing: AtomicBool,
    state: Mutex<SyncState>,
    active: Mutex<Option<ActiveRun>>,
    events: broadcast::Sender<SyncEvent>,
}

impl SyncEngine {
    pub fn new(provider: Arc<dyn ICourseProvider>, store: Arc<dyn ISettingsStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            provider,
            store,
            syncing: AtomicBool::new(false),
            state: Mutex::new(SyncState::Idle),
            active: Mutex::new(None),
            events,
        }
    }

    /// Subscribes to sync events
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> SyncState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn active(&self) -> MutexGuard<'_, Option<ActiveRun>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Aggregate progress of the running downloads; `None` when nothing is in flight
    ///
    /// Reads in-memory counters only.
    pub fn current_progress(&self) -> Option<Progress> {
        let session = self.active().as_ref()?.session.clone()?;
        session.progress()
    }

    /// Requests the running sync to stop
    ///
    /// No new transfer starts afterwards and in-flight transfers are
    /// cancelled. Returns immediately; the run reports `Stopped` through its
    /// `SyncStopped` event. Safe to call at any time, any number of times.
    pub fn stop(&self) {
        if let Some(run) = self.active().as_ref() {
            if !run.cancel.is_cancelled() {
                info!("Stop requested");
                run.cancel.cancel();
            }
        }
    }

    /// Enables or disables unattended syncs
    pub async fn set_autosync(&self, enabled: bool) -> anyhow::Result<()> {
        let mut settings = self.store.settings().await?;
        settings.autosync_enabled = enabled;
        self.store.save_settings(&settings).await?;
        info!(enabled, "Autosync updated");
        Ok(())
    }

    /// Runs one sync and returns whether it succeeded
    pub async fn sync(&self) -> bool {
        self.run_sync().await.is_success()
    }

    /// Runs one sync and returns its outcome
    pub async fn run_sync(&self) -> SyncOutcome {
        if self
            .syncing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!("Sync already running");
            return SyncOutcome::AlreadySyncing;
        }

        let cancel = CancellationToken::new();
        *self.active() = Some(ActiveRun {
            cancel: cancel.clone(),
            session: None,
        });
        self.emit(SyncEvent::SyncStarted);
        info!("Sync started");

        let outcome = match self.execute(&cancel).await {
            Ok(()) => {
                if let Err(e) = self.store.set_last_synced(Utc::now()).await {
                    warn!(error = %e, "Failed to record sync time");
                }
                SyncOutcome::Success
            }
            Err(e) => {
                self.log_failure(&e);
                e.outcome()
            }
        };

        self.set_state(SyncState::Idle);
        *self.active() = None;
        self.syncing.store(false, Ordering::SeqCst);
        info!(outcome = %outcome, "Sync finished");
        self.emit(SyncEvent::SyncStopped(outcome));
        outcome
    }

    fn log_failure(&self, e: &SyncError) {
        let state = self.state();
        match e {
            SyncError::Stopped => info!(state = %state, "Sync stopped"),
            SyncError::Network(message) => {
                warn!(state = %state, error = %message, "Sync aborted by a network error");
            }
            SyncError::Filesystem { .. } | SyncError::IsDirectory(_) => {
                error!(state = %state, error = %e, "Sync aborted by a filesystem error");
            }
            SyncError::Provider(_) | SyncError::Store(_) => {
                error!(state = %state, error = ?e, "Sync aborted by an unexpected error");
            }
        }
    }

    fn emit(&self, event: SyncEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    fn set_state(&self, next: SyncState) {
        let changed = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            let changed = *state != next;
            *state = next;
            changed
        };
        if changed {
            debug!(state = %next, "State changed");
            self.emit(SyncEvent::StateChanged(next));
        }
    }

    // ========================================================================
    // Run
    // ========================================================================

    async fn execute(&self, cancel: &CancellationToken) -> Result<(), SyncError> {
        self.store.ready().await.map_err(SyncError::Store)?;
        let settings = self.store.settings().await.map_err(SyncError::Store)?;
        let root = settings.download_path.clone();

        self.set_state(SyncState::FetchingCourses);
        let courses = until_stopped(cancel, self.provider.list_enrolled_courses()).await?;

        self.set_state(SyncState::FetchingFiles);
        let mut files = Vec::new();
        for course in courses.iter().filter(|c| c.should_sync) {
            let listed = until_stopped(cancel, self.provider.list_files(course)).await?;
            debug!(course = %course.local_name, files = listed.len(), "Listed course files");
            files.extend(listed);
        }
        let queued = resolve_diff(files, &root).await;
        if cancel.is_cancelled() {
            return Err(SyncError::Stopped);
        }

        self.set_state(SyncState::Downloading);
        let session = Arc::new(SyncSession::new(queued, cancel.clone()));
        if let Some(run) = self.active().as_mut() {
            run.session = Some(Arc::clone(&session));
        }
        let workers = worker_count(settings.max_concurrent_downloads, session.queue_len());
        info!(
            queued = session.queue_len(),
            workers,
            root = %root.display(),
            "Starting downloads"
        );

        self.run_pool(&session, workers, &root).await?;
        debug!(peak = session.peak_in_flight(), "Worker pool drained");

        self.emit(SyncEvent::NewFiles(session.take_new_files()));
        if cancel.is_cancelled() {
            return Err(SyncError::Stopped);
        }
        Ok(())
    }

    async fn run_pool(
        &self,
        session: &SyncSession,
        workers: usize,
        root: &Path,
    ) -> Result<(), SyncError> {
        let mut pool: FuturesUnordered<_> =
            (0..workers).map(|_| self.worker(session, root)).collect();

        let mut first_error = None;
        while let Some(result) = pool.next().await {
            if let Err(e) = result {
                if first_error.is_none() {
                    if !matches!(e, SyncError::Stopped) {
                        warn!(error = %e, "Transfer failed, cancelling remaining transfers");
                    }
                    session.cancel();
                    first_error = Some(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn worker(&self, session: &SyncSession, root: &Path) -> Result<(), SyncError> {
        while let Some(claim) = session.claim() {
            match transfer::download(self.provider.as_ref(), session, &claim, root).await {
                Ok(path) => session.complete(&claim, path),
                Err(SyncError::IsDirectory(path)) => {
                    session.release(claim.id);
                    if !is_file_slot(&claim.file, root, &path)
                        || !session.requeue(claim.file.clone())
                    {
                        return Err(SyncError::IsDirectory(path));
                    }
                    warn!(
                        path = %path.display(),
                        "Destination is a directory, removing it and retrying"
                    );
                    tokio::fs::remove_dir_all(&path)
                        .await
                        .map_err(|e| SyncError::fs(&path, e))?;
                }
                Err(e) => {
                    session.release(claim.id);
                    return Err(e);
                }
            }
        }
        Ok(())
    }
}

/// Whether `path` names a file strictly inside the descriptor's folder
///
/// Only such a path may be cleared when a directory occupies it; the folder
/// itself or anything above it is never removed.
fn is_file_slot(file: &FileDescriptor, root: &Path, path: &Path) -> bool {
    let folder = root.join(&file.relative_path);
    !file.filename.is_empty() && path != folder && path.starts_with(&folder)
}

async fn until_stopped<T>(
    cancel: &CancellationToken,
    call: impl std::future::Future<Output = Result<T, ProviderError>>,
) -> Result<T, SyncError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SyncError::Stopped),
        result = call => result.map_err(SyncError::from),
    }
}
