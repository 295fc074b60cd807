//! Per-run download session
//!
//! The queue, the in-flight set and the byte counters live behind one
//! `std::sync::Mutex`. The lock is never held across an await, so every
//! mutation is atomic with respect to suspension points: completing a
//! transfer removes it from the in-flight set and adds its bytes in the same
//! critical section.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use lmsync_core::domain::{FileDescriptor, FileProgress, NewFile, NewFilesList, Progress};
use tokio_util::sync::CancellationToken;

/// Handle of one claimed transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransferId(u64);

/// A queued file handed to a worker
#[derive(Debug, Clone)]
pub struct Claim {
    pub id: TransferId,
    pub file: FileDescriptor,
}

#[derive(Debug, Default)]
struct SessionState {
    queue: VecDeque<FileDescriptor>,
    requeued: HashSet<PathBuf>,
    in_flight: BTreeMap<TransferId, FileProgress>,
    next_id: u64,
    total_bytes: u64,
    completed_bytes: u64,
    peak_in_flight: usize,
    new_files: NewFilesList,
}

/// Mutable state of one sync run
pub struct SyncSession {
    state: Mutex<SessionState>,
    cancel: CancellationToken,
}

impl SyncSession {
    /// Creates a session over the diff set; `cancel` ends every transfer
    pub fn new(files: Vec<FileDescriptor>, cancel: CancellationToken) -> Self {
        let total_bytes = files.iter().map(|f| f.size_bytes).sum();
        Self {
            state: Mutex::new(SessionState {
                queue: files.into(),
                total_bytes,
                ..SessionState::default()
            }),
            cancel,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancels every in-flight transfer; idempotent
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn queue_len(&self) -> usize {
        self.lock().queue.len()
    }

    /// Pops the next file and registers it as in flight
    ///
    /// Returns `None` once the queue is empty or the session is cancelled.
    pub fn claim(&self) -> Option<Claim> {
        if self.is_cancelled() {
            return None;
        }
        let mut state = self.lock();
        let file = state.queue.pop_front()?;
        let id = TransferId(state.next_id);
        state.next_id += 1;
        state.in_flight.insert(
            id,
            FileProgress {
                filename: file.filename.clone(),
                path: file.local_relative_path(),
                downloaded: 0,
                total: file.size_bytes,
            },
        );
        state.peak_in_flight = state.peak_in_flight.max(state.in_flight.len());
        Some(Claim { id, file })
    }

    /// Sets the expected size of a transfer when the descriptor had none
    pub fn set_expected(&self, id: TransferId, total: u64) {
        if let Some(progress) = self.lock().in_flight.get_mut(&id) {
            if progress.total == 0 {
                progress.total = total;
            }
        }
    }

    /// Adds received bytes to a transfer's progress
    pub fn record_chunk(&self, id: TransferId, bytes: u64) {
        if let Some(progress) = self.lock().in_flight.get_mut(&id) {
            progress.downloaded += bytes;
        }
    }

    /// Moves a finished transfer into the completed counters and the report
    pub fn complete(&self, claim: &Claim, absolute_path: PathBuf) {
        let mut state = self.lock();
        state.in_flight.remove(&claim.id);
        state.completed_bytes += claim.file.size_bytes;
        state
            .new_files
            .entry(claim.file.course_name.clone())
            .or_default()
            .push(NewFile {
                filename: claim.file.filename.clone(),
                absolute_path,
                size: claim.file.size_bytes,
                updated: claim.file.is_update,
            });
    }

    /// Drops a transfer from the in-flight set without counting it
    pub fn release(&self, id: TransferId) {
        self.lock().in_flight.remove(&id);
    }

    /// Puts a file back at the end of the queue
    ///
    /// Each destination can be re-queued once; returns false after that.
    pub fn requeue(&self, file: FileDescriptor) -> bool {
        let mut state = self.lock();
        if !state.requeued.insert(file.local_relative_path()) {
            return false;
        }
        state.queue.push_back(file);
        true
    }

    /// Snapshot of the aggregate progress; `None` when nothing is in flight
    pub fn progress(&self) -> Option<Progress> {
        let state = self.lock();
        if state.in_flight.is_empty() {
            return None;
        }
        let in_flight: u64 = state.in_flight.values().map(|p| p.downloaded).sum();
        Some(Progress {
            total: state.total_bytes,
            downloaded: state.completed_bytes + in_flight,
            files: state.in_flight.values().cloned().collect(),
        })
    }

    /// Highest number of simultaneous transfers seen so far
    pub fn peak_in_flight(&self) -> usize {
        self.lock().peak_in_flight
    }

    /// Takes the accumulated report
    pub fn take_new_files(&self) -> NewFilesList {
        std::mem::take(&mut self.lock().new_files)
    }
}
