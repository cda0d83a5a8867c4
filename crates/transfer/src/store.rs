use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::watch;
use tracing::{debug, error, info};

use strato_protocol::types::{UploadKind, UploadProgress, UploadStatus};

use crate::TransferError;
use crate::progress::SpeedCalculator;
use crate::types::{FileUploadMetadata, UploadSession};

/// Error recorded on a session cancelled by the user.
const CANCELLED: &str = "cancelled";

/// Observer invoked with the new value of a session after every change.
pub type ChangeCallback = Arc<dyn Fn(&UploadSession) + Send + Sync>;

/// The observable set of upload sessions.
///
/// Every mutation stores a fresh `Arc<UploadSession>` in place of the old one,
/// bumps the revision published on [`subscribe`](Self::subscribe) and runs
/// the [`on_change`](Self::on_change) callbacks outside the data lock.
/// Callbacks see changes in the order they were applied; they may read the
/// store but must not mutate it.
#[derive(Clone)]
pub struct UploadStore {
    inner: Arc<RwLock<StoreInner>>,
    callbacks: Arc<RwLock<Vec<ChangeCallback>>>,
    /// Held from mutation through callback delivery.
    notify_order: Arc<Mutex<()>>,
    revision: Arc<watch::Sender<u64>>,
}

#[derive(Default)]
struct StoreInner {
    uploads: HashMap<String, Arc<UploadSession>>,
    speeds: HashMap<String, SpeedCalculator>,
}

impl Default for UploadStore {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self {
            inner: Arc::new(RwLock::new(StoreInner::default())),
            callbacks: Arc::new(RwLock::new(Vec::new())),
            notify_order: Arc::new(Mutex::new(())),
            revision: Arc::new(tx),
        }
    }

    /// Registers a push observer.
    pub fn on_change(&self, callback: ChangeCallback) {
        self.callbacks.write().unwrap().push(callback);
    }

    /// Dirty-flag observer: the value is the store revision.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    /// Registers a new `pending` session and returns it.
    pub fn start_upload(
        &self,
        local_id: impl Into<String>,
        name: impl Into<String>,
        kind: UploadKind,
    ) -> Arc<UploadSession> {
        let session = Arc::new(UploadSession::new(local_id, name, kind));
        let _order = self.notify_order.lock().unwrap();
        {
            let mut inner = self.inner.write().unwrap();
            inner
                .uploads
                .insert(session.local_id.clone(), Arc::clone(&session));
            inner
                .speeds
                .insert(session.local_id.clone(), SpeedCalculator::default());
        }
        info!(upload = %session.local_id, name = %session.name, "upload registered");
        self.notify(&session);
        session
    }

    /// Records the remote upload session id.
    pub fn set_server_upload(
        &self,
        local_id: &str,
        server_id: impl Into<String>,
    ) -> Result<(), TransferError> {
        let server_id = server_id.into();
        self.update(local_id, |session, _| {
            session.server_id = Some(server_id);
            Ok(true)
        })?;
        Ok(())
    }

    /// Adds registered files to the session, growing its total size.
    ///
    /// A session whose files are all empty completes right away.
    pub fn add_files_to_upload(
        &self,
        local_id: &str,
        files: Vec<FileUploadMetadata>,
    ) -> Result<(), TransferError> {
        self.update(local_id, |session, _| {
            if session.status.is_terminal() {
                return Ok(false);
            }
            for file in files {
                session.add_file(file)?;
            }
            complete_if_done(session);
            Ok(true)
        })?;
        Ok(())
    }

    /// Replaces the progress of one in-flight chunk.
    pub fn set_upload_progress(
        &self,
        local_id: &str,
        file_id: &str,
        chunk_start: u64,
        chunk_len: u64,
        uploaded_so_far: u64,
    ) -> Result<(), TransferError> {
        self.apply_chunk(local_id, file_id, chunk_start, chunk_len, uploaded_so_far, false)
    }

    /// Marks one chunk as accepted by the server.
    pub fn finish_chunk(
        &self,
        local_id: &str,
        file_id: &str,
        chunk_start: u64,
        chunk_len: u64,
    ) -> Result<(), TransferError> {
        self.apply_chunk(local_id, file_id, chunk_start, chunk_len, chunk_len, true)
    }

    /// Discards the record of a failed chunk so its retry is counted afresh.
    pub fn reset_chunk(
        &self,
        local_id: &str,
        file_id: &str,
        chunk_start: u64,
    ) -> Result<(), TransferError> {
        self.update(local_id, |session, _| {
            if session.status.is_terminal() {
                return Ok(false);
            }
            session.reset_chunk(file_id, chunk_start)
        })?;
        Ok(())
    }

    /// Fails the session, keeping the first recorded error.
    pub fn fail_upload(
        &self,
        local_id: &str,
        error: impl Into<String>,
    ) -> Result<(), TransferError> {
        let error = error.into();
        let changed = self.update(local_id, |session, _| Ok(session.fail(error.as_str())))?;
        if changed {
            error!(upload = %local_id, error = %error, "upload failed");
        }
        Ok(())
    }

    /// Sets the cancellation signal and fails the session.
    pub fn cancel_upload(&self, local_id: &str) -> Result<(), TransferError> {
        let changed = self.update(local_id, |session, _| Ok(session.fail(CANCELLED)))?;
        if changed {
            debug!(upload = %local_id, "upload cancelled");
        }
        Ok(())
    }

    /// Evicts finished, non-failed sessions. Returns how many were removed.
    pub fn clear_uploads(&self) -> usize {
        let removed: Vec<Arc<UploadSession>> = {
            let mut inner = self.inner.write().unwrap();
            let ids: Vec<String> = inner
                .uploads
                .values()
                .filter(|s| s.end_time.is_some() && s.status != UploadStatus::Failed)
                .map(|s| s.local_id.clone())
                .collect();
            ids.iter()
                .filter_map(|id| {
                    inner.speeds.remove(id);
                    inner.uploads.remove(id)
                })
                .collect()
        };
        if !removed.is_empty() {
            self.bump();
        }
        removed.len()
    }

    /// Evicts a failed session once the user has seen it.
    pub fn acknowledge_failure(&self, local_id: &str) -> bool {
        let removed = {
            let mut inner = self.inner.write().unwrap();
            let failed = inner
                .uploads
                .get(local_id)
                .is_some_and(|s| s.status == UploadStatus::Failed);
            if failed {
                inner.speeds.remove(local_id);
                inner.uploads.remove(local_id);
            }
            failed
        };
        if removed {
            self.bump();
        }
        removed
    }

    pub fn get(&self, local_id: &str) -> Option<Arc<UploadSession>> {
        self.inner.read().unwrap().uploads.get(local_id).cloned()
    }

    /// All sessions, oldest first.
    pub fn snapshot(&self) -> Vec<Arc<UploadSession>> {
        let mut all: Vec<_> = self.inner.read().unwrap().uploads.values().cloned().collect();
        all.sort_by(|a, b| {
            a.start_time
                .cmp(&b.start_time)
                .then_with(|| a.local_id.cmp(&b.local_id))
        });
        all
    }

    /// Render-ready progress for every session.
    pub fn progress(&self) -> Vec<UploadProgress> {
        self.snapshot().iter().map(|s| s.progress()).collect()
    }

    /// Whether chunk steps of this session must stop. Unknown sessions count as cancelled.
    pub fn is_cancelled(&self, local_id: &str) -> bool {
        self.inner
            .read()
            .unwrap()
            .uploads
            .get(local_id)
            .is_none_or(|s| s.is_cancelled())
    }

    fn apply_chunk(
        &self,
        local_id: &str,
        file_id: &str,
        chunk_start: u64,
        chunk_len: u64,
        uploaded: u64,
        complete: bool,
    ) -> Result<(), TransferError> {
        let mut completed = false;
        self.update(local_id, |session, speed| {
            if session.status.is_terminal() {
                return Ok(false);
            }
            let delta = session.apply_chunk(file_id, chunk_start, chunk_len, uploaded, complete)?;
            if delta > 0 && session.status == UploadStatus::Pending {
                session.transition(UploadStatus::Uploading);
            }
            speed.record(session.uploaded_so_far);
            session.speed_bytes_per_second = speed.bytes_per_second();
            completed = complete_if_done(session);
            Ok(true)
        })?;
        if completed {
            info!(upload = %local_id, "upload complete");
        }
        Ok(())
    }

    /// Copy-on-write update of one session. `f` returns whether anything changed.
    fn update<F>(&self, local_id: &str, f: F) -> Result<bool, TransferError>
    where
        F: FnOnce(&mut UploadSession, &mut SpeedCalculator) -> Result<bool, TransferError>,
    {
        let _order = self.notify_order.lock().unwrap();
        let next = {
            let mut guard = self.inner.write().unwrap();
            let inner = &mut *guard;
            let mut next = inner
                .uploads
                .get(local_id)
                .map(|s| UploadSession::clone(s))
                .ok_or_else(|| TransferError::UploadNotFound(local_id.to_string()))?;
            let speed = inner.speeds.entry(local_id.to_string()).or_default();
            if !f(&mut next, speed)? {
                return Ok(false);
            }
            let next = Arc::new(next);
            inner.uploads.insert(local_id.to_string(), Arc::clone(&next));
            next
        };
        self.notify(&next);
        Ok(true)
    }

    fn notify(&self, session: &UploadSession) {
        self.bump();
        let callbacks = self.callbacks.read().unwrap().clone();
        for cb in &callbacks {
            cb(session);
        }
    }

    fn bump(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }
}

fn complete_if_done(session: &mut UploadSession) -> bool {
    if !session.all_files_complete() {
        return false;
    }
    session.uploaded_so_far = session.total_size;
    session.transition(UploadStatus::Completed)
}
