//! Applies push events to the local listing, task and backup state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::watch;
use tracing::{debug, trace, warn};

use strato_protocol::constants::{TaskType, WsEvent};
use strato_protocol::envelope::WsMessage;
use strato_protocol::messages::{
    BackupProgressContent, RemoteConnectionContent, ScanProgressContent, ZipProgressContent,
};
use strato_protocol::types::FileInfo;

use crate::listing::FileListing;
use crate::tasks::{BackupTracker, TaskTracker, TaskUpdate};

/// Called when a remote goes online or offline.
pub type RemoteCallback = Box<dyn Fn(&RemoteConnectionContent) + Send + Sync>;

/// Shared sink for push events. Every handler is idempotent.
pub struct SyncConsumer {
    listing: RwLock<FileListing>,
    tasks: RwLock<TaskTracker>,
    backups: RwLock<BackupTracker>,
    remotes_dirty: AtomicBool,
    on_remote_change: RwLock<Option<RemoteCallback>>,
    changes: watch::Sender<u64>,
}

impl Default for SyncConsumer {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncConsumer {
    pub fn new() -> Self {
        Self {
            listing: RwLock::new(FileListing::new()),
            tasks: RwLock::new(TaskTracker::new()),
            backups: RwLock::new(BackupTracker::new()),
            remotes_dirty: AtomicBool::new(false),
            on_remote_change: RwLock::new(None),
            changes: watch::channel(0).0,
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn set_active_folder(&self, folder_id: impl Into<String>, children: Vec<FileInfo>) {
        self.listing
            .write()
            .unwrap()
            .set_active_folder(folder_id, children);
        self.bump();
    }

    pub fn set_remote_callback(&self, callback: RemoteCallback) {
        *self.on_remote_change.write().unwrap() = Some(callback);
    }

    /// Read access to the cached listing.
    pub fn listing<R>(&self, f: impl FnOnce(&FileListing) -> R) -> R {
        f(&self.listing.read().unwrap())
    }

    pub fn tasks<R>(&self, f: impl FnOnce(&TaskTracker) -> R) -> R {
        f(&self.tasks.read().unwrap())
    }

    pub fn backups<R>(&self, f: impl FnOnce(&BackupTracker) -> R) -> R {
        f(&self.backups.read().unwrap())
    }

    /// Returns and clears the "remotes changed" flag.
    pub fn take_remotes_dirty(&self) -> bool {
        self.remotes_dirty.swap(false, Ordering::SeqCst)
    }

    /// Ticks once per message that changed local state.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// Applies one push event. Returns whether local state changed.
    pub fn handle_message(&self, msg: &WsMessage) -> bool {
        if let Some(error) = &msg.error
            && !msg.event_tag.is_failure()
        {
            warn!(
                event = ?msg.event_tag,
                key = %msg.subscribe_key,
                %error,
                "server reported an error"
            );
            return false;
        }
        trace!(event = ?msg.event_tag, key = %msg.subscribe_key, "push event");

        let changed = match msg.event_tag {
            WsEvent::FileCreated => self.file_created(msg),
            WsEvent::FileUpdated => self.file_updated(msg),
            WsEvent::FileDeleted => self.file_deleted(msg),
            WsEvent::TaskCreated => self.task_created(msg),
            WsEvent::TaskCanceled => self.tasks.write().unwrap().cancel_task(&msg.subscribe_key),
            WsEvent::TaskFailed | WsEvent::FileScanFailed => self
                .tasks
                .write()
                .unwrap()
                .fail_task(&msg.subscribe_key, msg.error.clone()),
            WsEvent::FileScanStarted | WsEvent::FileScanComplete => self.scan_progress(msg),
            WsEvent::FolderScanComplete => {
                let runtime = msg.content.get("runtime").and_then(|v| v.as_u64());
                let note = msg.content_str("note").map(str::to_string);
                self.tasks
                    .write()
                    .unwrap()
                    .set_task_complete(&msg.subscribe_key, runtime, note, None)
            }
            WsEvent::ZipProgress => self.zip_progress(msg),
            WsEvent::ZipComplete => {
                if msg.task_type != Some(TaskType::CreateZip) {
                    return false;
                }
                let takeout = msg.content_str("takeoutId").map(str::to_string);
                self.tasks
                    .write()
                    .unwrap()
                    .set_task_complete(&msg.subscribe_key, None, None, takeout)
            }
            WsEvent::RemoteConnectionChanged => self.remote_changed(msg),
            WsEvent::BackupStarted | WsEvent::BackupProgress | WsEvent::BackupComplete => {
                self.backup_event(msg)
            }
            WsEvent::Unknown => {
                debug!(key = %msg.subscribe_key, "ignoring unknown push event");
                false
            }
        };

        if changed {
            self.bump();
        }
        changed
    }

    fn file_created(&self, msg: &WsMessage) -> bool {
        let Some(info) = file_info(msg) else {
            return false;
        };
        self.listing.write().unwrap().add_file(info)
    }

    fn file_updated(&self, msg: &WsMessage) -> bool {
        let Some(info) = file_info(msg) else {
            return false;
        };
        let mut listing = self.listing.write().unwrap();
        let Some(active) = listing.active_folder() else {
            return false;
        };
        if info.id == active {
            return false;
        }
        if info.parent_id != active {
            return listing.remove_files([info.id.as_str()]) > 0;
        }
        listing.add_file(info)
    }

    fn file_deleted(&self, msg: &WsMessage) -> bool {
        let Some(info) = file_info(msg) else {
            return false;
        };
        self.listing.write().unwrap().remove_files([info.id.as_str()]) > 0
    }

    fn task_created(&self, msg: &WsMessage) -> bool {
        let target = match msg.task_type {
            Some(TaskType::ScanDirectory) => {
                msg.content_str("filename").unwrap_or_default().to_string()
            }
            Some(TaskType::CreateZip) => {
                let Some(names) = msg.content.get("filenames").and_then(|v| v.as_array()) else {
                    debug!(key = %msg.subscribe_key, "zip task without filenames");
                    return false;
                };
                let first = names.first().and_then(|v| v.as_str()).unwrap_or_default();
                if names.len() > 1 {
                    format!("{first} +{}", names.len() - 1)
                } else {
                    first.to_string()
                }
            }
            _ => return false,
        };
        let task_type = msg.task_type.clone().unwrap_or(TaskType::Unknown);
        self.tasks
            .write()
            .unwrap()
            .upsert_task(&msg.subscribe_key, task_type, target);
        true
    }

    fn scan_progress(&self, msg: &WsMessage) -> bool {
        let content: ScanProgressContent = match msg.parse_content() {
            Ok(c) => c,
            Err(e) => {
                warn!(key = %msg.subscribe_key, error = %e, "malformed scan progress");
                return false;
            }
        };
        let filename = (!content.filename.is_empty()).then_some(content.filename);
        let (working_on, finished) = if msg.event_tag == WsEvent::FileScanStarted {
            (filename, None)
        } else {
            (None, filename)
        };
        self.tasks.write().unwrap().update_progress(
            &msg.subscribe_key,
            TaskUpdate {
                progress_percent: Some(content.percent_progress),
                tasks_complete: Some(content.tasks_complete),
                tasks_total: Some(content.tasks_total),
                tasks_failed: Some(content.tasks_failed),
                working_on,
                finished,
            },
        )
    }

    fn zip_progress(&self, msg: &WsMessage) -> bool {
        let content: ZipProgressContent = match msg.parse_content() {
            Ok(c) => c,
            Err(e) => {
                warn!(key = %msg.subscribe_key, error = %e, "malformed zip progress");
                return false;
            }
        };
        if content.bytes_total == 0 {
            debug!(key = %msg.subscribe_key, "zip progress without a byte total");
            return false;
        }
        let percent = content.bytes_so_far as f64 / content.bytes_total as f64 * 100.0;
        self.tasks.write().unwrap().update_progress(
            &msg.subscribe_key,
            TaskUpdate {
                progress_percent: Some(percent),
                tasks_complete: Some(content.completed_files),
                tasks_total: Some(content.total_files),
                ..Default::default()
            },
        )
    }

    fn remote_changed(&self, msg: &WsMessage) -> bool {
        let content: RemoteConnectionContent = msg.parse_content().unwrap_or_default();
        self.remotes_dirty.store(true, Ordering::SeqCst);
        debug!(tower = %content.tower_id, online = content.online, "remote connection changed");
        if let Some(cb) = self.on_remote_change.read().unwrap().as_ref() {
            cb(&content);
        }
        true
    }

    fn backup_event(&self, msg: &WsMessage) -> bool {
        let content: BackupProgressContent = match msg.parse_content() {
            Ok(c) => c,
            Err(e) => {
                warn!(key = %msg.subscribe_key, error = %e, "malformed backup event");
                return false;
            }
        };
        if content.core_id.is_empty() {
            debug!(event = ?msg.event_tag, "backup event without a core id");
            return false;
        }
        let mut backups = self.backups.write().unwrap();
        match msg.event_tag {
            WsEvent::BackupStarted => backups.start(&content.core_id),
            WsEvent::BackupComplete => backups.complete(&content.core_id),
            _ => backups.update(&content),
        }
        true
    }

    fn bump(&self) {
        self.changes.send_modify(|rev| *rev += 1);
    }
}

fn file_info(msg: &WsMessage) -> Option<FileInfo> {
    match msg.file_info() {
        Ok(info) => Some(info),
        Err(e) => {
            warn!(event = ?msg.event_tag, error = %e, "push event without usable fileInfo");
            None
        }
    }
}
