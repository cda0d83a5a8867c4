use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Maximum number of retries granted to a single chunk before the upload fails.
pub const MAX_RETRIES: u32 = 5;

/// Largest chunk the client will send in one request (25.6 MB).
pub const DEFAULT_MAX_CHUNK_SIZE: u64 = 25_600_000;

/// Floor for chunk-size halving after repeated failures (64 KiB).
pub const DEFAULT_MIN_CHUNK_SIZE: u64 = 64 * 1024;

/// Number of queue slots shared by every upload in the process.
pub const DEFAULT_MAX_CONCURRENT_UPLOADS: usize = 2;

/// File names never registered for upload (OS metadata files).
pub const EXCLUDED_FILE_NAMES: &[&str] = &[".DS_Store"];

/// Default page size used when draining a directory listing.
pub const DEFAULT_DIR_PAGE_SIZE: usize = 100;

/// How many times the orchestrator polls for unresolved file handles.
pub const HANDLE_POLL_ATTEMPTS: u32 = 1000;

/// Delay between two handle polls.
pub const HANDLE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Granularity at which request-body progress is reported (64 KiB).
pub const PROGRESS_SLICE_SIZE: usize = 64 * 1024;

/// Push-event tag identifier.
///
/// Tags are the `eventTag` strings the server puts on every push message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WsEvent {
    // File mutations
    #[serde(rename = "fileCreated")]
    FileCreated,
    #[serde(rename = "fileUpdated")]
    FileUpdated,
    #[serde(rename = "fileDeleted")]
    FileDeleted,

    // Task lifecycle
    #[serde(rename = "taskCreated")]
    TaskCreated,
    #[serde(rename = "taskCanceled")]
    TaskCanceled,
    #[serde(rename = "taskFailure")]
    TaskFailed,
    #[serde(rename = "fileScanStarted")]
    FileScanStarted,
    #[serde(rename = "fileScanFailed")]
    FileScanFailed,
    #[serde(rename = "fileScanComplete")]
    FileScanComplete,
    #[serde(rename = "folderScanComplete")]
    FolderScanComplete,
    #[serde(rename = "createZipProgress")]
    ZipProgress,
    #[serde(rename = "zipComplete")]
    ZipComplete,

    // Remotes and backups
    #[serde(rename = "remoteConnectionChanged")]
    RemoteConnectionChanged,
    #[serde(rename = "backupStarted")]
    BackupStarted,
    #[serde(rename = "backupProgress")]
    BackupProgress,
    #[serde(rename = "backupComplete")]
    BackupComplete,

    /// Forward compatibility: unknown event tags deserialize here.
    #[serde(other)]
    Unknown,
}

impl WsEvent {
    /// Whether the tag reports a failure of some kind.
    pub fn is_failure(&self) -> bool {
        matches!(self, WsEvent::TaskFailed | WsEvent::FileScanFailed)
    }
}

/// Kind of server-side task announced by `taskCreated`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskType {
    #[serde(rename = "scan_directory")]
    ScanDirectory,
    #[serde(rename = "create_zip")]
    CreateZip,
    #[serde(other)]
    Unknown,
}
