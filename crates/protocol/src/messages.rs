use serde::{Deserialize, Serialize};

use crate::types::FileInfo;

// ---------------------------------------------------------------------------
// Remote storage API request payloads
// ---------------------------------------------------------------------------

/// Opens a new upload session rooted at a folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartUploadRequest {
    #[serde(rename = "rootFolderID")]
    pub root_folder_id: String,
    #[serde(rename = "chunkSize")]
    pub chunk_size: u64,
}

/// One entry to register within an upload session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFileParams {
    #[serde(rename = "parentFolderID")]
    pub parent_folder_id: String,
    #[serde(rename = "newFileName")]
    pub new_file_name: String,
    #[serde(rename = "fileSize", default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(rename = "isDir", default, skip_serializing_if = "is_false")]
    pub is_dir: bool,
}

impl NewFileParams {
    /// A regular file of `size` bytes under `parent`.
    pub fn file(parent: impl Into<String>, name: impl Into<String>, size: u64) -> Self {
        Self {
            parent_folder_id: parent.into(),
            new_file_name: name.into(),
            file_size: Some(size),
            is_dir: false,
        }
    }

    /// A folder under `parent`.
    pub fn dir(parent: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            parent_folder_id: parent.into(),
            new_file_name: name.into(),
            file_size: None,
            is_dir: true,
        }
    }
}

/// Registers a batch of files/folders with an upload session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFilesRequest {
    #[serde(rename = "newFiles")]
    pub new_files: Vec<NewFileParams>,
}

/// Creates a folder outside of any upload session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateFolderRequest {
    #[serde(rename = "parentFolderID")]
    pub parent_folder_id: String,
    #[serde(rename = "newFolderName")]
    pub new_folder_name: String,
}

// ---------------------------------------------------------------------------
// Remote storage API response payloads
// ---------------------------------------------------------------------------

/// Response to [`StartUploadRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartUploadResponse {
    #[serde(rename = "uploadID", default)]
    pub upload_id: String,
}

/// Response to [`NewFilesRequest`]; one id per requested entry, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFilesResponse {
    #[serde(rename = "fileIDs", default)]
    pub file_ids: Vec<String>,
}

// ---------------------------------------------------------------------------
// Push-event content payloads
// ---------------------------------------------------------------------------

/// Content of `fileCreated` / `fileUpdated` / `fileDeleted`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEventContent {
    pub file_info: FileInfo,
}

/// Content of the directory scan family of events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanProgressContent {
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub percent_progress: f64,
    #[serde(default)]
    pub tasks_complete: u64,
    #[serde(default)]
    pub tasks_total: u64,
    #[serde(default)]
    pub tasks_failed: u64,
    #[serde(default)]
    pub runtime: u64,
}

/// Content of `createZipProgress`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZipProgressContent {
    #[serde(default)]
    pub bytes_so_far: u64,
    #[serde(default)]
    pub bytes_total: u64,
    #[serde(default)]
    pub completed_files: u64,
    #[serde(default)]
    pub total_files: u64,
    #[serde(default)]
    pub speed_bytes: f64,
}

/// Content of `taskFailure`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskFailedContent {
    #[serde(default)]
    pub failed_count: u64,
}

/// Content of the backup family of events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupProgressContent {
    #[serde(rename = "coreID", default)]
    pub core_id: String,
    #[serde(default)]
    pub progress_current: u64,
    #[serde(default)]
    pub progress_total: u64,
    #[serde(default)]
    pub files_total: u64,
}

/// Content of `remoteConnectionChanged`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConnectionContent {
    #[serde(rename = "towerId", default)]
    pub tower_id: String,
    #[serde(default)]
    pub online: bool,
}

fn is_false(v: &bool) -> bool {
    !v
}
