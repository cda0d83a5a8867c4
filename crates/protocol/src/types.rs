use std::fmt;

use serde::{Deserialize, Serialize};

/// A file or folder as the server describes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub id: String,
    #[serde(rename = "parentID", alias = "parentFolderId", default)]
    pub parent_id: String,
    #[serde(default, alias = "filename")]
    pub name: String,
    #[serde(default)]
    pub is_dir: bool,
    #[serde(default)]
    pub size: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub portable_path: String,
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub modify_timestamp: i64,
}

fn is_zero_i64(v: &i64) -> bool {
    *v == 0
}

/// Byte range `[low, high)` of a file of `total` bytes.
///
/// Rendered the way the chunk endpoint expects it: `bytes={low}-{high-1}/{total}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub low: u64,
    pub high: u64,
    pub total: u64,
}

impl ContentRange {
    pub fn new(low: u64, high: u64, total: u64) -> Self {
        Self { low, high, total }
    }

    /// Number of bytes covered by the range.
    pub fn len(&self) -> u64 {
        self.high.saturating_sub(self.low)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for ContentRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bytes={}-{}/{}",
            self.low,
            self.high.saturating_sub(1),
            self.total
        )
    }
}

/// What a user dropped or selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadKind {
    File,
    #[serde(alias = "folder")]
    Directory,
}

/// Lifecycle state of an upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
    Uploading,
    Completed,
    Failed,
}

impl UploadStatus {
    /// `completed` and `failed` are terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadStatus::Completed | UploadStatus::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: UploadStatus) -> bool {
        use UploadStatus::*;
        match (self, next) {
            (a, b) if *a == b => true,
            (Pending, Uploading | Completed | Failed) => true,
            (Uploading, Completed | Failed) => true,
            _ => false,
        }
    }
}

/// Render-ready progress of one upload session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgress {
    pub local_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    pub name: String,
    pub kind: UploadKind,
    pub status: UploadStatus,
    pub total_size: u64,
    pub uploaded_so_far: u64,
    pub progress_percent: f64,
    pub speed_bytes_per_second: f64,
    pub file_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
