use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use strato_protocol::types::{UploadKind, UploadProgress, UploadStatus};

use crate::TransferError;
use crate::source::ByteSource;

/// One byte range `[start, end)` of a file and how much of it has been sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRecord {
    pub start: u64,
    pub end: u64,
    /// Bytes confirmed transferred for this range; never exceeds `end - start`.
    pub uploaded_so_far: u64,
    pub complete: bool,
}

impl ChunkRecord {
    pub fn new(start: u64, end: u64) -> Self {
        Self {
            start,
            end: end.max(start),
            uploaded_so_far: 0,
            complete: false,
        }
    }

    /// Length of the range in bytes.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One physical file within an upload session.
#[derive(Clone)]
pub struct FileUploadMetadata {
    pub name: String,
    pub parent_folder_id: String,
    /// Assigned by the register-file call.
    pub remote_file_id: Option<String>,
    /// Resolved byte source; `None` until the entry has been read.
    pub source: Option<Arc<dyn ByteSource>>,
    pub size: u64,
    /// Direct child of the upload root.
    pub is_top_level: bool,
    /// Sum of `uploaded_so_far` over `chunks`.
    pub uploaded_so_far: u64,
    /// Chunk records keyed by start offset.
    pub chunks: BTreeMap<u64, ChunkRecord>,
}

impl fmt::Debug for FileUploadMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileUploadMetadata")
            .field("name", &self.name)
            .field("parent_folder_id", &self.parent_folder_id)
            .field("remote_file_id", &self.remote_file_id)
            .field("resolved", &self.source.is_some())
            .field("size", &self.size)
            .field("is_top_level", &self.is_top_level)
            .field("uploaded_so_far", &self.uploaded_so_far)
            .field("chunks", &self.chunks.len())
            .finish()
    }
}

impl FileUploadMetadata {
    /// Creates an unresolved descriptor (no byte source yet).
    pub fn new(
        name: impl Into<String>,
        parent_folder_id: impl Into<String>,
        size: u64,
        is_top_level: bool,
    ) -> Self {
        Self {
            name: name.into(),
            parent_folder_id: parent_folder_id.into(),
            remote_file_id: None,
            source: None,
            size,
            is_top_level,
            uploaded_so_far: 0,
            chunks: BTreeMap::new(),
        }
    }

    /// Creates a descriptor whose name and size come from a resolved source.
    pub fn from_source(
        source: Arc<dyn ByteSource>,
        parent_folder_id: impl Into<String>,
        is_top_level: bool,
    ) -> Self {
        let mut meta = Self::new(source.name(), parent_folder_id, source.size(), is_top_level);
        meta.source = Some(source);
        meta
    }

    /// Attaches a resolved source, taking its size.
    pub fn resolve(&mut self, source: Arc<dyn ByteSource>) {
        self.size = source.size();
        self.source = Some(source);
    }

    pub fn is_resolved(&self) -> bool {
        self.source.is_some()
    }

    /// The remote file id, or an error if registration has not happened.
    pub fn file_id(&self) -> Result<&str, TransferError> {
        self.remote_file_id
            .as_deref()
            .ok_or_else(|| TransferError::MissingFileId(self.name.clone()))
    }

    /// Bytes covered by chunks the server has accepted.
    pub fn confirmed_bytes(&self) -> u64 {
        self.chunks
            .values()
            .filter(|c| c.complete)
            .map(ChunkRecord::len)
            .sum()
    }

    /// Whether every byte of the file sits in an accepted chunk.
    pub fn is_complete(&self) -> bool {
        self.confirmed_bytes() >= self.size
    }

    fn recount(&mut self) {
        self.uploaded_so_far = self.chunks.values().map(|c| c.uploaded_so_far).sum();
    }
}

/// One user-visible upload action: a single file or a dropped tree.
#[derive(Debug, Clone)]
pub struct UploadSession {
    pub local_id: String,
    pub server_id: Option<String>,
    pub name: String,
    pub kind: UploadKind,
    pub status: UploadStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Grows as files are registered.
    pub total_size: u64,
    /// Never decreases while the session is not failed.
    pub uploaded_so_far: u64,
    pub error: Option<String>,
    pub speed_bytes_per_second: f64,
    /// Files keyed by remote file id.
    pub files: HashMap<String, FileUploadMetadata>,
}

impl UploadSession {
    /// Creates a pending session.
    pub fn new(local_id: impl Into<String>, name: impl Into<String>, kind: UploadKind) -> Self {
        Self {
            local_id: local_id.into(),
            server_id: None,
            name: name.into(),
            kind,
            status: UploadStatus::Pending,
            start_time: Utc::now(),
            end_time: None,
            total_size: 0,
            uploaded_so_far: 0,
            error: None,
            speed_bytes_per_second: 0.0,
            files: HashMap::new(),
        }
    }

    /// Moves to `next` if the state machine allows it. Returns `true` on change.
    pub fn transition(&mut self, next: UploadStatus) -> bool {
        if self.status == next || !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        if next.is_terminal() {
            self.end_time = Some(Utc::now());
            self.speed_bytes_per_second = 0.0;
        }
        true
    }

    /// Registers a file that already carries its remote id.
    pub fn add_file(&mut self, file: FileUploadMetadata) -> Result<(), TransferError> {
        let file_id = file.file_id()?.to_string();
        if let Some(previous) = self.files.insert(file_id, file.clone()) {
            self.total_size -= previous.size;
        }
        self.total_size += file.size;
        Ok(())
    }

    /// Replaces the chunk record at `start` with new progress.
    ///
    /// Returns the positive byte delta that reached the session total.
    pub fn apply_chunk(
        &mut self,
        file_id: &str,
        start: u64,
        len: u64,
        uploaded: u64,
        complete: bool,
    ) -> Result<u64, TransferError> {
        let file = self.file_mut(file_id)?;

        let mut record = ChunkRecord::new(start, start + len);
        let previous = file.chunks.get(&start).copied();
        let floor = previous
            .filter(|p| p.end == record.end)
            .map_or(0, |p| p.uploaded_so_far);
        record.uploaded_so_far = uploaded.min(record.len()).max(floor);
        record.complete = complete || previous.is_some_and(|p| p.end == record.end && p.complete);
        if complete {
            record.uploaded_so_far = record.len();
        }
        file.chunks.insert(start, record);
        file.recount();

        let before = self.uploaded_so_far;
        self.recount();
        Ok(self.uploaded_so_far - before)
    }

    /// Drops the chunk record at `start`, discarding its partial progress.
    ///
    /// Returns `false` if no record existed.
    pub fn reset_chunk(&mut self, file_id: &str, start: u64) -> Result<bool, TransferError> {
        let file = self.file_mut(file_id)?;
        let removed = file.chunks.remove(&start).is_some();
        if removed {
            file.recount();
        }
        Ok(removed)
    }

    /// Records the first error and fails the session. Terminal sessions are left alone.
    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        if self.error.is_none() {
            self.error = Some(error.into());
        }
        self.transition(UploadStatus::Failed)
    }

    /// The cooperative cancellation signal: any recorded error.
    pub fn is_cancelled(&self) -> bool {
        self.error.is_some()
    }

    /// Whether every registered file has been fully accepted by the server.
    /// Vacuously true for a session with no files.
    pub fn all_files_complete(&self) -> bool {
        self.files.values().all(FileUploadMetadata::is_complete)
    }

    /// Exact confirmed byte count (sum of accepted chunks).
    pub fn confirmed_bytes(&self) -> u64 {
        self.files.values().map(FileUploadMetadata::confirmed_bytes).sum()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn progress_percent(&self) -> f64 {
        if self.total_size == 0 {
            return if self.status == UploadStatus::Completed {
                100.0
            } else {
                0.0
            };
        }
        (self.uploaded_so_far as f64 / self.total_size as f64 * 100.0).min(100.0)
    }

    /// Returns a render-ready snapshot.
    pub fn progress(&self) -> UploadProgress {
        UploadProgress {
            local_id: self.local_id.clone(),
            server_id: self.server_id.clone(),
            name: self.name.clone(),
            kind: self.kind,
            status: self.status,
            total_size: self.total_size,
            uploaded_so_far: self.uploaded_so_far,
            progress_percent: self.progress_percent(),
            speed_bytes_per_second: self.speed_bytes_per_second,
            file_count: self.files.len(),
            error: self.error.clone(),
        }
    }

    fn file_mut(&mut self, file_id: &str) -> Result<&mut FileUploadMetadata, TransferError> {
        let local_id = &self.local_id;
        self.files
            .get_mut(file_id)
            .ok_or_else(|| TransferError::FileNotFound {
                local_id: local_id.clone(),
                file_id: file_id.to_string(),
            })
    }

    // Session progress is a high-water mark over the per-file sums, so a
    // discarded partial chunk never makes the bar go backwards.
    fn recount(&mut self) {
        let sum: u64 = self.files.values().map(|f| f.uploaded_so_far).sum();
        self.uploaded_so_far = self.uploaded_so_far.max(sum).min(self.total_size);
    }
}
