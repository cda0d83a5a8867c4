//! Resumable chunked upload core.
//!
//! - [`UploadStore`]: the observable tree of upload sessions, files and chunks.
//! - [`TaskQueue`]: a bounded worker pool accepting one-shot tasks and
//!   continuation chains that compute their next link from the previous outcome.
//! - [`ChunkUpload`]: the adaptive chunk driver; chunk size grows on success and
//!   halves on failure, with a per-chunk retry budget.

mod chunked;
mod progress;
mod queue;
mod source;
mod store;
mod types;
mod validation;

pub use chunked::{ChunkContext, ChunkPolicy, ChunkSink, ChunkUpload, ProgressFn};
pub use progress::SpeedCalculator;
pub use queue::{ChainLink, ChainSpec, TaskQueue};
pub use source::{ByteSource, LocalFile, MemoryFile};
pub use store::{ChangeCallback, UploadStore};
pub use types::{ChunkRecord, FileUploadMetadata, UploadSession};
pub use validation::{NameFilter, split_relative_path, validate_entry_name};

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("upload {0} cancelled")]
    Cancelled(String),

    #[error("upload not found: {0}")]
    UploadNotFound(String),

    #[error("file {file_id} not found in upload {local_id}")]
    FileNotFound { local_id: String, file_id: String },

    #[error("file has no remote id: {0}")]
    MissingFileId(String),

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("task queue closed")]
    QueueClosed,

    #[error("chunk transfer failed: {0}")]
    Chunk(String),
}

impl TransferError {
    /// Whether this error is the cooperative cancellation signal.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransferError::Cancelled(_))
    }
}
