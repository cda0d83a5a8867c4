//! Wire types shared by the strato upload pipeline and the push-event consumer.
//!
//! Everything here is plain serde data. The HTTP and WebSocket plumbing lives
//! in `strato-upload` and `strato-sync`.

pub mod constants;
pub mod envelope;
pub mod messages;
pub mod types;

// Re-export primary types for convenience.
pub use constants::{TaskType, WsEvent};
pub use envelope::WsMessage;
pub use types::{ContentRange, FileInfo, UploadKind, UploadProgress, UploadStatus};
