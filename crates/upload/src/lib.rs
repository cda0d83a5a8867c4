//! Upload orchestration against the storage REST API.
//!
//! [`UploadOrchestrator`] turns dropped or selected entries into upload
//! sessions: it opens the remote session, mirrors the folder tree with
//! [`Enumerator`], registers files and hands each one to a chunk chain on the
//! shared queue.

pub mod api;
pub mod config;
pub mod entry;
pub mod enumerator;
pub mod error;
pub mod http;
pub mod orchestrator;

#[cfg(test)]
mod mock;

pub use api::{ApiChunkSink, ApiFuture, StorageApi};
pub use config::UploadConfig;
pub use entry::{EntryFuture, EntrySource, LocalEntry, MemoryEntry};
pub use enumerator::{Enumerator, HandlePoll, SelectedFile, plan_selection};
pub use error::UploadError;
pub use http::HttpStorageApi;
pub use orchestrator::UploadOrchestrator;
