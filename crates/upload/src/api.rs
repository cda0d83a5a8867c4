//! Remote storage API contract.
//!
//! `StorageApi` is implemented by [`HttpStorageApi`](crate::http::HttpStorageApi)
//! against the real server and by mocks in tests.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;

use strato_protocol::messages::NewFileParams;
use strato_protocol::types::{ContentRange, FileInfo};
use strato_transfer::{ChunkSink, ProgressFn, TransferError};

use crate::error::UploadError;

/// Boxed future returned by [`StorageApi`] methods.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, UploadError>> + Send + 'a>>;

/// The server calls the upload pipeline depends on.
pub trait StorageApi: Send + Sync {
    /// Opens an upload session rooted at `root_folder_id`; returns its id.
    fn start_upload<'a>(
        &'a self,
        root_folder_id: &'a str,
        chunk_size: u64,
        share_id: Option<&'a str>,
    ) -> ApiFuture<'a, String>;

    /// Registers files and folders; returns one id per entry, in order.
    fn add_files_to_upload<'a>(
        &'a self,
        upload_id: &'a str,
        files: Vec<NewFileParams>,
        share_id: Option<&'a str>,
    ) -> ApiFuture<'a, Vec<String>>;

    /// Sends one byte range of a registered file.
    fn upload_file_chunk<'a>(
        &'a self,
        upload_id: &'a str,
        file_id: &'a str,
        data: Bytes,
        range: ContentRange,
        share_id: Option<&'a str>,
        on_progress: ProgressFn,
    ) -> ApiFuture<'a, ()>;

    /// Creates a folder outside of any upload session.
    fn create_folder<'a>(&'a self, parent_folder_id: &'a str, name: &'a str)
    -> ApiFuture<'a, FileInfo>;
}

/// Adapts a [`StorageApi`] to the chunk driver's [`ChunkSink`].
pub struct ApiChunkSink {
    api: Arc<dyn StorageApi>,
    share_id: Option<String>,
}

impl ApiChunkSink {
    pub fn new(api: Arc<dyn StorageApi>, share_id: Option<String>) -> Self {
        Self { api, share_id }
    }
}

impl ChunkSink for ApiChunkSink {
    fn upload_chunk<'a>(
        &'a self,
        upload_id: &'a str,
        file_id: &'a str,
        data: Bytes,
        range: ContentRange,
        on_progress: ProgressFn,
    ) -> Pin<Box<dyn Future<Output = Result<(), TransferError>> + Send + 'a>> {
        Box::pin(async move {
            self.api
                .upload_file_chunk(
                    upload_id,
                    file_id,
                    data,
                    range,
                    self.share_id.as_deref(),
                    on_progress,
                )
                .await
                .map_err(|e| TransferError::Chunk(e.to_string()))
        })
    }
}
