use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use strato_protocol::constants::{DEFAULT_MAX_CHUNK_SIZE, DEFAULT_MIN_CHUNK_SIZE, MAX_RETRIES};
use strato_protocol::types::ContentRange;

use crate::TransferError;
use crate::queue::{ChainLink, ChainSpec, TaskQueue};
use crate::source::ByteSource;
use crate::store::UploadStore;

/// Reports bytes sent so far for the current chunk call.
pub type ProgressFn = Arc<dyn Fn(u64) + Send + Sync>;

/// The chunk-ingest half of the storage API.
pub trait ChunkSink: Send + Sync {
    /// Sends `data` as `range` of the file. `on_progress` receives running
    /// byte counts for this call only.
    fn upload_chunk<'a>(
        &'a self,
        upload_id: &'a str,
        file_id: &'a str,
        data: Bytes,
        range: ContentRange,
        on_progress: ProgressFn,
    ) -> Pin<Box<dyn Future<Output = Result<(), TransferError>> + Send + 'a>>;
}

/// State carried between successive chunk attempts of one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkContext {
    pub bytes_confirmed: u64,
    pub retries_remaining: u32,
    pub chunk_size: u64,
}

/// Chunk sizing and retry rules.
///
/// Success triples the chunk size up to `max_chunk_size` and returns one
/// retry to the budget. Failure halves it, never below `min_chunk_size`,
/// and retries the same offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPolicy {
    max_chunk_size: u64,
    min_chunk_size: u64,
    max_retries: u32,
}

impl Default for ChunkPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CHUNK_SIZE, DEFAULT_MIN_CHUNK_SIZE, MAX_RETRIES)
    }
}

impl ChunkPolicy {
    /// `max` is clamped to at least 1 and `min` into `[1, max]`.
    pub fn new(max_chunk_size: u64, min_chunk_size: u64, max_retries: u32) -> Self {
        let max_chunk_size = max_chunk_size.max(1);
        Self {
            max_chunk_size,
            min_chunk_size: min_chunk_size.clamp(1, max_chunk_size),
            max_retries,
        }
    }

    pub fn max_chunk_size(&self) -> u64 {
        self.max_chunk_size
    }

    pub fn min_chunk_size(&self) -> u64 {
        self.min_chunk_size
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn initial(&self) -> ChunkContext {
        ChunkContext {
            bytes_confirmed: 0,
            retries_remaining: self.max_retries,
            chunk_size: self.max_chunk_size,
        }
    }

    /// The next `[low, high)` to send, or `None` once the file is done.
    pub fn next_range(&self, ctx: &ChunkContext, file_size: u64) -> Option<(u64, u64)> {
        if ctx.bytes_confirmed >= file_size {
            return None;
        }
        let high = ctx
            .bytes_confirmed
            .saturating_add(ctx.chunk_size.max(1))
            .min(file_size);
        Some((ctx.bytes_confirmed, high))
    }

    pub fn on_success(&self, ctx: &ChunkContext, high: u64) -> ChunkContext {
        ChunkContext {
            bytes_confirmed: high,
            retries_remaining: ctx.retries_remaining.saturating_add(1).min(self.max_retries),
            chunk_size: ctx.chunk_size.saturating_mul(3).min(self.max_chunk_size),
        }
    }

    /// `None` when the retry budget is spent.
    pub fn on_failure(&self, ctx: &ChunkContext) -> Option<ChunkContext> {
        if ctx.retries_remaining == 0 {
            return None;
        }
        let halved = ctx.chunk_size / 2 + ctx.chunk_size % 2;
        Some(ChunkContext {
            bytes_confirmed: ctx.bytes_confirmed,
            retries_remaining: ctx.retries_remaining - 1,
            chunk_size: halved.clamp(self.min_chunk_size, self.max_chunk_size),
        })
    }
}

/// Drives the chunks of one registered file through a [`ChunkSink`].
#[derive(Clone)]
pub struct ChunkUpload {
    store: UploadStore,
    sink: Arc<dyn ChunkSink>,
    policy: ChunkPolicy,
    local_id: String,
    server_id: String,
    file_id: String,
    source: Arc<dyn ByteSource>,
}

impl ChunkUpload {
    pub fn new(
        store: UploadStore,
        sink: Arc<dyn ChunkSink>,
        policy: ChunkPolicy,
        local_id: impl Into<String>,
        server_id: impl Into<String>,
        file_id: impl Into<String>,
        source: Arc<dyn ByteSource>,
    ) -> Self {
        Self {
            store,
            sink,
            policy,
            local_id: local_id.into(),
            server_id: server_id.into(),
            file_id: file_id.into(),
            source,
        }
    }

    /// Runs one link of the chain: send `[bytes_confirmed, bytes_confirmed + chunk_size)`
    /// and compute the next context from the outcome.
    pub async fn push_chunk(&self, ctx: ChunkContext) -> Result<ChunkContext, TransferError> {
        let total = self.source.size();
        let Some((low, high)) = self.policy.next_range(&ctx, total) else {
            return Ok(ctx);
        };

        if self.store.is_cancelled(&self.local_id) {
            return Err(TransferError::Cancelled(self.local_id.clone()));
        }

        let data = self.source.read_range(low, high).await?;
        let range = ContentRange::new(low, high, total);
        let len = range.len();
        trace!(upload = %self.local_id, file = %self.file_id, %range, "sending chunk");

        let outcome = self
            .sink
            .upload_chunk(
                &self.server_id,
                &self.file_id,
                data,
                range,
                self.progress_fn(low, len),
            )
            .await;

        match outcome {
            Ok(()) => {
                self.store
                    .finish_chunk(&self.local_id, &self.file_id, low, len)?;
                Ok(self.policy.on_success(&ctx, high))
            }
            Err(_) if self.store.is_cancelled(&self.local_id) => {
                Err(TransferError::Cancelled(self.local_id.clone()))
            }
            Err(e) => match self.policy.on_failure(&ctx) {
                None => {
                    let message = format!("chunk {range} of {} failed: {e}", self.source.name());
                    self.store.fail_upload(&self.local_id, message.as_str())?;
                    Err(TransferError::Chunk(message))
                }
                Some(next) => {
                    warn!(
                        upload = %self.local_id,
                        file = %self.file_id,
                        offset = low,
                        retries_left = next.retries_remaining,
                        next_chunk_size = next.chunk_size,
                        error = %e,
                        "chunk failed, retrying"
                    );
                    self.store
                        .reset_chunk(&self.local_id, &self.file_id, low)?;
                    Ok(next)
                }
            },
        }
    }

    /// Builds the continuation chain for this file.
    pub fn into_chain(self) -> ChainSpec<ChunkContext, TransferError> {
        let driver = Arc::new(self);
        let fail_with = Arc::clone(&driver);
        let policy = driver.policy;
        let total = driver.source.size();

        ChainSpec::new(
            policy.initial(),
            move |ctx: &ChunkContext| {
                policy.next_range(ctx, total)?;
                let driver = Arc::clone(&driver);
                let ctx = *ctx;
                Some(Box::pin(async move { driver.push_chunk(ctx).await })
                    as ChainLink<ChunkContext, TransferError>)
            },
            move |err: TransferError| fail_with.on_chain_failure(err),
        )
    }

    /// Submits this file's chain to the queue.
    pub fn submit(self, queue: &TaskQueue) -> Result<JoinHandle<()>, TransferError> {
        queue.run_with_next(self.into_chain())
    }

    fn on_chain_failure(&self, err: TransferError) {
        if err.is_cancelled() {
            debug!(upload = %self.local_id, file = %self.file_id, "chunk chain stopped: cancelled");
            return;
        }
        if let Err(e) = self.store.fail_upload(&self.local_id, err.to_string()) {
            debug!(upload = %self.local_id, error = %e, "could not record chain failure");
        }
    }

    fn progress_fn(&self, low: u64, len: u64) -> ProgressFn {
        let store = self.store.clone();
        let local_id = self.local_id.clone();
        let file_id = self.file_id.clone();
        Arc::new(move |sent| {
            if let Err(e) = store.set_upload_progress(&local_id, &file_id, low, len, sent) {
                trace!(upload = %local_id, error = %e, "dropped progress tick");
            }
        })
    }
}
