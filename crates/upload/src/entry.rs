//! Dropped or selected filesystem entries.
//!
//! An [`EntrySource`] is a node of a tree the user handed over: a directory
//! whose children are read page by page, or a file whose byte source may
//! only become available after a short delay.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use bytes::Bytes;
use tokio::sync::OnceCell;
use tracing::debug;

use strato_protocol::constants::DEFAULT_DIR_PAGE_SIZE;
use strato_transfer::{ByteSource, LocalFile, MemoryFile};

use crate::error::UploadError;

/// Boxed future returned by [`EntrySource`] methods.
pub type EntryFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, UploadError>> + Send + 'a>>;

/// One node of a dropped tree.
pub trait EntrySource: Send + Sync {
    fn name(&self) -> &str;

    fn is_dir(&self) -> bool;

    /// Returns the `page`-th batch of children; an empty batch means no more.
    fn read_entries(&self, page: usize) -> EntryFuture<'_, Vec<Box<dyn EntrySource>>>;

    /// Returns the file's bytes, or `None` if they are not available yet.
    fn resolve_file(&self) -> EntryFuture<'_, Option<Arc<dyn ByteSource>>>;
}

/// An entry on the local filesystem.
///
/// A directory is listed once, on the first page request, and later pages
/// are served from that listing. Symbolic links below the opened path are
/// skipped, so a link back to an ancestor cannot be walked again.
#[derive(Debug, Clone)]
pub struct LocalEntry {
    path: PathBuf,
    name: String,
    is_dir: bool,
    page_size: usize,
    listing: Arc<OnceCell<Vec<LocalEntry>>>,
}

impl LocalEntry {
    /// Stats `path`. Directory listings are returned `page_size` entries at a time.
    pub async fn open(path: impl AsRef<Path>, page_size: usize) -> Result<Self, UploadError> {
        let path = path.as_ref().to_path_buf();
        let metadata = tokio::fs::metadata(&path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                UploadError::Enumeration(format!("path has no name: {}", path.display()))
            })?;
        Ok(Self::new(path, name, metadata.is_dir(), page_size))
    }

    fn new(path: PathBuf, name: String, is_dir: bool, page_size: usize) -> Self {
        Self {
            path,
            name,
            is_dir,
            page_size: page_size.max(1),
            listing: Arc::new(OnceCell::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Children sorted by path, without symbolic links.
    async fn list(&self) -> Result<Vec<LocalEntry>, UploadError> {
        let mut children = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.path).await?;
        while let Some(entry) = dir.next_entry().await? {
            let file_type = entry.file_type().await?;
            let path = entry.path();
            if file_type.is_symlink() {
                debug!(path = %path.display(), "skipping symbolic link");
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            children.push(Self::new(path, name, file_type.is_dir(), self.page_size));
        }
        children.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(children)
    }
}

impl EntrySource for LocalEntry {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_dir(&self) -> bool {
        self.is_dir
    }

    fn read_entries(&self, page: usize) -> EntryFuture<'_, Vec<Box<dyn EntrySource>>> {
        Box::pin(async move {
            if !self.is_dir {
                return Ok(Vec::new());
            }
            let listing = self.listing.get_or_try_init(|| self.list()).await?;
            Ok(listing
                .iter()
                .skip(page.saturating_mul(self.page_size))
                .take(self.page_size)
                .map(|child| Box::new(child.clone()) as Box<dyn EntrySource>)
                .collect())
        })
    }

    fn resolve_file(&self) -> EntryFuture<'_, Option<Arc<dyn ByteSource>>> {
        Box::pin(async move {
            if self.is_dir {
                return Ok(None);
            }
            let file = LocalFile::open(&self.path).await?;
            Ok(Some(Arc::new(file) as Arc<dyn ByteSource>))
        })
    }
}

#[derive(Debug, Clone)]
enum MemoryNode {
    Dir(Vec<MemoryEntry>),
    File(Bytes),
}

/// An in-memory tree, used for bridged entries and tests.
#[derive(Debug, Clone)]
pub struct MemoryEntry {
    name: String,
    node: MemoryNode,
    page_size: usize,
    /// Resolve attempts that still report "not ready".
    pending_polls: Arc<AtomicU32>,
}

impl MemoryEntry {
    pub fn file(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            node: MemoryNode::File(data.into()),
            page_size: DEFAULT_DIR_PAGE_SIZE,
            pending_polls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn dir(name: impl Into<String>, children: Vec<MemoryEntry>) -> Self {
        Self {
            name: name.into(),
            node: MemoryNode::Dir(children),
            page_size: DEFAULT_DIR_PAGE_SIZE,
            pending_polls: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Lists children `page_size` at a time.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// The first `polls` resolve attempts report the file as not ready.
    pub fn resolving_after(self, polls: u32) -> Self {
        self.pending_polls.store(polls, Ordering::SeqCst);
        self
    }
}

impl EntrySource for MemoryEntry {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_dir(&self) -> bool {
        matches!(self.node, MemoryNode::Dir(_))
    }

    fn read_entries(&self, page: usize) -> EntryFuture<'_, Vec<Box<dyn EntrySource>>> {
        let children: Vec<Box<dyn EntrySource>> = match &self.node {
            MemoryNode::Dir(children) => children
                .iter()
                .skip(page * self.page_size)
                .take(self.page_size)
                .map(|c| Box::new(c.clone()) as Box<dyn EntrySource>)
                .collect(),
            MemoryNode::File(_) => Vec::new(),
        };
        Box::pin(async move { Ok(children) })
    }

    fn resolve_file(&self) -> EntryFuture<'_, Option<Arc<dyn ByteSource>>> {
        let resolved = match &self.node {
            MemoryNode::File(data) => {
                let not_ready = self
                    .pending_polls
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok();
                (!not_ready).then(|| {
                    let file = MemoryFile::new(self.name.clone(), data.clone());
                    Arc::new(file) as Arc<dyn ByteSource>
                })
            }
            MemoryNode::Dir(_) => None,
        };
        Box::pin(async move { Ok(resolved) })
    }
}
