use std::future::Future;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::TransferError;

/// Random-access bytes of one file to upload.
pub trait ByteSource: Send + Sync {
    fn name(&self) -> &str;

    /// Total size in bytes.
    fn size(&self) -> u64;

    /// Reads `[low, high)`; `high` is clamped to the size.
    fn read_range(
        &self,
        low: u64,
        high: u64,
    ) -> Pin<Box<dyn Future<Output = Result<Bytes, TransferError>> + Send + '_>>;
}

/// A file on the local filesystem; each range read opens the file anew.
#[derive(Debug, Clone)]
pub struct LocalFile {
    path: PathBuf,
    name: String,
    size: u64,
}

impl LocalFile {
    /// Stats `path` and captures its name and current size.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, TransferError> {
        let path = path.as_ref().to_path_buf();
        let metadata = tokio::fs::metadata(&path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| TransferError::InvalidName(path.display().to_string()))?;
        Ok(Self {
            path,
            name,
            size: metadata.len(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteSource for LocalFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn read_range(
        &self,
        low: u64,
        high: u64,
    ) -> Pin<Box<dyn Future<Output = Result<Bytes, TransferError>> + Send + '_>> {
        Box::pin(async move {
            let high = high.min(self.size);
            if low >= high {
                return Ok(Bytes::new());
            }
            let mut file = tokio::fs::File::open(&self.path).await?;
            file.seek(SeekFrom::Start(low)).await?;
            let mut buf = vec![0u8; (high - low) as usize];
            file.read_exact(&mut buf).await?;
            Ok(Bytes::from(buf))
        })
    }
}

/// An in-memory file, used for bridged entries and tests.
#[derive(Debug, Clone)]
pub struct MemoryFile {
    name: String,
    data: Bytes,
}

impl MemoryFile {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

impl ByteSource for MemoryFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_range(
        &self,
        low: u64,
        high: u64,
    ) -> Pin<Box<dyn Future<Output = Result<Bytes, TransferError>> + Send + '_>> {
        let high = high.min(self.size());
        let slice = if low >= high {
            Bytes::new()
        } else {
            self.data.slice(low as usize..high as usize)
        };
        Box::pin(async move { Ok(slice) })
    }
}
