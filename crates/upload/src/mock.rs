//! In-memory [`StorageApi`] used by the crate's tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;

use strato_protocol::messages::NewFileParams;
use strato_protocol::types::{ContentRange, FileInfo};
use strato_transfer::ProgressFn;

use crate::api::{ApiFuture, StorageApi};
use crate::error::UploadError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    StartUpload { root: String },
    AddFiles { upload: String, files: Vec<NewFileParams> },
    Chunk { file: String, range: String },
    CreateFolder { parent: String, name: String },
}

/// Ids are derived from names: `dir-<name>`, `file-<name>`, `folder-<name>`.
#[derive(Default)]
pub(crate) struct MockApi {
    calls: Mutex<Vec<Call>>,
    uploads: AtomicUsize,
    pub fail_start: AtomicBool,
    /// Folder names whose creation fails.
    pub fail_folders: Mutex<Vec<String>>,
    /// Remaining failures per file id.
    pub chunk_failures: Mutex<HashMap<String, u32>>,
    /// Drop the last id of every registration response.
    pub short_ids: AtomicBool,
    chunk_delay: Option<Duration>,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl MockApi {
    /// Every chunk call sleeps for `delay` before answering.
    pub fn with_chunk_delay(delay: Duration) -> Self {
        Self {
            chunk_delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn chunk_calls(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Chunk { file, range } => Some((file, range)),
                _ => None,
            })
            .collect()
    }

    pub fn peak_chunks(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn fail_chunks(&self, file_id: &str, times: u32) {
        self.chunk_failures
            .lock()
            .unwrap()
            .insert(file_id.to_string(), times);
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl StorageApi for MockApi {
    fn start_upload<'a>(
        &'a self,
        root_folder_id: &'a str,
        _chunk_size: u64,
        _share_id: Option<&'a str>,
    ) -> ApiFuture<'a, String> {
        self.record(Call::StartUpload {
            root: root_folder_id.to_string(),
        });
        Box::pin(async move {
            if self.fail_start.load(Ordering::SeqCst) {
                return Err(UploadError::Api {
                    status: 500,
                    body: "session store offline".into(),
                });
            }
            let n = self.uploads.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("upload-{n}"))
        })
    }

    fn add_files_to_upload<'a>(
        &'a self,
        upload_id: &'a str,
        files: Vec<NewFileParams>,
        _share_id: Option<&'a str>,
    ) -> ApiFuture<'a, Vec<String>> {
        self.record(Call::AddFiles {
            upload: upload_id.to_string(),
            files: files.clone(),
        });
        Box::pin(async move {
            if let Some(dir) = files.iter().find(|f| {
                f.is_dir && self.fail_folders.lock().unwrap().contains(&f.new_file_name)
            }) {
                return Err(UploadError::Api {
                    status: 409,
                    body: format!("cannot create {}", dir.new_file_name),
                });
            }
            let mut ids: Vec<String> = files
                .iter()
                .map(|f| {
                    let prefix = if f.is_dir { "dir" } else { "file" };
                    format!("{prefix}-{}", f.new_file_name)
                })
                .collect();
            if self.short_ids.load(Ordering::SeqCst) {
                ids.pop();
            }
            Ok(ids)
        })
    }

    fn upload_file_chunk<'a>(
        &'a self,
        _upload_id: &'a str,
        file_id: &'a str,
        data: Bytes,
        range: ContentRange,
        _share_id: Option<&'a str>,
        on_progress: ProgressFn,
    ) -> ApiFuture<'a, ()> {
        self.record(Call::Chunk {
            file: file_id.to_string(),
            range: range.to_string(),
        });
        Box::pin(async move {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = self.chunk_delay {
                tokio::time::sleep(delay).await;
            }
            self.running.fetch_sub(1, Ordering::SeqCst);

            let fail = {
                let mut failures = self.chunk_failures.lock().unwrap();
                match failures.get_mut(file_id) {
                    Some(n) if *n > 0 => {
                        *n -= 1;
                        true
                    }
                    _ => false,
                }
            };
            if fail {
                on_progress(data.len() as u64 / 2);
                return Err(UploadError::Api {
                    status: 503,
                    body: "try again".into(),
                });
            }
            on_progress(data.len() as u64);
            Ok(())
        })
    }

    fn create_folder<'a>(
        &'a self,
        parent_folder_id: &'a str,
        name: &'a str,
    ) -> ApiFuture<'a, FileInfo> {
        self.record(Call::CreateFolder {
            parent: parent_folder_id.to_string(),
            name: name.to_string(),
        });
        Box::pin(async move {
            if self.fail_folders.lock().unwrap().iter().any(|f| f == name) {
                return Err(UploadError::Api {
                    status: 409,
                    body: format!("cannot create {name}"),
                });
            }
            Ok(FileInfo {
                id: format!("folder-{name}"),
                parent_id: parent_folder_id.to_string(),
                name: name.to_string(),
                is_dir: true,
                size: 0,
                portable_path: String::new(),
                modify_timestamp: 0,
            })
        })
    }
}
