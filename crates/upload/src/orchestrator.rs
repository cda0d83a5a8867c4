//! Upload session orchestration.
//!
//! Ties one user action (a drop or a file selection) to the upload store:
//! register the sessions, open the remote session through the shared queue,
//! enumerate, register files and submit one chunk chain per file.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, error, info};

use strato_protocol::messages::NewFileParams;
use strato_protocol::types::UploadKind;
use strato_transfer::{
    ChunkPolicy, ChunkSink, ChunkUpload, FileUploadMetadata, NameFilter, TaskQueue, UploadStore,
    split_relative_path,
};

use crate::api::{ApiChunkSink, StorageApi};
use crate::config::UploadConfig;
use crate::entry::EntrySource;
use crate::enumerator::{Enumerator, HandlePoll, SelectedFile, plan_selection};
use crate::error::UploadError;

/// Drives upload sessions from user action to submitted chunk chains.
pub struct UploadOrchestrator {
    api: Arc<dyn StorageApi>,
    sink: Arc<dyn ChunkSink>,
    store: UploadStore,
    queue: TaskQueue,
    config: UploadConfig,
    policy: ChunkPolicy,
    filter: NameFilter,
}

impl UploadOrchestrator {
    /// Creates an orchestrator; the queue is sized by `maxConcurrentUploads`.
    pub fn new(
        api: Arc<dyn StorageApi>,
        store: UploadStore,
        config: UploadConfig,
    ) -> Result<Self, UploadError> {
        config.validate()?;
        let sink: Arc<dyn ChunkSink> = Arc::new(ApiChunkSink::new(
            Arc::clone(&api),
            config.share().map(str::to_string),
        ));
        Ok(Self {
            api,
            sink,
            store,
            queue: TaskQueue::new(config.max_concurrent_uploads),
            policy: config.chunk_policy(),
            filter: config.name_filter(),
            config,
        })
    }

    pub fn store(&self) -> &UploadStore {
        &self.store
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    /// Uploads dropped entries into `root_folder_id`: one session per entry,
    /// all sharing a single remote upload session. Returns the local ids.
    pub async fn handle_drop(
        &self,
        entries: Vec<Box<dyn EntrySource>>,
        root_folder_id: &str,
    ) -> Vec<String> {
        if entries.is_empty() {
            return Vec::new();
        }

        let sessions: Vec<(String, Box<dyn EntrySource>)> = entries
            .into_iter()
            .map(|entry| {
                let kind = if entry.is_dir() {
                    UploadKind::Directory
                } else {
                    UploadKind::File
                };
                (self.register(entry.name(), kind), entry)
            })
            .collect();
        let local_ids: Vec<String> = sessions.iter().map(|(id, _)| id.clone()).collect();

        let server_id = match self.open_session(root_folder_id).await {
            Ok(id) => id,
            Err(e) => {
                for id in &local_ids {
                    self.fail(id, &e);
                }
                return local_ids;
            }
        };

        for (local_id, entry) in sessions {
            if let Err(e) = self
                .upload_entry(&local_id, &server_id, entry, root_folder_id)
                .await
            {
                self.fail(&local_id, &e);
            }
        }
        local_ids
    }

    /// Uploads files from a selection dialog. Files under a folder become one
    /// directory session per top-level folder; loose files get a session each.
    pub async fn handle_file_select(
        &self,
        files: Vec<SelectedFile>,
        root_folder_id: &str,
    ) -> Vec<String> {
        let mut trees: BTreeMap<String, Vec<SelectedFile>> = BTreeMap::new();
        let mut loose = Vec::new();
        for file in files {
            match split_relative_path(&file.relative_path) {
                Ok(parts) if parts.len() > 1 => {
                    trees.entry(parts[0].clone()).or_default().push(file);
                }
                _ => loose.push(file),
            }
        }

        let mut local_ids = Vec::new();

        let tree_sessions: Vec<(String, Vec<SelectedFile>)> = trees
            .into_iter()
            .map(|(top, files)| (self.register(&top, UploadKind::Directory), files))
            .collect();
        let loose_sessions: Vec<(String, SelectedFile)> = loose
            .into_iter()
            .map(|file| (self.register(file.source.name(), UploadKind::File), file))
            .collect();

        for (local_id, files) in tree_sessions {
            if let Err(e) = self.upload_selection(&local_id, files, root_folder_id).await {
                self.fail(&local_id, &e);
            }
            local_ids.push(local_id);
        }

        for (local_id, file) in loose_sessions {
            if let Err(e) = self.upload_loose(&local_id, file, root_folder_id).await {
                self.fail(&local_id, &e);
            }
            local_ids.push(local_id);
        }

        local_ids
    }

    /// Registers enumerated files with the remote session and the store,
    /// then submits one chunk chain per file.
    pub async fn try_upload(
        &self,
        local_id: &str,
        server_id: &str,
        files: Vec<FileUploadMetadata>,
    ) -> Result<(), UploadError> {
        if self.store.is_cancelled(local_id) {
            return Err(UploadError::Cancelled);
        }

        let mut files: Vec<FileUploadMetadata> = files
            .into_iter()
            .filter(|f| self.filter.accepts(&f.name))
            .collect();
        if let Some(unresolved) = files.iter().find(|f| !f.is_resolved()) {
            return Err(UploadError::HandleTimeout(unresolved.name.clone()));
        }

        if files.is_empty() {
            self.store.add_files_to_upload(local_id, Vec::new())?;
            info!(upload = %local_id, "nothing to upload");
            return Ok(());
        }

        let params = files
            .iter()
            .map(|f| NewFileParams::file(f.parent_folder_id.as_str(), f.name.as_str(), f.size))
            .collect();
        let ids = self
            .api
            .add_files_to_upload(server_id, params, self.config.share())
            .await
            .map_err(|e| UploadError::Structural(format!("could not register files: {e}")))?;
        if ids.len() != files.len() {
            return Err(UploadError::Structural(format!(
                "server returned {} file ids for {} files",
                ids.len(),
                files.len()
            )));
        }
        for (file, id) in files.iter_mut().zip(ids) {
            file.remote_file_id = Some(id);
        }

        let total_bytes: u64 = files.iter().map(|f| f.size).sum();
        self.store.add_files_to_upload(local_id, files.clone())?;
        info!(
            upload = %local_id,
            server_upload = %server_id,
            files = files.len(),
            total_bytes,
            "upload started"
        );

        for file in files {
            let file_id = file.file_id()?.to_string();
            let source = file
                .source
                .clone()
                .ok_or_else(|| UploadError::HandleTimeout(file.name.clone()))?;
            ChunkUpload::new(
                self.store.clone(),
                Arc::clone(&self.sink),
                self.policy,
                local_id,
                server_id,
                file_id,
                source,
            )
            .submit(&self.queue)?;
        }
        Ok(())
    }

    /// Sets the cancellation signal; chains stop at their next chunk boundary.
    pub fn cancel(&self, local_id: &str) -> Result<(), UploadError> {
        self.store.cancel_upload(local_id)?;
        Ok(())
    }

    /// Waits for every chain submitted so far.
    pub async fn wait_idle(&self) {
        self.queue.wait_idle().await;
    }

    fn register(&self, name: &str, kind: UploadKind) -> String {
        let local_id = uuid::Uuid::new_v4().to_string();
        self.store.start_upload(local_id.as_str(), name, kind);
        local_id
    }

    /// Opens the remote upload session as a one-shot queue task.
    async fn open_session(&self, root_folder_id: &str) -> Result<String, UploadError> {
        let api = Arc::clone(&self.api);
        let root = root_folder_id.to_string();
        let share = self.config.share().map(str::to_string);
        let chunk_size = self.config.max_chunk_size;

        let handle = self
            .queue
            .add_task(async move { api.start_upload(&root, chunk_size, share.as_deref()).await })?;
        let queued = handle
            .await
            .map_err(|e| UploadError::Structural(format!("upload session task failed: {e}")))?;
        let server_id = queued?
            .map_err(|e| UploadError::Structural(format!("could not open upload session: {e}")))?;
        debug!(server_upload = %server_id, root = %root_folder_id, "remote upload session open");
        Ok(server_id)
    }

    async fn upload_entry(
        &self,
        local_id: &str,
        server_id: &str,
        entry: Box<dyn EntrySource>,
        root_folder_id: &str,
    ) -> Result<(), UploadError> {
        self.store.set_server_upload(local_id, server_id)?;
        let files = Enumerator::new(
            self.api.as_ref(),
            server_id,
            self.config.share(),
            &self.filter,
            HandlePoll::from_config(&self.config),
        )
        .enumerate(vec![entry], root_folder_id)
        .await?;
        self.try_upload(local_id, server_id, files).await
    }

    async fn upload_selection(
        &self,
        local_id: &str,
        files: Vec<SelectedFile>,
        root_folder_id: &str,
    ) -> Result<(), UploadError> {
        let server_id = self.open_session(root_folder_id).await?;
        self.store.set_server_upload(local_id, server_id.as_str())?;
        let planned = plan_selection(self.api.as_ref(), files, root_folder_id, &self.filter).await?;
        self.try_upload(local_id, &server_id, planned).await
    }

    async fn upload_loose(
        &self,
        local_id: &str,
        file: SelectedFile,
        root_folder_id: &str,
    ) -> Result<(), UploadError> {
        let server_id = self.open_session(root_folder_id).await?;
        self.store.set_server_upload(local_id, server_id.as_str())?;
        let meta = FileUploadMetadata::from_source(file.source, root_folder_id, true);
        self.try_upload(local_id, &server_id, vec![meta]).await
    }

    fn fail(&self, local_id: &str, err: &UploadError) {
        if matches!(err, UploadError::Cancelled) || self.store.is_cancelled(local_id) {
            debug!(upload = %local_id, "upload stopped after cancellation");
            return;
        }
        if let Err(e) = self.store.fail_upload(local_id, err.to_string()) {
            error!(upload = %local_id, error = %e, "could not record upload failure");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use strato_protocol::types::UploadStatus;
    use strato_transfer::MemoryFile;

    use crate::entry::MemoryEntry;
    use crate::mock::{Call, MockApi};

    fn config(max_chunk: u64) -> UploadConfig {
        UploadConfig {
            max_chunk_size: max_chunk,
            min_chunk_size: 1,
            handle_poll_interval_ms: 1,
            ..Default::default()
        }
    }

    fn orchestrator(api: &Arc<MockApi>, max_chunk: u64) -> UploadOrchestrator {
        UploadOrchestrator::new(api.clone(), UploadStore::new(), config(max_chunk)).unwrap()
    }

    fn drop_of(entries: Vec<MemoryEntry>) -> Vec<Box<dyn EntrySource>> {
        entries
            .into_iter()
            .map(|e| Box::new(e) as Box<dyn EntrySource>)
            .collect()
    }

    #[tokio::test]
    async fn small_file_in_one_chunk() {
        let api = Arc::new(MockApi::default());
        let orch = orchestrator(&api, 1_000_000);

        let ids = orch
            .handle_drop(
                drop_of(vec![MemoryEntry::file("small.bin", vec![0u8; 10_240])]),
                "home",
            )
            .await;
        orch.wait_idle().await;

        assert_eq!(
            api.chunk_calls(),
            vec![("file-small.bin".to_string(), "bytes=0-10239/10240".to_string())]
        );
        let s = orch.store().get(&ids[0]).unwrap();
        assert_eq!(s.kind, UploadKind::File);
        assert_eq!(s.server_id.as_deref(), Some("upload-1"));
        assert_eq!(s.status, UploadStatus::Completed);
        assert_eq!(s.uploaded_so_far, 10_240);
        assert_eq!(s.total_size, 10_240);
    }

    #[tokio::test]
    async fn nested_folder_exists_before_its_files_upload() {
        let api = Arc::new(MockApi::default());
        let orch = orchestrator(&api, 1024);
        let tree = MemoryEntry::dir(
            "root",
            vec![
                MemoryEntry::file("a.txt", &b"aaa"[..]),
                MemoryEntry::dir("sub", vec![MemoryEntry::file("b.txt", &b"bb"[..])]),
            ],
        );

        let ids = orch.handle_drop(drop_of(vec![tree]), "home").await;
        orch.wait_idle().await;

        let calls = api.calls();
        let sub = NewFileParams::dir("dir-root", "sub");
        let sub_created = calls
            .iter()
            .position(|c| matches!(c, Call::AddFiles { files, .. } if files[0] == sub))
            .unwrap();
        let b_chunk = calls
            .iter()
            .position(|c| matches!(c, Call::Chunk { file, .. } if file == "file-b.txt"))
            .unwrap();
        assert!(sub_created < b_chunk);

        let registration = calls
            .iter()
            .find_map(|c| match c {
                Call::AddFiles { files, .. } if !files[0].is_dir => Some(files.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(
            registration,
            vec![
                NewFileParams::file("dir-root", "a.txt", 3),
                NewFileParams::file("dir-sub", "b.txt", 2),
            ]
        );

        let s = orch.store().get(&ids[0]).unwrap();
        assert_eq!(s.kind, UploadKind::Directory);
        assert_eq!(s.status, UploadStatus::Completed);
        assert_eq!(s.total_size, 5);
        assert_eq!(s.file_count(), 2);
    }

    #[tokio::test]
    async fn failing_chunk_recovers_without_double_counting() {
        let api = Arc::new(MockApi::default());
        api.fail_chunks("file-big.bin", 1);
        let orch = orchestrator(&api, 100);

        let ids = orch
            .handle_drop(drop_of(vec![MemoryEntry::file("big.bin", vec![1u8; 100])]), "home")
            .await;
        orch.wait_idle().await;

        let ranges: Vec<String> = api.chunk_calls().into_iter().map(|(_, r)| r).collect();
        assert_eq!(ranges, vec!["bytes=0-99/100", "bytes=0-49/100", "bytes=50-99/100"]);

        let s = orch.store().get(&ids[0]).unwrap();
        assert_eq!(s.status, UploadStatus::Completed);
        assert_eq!(s.uploaded_so_far, 100);
        let file = s.files.values().next().unwrap();
        let sum: u64 = file.chunks.values().map(|c| c.uploaded_so_far).sum();
        assert_eq!(sum, 100);
    }

    #[tokio::test]
    async fn exhausted_retries_fail_the_session() {
        let api = Arc::new(MockApi::default());
        api.fail_chunks("file-doomed.bin", u32::MAX);
        let orch = orchestrator(&api, 1000);

        let ids = orch
            .handle_drop(drop_of(vec![MemoryEntry::file("doomed.bin", vec![0u8; 1000])]), "home")
            .await;
        orch.wait_idle().await;

        assert_eq!(api.chunk_calls().len(), 6);
        let s = orch.store().get(&ids[0]).unwrap();
        assert_eq!(s.status, UploadStatus::Failed);
        assert!(s.error.as_deref().unwrap().contains("503"));
    }

    #[tokio::test(start_paused = true)]
    async fn chunk_calls_never_exceed_the_budget() {
        let api = Arc::new(MockApi::with_chunk_delay(Duration::from_millis(20)));
        let orch = orchestrator(&api, 10);

        let files = (0..5)
            .map(|i| MemoryEntry::file(format!("f{i}.bin"), vec![0u8; 35]))
            .collect();
        let ids = orch.handle_drop(drop_of(files), "home").await;
        orch.wait_idle().await;

        assert_eq!(api.peak_chunks(), 2);
        assert_eq!(api.chunk_calls().len(), 5 * 4);
        for id in ids {
            assert_eq!(orch.store().get(&id).unwrap().status, UploadStatus::Completed);
        }
    }

    #[tokio::test]
    async fn session_open_failure_fails_every_entry() {
        let api = Arc::new(MockApi::default());
        api.fail_start.store(true, std::sync::atomic::Ordering::SeqCst);
        let orch = orchestrator(&api, 1024);

        let ids = orch
            .handle_drop(
                drop_of(vec![
                    MemoryEntry::file("a", &b"1"[..]),
                    MemoryEntry::file("b", &b"2"[..]),
                ]),
                "home",
            )
            .await;

        assert_eq!(ids.len(), 2);
        for id in &ids {
            let s = orch.store().get(id).unwrap();
            assert_eq!(s.status, UploadStatus::Failed);
            assert!(s.error.as_deref().unwrap().contains("could not open upload session"));
        }
        assert_eq!(api.calls().len(), 1);
    }

    #[tokio::test]
    async fn id_count_mismatch_is_structural() {
        let api = Arc::new(MockApi::default());
        api.short_ids.store(true, std::sync::atomic::Ordering::SeqCst);
        let orch = orchestrator(&api, 1024);

        let ids = orch
            .handle_drop(drop_of(vec![MemoryEntry::file("a", &b"1"[..])]), "home")
            .await;
        orch.wait_idle().await;

        let s = orch.store().get(&ids[0]).unwrap();
        assert_eq!(s.status, UploadStatus::Failed);
        assert!(api.chunk_calls().is_empty());
    }

    #[tokio::test]
    async fn cancel_stops_pending_chunks() {
        let api = Arc::new(MockApi::default());
        let orch = orchestrator(&api, 10);

        let ids = orch
            .handle_drop(drop_of(vec![MemoryEntry::file("a", vec![0u8; 100])]), "home")
            .await;
        orch.cancel(&ids[0]).unwrap();
        orch.wait_idle().await;

        assert!(api.chunk_calls().len() <= 1);
        let s = orch.store().get(&ids[0]).unwrap();
        assert_eq!(s.status, UploadStatus::Failed);
        assert_eq!(s.error.as_deref(), Some("cancelled"));
    }

    #[tokio::test]
    async fn empty_folder_and_empty_file_complete() {
        let api = Arc::new(MockApi::default());
        let orch = orchestrator(&api, 10);

        let ids = orch
            .handle_drop(
                drop_of(vec![
                    MemoryEntry::dir("empty", Vec::new()),
                    MemoryEntry::file("zero", Vec::<u8>::new()),
                ]),
                "home",
            )
            .await;
        orch.wait_idle().await;

        for id in &ids {
            assert_eq!(orch.store().get(id).unwrap().status, UploadStatus::Completed);
        }
        assert!(api.chunk_calls().is_empty());
    }

    #[tokio::test]
    async fn file_select_splits_trees_and_loose_files() {
        let api = Arc::new(MockApi::default());
        let orch = orchestrator(&api, 1024);
        let pick = |path: &str, name: &str| {
            SelectedFile::new(path, Arc::new(MemoryFile::new(name, &b"abc"[..])))
        };

        let ids = orch
            .handle_file_select(
                vec![
                    pick("album/one.jpg", "one.jpg"),
                    pick("album/2024/two.jpg", "two.jpg"),
                    pick("notes.txt", "notes.txt"),
                    pick("todo.txt", "todo.txt"),
                ],
                "home",
            )
            .await;
        orch.wait_idle().await;

        assert_eq!(ids.len(), 3);
        let calls = api.calls();
        let starts = calls
            .iter()
            .filter(|c| matches!(c, Call::StartUpload { .. }))
            .count();
        assert_eq!(starts, 3);
        assert!(calls.contains(&Call::CreateFolder {
            parent: "folder-album".into(),
            name: "2024".into()
        }));

        let album = orch.store().get(&ids[0]).unwrap();
        assert_eq!(album.name, "album");
        assert_eq!(album.kind, UploadKind::Directory);
        assert_eq!(album.total_size, 6);
        for id in &ids {
            assert_eq!(orch.store().get(id).unwrap().status, UploadStatus::Completed);
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn linked_ancestor_is_not_walked_again() {
        let dir = tempfile::TempDir::new().unwrap();
        let root = dir.path().join("root");
        std::fs::create_dir(&root).unwrap();
        std::fs::write(root.join("a.txt"), b"abc").unwrap();
        std::os::unix::fs::symlink(&root, root.join("loop")).unwrap();

        let api = Arc::new(MockApi::default());
        let orch = orchestrator(&api, 1024);
        let entry = crate::entry::LocalEntry::open(&root, 10).await.unwrap();
        let entries: Vec<Box<dyn EntrySource>> = vec![Box::new(entry)];
        let ids = orch.handle_drop(entries, "home").await;
        orch.wait_idle().await;

        let folders = api
            .calls()
            .iter()
            .filter(|c| matches!(c, Call::AddFiles { files, .. } if files[0].is_dir))
            .count();
        assert_eq!(folders, 1);
        let session = orch.store().get(&ids[0]).unwrap();
        assert_eq!(session.status, UploadStatus::Completed);
        assert_eq!(session.total_size, 3);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let api: Arc<dyn StorageApi> = Arc::new(MockApi::default());
        let cfg = UploadConfig {
            max_concurrent_uploads: 0,
            ..Default::default()
        };
        assert!(matches!(
            UploadOrchestrator::new(api, UploadStore::new(), cfg),
            Err(UploadError::InvalidConfig(_))
        ));
    }
}
