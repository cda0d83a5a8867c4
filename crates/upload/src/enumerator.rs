//! Directory enumeration.
//!
//! Walks dropped trees top-down, creating each remote folder before any of
//! its children are visited, and flattens the files into descriptors that
//! carry their remote parent id.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use strato_protocol::messages::NewFileParams;
use strato_transfer::{
    ByteSource, FileUploadMetadata, NameFilter, split_relative_path, validate_entry_name,
};

use crate::api::StorageApi;
use crate::config::UploadConfig;
use crate::entry::EntrySource;
use crate::error::UploadError;

/// How long to wait for a file handle to become readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlePoll {
    pub attempts: u32,
    pub interval: Duration,
}

impl HandlePoll {
    pub fn from_config(config: &UploadConfig) -> Self {
        Self {
            attempts: config.handle_poll_attempts.max(1),
            interval: config.handle_poll_interval(),
        }
    }
}

/// A file picked through a selection dialog, with its path relative to the pick root.
#[derive(Clone)]
pub struct SelectedFile {
    pub relative_path: String,
    pub source: Arc<dyn ByteSource>,
}

impl SelectedFile {
    pub fn new(relative_path: impl Into<String>, source: Arc<dyn ByteSource>) -> Self {
        Self {
            relative_path: relative_path.into(),
            source,
        }
    }
}

/// Polls `entry` until its bytes are available, failing after `poll.attempts` tries.
pub async fn resolve_handle(
    entry: &dyn EntrySource,
    poll: HandlePoll,
) -> Result<Arc<dyn ByteSource>, UploadError> {
    for attempt in 0..poll.attempts {
        if let Some(source) = entry.resolve_file().await? {
            return Ok(source);
        }
        if attempt + 1 < poll.attempts {
            tokio::time::sleep(poll.interval).await;
        }
    }
    Err(UploadError::HandleTimeout(entry.name().to_string()))
}

/// Reads every page of a directory until the source reports no more entries.
pub async fn read_all_entries(
    entry: &dyn EntrySource,
) -> Result<Vec<Box<dyn EntrySource>>, UploadError> {
    let mut all = Vec::new();
    let mut page = 0;
    loop {
        let batch = entry.read_entries(page).await?;
        if batch.is_empty() {
            return Ok(all);
        }
        all.extend(batch);
        page += 1;
    }
}

/// Walks dropped entries inside one open upload session.
pub struct Enumerator<'a> {
    api: &'a dyn StorageApi,
    upload_id: &'a str,
    share_id: Option<&'a str>,
    filter: &'a NameFilter,
    poll: HandlePoll,
}

impl<'a> Enumerator<'a> {
    pub fn new(
        api: &'a dyn StorageApi,
        upload_id: &'a str,
        share_id: Option<&'a str>,
        filter: &'a NameFilter,
        poll: HandlePoll,
    ) -> Self {
        Self {
            api,
            upload_id,
            share_id,
            filter,
            poll,
        }
    }

    /// Creates the remote folders for `entries` under `root_folder_id` and
    /// returns a flat descriptor for every accepted file.
    ///
    /// On failure, folders created so far are left on the server.
    pub async fn enumerate(
        &self,
        entries: Vec<Box<dyn EntrySource>>,
        root_folder_id: &str,
    ) -> Result<Vec<FileUploadMetadata>, UploadError> {
        let mut created = Vec::new();
        let result = self.walk(entries, root_folder_id, &mut created).await;
        if let Err(e) = &result
            && !created.is_empty()
        {
            warn!(
                upload = %self.upload_id,
                folders = ?created,
                error = %e,
                "enumeration abandoned, created folders are left in place"
            );
        }
        result
    }

    async fn walk(
        &self,
        entries: Vec<Box<dyn EntrySource>>,
        root_folder_id: &str,
        created: &mut Vec<String>,
    ) -> Result<Vec<FileUploadMetadata>, UploadError> {
        let mut files = Vec::new();
        let mut stack: Vec<(Box<dyn EntrySource>, String)> = entries
            .into_iter()
            .rev()
            .map(|e| (e, root_folder_id.to_string()))
            .collect();

        while let Some((entry, parent_id)) = stack.pop() {
            let name = entry.name().to_string();

            if entry.is_dir() {
                if !self.filter.accepts_dir(&name) {
                    debug!(name = %name, "skipping excluded folder");
                    continue;
                }
                let folder_id = self.create_folder(&parent_id, &name).await?;
                created.push(folder_id.clone());

                let children = read_all_entries(entry.as_ref()).await?;
                debug!(folder = %name, children = children.len(), "listed folder");
                for child in children.into_iter().rev() {
                    stack.push((child, folder_id.clone()));
                }
            } else {
                if !self.filter.accepts(&name) {
                    debug!(name = %name, "skipping excluded file");
                    continue;
                }
                let source = resolve_handle(entry.as_ref(), self.poll).await?;
                let is_top_level = parent_id == root_folder_id;
                files.push(FileUploadMetadata::from_source(source, parent_id, is_top_level));
            }
        }

        Ok(files)
    }

    /// Registers one folder with the upload session and returns its id.
    async fn create_folder(&self, parent_id: &str, name: &str) -> Result<String, UploadError> {
        validate_entry_name(name).map_err(|e| UploadError::Enumeration(e.to_string()))?;
        let ids = self
            .api
            .add_files_to_upload(
                self.upload_id,
                vec![NewFileParams::dir(parent_id, name)],
                self.share_id,
            )
            .await
            .map_err(|e| UploadError::Enumeration(format!("creating folder {name}: {e}")))?;
        match ids.as_slice() {
            [id] if !id.is_empty() => Ok(id.clone()),
            _ => Err(UploadError::Enumeration(format!(
                "creating folder {name}: expected one id, got {}",
                ids.len()
            ))),
        }
    }
}

/// Creates the folders implied by the relative paths of selected files,
/// once per distinct directory, parents before children.
pub async fn plan_selection(
    api: &dyn StorageApi,
    mut files: Vec<SelectedFile>,
    root_folder_id: &str,
    filter: &NameFilter,
) -> Result<Vec<FileUploadMetadata>, UploadError> {
    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

    let mut folders: HashMap<String, String> = HashMap::new();
    let mut planned = Vec::with_capacity(files.len());

    for file in files {
        let mut parts = split_relative_path(&file.relative_path)
            .map_err(|e| UploadError::Enumeration(e.to_string()))?;
        let Some(name) = parts.pop() else {
            continue;
        };
        if !filter.accepts(&name) {
            debug!(path = %file.relative_path, "skipping excluded file");
            continue;
        }

        let mut parent_id = root_folder_id.to_string();
        let mut key = String::new();
        for dir in &parts {
            if !key.is_empty() {
                key.push('/');
            }
            key.push_str(dir);
            parent_id = match folders.get(&key) {
                Some(id) => id.clone(),
                None => {
                    let info = match api.create_folder(&parent_id, dir).await {
                        Ok(info) => info,
                        Err(e) => {
                            if !folders.is_empty() {
                                warn!(
                                    folders = ?folders.values().collect::<Vec<_>>(),
                                    error = %e,
                                    "selection abandoned, created folders are left in place"
                                );
                            }
                            return Err(UploadError::Enumeration(format!(
                                "creating folder {key}: {e}"
                            )));
                        }
                    };
                    folders.insert(key.clone(), info.id.clone());
                    info.id
                }
            };
        }

        let is_top_level = parent_id == root_folder_id;
        planned.push(FileUploadMetadata::from_source(file.source, parent_id, is_top_level));
    }

    Ok(planned)
}
