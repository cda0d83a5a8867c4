//! `strato upload`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use tracing::{debug, info, warn};

use strato_protocol::types::{UploadProgress, UploadStatus};
use strato_transfer::{UploadSession, UploadStore};
use strato_upload::{EntrySource, HttpStorageApi, LocalEntry, UploadConfig, UploadOrchestrator};

/// Uploads `paths` into `folder`. Returns the final progress of every session.
pub async fn run(
    config: UploadConfig,
    paths: Vec<PathBuf>,
    folder: String,
) -> anyhow::Result<Vec<UploadProgress>> {
    let api = Arc::new(HttpStorageApi::from_config(&config)?);
    let store = UploadStore::new();
    store.on_change(status_logger());

    let page_size = config.dir_page_size;
    let orchestrator = UploadOrchestrator::new(api, store.clone(), config)?;

    let mut entries: Vec<Box<dyn EntrySource>> = Vec::with_capacity(paths.len());
    for path in &paths {
        let entry = LocalEntry::open(path, page_size)
            .await
            .with_context(|| format!("cannot read {}", path.display()))?;
        entries.push(Box::new(entry));
    }

    let ids = orchestrator.handle_drop(entries, &folder).await;
    info!(sessions = ids.len(), folder = %folder, "uploads queued");

    tokio::select! {
        _ = orchestrator.wait_idle() => {}
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, cancelling uploads");
            for id in &ids {
                if let Err(e) = orchestrator.cancel(id) {
                    debug!(upload = %id, error = %e, "cancel skipped");
                }
            }
            orchestrator.wait_idle().await;
        }
    }

    Ok(ids
        .iter()
        .filter_map(|id| store.get(id))
        .map(|session| session.progress())
        .collect())
}

/// Logs status changes, and progress every tenth of a session.
fn status_logger() -> strato_transfer::ChangeCallback {
    let last: Mutex<HashMap<String, (UploadStatus, u64)>> = Mutex::new(HashMap::new());
    Arc::new(move |session: &UploadSession| {
        let decile = (session.progress_percent() / 10.0) as u64;
        let mut last = last.lock().unwrap();
        let previous = last.insert(session.local_id.clone(), (session.status, decile));
        match previous {
            Some((status, _)) if status != session.status => log_status(session),
            None => log_status(session),
            Some((_, seen)) if seen != decile => info!(
                name = %session.name,
                percent = format_args!("{:.0}", session.progress_percent()),
                speed = format_args!("{:.0} B/s", session.speed_bytes_per_second),
                "uploading"
            ),
            _ => {}
        }
    })
}

fn log_status(session: &UploadSession) {
    match session.status {
        UploadStatus::Failed => warn!(
            name = %session.name,
            error = session.error.as_deref().unwrap_or("unknown"),
            "upload failed"
        ),
        status => info!(name = %session.name, ?status, bytes = session.total_size, "upload status"),
    }
}

/// Prints one line per session; returns whether all of them completed.
pub fn summarize(results: &[UploadProgress]) -> bool {
    let mut ok = true;
    for p in results {
        match p.status {
            UploadStatus::Completed => {
                println!("ok      {} ({} bytes, {} files)", p.name, p.total_size, p.file_count)
            }
            _ => {
                ok = false;
                println!(
                    "failed  {}: {}",
                    p.name,
                    p.error.as_deref().unwrap_or("did not finish")
                );
            }
        }
    }
    ok
}
