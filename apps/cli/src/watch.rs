//! `strato watch`.

use tokio_util::sync::CancellationToken;
use tracing::info;

use strato_sync::{PushClient, SyncConsumer};

/// Follows push events for `folder` until Ctrl-C.
pub async fn run(url: String, folder: String) -> anyhow::Result<()> {
    let consumer = SyncConsumer::shared();
    consumer.set_active_folder(folder.as_str(), Vec::new());
    consumer.set_remote_callback(Box::new(|remote| {
        info!(tower = %remote.tower_id, online = remote.online, "remote connection changed");
    }));

    let client = PushClient::new(url, consumer.clone()).subscribe_folder(folder.as_str());
    let cancel = CancellationToken::new();

    let reporter = {
        let consumer = consumer.clone();
        let mut changes = consumer.subscribe();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    changed = changes.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let (files, revision) = consumer.listing(|l| (l.len(), l.revision()));
                        info!(folder = %folder, files, revision, "listing changed");
                    }
                }
            }
        })
    };

    let stopper = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("stopping");
            }
            cancel.cancel();
        })
    };

    client.run(cancel).await;
    stopper.abort();
    let _ = reporter.await;
    Ok(())
}
