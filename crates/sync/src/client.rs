//! Push-event client with automatic reconnection.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::watch;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::consumer::SyncConsumer;
use crate::error::SyncError;
use crate::pump::{PumpExit, read_pump};
use crate::types::{ActionMessage, ConnectionState, ReconnectConfig, WS_MAX_MESSAGE_SIZE};

/// Keeps a WebSocket to the server open and feeds every push event to a
/// [`SyncConsumer`]. Lost connections are retried with exponential backoff
/// until the cancellation token fires.
pub struct PushClient {
    url: String,
    consumer: Arc<SyncConsumer>,
    reconnect: ReconnectConfig,
    subscriptions: Vec<String>,
    state: watch::Sender<ConnectionState>,
}

impl PushClient {
    pub fn new(url: impl Into<String>, consumer: Arc<SyncConsumer>) -> Self {
        Self {
            url: url.into(),
            consumer,
            reconnect: ReconnectConfig::default(),
            subscriptions: Vec::new(),
            state: watch::channel(ConnectionState::Disconnected).0,
        }
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Subscribes to `folder_id` on every (re)connect.
    pub fn subscribe_folder(mut self, folder_id: impl Into<String>) -> Self {
        self.subscriptions.push(folder_id.into());
        self
    }

    pub fn consumer(&self) -> &Arc<SyncConsumer> {
        &self.consumer
    }

    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Runs until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut attempt: u32 = 0;

        loop {
            self.state.send_replace(ConnectionState::Connecting);
            match self.session(&cancel).await {
                Ok(PumpExit::Cancelled) => break,
                Ok(PumpExit::Closed) => {
                    info!(url = %self.url, "push channel closed");
                    attempt = 0;
                }
                Err(e) => {
                    warn!(url = %self.url, attempt, error = %e, "push connection failed");
                }
            }

            attempt = attempt.saturating_add(1);
            let delay = self.reconnect.delay_for_attempt(attempt);
            self.state
                .send_replace(ConnectionState::Reconnecting { attempt });
            info!(
                url = %self.url,
                attempt,
                delay_secs = format_args!("{:.1}", delay.as_secs_f64()),
                "reconnecting"
            );

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        debug!(url = %self.url, "push client stopped");
        self.state.send_replace(ConnectionState::Disconnected);
    }

    /// One connection: connect, subscribe, pump until closed or cancelled.
    async fn session(&self, cancel: &CancellationToken) -> Result<PumpExit, SyncError> {
        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
        ws_config.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);

        let connect =
            tokio_tungstenite::connect_async_with_config(self.url.as_str(), Some(ws_config), false);
        let (ws_stream, _) = tokio::select! {
            _ = cancel.cancelled() => return Ok(PumpExit::Cancelled),
            result = connect => result?,
        };
        let (mut write, read) = ws_stream.split();

        for folder_id in &self.subscriptions {
            let action = ActionMessage::subscribe_folder(folder_id.as_str());
            let frame = serde_json::to_string(&action)?;
            write.send(tungstenite::Message::Text(frame.into())).await?;
        }

        self.state.send_replace(ConnectionState::Connected);
        info!(url = %self.url, subscriptions = self.subscriptions.len(), "push channel connected");

        let exit = read_pump(read, &self.consumer, cancel).await;
        if exit == PumpExit::Cancelled {
            let _ = write.send(tungstenite::Message::Close(None)).await;
        }
        Ok(exit)
    }
}
