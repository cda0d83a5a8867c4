//! WebSocket read pump: feeds incoming push events to the consumer.

use futures_util::StreamExt;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use strato_protocol::envelope::WsMessage;

use crate::consumer::SyncConsumer;
use crate::types::WS_MAX_MESSAGE_SIZE;

/// Why the read pump stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpExit {
    /// The caller asked to stop.
    Cancelled,
    /// The server closed the stream or it failed.
    Closed,
}

/// Reads frames until the stream ends, fails, or `cancel` fires.
pub(crate) async fn read_pump<S>(
    mut read: S,
    consumer: &SyncConsumer,
    cancel: &CancellationToken,
) -> PumpExit
where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return PumpExit::Cancelled,

            msg = read.next() => {
                match msg {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        handle_text_message(&text, consumer);
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        debug!(?frame, "received close frame");
                        return PumpExit::Closed;
                    }
                    Some(Ok(_)) => {} // Ping, pong, binary
                    Some(Err(e)) => {
                        warn!("WebSocket read error: {e}");
                        return PumpExit::Closed;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        return PumpExit::Closed;
                    }
                }
            }
        }
    }
}

fn handle_text_message(text: &str, consumer: &SyncConsumer) {
    if text.len() > WS_MAX_MESSAGE_SIZE {
        warn!("message too large ({} bytes), dropping", text.len());
        return;
    }

    let msg: WsMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            warn!("failed to parse push event: {e}");
            return;
        }
    };
    trace!(event = ?msg.event_tag, key = %msg.subscribe_key, "received push event");
    consumer.handle_message(&msg);
}
