//! Connection types for the push channel.

use std::time::Duration;

use serde::Serialize;

/// Largest text frame accepted from the server.
pub const WS_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// State of the push connection.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    /// Connection lost, waiting before the next attempt.
    Reconnecting { attempt: u32 },
    /// Stopped by the caller.
    Disconnected,
}

/// Configuration for automatic reconnection with exponential backoff.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Initial delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Maximum delay between attempts (backoff cap).
    pub max_delay: Duration,
    /// Multiplier for each subsequent attempt.
    pub backoff_factor: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(15),
            backoff_factor: 2.0,
        }
    }
}

impl ReconnectConfig {
    /// Delay for a 1-based attempt number, with ±25% jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exp);
        let capped = secs.min(self.max_delay.as_secs_f64());
        let jitter = capped * 0.25;
        let offset = (std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos() as f64
            / u32::MAX as f64)
            * 2.0
            - 1.0;
        Duration::from_secs_f64((capped + jitter * offset).max(0.05))
    }
}

/// Client-to-server action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum WsAction {
    Subscribe,
    Unsubscribe,
    CancelTask,
}

/// Subscription scope of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SubscriptionType {
    #[serde(rename = "folderSubscribe")]
    Folder,
    #[serde(rename = "taskSubscribe")]
    Task,
}

/// Outgoing action frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionMessage {
    pub action: WsAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broadcast_type: Option<SubscriptionType>,
    pub subscribe_key: String,
    pub sent_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<serde_json::Value>,
}

impl ActionMessage {
    pub fn subscribe_folder(folder_id: impl Into<String>) -> Self {
        Self {
            action: WsAction::Subscribe,
            broadcast_type: Some(SubscriptionType::Folder),
            subscribe_key: folder_id.into(),
            sent_at: chrono::Utc::now().timestamp_millis(),
            content: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconnect_config_defaults() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_millis(250));
        assert_eq!(config.max_delay, Duration::from_secs(15));
        assert!((config.backoff_factor - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn reconnect_delay_backs_off_and_caps() {
        let config = ReconnectConfig::default();
        let expected_base = [0.25, 0.5, 1.0, 2.0, 4.0, 8.0, 15.0, 15.0];
        for (i, &base) in expected_base.iter().enumerate() {
            let secs = config.delay_for_attempt((i + 1) as u32).as_secs_f64();
            let lo = base * 0.74;
            let hi = base * 1.26;
            assert!(
                secs >= lo && secs <= hi,
                "attempt {}: {secs:.3}s not in [{lo:.3}, {hi:.3}]",
                i + 1
            );
        }
    }

    #[test]
    fn subscribe_frame_shape() {
        let msg = ActionMessage::subscribe_folder("folder-1");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["action"], "subscribe");
        assert_eq!(value["broadcastType"], "folderSubscribe");
        assert_eq!(value["subscribeKey"], "folder-1");
        assert!(value.get("content").is_none());
    }
}
