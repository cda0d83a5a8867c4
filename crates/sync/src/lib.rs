//! Remote sync consumer.
//!
//! Keeps the local view of the server in step without polling: a
//! [`PushClient`] holds the WebSocket open and hands every push event to a
//! [`SyncConsumer`], which applies it to the cached [`FileListing`] and the
//! task and backup trackers.

pub mod client;
pub mod consumer;
pub mod error;
pub mod listing;
mod pump;
pub mod tasks;
pub mod types;

pub use client::PushClient;
pub use consumer::{RemoteCallback, SyncConsumer};
pub use error::SyncError;
pub use listing::FileListing;
pub use pump::PumpExit;
pub use tasks::{BackupProgress, BackupTracker, TaskProgress, TaskStage, TaskTracker, TaskUpdate};
pub use types::{ActionMessage, ConnectionState, ReconnectConfig, SubscriptionType, WsAction};
