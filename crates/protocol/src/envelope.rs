use serde::{Deserialize, Serialize};

use crate::constants::{TaskType, WsEvent};
use crate::messages::FileEventContent;
use crate::types::FileInfo;

/// Envelope for every push message sent by the server.
///
/// `content` stays a loose JSON object; handlers pick the typed view they need
/// through [`WsMessage::parse_content`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsMessage {
    pub event_tag: WsEvent,
    #[serde(default)]
    pub subscribe_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<TaskType>,
    #[serde(default)]
    pub content: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub sent_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constructed_time: Option<i64>,
}

impl WsMessage {
    /// Creates a message with the given tag and content.
    pub fn new<T: Serialize>(
        event_tag: WsEvent,
        subscribe_key: impl Into<String>,
        content: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event_tag,
            subscribe_key: subscribe_key.into(),
            task_type: None,
            content: serde_json::to_value(content)?,
            error: None,
            sent_time: 0,
            constructed_time: None,
        })
    }

    /// Sets the task type (builder style).
    pub fn with_task_type(mut self, task_type: TaskType) -> Self {
        self.task_type = Some(task_type);
        self
    }

    /// Deserializes the content into the given type.
    pub fn parse_content<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.content)
    }

    /// Shortcut for the `fileInfo` carried by file mutation events.
    pub fn file_info(&self) -> Result<FileInfo, serde_json::Error> {
        self.parse_content::<FileEventContent>().map(|c| c.file_info)
    }

    /// Reads a string field out of the content, if present.
    pub fn content_str(&self, key: &str) -> Option<&str> {
        self.content.get(key).and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_file_created() {
        let json = r#"{
            "eventTag": "fileCreated",
            "subscribeKey": "folder-1",
            "content": {"fileInfo": {"id": "f1", "parentID": "folder-1", "name": "a.txt", "size": 3}},
            "sentTime": 1700000000000
        }"#;
        let msg: WsMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.event_tag, WsEvent::FileCreated);
        assert_eq!(msg.subscribe_key, "folder-1");
        let info = msg.file_info().unwrap();
        assert_eq!(info.id, "f1");
        assert_eq!(info.parent_id, "folder-1");
        assert_eq!(info.size, 3);
    }

    #[test]
    fn missing_optional_fields_default() {
        let msg: WsMessage = serde_json::from_str(r#"{"eventTag":"zipComplete"}"#).unwrap();
        assert_eq!(msg.event_tag, WsEvent::ZipComplete);
        assert!(msg.subscribe_key.is_empty());
        assert!(msg.task_type.is_none());
        assert!(msg.error.is_none());
        assert!(msg.content.is_null());
    }

    #[test]
    fn file_info_missing_is_error() {
        let msg = WsMessage::new(WsEvent::FileCreated, "k", &serde_json::json!({})).unwrap();
        assert!(msg.file_info().is_err());
    }

    #[test]
    fn content_str_lookup() {
        let msg = WsMessage::new(
            WsEvent::BackupProgress,
            "k",
            &serde_json::json!({"coreID": "core-1"}),
        )
        .unwrap();
        assert_eq!(msg.content_str("coreID"), Some("core-1"));
        assert_eq!(msg.content_str("missing"), None);
    }

    #[test]
    fn message_omits_empty_optionals() {
        let msg = WsMessage::new(WsEvent::FileDeleted, "k", &serde_json::json!({}))
            .unwrap()
            .with_task_type(TaskType::CreateZip);
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"taskType\":\"create_zip\""));
        assert!(!json.contains("\"error\""));
        assert!(!json.contains("constructedTime"));
    }
}
