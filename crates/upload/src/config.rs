//! Upload configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use strato_protocol::constants::{
    DEFAULT_DIR_PAGE_SIZE, DEFAULT_MAX_CHUNK_SIZE, DEFAULT_MAX_CONCURRENT_UPLOADS,
    DEFAULT_MIN_CHUNK_SIZE, EXCLUDED_FILE_NAMES, HANDLE_POLL_ATTEMPTS, HANDLE_POLL_INTERVAL,
    MAX_RETRIES,
};
use strato_transfer::{ChunkPolicy, NameFilter};

use crate::error::UploadError;

const DEFAULT_SERVER_URL: &str = "http://localhost:8080";

/// Settings for the upload pipeline. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UploadConfig {
    pub server_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share_id: Option<String>,
    pub is_public: bool,
    pub max_chunk_size: u64,
    /// Floor for chunk-size halving.
    pub min_chunk_size: u64,
    pub max_concurrent_uploads: usize,
    pub max_retries: u32,
    pub excluded_names: Vec<String>,
    pub skip_hidden_files: bool,
    pub dir_page_size: usize,
    pub handle_poll_attempts: u32,
    /// Milliseconds between handle polls.
    #[serde(rename = "handlePollInterval")]
    pub handle_poll_interval_ms: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.into(),
            auth_token: None,
            share_id: None,
            is_public: false,
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            min_chunk_size: DEFAULT_MIN_CHUNK_SIZE,
            max_concurrent_uploads: DEFAULT_MAX_CONCURRENT_UPLOADS,
            max_retries: MAX_RETRIES,
            excluded_names: EXCLUDED_FILE_NAMES.iter().map(|s| s.to_string()).collect(),
            skip_hidden_files: true,
            dir_page_size: DEFAULT_DIR_PAGE_SIZE,
            handle_poll_attempts: HANDLE_POLL_ATTEMPTS,
            handle_poll_interval_ms: HANDLE_POLL_INTERVAL.as_millis() as u64,
        }
    }
}

impl UploadConfig {
    pub fn validate(&self) -> Result<(), UploadError> {
        if self.max_chunk_size == 0 {
            return Err(UploadError::InvalidConfig("maxChunkSize must be > 0".into()));
        }
        if self.min_chunk_size > self.max_chunk_size {
            return Err(UploadError::InvalidConfig(format!(
                "minChunkSize ({}) exceeds maxChunkSize ({})",
                self.min_chunk_size, self.max_chunk_size
            )));
        }
        if self.max_concurrent_uploads == 0 {
            return Err(UploadError::InvalidConfig(
                "maxConcurrentUploads must be > 0".into(),
            ));
        }
        if self.is_public && self.share_id.as_deref().is_none_or(str::is_empty) {
            return Err(UploadError::InvalidConfig(
                "public uploads need a shareId".into(),
            ));
        }
        Ok(())
    }

    pub fn chunk_policy(&self) -> ChunkPolicy {
        ChunkPolicy::new(self.max_chunk_size, self.min_chunk_size, self.max_retries)
    }

    pub fn name_filter(&self) -> NameFilter {
        NameFilter::new(self.excluded_names.iter().cloned(), self.skip_hidden_files)
    }

    pub fn handle_poll_interval(&self) -> Duration {
        Duration::from_millis(self.handle_poll_interval_ms)
    }

    /// Share id to send with requests; empty ids count as none.
    pub fn share(&self) -> Option<&str> {
        self.share_id.as_deref().filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = UploadConfig::default();
        assert_eq!(c.max_chunk_size, 25_600_000);
        assert_eq!(c.min_chunk_size, 64 * 1024);
        assert_eq!(c.max_concurrent_uploads, 2);
        assert_eq!(c.max_retries, 5);
        assert_eq!(c.excluded_names, vec![".DS_Store"]);
        assert_eq!(c.handle_poll_interval(), Duration::from_millis(10));
        assert!(c.validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let c: UploadConfig =
            serde_json::from_str(r#"{"serverUrl":"https://files.example","maxChunkSize":1024,"minChunkSize":16}"#)
                .unwrap();
        assert_eq!(c.server_url, "https://files.example");
        assert_eq!(c.max_chunk_size, 1024);
        assert_eq!(c.max_concurrent_uploads, 2);
        assert!(c.skip_hidden_files);
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_string(&UploadConfig::default()).unwrap();
        assert!(json.contains("\"maxChunkSize\":25600000"));
        assert!(json.contains("\"handlePollInterval\":10"));
        assert!(!json.contains("authToken"));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let c = UploadConfig {
            max_chunk_size: 0,
            ..Default::default()
        };
        assert!(c.validate().is_err());

        let c = UploadConfig {
            max_chunk_size: 10,
            min_chunk_size: 11,
            ..Default::default()
        };
        assert!(c.validate().is_err());

        let c = UploadConfig {
            max_concurrent_uploads: 0,
            ..Default::default()
        };
        assert!(c.validate().is_err());

        let c = UploadConfig {
            is_public: true,
            share_id: Some(String::new()),
            ..Default::default()
        };
        assert!(matches!(c.validate(), Err(UploadError::InvalidConfig(_))));
    }

    #[test]
    fn policy_and_filter_follow_config() {
        let c = UploadConfig {
            max_chunk_size: 100,
            min_chunk_size: 10,
            skip_hidden_files: false,
            ..Default::default()
        };
        let p = c.chunk_policy();
        assert_eq!(p.max_chunk_size(), 100);
        assert_eq!(p.min_chunk_size(), 10);
        assert!(c.name_filter().accepts(".env"));
        assert!(!c.name_filter().accepts(".DS_Store"));
    }
}
