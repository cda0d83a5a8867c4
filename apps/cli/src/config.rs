//! Configuration file handling.
//!
//! The file is the JSON form of [`UploadConfig`]:
//! - Linux:   `~/.config/strato/config.json`
//! - Windows: `%APPDATA%\strato\config.json`

use std::path::{Path, PathBuf};

use strato_upload::UploadConfig;

use crate::cli::GlobalArgs;

/// Loads the configuration at `path`. A missing file yields defaults; so
/// does an unparseable one, with a warning.
pub fn load(path: &Path) -> anyhow::Result<UploadConfig> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no configuration file, using defaults");
        return Ok(UploadConfig::default());
    }
    let content = std::fs::read_to_string(path)?;
    match serde_json::from_str::<UploadConfig>(&content) {
        Ok(config) => Ok(config),
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to parse configuration, using defaults"
            );
            Ok(UploadConfig::default())
        }
    }
}

/// Writes `config` as pretty JSON, readable by the owner only.
pub fn save(config: &UploadConfig, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(path, &json)?;
    set_permissions_0600(path);
    tracing::debug!(path = %path.display(), "configuration saved");
    Ok(())
}

/// Applies command-line overrides on top of the file contents.
pub fn apply_overrides(config: &mut UploadConfig, args: &GlobalArgs) {
    if let Some(server) = &args.server {
        config.server_url = server.clone();
    }
    if let Some(token) = &args.token {
        config.auth_token = Some(token.clone());
    }
    if let Some(size) = args.chunk_size {
        config.max_chunk_size = size;
        config.min_chunk_size = config.min_chunk_size.min(size);
    }
    if let Some(n) = args.concurrency {
        config.max_concurrent_uploads = n;
    }
}

/// Push channel URL for a server base URL: `http(s)` becomes `ws(s)`.
pub fn push_url(server_url: &str) -> String {
    let base = server_url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    format!("{base}/api/v1/ws")
}

/// The configuration as it should be shown to a user: the token is masked.
pub fn redacted(config: &UploadConfig) -> UploadConfig {
    let mut shown = config.clone();
    if shown.auth_token.is_some() {
        shown.auth_token = Some("********".into());
    }
    shown
}

/// Default configuration file location.
pub fn config_path(override_path: Option<&Path>) -> PathBuf {
    match override_path {
        Some(path) => path.to_path_buf(),
        None => config_base_dir().join("strato").join("config.json"),
    }
}

fn set_permissions_0600(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
}

fn config_base_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home).join(".config")
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata)
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        PathBuf::from("/tmp")
    }
}
