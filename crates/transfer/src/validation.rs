use std::path::{Component, Path};

use strato_protocol::constants::EXCLUDED_FILE_NAMES;

use crate::TransferError;

/// Splits a relative path such as `photos/2024/a.jpg` into its components.
///
/// Rejects:
/// - Empty paths
/// - Absolute paths (Unix `/` or Windows `C:\`)
/// - Parent directory traversal (`..`)
/// - Windows prefix components (`C:`, `\\server`)
///
/// `.` components are dropped.
pub fn split_relative_path(relative_path: &str) -> Result<Vec<String>, TransferError> {
    if relative_path.is_empty() {
        return Err(TransferError::InvalidName("empty path".into()));
    }

    let path = Path::new(relative_path);
    if path.is_absolute() {
        return Err(TransferError::InvalidName(format!(
            "absolute path not allowed: {relative_path}"
        )));
    }

    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                return Err(TransferError::InvalidName(format!(
                    "parent directory traversal not allowed: {relative_path}"
                )));
            }
            Component::Prefix(_) | Component::RootDir => {
                return Err(TransferError::InvalidName(format!(
                    "absolute path not allowed: {relative_path}"
                )));
            }
            Component::CurDir => {}
            Component::Normal(name) => {
                let name = name.to_string_lossy();
                validate_entry_name(&name)?;
                parts.push(name.into_owned());
            }
        }
    }

    if parts.is_empty() {
        return Err(TransferError::InvalidName(format!(
            "no file name in path: {relative_path}"
        )));
    }
    Ok(parts)
}

/// Checks a single file or folder name before it is sent to the server.
pub fn validate_entry_name(name: &str) -> Result<(), TransferError> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(TransferError::InvalidName(format!("{name:?}")));
    }
    if name.contains(['/', '\\', '\0']) {
        return Err(TransferError::InvalidName(format!(
            "separator in name: {name:?}"
        )));
    }
    Ok(())
}

/// Decides which entries are skipped during enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameFilter {
    excluded: Vec<String>,
    skip_hidden: bool,
}

impl Default for NameFilter {
    fn default() -> Self {
        Self::new(EXCLUDED_FILE_NAMES.iter().map(|s| s.to_string()), true)
    }
}

impl NameFilter {
    pub fn new(excluded: impl IntoIterator<Item = String>, skip_hidden: bool) -> Self {
        Self {
            excluded: excluded.into_iter().collect(),
            skip_hidden,
        }
    }

    /// Whether a file with this name should be uploaded.
    pub fn accepts(&self, name: &str) -> bool {
        if self.excluded.iter().any(|e| e == name) {
            return false;
        }
        !(self.skip_hidden && name.starts_with('.'))
    }

    /// Exclusion list only; folders are never dropped for being hidden.
    pub fn accepts_dir(&self, name: &str) -> bool {
        !self.excluded.iter().any(|e| e == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_nested_path() {
        assert_eq!(
            split_relative_path("photos/2024/a.jpg").unwrap(),
            vec!["photos", "2024", "a.jpg"]
        );
        assert_eq!(split_relative_path("./a.txt").unwrap(), vec!["a.txt"]);
    }

    #[test]
    fn rejects_empty_path() {
        assert!(split_relative_path("").is_err());
        assert!(split_relative_path(".").is_err());
    }

    #[test]
    fn rejects_parent_dir_traversal() {
        assert!(split_relative_path("../../../etc/passwd").is_err());
        assert!(split_relative_path("sub/../../escape").is_err());
    }

    #[test]
    fn rejects_absolute_unix_path() {
        assert!(split_relative_path("/tmp/malicious").is_err());
    }

    #[test]
    fn entry_names() {
        assert!(validate_entry_name("report.pdf").is_ok());
        assert!(validate_entry_name(".hidden").is_ok());
        assert!(validate_entry_name("").is_err());
        assert!(validate_entry_name("..").is_err());
        assert!(validate_entry_name("a/b").is_err());
        assert!(validate_entry_name("a\\b").is_err());
    }

    #[test]
    fn default_filter_skips_metadata_and_hidden() {
        let f = NameFilter::default();
        assert!(f.accepts("a.txt"));
        assert!(!f.accepts(".DS_Store"));
        assert!(!f.accepts(".env"));
        assert!(f.accepts_dir(".git"));
        assert!(!f.accepts_dir(".DS_Store"));
    }

    #[test]
    fn filter_can_keep_hidden_files() {
        let f = NameFilter::new(vec!["Thumbs.db".to_string()], false);
        assert!(f.accepts(".env"));
        assert!(!f.accepts("Thumbs.db"));
    }
}
