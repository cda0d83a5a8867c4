//! Local cache of the folder currently on screen.

use std::collections::HashMap;

use strato_protocol::types::FileInfo;

/// Children of the active folder, keyed by file id.
///
/// Every mutation is idempotent: applying the same change twice leaves the
/// cache as after the first application and does not bump the revision.
#[derive(Debug, Default)]
pub struct FileListing {
    active_folder: Option<String>,
    files: HashMap<String, FileInfo>,
    revision: u64,
}

impl FileListing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switches to `folder_id`, replacing the cached children.
    /// Entries that do not belong to the folder are dropped.
    pub fn set_active_folder(&mut self, folder_id: impl Into<String>, children: Vec<FileInfo>) {
        let folder_id = folder_id.into();
        self.files = children
            .into_iter()
            .filter(|f| f.parent_id == folder_id && f.id != folder_id)
            .map(|f| (f.id.clone(), f))
            .collect();
        self.active_folder = Some(folder_id);
        self.revision += 1;
    }

    pub fn active_folder(&self) -> Option<&str> {
        self.active_folder.as_deref()
    }

    /// Inserts or replaces `info`. Returns whether the listing changed.
    pub fn add_file(&mut self, info: FileInfo) -> bool {
        let Some(active) = self.active_folder.as_deref() else {
            return false;
        };
        if info.parent_id != active || info.id == active {
            return false;
        }
        if self.files.get(&info.id) == Some(&info) {
            return false;
        }
        self.files.insert(info.id.clone(), info);
        self.revision += 1;
        true
    }

    /// Removes the given ids, skipping the active folder itself and ids
    /// that are not cached. Returns how many entries were removed.
    pub fn remove_files<'a>(&mut self, ids: impl IntoIterator<Item = &'a str>) -> usize {
        let mut removed = 0;
        for id in ids {
            if self.active_folder.as_deref() == Some(id) {
                continue;
            }
            if self.files.remove(id).is_some() {
                removed += 1;
            }
        }
        if removed > 0 {
            self.revision += 1;
        }
        removed
    }

    pub fn get(&self, id: &str) -> Option<&FileInfo> {
        self.files.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.files.contains_key(id)
    }

    /// Cached children, folders first, then by name.
    pub fn children(&self) -> Vec<&FileInfo> {
        let mut children: Vec<&FileInfo> = self.files.values().collect();
        children.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));
        children
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Bumped on every effective change.
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(id: &str, parent: &str, name: &str) -> FileInfo {
        FileInfo {
            id: id.into(),
            parent_id: parent.into(),
            name: name.into(),
            is_dir: false,
            size: 1,
            portable_path: String::new(),
            modify_timestamp: 0,
        }
    }

    #[test]
    fn add_is_idempotent() {
        let mut listing = FileListing::new();
        listing.set_active_folder("home", Vec::new());
        let rev = listing.revision();

        assert!(listing.add_file(file("f1", "home", "a.txt")));
        assert!(!listing.add_file(file("f1", "home", "a.txt")));
        assert_eq!(listing.len(), 1);
        assert_eq!(listing.revision(), rev + 1);
    }

    #[test]
    fn add_replaces_changed_entry() {
        let mut listing = FileListing::new();
        listing.set_active_folder("home", vec![file("f1", "home", "a.txt")]);

        assert!(listing.add_file(file("f1", "home", "renamed.txt")));
        assert_eq!(listing.len(), 1);
        assert_eq!(listing.get("f1").unwrap().name, "renamed.txt");
    }

    #[test]
    fn add_ignores_other_folders() {
        let mut listing = FileListing::new();
        assert!(!listing.add_file(file("f1", "home", "a.txt")));

        listing.set_active_folder("home", Vec::new());
        assert!(!listing.add_file(file("f2", "elsewhere", "b.txt")));
        assert!(!listing.add_file(file("home", "root", "home")));
        assert!(listing.is_empty());
    }

    #[test]
    fn set_active_folder_filters_children() {
        let mut listing = FileListing::new();
        listing.set_active_folder(
            "home",
            vec![file("f1", "home", "a"), file("f2", "other", "b")],
        );
        assert_eq!(listing.active_folder(), Some("home"));
        assert!(listing.contains("f1"));
        assert!(!listing.contains("f2"));
    }

    #[test]
    fn remove_skips_active_folder_and_unknown_ids() {
        let mut listing = FileListing::new();
        listing.set_active_folder("home", vec![file("f1", "home", "a"), file("f2", "home", "b")]);
        let rev = listing.revision();

        assert_eq!(listing.remove_files(["home", "missing"]), 0);
        assert_eq!(listing.revision(), rev);

        assert_eq!(listing.remove_files(["f1", "f1"]), 1);
        assert_eq!(listing.len(), 1);
        assert_eq!(listing.active_folder(), Some("home"));
    }

    #[test]
    fn children_list_folders_first() {
        let mut dir = file("d1", "home", "zeta");
        dir.is_dir = true;
        let mut listing = FileListing::new();
        listing.set_active_folder(
            "home",
            vec![file("f1", "home", "b"), file("f2", "home", "a"), dir],
        );

        let names: Vec<&str> = listing.children().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "a", "b"]);
    }
}
