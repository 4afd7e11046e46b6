//! Listing views over the flat namespace
//!
//! The directory stores names only; "folders" exist implicitly as shared
//! name prefixes. [`Entry`] derives the directory-style view a file browser
//! or CLI wants, while [`EntryInfo`] is the plain per-stream metadata.

use crate::directory::DirEntry;
use crate::validation::{base_name, parent, DELIMITER};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Metadata of one stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryInfo {
    pub name: String,

    /// Logical length in bytes
    pub length: u64,

    /// Blocks backing the stream
    pub blocks: u64,

    /// Creation timestamp (Unix epoch seconds)
    pub created_at: i64,

    /// Last modification timestamp (Unix epoch seconds)
    pub modified_at: i64,

    pub flags: u32,
}

impl EntryInfo {
    pub(crate) fn from_entry(name: &str, entry: &DirEntry) -> Self {
        EntryInfo {
            name: name.to_string(),
            length: entry.length,
            blocks: entry.chain.len() as u64,
            created_at: entry.created_at,
            modified_at: entry.modified_at,
            flags: entry.flags,
        }
    }

    pub fn created(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.created_at, 0)
    }

    pub fn modified(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.modified_at, 0)
    }
}

/// A stream or an implied directory directly below some parent
///
/// A name can be both: with streams `"a"` and `"a/b"`, listing the root
/// yields a stream entry `"a"` and a directory entry `"a"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Full name in the archive (e.g., "styles/theme1")
    pub path: String,

    /// Last segment (e.g., "theme1")
    pub name: String,

    /// Parent path, empty for top-level entries
    pub parent: String,

    /// True if this is an implied directory
    pub is_dir: bool,

    /// Stream length in bytes (None for directories)
    pub size: Option<u64>,

    /// Last modification timestamp (None for directories)
    pub modified: Option<i64>,

    /// Stream flags (None for directories)
    pub flags: Option<u32>,
}

impl Entry {
    fn stream(path: &str, entry: &DirEntry) -> Self {
        Entry {
            path: path.to_string(),
            name: base_name(path).to_string(),
            parent: parent(path).unwrap_or_default().to_string(),
            is_dir: false,
            size: Some(entry.length),
            modified: Some(entry.modified_at),
            flags: Some(entry.flags),
        }
    }

    fn directory(path: String) -> Self {
        Entry {
            name: base_name(&path).to_string(),
            parent: parent(&path).unwrap_or_default().to_string(),
            path,
            is_dir: true,
            size: None,
            modified: None,
            flags: None,
        }
    }
}

/// Prefix that every descendant of `parent` starts with
pub(crate) fn child_prefix(parent: &str) -> String {
    let trimmed = parent.trim_end_matches(DELIMITER);
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}{}", trimmed, DELIMITER)
    }
}

/// Build the immediate children of `prefix` from its descendants
///
/// `descendants` must all start with `prefix` (as produced by a prefix
/// scan). Directories sort first, then everything by name.
pub(crate) fn children<'a, I>(prefix: &str, descendants: I) -> Vec<Entry>
where
    I: IntoIterator<Item = (&'a str, &'a DirEntry)>,
{
    let mut entries = Vec::new();
    let mut seen_dirs: BTreeSet<&str> = BTreeSet::new();

    for (path, entry) in descendants {
        let rest = &path[prefix.len()..];
        match rest.find(DELIMITER) {
            None => entries.push(Entry::stream(path, entry)),
            Some(idx) => {
                let dir = &path[..prefix.len() + idx];
                if seen_dirs.insert(dir) {
                    entries.push(Entry::directory(dir.to_string()));
                }
            }
        }
    }

    entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(entries: &[Entry]) -> Vec<(&str, bool)> {
        entries.iter().map(|e| (e.path.as_str(), e.is_dir)).collect()
    }

    #[test]
    fn test_child_prefix() {
        assert_eq!(child_prefix(""), "");
        assert_eq!(child_prefix("/"), "");
        assert_eq!(child_prefix("a/b"), "a/b/");
        assert_eq!(child_prefix("a/b/"), "a/b/");
    }

    #[test]
    fn test_children_with_implied_directories() {
        let entry = DirEntry::new();
        let all = [
            ("a", &entry),
            ("a/b", &entry),
            ("a/c/d", &entry),
            ("a/c/e", &entry),
            ("z", &entry),
        ];

        let root = children("", all.iter().copied());
        assert_eq!(names(&root), vec![("a", true), ("a", false), ("z", false)]);

        let under_a = children("a/", all[1..4].iter().copied());
        assert_eq!(names(&under_a), vec![("a/c", true), ("a/b", false)]);
        assert_eq!(under_a[0].name, "c");
        assert_eq!(under_a[0].parent, "a");
        assert_eq!(under_a[1].size, Some(0));
    }

    #[test]
    fn test_entry_info_timestamps() {
        let mut entry = DirEntry::new();
        entry.created_at = 0;
        entry.modified_at = 86_400;

        let info = EntryInfo::from_entry("x", &entry);
        assert_eq!(info.created().unwrap().timestamp(), 0);
        assert_eq!(info.modified().unwrap().to_rfc3339(), "1970-01-02T00:00:00+00:00");
    }
}
