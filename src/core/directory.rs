//! Stream directory
//!
//! Maps stream names to their metadata in byte-wise lexicographic order.
//! The order is what makes prefix listing a single range scan, and it is
//! also the order records are persisted in.

use crate::chain::BlockChain;
use crate::error::{ArchiveError, Result};
use crate::prefix::PrefixScan;
use crate::validation::validate_name;
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Range;
use std::collections::BTreeMap;
use std::ops::Bound;

/// Metadata for one stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Blocks holding the stream's bytes
    pub chain: BlockChain,

    /// Logical length in bytes
    pub length: u64,

    /// Creation timestamp (Unix epoch seconds)
    pub created_at: i64,

    /// Last modification timestamp (Unix epoch seconds)
    pub modified_at: i64,

    /// Caller-defined flags, stored but never interpreted
    pub flags: u32,

    /// Session-local identity; changes when a name is deleted and recreated
    pub(crate) id: u64,
}

impl DirEntry {
    /// A new, empty entry stamped with the current time
    pub fn new() -> Self {
        let now = chrono::Utc::now().timestamp();
        DirEntry {
            chain: BlockChain::new(),
            length: 0,
            created_at: now,
            modified_at: now,
            flags: 0,
            id: 0,
        }
    }

    pub fn touch(&mut self) {
        self.modified_at = chrono::Utc::now().timestamp();
    }
}

impl Default for DirEntry {
    fn default() -> Self {
        Self::new()
    }
}

/// Persisted form of one entry
#[derive(Debug, Serialize, Deserialize)]
struct Record {
    name: String,
    blocks: Vec<u64>,
    length: u64,
    created_at: i64,
    modified_at: i64,
    flags: u32,
}

#[derive(Debug, Clone, Default)]
pub struct Directory {
    entries: BTreeMap<String, DirEntry>,
    next_id: u64,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry, assigning it a fresh identity
    pub fn insert(&mut self, name: &str, mut entry: DirEntry) -> Result<u64> {
        if self.entries.contains_key(name) {
            return Err(ArchiveError::DuplicateName(name.to_string()));
        }

        self.next_id += 1;
        entry.id = self.next_id;
        self.entries.insert(name.to_string(), entry);
        Ok(self.next_id)
    }

    pub fn remove(&mut self, name: &str) -> Result<DirEntry> {
        self.entries
            .remove(name)
            .ok_or_else(|| ArchiveError::NotFound(name.to_string()))
    }

    pub fn lookup(&self, name: &str) -> Option<&DirEntry> {
        self.entries.get(name)
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut DirEntry> {
        self.entries.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &DirEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Names starting with `prefix`, as a restartable lazy sequence
    pub fn with_prefix<'d>(&'d self, prefix: &str) -> Prefixed<'d> {
        Prefixed {
            entries: &self.entries,
            prefix: prefix.to_string(),
        }
    }

    /// Encode every entry as a bincode record sequence
    pub fn encode(&self) -> Result<Vec<u8>> {
        let records: Vec<Record> = self
            .entries
            .iter()
            .map(|(name, entry)| Record {
                name: name.clone(),
                blocks: entry.chain.blocks().to_vec(),
                length: entry.length,
                created_at: entry.created_at,
                modified_at: entry.modified_at,
                flags: entry.flags,
            })
            .collect();

        bincode::serialize(&records).map_err(|e| {
            ArchiveError::InvariantViolation(format!("failed to encode directory: {}", e))
        })
    }

    /// Decode a record sequence produced by [`encode`](Self::encode)
    ///
    /// Records must be strictly ordered by name; anything else means the
    /// region was not written by this format.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let records: Vec<Record> = bincode::deserialize(bytes).map_err(|e| {
            ArchiveError::CorruptArchive(format!("failed to decode directory: {}", e))
        })?;

        let mut directory = Directory::new();
        let mut previous: Option<String> = None;

        for record in records {
            if previous.as_deref().is_some_and(|p| p >= record.name.as_str()) {
                return Err(ArchiveError::CorruptArchive(format!(
                    "directory records out of order at {:?}",
                    record.name
                )));
            }
            validate_name(&record.name).map_err(|e| {
                ArchiveError::CorruptArchive(format!("invalid stream name in directory: {}", e))
            })?;
            previous = Some(record.name.clone());

            let entry = DirEntry {
                chain: BlockChain::from_blocks(record.blocks),
                length: record.length,
                created_at: record.created_at,
                modified_at: record.modified_at,
                flags: record.flags,
                id: 0,
            };
            directory.insert(&record.name, entry)?;
        }

        Ok(directory)
    }
}

/// Names sharing a prefix
///
/// Holds no cursor of its own: every call to [`iter`](Self::iter) starts a
/// fresh scan from the first matching key.
pub struct Prefixed<'d> {
    entries: &'d BTreeMap<String, DirEntry>,
    prefix: String,
}

impl<'d> Prefixed<'d> {
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn iter(&self) -> PrefixScan<'_, impl Iterator<Item = Result<&'d str>> + '_> {
        let source = self.range().map(|(name, _)| Ok(name.as_str()));
        PrefixScan::new(source, &self.prefix)
    }

    /// Everything from the first key >= prefix onwards
    fn range(&self) -> Range<'d, String, DirEntry> {
        self.entries
            .range::<str, _>((Bound::Included(self.prefix.as_str()), Bound::Unbounded))
    }

    /// Collect the matching names
    pub fn names(&self) -> Result<Vec<String>> {
        self.iter().map(|name| name.map(str::to_string)).collect()
    }

    /// Collect the matching names with their entries
    pub fn entries(&self) -> Vec<(&'d str, &'d DirEntry)> {
        self.range()
            .take_while(|(name, _)| name.starts_with(self.prefix.as_str()))
            .map(|(name, entry)| (name.as_str(), entry))
            .collect()
    }
}
