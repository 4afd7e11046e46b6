//! In-memory block store for testing and ephemeral archives.

use super::{check_index, check_len, BlockStore};
use crate::error::Result;
use parking_lot::RwLock;
use std::sync::Arc;

/// An in-memory block store.
///
/// Clones share the same underlying buffer, so a test can hand one clone to
/// an archive, close it, and reopen the very same bytes through another.
///
/// # Example
///
/// ```rust
/// use compound_rs::store::{BlockStore, MemoryBlockStore};
///
/// let mut store = MemoryBlockStore::new(512);
/// store.grow_to(2).unwrap();
/// store.write_block(1, &[7u8; 512]).unwrap();
/// assert_eq!(store.read_block(1).unwrap()[0], 7);
/// ```
#[derive(Debug, Clone)]
pub struct MemoryBlockStore {
    block_size: u32,
    data: Arc<RwLock<Vec<u8>>>,
}

impl MemoryBlockStore {
    /// Creates a new empty store.
    pub fn new(block_size: u32) -> Self {
        Self::with_data(block_size, Vec::new())
    }

    /// Creates a store over pre-existing bytes.
    ///
    /// A trailing partial block is ignored by `block_count`.
    pub fn with_data(block_size: u32, data: Vec<u8>) -> Self {
        MemoryBlockStore {
            block_size,
            data: Arc::new(RwLock::new(data)),
        }
    }

    /// Returns a copy of the raw bytes.
    pub fn bytes(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    /// Applies `f` to the raw bytes in place.
    ///
    /// Intended for corruption tests.
    pub fn tamper<F: FnOnce(&mut Vec<u8>)>(&self, f: F) {
        f(&mut self.data.write());
    }

    fn range(&self, index: u64) -> std::ops::Range<usize> {
        let start = index as usize * self.block_size as usize;
        start..start + self.block_size as usize
    }
}

impl BlockStore for MemoryBlockStore {
    fn block_size(&self) -> u32 {
        self.block_size
    }

    fn block_count(&self) -> u64 {
        (self.data.read().len() / self.block_size as usize) as u64
    }

    fn read_block(&mut self, index: u64) -> Result<Vec<u8>> {
        check_index(index, self.block_count())?;
        Ok(self.data.read()[self.range(index)].to_vec())
    }

    fn write_block(&mut self, index: u64, data: &[u8]) -> Result<()> {
        check_index(index, self.block_count())?;
        check_len(data.len(), self.block_size)?;
        let range = self.range(index);
        self.data.write()[range].copy_from_slice(data);
        Ok(())
    }

    fn grow_to(&mut self, new_count: u64) -> Result<()> {
        let new_len = new_count as usize * self.block_size as usize;
        let mut data = self.data.write();
        if new_len > data.len() {
            data.resize(new_len, 0);
        }
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ArchiveError;

    #[test]
    fn test_grow_zero_fills() {
        let mut store = MemoryBlockStore::new(512);
        assert_eq!(store.block_count(), 0);

        store.grow_to(4).unwrap();
        assert_eq!(store.block_count(), 4);
        assert!(store.read_block(3).unwrap().iter().all(|&b| b == 0));

        // Never shrinks
        store.grow_to(2).unwrap();
        assert_eq!(store.block_count(), 4);
    }

    #[test]
    fn test_clones_share_bytes() {
        let mut store = MemoryBlockStore::new(512);
        let mut view = store.clone();

        store.grow_to(1).unwrap();
        store.write_block(0, &[9u8; 512]).unwrap();

        assert_eq!(view.block_count(), 1);
        assert_eq!(view.read_block(0).unwrap(), vec![9u8; 512]);
    }

    #[test]
    fn test_rejects_bad_access() {
        let mut store = MemoryBlockStore::new(512);
        store.grow_to(1).unwrap();

        assert!(matches!(
            store.read_block(5),
            Err(ArchiveError::InvariantViolation(_))
        ));
        assert!(matches!(
            store.write_block(0, &[1, 2, 3]),
            Err(ArchiveError::InvariantViolation(_))
        ));
    }
}
