//! Free-space allocation
//!
//! Blocks are uniform, so there is no external fragmentation to fight: the
//! allocator is a LIFO stack of reclaimed block indices backed by a
//! membership bitmap. When the stack is empty the store grows by one block.
//!
//! Block 0 holds the header and is never handed out or accepted back.
//!
//! Blocks released while the archive is open are parked on a pending list
//! rather than the free list: the last committed directory may still point
//! at them, so they only become reusable once a commit has replaced it
//! ([`commit_pending`](FreeListAllocator::commit_pending)).

pub mod bitmap;

use crate::error::{ArchiveError, Result};
use crate::store::BlockStore;
use bitmap::FreeBitmap;

/// A block handed out by the allocator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocated {
    pub block: u64,

    /// True when the block was freshly grown and is known to be zero.
    /// Reused blocks still hold whatever their previous owner wrote.
    pub zeroed: bool,
}

/// LIFO free-list allocator
#[derive(Debug, Clone)]
pub struct FreeListAllocator {
    /// Reclaimed blocks; the last element is reused first
    free: Vec<u64>,

    /// Released since the last commit; not handed out until committed
    pending: Vec<u64>,

    /// Which blocks are on `free` or `pending`
    free_map: FreeBitmap,

    /// Blocks known to the allocator (header included)
    total_blocks: u64,
}

impl FreeListAllocator {
    /// Create an allocator over `total_blocks` blocks, all in use
    pub fn new(total_blocks: u64) -> Self {
        FreeListAllocator {
            free: Vec::new(),
            pending: Vec::new(),
            free_map: FreeBitmap::new(total_blocks),
            total_blocks,
        }
    }

    /// Rebuild an allocator from a persisted free list
    ///
    /// The order of `free` is preserved, so reuse order survives a reopen.
    pub fn from_free_list(total_blocks: u64, free: Vec<u64>) -> Result<Self> {
        let mut allocator = FreeListAllocator::new(total_blocks);
        allocator.reclaim(&free)?;
        Ok(allocator)
    }

    /// Hand out one block, reusing the most recently freed one if possible
    ///
    /// Pending blocks are never handed out.
    pub fn allocate(&mut self, store: &mut dyn BlockStore) -> Result<Allocated> {
        if let Some(block) = self.free.pop() {
            self.free_map.set_used(block);
            return Ok(Allocated {
                block,
                zeroed: false,
            });
        }

        let block = self.total_blocks;
        // Blocks past our count may exist already (left by an interrupted
        // flush); those are not guaranteed to be zero.
        let zeroed = store.block_count() <= block;
        store.grow_to(block + 1)?;
        self.extend_to(block + 1);

        Ok(Allocated { block, zeroed })
    }

    /// Hand out `count` blocks, or none at all
    pub fn allocate_many(
        &mut self,
        count: usize,
        store: &mut dyn BlockStore,
    ) -> Result<Vec<Allocated>> {
        let mut allocated = Vec::with_capacity(count);

        for _ in 0..count {
            match self.allocate(store) {
                Ok(a) => allocated.push(a),
                Err(e) => {
                    // Rollback allocations
                    let blocks: Vec<u64> = allocated.iter().rev().map(|a| a.block).collect();
                    self.reclaim(&blocks)?;
                    return Err(e);
                }
            }
        }

        Ok(allocated)
    }

    /// Release one block; it becomes reusable at the next commit
    pub fn free(&mut self, block: u64) -> Result<()> {
        self.free_many(&[block])
    }

    /// Release blocks that the last commit may still reference
    ///
    /// They go on the pending list and stay there until
    /// [`commit_pending`](Self::commit_pending). Every index is validated
    /// before anything is released.
    pub fn free_many(&mut self, blocks: &[u64]) -> Result<()> {
        self.check_releasable(blocks)?;

        for &block in blocks {
            self.free_map.set_free(block);
            self.pending.push(block);
        }

        Ok(())
    }

    /// Return blocks that no commit references straight to the free list
    ///
    /// The last one in `blocks` is reused first.
    pub fn reclaim(&mut self, blocks: &[u64]) -> Result<()> {
        self.check_releasable(blocks)?;

        for &block in blocks {
            self.free_map.set_free(block);
            self.free.push(block);
        }

        Ok(())
    }

    /// Make every pending block reusable
    ///
    /// Called once a commit that no longer references them is durable.
    pub fn commit_pending(&mut self) {
        self.free.append(&mut self.pending);
    }

    /// Check that every block could be freed right now
    ///
    /// Rejects the header block, out-of-range indices, blocks already free,
    /// and duplicates within `blocks`.
    pub fn check_releasable(&self, blocks: &[u64]) -> Result<()> {
        let mut seen = FreeBitmap::new(0);

        for &block in blocks {
            if block == 0 {
                return Err(ArchiveError::InvariantViolation(
                    "attempt to free the header block".to_string(),
                ));
            }
            if block >= self.total_blocks {
                return Err(ArchiveError::InvariantViolation(format!(
                    "attempt to free block {} beyond the archive ({} blocks)",
                    block, self.total_blocks
                )));
            }
            if self.free_map.is_free(block) {
                return Err(ArchiveError::InvariantViolation(format!(
                    "double free of block {}",
                    block
                )));
            }

            seen.extend_capacity(block + 1);
            if seen.is_free(block) {
                return Err(ArchiveError::InvariantViolation(format!(
                    "block {} released twice in one batch",
                    block
                )));
            }
            seen.set_free(block);
        }

        Ok(())
    }

    /// Account for blocks appended to the store outside of `allocate`
    ///
    /// The new blocks are in use; release them with [`reclaim`](Self::reclaim)
    /// if nothing owns them.
    pub fn extend_to(&mut self, new_total_blocks: u64) {
        if new_total_blocks > self.total_blocks {
            self.total_blocks = new_total_blocks;
            self.free_map.extend_capacity(new_total_blocks);
        }
    }

    pub fn is_free(&self, block: u64) -> bool {
        self.free_map.is_free(block)
    }

    /// Free blocks, pending ones included
    pub fn free_count(&self) -> u64 {
        (self.free.len() + self.pending.len()) as u64
    }

    pub fn total_blocks(&self) -> u64 {
        self.total_blocks
    }

    /// Reusable blocks in reuse order (last = next to be handed out)
    pub fn free_list(&self) -> &[u64] {
        &self.free
    }

    /// Blocks released since the last commit, in release order
    pub fn pending(&self) -> &[u64] {
        &self.pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBlockStore;

    fn setup() -> (FreeListAllocator, MemoryBlockStore) {
        let mut store = MemoryBlockStore::new(512);
        store.grow_to(1).unwrap();
        (FreeListAllocator::new(1), store)
    }

    #[test]
    fn test_grows_when_empty() {
        let (mut alloc, mut store) = setup();

        let a = alloc.allocate(&mut store).unwrap();
        let b = alloc.allocate(&mut store).unwrap();

        assert_eq!(a, Allocated { block: 1, zeroed: true });
        assert_eq!(b.block, 2);
        assert_eq!(store.block_count(), 3);
        assert_eq!(alloc.total_blocks(), 3);
        assert_eq!(alloc.free_count(), 0);
    }

    #[test]
    fn test_lifo_reuse() {
        let (mut alloc, mut store) = setup();
        for _ in 0..4 {
            alloc.allocate(&mut store).unwrap();
        }

        alloc.free(2).unwrap();
        alloc.free(4).unwrap();
        alloc.commit_pending();
        assert_eq!(alloc.free_count(), 2);

        let next = alloc.allocate(&mut store).unwrap();
        assert_eq!(next, Allocated { block: 4, zeroed: false });
        assert_eq!(alloc.allocate(&mut store).unwrap().block, 2);

        // Free list drained; store grows again
        assert_eq!(alloc.allocate(&mut store).unwrap().block, 5);
    }

    #[test]
    fn test_double_free_is_invariant_violation() {
        let (mut alloc, mut store) = setup();
        let a = alloc.allocate(&mut store).unwrap();

        alloc.free(a.block).unwrap();
        assert!(matches!(
            alloc.free(a.block),
            Err(ArchiveError::InvariantViolation(_))
        ));
        assert_eq!(alloc.free_count(), 1);
    }

    #[test]
    fn test_rejects_header_and_out_of_range() {
        let (mut alloc, _) = setup();

        assert!(matches!(
            alloc.free(0),
            Err(ArchiveError::InvariantViolation(_))
        ));
        assert!(matches!(
            alloc.free(99),
            Err(ArchiveError::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_batch_free_is_all_or_nothing() {
        let (mut alloc, mut store) = setup();
        alloc.allocate_many(3, &mut store).unwrap();

        // Duplicate inside the batch: nothing released
        assert!(alloc.free_many(&[1, 2, 1]).is_err());
        assert_eq!(alloc.free_count(), 0);
        assert!(!alloc.is_free(1));

        alloc.free_many(&[1, 2, 3]).unwrap();
        assert_eq!(alloc.pending(), &[1, 2, 3]);
        assert!(alloc.free_list().is_empty());
    }

    #[test]
    fn test_released_blocks_wait_for_commit() {
        let (mut alloc, mut store) = setup();
        alloc.allocate_many(2, &mut store).unwrap();

        alloc.free(1).unwrap();
        assert!(alloc.is_free(1));
        assert_eq!(alloc.free_count(), 1);

        // Still pending: the store grows instead of reusing block 1
        assert_eq!(alloc.allocate(&mut store).unwrap().block, 3);
        assert!(matches!(
            alloc.free(1),
            Err(ArchiveError::InvariantViolation(_))
        ));

        alloc.commit_pending();
        assert!(alloc.pending().is_empty());
        assert_eq!(alloc.free_list(), &[1]);
        assert_eq!(
            alloc.allocate(&mut store).unwrap(),
            Allocated { block: 1, zeroed: false }
        );
    }

    #[test]
    fn test_reclaimed_blocks_are_reusable_at_once() {
        let mut store = MemoryBlockStore::new(512);
        store.grow_to(4).unwrap();
        let mut alloc = FreeListAllocator::new(1);
        alloc.extend_to(4);

        alloc.reclaim(&[3, 2, 1]).unwrap();
        assert_eq!(alloc.allocate(&mut store).unwrap().block, 1);
        assert!(alloc.reclaim(&[2]).is_err());
    }

    #[test]
    fn test_from_free_list_preserves_order() {
        let alloc = FreeListAllocator::from_free_list(10, vec![7, 3, 5]).unwrap();
        assert_eq!(alloc.free_list(), &[7, 3, 5]);
        assert!(alloc.is_free(3));
        assert!(!alloc.is_free(4));

        assert!(FreeListAllocator::from_free_list(10, vec![3, 3]).is_err());
        assert!(FreeListAllocator::from_free_list(10, vec![0]).is_err());
        assert!(FreeListAllocator::from_free_list(10, vec![10]).is_err());
    }

    #[test]
    fn test_orphan_blocks_are_not_zeroed() {
        let mut store = MemoryBlockStore::new(512);
        store.grow_to(3).unwrap();
        let mut alloc = FreeListAllocator::new(1);

        let a = alloc.allocate(&mut store).unwrap();
        assert_eq!(a, Allocated { block: 1, zeroed: false });
        assert_eq!(store.block_count(), 3);
    }
}
