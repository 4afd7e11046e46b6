//! Block chains: the physical storage of one stream
//!
//! A chain is the ordered list of blocks holding a stream's bytes. Byte `n`
//! of the stream lives in block `blocks[n / block_size]` at offset
//! `n % block_size`. Capacity is always a whole number of blocks.
//!
//! Every byte inside the capacity but past the stream's logical length is
//! zero. Attaching a block zero-fills it unless the allocator reports it
//! fresh, and truncation clears the tail of the last retained block, so a
//! gap created by seeking past the end reads back as zeros without any
//! extra bookkeeping.

use crate::allocator::FreeListAllocator;
use crate::error::{ArchiveError, Result};
use crate::store::BlockStore;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockChain {
    blocks: Vec<u64>,
}

impl BlockChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_blocks(blocks: Vec<u64>) -> Self {
        BlockChain { blocks }
    }

    pub fn blocks(&self) -> &[u64] {
        &self.blocks
    }

    /// Number of blocks in the chain
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Capacity in bytes
    pub fn capacity(&self, block_size: u32) -> u64 {
        self.blocks.len() as u64 * block_size as u64
    }

    /// Translate a stream offset into (chain position, offset within block)
    pub fn locate(offset: u64, block_size: u32) -> (usize, usize) {
        let bs = block_size as u64;
        ((offset / bs) as usize, (offset % bs) as usize)
    }

    /// Grow the chain until it can hold `bytes` bytes
    ///
    /// New blocks are zero on return. If any allocation or zero-fill fails,
    /// every block attached by this call is released again and the chain is
    /// left as it was.
    pub fn ensure_capacity(
        &mut self,
        bytes: u64,
        allocator: &mut FreeListAllocator,
        store: &mut dyn BlockStore,
    ) -> Result<()> {
        let block_size = store.block_size();
        let needed = bytes.div_ceil(block_size as u64) as usize;
        if needed <= self.blocks.len() {
            return Ok(());
        }

        let original = self.blocks.len();
        let zeros = vec![0u8; block_size as usize];

        while self.blocks.len() < needed {
            let attached = allocator.allocate(store).and_then(|a| {
                if !a.zeroed {
                    if let Err(e) = store.write_block(a.block, &zeros) {
                        allocator.reclaim(&[a.block])?;
                        return Err(e);
                    }
                }
                Ok(a.block)
            });

            match attached {
                Ok(block) => self.blocks.push(block),
                Err(e) => {
                    let added: Vec<u64> = self.blocks.drain(original..).rev().collect();
                    allocator.reclaim(&added)?;
                    return Err(e);
                }
            }
        }

        Ok(())
    }

    /// Shrink the chain to hold exactly `new_len` bytes
    ///
    /// `old_len` is the stream's current logical length. Trailing blocks are
    /// released from the end backwards, and the tail of the last retained
    /// block is zeroed when the cut lands inside it.
    pub fn truncate(
        &mut self,
        new_len: u64,
        old_len: u64,
        allocator: &mut FreeListAllocator,
        store: &mut dyn BlockStore,
    ) -> Result<()> {
        let block_size = store.block_size();
        let keep = new_len.div_ceil(block_size as u64) as usize;

        let released: Vec<u64> = self.blocks.iter().skip(keep).rev().copied().collect();
        allocator.check_releasable(&released)?;

        let (last, offset) = Self::locate(new_len, block_size);
        if offset != 0 && new_len < old_len && last < self.blocks.len() {
            let block = self.blocks[last];
            let mut data = store.read_block(block)?;
            data[offset..].fill(0);
            store.write_block(block, &data)?;
        }

        self.blocks.truncate(keep);
        allocator.free_many(&released)
    }

    /// Release every block; the chain is empty afterwards
    pub fn release(&mut self, allocator: &mut FreeListAllocator) -> Result<()> {
        let released: Vec<u64> = self.blocks.iter().rev().copied().collect();
        allocator.free_many(&released)?;
        self.blocks.clear();
        Ok(())
    }

    /// Write `data` at `offset`, growing the chain as needed
    pub fn write_at(
        &mut self,
        offset: u64,
        data: &[u8],
        allocator: &mut FreeListAllocator,
        store: &mut dyn BlockStore,
    ) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }

        let end = offset
            .checked_add(data.len() as u64)
            .ok_or_else(|| ArchiveError::InvariantViolation("write past u64::MAX".to_string()))?;
        self.ensure_capacity(end, allocator, store)?;

        let block_size = store.block_size() as usize;
        let mut written = 0usize;

        while written < data.len() {
            let (pos, in_block) = Self::locate(offset + written as u64, block_size as u32);
            let chunk = (block_size - in_block).min(data.len() - written);
            let block = self.blocks[pos];

            if chunk == block_size {
                store.write_block(block, &data[written..written + chunk])?;
            } else {
                let mut buffer = store.read_block(block)?;
                buffer[in_block..in_block + chunk].copy_from_slice(&data[written..written + chunk]);
                store.write_block(block, &buffer)?;
            }

            written += chunk;
        }

        Ok(())
    }

    /// Read `len` bytes starting at `offset`
    ///
    /// The range must lie within the capacity; callers clamp to the logical
    /// length first.
    pub fn read_at(&self, offset: u64, len: usize, store: &mut dyn BlockStore) -> Result<Vec<u8>> {
        let block_size = store.block_size();
        let end = offset + len as u64;
        if end > self.capacity(block_size) {
            return Err(ArchiveError::InvariantViolation(format!(
                "read of [{}, {}) beyond chain capacity {}",
                offset,
                end,
                self.capacity(block_size)
            )));
        }

        let mut out = Vec::with_capacity(len);
        while out.len() < len {
            let (pos, in_block) = Self::locate(offset + out.len() as u64, block_size);
            let chunk = (block_size as usize - in_block).min(len - out.len());
            let buffer = store.read_block(self.blocks[pos])?;
            out.extend_from_slice(&buffer[in_block..in_block + chunk]);
        }

        Ok(out)
    }
}
