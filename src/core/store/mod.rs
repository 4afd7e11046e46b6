//! Fixed-size block I/O
//!
//! A block store is an opaque array of equally sized blocks. It knows nothing
//! about headers, chains or directories; the archive owns every
//! interpretation of the bytes.
//!
//! - [`file`] - Disk-backed store over a single file
//! - [`memory`] - In-memory store for tests and ephemeral archives
//! - [`cache`] - Write-through LRU cache layered over any store

pub mod cache;
pub mod file;
pub mod memory;

pub use cache::{BlockCache, CacheStats};
pub use file::FileBlockStore;
pub use memory::MemoryBlockStore;

use crate::error::{ArchiveError, Result};

/// Raw whole-block storage
///
/// # Invariants
///
/// - `read_block(i)` returns exactly the bytes last written with `write_block(i, ..)`,
///   or zeros if block `i` was never written since it was grown
/// - Buffers are always exactly `block_size()` bytes
/// - Indices at or beyond `block_count()` are rejected
/// - The store grows only through `grow_to` and never shrinks on its own
pub trait BlockStore: Send {
    /// Size of every block in bytes
    fn block_size(&self) -> u32;

    /// Number of blocks currently addressable
    fn block_count(&self) -> u64;

    /// Read one whole block
    fn read_block(&mut self, index: u64) -> Result<Vec<u8>>;

    /// Overwrite one whole block
    fn write_block(&mut self, index: u64, data: &[u8]) -> Result<()>;

    /// Append zero-filled blocks until `new_count` blocks exist
    ///
    /// A no-op when the store already holds at least `new_count` blocks.
    fn grow_to(&mut self, new_count: u64) -> Result<()>;

    /// Make every completed write durable
    fn sync(&mut self) -> Result<()>;
}

impl<S: BlockStore + ?Sized> BlockStore for Box<S> {
    fn block_size(&self) -> u32 {
        (**self).block_size()
    }

    fn block_count(&self) -> u64 {
        (**self).block_count()
    }

    fn read_block(&mut self, index: u64) -> Result<Vec<u8>> {
        (**self).read_block(index)
    }

    fn write_block(&mut self, index: u64, data: &[u8]) -> Result<()> {
        (**self).write_block(index, data)
    }

    fn grow_to(&mut self, new_count: u64) -> Result<()> {
        (**self).grow_to(new_count)
    }

    fn sync(&mut self) -> Result<()> {
        (**self).sync()
    }
}

pub(crate) fn check_index(index: u64, block_count: u64) -> Result<()> {
    if index >= block_count {
        return Err(ArchiveError::InvariantViolation(format!(
            "block {} out of range ({} blocks)",
            index, block_count
        )));
    }
    Ok(())
}

pub(crate) fn check_len(len: usize, block_size: u32) -> Result<()> {
    if len != block_size as usize {
        return Err(ArchiveError::InvariantViolation(format!(
            "block data must be exactly {} bytes, got {}",
            block_size, len
        )));
    }
    Ok(())
}
