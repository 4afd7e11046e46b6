//! Write-through LRU block cache
//!
//! Sits between the archive and its backing store. Reads are served from
//! memory when possible; writes go to the store first and then refresh the
//! cached copy, so the store is never behind the cache.

use super::BlockStore;
use crate::error::Result;
use lru::LruCache;
use std::num::NonZeroUsize;

/// Block cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Total cache hits
    pub hits: u64,
    /// Total cache misses
    pub misses: u64,
    /// Blocks currently cached
    pub cached_blocks: usize,
    /// Maximum number of cached blocks (0 = disabled)
    pub capacity: usize,
}

impl CacheStats {
    /// Hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// A block store wrapped with an optional LRU cache
pub struct BlockCache {
    inner: Box<dyn BlockStore>,
    cache: Option<LruCache<u64, Vec<u8>>>,
    hits: u64,
    misses: u64,
}

impl BlockCache {
    /// Wrap `inner`, caching up to `capacity` blocks (0 disables caching)
    pub fn new(inner: Box<dyn BlockStore>, capacity: usize) -> Self {
        BlockCache {
            inner,
            cache: NonZeroUsize::new(capacity).map(LruCache::new),
            hits: 0,
            misses: 0,
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            cached_blocks: self.cache.as_ref().map_or(0, |c| c.len()),
            capacity: self.cache.as_ref().map_or(0, |c| c.cap().get()),
        }
    }

    /// Drop every cached block
    pub fn clear(&mut self) {
        if let Some(cache) = self.cache.as_mut() {
            cache.clear();
        }
    }
}

impl BlockStore for BlockCache {
    fn block_size(&self) -> u32 {
        self.inner.block_size()
    }

    fn block_count(&self) -> u64 {
        self.inner.block_count()
    }

    fn read_block(&mut self, index: u64) -> Result<Vec<u8>> {
        let Some(cache) = self.cache.as_mut() else {
            return self.inner.read_block(index);
        };

        if let Some(data) = cache.get(&index) {
            self.hits += 1;
            return Ok(data.clone());
        }

        self.misses += 1;
        let data = self.inner.read_block(index)?;
        cache.put(index, data.clone());
        Ok(data)
    }

    fn write_block(&mut self, index: u64, data: &[u8]) -> Result<()> {
        if let Err(e) = self.inner.write_block(index, data) {
            // The on-disk contents are unknown now; never serve a stale copy.
            if let Some(cache) = self.cache.as_mut() {
                cache.pop(&index);
            }
            return Err(e);
        }

        if let Some(cache) = self.cache.as_mut() {
            cache.put(index, data.to_vec());
        }
        Ok(())
    }

    fn grow_to(&mut self, new_count: u64) -> Result<()> {
        self.inner.grow_to(new_count)
    }

    fn sync(&mut self) -> Result<()> {
        self.inner.sync()
    }
}
