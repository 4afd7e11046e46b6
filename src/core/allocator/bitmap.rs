//! Membership bitmap for free blocks
//!
//! Each bit represents one block:
//! - 0 = in use (or reserved)
//! - 1 = on the free list
//!
//! The free list itself keeps reuse order; this bitmap only answers "is block
//! N free?" in O(1), which is what double-free detection and structural
//! verification need.

#[derive(Debug, Clone, Default)]
pub struct FreeBitmap {
    /// Bitmap words (each word = 64 bits = 64 blocks)
    words: Vec<u64>,

    /// Total number of blocks tracked
    total_blocks: u64,
}

impl FreeBitmap {
    /// Create a bitmap tracking `total_blocks` blocks, all in use
    pub fn new(total_blocks: u64) -> Self {
        FreeBitmap {
            words: vec![0u64; words_for(total_blocks)],
            total_blocks,
        }
    }

    pub fn total_blocks(&self) -> u64 {
        self.total_blocks
    }

    /// Check if a block is marked free; out-of-range blocks are never free
    pub fn is_free(&self, block_id: u64) -> bool {
        if block_id >= self.total_blocks {
            return false;
        }

        let (word_idx, bit_idx) = locate(block_id);
        (self.words[word_idx] & (1u64 << bit_idx)) != 0
    }

    /// Mark a block free. Caller checks the range.
    pub fn set_free(&mut self, block_id: u64) {
        let (word_idx, bit_idx) = locate(block_id);
        self.words[word_idx] |= 1u64 << bit_idx;
    }

    /// Mark a block in use. Caller checks the range.
    pub fn set_used(&mut self, block_id: u64) {
        let (word_idx, bit_idx) = locate(block_id);
        self.words[word_idx] &= !(1u64 << bit_idx);
    }

    /// Number of blocks currently marked free
    #[cfg(test)]
    pub fn count_free(&self) -> u64 {
        self.words.iter().map(|w| w.count_ones() as u64).sum()
    }

    /// Extend bitmap capacity to track more blocks
    ///
    /// New blocks start out in use.
    pub fn extend_capacity(&mut self, new_total_blocks: u64) {
        if new_total_blocks <= self.total_blocks {
            return;
        }

        self.words.resize(words_for(new_total_blocks), 0u64);
        self.total_blocks = new_total_blocks;
    }
}

fn words_for(total_blocks: u64) -> usize {
    total_blocks.div_ceil(64) as usize
}

fn locate(block_id: u64) -> (usize, u32) {
    ((block_id / 64) as usize, (block_id % 64) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitmap_creation() {
        let bitmap = FreeBitmap::new(1000);
        assert_eq!(bitmap.total_blocks(), 1000);
        assert_eq!(bitmap.count_free(), 0);
        assert!(!bitmap.is_free(10));
    }

    #[test]
    fn test_set_and_clear() {
        let mut bitmap = FreeBitmap::new(130);

        bitmap.set_free(0);
        bitmap.set_free(64);
        bitmap.set_free(129);
        assert!(bitmap.is_free(64));
        assert!(bitmap.is_free(129));
        assert_eq!(bitmap.count_free(), 3);

        bitmap.set_used(64);
        assert!(!bitmap.is_free(64));
        assert_eq!(bitmap.count_free(), 2);
    }

    #[test]
    fn test_out_of_range_is_never_free() {
        let bitmap = FreeBitmap::new(10);
        assert!(!bitmap.is_free(10));
        assert!(!bitmap.is_free(u64::MAX));
    }

    #[test]
    fn test_extend_capacity() {
        let mut bitmap = FreeBitmap::new(60);
        bitmap.set_free(59);

        bitmap.extend_capacity(200);
        assert_eq!(bitmap.total_blocks(), 200);
        assert!(bitmap.is_free(59));
        assert!(!bitmap.is_free(150));

        bitmap.set_free(199);
        assert!(bitmap.is_free(199));

        // Shrinking requests are ignored
        bitmap.extend_capacity(10);
        assert_eq!(bitmap.total_blocks(), 200);
    }
}
