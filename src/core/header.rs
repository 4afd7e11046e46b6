use crate::error::{ArchiveError, Result};

pub const MAGIC: [u8; 8] = *b"CMPD\x00\x01\x00\x00";
pub const VERSION_MAJOR: u16 = 1;
pub const VERSION_MINOR: u16 = 0;

pub const DEFAULT_BLOCK_SIZE: u32 = 4096;
pub const MIN_BLOCK_SIZE: u32 = 512;
pub const MAX_BLOCK_SIZE: u32 = 64 * 1024;

/// Encoded size of the header fields, including the trailing checksum.
///
/// Always fits in the smallest permitted block.
pub const HEADER_LEN: usize = 76;

/// Check that a block size is a power of two within the supported range.
pub fn validate_block_size(block_size: u32) -> Result<()> {
    if !block_size.is_power_of_two() || !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&block_size) {
        return Err(ArchiveError::InvalidBlockSize(block_size));
    }
    Ok(())
}

/// A contiguous run of blocks holding one persisted metadata structure
///
/// `len` is the encoded byte length; the run spans `ceil(len / block_size)`
/// blocks starting at `start`. An empty region (`len == 0`) owns no blocks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Region {
    /// First block of the run
    pub start: u64,

    /// Encoded length in bytes
    pub len: u64,

    /// CRC32 of the encoded bytes
    pub checksum: u32,
}

impl Region {
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of blocks spanned by this region
    pub fn block_count(&self, block_size: u32) -> u64 {
        self.len.div_ceil(block_size as u64)
    }

    /// Block indices owned by this region, in order
    ///
    /// A run that would pass `u64::MAX` is cut short there;
    /// [`Header::validate`] rejects such regions.
    pub fn blocks(&self, block_size: u32) -> impl Iterator<Item = u64> {
        self.start..self.end(block_size).unwrap_or(u64::MAX)
    }

    /// One past the last block, or `None` if that overflows
    pub fn end(&self, block_size: u32) -> Option<u64> {
        self.start.checked_add(self.block_count(block_size))
    }
}

/// Compound archive header (block 0)
///
/// The header occupies the first block and locates everything else: the
/// block size, how many blocks the committed archive spans, and where the
/// directory and free-list regions of the last commit live.
///
/// ```text
/// offset  size  field
///      0     8  magic "CMPD\0\x01\0\0"
///      8     2  version major
///     10     2  version minor
///     12     4  block size
///     16     8  total blocks
///     24     8  free blocks
///     32    20  directory region (start u64, len u64, crc32 u32)
///     52    20  free-list region (start u64, len u64, crc32 u32)
///     72     4  crc32 of bytes 0..72
/// ```
///
/// All integers are little-endian; the rest of the block is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub magic: [u8; 8],
    pub version_major: u16,
    pub version_minor: u16,
    pub block_size: u32,

    /// Blocks covered by the committed state, header included
    pub total_blocks: u64,

    /// Length of the committed free list
    pub free_blocks: u64,

    pub directory: Region,
    pub free_list: Region,
}

impl Header {
    pub fn new(block_size: u32) -> Self {
        Header {
            magic: MAGIC,
            version_major: VERSION_MAJOR,
            version_minor: VERSION_MINOR,
            block_size,
            total_blocks: 1,
            free_blocks: 0,
            directory: Region::default(),
            free_list: Region::default(),
        }
    }

    /// Validate magic, version and structural bounds
    pub fn validate(&self) -> Result<()> {
        if self.magic != MAGIC {
            return Err(ArchiveError::CorruptArchive(
                "invalid magic number in header".to_string(),
            ));
        }

        // Older minors stay readable; anything newer is refused.
        if self.version_major != VERSION_MAJOR || self.version_minor > VERSION_MINOR {
            return Err(ArchiveError::UnsupportedVersion {
                major: self.version_major,
                minor: self.version_minor,
            });
        }

        validate_block_size(self.block_size).map_err(|_| {
            ArchiveError::CorruptArchive(format!("invalid block size {}", self.block_size))
        })?;

        if self.total_blocks == 0 {
            return Err(ArchiveError::CorruptArchive(
                "header reports zero blocks".to_string(),
            ));
        }

        if self.free_blocks >= self.total_blocks {
            return Err(ArchiveError::CorruptArchive(format!(
                "free blocks ({}) exceed usable blocks ({})",
                self.free_blocks,
                self.total_blocks - 1
            )));
        }

        for (label, region) in [("directory", self.directory), ("free list", self.free_list)] {
            if region.is_empty() {
                continue;
            }
            let end = region.end(self.block_size).ok_or_else(|| {
                ArchiveError::CorruptArchive(format!(
                    "{} region at block {} ({} bytes) overflows the block index",
                    label, region.start, region.len
                ))
            })?;
            if region.start == 0 || end > self.total_blocks {
                return Err(ArchiveError::CorruptArchive(format!(
                    "{} region [{}, {}) lies outside the archive ({} blocks)",
                    label, region.start, end, self.total_blocks
                )));
            }
        }

        Ok(())
    }

    /// Serialize to a full block of `block_size` bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.block_size as usize);

        bytes.extend_from_slice(&self.magic);
        bytes.extend_from_slice(&self.version_major.to_le_bytes());
        bytes.extend_from_slice(&self.version_minor.to_le_bytes());
        bytes.extend_from_slice(&self.block_size.to_le_bytes());
        bytes.extend_from_slice(&self.total_blocks.to_le_bytes());
        bytes.extend_from_slice(&self.free_blocks.to_le_bytes());
        for region in [self.directory, self.free_list] {
            bytes.extend_from_slice(&region.start.to_le_bytes());
            bytes.extend_from_slice(&region.len.to_le_bytes());
            bytes.extend_from_slice(&region.checksum.to_le_bytes());
        }

        let checksum = crc32fast::hash(&bytes);
        bytes.extend_from_slice(&checksum.to_le_bytes());
        debug_assert_eq!(bytes.len(), HEADER_LEN);

        bytes.resize(self.block_size as usize, 0);
        bytes
    }

    /// Deserialize and validate a header
    ///
    /// Only the first [`HEADER_LEN`] bytes are inspected, so this works on a
    /// short prefix read before the block size is known.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(ArchiveError::CorruptArchive(format!(
                "header truncated: {} bytes (expected at least {})",
                bytes.len(),
                HEADER_LEN
            )));
        }

        let mut header = Header::new(0);
        header.magic.copy_from_slice(&bytes[0..8]);
        if header.magic != MAGIC {
            return Err(ArchiveError::CorruptArchive(
                "invalid magic number in header".to_string(),
            ));
        }

        header.version_major = le_u16(bytes, 8);
        header.version_minor = le_u16(bytes, 10);
        if header.version_major != VERSION_MAJOR || header.version_minor > VERSION_MINOR {
            return Err(ArchiveError::UnsupportedVersion {
                major: header.version_major,
                minor: header.version_minor,
            });
        }

        let stored = le_u32(bytes, HEADER_LEN - 4);
        let computed = crc32fast::hash(&bytes[..HEADER_LEN - 4]);
        if stored != computed {
            return Err(ArchiveError::CorruptArchive(format!(
                "header checksum mismatch (stored {:#010x}, computed {:#010x})",
                stored, computed
            )));
        }

        header.block_size = le_u32(bytes, 12);
        header.total_blocks = le_u64(bytes, 16);
        header.free_blocks = le_u64(bytes, 24);
        header.directory = read_region(bytes, 32);
        header.free_list = read_region(bytes, 52);

        header.validate()?;

        Ok(header)
    }
}

fn read_region(bytes: &[u8], offset: usize) -> Region {
    Region {
        start: le_u64(bytes, offset),
        len: le_u64(bytes, offset + 8),
        checksum: le_u32(bytes, offset + 16),
    }
}

fn le_u16(bytes: &[u8], offset: usize) -> u16 {
    let mut buf = [0u8; 2];
    buf.copy_from_slice(&bytes[offset..offset + 2]);
    u16::from_le_bytes(buf)
}

fn le_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(buf)
}

fn le_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Header {
        let mut header = Header::new(DEFAULT_BLOCK_SIZE);
        header.total_blocks = 40;
        header.free_blocks = 7;
        header.directory = Region {
            start: 30,
            len: 5000,
            checksum: 0xdead_beef,
        };
        header.free_list = Region {
            start: 32,
            len: 64,
            checksum: 7,
        };
        header
    }

    #[test]
    fn test_header_creation() {
        let header = Header::new(DEFAULT_BLOCK_SIZE);
        assert_eq!(header.magic, MAGIC);
        assert_eq!(header.version_major, VERSION_MAJOR);
        assert_eq!(header.total_blocks, 1);
        assert!(header.validate().is_ok());
    }

    #[test]
    fn test_header_serialization() {
        let header = sample();
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), DEFAULT_BLOCK_SIZE as usize);
        assert!(bytes[HEADER_LEN..].iter().all(|&b| b == 0));

        let decoded = Header::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(decoded.directory.block_count(DEFAULT_BLOCK_SIZE), 2);
    }

    #[test]
    fn test_invalid_magic() {
        let mut bytes = sample().to_bytes();
        bytes[0] = b'X';
        assert!(matches!(
            Header::from_bytes(&bytes),
            Err(ArchiveError::CorruptArchive(_))
        ));
    }

    #[test]
    fn test_checksum_mismatch() {
        let mut bytes = sample().to_bytes();
        bytes[20] ^= 0xff;
        assert!(matches!(
            Header::from_bytes(&bytes),
            Err(ArchiveError::CorruptArchive(_))
        ));
    }

    #[test]
    fn test_newer_version_rejected() {
        let mut header = sample();
        header.version_minor = VERSION_MINOR + 1;
        let bytes = header.to_bytes();
        assert!(matches!(
            Header::from_bytes(&bytes),
            Err(ArchiveError::UnsupportedVersion { major: 1, .. })
        ));

        let mut header = sample();
        header.version_major = 99;
        assert!(matches!(
            Header::from_bytes(&header.to_bytes()),
            Err(ArchiveError::UnsupportedVersion { major: 99, .. })
        ));
    }

    #[test]
    fn test_truncated_header() {
        let bytes = sample().to_bytes();
        assert!(matches!(
            Header::from_bytes(&bytes[..HEADER_LEN - 1]),
            Err(ArchiveError::CorruptArchive(_))
        ));
    }

    #[test]
    fn test_region_out_of_bounds() {
        let mut header = sample();
        header.directory.start = 39;
        assert!(matches!(
            header.validate(),
            Err(ArchiveError::CorruptArchive(_))
        ));
    }

    #[test]
    fn test_region_end_overflow() {
        let mut header = sample();
        header.directory.start = u64::MAX - 1;
        header.directory.len = 4096 * 2;

        assert_eq!(header.directory.end(DEFAULT_BLOCK_SIZE), None);
        assert!(matches!(
            Header::from_bytes(&header.to_bytes()),
            Err(ArchiveError::CorruptArchive(_))
        ));
    }

    #[test]
    fn test_free_blocks_exceeds_total() {
        let mut header = sample();
        header.free_blocks = 40;
        assert!(matches!(
            header.validate(),
            Err(ArchiveError::CorruptArchive(_))
        ));
    }

    #[test]
    fn test_block_size_rules() {
        assert!(validate_block_size(512).is_ok());
        assert!(validate_block_size(4096).is_ok());
        assert!(validate_block_size(65536).is_ok());
        assert!(validate_block_size(256).is_err());
        assert!(validate_block_size(3000).is_err());
        assert!(validate_block_size(131072).is_err());
    }
}
