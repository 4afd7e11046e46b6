//! Disk I/O for compound archives

use super::{check_index, check_len, BlockStore};
use crate::error::{ArchiveError, Result};
use crate::header::{Header, HEADER_LEN};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Disk-backed block storage
///
/// Block `i` lives at byte offset `i * block_size`. The file length is always
/// a whole number of blocks.
pub struct FileBlockStore {
    file: File,
    path: PathBuf,
    block_size: u32,
    block_count: u64,
}

impl FileBlockStore {
    /// Create a new, empty store file (truncating any existing file)
    pub fn create<P: AsRef<Path>>(path: P, block_size: u32) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        Ok(FileBlockStore {
            file,
            path: path.as_ref().to_path_buf(),
            block_size,
            block_count: 0,
        })
    }

    /// Open an existing archive file, reading the block size from its header
    ///
    /// Returns the store together with the validated header.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<(Self, Header)> {
        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;

        let mut prefix = vec![0u8; HEADER_LEN];
        file.read_exact(&mut prefix).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => {
                ArchiveError::CorruptArchive("file too short to hold a header".to_string())
            }
            _ => ArchiveError::Io(e),
        })?;
        let header = Header::from_bytes(&prefix)?;

        let len = file.metadata()?.len();
        let block_size = header.block_size;
        if len % block_size as u64 != 0 {
            tracing::warn!(
                "Archive length {} is not a multiple of block size {}; ignoring partial tail",
                len,
                block_size
            );
        }

        let store = FileBlockStore {
            file,
            path: path.as_ref().to_path_buf(),
            block_size,
            block_count: len / block_size as u64,
        };

        Ok((store, header))
    }

    /// Get file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn offset(&self, index: u64) -> u64 {
        index * self.block_size as u64
    }
}

impl BlockStore for FileBlockStore {
    fn block_size(&self) -> u32 {
        self.block_size
    }

    fn block_count(&self) -> u64 {
        self.block_count
    }

    fn read_block(&mut self, index: u64) -> Result<Vec<u8>> {
        check_index(index, self.block_count)?;
        self.file.seek(SeekFrom::Start(self.offset(index)))?;

        let mut buffer = vec![0u8; self.block_size as usize];
        self.file.read_exact(&mut buffer)?;

        Ok(buffer)
    }

    fn write_block(&mut self, index: u64, data: &[u8]) -> Result<()> {
        check_index(index, self.block_count)?;
        check_len(data.len(), self.block_size)?;

        self.file.seek(SeekFrom::Start(self.offset(index)))?;
        self.file.write_all(data)?;

        Ok(())
    }

    fn grow_to(&mut self, new_count: u64) -> Result<()> {
        if new_count <= self.block_count {
            return Ok(());
        }

        // set_len zero-fills the extension
        self.file.set_len(self.offset(new_count))?;
        self.block_count = new_count;

        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }
}
