//! Stream handles
//!
//! A handle is a cursor bound to one directory entry. It holds no data of
//! its own: every operation takes the archive's locks, resolves the entry,
//! and works on its block chain. Binding is by identity, not just by name,
//! so a handle whose stream was deleted (even if a new stream with the same
//! name has since been created) fails with `StreamDeleted`.

use crate::archive::{Shared, State};
use crate::error::{ArchiveError, Result};
use crate::store::BlockStore;
use std::io;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpenMode {
    Read,
    Write,
}

/// Cursor over one stream
///
/// Besides the methods below, handles implement [`std::io::Read`],
/// [`std::io::Write`] and [`std::io::Seek`], so they plug into anything that
/// consumes standard I/O traits.
pub struct StreamHandle {
    shared: Arc<Shared>,
    name: String,
    id: u64,
    offset: u64,
    mode: OpenMode,
}

impl StreamHandle {
    pub(crate) fn new(shared: Arc<Shared>, name: String, id: u64, mode: OpenMode) -> Self {
        StreamHandle {
            shared,
            name,
            id,
            offset: 0,
            mode,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Current cursor position
    pub fn position(&self) -> u64 {
        self.offset
    }

    /// Logical length of the stream
    pub fn len(&self) -> Result<u64> {
        let state = self.shared.read()?;
        Ok(state.bound_entry(&self.name, self.id)?.length)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Read up to `max` bytes from the cursor and advance past them
    ///
    /// Returns an empty buffer at or past the end of the stream.
    pub fn read(&mut self, max: usize) -> Result<Vec<u8>> {
        let state = self.shared.read()?;
        let entry = state.bound_entry(&self.name, self.id)?;

        if self.offset >= entry.length || max == 0 {
            return Ok(Vec::new());
        }

        let available = entry.length - self.offset;
        let len = (max as u64).min(available) as usize;

        let mut store = self.shared.store.lock();
        let data = entry.chain.read_at(self.offset, len, &mut *store)?;
        self.offset += len as u64;

        Ok(data)
    }

    /// Write `data` at the cursor and advance past it
    ///
    /// Writing past the end extends the stream; any gap reads as zeros.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        self.check_writable()?;
        if data.is_empty() {
            // Still surface a deleted or closed stream
            self.shared.read()?.bound_entry(&self.name, self.id)?;
            return Ok(());
        }

        let mut state = self.shared.write()?;
        let mut store = self.shared.store.lock();
        let State {
            directory,
            allocator,
            dirty,
            ..
        } = &mut *state;

        let entry = directory
            .lookup_mut(&self.name)
            .filter(|entry| entry.id == self.id)
            .ok_or_else(|| ArchiveError::StreamDeleted(self.name.clone()))?;

        if let Err(e) = entry.chain.write_at(self.offset, data, allocator, &mut *store) {
            // Drop whatever the failed write attached past the old length,
            // keeping the bytes beyond it zero.
            let capacity = entry.chain.capacity(store.block_size());
            if let Err(cleanup) =
                entry
                    .chain
                    .truncate(entry.length, capacity, allocator, &mut *store)
            {
                warn!("Failed to roll back write to {}: {}", self.name, cleanup);
            }
            return Err(e);
        }

        let end = self.offset + data.len() as u64;
        entry.length = entry.length.max(end);
        entry.touch();
        *dirty = true;
        self.offset = end;

        Ok(())
    }

    /// Move the cursor; positions past the end are allowed
    pub fn seek(&mut self, offset: u64) -> Result<()> {
        self.shared.read()?.bound_entry(&self.name, self.id)?;
        self.offset = offset;
        Ok(())
    }

    /// Set the stream's length
    ///
    /// Shrinking releases trailing blocks; growing exposes zeros. The cursor
    /// does not move.
    pub fn truncate(&mut self, new_length: u64) -> Result<()> {
        self.check_writable()?;

        let mut state = self.shared.write()?;
        let mut store = self.shared.store.lock();
        let State {
            directory,
            allocator,
            dirty,
            ..
        } = &mut *state;

        let entry = directory
            .lookup_mut(&self.name)
            .filter(|entry| entry.id == self.id)
            .ok_or_else(|| ArchiveError::StreamDeleted(self.name.clone()))?;

        let old_length = entry.length;
        if new_length < old_length {
            entry
                .chain
                .truncate(new_length, old_length, allocator, &mut *store)?;
        } else if new_length > old_length {
            entry
                .chain
                .ensure_capacity(new_length, allocator, &mut *store)?;
        }

        if new_length != old_length {
            entry.length = new_length;
            entry.touch();
            *dirty = true;
            debug!("Truncated {} from {} to {} bytes", self.name, old_length, new_length);
        }

        Ok(())
    }

    /// Release the handle
    ///
    /// Dropping a handle has the same effect; this variant reports whether
    /// the handle was still valid.
    pub fn close(self) -> Result<()> {
        self.shared.read()?.bound_entry(&self.name, self.id)?;
        Ok(())
    }

    fn check_writable(&self) -> Result<()> {
        if self.mode != OpenMode::Write {
            return Err(ArchiveError::ReadOnlyHandle(self.name.clone()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("name", &self.name)
            .field("offset", &self.offset)
            .field("mode", &self.mode)
            .finish()
    }
}

impl io::Read for StreamHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data = StreamHandle::read(self, buf.len())?;
        buf[..data.len()].copy_from_slice(&data);
        Ok(data.len())
    }
}

impl io::Write for StreamHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        StreamHandle::write(self, buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Seek for StreamHandle {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let target = match pos {
            io::SeekFrom::Start(offset) => Some(offset),
            io::SeekFrom::Current(delta) => self.offset.checked_add_signed(delta),
            io::SeekFrom::End(delta) => self.len()?.checked_add_signed(delta),
        };

        let target = target.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )
        })?;

        StreamHandle::seek(self, target)?;
        Ok(target)
    }
}
