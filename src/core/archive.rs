//! The archive façade
//!
//! An [`Archive`] owns one backing store and everything derived from it:
//! the header, the stream directory and the free-block allocator. Streams
//! are reached through [`StreamHandle`]s, which share the archive's state
//! and keep working for as long as the archive is open.
//!
//! # Locking
//!
//! All structural state sits behind one `RwLock`; block I/O is serialized by
//! a `Mutex` around the store. Both are always taken in that order.
//!
//! # Commit protocol
//!
//! [`flush`](Archive::flush) never overwrites live metadata. It appends a
//! fresh directory region and free-list region past the current end of the
//! archive, syncs, and only then rewrites the header to point at them. The
//! previous regions are recorded as free in the new free list.
//!
//! Blocks released by deletes and truncation are not reused until the
//! commit that drops them is durable, so a crash before the header write
//! leaves the previous directory, free list and every block they reference
//! intact. The exception is writes inside a stream's existing blocks: those
//! land in place and are not rolled back. Blocks appended by a failed flush
//! are reclaimed on the next open.

use crate::allocator::FreeListAllocator;
use crate::config::ArchiveConfig;
use crate::directory::{DirEntry, Directory};
use crate::entry::{child_prefix, children, Entry, EntryInfo};
use crate::error::{ArchiveError, Result};
use crate::handle::{OpenMode, StreamHandle};
use crate::header::{validate_block_size, Header, Region};
use crate::store::{BlockCache, BlockStore, CacheStats, FileBlockStore, MemoryBlockStore};
use crate::validation::validate_name;
use crate::verify::{verify, VerifyReport};
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Archive statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArchiveStats {
    pub block_size: u32,
    pub total_blocks: u64,
    pub free_blocks: u64,
    /// Blocks owned by streams or committed metadata
    pub used_blocks: u64,
    pub stream_count: usize,
    /// Sum of all stream lengths
    pub logical_bytes: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_rate: f64,
}

/// Mutable archive state guarded by the state lock
pub(crate) struct State {
    /// Header of the last commit
    pub(crate) header: Header,
    pub(crate) directory: Directory,
    pub(crate) allocator: FreeListAllocator,
    pub(crate) dirty: bool,
    pub(crate) closed: bool,
}

impl State {
    /// The entry a handle is bound to, if it still exists
    pub(crate) fn bound_entry(&self, name: &str, id: u64) -> Result<&DirEntry> {
        self.directory
            .lookup(name)
            .filter(|entry| entry.id == id)
            .ok_or_else(|| ArchiveError::StreamDeleted(name.to_string()))
    }

    fn entry(&self, name: &str) -> Result<&DirEntry> {
        self.directory
            .lookup(name)
            .ok_or_else(|| ArchiveError::NotFound(name.to_string()))
    }
}

/// State shared between an archive and its handles
pub(crate) struct Shared {
    pub(crate) state: RwLock<State>,
    pub(crate) store: Mutex<BlockCache>,
    pub(crate) config: ArchiveConfig,
    path: Option<PathBuf>,
}

impl Shared {
    /// Shared state lock, failing once the archive is closed
    pub(crate) fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        let state = self.state.read();
        if state.closed {
            return Err(ArchiveError::ArchiveClosed);
        }
        Ok(state)
    }

    /// Exclusive state lock, failing once the archive is closed
    pub(crate) fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        let state = self.state.write();
        if state.closed {
            return Err(ArchiveError::ArchiveClosed);
        }
        Ok(state)
    }
}

/// A compound archive: many named byte streams in one block store
///
/// # Examples
///
/// ```rust
/// use compound_rs::{Archive, ArchiveConfig, OpenMode};
///
/// # fn main() -> compound_rs::Result<()> {
/// let archive = Archive::create_in_memory(ArchiveConfig::default())?;
///
/// let mut theme = archive.create_stream("styles/theme1")?;
/// theme.write(b"<style/>")?;
///
/// let mut reader = archive.open_stream("styles/theme1", OpenMode::Read)?;
/// assert_eq!(reader.read(64)?, b"<style/>");
///
/// assert_eq!(archive.list("styles/")?, vec!["styles/theme1"]);
/// archive.close()?;
/// # Ok(())
/// # }
/// ```
pub struct Archive {
    shared: Arc<Shared>,
}

impl Archive {
    /// Create a new archive file, replacing any existing file at `path`
    pub fn create<P: AsRef<Path>>(path: P, config: ArchiveConfig) -> Result<Self> {
        config.validate()?;
        info!(
            "Creating archive at {:?} (block size {})",
            path.as_ref(),
            config.block_size
        );

        let store = FileBlockStore::create(&path, config.block_size)?;
        Self::init(
            Box::new(store),
            config,
            Some(path.as_ref().to_path_buf()),
        )
    }

    /// Create an archive that lives only in memory
    pub fn create_in_memory(config: ArchiveConfig) -> Result<Self> {
        config.validate()?;
        debug!("Creating in-memory archive (block size {})", config.block_size);

        let store = MemoryBlockStore::new(config.block_size);
        Self::init(Box::new(store), config, None)
    }

    /// Create an archive over an empty block store
    ///
    /// The store's block size must match `config.block_size`.
    pub fn create_with_store(store: Box<dyn BlockStore>, config: ArchiveConfig) -> Result<Self> {
        config.validate()?;
        if store.block_size() != config.block_size {
            return Err(ArchiveError::Config(format!(
                "store block size {} does not match configured block size {}",
                store.block_size(),
                config.block_size
            )));
        }
        Self::init(store, config, None)
    }

    /// Open an existing archive file with default settings
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(path, ArchiveConfig::default())
    }

    /// Open an existing archive file
    ///
    /// The block size is taken from the file; `config.block_size` is ignored.
    pub fn open_with_config<P: AsRef<Path>>(path: P, config: ArchiveConfig) -> Result<Self> {
        info!("Opening archive at {:?}", path.as_ref());

        let (store, _) = FileBlockStore::open(&path)?;
        Self::load(
            Box::new(store),
            config,
            Some(path.as_ref().to_path_buf()),
        )
    }

    /// Open an archive previously written to `store`
    pub fn open_with_store(store: Box<dyn BlockStore>, config: ArchiveConfig) -> Result<Self> {
        Self::load(store, config, None)
    }

    fn init(
        mut store: Box<dyn BlockStore>,
        config: ArchiveConfig,
        path: Option<PathBuf>,
    ) -> Result<Self> {
        let block_size = store.block_size();
        validate_block_size(block_size)?;
        if store.block_count() != 0 {
            return Err(ArchiveError::InvariantViolation(format!(
                "cannot create an archive over a store holding {} blocks",
                store.block_count()
            )));
        }

        store.grow_to(1)?;
        let state = State {
            header: Header::new(block_size),
            directory: Directory::new(),
            allocator: FreeListAllocator::new(1),
            dirty: true,
            closed: false,
        };

        let archive = Self::assemble(store, state, config, path);
        archive.flush()?;
        Ok(archive)
    }

    fn load(
        mut store: Box<dyn BlockStore>,
        config: ArchiveConfig,
        path: Option<PathBuf>,
    ) -> Result<Self> {
        if store.block_count() == 0 {
            return Err(ArchiveError::CorruptArchive(
                "store is empty (no header block)".to_string(),
            ));
        }

        let header = Header::from_bytes(&store.read_block(0)?)?;
        if header.block_size != store.block_size() {
            return Err(ArchiveError::CorruptArchive(format!(
                "header block size {} does not match store block size {}",
                header.block_size,
                store.block_size()
            )));
        }

        let present = store.block_count();
        if present < header.total_blocks {
            return Err(ArchiveError::CorruptArchive(format!(
                "archive truncated: header expects {} blocks, found {}",
                header.total_blocks, present
            )));
        }

        let directory = Directory::decode(&read_region(&mut *store, &header.directory)?)?;

        let free_list: Vec<u64> = bincode::deserialize(&read_region(&mut *store, &header.free_list)?)
            .map_err(|e| ArchiveError::CorruptArchive(format!("failed to decode free list: {}", e)))?;
        if free_list.len() as u64 != header.free_blocks {
            return Err(ArchiveError::CorruptArchive(format!(
                "free list holds {} blocks, header records {}",
                free_list.len(),
                header.free_blocks
            )));
        }

        let mut allocator = FreeListAllocator::from_free_list(header.total_blocks, free_list)
            .map_err(|e| ArchiveError::CorruptArchive(format!("invalid free list: {}", e)))?;

        // Blocks past the committed end were appended by a flush that never
        // reached its header write.
        let mut dirty = false;
        if present > header.total_blocks {
            warn!(
                "Reclaiming {} orphaned blocks past the committed end ({} blocks)",
                present - header.total_blocks,
                header.total_blocks
            );
            allocator.extend_to(present);
            let orphans: Vec<u64> = (header.total_blocks..present).rev().collect();
            allocator.reclaim(&orphans)?;
            dirty = true;
        }

        let report = verify(&header, &directory, &allocator);
        if !report.is_ok() {
            return Err(ArchiveError::CorruptArchive(report.problems.join("; ")));
        }
        if report.unreferenced_blocks > 0 {
            warn!("{} blocks are not referenced by anything", report.unreferenced_blocks);
        }

        info!(
            "Opened archive: {} streams, {} blocks ({} free)",
            directory.len(),
            allocator.total_blocks(),
            allocator.free_count()
        );

        let state = State {
            header,
            directory,
            allocator,
            dirty,
            closed: false,
        };
        Ok(Self::assemble(store, state, config, path))
    }

    fn assemble(
        store: Box<dyn BlockStore>,
        state: State,
        config: ArchiveConfig,
        path: Option<PathBuf>,
    ) -> Self {
        let cache = BlockCache::new(store, config.cache_blocks);
        Archive {
            shared: Arc::new(Shared {
                state: RwLock::new(state),
                store: Mutex::new(cache),
                config,
                path,
            }),
        }
    }

    /// Backing file path, `None` for in-memory or custom stores
    pub fn path(&self) -> Option<&Path> {
        self.shared.path.as_deref()
    }

    pub fn config(&self) -> &ArchiveConfig {
        &self.shared.config
    }

    pub fn block_size(&self) -> u32 {
        self.shared.state.read().header.block_size
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.read().closed
    }

    /// Create an empty stream and open it for writing
    pub fn create_stream(&self, name: &str) -> Result<StreamHandle> {
        validate_name(name)?;
        let mut state = self.shared.write()?;

        let id = state.directory.insert(name, DirEntry::new())?;
        state.dirty = true;
        debug!("Created stream {}", name);

        Ok(StreamHandle::new(
            Arc::clone(&self.shared),
            name.to_string(),
            id,
            OpenMode::Write,
        ))
    }

    /// Open an existing stream
    ///
    /// In write mode a missing stream is created when the archive was
    /// configured with `create_on_write`.
    pub fn open_stream(&self, name: &str, mode: OpenMode) -> Result<StreamHandle> {
        {
            let state = self.shared.read()?;
            if let Some(entry) = state.directory.lookup(name) {
                debug!("Opened stream {} ({:?})", name, mode);
                return Ok(StreamHandle::new(
                    Arc::clone(&self.shared),
                    name.to_string(),
                    entry.id,
                    mode,
                ));
            }
        }

        if mode == OpenMode::Write && self.shared.config.create_on_write {
            return self.create_stream(name);
        }

        Err(ArchiveError::NotFound(name.to_string()))
    }

    /// Delete a stream and release its blocks
    ///
    /// Open handles on the stream fail with `StreamDeleted` afterwards.
    pub fn delete_stream(&self, name: &str) -> Result<()> {
        let mut state = self.shared.write()?;
        let State {
            directory,
            allocator,
            ..
        } = &mut *state;

        let entry = directory
            .lookup_mut(name)
            .ok_or_else(|| ArchiveError::NotFound(name.to_string()))?;
        let blocks = entry.chain.len();
        entry.chain.release(allocator)?;
        directory.remove(name)?;

        state.dirty = true;
        debug!("Deleted stream {} ({} blocks released)", name, blocks);
        Ok(())
    }

    pub fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.shared.read()?.directory.contains(name))
    }

    pub fn metadata(&self, name: &str) -> Result<EntryInfo> {
        let state = self.shared.read()?;
        Ok(EntryInfo::from_entry(name, state.entry(name)?))
    }

    /// Replace a stream's flags
    pub fn set_flags(&self, name: &str, flags: u32) -> Result<()> {
        let mut state = self.shared.write()?;
        let entry = state
            .directory
            .lookup_mut(name)
            .ok_or_else(|| ArchiveError::NotFound(name.to_string()))?;
        entry.flags = flags;
        entry.touch();
        state.dirty = true;
        Ok(())
    }

    /// Read a whole stream
    pub fn read_stream(&self, name: &str) -> Result<Vec<u8>> {
        let state = self.shared.read()?;
        let entry = state.entry(name)?;

        let mut store = self.shared.store.lock();
        entry.chain.read_at(0, entry.length as usize, &mut *store)
    }

    /// Replace a stream's contents, creating the stream if needed
    pub fn write_stream(&self, name: &str, data: &[u8]) -> Result<()> {
        if !self.exists(name)? {
            self.create_stream(name)?;
        }
        let mut handle = self.open_stream(name, OpenMode::Write)?;
        handle.truncate(0)?;
        handle.write(data)
    }

    /// Names starting with `prefix`, in lexicographic order
    ///
    /// The result is a snapshot taken under the state lock; later changes
    /// are not reflected in it. An empty prefix lists every stream.
    pub fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let state = self.shared.read()?;
        state.directory.with_prefix(prefix).names()
    }

    /// Metadata of every stream whose name starts with `prefix`
    pub fn list_entries(&self, prefix: &str) -> Result<Vec<EntryInfo>> {
        let state = self.shared.read()?;
        let matches = state.directory.with_prefix(prefix).entries();
        Ok(matches
            .into_iter()
            .map(|(name, entry)| EntryInfo::from_entry(name, entry))
            .collect())
    }

    /// Immediate children of `parent`, with implied directories
    ///
    /// An empty parent lists the top level.
    pub fn list_children(&self, parent: &str) -> Result<Vec<Entry>> {
        let prefix = child_prefix(parent);
        let state = self.shared.read()?;
        let descendants = state.directory.with_prefix(&prefix).entries();
        Ok(children(&prefix, descendants))
    }

    pub fn stats(&self) -> Result<ArchiveStats> {
        let state = self.shared.read()?;
        let cache: CacheStats = self.shared.store.lock().stats();

        let total = state.allocator.total_blocks();
        let free = state.allocator.free_count();
        let logical_bytes = state.directory.iter().map(|(_, e)| e.length).sum();

        Ok(ArchiveStats {
            block_size: state.header.block_size,
            total_blocks: total,
            free_blocks: free,
            used_blocks: total - free - 1,
            stream_count: state.directory.len(),
            logical_bytes,
            cache_hits: cache.hits,
            cache_misses: cache.misses,
            cache_hit_rate: cache.hit_rate(),
        })
    }

    /// Check that every block has exactly one owner and every stream fits
    /// its chain
    pub fn verify(&self) -> Result<VerifyReport> {
        let state = self.shared.read()?;
        Ok(verify(&state.header, &state.directory, &state.allocator))
    }

    /// Commit the directory and free list
    ///
    /// A no-op when nothing changed since the last commit.
    pub fn flush(&self) -> Result<()> {
        let mut state = self.shared.write()?;
        self.commit(&mut state)
    }

    /// Flush and close the archive
    ///
    /// Every later operation on the archive or its handles fails with
    /// `ArchiveClosed`. If the flush fails the archive stays open.
    pub fn close(&self) -> Result<()> {
        let mut state = self.shared.write()?;
        self.commit(&mut state)?;
        state.closed = true;
        self.shared.store.lock().clear();

        info!("Closed archive");
        Ok(())
    }

    fn commit(&self, state: &mut State) -> Result<()> {
        if !state.dirty {
            return Ok(());
        }

        let mut store = self.shared.store.lock();
        let sync = self.shared.config.sync_on_flush;
        let block_size = state.header.block_size;

        // Superseded regions become free once the new header is in place.
        let retired: Vec<u64> = state
            .header
            .directory
            .blocks(block_size)
            .chain(state.header.free_list.blocks(block_size))
            .collect();
        state.allocator.check_releasable(&retired)?;

        // Blocks released since the last commit are free in this one.
        let mut free_list = state.allocator.free_list().to_vec();
        free_list.extend_from_slice(state.allocator.pending());
        free_list.extend_from_slice(&retired);

        let directory_bytes = state.directory.encode()?;
        let free_bytes = bincode::serialize(&free_list).map_err(|e| {
            ArchiveError::InvariantViolation(format!("failed to encode free list: {}", e))
        })?;

        // TODO: place the regions in a run of free blocks when one is long
        // enough, instead of always appending.
        let start = state.allocator.total_blocks();
        let directory_region = region_at(start, &directory_bytes);
        let free_region = region_at(
            start + directory_region.block_count(block_size),
            &free_bytes,
        );
        let new_total = free_region.start + free_region.block_count(block_size);

        // Blocks appended here stay outside the allocator until the header
        // is written; on failure they are simply reused by the next flush.
        store.grow_to(new_total)?;
        write_region(&mut *store, &directory_region, &directory_bytes)?;
        write_region(&mut *store, &free_region, &free_bytes)?;
        if sync {
            store.sync()?;
        }

        let mut header = state.header;
        header.total_blocks = new_total;
        header.free_blocks = free_list.len() as u64;
        header.directory = directory_region;
        header.free_list = free_region;
        store.write_block(0, &header.to_bytes())?;
        if sync {
            store.sync()?;
        }

        state.allocator.extend_to(new_total);
        state.allocator.commit_pending();
        state.allocator.reclaim(&retired)?;
        state.header = header;
        state.dirty = false;

        info!(
            "Flushed archive: {} streams, {} blocks ({} free)",
            state.directory.len(),
            new_total,
            header.free_blocks
        );
        Ok(())
    }
}

impl Drop for Archive {
    fn drop(&mut self) {
        let mut state = self.shared.state.write();
        if state.closed {
            return;
        }

        if let Err(e) = self.commit(&mut state) {
            warn!("Failed to flush archive on drop: {}", e);
        }
        state.closed = true;
    }
}

impl std::fmt::Debug for Archive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.read();
        f.debug_struct("Archive")
            .field("path", &self.shared.path)
            .field("block_size", &state.header.block_size)
            .field("streams", &state.directory.len())
            .field("closed", &state.closed)
            .finish()
    }
}

fn region_at(start: u64, bytes: &[u8]) -> Region {
    Region {
        start,
        len: bytes.len() as u64,
        checksum: crc32fast::hash(bytes),
    }
}

fn write_region(store: &mut dyn BlockStore, region: &Region, bytes: &[u8]) -> Result<()> {
    let block_size = store.block_size() as usize;
    for (block, chunk) in region.blocks(block_size as u32).zip(bytes.chunks(block_size)) {
        if chunk.len() == block_size {
            store.write_block(block, chunk)?;
        } else {
            let mut padded = chunk.to_vec();
            padded.resize(block_size, 0);
            store.write_block(block, &padded)?;
        }
    }
    Ok(())
}

fn read_region(store: &mut dyn BlockStore, region: &Region) -> Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(region.len as usize);
    for block in region.blocks(store.block_size()) {
        bytes.extend_from_slice(&store.read_block(block)?);
    }
    bytes.truncate(region.len as usize);

    let computed = crc32fast::hash(&bytes);
    if computed != region.checksum {
        return Err(ArchiveError::CorruptArchive(format!(
            "metadata region at block {} failed its checksum (stored {:#010x}, computed {:#010x})",
            region.start, region.checksum, computed
        )));
    }
    Ok(bytes)
}
