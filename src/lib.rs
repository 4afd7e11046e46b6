//! # Compound - Many Named Streams in One File
//!
//! `compound-rs` stores any number of independently addressable byte streams
//! inside a single block-structured container file:
//!
//! - **Hierarchical names** such as `"styles/theme1"`, kept in lexicographic order
//! - **Prefix listing** in one range scan, plus a directory-style tree view
//! - **Block reuse**: deleted and truncated streams return their blocks to a
//!   LIFO free list
//! - **Crash-safe commits**: metadata is written to fresh blocks before the
//!   header switches to it
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use compound_rs::{Archive, ArchiveConfig, OpenMode, Result};
//!
//! # fn main() -> Result<()> {
//! let archive = Archive::create("report.cmpd", ArchiveConfig::default())?;
//!
//! // Write streams
//! let mut content = archive.create_stream("content/body.xml")?;
//! content.write(b"<body/>")?;
//! archive.write_stream("styles/theme1", b"<style/>")?;
//!
//! // Read them back
//! let mut body = archive.open_stream("content/body.xml", OpenMode::Read)?;
//! let bytes = body.read(1024)?;
//!
//! // List by prefix
//! let styles = archive.list("styles/")?;
//!
//! archive.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Reopening
//!
//! ```rust,no_run
//! use compound_rs::Archive;
//!
//! # fn main() -> compound_rs::Result<()> {
//! let archive = Archive::open("report.cmpd")?;
//! for entry in archive.list_children("")? {
//!     println!("{}{}", entry.name, if entry.is_dir { "/" } else { "" });
//! }
//! # Ok(())
//! # }
//! ```

pub mod core;

// Re-export core modules so crate:: paths inside core resolve
#[allow(unused_imports)]
pub(crate) use self::core::{
    allocator, archive, chain, config, directory, entry, error, handle, header, prefix, verify,
};

// Modules with public building blocks
pub use self::core::{store, validation};

pub use crate::core::{
    Archive, ArchiveConfig, ArchiveError, ArchiveStats, Entry, EntryInfo, OpenMode, Result,
    StreamHandle, VerifyReport,
};
pub use crate::core::header::{DEFAULT_BLOCK_SIZE, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE};
pub use crate::core::store::{BlockStore, CacheStats, FileBlockStore, MemoryBlockStore};
