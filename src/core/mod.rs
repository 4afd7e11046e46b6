//! Compound archive engine
//!
//! Leaves first:
//!
//! - [`error`] - Error type and `Result` alias
//! - [`header`] - Binary header (block 0) and metadata regions
//! - [`store`] - Whole-block I/O: file, memory and the LRU cache layer
//! - [`allocator`] - LIFO free-list allocator with a membership bitmap
//! - [`chain`] - Block chains and offset translation
//! - [`directory`] - Sorted name → entry map and its persisted form
//! - [`prefix`] - Prefix-bounded scans over sorted keys
//! - [`handle`] - Stream cursors
//! - [`archive`] - The façade tying it all together
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │             Compound Archive File           │
//! ├─────────────────────────────────────────────┤
//! │ Block 0: Header                             │
//! │  - Magic: "CMPD\0\x01\0\0"                  │
//! │  - Version, block size, block counts        │
//! │  - Directory region (start, len, crc32)     │
//! │  - Free-list region (start, len, crc32)     │
//! ├─────────────────────────────────────────────┤
//! │ Blocks 1..N                                 │
//! │  - Stream data (owned by one chain each)    │
//! │  - Free blocks (LIFO free list)             │
//! │  - Metadata regions of the last commit      │
//! └─────────────────────────────────────────────┘
//! ```

pub mod allocator;
pub mod archive;
pub mod chain;
pub mod config;
pub mod directory;
pub mod entry;
pub mod error;
pub mod handle;
pub mod header;
pub mod prefix;
pub mod store;
pub mod validation;
pub mod verify;

pub use archive::{Archive, ArchiveStats};
pub use config::ArchiveConfig;
pub use entry::{Entry, EntryInfo};
pub use error::{ArchiveError, Result};
pub use handle::{OpenMode, StreamHandle};
pub use verify::VerifyReport;
