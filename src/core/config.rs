use crate::error::{ArchiveError, Result};
use crate::header::{validate_block_size, DEFAULT_BLOCK_SIZE};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for an archive
///
/// Only `block_size` is persisted; it is fixed when the archive is created
/// and read back from the header on open. The other settings apply to the
/// open session.
///
/// ```toml
/// block_size = 4096
/// create_on_write = true
/// cache_blocks = 512
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArchiveConfig {
    /// Block size in bytes for new archives (default: 4096)
    pub block_size: u32,

    /// Opening a missing stream in write mode creates it (default: false)
    pub create_on_write: bool,

    /// Number of blocks held in the read cache, 0 disables it (default: 256)
    pub cache_blocks: usize,

    /// fsync the backing store during flush (default: true)
    pub sync_on_flush: bool,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            create_on_write: false,
            cache_blocks: 256,
            sync_on_flush: true,
        }
    }
}

impl ArchiveConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the block size used by `create`
    pub fn with_block_size(mut self, block_size: u32) -> Self {
        self.block_size = block_size;
        self
    }

    /// Create missing streams when they are opened for writing
    pub fn with_create_on_write(mut self, enabled: bool) -> Self {
        self.create_on_write = enabled;
        self
    }

    /// Set the read cache size in blocks
    pub fn with_cache_blocks(mut self, blocks: usize) -> Self {
        self.cache_blocks = blocks;
        self
    }

    /// Enable or disable fsync on flush
    pub fn with_sync_on_flush(mut self, enabled: bool) -> Self {
        self.sync_on_flush = enabled;
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_block_size(self.block_size)
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: ArchiveConfig =
            toml::from_str(text).map_err(|e| ArchiveError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ArchiveError::Config(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ArchiveConfig::default();
        assert_eq!(config.block_size, 4096);
        assert!(!config.create_on_write);
        assert_eq!(config.cache_blocks, 256);
        assert!(config.sync_on_flush);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = ArchiveConfig::new()
            .with_block_size(512)
            .with_create_on_write(true)
            .with_cache_blocks(0)
            .with_sync_on_flush(false);

        assert_eq!(config.block_size, 512);
        assert!(config.create_on_write);
        assert_eq!(config.cache_blocks, 0);
        assert!(!config.sync_on_flush);
    }

    #[test]
    fn test_from_toml_partial() {
        let config = ArchiveConfig::from_toml_str("block_size = 1024\ncreate_on_write = true\n")
            .unwrap();
        assert_eq!(config.block_size, 1024);
        assert!(config.create_on_write);
        assert_eq!(config.cache_blocks, 256);
    }

    #[test]
    fn test_from_toml_rejects_bad_values() {
        assert!(matches!(
            ArchiveConfig::from_toml_str("block_size = 1000"),
            Err(ArchiveError::InvalidBlockSize(1000))
        ));
        assert!(matches!(
            ArchiveConfig::from_toml_str("no_such_key = 1"),
            Err(ArchiveError::Config(_))
        ));
        assert!(matches!(
            ArchiveConfig::from_toml_str("block_size = \"big\""),
            Err(ArchiveError::Config(_))
        ));
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("archive.toml");
        std::fs::write(&path, "cache_blocks = 8\n").unwrap();

        let config = ArchiveConfig::load(&path).unwrap();
        assert_eq!(config.cache_blocks, 8);

        assert!(matches!(
            ArchiveConfig::load(dir.path().join("missing.toml")),
            Err(ArchiveError::Config(_))
        ));
    }
}
