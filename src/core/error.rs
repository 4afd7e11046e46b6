use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt archive: {0}")]
    CorruptArchive(String),

    #[error("Unsupported format version: {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },

    #[error("Invalid block size: {0} (must be a power of two between 512 and 65536)")]
    InvalidBlockSize(u32),

    #[error("Stream already exists: {0}")]
    DuplicateName(String),

    #[error("Stream not found: {0}")]
    NotFound(String),

    #[error("Invalid stream name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Archive is closed")]
    ArchiveClosed,

    #[error("Handle for {0} was opened read-only")]
    ReadOnlyHandle(String),

    #[error("Stream was deleted while a handle was open: {0}")]
    StreamDeleted(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ArchiveError>;

impl From<ArchiveError> for std::io::Error {
    fn from(err: ArchiveError) -> Self {
        use std::io::ErrorKind;

        let kind = match &err {
            ArchiveError::Io(inner) => inner.kind(),
            ArchiveError::NotFound(_) | ArchiveError::StreamDeleted(_) => ErrorKind::NotFound,
            ArchiveError::DuplicateName(_) => ErrorKind::AlreadyExists,
            ArchiveError::ReadOnlyHandle(_) => ErrorKind::PermissionDenied,
            ArchiveError::InvalidName { .. } | ArchiveError::InvalidBlockSize(_) => {
                ErrorKind::InvalidInput
            }
            ArchiveError::CorruptArchive(_) => ErrorKind::InvalidData,
            _ => ErrorKind::Other,
        };

        match err {
            ArchiveError::Io(inner) => inner,
            other => std::io::Error::new(kind, other),
        }
    }
}
