//! Validation for stream names
//!
//! Stream names are hierarchical keys such as `"styles/theme1"`. The archive
//! itself is a flat sorted map, so the hierarchy exists only in the names;
//! these rules keep it well formed so that prefix listings and the tree view
//! agree with what a reader expects.

use crate::error::{ArchiveError, Result};
use regex::Regex;
use std::sync::OnceLock;

/// Separator between name segments
pub const DELIMITER: char = '/';

/// Maximum encoded length of a stream name in bytes
pub const MAX_NAME_LEN: usize = 1024;

/// One or more non-empty segments separated by single `/`, no NUL bytes
const NAME_PATTERN: &str = r"^[^/\x00]+(/[^/\x00]+)*$";

fn name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(NAME_PATTERN).expect("name pattern is a valid regex"))
}

/// Validate a stream name
///
/// # Rules
/// - Not empty, at most [`MAX_NAME_LEN`] bytes
/// - No NUL bytes
/// - No empty segments: no leading or trailing `/`, no `//`
///
/// Names are case-sensitive and otherwise unrestricted; `"A"` and `"a"` are
/// different streams.
///
/// # Examples
///
/// ```
/// use compound_rs::validation::validate_name;
///
/// assert!(validate_name("styles/theme1").is_ok());
/// assert!(validate_name("/styles").is_err());
/// assert!(validate_name("styles//theme1").is_err());
/// ```
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(invalid(name, "name cannot be empty"));
    }

    if name.len() > MAX_NAME_LEN {
        return Err(invalid(
            name,
            &format!("name too long (max {} bytes)", MAX_NAME_LEN),
        ));
    }

    if name.contains('\0') {
        return Err(invalid(name, "name cannot contain NUL bytes"));
    }

    if !name_regex().is_match(name) {
        return Err(invalid(
            name,
            "segments must be non-empty (no leading, trailing or doubled '/')",
        ));
    }

    Ok(())
}

/// Parent of a name, or `None` for a top-level name
pub fn parent(name: &str) -> Option<&str> {
    name.rfind(DELIMITER).map(|idx| &name[..idx])
}

/// Last segment of a name
pub fn base_name(name: &str) -> &str {
    name.rfind(DELIMITER).map_or(name, |idx| &name[idx + 1..])
}

fn invalid(name: &str, reason: &str) -> ArchiveError {
    ArchiveError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}
