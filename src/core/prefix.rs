//! Prefix enumeration over a sorted key sequence
//!
//! Given a source positioned at the first key `>= prefix`, the scan yields
//! keys while they start with the prefix and stops at the first that does
//! not. Because the source is sorted, every match is contiguous, so a scan
//! costs one seek plus the number of matches.

use crate::error::{ArchiveError, Result};

/// Outcome of advancing a scan by one key
#[derive(Debug)]
pub enum Step<T> {
    /// The next matching key
    Yield(T),
    /// No more matches; further steps keep returning `Exhausted`
    Exhausted,
    /// The underlying source failed; the scan is finished
    Fault(ArchiveError),
}

/// Forward scan over a sorted source, bounded by a prefix
///
/// The source must already be positioned at the first key `>= prefix`
/// (for a `BTreeMap`, a `range(prefix..)`). Keys before that point would be
/// treated as the end of the run.
pub struct PrefixScan<'p, I> {
    source: I,
    prefix: &'p str,
    finished: bool,
}

impl<'a, 'p, I> PrefixScan<'p, I>
where
    I: Iterator<Item = Result<&'a str>>,
{
    pub fn new(source: I, prefix: &'p str) -> Self {
        PrefixScan {
            source,
            prefix,
            finished: false,
        }
    }

    pub fn prefix(&self) -> &str {
        self.prefix
    }

    /// Advance by one key
    pub fn step(&mut self) -> Step<&'a str> {
        if self.finished {
            return Step::Exhausted;
        }

        match self.source.next() {
            Some(Ok(key)) if key.starts_with(self.prefix) => Step::Yield(key),
            Some(Ok(_)) | None => {
                self.finished = true;
                Step::Exhausted
            }
            Some(Err(e)) => {
                self.finished = true;
                Step::Fault(e)
            }
        }
    }
}

impl<'a, 'p, I> Iterator for PrefixScan<'p, I>
where
    I: Iterator<Item = Result<&'a str>>,
{
    type Item = Result<&'a str>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.step() {
            Step::Yield(key) => Some(Ok(key)),
            Step::Exhausted => None,
            Step::Fault(e) => Some(Err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seek<'a>(keys: &'a [&'a str], prefix: &str) -> impl Iterator<Item = Result<&'a str>> {
        let start = keys.partition_point(|k| *k < prefix);
        keys[start..].iter().map(|k| Ok(*k))
    }

    const KEYS: &[&str] = &["a/one", "a/three", "a/two", "ab", "b/one", "styles/theme1"];

    fn collect(prefix: &str) -> Vec<&'static str> {
        PrefixScan::new(seek(KEYS, prefix), prefix)
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_prefix_match() {
        assert_eq!(collect("a/"), vec!["a/one", "a/three", "a/two"]);
        assert_eq!(collect("a"), vec!["a/one", "a/three", "a/two", "ab"]);
        assert_eq!(collect("styles/"), vec!["styles/theme1"]);
    }

    #[test]
    fn test_empty_prefix_matches_everything() {
        assert_eq!(collect(""), KEYS.to_vec());
    }

    #[test]
    fn test_exact_name_is_included() {
        assert_eq!(collect("ab"), vec!["ab"]);
        assert_eq!(collect("a/two"), vec!["a/two"]);
    }

    #[test]
    fn test_no_match_is_empty() {
        assert!(collect("c").is_empty());
        assert!(collect("zzz").is_empty());
        assert!(collect("a/onex").is_empty());
    }

    #[test]
    fn test_exhausted_is_sticky() {
        let mut scan = PrefixScan::new(seek(KEYS, "b/"), "b/");
        assert!(matches!(scan.step(), Step::Yield("b/one")));
        assert!(matches!(scan.step(), Step::Exhausted));
        assert!(matches!(scan.step(), Step::Exhausted));
    }

    #[test]
    fn test_source_fault_ends_scan() {
        let source = vec![
            Ok("x/1"),
            Err(ArchiveError::CorruptArchive("bad key".to_string())),
            Ok("x/2"),
        ];
        let mut scan = PrefixScan::new(source.into_iter(), "x/");

        assert!(matches!(scan.step(), Step::Yield("x/1")));
        assert!(matches!(scan.step(), Step::Fault(ArchiveError::CorruptArchive(_))));
        assert!(matches!(scan.step(), Step::Exhausted));
    }
}
