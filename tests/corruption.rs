//! Damaged archives must be refused with typed errors, never opened silently

use compound_rs::core::header::{Header, HEADER_LEN};
use compound_rs::{Archive, ArchiveConfig, ArchiveError};
use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn sample_archive(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("sample.cmpd");
    let archive = Archive::create(&path, ArchiveConfig::default()).unwrap();
    archive.write_stream("a/one", &[1u8; 10_000]).unwrap();
    archive.write_stream("a/two", b"two").unwrap();
    archive.close().unwrap();
    path
}

fn patch(path: &Path, offset: u64, bytes: &[u8]) {
    let mut file = OpenOptions::new().write(true).open(path).unwrap();
    file.seek(SeekFrom::Start(offset)).unwrap();
    file.write_all(bytes).unwrap();
}

fn header(path: &Path) -> Header {
    let bytes = std::fs::read(path).unwrap();
    Header::from_bytes(&bytes[..HEADER_LEN]).unwrap()
}

fn assert_corrupt(path: &Path) {
    match Archive::open(path) {
        Err(ArchiveError::CorruptArchive(_)) => {}
        other => panic!("expected CorruptArchive, got {:?}", other),
    }
}

#[test]
fn test_bad_magic() {
    let dir = TempDir::new().unwrap();
    let path = sample_archive(&dir);

    patch(&path, 0, b"NOPE");
    assert_corrupt(&path);
}

#[test]
fn test_header_checksum_mismatch() {
    let dir = TempDir::new().unwrap();
    let path = sample_archive(&dir);

    // total_blocks field
    patch(&path, 16, &[0xff]);
    assert_corrupt(&path);
}

#[test]
fn test_future_version_is_unsupported() {
    let dir = TempDir::new().unwrap();
    let path = sample_archive(&dir);

    patch(&path, 8, &2u16.to_le_bytes());
    match Archive::open(&path) {
        Err(ArchiveError::UnsupportedVersion { major: 2, minor: 0 }) => {}
        other => panic!("expected UnsupportedVersion, got {:?}", other),
    }
}

#[test]
fn test_region_past_block_index_range() {
    let dir = TempDir::new().unwrap();
    let path = sample_archive(&dir);

    // Well-formed header with a valid checksum, pointing the directory at
    // a run that would wrap around u64
    let mut crafted = header(&path);
    crafted.directory.start = u64::MAX - 1;
    crafted.directory.len = crafted.block_size as u64 * 2;
    patch(&path, 0, &crafted.to_bytes());

    assert_corrupt(&path);
}

#[test]
fn test_directory_region_damage() {
    let dir = TempDir::new().unwrap();
    let path = sample_archive(&dir);
    let header = header(&path);

    patch(
        &path,
        header.directory.start * header.block_size as u64 + 3,
        &[0x5a, 0xa5],
    );
    assert_corrupt(&path);
}

#[test]
fn test_free_list_region_damage() {
    let dir = TempDir::new().unwrap();
    let path = sample_archive(&dir);
    let header = header(&path);

    patch(&path, header.free_list.start * header.block_size as u64, &[0xff; 8]);
    assert_corrupt(&path);
}

#[test]
fn test_truncated_file() {
    let dir = TempDir::new().unwrap();
    let path = sample_archive(&dir);
    let header = header(&path);

    let file = OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len((header.total_blocks - 1) * header.block_size as u64)
        .unwrap();
    assert_corrupt(&path);
}

#[test]
fn test_tiny_and_empty_files() {
    let dir = TempDir::new().unwrap();

    let empty = dir.path().join("empty.cmpd");
    std::fs::write(&empty, b"").unwrap();
    assert_corrupt(&empty);

    let tiny = dir.path().join("tiny.cmpd");
    std::fs::write(&tiny, b"CMPD").unwrap();
    assert_corrupt(&tiny);
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(
        Archive::open(dir.path().join("absent.cmpd")),
        Err(ArchiveError::Io(_))
    ));
}

#[test]
fn test_undamaged_archive_still_opens() {
    let dir = TempDir::new().unwrap();
    let path = sample_archive(&dir);

    let archive = Archive::open(&path).unwrap();
    assert_eq!(archive.read_stream("a/two").unwrap(), b"two");
}
