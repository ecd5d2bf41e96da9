//! Index Table Tests
//!
//! Tests verify:
//! - Building tables from sorted entries
//! - Point lookups for inline and pointer entries
//! - Checkpoint (head, last_seq) stored in the footer
//! - Iteration in key order
//! - Atomic publish and corruption detection

use std::fs;
use std::path::{Path, PathBuf};

use splitkv::error::KvError;
use splitkv::index::{TableBuilder, TableReader};
use splitkv::memtable::IndexEntry;
use splitkv::vlog::{LogPosition, ValuePointer};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_table() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("index_000001.sst");
    (temp_dir, path)
}

fn ptr(offset: u64) -> ValuePointer {
    ValuePointer { file_id: 1, offset, len: 48 }
}

fn build_table(path: &Path, entries: &[(&[u8], IndexEntry)]) {
    let mut builder = TableBuilder::new(path).unwrap();
    for (key, entry) in entries {
        builder.add(key, entry).unwrap();
    }
    builder.finish(LogPosition::new(1, 4096), 42).unwrap();
}

// =============================================================================
// Build and Lookup Tests
// =============================================================================

#[test]
fn test_build_and_get() {
    let (_temp, path) = setup_temp_table();
    build_table(
        &path,
        &[
            (b"apple", IndexEntry::Inline(b"red".to_vec())),
            (b"banana", IndexEntry::Pointer(ptr(100))),
            (b"cherry", IndexEntry::Inline(Vec::new())),
        ],
    );

    let reader = TableReader::open(&path).unwrap();
    assert_eq!(reader.entry_count(), 3);
    assert_eq!(reader.get(b"apple").unwrap(), Some(IndexEntry::Inline(b"red".to_vec())));
    assert_eq!(reader.get(b"banana").unwrap(), Some(IndexEntry::Pointer(ptr(100))));
    assert_eq!(reader.get(b"cherry").unwrap(), Some(IndexEntry::Inline(Vec::new())));
    assert_eq!(reader.get(b"durian").unwrap(), None);
}

#[test]
fn test_finish_returns_metadata() {
    let (_temp, path) = setup_temp_table();
    let mut builder = TableBuilder::new(&path).unwrap();
    builder.add(b"a", &IndexEntry::Inline(b"1".to_vec())).unwrap();
    builder.add(b"z", &IndexEntry::Inline(b"2".to_vec())).unwrap();

    let meta = builder.finish(LogPosition::new(3, 77), 9).unwrap();

    assert_eq!(meta.path, path);
    assert_eq!(meta.entry_count(), 2);
    assert_eq!(meta.min_key, b"a");
    assert_eq!(meta.max_key, b"z");
    assert_eq!(meta.head, LogPosition::new(3, 77));
    assert_eq!(meta.last_seq, 9);
    assert_eq!(meta.file_size, fs::metadata(&path).unwrap().len());
    assert!(meta.might_contain(b"m"));
    assert!(!meta.might_contain(b"zz"));
}

#[test]
fn test_checkpoint_survives_reopen() {
    let (_temp, path) = setup_temp_table();
    build_table(&path, &[(b"k", IndexEntry::Inline(b"v".to_vec()))]);

    let reader = TableReader::open(&path).unwrap();
    assert_eq!(reader.head(), LogPosition::new(1, 4096));
    assert_eq!(reader.last_seq(), 42);
}

#[test]
fn test_empty_table() {
    let (_temp, path) = setup_temp_table();
    build_table(&path, &[]);

    let reader = TableReader::open(&path).unwrap();
    assert_eq!(reader.entry_count(), 0);
    assert_eq!(reader.get(b"anything").unwrap(), None);
    assert!(!reader.might_contain(b"anything"));
    assert_eq!(reader.head(), LogPosition::new(1, 4096));
}

#[test]
fn test_keys_must_increase() {
    let (_temp, path) = setup_temp_table();
    let mut builder = TableBuilder::new(&path).unwrap();
    builder.add(b"b", &IndexEntry::Inline(b"1".to_vec())).unwrap();

    assert!(matches!(
        builder.add(b"a", &IndexEntry::Inline(b"2".to_vec())),
        Err(KvError::Storage(_))
    ));
    assert!(matches!(
        builder.add(b"b", &IndexEntry::Inline(b"3".to_vec())),
        Err(KvError::Storage(_))
    ));
}

// =============================================================================
// Range and Iteration Tests
// =============================================================================

#[test]
fn test_min_max_keys() {
    let (_temp, path) = setup_temp_table();
    build_table(
        &path,
        &[
            (b"b", IndexEntry::Inline(b"1".to_vec())),
            (b"d", IndexEntry::Inline(b"2".to_vec())),
        ],
    );

    let reader = TableReader::open(&path).unwrap();
    assert_eq!(reader.min_key(), Some(&b"b"[..]));
    assert_eq!(reader.max_key(), Some(&b"d"[..]));
    assert!(!reader.might_contain(b"a"));
    assert!(reader.might_contain(b"c"));
    assert!(!reader.might_contain(b"e"));
}

#[test]
fn test_iter_in_key_order() {
    let (_temp, path) = setup_temp_table();
    build_table(
        &path,
        &[
            (b"a", IndexEntry::Inline(b"1".to_vec())),
            (b"b", IndexEntry::Pointer(ptr(0))),
            (b"c", IndexEntry::Inline(b"3".to_vec())),
        ],
    );

    let reader = TableReader::open(&path).unwrap();
    let items: Vec<(Vec<u8>, IndexEntry)> = reader.iter().map(|item| item.unwrap()).collect();

    assert_eq!(items.len(), 3);
    assert_eq!(items[0], (b"a".to_vec(), IndexEntry::Inline(b"1".to_vec())));
    assert_eq!(items[1], (b"b".to_vec(), IndexEntry::Pointer(ptr(0))));
    assert_eq!(items[2].0, b"c");
}

#[test]
fn test_many_entries() {
    let (_temp, path) = setup_temp_table();
    let mut builder = TableBuilder::new(&path).unwrap();
    for i in 0..1000u64 {
        let key = format!("key{:05}", i);
        builder.add(key.as_bytes(), &IndexEntry::Pointer(ptr(i * 48))).unwrap();
    }
    builder.finish(LogPosition::new(1, 48_000), 1000).unwrap();

    let reader = TableReader::open(&path).unwrap();
    assert_eq!(reader.entry_count(), 1000);
    assert_eq!(reader.get(b"key00500").unwrap(), Some(IndexEntry::Pointer(ptr(500 * 48))));
    assert_eq!(reader.iter().count(), 1000);
}

// =============================================================================
// Publish and Corruption Tests
// =============================================================================

#[test]
fn test_unfinished_table_is_not_visible() {
    let (_temp, path) = setup_temp_table();
    let mut builder = TableBuilder::new(&path).unwrap();
    builder.add(b"k", &IndexEntry::Inline(b"v".to_vec())).unwrap();

    assert!(!path.exists());
    assert!(TableBuilder::tmp_path_for(&path).exists());

    builder.finish(LogPosition::default(), 0).unwrap();
    assert!(path.exists());
    assert!(!TableBuilder::tmp_path_for(&path).exists());
}

#[test]
fn test_flipped_data_byte_detected() {
    let (_temp, path) = setup_temp_table();
    build_table(&path, &[(b"key", IndexEntry::Inline(b"value".to_vec()))]);

    let mut bytes = fs::read(&path).unwrap();
    bytes[20] ^= 0xFF;
    fs::write(&path, bytes).unwrap();

    assert!(matches!(TableReader::open(&path), Err(KvError::Corruption(_))));
}

#[test]
fn test_bad_magic_detected() {
    let (_temp, path) = setup_temp_table();
    build_table(&path, &[(b"key", IndexEntry::Inline(b"value".to_vec()))]);

    let mut bytes = fs::read(&path).unwrap();
    bytes[0] = b'X';
    fs::write(&path, bytes).unwrap();

    assert!(matches!(TableReader::open(&path), Err(KvError::Corruption(_))));
}

#[test]
fn test_truncated_file_detected() {
    let (_temp, path) = setup_temp_table();
    fs::write(&path, b"SKVI").unwrap();

    assert!(matches!(TableReader::open(&path), Err(KvError::Corruption(_))));
}
