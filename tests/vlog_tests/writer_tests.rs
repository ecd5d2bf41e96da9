//! Tests for the value log writer
//!
//! These tests verify:
//! - Appending records and sequence numbering
//! - Pointers that resolve through the reader
//! - Batched appends
//! - Sync strategies (EveryWrite, EveryNEntries)
//! - Segment rotation

use std::sync::Arc;

use splitkv::config::WalSyncStrategy;
use splitkv::vlog::{LogPosition, ValueLogReader, ValueLogWriter};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_vlog() -> (TempDir, Arc<ValueLogReader>) {
    let temp_dir = TempDir::new().unwrap();
    let reader = Arc::new(ValueLogReader::open(temp_dir.path()).unwrap());
    (temp_dir, reader)
}

fn open_writer(reader: &Arc<ValueLogReader>, strategy: WalSyncStrategy) -> ValueLogWriter {
    ValueLogWriter::open(Arc::clone(reader), strategy, 1024 * 1024, 1).unwrap()
}

// =============================================================================
// Basic Writing Tests
// =============================================================================

#[test]
fn test_open_creates_first_segment() {
    let (temp, reader) = setup_temp_vlog();
    let writer = open_writer(&reader, WalSyncStrategy::EveryWrite);

    assert_eq!(writer.file_id(), 1);
    assert_eq!(writer.head(), LogPosition::new(1, 0));
    assert!(temp.path().join("vlog_000001.log").exists());
    assert_eq!(reader.segment_ids(), vec![1]);
}

#[test]
fn test_append_and_read_back() {
    let (_temp, reader) = setup_temp_vlog();
    let mut writer = open_writer(&reader, WalSyncStrategy::EveryWrite);

    let (seq, ptr) = writer.append(b"key1", b"value1").unwrap();
    assert_eq!(seq, 1);
    assert_eq!(ptr.file_id, 1);
    assert_eq!(ptr.offset, 0);

    let record = reader.read(ptr).unwrap();
    assert_eq!(record.seq, 1);
    assert_eq!(record.key, b"key1");
    assert_eq!(record.value, b"value1");
}

#[test]
fn test_sequence_numbers_increase() {
    let (_temp, reader) = setup_temp_vlog();
    let mut writer = open_writer(&reader, WalSyncStrategy::EveryWrite);

    for i in 1..=50u64 {
        let (seq, _) = writer.append(format!("k{}", i).as_bytes(), b"v").unwrap();
        assert_eq!(seq, i);
    }
    assert_eq!(writer.last_seq(), 50);
    assert_eq!(writer.current_seq(), 51);
}

#[test]
fn test_pointers_are_contiguous() {
    let (_temp, reader) = setup_temp_vlog();
    let mut writer = open_writer(&reader, WalSyncStrategy::EveryWrite);

    let (_, first) = writer.append(b"a", b"1").unwrap();
    let (_, second) = writer.append(b"b", b"22").unwrap();

    assert_eq!(second.offset, first.offset + first.len as u64);
    assert_eq!(writer.head().offset, second.offset + second.len as u64);
}

// =============================================================================
// Batch Tests
// =============================================================================

#[test]
fn test_append_batch() {
    let (_temp, reader) = setup_temp_vlog();
    let mut writer = open_writer(&reader, WalSyncStrategy::EveryWrite);

    let entries = vec![
        (b"a".to_vec(), b"1".to_vec()),
        (b"b".to_vec(), b"2".to_vec()),
        (b"a".to_vec(), b"3".to_vec()),
    ];
    let written = writer.append_batch(&entries).unwrap();

    assert_eq!(written.len(), 3);
    let seqs: Vec<u64> = written.iter().map(|(seq, _)| *seq).collect();
    assert_eq!(seqs, vec![1, 2, 3]);

    let last = reader.read(written[2].1).unwrap();
    assert_eq!(last.key, b"a");
    assert_eq!(last.value, b"3");
}

#[test]
fn test_empty_batch_writes_nothing() {
    let (_temp, reader) = setup_temp_vlog();
    let mut writer = open_writer(&reader, WalSyncStrategy::EveryWrite);

    let empty: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
    assert!(writer.append_batch(&empty).unwrap().is_empty());
    assert_eq!(writer.head().offset, 0);
    assert_eq!(writer.current_seq(), 1);
}

// =============================================================================
// Sync Strategy Tests
// =============================================================================

#[test]
fn test_sync_every_write() {
    let (_temp, reader) = setup_temp_vlog();
    let mut writer = open_writer(&reader, WalSyncStrategy::EveryWrite);

    writer.append(b"k", b"v").unwrap();
    assert_eq!(writer.uncommitted_count(), 0);
}

#[test]
fn test_sync_every_n_entries() {
    let (_temp, reader) = setup_temp_vlog();
    let mut writer = open_writer(&reader, WalSyncStrategy::EveryNEntries { count: 3 });

    writer.append(b"a", b"1").unwrap();
    writer.append(b"b", b"2").unwrap();
    assert_eq!(writer.uncommitted_count(), 2);

    writer.append(b"c", b"3").unwrap();
    assert_eq!(writer.uncommitted_count(), 0);

    writer.append(b"d", b"4").unwrap();
    writer.sync().unwrap();
    assert_eq!(writer.uncommitted_count(), 0);
}

// =============================================================================
// Rotation and Reopen Tests
// =============================================================================

#[test]
fn test_rotation_creates_new_segment() {
    let (_temp, reader) = setup_temp_vlog();
    let mut writer =
        ValueLogWriter::open(Arc::clone(&reader), WalSyncStrategy::EveryWrite, 64, 1).unwrap();

    let (_, first) = writer.append(b"key", &[7u8; 100]).unwrap();
    let (_, second) = writer.append(b"key", &[8u8; 10]).unwrap();

    assert_eq!(first.file_id, 1);
    assert_eq!(second.file_id, 2);
    assert_eq!(second.offset, 0);
    assert_eq!(reader.segment_ids(), vec![1, 2]);

    // Both segments stay readable
    assert_eq!(reader.read(first).unwrap().value, vec![7u8; 100]);
    assert_eq!(reader.read(second).unwrap().value, vec![8u8; 10]);
}

#[test]
fn test_reopen_appends_to_last_segment() {
    let (temp, reader) = setup_temp_vlog();
    let head = {
        let mut writer = open_writer(&reader, WalSyncStrategy::EveryWrite);
        writer.append(b"a", b"1").unwrap();
        writer.head()
    };

    let reader = Arc::new(ValueLogReader::open(temp.path()).unwrap());
    let mut writer = ValueLogWriter::open(Arc::clone(&reader), WalSyncStrategy::EveryWrite, 1024, 2).unwrap();

    assert_eq!(writer.head(), head);
    let (seq, ptr) = writer.append(b"b", b"2").unwrap();
    assert_eq!(seq, 2);
    assert_eq!(ptr.offset, head.offset);
}
