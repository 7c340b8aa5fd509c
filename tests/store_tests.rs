//! Store and Join Integration Tests
//!
//! These tests drive a real on-disk environment: fragments are written,
//! the environment is closed and reopened, and window joins run against the
//! stored signature index.

use barcode_join::core::alignment::AlignmentRecord;
use barcode_join::core::fragment::FragmentRecord;
use barcode_join::core::signature::BarcodeSequence;
use barcode_join::core::types::GenomicLocation;
use barcode_join::query::{GenomicRegion, JoinQueryEngine, MemoryAlignments, OverlapMode};
use barcode_join::store::{EnvironmentConfig, FragmentCursor, FragmentStore, StoreEnvironment, StoreError};
use std::collections::BTreeSet;
use tempfile::TempDir;

fn signature(text: &str) -> BarcodeSequence {
    BarcodeSequence::from_attribute_string(text).unwrap()
}

fn fragment(id: &str, barcodes: &str, reference: &str, start: u64) -> FragmentRecord {
    FragmentRecord::new(id, signature(barcodes))
        .with_location(GenomicLocation::new(reference, start, start + 75))
}

fn aligned(id: &str, barcodes: &str, start: u64) -> AlignmentRecord {
    AlignmentRecord::new(id)
        .with_location(GenomicLocation::new("chr1", start, start + 75))
        .with_barcodes(barcodes)
}

/// Records survive closing and reopening the environment read-only
#[test]
fn test_records_persist_across_reopen() {
    let dir = TempDir::new().unwrap();
    let record = fragment("frag1", "[DPM6B3][Y10]", "chr2", 1000)
        .with_reads(Some("ACGTACGT".to_string()), Some("TTGGCCAA".to_string()));

    {
        let env = StoreEnvironment::open(dir.path(), EnvironmentConfig::default()).unwrap();
        let store = FragmentStore::open(&env, "sprite").unwrap();
        for _ in 0..3 {
            store.put(&record).unwrap();
        }
        drop(store);
        env.close().unwrap();
    }

    let env = StoreEnvironment::open(dir.path(), EnvironmentConfig::read_only()).unwrap();
    let store = FragmentStore::open(&env, "sprite").unwrap();
    let found: Vec<FragmentRecord> = store
        .get_by_id("frag1")
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id(), record.id());
    assert_eq!(found[0].location(), record.location());
    assert_eq!(found[0].barcodes(), record.barcodes());
    assert_eq!(found[0].read2_sequence(), Some("TTGGCCAA"));
}

/// N records sharing one signature come back from one signature scan
#[test]
fn test_many_records_one_signature() {
    let dir = TempDir::new().unwrap();
    let env = StoreEnvironment::open(
        dir.path(),
        EnvironmentConfig::default().with_cursor_batch_size(4),
    )
    .unwrap();
    let store = FragmentStore::open(&env, "sprite").unwrap();

    let records: Vec<FragmentRecord> = (0..25)
        .map(|i| fragment(&format!("read{i}"), "[A][B][C]", "chr1", i * 100))
        .collect();
    store.put_batch(&records).unwrap();
    store.put(&fragment("loner", "[A][B]", "chr1", 0)).unwrap();

    let ids: BTreeSet<String> = store
        .get_by_barcode_signature("[A][B][C]")
        .unwrap()
        .map(|record| record.unwrap().id().to_string())
        .collect();
    assert_eq!(ids.len(), 25);
    assert!(!ids.contains("loner"));
    assert_eq!(store.open_cursor_count(), 0);
}

/// A window join over alignments with signatures {A, B, A, C} scans three
/// signatures and returns their union
#[test]
fn test_window_join_against_store() {
    let dir = TempDir::new().unwrap();
    let env = StoreEnvironment::open(dir.path(), EnvironmentConfig::default()).unwrap();
    let store = FragmentStore::open(&env, "sprite").unwrap();

    let stored = vec![
        fragment("a1", "[A]", "chr1", 100),
        fragment("a2", "[A]", "chr5", 9000),
        fragment("b1", "[B]", "chr3", 50),
        fragment("c1", "[C]", "chrX", 7),
        fragment("d1", "[D]", "chr1", 100),
    ];
    store.put_batch(&stored).unwrap();

    let alignments = MemoryAlignments::from_records(vec![
        aligned("x1", "[A]", 100),
        aligned("x2", "[B]", 150),
        aligned("x3", "[A]", 200),
        aligned("x4", "[C]", 250),
        aligned("x5", "[D]", 90_000),
    ]);
    let engine = JoinQueryEngine::new(&store, &alignments);

    let region = GenomicRegion::parse("chr1:0-1000").unwrap();
    let cursor = engine
        .fragments_in_window(&region, OverlapMode::Overlapping)
        .unwrap()
        .expect("window has alignments");
    assert_eq!(store.open_cursor_count(), 3);

    let keys: Vec<String> = cursor
        .map(|record| record.unwrap().primary_key())
        .collect();
    assert_eq!(
        keys,
        [
            "a1:chr1:100-175",
            "a2:chr5:9000-9075",
            "b1:chr3:50-125",
            "c1:chrX:7-82"
        ]
    );
    assert_eq!(store.open_cursor_count(), 0);

    let empty = GenomicRegion::parse("chr1:5000-6000").unwrap();
    assert!(engine
        .fragments_in_window(&empty, OverlapMode::Overlapping)
        .unwrap()
        .is_none());
}

/// Closing the joined cursor early releases every signature cursor
#[test]
fn test_abandoned_join_releases_cursors() {
    let dir = TempDir::new().unwrap();
    let env = StoreEnvironment::open(dir.path(), EnvironmentConfig::default()).unwrap();
    let store = FragmentStore::open(&env, "sprite").unwrap();
    store
        .put_batch(&[
            fragment("a1", "[A]", "chr1", 0),
            fragment("a2", "[A]", "chr1", 10),
            fragment("b1", "[B]", "chr1", 20),
        ])
        .unwrap();

    let alignments = MemoryAlignments::from_records(vec![
        aligned("x1", "[A]", 0),
        aligned("x2", "[B]", 20),
    ]);
    let engine = JoinQueryEngine::new(&store, &alignments);
    let mut cursor = engine.query_reference("chr1").unwrap().unwrap();

    assert!(cursor.next().unwrap().is_ok());
    assert_eq!(store.open_cursor_count(), 2);
    cursor.close();
    assert_eq!(store.open_cursor_count(), 0);
}

/// Cache size can change without reopening; bad percentages are rejected
#[test]
fn test_cache_percent_adjustable() {
    let dir = TempDir::new().unwrap();
    let config = EnvironmentConfig::default().with_available_memory(1 << 30);
    let env = StoreEnvironment::open(dir.path(), config).unwrap();

    let small = env.cache_size_bytes();
    let large = env.set_cache_percent(50).unwrap();
    assert!(large > small);
    assert_eq!(env.cache_percent(), 50);

    assert!(matches!(
        env.set_cache_percent(0),
        Err(StoreError::Configuration(_))
    ));
    assert_eq!(env.cache_percent(), 50);
}

/// Opening a read-only environment that was never created fails cleanly
#[test]
fn test_read_only_missing_environment() {
    let dir = TempDir::new().unwrap();
    let result = StoreEnvironment::open(&dir.path().join("absent"), EnvironmentConfig::read_only());
    assert!(matches!(result, Err(StoreError::Configuration(_))));
}
