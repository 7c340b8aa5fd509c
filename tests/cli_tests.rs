//! Command-Line Integration Tests
//!
//! These tests run the `barcode-join` binary end to end: barcoded SAM files
//! are loaded into a scratch environment and queried back, and FASTQ reads
//! are decoded against JSON layouts.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const BARCODED_SAM: &str = "@HD\tVN:1.6\tSO:coordinate\n\
@SQ\tSN:chr1\tLN:10000\n\
@SQ\tSN:chr2\tLN:10000\n\
r1\t0\tchr1\t101\t60\t10M\t*\t0\t0\tACGTACGTAC\t*\tXB:Z:[A][B]\n\
r2\t0\tchr1\t201\t60\t10M\t*\t0\t0\tACGTACGTAC\t*\tXB:Z:[C]\n\
r3\t0\tchr2\t5001\t60\t10M\t*\t0\t0\tACGTACGTAC\t*\tXB:Z:[A][B]\n\
r4\t0\tchr2\t6001\t60\t10M\t*\t0\t0\tACGTACGTAC\t*\n";

const LAYOUT: &str = r#"{
  "elements": [
    {"type": "fixed_sequence", "name": "stub", "sequence": "ACGT"},
    {"type": "barcode_set", "name": "round1", "max_mismatches": 1,
     "barcodes": [{"id": "b1", "sequence": "AAAA"}, {"id": "b2", "sequence": "TTTT"}]}
  ]
}"#;

const READS: &str = "@q1 1:N:0\nACGTAATA\n+\nIIIIIIII\n\
@q2 1:N:0\nACGTTTTT\n+\nIIIIIIII\n\
@q3 1:N:0\nGGGGAAAA\n+\nIIIIIIII\n";

fn barcode_join() -> Command {
    Command::cargo_bin("barcode-join").unwrap()
}

fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

/// Write the barcoded SAM and load it into `<dir>/env`
fn loaded_environment(dir: &Path) -> (PathBuf, PathBuf) {
    let sam = write_file(dir, "barcoded.sam", BARCODED_SAM);
    let env = dir.join("env");
    barcode_join()
        .args(["load", "--env"])
        .arg(&env)
        .arg(&sam)
        .assert()
        .success()
        .stdout(predicate::str::contains("Loaded 3 fragments"))
        .stderr(predicate::str::contains("skipped 1 alignments"));
    (env, sam)
}

/// Loading commits as it reads; every batch lands in the store
#[test]
fn test_load_in_single_record_batches() {
    let dir = TempDir::new().unwrap();
    let sam = write_file(dir.path(), "barcoded.sam", BARCODED_SAM);
    let env = dir.path().join("env");

    barcode_join()
        .args(["load", "--batch-size", "1", "--format", "tsv", "--env"])
        .arg(&env)
        .arg(&sam)
        .assert()
        .success()
        .stdout(predicate::str::contains("fragments\t3\t1\t3"));

    barcode_join()
        .args(["lookup", "--barcodes", "[A][B]", "--env"])
        .arg(&env)
        .assert()
        .success()
        .stdout(predicate::str::contains("r1:chr1:100-110"))
        .stdout(predicate::str::contains("r3:chr2:5000-5010"));
}

/// Loading then querying a window returns fragments sharing its signatures
#[test]
fn test_load_and_query_window() {
    let dir = TempDir::new().unwrap();
    let (env, sam) = loaded_environment(dir.path());

    barcode_join()
        .args(["query", "--env"])
        .arg(&env)
        .arg("--alignments")
        .arg(&sam)
        .arg("chr1:0-150")
        .assert()
        .success()
        .stdout(predicate::str::contains("r1:chr1:100-110\t[A][B]"))
        .stdout(predicate::str::contains("r3:chr2:5000-5010\t[A][B]"))
        .stdout(predicate::str::contains("r2:chr1").not());
}

/// A window with no alignments exits cleanly with an explicit message
#[test]
fn test_query_empty_window() {
    let dir = TempDir::new().unwrap();
    let (env, sam) = loaded_environment(dir.path());

    barcode_join()
        .args(["query", "--env"])
        .arg(&env)
        .arg("--alignments")
        .arg(&sam)
        .arg("chr1:8000-9000")
        .assert()
        .success()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("No alignments overlap"));
}

/// Malformed regions are rejected with a non-zero exit
#[test]
fn test_query_malformed_region() {
    let dir = TempDir::new().unwrap();
    let (env, sam) = loaded_environment(dir.path());

    barcode_join()
        .args(["query", "--env"])
        .arg(&env)
        .arg("--alignments")
        .arg(&sam)
        .arg("chr1:900-100")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Malformed region"));
}

/// Lookup by signature with JSON output
#[test]
fn test_lookup_by_signature_json() {
    let dir = TempDir::new().unwrap();
    let (env, _) = loaded_environment(dir.path());

    let output = barcode_join()
        .args(["lookup", "--format", "json", "--barcodes", "[A][B]", "--env"])
        .arg(&env)
        .output()
        .unwrap();
    assert!(output.status.success());

    let fragments: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let fragments = fragments.as_array().unwrap();
    assert_eq!(fragments.len(), 2);
    assert_eq!(fragments[0]["primary_key"], "r1:chr1:100-110");
    assert_eq!(fragments[0]["num_barcodes"], 2);
    assert_eq!(fragments[1]["id"], "r3");
}

/// Lookup by id finds the fragment; an unknown id reports nothing found
#[test]
fn test_lookup_by_id() {
    let dir = TempDir::new().unwrap();
    let (env, _) = loaded_environment(dir.path());

    barcode_join()
        .args(["lookup", "--id", "r2", "--env"])
        .arg(&env)
        .assert()
        .success()
        .stdout(predicate::str::contains("r2:chr1:200-210\t[C]"));

    barcode_join()
        .args(["lookup", "--id", "nope", "--env"])
        .arg(&env)
        .assert()
        .success()
        .stderr(predicate::str::contains("No matching fragments"));
}

/// Lookup against an environment that does not exist fails
#[test]
fn test_lookup_missing_environment() {
    let dir = TempDir::new().unwrap();
    barcode_join()
        .args(["lookup", "--all", "--env"])
        .arg(dir.path().join("missing"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("read-only environments must already exist"));
}

/// Stores are listed with their sizes and can be removed
#[test]
fn test_list_and_remove_stores() {
    let dir = TempDir::new().unwrap();
    let (env, _) = loaded_environment(dir.path());

    barcode_join()
        .args(["stores", "--format", "tsv", "--env"])
        .arg(&env)
        .assert()
        .success()
        .stdout(predicate::str::contains("fragments\t3"));

    barcode_join()
        .args(["stores", "--remove", "fragments", "--env"])
        .arg(&env)
        .assert()
        .success()
        .stderr(predicate::str::contains("Removed store 'fragments'"))
        .stdout(predicate::str::contains("fragments").not());
}

/// Decoding FASTQ reads against a layout prints one signature per read
#[test]
fn test_decode_fastq() {
    let dir = TempDir::new().unwrap();
    let reads = write_file(dir.path(), "r1.fastq", READS);
    let layout = write_file(dir.path(), "r1.json", LAYOUT);

    barcode_join()
        .arg("decode")
        .arg("--read1")
        .arg(&reads)
        .arg("--layout1")
        .arg(&layout)
        .assert()
        .success()
        .stdout(predicate::str::contains("q1\t[b1]"))
        .stdout(predicate::str::contains("q2\t[b2]"))
        .stdout(predicate::str::contains("q3\t-"));
}

/// Decoded fragments can be written straight into a store
#[test]
fn test_decode_into_store() {
    let dir = TempDir::new().unwrap();
    let reads = write_file(dir.path(), "r1.fastq", READS);
    let layout = write_file(dir.path(), "r1.json", LAYOUT);
    let env = dir.path().join("env");

    barcode_join()
        .arg("decode")
        .arg("--read1")
        .arg(&reads)
        .arg("--layout1")
        .arg(&layout)
        .arg("--env")
        .arg(&env)
        .assert()
        .success()
        .stderr(predicate::str::contains("Wrote 3 fragments"));

    barcode_join()
        .args(["lookup", "--barcodes", "[b2]", "--env"])
        .arg(&env)
        .assert()
        .success()
        .stdout(predicate::str::contains("q2\t[b2]"));
}

/// A missing layout file is reported
#[test]
fn test_decode_missing_layout() {
    let dir = TempDir::new().unwrap();
    let reads = write_file(dir.path(), "r1.fastq", READS);

    barcode_join()
        .arg("decode")
        .arg("--read1")
        .arg(&reads)
        .arg("--layout1")
        .arg(dir.path().join("absent.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load layout"));
}
