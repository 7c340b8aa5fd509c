//! Explicit on-disk schema for fragment stores.
//!
//! Each store `<name>` owns three tables:
//!
//! | Table | Key | Role |
//! |-------|-----|------|
//! | `<name>_records` | `pkey` | primary index, bincode-encoded [`StoredFragment`] |
//! | `<name>_by_id` | `(id, pkey)` | secondary index on fragment id |
//! | `<name>_by_barcodes` | `(barcodes, pkey)` | secondary index on canonical signature |
//!
//! Secondary index tables are clustered on their key so equality scans read
//! contiguous pages, and carry `pkey` as the tie-breaker that cursors page on.
//! Each also has a plain index on `pkey` alone, which an upsert uses to find
//! and drop the index rows of the record it replaces.

use serde::{Deserialize, Serialize};

use super::StoreError;
use crate::core::fragment::FragmentRecord;
use crate::core::group::FragmentGroup;
use crate::core::signature::BarcodeSequence;
use crate::core::types::GenomicLocation;

/// Schema version written to `store_meta`
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Maximum length of a store name
pub const MAX_STORE_NAME_LENGTH: usize = 64;

/// Table names for one store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreTables {
    pub records: String,
    pub by_id: String,
    pub by_barcodes: String,
}

impl StoreTables {
    /// Table names for store `name`, which must be a plain identifier
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Configuration` if `name` is empty, too long, or
    /// contains anything but ASCII letters, digits and underscores.
    pub fn new(name: &str) -> Result<Self, StoreError> {
        validate_store_name(name)?;
        Ok(Self {
            records: format!("{name}_records"),
            by_id: format!("{name}_by_id"),
            by_barcodes: format!("{name}_by_barcodes"),
        })
    }

    /// DDL creating all tables for the store
    #[must_use]
    pub fn create_statements(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {records} (
                pkey TEXT PRIMARY KEY,
                payload BLOB NOT NULL
            ) WITHOUT ROWID;
            CREATE TABLE IF NOT EXISTS {by_id} (
                id TEXT NOT NULL,
                pkey TEXT NOT NULL,
                PRIMARY KEY (id, pkey)
            ) WITHOUT ROWID;
            CREATE TABLE IF NOT EXISTS {by_barcodes} (
                barcodes TEXT NOT NULL,
                pkey TEXT NOT NULL,
                PRIMARY KEY (barcodes, pkey)
            ) WITHOUT ROWID;
            CREATE INDEX IF NOT EXISTS {by_id}_pkey ON {by_id} (pkey);
            CREATE INDEX IF NOT EXISTS {by_barcodes}_pkey ON {by_barcodes} (pkey);",
            records = self.records,
            by_id = self.by_id,
            by_barcodes = self.by_barcodes,
        )
    }
}

fn validate_store_name(name: &str) -> Result<(), StoreError> {
    if name.is_empty() {
        return Err(StoreError::Configuration(
            "Store name must not be empty".to_string(),
        ));
    }
    if name.len() > MAX_STORE_NAME_LENGTH {
        return Err(StoreError::Configuration(format!(
            "Store name exceeds {MAX_STORE_NAME_LENGTH} characters"
        )));
    }
    let valid = name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if !valid {
        return Err(StoreError::Configuration(format!(
            "Invalid store name '{name}': use letters, digits and underscores, not starting with a digit"
        )));
    }
    Ok(())
}

/// Persisted form of a [`FragmentRecord`].
///
/// Layouts are not stored; the decoded signature is, so a record read back
/// never needs to be matched again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFragment {
    pub id: String,
    pub read1_sequence: Option<String>,
    pub read2_sequence: Option<String>,
    pub unpaired_sequence: Option<String>,
    pub location: Option<GenomicLocation>,
    pub barcodes: BarcodeSequence,
    pub group_members: Vec<String>,
    pub barcode_max_mismatches: u32,
}

impl StoredFragment {
    /// Snapshot a record, resolving its signature if it is still lazy
    #[must_use]
    pub fn from_record(record: &FragmentRecord) -> Self {
        Self {
            id: record.id().to_string(),
            read1_sequence: record.read1_sequence().map(str::to_string),
            read2_sequence: record.read2_sequence().map(str::to_string),
            unpaired_sequence: record.unpaired_sequence().map(str::to_string),
            location: record.location().cloned(),
            barcodes: record.barcodes().clone(),
            group_members: record.fragment_group().members().to_vec(),
            barcode_max_mismatches: record.barcode_max_mismatches(),
        }
    }

    #[must_use]
    pub fn into_record(self) -> FragmentRecord {
        let group = FragmentGroup::with_members(self.barcodes.clone(), self.group_members);
        let mut record = FragmentRecord::new(&self.id, self.barcodes)
            .with_reads(self.read1_sequence, self.read2_sequence)
            .with_barcode_max_mismatches(self.barcode_max_mismatches)
            .with_group(group);
        if let Some(sequence) = self.unpaired_sequence {
            record = record.with_unpaired_sequence(sequence);
        }
        if let Some(location) = self.location {
            record = record.with_location(location);
        }
        record
    }

    pub(crate) fn encode(&self, store: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        bincode::serialize(self).map_err(|source| StoreError::Codec {
            store: store.to_string(),
            action: "encode",
            key: key.to_string(),
            source,
        })
    }

    pub(crate) fn decode(bytes: &[u8], store: &str, key: &str) -> Result<Self, StoreError> {
        bincode::deserialize(bytes).map_err(|source| StoreError::Codec {
            store: store.to_string(),
            action: "decode",
            key: key.to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Strand;

    #[test]
    fn test_store_name_validation() {
        assert!(StoreTables::new("sprite_v2").is_ok());
        for bad in ["", "2fast", "drop table", "a-b", "x;--"] {
            assert!(
                matches!(StoreTables::new(bad), Err(StoreError::Configuration(_))),
                "expected '{bad}' to be rejected"
            );
        }
        let long = "a".repeat(MAX_STORE_NAME_LENGTH + 1);
        assert!(StoreTables::new(&long).is_err());
    }

    #[test]
    fn test_table_names() {
        let tables = StoreTables::new("sprite").unwrap();
        assert_eq!(tables.records, "sprite_records");
        assert_eq!(tables.by_id, "sprite_by_id");
        assert_eq!(tables.by_barcodes, "sprite_by_barcodes");
        assert!(tables.create_statements().contains("sprite_by_barcodes"));
    }

    #[test]
    fn test_stored_fragment_restores_record() {
        let barcodes = BarcodeSequence::from_attribute_string("[a][b]").unwrap();
        let mut record = FragmentRecord::new("frag1", barcodes.clone())
            .with_location(GenomicLocation::new("chr1", 5, 50).with_strand(Strand::Positive))
            .with_reads(Some("ACGT".to_string()), None);
        let sibling = FragmentRecord::new("frag2", barcodes)
            .with_location(GenomicLocation::new("chr3", 0, 10));
        record.add_fragment_with_same_barcodes(&sibling).unwrap();

        let stored = StoredFragment::from_record(&record);
        let bytes = stored.encode("s", "k").unwrap();
        let restored = StoredFragment::decode(&bytes, "s", "k").unwrap().into_record();

        assert_eq!(restored, record);
        assert_eq!(restored.primary_key(), "frag1:chr1:5-50");
        assert_eq!(restored.fragment_group().members(), ["frag2:chr3:0-10"]);
    }

    #[test]
    fn test_stored_group_members_survive_restore() {
        let stored = StoredFragment {
            id: "frag1".to_string(),
            read1_sequence: None,
            read2_sequence: None,
            unpaired_sequence: None,
            location: None,
            barcodes: BarcodeSequence::from_attribute_string("[a]").unwrap(),
            group_members: ["frag2", "frag3", "frag2"].map(String::from).to_vec(),
            barcode_max_mismatches: 0,
        };
        let restored = stored.into_record();
        assert_eq!(restored.fragment_group().members(), ["frag2", "frag3"]);
        assert_eq!(restored.fragment_group().barcodes().as_str(), "[a]");
    }

    #[test]
    fn test_decode_garbage_is_codec_error() {
        let result = StoredFragment::decode(&[0xff, 0x01], "s", "k");
        assert!(matches!(result, Err(StoreError::Codec { .. })));
    }
}
