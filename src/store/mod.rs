//! Durable, indexed storage for barcoded fragments.
//!
//! A [`StoreEnvironment`] owns one embedded SQLite database in an environment
//! home directory. Any number of named [`FragmentStore`]s live inside an
//! environment; each keeps one primary table keyed by
//! `id:reference:start-end` and two secondary index tables, one on fragment
//! id and one on the canonical barcode signature. Index rows are written by
//! explicit code in the same transaction as the record they point to.
//!
//! All multi-record reads return cursors. Cursors page through their index in
//! bounded batches, so advancing one may block on I/O. A cursor is released
//! when it is closed or dropped; the store counts open cursors so callers can
//! check that nothing leaked.
//!
//! ## Example
//!
//! ```rust,no_run
//! use barcode_join::core::fragment::FragmentRecord;
//! use barcode_join::core::signature::BarcodeSequence;
//! use barcode_join::core::types::GenomicLocation;
//! use barcode_join::store::{EnvironmentConfig, FragmentStore, StoreEnvironment};
//! use std::path::Path;
//!
//! let env = StoreEnvironment::open(Path::new("fragments_env"), EnvironmentConfig::default()).unwrap();
//! let store = FragmentStore::open(&env, "sprite").unwrap();
//!
//! let barcodes = BarcodeSequence::from_attribute_string("[DPM6B3][Y10]").unwrap();
//! let record = FragmentRecord::new("read1", barcodes.clone())
//!     .with_location(GenomicLocation::new("chr1", 100, 250));
//! store.put(&record).unwrap();
//!
//! for fragment in store.get_by_barcode_signature(barcodes.as_str()).unwrap() {
//!     println!("{}", fragment.unwrap().primary_key());
//! }
//! ```

pub mod cursor;
pub mod environment;
pub mod fragments;
pub mod schema;

use std::path::PathBuf;
use thiserror::Error;

use crate::query::alignments::AlignmentError;

pub use cursor::{FragmentCursor, JoinedCursor, RecordCursor};
pub use environment::{EnvironmentConfig, StoreEnvironment};
pub use fragments::{FragmentStore, SignatureIndex};

/// Errors from the indexed store and the queries that run against it
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Failed to {action} environment {}: {source}", path.display())]
    Resource {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("Store '{store}' in {}: {operation} failed for key '{key}': {source}", path.display())]
    Engine {
        path: PathBuf,
        store: String,
        operation: &'static str,
        key: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Store '{store}': failed to {action} record '{key}': {source}")]
    Codec {
        store: String,
        action: &'static str,
        key: String,
        #[source]
        source: bincode::Error,
    },
}

/// Errors that leave the store usable
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Malformed region '{0}': expected reference or reference:start-end")]
    MalformedRegion(String),

    #[error("Store '{store}' has no {index} index")]
    MissingIndex { store: String, index: &'static str },

    #[error("Alignment source error: {0}")]
    Alignment(#[from] AlignmentError),
}

impl From<AlignmentError> for StoreError {
    fn from(err: AlignmentError) -> Self {
        Self::Query(QueryError::Alignment(err))
    }
}
