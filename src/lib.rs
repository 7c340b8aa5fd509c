//! # barcode-join
//!
//! Barcode-based record linkage for split-pool barcoded sequencing.
//!
//! Every fragment in a split-pool experiment carries a combinatorial barcode
//! signature written into fixed positions of its reads. Fragments that share a
//! signature came from the same complex. `barcode-join` decodes those
//! signatures, stores fragments durably with indices on identity and on
//! signature, and answers the question "which fragments share a barcode
//! signature with anything aligned in this window?"
//!
//! ## Features
//!
//! - **Layout matching**: Decodes barcodes from reads against a JSON layout of
//!   fixed sequences, barcodes, barcode sets and spacers, tolerating mismatches
//! - **Indexed storage**: SQLite-backed store with primary, id and signature
//!   indices and paged cursors
//! - **Window joins**: Resolves a genomic window to signatures through an
//!   alignment source, then streams every fragment sharing one
//!
//! ## Example
//!
//! ```rust,no_run
//! use barcode_join::query::{AlignmentFile, GenomicRegion, JoinQueryEngine, OverlapMode};
//! use barcode_join::store::{EnvironmentConfig, FragmentStore, StoreEnvironment};
//! use std::path::Path;
//!
//! let env = StoreEnvironment::open(Path::new("db"), EnvironmentConfig::read_only()).unwrap();
//! let store = FragmentStore::open(&env, "fragments").unwrap();
//! let alignments = AlignmentFile::open(Path::new("sample.bam")).unwrap();
//!
//! let engine = JoinQueryEngine::new(&store, &alignments);
//! let region = GenomicRegion::parse("chr1:1000000-1100000").unwrap();
//! if let Some(fragments) = engine.fragments_in_window(&region, OverlapMode::Overlapping).unwrap() {
//!     for fragment in fragments {
//!         println!("{}", fragment.unwrap().primary_key());
//!     }
//! };
//! ```
//!
//! ## Modules
//!
//! - [`core`]: Barcodes, signatures, fragment groups and fragment records
//! - [`layout`]: Read layouts and the barcode matcher
//! - [`store`]: Database environment, fragment stores and cursors
//! - [`query`]: Alignment sources and the window join engine
//! - [`cli`]: Command-line interface implementation

pub mod cli;
pub mod core;
pub mod layout;
pub mod query;
pub mod store;

// Re-export commonly used types for convenience
pub use core::fragment::FragmentRecord;
pub use core::group::FragmentGroup;
pub use core::signature::{Barcode, BarcodeSequence};
pub use core::types::*;
pub use layout::{match_layout, LayoutMatch, ReadLayout, ReadSequenceElement};
pub use query::{GenomicRegion, JoinQueryEngine, OverlapMode};
pub use store::{FragmentStore, StoreEnvironment, StoreError};
