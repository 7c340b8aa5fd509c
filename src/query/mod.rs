//! Window-to-barcode join queries.
//!
//! A query resolves a genomic window to the alignments inside it, reads the
//! barcode signature each alignment carries in its `XB` tag, and returns one
//! cursor over every stored fragment sharing any of those signatures.
//!
//! ```text
//! region ──► AlignmentSource::overlapping ──► {signatures} ──► one cursor per signature
//!                                                               └──► JoinedCursor
//! ```

pub mod alignments;
pub mod engine;
pub mod region;

pub use alignments::{
    read_alignments, AlignmentError, AlignmentFile, AlignmentSource, IndexedBamAlignments,
    MemoryAlignments,
};
pub use engine::JoinQueryEngine;
pub use region::{GenomicRegion, OverlapMode};
