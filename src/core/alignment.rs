use serde::{Deserialize, Serialize};

use crate::core::types::{GenomicLocation, Strand};

/// SAM tag carrying the canonical barcode signature of an aligned read
pub const BARCODES_SAM_TAG: [u8; 2] = *b"XB";

/// An aligned read as seen by this crate.
///
/// Alignment parsing lives outside the crate; this is the minimal view the
/// fragment model and the join engine need from an alignment record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignmentRecord {
    /// Full read name as written by the aligner
    pub read_name: String,

    /// Mapped location, `None` for unmapped reads
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GenomicLocation>,

    /// Read is one segment of a pair
    #[serde(default)]
    pub paired: bool,

    /// First segment of a pair
    #[serde(default)]
    pub first_of_pair: bool,

    /// Last segment of a pair
    #[serde(default)]
    pub second_of_pair: bool,

    /// Read bases as stored in the alignment
    #[serde(default)]
    pub sequence: String,

    /// Canonical barcode signature attached by the barcoding step (`XB` tag)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub barcodes: Option<String>,
}

impl AlignmentRecord {
    pub fn new(read_name: impl Into<String>) -> Self {
        Self {
            read_name: read_name.into(),
            location: None,
            paired: false,
            first_of_pair: false,
            second_of_pair: false,
            sequence: String::new(),
            barcodes: None,
        }
    }

    #[must_use]
    pub fn with_location(mut self, location: GenomicLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_sequence(mut self, sequence: impl Into<String>) -> Self {
        self.sequence = sequence.into();
        self
    }

    pub fn with_barcodes(mut self, barcodes: impl Into<String>) -> Self {
        self.barcodes = Some(barcodes.into());
        self
    }

    /// Mark as one segment of a pair
    #[must_use]
    pub fn with_pair_segment(mut self, first: bool) -> Self {
        self.paired = true;
        self.first_of_pair = first;
        self.second_of_pair = !first;
        self
    }
}

/// Strand of the originating fragment given the flags of one of its reads.
///
/// Read 2 defines the fragment strand, so a first-of-pair read is flipped.
#[must_use]
pub fn fragment_strand(reverse_complemented: bool, paired: bool, first_of_pair: bool) -> Strand {
    let strand = if reverse_complemented {
        Strand::Negative
    } else {
        Strand::Positive
    };
    if paired && first_of_pair {
        strand.reverse()
    } else {
        strand
    }
}
