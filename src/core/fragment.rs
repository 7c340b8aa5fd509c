use std::cmp::Ordering;
use std::sync::{Arc, OnceLock};
use thiserror::Error;

use crate::core::alignment::AlignmentRecord;
use crate::core::group::{FragmentGroup, GroupError};
use crate::core::signature::{BarcodeSequence, SignatureParseError};
use crate::core::types::GenomicLocation;
use crate::layout::matcher::{extract_signature, HammingMatcher, LayoutMatcher};
use crate::layout::ReadLayout;

#[derive(Error, Debug)]
pub enum FragmentError {
    #[error("Alignment {0} has no barcode signature attribute")]
    MissingBarcodes(String),

    #[error(transparent)]
    Signature(#[from] SignatureParseError),
}

/// Fragment id from a read name: everything before the first whitespace
#[must_use]
pub fn fragment_id(read_name: &str) -> &str {
    read_name.split_whitespace().next().unwrap_or("")
}

/// Primary store key for a fragment: `id:reference:start-end`, or the bare id
/// for a fragment with no mapped location
#[must_use]
pub fn primary_key(id: &str, location: Option<&GenomicLocation>) -> String {
    match location {
        Some(loc) => format!("{id}:{}:{}-{}", loc.reference, loc.start, loc.end),
        None => id.to_string(),
    }
}

/// A barcoded sequencing fragment.
///
/// The barcode signature is either supplied at construction or decoded lazily
/// from the read sequences on first access. Once set it never changes; the
/// decoded value is memoized so the matcher runs at most once per record.
#[derive(Debug, Clone)]
pub struct FragmentRecord {
    id: String,
    read1_sequence: Option<String>,
    read2_sequence: Option<String>,
    unpaired_sequence: Option<String>,
    location: Option<GenomicLocation>,
    read1_layout: Option<Arc<ReadLayout>>,
    read2_layout: Option<Arc<ReadLayout>>,
    barcode_max_mismatches: u32,
    barcodes: OnceLock<BarcodeSequence>,
    group: OnceLock<FragmentGroup>,
}

impl FragmentRecord {
    /// A fragment with known barcodes
    pub fn new(read_name: impl AsRef<str>, barcodes: BarcodeSequence) -> Self {
        Self {
            group: OnceLock::from(FragmentGroup::new(barcodes.clone())),
            barcodes: OnceLock::from(barcodes),
            ..Self::empty(fragment_id(read_name.as_ref()))
        }
    }

    /// A fragment whose barcodes are decoded from `read1`/`read2` on first access.
    ///
    /// The mismatch tolerance recorded on the fragment is the largest barcode
    /// budget of the two layouts.
    pub fn from_reads(
        read_name: impl AsRef<str>,
        read1: Option<String>,
        read2: Option<String>,
        read1_layout: Option<Arc<ReadLayout>>,
        read2_layout: Option<Arc<ReadLayout>>,
    ) -> Self {
        let barcode_max_mismatches = read1_layout
            .iter()
            .chain(read2_layout.iter())
            .map(|layout| layout.barcode_max_mismatches())
            .max()
            .unwrap_or(0);

        Self {
            read1_sequence: read1,
            read2_sequence: read2,
            read1_layout,
            read2_layout,
            barcode_max_mismatches,
            ..Self::empty(fragment_id(read_name.as_ref()))
        }
    }

    /// Build from an alignment whose barcodes were attached upstream.
    ///
    /// The read sequence lands in the read 1, read 2 or unpaired slot according
    /// to the pairing flags.
    ///
    /// # Errors
    ///
    /// Returns `FragmentError::MissingBarcodes` if the alignment has no
    /// signature attribute, or `FragmentError::Signature` if it does not parse.
    pub fn from_alignment(alignment: &AlignmentRecord) -> Result<Self, FragmentError> {
        let attribute = alignment
            .barcodes
            .as_deref()
            .ok_or_else(|| FragmentError::MissingBarcodes(alignment.read_name.clone()))?;
        let barcodes = BarcodeSequence::from_attribute_string(attribute)?;

        let mut record = Self::new(&alignment.read_name, barcodes);
        let sequence = Some(alignment.sequence.clone());
        if alignment.paired {
            if alignment.first_of_pair {
                record.read1_sequence = sequence;
            } else if alignment.second_of_pair {
                record.read2_sequence = sequence;
            }
        } else {
            record.unpaired_sequence = sequence;
        }
        record.location.clone_from(&alignment.location);
        Ok(record)
    }

    fn empty(id: &str) -> Self {
        Self {
            id: id.to_string(),
            read1_sequence: None,
            read2_sequence: None,
            unpaired_sequence: None,
            location: None,
            read1_layout: None,
            read2_layout: None,
            barcode_max_mismatches: 0,
            barcodes: OnceLock::new(),
            group: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn with_location(mut self, location: GenomicLocation) -> Self {
        self.location = Some(location);
        self
    }

    #[must_use]
    pub fn with_reads(mut self, read1: Option<String>, read2: Option<String>) -> Self {
        self.read1_sequence = read1;
        self.read2_sequence = read2;
        self
    }

    #[must_use]
    pub fn with_unpaired_sequence(mut self, sequence: String) -> Self {
        self.unpaired_sequence = Some(sequence);
        self
    }

    #[must_use]
    pub fn with_barcode_max_mismatches(mut self, max_mismatches: u32) -> Self {
        self.barcode_max_mismatches = max_mismatches;
        self
    }

    /// Replace the group with one restored from storage
    pub(crate) fn with_group(mut self, group: FragmentGroup) -> Self {
        self.group = OnceLock::from(group);
        self
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn read1_sequence(&self) -> Option<&str> {
        self.read1_sequence.as_deref()
    }

    #[must_use]
    pub fn read2_sequence(&self) -> Option<&str> {
        self.read2_sequence.as_deref()
    }

    #[must_use]
    pub fn unpaired_sequence(&self) -> Option<&str> {
        self.unpaired_sequence.as_deref()
    }

    #[must_use]
    pub fn location(&self) -> Option<&GenomicLocation> {
        self.location.as_ref()
    }

    #[must_use]
    pub fn read1_layout(&self) -> Option<&ReadLayout> {
        self.read1_layout.as_deref()
    }

    #[must_use]
    pub fn read2_layout(&self) -> Option<&ReadLayout> {
        self.read2_layout.as_deref()
    }

    /// Mismatch tolerance used when decoding barcodes
    #[must_use]
    pub fn barcode_max_mismatches(&self) -> u32 {
        self.barcode_max_mismatches
    }

    /// Primary store key (`id:reference:start-end`)
    #[must_use]
    pub fn primary_key(&self) -> String {
        primary_key(&self.id, self.location.as_ref())
    }

    /// Barcode signature, decoding it with the default matcher if necessary
    pub fn barcodes(&self) -> &BarcodeSequence {
        self.barcodes_with(&HammingMatcher)
    }

    /// Barcode signature, decoding it with `matcher` if it has not been set yet.
    ///
    /// Later calls return the memoized value without consulting any matcher.
    pub fn barcodes_with(&self, matcher: &dyn LayoutMatcher) -> &BarcodeSequence {
        self.barcodes.get_or_init(|| {
            extract_signature(
                matcher,
                self.read1_sequence
                    .as_deref()
                    .zip(self.read1_layout.as_deref()),
                self.read2_sequence
                    .as_deref()
                    .zip(self.read2_layout.as_deref()),
            )
        })
    }

    /// True once the signature is known, without triggering decoding
    #[must_use]
    pub fn has_barcodes(&self) -> bool {
        self.barcodes.get().is_some()
    }

    #[must_use]
    pub fn num_barcodes(&self) -> usize {
        self.barcodes().num_barcodes()
    }

    /// Group of fragments sharing this fragment's signature
    pub fn fragment_group(&self) -> &FragmentGroup {
        self.group
            .get_or_init(|| FragmentGroup::new(self.barcodes().clone()))
    }

    /// Record another fragment with the same signature as a group member
    ///
    /// # Errors
    ///
    /// Returns `GroupError::SignatureMismatch` if `other` has a different signature.
    pub fn add_fragment_with_same_barcodes(
        &mut self,
        other: &FragmentRecord,
    ) -> Result<(), GroupError> {
        let mut group = self
            .group
            .take()
            .unwrap_or_else(|| FragmentGroup::new(self.barcodes().clone()));
        let result = group.add_member(other.primary_key(), other.barcodes());
        self.group = OnceLock::from(group);
        result
    }

    /// Order by mapped location, then by id
    #[must_use]
    pub fn cmp_by_location(&self, other: &Self) -> Ordering {
        match (&self.location, &other.location) {
            (Some(a), Some(b)) => a.cmp(b).then_with(|| self.id.cmp(&other.id)),
            _ => self.id.cmp(&other.id),
        }
    }
}

impl PartialEq for FragmentRecord {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.location == other.location
            && self.read1_sequence == other.read1_sequence
            && self.read2_sequence == other.read2_sequence
            && self.unpaired_sequence == other.unpaired_sequence
            && self.barcodes() == other.barcodes()
    }
}

impl Eq for FragmentRecord {}
