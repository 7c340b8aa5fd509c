use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Strand of a mapped fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Strand {
    Positive,
    Negative,
    #[default]
    Unknown,
}

impl Strand {
    #[must_use]
    pub fn reverse(self) -> Self {
        match self {
            Self::Positive => Self::Negative,
            Self::Negative => Self::Positive,
            Self::Unknown => Self::Unknown,
        }
    }
}

impl std::fmt::Display for Strand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Positive => write!(f, "+"),
            Self::Negative => write!(f, "-"),
            Self::Unknown => write!(f, "."),
        }
    }
}

/// Genomic location of a fragment.
///
/// Coordinates are 0-based and half-open: `start` is the first mapped base and
/// `end` is one past the last mapped base.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GenomicLocation {
    /// Reference sequence name
    pub reference: String,

    /// 0-based start (inclusive)
    pub start: u64,

    /// 0-based end (exclusive)
    pub end: u64,

    /// Mapped strand
    #[serde(default)]
    pub strand: Strand,
}

impl GenomicLocation {
    pub fn new(reference: impl Into<String>, start: u64, end: u64) -> Self {
        Self {
            reference: reference.into(),
            start,
            end,
            strand: Strand::Unknown,
        }
    }

    #[must_use]
    pub fn with_strand(mut self, strand: Strand) -> Self {
        self.strand = strand;
        self
    }

    /// Number of reference bases covered
    #[must_use]
    pub fn span(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    /// True if this location shares at least one base with `[start, end)` on `reference`
    #[must_use]
    pub fn overlaps(&self, reference: &str, start: u64, end: u64) -> bool {
        self.reference == reference && self.start < end && start < self.end
    }

    /// True if this location lies entirely within `[start, end)` on `reference`
    #[must_use]
    pub fn contained_in(&self, reference: &str, start: u64, end: u64) -> bool {
        self.reference == reference && self.start >= start && self.end <= end
    }
}

impl PartialOrd for GenomicLocation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GenomicLocation {
    fn cmp(&self, other: &Self) -> Ordering {
        self.reference
            .cmp(&other.reference)
            .then(self.start.cmp(&other.start))
            .then(self.end.cmp(&other.end))
            .then(self.strand.cmp(&other.strand))
    }
}

impl std::fmt::Display for GenomicLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}-{}", self.reference, self.start, self.end)
    }
}
