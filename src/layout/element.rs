use serde::{Deserialize, Serialize};

use crate::core::signature::Barcode;

fn default_required() -> bool {
    true
}

/// What a layout position expects to find in the read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ElementKind {
    /// A constant sequence such as a ligation overhang or adapter stub
    FixedSequence { name: String, sequence: String },

    /// A single known barcode
    Barcode { barcode: Barcode },

    /// Exactly one of several enumerated barcodes of equal length
    BarcodeSet { name: String, barcodes: Vec<Barcode> },

    /// Bases of known length whose content is ignored
    Spacer { length: usize },
}

/// One position of a [`ReadLayout`](super::ReadLayout)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadSequenceElement {
    #[serde(flatten)]
    pub kind: ElementKind,

    /// Maximum Hamming distance accepted for a match
    #[serde(default)]
    pub max_mismatches: u32,

    /// A required element that fails to match aborts matching of the read
    #[serde(default = "default_required")]
    pub required: bool,
}

/// Result of matching one element against a window of the read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchedElement {
    Fixed {
        name: String,
        observed: String,
        mismatches: u32,
    },
    Barcode {
        barcode: Barcode,
        mismatches: u32,
    },
    Spacer {
        observed: String,
    },
}

impl MatchedElement {
    /// The matched barcode, if this element contributes to a signature
    #[must_use]
    pub fn barcode(&self) -> Option<&Barcode> {
        match self {
            Self::Barcode { barcode, .. } => Some(barcode),
            _ => None,
        }
    }

    #[must_use]
    pub fn mismatches(&self) -> u32 {
        match self {
            Self::Fixed { mismatches, .. } | Self::Barcode { mismatches, .. } => *mismatches,
            Self::Spacer { .. } => 0,
        }
    }
}

impl ReadSequenceElement {
    pub fn fixed_sequence(name: impl Into<String>, sequence: impl Into<String>) -> Self {
        Self::from_kind(ElementKind::FixedSequence {
            name: name.into(),
            sequence: sequence.into(),
        })
    }

    #[must_use]
    pub fn barcode(barcode: Barcode) -> Self {
        Self::from_kind(ElementKind::Barcode { barcode })
    }

    pub fn barcode_set(name: impl Into<String>, barcodes: Vec<Barcode>) -> Self {
        Self::from_kind(ElementKind::BarcodeSet {
            name: name.into(),
            barcodes,
        })
    }

    #[must_use]
    pub fn spacer(length: usize) -> Self {
        Self::from_kind(ElementKind::Spacer { length })
    }

    fn from_kind(kind: ElementKind) -> Self {
        Self {
            kind,
            max_mismatches: 0,
            required: true,
        }
    }

    #[must_use]
    pub fn with_max_mismatches(mut self, max_mismatches: u32) -> Self {
        self.max_mismatches = max_mismatches;
        self
    }

    #[must_use]
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Human-readable element name for diagnostics
    #[must_use]
    pub fn name(&self) -> &str {
        match &self.kind {
            ElementKind::FixedSequence { name, .. } | ElementKind::BarcodeSet { name, .. } => name,
            ElementKind::Barcode { barcode } => &barcode.id,
            ElementKind::Spacer { .. } => "spacer",
        }
    }

    /// Number of read bases this element consumes
    #[must_use]
    pub fn declared_length(&self) -> usize {
        match &self.kind {
            ElementKind::FixedSequence { sequence, .. } => sequence.len(),
            ElementKind::Barcode { barcode } => barcode.len(),
            ElementKind::BarcodeSet { barcodes, .. } => barcodes.first().map_or(0, Barcode::len),
            ElementKind::Spacer { length } => *length,
        }
    }

    /// True for elements whose matches are collected into a signature
    #[must_use]
    pub fn is_barcode(&self) -> bool {
        matches!(
            self.kind,
            ElementKind::Barcode { .. } | ElementKind::BarcodeSet { .. }
        )
    }

    /// Match this element against a window of exactly [`declared_length`](Self::declared_length) bases.
    ///
    /// Candidates are scored by Hamming distance. The lowest-distance candidate
    /// within `max_mismatches` wins; ties go to the candidate declared first.
    #[must_use]
    pub fn matches(&self, window: &str, max_mismatches: u32) -> Option<MatchedElement> {
        if window.len() != self.declared_length() {
            return None;
        }

        match &self.kind {
            ElementKind::FixedSequence { name, sequence } => {
                hamming_within(window.as_bytes(), sequence.as_bytes(), max_mismatches).map(
                    |mismatches| MatchedElement::Fixed {
                        name: name.clone(),
                        observed: window.to_string(),
                        mismatches,
                    },
                )
            }
            ElementKind::Barcode { barcode } => {
                hamming_within(window.as_bytes(), barcode.sequence.as_bytes(), max_mismatches).map(
                    |mismatches| MatchedElement::Barcode {
                        barcode: barcode.clone(),
                        mismatches,
                    },
                )
            }
            ElementKind::BarcodeSet { barcodes, .. } => {
                let mut best: Option<(u32, &Barcode)> = None;
                for candidate in barcodes {
                    let budget = best.map_or(max_mismatches, |(d, _)| d.saturating_sub(1));
                    if best.is_some_and(|(d, _)| d == 0) {
                        break;
                    }
                    if let Some(d) =
                        hamming_within(window.as_bytes(), candidate.sequence.as_bytes(), budget)
                    {
                        best = Some((d, candidate));
                    }
                }
                best.map(|(mismatches, barcode)| MatchedElement::Barcode {
                    barcode: barcode.clone(),
                    mismatches,
                })
            }
            ElementKind::Spacer { .. } => Some(MatchedElement::Spacer {
                observed: window.to_string(),
            }),
        }
    }
}

/// Hamming distance between equal-length sequences, or `None` if it exceeds `max`.
///
/// Comparison is byte-exact, so callers normalize case beforehand.
#[must_use]
pub fn hamming_within(a: &[u8], b: &[u8], max: u32) -> Option<u32> {
    if a.len() != b.len() {
        return None;
    }
    let mut distance = 0u32;
    for (x, y) in a.iter().zip(b) {
        if x != y {
            distance += 1;
            if distance > max {
                return None;
            }
        }
    }
    Some(distance)
}
