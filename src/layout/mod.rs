//! Read layouts and the barcode layout matcher.
//!
//! A [`ReadLayout`] describes how a raw read is segmented left-to-right into
//! fixed sequences, barcodes, enumerated barcode sets and spacers. The
//! [`matcher`] walks a read against a layout, tolerating up to a configured
//! number of mismatches per element, and collects the barcodes it finds into
//! a [`BarcodeSequence`](crate::core::signature::BarcodeSequence).
//!
//! ## Layout files
//!
//! Layouts are declared in JSON:
//!
//! ```json
//! {
//!   "elements": [
//!     {"type": "fixed_sequence", "name": "stub", "sequence": "ACGT"},
//!     {"type": "barcode_set", "name": "round1", "max_mismatches": 1,
//!      "barcodes": [{"id": "b1", "sequence": "AAAA"}, {"id": "b2", "sequence": "TTTT"}]},
//!     {"type": "spacer", "length": 6, "required": false}
//!   ]
//! }
//! ```
//!
//! ## Example
//!
//! ```rust
//! use barcode_join::layout::{match_layout, ReadLayout, ReadSequenceElement};
//! use barcode_join::core::signature::Barcode;
//!
//! let layout = ReadLayout::new(vec![
//!     ReadSequenceElement::fixed_sequence("stub", "ACGT"),
//!     ReadSequenceElement::barcode_set(
//!         "round1",
//!         vec![Barcode::new("b1", "AAAA"), Barcode::new("b2", "TTTT")],
//!     )
//!     .with_max_mismatches(1),
//! ])
//! .unwrap();
//!
//! let signature = match_layout("ACGTAATA", &layout).signature().unwrap();
//! assert_eq!(signature.as_str(), "[b1]");
//! ```

pub mod element;
pub mod matcher;

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

pub use element::{ElementKind, MatchedElement, ReadSequenceElement};
pub use matcher::{match_layout, HammingMatcher, LayoutMatch, LayoutMatcher};

#[derive(Error, Debug)]
pub enum LayoutError {
    #[error("Failed to read layout: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse layout: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Layout has no elements")]
    Empty,

    #[error("Layout element '{0}' has zero length")]
    ZeroLength(String),

    #[error("Barcode set '{0}' has no barcodes")]
    EmptyBarcodeSet(String),

    #[error("Barcode set '{name}' mixes barcode lengths {expected} and {found}")]
    MixedBarcodeLengths {
        name: String,
        expected: usize,
        found: usize,
    },
}

/// Serialized form of a layout, validated on the way in
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LayoutDefinition {
    elements: Vec<ReadSequenceElement>,
}

/// Ordered list of elements expected in a read, left to right
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "LayoutDefinition", into = "LayoutDefinition")]
pub struct ReadLayout {
    elements: Vec<ReadSequenceElement>,
}

impl TryFrom<LayoutDefinition> for ReadLayout {
    type Error = LayoutError;

    fn try_from(definition: LayoutDefinition) -> Result<Self, Self::Error> {
        Self::new(definition.elements)
    }
}

impl From<ReadLayout> for LayoutDefinition {
    fn from(layout: ReadLayout) -> Self {
        Self {
            elements: layout.elements,
        }
    }
}

impl ReadLayout {
    /// Build a layout, checking that every element consumes at least one base
    /// and that barcode sets are non-empty with uniform barcode length.
    ///
    /// # Errors
    ///
    /// Returns a `LayoutError` describing the first invalid element.
    pub fn new(elements: Vec<ReadSequenceElement>) -> Result<Self, LayoutError> {
        if elements.is_empty() {
            return Err(LayoutError::Empty);
        }

        for element in &elements {
            if let ElementKind::BarcodeSet { name, barcodes } = &element.kind {
                let first = barcodes
                    .first()
                    .ok_or_else(|| LayoutError::EmptyBarcodeSet(name.clone()))?;
                if let Some(other) = barcodes.iter().find(|b| b.len() != first.len()) {
                    return Err(LayoutError::MixedBarcodeLengths {
                        name: name.clone(),
                        expected: first.len(),
                        found: other.len(),
                    });
                }
            }
            if element.declared_length() == 0 {
                return Err(LayoutError::ZeroLength(element.name().to_string()));
            }
        }

        Ok(Self { elements })
    }

    /// Load a layout from a JSON file
    ///
    /// # Errors
    ///
    /// Returns `LayoutError` if the file cannot be read, parsed or validated.
    pub fn load_from_file(path: &Path) -> Result<Self, LayoutError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse a layout from JSON text
    ///
    /// # Errors
    ///
    /// Returns `LayoutError` if the JSON is malformed or the layout is invalid.
    pub fn from_json(json: &str) -> Result<Self, LayoutError> {
        let definition: LayoutDefinition = serde_json::from_str(json)?;
        Self::try_from(definition)
    }

    /// Export layout to JSON
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, LayoutError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    #[must_use]
    pub fn elements(&self) -> &[ReadSequenceElement] {
        &self.elements
    }

    /// Number of positions that contribute a barcode to the signature
    #[must_use]
    pub fn num_barcode_positions(&self) -> usize {
        self.elements.iter().filter(|e| e.is_barcode()).count()
    }

    /// Total number of read bases the layout spans
    #[must_use]
    pub fn total_length(&self) -> usize {
        self.elements
            .iter()
            .map(ReadSequenceElement::declared_length)
            .sum()
    }

    /// Largest mismatch budget among barcode elements
    #[must_use]
    pub fn barcode_max_mismatches(&self) -> u32 {
        self.elements
            .iter()
            .filter(|e| e.is_barcode())
            .map(|e| e.max_mismatches)
            .max()
            .unwrap_or(0)
    }

    /// Copy of this layout with every barcode element's budget set to `max_mismatches`
    #[must_use]
    pub fn with_barcode_max_mismatches(mut self, max_mismatches: u32) -> Self {
        for element in self.elements.iter_mut().filter(|e| e.is_barcode()) {
            element.max_mismatches = max_mismatches;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::signature::Barcode;

    #[test]
    fn test_layout_from_json() {
        let json = r#"{
            "elements": [
                {"type": "fixed_sequence", "name": "stub", "sequence": "ACGT"},
                {"type": "barcode_set", "name": "r1", "max_mismatches": 1,
                 "barcodes": [{"id": "b1", "sequence": "AAAA"}, {"id": "b2", "sequence": "TTTT"}]},
                {"type": "spacer", "length": 2, "required": false},
                {"type": "barcode", "barcode": {"id": "x", "sequence": "GGG"}}
            ]
        }"#;
        let layout = ReadLayout::from_json(json).unwrap();
        assert_eq!(layout.elements().len(), 4);
        assert_eq!(layout.num_barcode_positions(), 2);
        assert_eq!(layout.total_length(), 13);
        assert_eq!(layout.barcode_max_mismatches(), 1);
        assert!(!layout.elements()[2].required);
    }

    #[test]
    fn test_layout_json_roundtrip_validates() {
        let layout = ReadLayout::new(vec![ReadSequenceElement::spacer(4)]).unwrap();
        let json = layout.to_json().unwrap();
        assert_eq!(ReadLayout::from_json(&json).unwrap(), layout);
    }

    #[test]
    fn test_empty_layout_rejected() {
        assert!(matches!(ReadLayout::new(vec![]), Err(LayoutError::Empty)));
        assert!(serde_json::from_str::<ReadLayout>(r#"{"elements": []}"#).is_err());
        assert!(matches!(
            ReadLayout::from_json(r#"{"elements": []}"#),
            Err(LayoutError::Empty)
        ));
    }

    #[test]
    fn test_mixed_length_barcode_set_rejected() {
        let result = ReadLayout::new(vec![ReadSequenceElement::barcode_set(
            "r1",
            vec![Barcode::new("a", "AAAA"), Barcode::new("b", "TTT")],
        )]);
        assert!(matches!(
            result,
            Err(LayoutError::MixedBarcodeLengths {
                expected: 4,
                found: 3,
                ..
            })
        ));
    }

    #[test]
    fn test_empty_barcode_set_rejected() {
        let result = ReadLayout::new(vec![ReadSequenceElement::barcode_set("r1", vec![])]);
        assert!(matches!(result, Err(LayoutError::EmptyBarcodeSet(_))));
    }

    #[test]
    fn test_zero_length_rejected() {
        let result = ReadLayout::new(vec![ReadSequenceElement::spacer(0)]);
        assert!(matches!(result, Err(LayoutError::ZeroLength(_))));
    }

    #[test]
    fn test_override_barcode_mismatches() {
        let layout = ReadLayout::new(vec![
            ReadSequenceElement::fixed_sequence("stub", "ACGT"),
            ReadSequenceElement::barcode(Barcode::new("x", "GGG")),
        ])
        .unwrap()
        .with_barcode_max_mismatches(2);
        assert_eq!(layout.elements()[0].max_mismatches, 0);
        assert_eq!(layout.elements()[1].max_mismatches, 2);
    }
}
