use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SignatureParseError {
    #[error("Barcode signature '{0}' is not a sequence of [id] tokens")]
    Malformed(String),

    #[error("Barcode signature '{0}' contains an empty barcode identifier")]
    EmptyIdentifier(String),
}

/// A named barcode: an identifier and the nucleotide sequence it stands for
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Barcode {
    /// Identifier used in signatures (e.g. "`Round1_A7`")
    pub id: String,

    /// Expected nucleotide sequence; empty when the barcode was parsed back
    /// from a signature string
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sequence: String,
}

impl Barcode {
    pub fn new(id: impl Into<String>, sequence: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sequence: sequence.into(),
        }
    }

    /// A barcode known only by its identifier
    pub fn from_id(id: impl Into<String>) -> Self {
        Self::new(id, String::new())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }
}

impl std::fmt::Display for Barcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.id)
    }
}

/// Ordered barcode signature of a fragment.
///
/// The canonical form is the concatenation of each barcode's identifier in
/// bracket notation, e.g. `[DPM6B3][Y10][Odd2Bo5]`. Equality, ordering and
/// hashing all use the canonical form, so two signatures built from barcodes
/// with the same identifiers are the same signature regardless of whether
/// the nucleotide sequences were retained.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Barcode>", into = "Vec<Barcode>")]
pub struct BarcodeSequence {
    barcodes: Vec<Barcode>,
    canonical: String,
}

impl BarcodeSequence {
    #[must_use]
    pub fn new(barcodes: Vec<Barcode>) -> Self {
        let canonical = barcodes.iter().map(ToString::to_string).collect();
        Self {
            barcodes,
            canonical,
        }
    }

    /// Parse the canonical string form, as carried in the `XB` alignment tag
    ///
    /// # Errors
    ///
    /// Returns `SignatureParseError` if the string is not a run of `[id]` tokens.
    pub fn from_attribute_string(s: &str) -> Result<Self, SignatureParseError> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self::default());
        }

        let inner = s
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .ok_or_else(|| SignatureParseError::Malformed(s.to_string()))?;

        let mut barcodes = Vec::new();
        for id in inner.split("][") {
            if id.is_empty() {
                return Err(SignatureParseError::EmptyIdentifier(s.to_string()));
            }
            if id.contains('[') || id.contains(']') {
                return Err(SignatureParseError::Malformed(s.to_string()));
            }
            barcodes.push(Barcode::from_id(id));
        }

        Ok(Self::new(barcodes))
    }

    /// Signature of `self` followed by `other`
    #[must_use]
    pub fn concat(&self, other: &Self) -> Self {
        let mut barcodes = self.barcodes.clone();
        barcodes.extend(other.barcodes.iter().cloned());
        Self::new(barcodes)
    }

    /// Canonical string used as the secondary store key
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    #[must_use]
    pub fn barcodes(&self) -> &[Barcode] {
        &self.barcodes
    }

    #[must_use]
    pub fn num_barcodes(&self) -> usize {
        self.barcodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.barcodes.is_empty()
    }
}

impl From<Vec<Barcode>> for BarcodeSequence {
    fn from(barcodes: Vec<Barcode>) -> Self {
        Self::new(barcodes)
    }
}

impl From<BarcodeSequence> for Vec<Barcode> {
    fn from(sequence: BarcodeSequence) -> Self {
        sequence.barcodes
    }
}

impl FromIterator<Barcode> for BarcodeSequence {
    fn from_iter<I: IntoIterator<Item = Barcode>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl std::str::FromStr for BarcodeSequence {
    type Err = SignatureParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_attribute_string(s)
    }
}

impl PartialEq for BarcodeSequence {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for BarcodeSequence {}

impl Hash for BarcodeSequence {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl PartialOrd for BarcodeSequence {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BarcodeSequence {
    fn cmp(&self, other: &Self) -> Ordering {
        self.canonical.cmp(&other.canonical)
    }
}

impl std::fmt::Display for BarcodeSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.canonical)
    }
}
