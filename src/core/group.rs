use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::signature::BarcodeSequence;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum GroupError {
    #[error("Fragment {fragment} has signature {found} but group signature is {expected}")]
    SignatureMismatch {
        fragment: String,
        expected: String,
        found: String,
    },
}

/// Fragments that share one barcode signature.
///
/// Membership is append-only; members are recorded by fragment primary key so
/// the group can be persisted alongside each fragment without nesting records.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FragmentGroup {
    barcodes: BarcodeSequence,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    members: Vec<String>,
}

impl FragmentGroup {
    #[must_use]
    pub fn new(barcodes: BarcodeSequence) -> Self {
        Self {
            barcodes,
            members: Vec::new(),
        }
    }

    /// A group whose members were recorded under `barcodes` earlier, such as
    /// one read back from a store. Repeated keys are kept once.
    #[must_use]
    pub fn with_members(
        barcodes: BarcodeSequence,
        members: impl IntoIterator<Item = String>,
    ) -> Self {
        let mut group = Self::new(barcodes);
        for key in members {
            if !group.contains(&key) {
                group.members.push(key);
            }
        }
        group
    }

    #[must_use]
    pub fn barcodes(&self) -> &BarcodeSequence {
        &self.barcodes
    }

    /// Primary keys of member fragments, in insertion order
    #[must_use]
    pub fn members(&self) -> &[String] {
        &self.members
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.members.iter().any(|m| m == key)
    }

    /// Append a member. Adding a key that is already present is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `GroupError::SignatureMismatch` if `signature` differs from the
    /// group's signature.
    pub fn add_member(
        &mut self,
        key: impl Into<String>,
        signature: &BarcodeSequence,
    ) -> Result<(), GroupError> {
        let key = key.into();
        if signature != &self.barcodes {
            return Err(GroupError::SignatureMismatch {
                fragment: key,
                expected: self.barcodes.to_string(),
                found: signature.to_string(),
            });
        }
        if !self.contains(&key) {
            self.members.push(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(s: &str) -> BarcodeSequence {
        BarcodeSequence::from_attribute_string(s).unwrap()
    }

    #[test]
    fn test_add_member_with_same_signature() {
        let mut group = FragmentGroup::new(sig("[a][b]"));
        group.add_member("read1:chr1:0-10", &sig("[a][b]")).unwrap();
        group.add_member("read2:chr1:5-15", &sig("[a][b]")).unwrap();
        assert_eq!(group.len(), 2);
        assert_eq!(group.members()[0], "read1:chr1:0-10");
    }

    #[test]
    fn test_add_member_rejects_other_signature() {
        let mut group = FragmentGroup::new(sig("[a][b]"));
        let err = group.add_member("read1", &sig("[a][c]")).unwrap_err();
        assert!(matches!(err, GroupError::SignatureMismatch { .. }));
        assert!(group.is_empty());
    }

    #[test]
    fn test_with_members_keeps_first_occurrence() {
        let group = FragmentGroup::with_members(
            sig("[a]"),
            ["r2", "r1", "r2"].map(String::from),
        );
        assert_eq!(group.members(), ["r2", "r1"]);
        assert_eq!(group.barcodes(), &sig("[a]"));
    }

    #[test]
    fn test_duplicate_member_is_noop() {
        let mut group = FragmentGroup::new(sig("[a]"));
        group.add_member("read1", &sig("[a]")).unwrap();
        group.add_member("read1", &sig("[a]")).unwrap();
        assert_eq!(group.len(), 1);
        assert!(group.contains("read1"));
    }
}
