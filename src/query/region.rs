use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::store::QueryError;

/// A window on one reference sequence, 0-based half-open
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GenomicRegion {
    pub reference: String,
    pub start: u64,
    pub end: u64,
}

impl GenomicRegion {
    /// # Errors
    ///
    /// Returns `QueryError::MalformedRegion` if `reference` is empty or
    /// `end <= start`.
    pub fn new(reference: impl Into<String>, start: u64, end: u64) -> Result<Self, QueryError> {
        let reference = reference.into();
        if reference.is_empty() || end <= start {
            return Err(QueryError::MalformedRegion(format!(
                "{reference}:{start}-{end}"
            )));
        }
        Ok(Self {
            reference,
            start,
            end,
        })
    }

    /// The whole of `reference`
    pub fn whole_reference(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            start: 0,
            end: u64::MAX,
        }
    }

    #[must_use]
    pub fn is_whole_reference(&self) -> bool {
        self.start == 0 && self.end == u64::MAX
    }

    /// Parse `reference` or `reference:start-end`.
    ///
    /// Coordinates are 0-based half-open and may contain `,` separators.
    /// Only text after the last `:` that contains a `-` is read as a range;
    /// anything else is a whole reference name, so `HLA-A*01:01` names a
    /// reference.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::MalformedRegion` if the text does not parse.
    pub fn parse(text: &str) -> Result<Self, QueryError> {
        let text = text.trim();
        let malformed = || QueryError::MalformedRegion(text.to_string());

        if text.is_empty() {
            return Err(malformed());
        }
        let (reference, range) = match text.rsplit_once(':') {
            Some((_, "")) => return Err(malformed()),
            Some((reference, range)) if range.contains('-') => (reference, range),
            _ => return Ok(Self::whole_reference(text)),
        };

        let (start, end) = range.split_once('-').ok_or_else(malformed)?;
        let parse_coord = |s: &str| s.replace(',', "").parse::<u64>().map_err(|_| malformed());
        let start = parse_coord(start)?;
        let end = parse_coord(end)?;
        Self::new(reference, start, end).map_err(|_| malformed())
    }
}

impl FromStr for GenomicRegion {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for GenomicRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_whole_reference() {
            write!(f, "{}", self.reference)
        } else {
            write!(f, "{}:{}-{}", self.reference, self.start, self.end)
        }
    }
}

/// Which alignments count as falling in a window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapMode {
    /// Alignment lies entirely inside the window
    Contained,
    /// Alignment shares at least one base with the window
    #[default]
    Overlapping,
}

impl OverlapMode {
    #[must_use]
    pub fn contained_only(self) -> bool {
        matches!(self, Self::Contained)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_window() {
        let region = GenomicRegion::parse("chr1:1,000-2,500").unwrap();
        assert_eq!(region.reference, "chr1");
        assert_eq!(region.start, 1000);
        assert_eq!(region.end, 2500);
        assert_eq!(region.to_string(), "chr1:1000-2500");
    }

    #[test]
    fn test_parse_whole_reference() {
        let region: GenomicRegion = "chrX".parse().unwrap();
        assert!(region.is_whole_reference());
        assert_eq!(region.to_string(), "chrX");
    }

    #[test]
    fn test_parse_reference_containing_colon() {
        let region = GenomicRegion::parse("HLA-A*01:01:10-20").unwrap();
        assert_eq!(region.reference, "HLA-A*01:01");
        assert_eq!((region.start, region.end), (10, 20));
    }

    #[test]
    fn test_colon_name_without_range_is_whole_reference() {
        let region = GenomicRegion::parse("HLA-A*01:01").unwrap();
        assert!(region.is_whole_reference());
        assert_eq!(region.reference, "HLA-A*01:01");

        let region = GenomicRegion::parse("chrUn:KI270302").unwrap();
        assert_eq!(region.reference, "chrUn:KI270302");
    }

    #[test]
    fn test_malformed_regions() {
        for bad in ["", "chr1:", "chr1:a-b", "chr1:10-", "chr1:20-10", "chr1:5-5", ":1-2"] {
            assert!(
                matches!(GenomicRegion::parse(bad), Err(QueryError::MalformedRegion(_))),
                "expected '{bad}' to be rejected"
            );
        }
    }
}
