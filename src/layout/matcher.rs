use tracing::debug;

use crate::core::signature::BarcodeSequence;
use crate::layout::element::MatchedElement;
use crate::layout::ReadLayout;

/// Outcome of matching one read against a layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutMatch {
    /// Every required element matched. One list per layout position; an
    /// optional element that did not match leaves its list empty.
    Matched(Vec<Vec<MatchedElement>>),

    /// A required element did not match within its mismatch budget
    NoMatch { position: usize, element: String },
}

impl LayoutMatch {
    #[must_use]
    pub fn is_match(&self) -> bool {
        matches!(self, Self::Matched(_))
    }

    /// Barcodes found in the read, in layout order.
    ///
    /// Returns `None` when a required element failed, so the read contributes
    /// nothing to its fragment's signature.
    #[must_use]
    pub fn signature(&self) -> Option<BarcodeSequence> {
        match self {
            Self::Matched(positions) => Some(
                positions
                    .iter()
                    .flatten()
                    .filter_map(MatchedElement::barcode)
                    .cloned()
                    .collect(),
            ),
            Self::NoMatch { .. } => None,
        }
    }
}

/// Decodes reads against layouts.
///
/// The default implementation is [`HammingMatcher`]; the trait exists so that
/// fragment records can be driven by any matcher, including instrumented ones.
pub trait LayoutMatcher {
    fn match_layout(&self, read: &str, layout: &ReadLayout) -> LayoutMatch;
}

/// Left-to-right Hamming-distance matcher
#[derive(Debug, Clone, Copy, Default)]
pub struct HammingMatcher;

impl LayoutMatcher for HammingMatcher {
    fn match_layout(&self, read: &str, layout: &ReadLayout) -> LayoutMatch {
        let mut positions = Vec::with_capacity(layout.elements().len());
        let mut cursor = 0usize;

        for (position, element) in layout.elements().iter().enumerate() {
            let length = element.declared_length();
            let matched = read
                .get(cursor..cursor + length)
                .and_then(|window| element.matches(window, element.max_mismatches));

            match matched {
                Some(m) => positions.push(vec![m]),
                None if element.required => {
                    debug!(
                        position,
                        element = element.name(),
                        cursor,
                        "Required layout element did not match"
                    );
                    return LayoutMatch::NoMatch {
                        position,
                        element: element.name().to_string(),
                    };
                }
                None => positions.push(Vec::new()),
            }

            cursor += length;
        }

        LayoutMatch::Matched(positions)
    }
}

/// Match `read` against `layout` with the default matcher
#[must_use]
pub fn match_layout(read: &str, layout: &ReadLayout) -> LayoutMatch {
    HammingMatcher.match_layout(read, layout)
}

/// Signature of a fragment from its two read halves.
///
/// Each half is matched independently; halves that are absent or fail a
/// required element contribute no barcodes. Read 1 barcodes come first.
pub fn extract_signature(
    matcher: &dyn LayoutMatcher,
    read1: Option<(&str, &ReadLayout)>,
    read2: Option<(&str, &ReadLayout)>,
) -> BarcodeSequence {
    let half = |input: Option<(&str, &ReadLayout)>| {
        input
            .and_then(|(read, layout)| matcher.match_layout(read, layout).signature())
            .unwrap_or_default()
    };
    half(read1).concat(&half(read2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::signature::Barcode;
    use crate::layout::ReadSequenceElement;

    fn stub_then_round1_layout() -> ReadLayout {
        ReadLayout::new(vec![
            ReadSequenceElement::fixed_sequence("stub", "ACGT"),
            ReadSequenceElement::barcode_set(
                "round1",
                vec![Barcode::new("b1", "AAAA"), Barcode::new("b2", "TTTT")],
            )
            .with_max_mismatches(1),
        ])
        .unwrap()
    }

    fn three_round_layout() -> ReadLayout {
        let round = |name: &str, a: &str, b: &str| {
            ReadSequenceElement::barcode_set(
                name,
                vec![
                    Barcode::new(format!("{name}_A"), a),
                    Barcode::new(format!("{name}_B"), b),
                ],
            )
            .with_max_mismatches(1)
        };
        ReadLayout::new(vec![
            round("r1", "AAAAAA", "CCCCCC"),
            ReadSequenceElement::spacer(2),
            round("r2", "GGGGGG", "TTTTTT"),
            ReadSequenceElement::fixed_sequence("stub", "ACGT").optional(),
            round("r3", "ACACAC", "GTGTGT"),
        ])
        .unwrap()
    }

    #[test]
    fn test_single_mismatch_barcode_set() {
        let result = match_layout("ACGTAATA", &stub_then_round1_layout());
        let sig = result.signature().unwrap();
        assert_eq!(sig.num_barcodes(), 1);
        assert_eq!(sig.barcodes()[0].id, "b1");
    }

    #[test]
    fn test_per_position_lists() {
        let LayoutMatch::Matched(positions) = match_layout("ACGTTTTT", &stub_then_round1_layout()) else {
            panic!("expected a match");
        };
        assert_eq!(positions.len(), 2);
        assert!(matches!(positions[0][0], MatchedElement::Fixed { .. }));
        assert_eq!(positions[1][0].barcode().unwrap().id, "b2");
    }

    #[test]
    fn test_required_fixed_sequence_failure() {
        let result = match_layout("TTTTAAAA", &stub_then_round1_layout());
        assert_eq!(
            result,
            LayoutMatch::NoMatch {
                position: 0,
                element: "stub".to_string()
            }
        );
        assert!(result.signature().is_none());
    }

    #[test]
    fn test_read_too_short() {
        let result = match_layout("ACGTAA", &stub_then_round1_layout());
        assert!(matches!(result, LayoutMatch::NoMatch { position: 1, .. }));
    }

    #[test]
    fn test_signature_length_equals_barcode_positions() {
        let layout = three_round_layout();
        let read = "CCCCCANNGGGGGGACGTGTGTGT";
        let sig = match_layout(read, &layout).signature().unwrap();
        assert_eq!(sig.num_barcodes(), layout.num_barcode_positions());
        assert_eq!(sig.as_str(), "[r1_B][r2_A][r3_B]");
    }

    #[test]
    fn test_optional_element_failure_still_advances() {
        let layout = three_round_layout();
        // Stub region "TTTT" does not match ACGT but the cursor still moves 4 bases
        let read = "AAAAAANNTTTTTTTTTTACACAC";
        let LayoutMatch::Matched(positions) = match_layout(read, &layout) else {
            panic!("expected a match");
        };
        assert!(positions[3].is_empty());
        assert_eq!(positions[4][0].barcode().unwrap().id, "r3_A");
    }

    #[test]
    fn test_extract_signature_concatenates_halves() {
        let layout = stub_then_round1_layout();
        let sig = extract_signature(
            &HammingMatcher,
            Some(("ACGTAAAA", &layout)),
            Some(("ACGTTTTT", &layout)),
        );
        assert_eq!(sig.as_str(), "[b1][b2]");
    }

    #[test]
    fn test_extract_signature_failed_half_contributes_nothing() {
        let layout = stub_then_round1_layout();
        let sig = extract_signature(
            &HammingMatcher,
            Some(("GGGGAAAA", &layout)),
            Some(("ACGTTTTT", &layout)),
        );
        assert_eq!(sig.as_str(), "[b2]");

        let sig = extract_signature(&HammingMatcher, None, None);
        assert!(sig.is_empty());
    }
}
