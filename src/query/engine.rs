use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use super::alignments::AlignmentSource;
use super::region::{GenomicRegion, OverlapMode};
use crate::core::signature::BarcodeSequence;
use crate::store::{FragmentCursor, JoinedCursor, SignatureIndex, StoreError};

/// Joins a genomic window to every stored fragment sharing a barcode
/// signature with an alignment in that window.
#[derive(Debug)]
pub struct JoinQueryEngine<'a, S, A> {
    index: &'a S,
    alignments: &'a A,
}

impl<'a, S, A> JoinQueryEngine<'a, S, A>
where
    S: SignatureIndex,
    A: AlignmentSource,
{
    pub fn new(index: &'a S, alignments: &'a A) -> Self {
        Self { index, alignments }
    }

    /// Stream every fragment sharing a signature with an alignment in `region`.
    ///
    /// Returns `Ok(None)` when no alignment falls in the window. Each distinct
    /// signature is scanned once; fragments come back grouped by signature in
    /// signature order. The caller owns the returned cursor and must let it
    /// drop or close it.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::Alignment` if the alignment source fails, or any
    /// `StoreError` from opening a signature cursor. Nothing opened by this
    /// call outlives an error.
    pub fn fragments_in_window(
        &self,
        region: &GenomicRegion,
        mode: OverlapMode,
    ) -> Result<Option<JoinedCursor<S::Cursor<'a>>>, StoreError> {
        let Some(signatures) = self.collect_signatures(region, mode)? else {
            info!(region = %region, "No alignments in window");
            return Ok(None);
        };
        info!(
            region = %region,
            signatures = signatures.len(),
            "Joining window to stored fragments"
        );

        let mut cursors = Vec::with_capacity(signatures.len());
        for signature in &signatures {
            match self.index.cursor_for_signature(signature) {
                Ok(cursor) => cursors.push(cursor),
                Err(err) => {
                    warn!(signature = %signature, error = %err, "Failed to open signature cursor");
                    for mut cursor in cursors {
                        cursor.close();
                    }
                    return Err(err);
                }
            }
        }
        Ok(Some(JoinedCursor::new(cursors)))
    }

    /// Join every alignment lying on `reference`
    ///
    /// # Errors
    ///
    /// Same as [`fragments_in_window`](Self::fragments_in_window).
    pub fn query_reference(
        &self,
        reference: &str,
    ) -> Result<Option<JoinedCursor<S::Cursor<'a>>>, StoreError> {
        self.fragments_in_window(
            &GenomicRegion::whole_reference(reference),
            OverlapMode::Contained,
        )
    }

    /// Distinct signatures of the alignments in `region`, or `None` if there
    /// are no alignments. The alignment iterator is gone when this returns.
    fn collect_signatures(
        &self,
        region: &GenomicRegion,
        mode: OverlapMode,
    ) -> Result<Option<BTreeSet<String>>, StoreError> {
        let alignments = self.alignments.overlapping(
            &region.reference,
            region.start,
            region.end,
            mode.contained_only(),
        )?;

        let mut seen = 0usize;
        let mut signatures = BTreeSet::new();
        for alignment in alignments {
            let alignment = alignment?;
            seen += 1;
            let Some(attribute) = alignment.barcodes.as_deref() else {
                warn!(read = %alignment.read_name, "Alignment has no barcode signature, skipping");
                continue;
            };
            // Stored fragments are indexed under the canonical form
            match BarcodeSequence::from_attribute_string(attribute) {
                Ok(signature) if !signature.is_empty() => {
                    signatures.insert(signature.as_str().to_string());
                }
                Ok(_) => warn!(read = %alignment.read_name, "Alignment has an empty barcode signature, skipping"),
                Err(err) => warn!(
                    read = %alignment.read_name,
                    error = %err,
                    "Alignment has a malformed barcode signature, skipping"
                ),
            }
        }
        debug!(alignments = seen, distinct = signatures.len(), "Collected window signatures");

        Ok((seen > 0).then_some(signatures))
    }
}
