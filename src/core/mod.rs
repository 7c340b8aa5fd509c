//! Core data types for barcoded fragments.
//!
//! - [`Barcode`](signature::Barcode), [`BarcodeSequence`](signature::BarcodeSequence):
//!   barcode values and the ordered signature built from them
//! - [`FragmentGroup`](group::FragmentGroup): fragments sharing one signature
//! - [`FragmentRecord`](fragment::FragmentRecord): the stored entity
//! - [`AlignmentRecord`](alignment::AlignmentRecord): the view of an aligned read the
//!   join engine and fragment construction consume
//! - [`GenomicLocation`](types::GenomicLocation), [`Strand`](types::Strand)
//!
//! ## Signatures
//!
//! The canonical form of a signature wraps each barcode identifier in
//! brackets and concatenates them in layout order, read 1 before read 2:
//!
//! | Barcodes | Canonical form |
//! |----------|----------------|
//! | DPM6B3, Y10 | `[DPM6B3][Y10]` |
//! | (none) | empty string |
//!
//! Equality and ordering of signatures are by canonical form, so comparison is
//! byte-exact and case-sensitive.

pub mod alignment;
pub mod fragment;
pub mod group;
pub mod signature;
pub mod types;
