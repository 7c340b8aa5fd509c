//! Alignment sources the join engine resolves windows against.
//!
//! - [`IndexedBamAlignments`] decodes only the records of the requested window
//!   from a BAM file with a `.bai` or `.csi` index
//! - [`MemoryAlignments`] holds records grouped by reference and sorted by
//!   start; used for SAM input and unindexed BAM
//! - [`AlignmentFile`] picks between the two for a path
//!
//! [`read_alignments`] streams every record of a file for bulk loading.

use std::collections::HashMap;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::alignment::{fragment_strand, AlignmentRecord, BARCODES_SAM_TAG};
use crate::core::types::GenomicLocation;

#[derive(Error, Debug)]
pub enum AlignmentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("noodles error: {0}")]
    Noodles(String),

    #[error("Unsupported alignment format: {0}")]
    UnsupportedFormat(String),
}

/// Window lookups over aligned reads.
///
/// The returned iterator borrows the source; dropping it releases whatever
/// it holds.
pub trait AlignmentSource {
    type Iter<'a>: Iterator<Item = Result<AlignmentRecord, AlignmentError>>
    where
        Self: 'a;

    /// Alignments on `reference` overlapping `[start, end)`, or lying fully
    /// inside it when `contained_only` is set
    ///
    /// # Errors
    ///
    /// Returns an `AlignmentError` if the lookup cannot start.
    fn overlapping(
        &self,
        reference: &str,
        start: u64,
        end: u64,
        contained_only: bool,
    ) -> Result<Self::Iter<'_>, AlignmentError>;
}

#[derive(Debug, Default)]
struct ReferenceBin {
    /// Sorted by start
    records: Vec<AlignmentRecord>,
    max_span: u64,
}

/// In-memory alignment source
#[derive(Debug, Default)]
pub struct MemoryAlignments {
    bins: HashMap<String, ReferenceBin>,
    unmapped: usize,
}

impl MemoryAlignments {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Index `records`; unmapped ones are counted and dropped
    pub fn from_records(records: impl IntoIterator<Item = AlignmentRecord>) -> Self {
        let mut source = Self::new();
        for record in records {
            source.push(record);
        }
        source.finish();
        source
    }

    fn push(&mut self, record: AlignmentRecord) {
        let Some(location) = &record.location else {
            self.unmapped += 1;
            return;
        };
        let bin = self.bins.entry(location.reference.clone()).or_default();
        bin.max_span = bin.max_span.max(location.span());
        bin.records.push(record);
    }

    fn finish(&mut self) {
        for bin in self.bins.values_mut() {
            bin.records.sort_by_key(|record| {
                record
                    .location
                    .as_ref()
                    .map_or((0, 0), |location| (location.start, location.end))
            });
        }
    }

    /// Load every record of a SAM or BAM file, chosen by extension
    ///
    /// # Errors
    ///
    /// Returns `AlignmentError::Io` if the file cannot be read,
    /// `AlignmentError::Noodles` if a record does not parse, or
    /// `AlignmentError::UnsupportedFormat` for other extensions.
    pub fn load(path: &Path) -> Result<Self, AlignmentError> {
        let mut source = Self::new();
        for record in read_alignments(path)? {
            source.push(record?);
        }
        source.finish();
        info!(
            path = %path.display(),
            mapped = source.len(),
            unmapped = source.unmapped,
            "Loaded alignments"
        );
        Ok(source)
    }

    /// Number of mapped records
    #[must_use]
    pub fn len(&self) -> usize {
        self.bins.values().map(|bin| bin.records.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of unmapped records seen while indexing
    #[must_use]
    pub fn unmapped(&self) -> usize {
        self.unmapped
    }

    /// Reference names with at least one mapped record, sorted
    #[must_use]
    pub fn references(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.bins.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// All mapped records in reference then start order
    pub fn records(&self) -> impl Iterator<Item = &AlignmentRecord> {
        self.references()
            .into_iter()
            .filter_map(|name| self.bins.get(name))
            .flat_map(|bin| bin.records.iter())
    }
}

impl AlignmentSource for MemoryAlignments {
    type Iter<'a> = Overlaps<'a>;

    fn overlapping(
        &self,
        reference: &str,
        start: u64,
        end: u64,
        contained_only: bool,
    ) -> Result<Self::Iter<'_>, AlignmentError> {
        let Some(bin) = self.bins.get(reference) else {
            debug!(reference, "No alignments on reference");
            return Ok(Overlaps::empty(reference));
        };
        // Nothing starting before this can reach the window
        let earliest = start.saturating_sub(bin.max_span);
        let first = bin.records.partition_point(|record| {
            record
                .location
                .as_ref()
                .is_some_and(|location| location.start < earliest)
        });
        Ok(Overlaps {
            records: &bin.records[first..],
            reference: reference.to_string(),
            start,
            end,
            contained_only,
        })
    }
}

/// Iterator over the records of one reference bin that fall in a window
#[derive(Debug)]
pub struct Overlaps<'a> {
    records: &'a [AlignmentRecord],
    reference: String,
    start: u64,
    end: u64,
    contained_only: bool,
}

impl Overlaps<'_> {
    fn empty(reference: &str) -> Self {
        Self {
            records: &[],
            reference: reference.to_string(),
            start: 0,
            end: 0,
            contained_only: false,
        }
    }
}

impl Iterator for Overlaps<'_> {
    type Item = Result<AlignmentRecord, AlignmentError>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((record, rest)) = self.records.split_first() {
            self.records = rest;
            let Some(location) = &record.location else {
                continue;
            };
            if location.start >= self.end {
                self.records = &[];
                return None;
            }
            let hit = if self.contained_only {
                location.contained_in(&self.reference, self.start, self.end)
            } else {
                location.overlaps(&self.reference, self.start, self.end)
            };
            if hit {
                return Some(Ok(record.clone()));
            }
        }
        None
    }
}

/// Iterator over every record of an alignment file, in file order
pub type AlignmentReader = Box<dyn Iterator<Item = Result<AlignmentRecord, AlignmentError>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AlignmentFormat {
    Sam,
    Bam,
}

fn alignment_format(path: &Path) -> Result<AlignmentFormat, AlignmentError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase);

    match extension.as_deref() {
        Some("sam") | None => Ok(AlignmentFormat::Sam),
        Some("bam") => Ok(AlignmentFormat::Bam),
        Some(ext) => Err(AlignmentError::UnsupportedFormat(ext.to_string())),
    }
}

fn noodles_error(error: impl std::fmt::Display) -> AlignmentError {
    AlignmentError::Noodles(error.to_string())
}

/// Stream every record of a SAM or BAM file, chosen by extension.
///
/// Records are decoded one at a time; unmapped records are included and
/// carry no location.
///
/// # Errors
///
/// Returns `AlignmentError::Io` if the file cannot be opened,
/// `AlignmentError::Noodles` if its header does not parse, or
/// `AlignmentError::UnsupportedFormat` for other extensions. Record parse
/// failures surface from the iterator.
pub fn read_alignments(path: &Path) -> Result<AlignmentReader, AlignmentError> {
    use noodles::sam::alignment::RecordBuf;
    use noodles::{bam, sam};

    match alignment_format(path)? {
        AlignmentFormat::Sam => {
            let mut reader = std::fs::File::open(path)
                .map(BufReader::new)
                .map(sam::io::Reader::new)?;
            let header = reader.read_header().map_err(noodles_error)?;
            let mut record = RecordBuf::default();
            Ok(Box::new(std::iter::from_fn(move || {
                match reader.read_record_buf(&header, &mut record) {
                    Ok(0) => None,
                    Ok(_) => Some(Ok(convert_record(&record, &header))),
                    Err(e) => Some(Err(noodles_error(e))),
                }
            })))
        }
        AlignmentFormat::Bam => {
            let mut reader = std::fs::File::open(path).map(bam::io::Reader::new)?;
            let header = reader.read_header().map_err(noodles_error)?;
            let mut record = RecordBuf::default();
            Ok(Box::new(std::iter::from_fn(move || {
                match reader.read_record_buf(&header, &mut record) {
                    Ok(0) => None,
                    Ok(_) => Some(Ok(convert_record(&record, &header))),
                    Err(e) => Some(Err(noodles_error(e))),
                }
            })))
        }
    }
}

/// Alignment source over a coordinate-sorted BAM file with an index.
///
/// Each lookup opens its own indexed reader and decodes only the records in
/// the index chunks covering the window.
#[derive(Debug)]
pub struct IndexedBamAlignments {
    path: PathBuf,
    header: noodles::sam::Header,
}

impl IndexedBamAlignments {
    /// Open `path`, reading its associated `<path>.bai` or `<path>.csi` index
    ///
    /// # Errors
    ///
    /// Returns `AlignmentError::Io` if the file or its index cannot be read.
    pub fn open(path: &Path) -> Result<Self, AlignmentError> {
        let mut reader = noodles::bam::io::indexed_reader::Builder::default().build_from_path(path)?;
        let header = reader.read_header()?;
        info!(
            path = %path.display(),
            references = header.reference_sequences().len(),
            "Opened indexed alignments"
        );
        Ok(Self {
            path: path.to_path_buf(),
            header,
        })
    }

    fn has_reference(&self, reference: &str) -> bool {
        self.header
            .reference_sequences()
            .keys()
            .any(|name| <_ as AsRef<[u8]>>::as_ref(name) == reference.as_bytes())
    }
}

impl AlignmentSource for IndexedBamAlignments {
    type Iter<'a> = std::vec::IntoIter<Result<AlignmentRecord, AlignmentError>>;

    fn overlapping(
        &self,
        reference: &str,
        start: u64,
        end: u64,
        contained_only: bool,
    ) -> Result<Self::Iter<'_>, AlignmentError> {
        use noodles::sam::alignment::RecordBuf;

        if !self.has_reference(reference) {
            debug!(reference, "Reference not in alignment header");
            return Ok(Vec::new().into_iter());
        }

        let region = window_region(reference, start, end)?;
        let mut reader = noodles::bam::io::indexed_reader::Builder::default().build_from_path(&self.path)?;
        reader.read_header()?;

        let mut records = Vec::new();
        for result in reader.query(&self.header, &region)? {
            let record = RecordBuf::try_from_alignment_record(&self.header, &result?)?;
            let alignment = convert_record(&record, &self.header);
            let Some(location) = &alignment.location else {
                continue;
            };
            let hit = if contained_only {
                location.contained_in(reference, start, end)
            } else {
                location.overlaps(reference, start, end)
            };
            if hit {
                records.push(Ok(alignment));
            }
        }
        debug!(reference, start, end, found = records.len(), "Queried indexed alignments");
        Ok(records.into_iter())
    }
}

/// 1-based inclusive region covering the 0-based half-open window
/// `[start, end)`; `end == u64::MAX` leaves the region open-ended
fn window_region(reference: &str, start: u64, end: u64) -> Result<noodles::core::Region, AlignmentError> {
    use noodles::core::region::Interval;
    use noodles::core::{Position, Region};

    let position = |value: u64| {
        usize::try_from(value)
            .map_err(noodles_error)
            .and_then(|value| Position::try_from(value).map_err(noodles_error))
    };

    let first = position(start.saturating_add(1))?;
    let interval = if end == u64::MAX {
        Interval::from(first..)
    } else {
        Interval::from(first..=position(end)?)
    };
    Ok(Region::new(reference, interval))
}

/// Alignment source for a SAM or BAM path.
///
/// An indexed BAM is queried window by window; anything else is read into
/// memory once.
#[derive(Debug)]
pub enum AlignmentFile {
    Indexed(IndexedBamAlignments),
    Memory(MemoryAlignments),
}

impl AlignmentFile {
    /// Open `path`, preferring an indexed reader for BAM
    ///
    /// # Errors
    ///
    /// Same as [`MemoryAlignments::load`].
    pub fn open(path: &Path) -> Result<Self, AlignmentError> {
        if alignment_format(path)? == AlignmentFormat::Bam {
            match IndexedBamAlignments::open(path) {
                Ok(indexed) => return Ok(Self::Indexed(indexed)),
                Err(e) => warn!(
                    path = %path.display(),
                    error = %e,
                    "No usable BAM index; reading the whole file"
                ),
            }
        }
        MemoryAlignments::load(path).map(Self::Memory)
    }

    #[must_use]
    pub fn is_indexed(&self) -> bool {
        matches!(self, Self::Indexed(_))
    }
}

impl AlignmentSource for AlignmentFile {
    type Iter<'a> = FileOverlaps<'a>;

    fn overlapping(
        &self,
        reference: &str,
        start: u64,
        end: u64,
        contained_only: bool,
    ) -> Result<Self::Iter<'_>, AlignmentError> {
        match self {
            Self::Indexed(source) => source
                .overlapping(reference, start, end, contained_only)
                .map(FileOverlaps::Indexed),
            Self::Memory(source) => source
                .overlapping(reference, start, end, contained_only)
                .map(FileOverlaps::Memory),
        }
    }
}

/// Window iterator of an [`AlignmentFile`]
#[derive(Debug)]
pub enum FileOverlaps<'a> {
    Indexed(std::vec::IntoIter<Result<AlignmentRecord, AlignmentError>>),
    Memory(Overlaps<'a>),
}

impl Iterator for FileOverlaps<'_> {
    type Item = Result<AlignmentRecord, AlignmentError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Self::Indexed(records) => records.next(),
            Self::Memory(overlaps) => overlaps.next(),
        }
    }
}

fn convert_record(
    record: &noodles::sam::alignment::RecordBuf,
    header: &noodles::sam::Header,
) -> AlignmentRecord {
    use noodles::sam::alignment::record::data::field::Tag;
    use noodles::sam::alignment::record_buf::data::field::Value;

    let name = record.name().map_or_else(String::new, |n| {
        String::from_utf8_lossy(<_ as AsRef<[u8]>>::as_ref(n)).into_owned()
    });
    let flags = record.flags();
    let sequence = String::from_utf8_lossy(record.sequence().as_ref()).into_owned();

    let mut alignment = AlignmentRecord::new(name).with_sequence(sequence);
    if flags.is_segmented() {
        alignment = alignment.with_pair_segment(flags.is_first_segment());
    }

    if let Some(Value::String(barcodes)) = record.data().get(&Tag::from(BARCODES_SAM_TAG)) {
        alignment = alignment.with_barcodes(String::from_utf8_lossy(barcodes.as_ref()).into_owned());
    }

    if flags.is_unmapped() {
        return alignment;
    }

    let reference = record
        .reference_sequence_id()
        .and_then(|id| header.reference_sequences().get_index(id))
        .map(|(name, _)| String::from_utf8_lossy(name.as_ref()).into_owned());
    let start = record.alignment_start().map(usize::from);
    let end = record.alignment_end().map(usize::from);

    if let (Some(reference), Some(start), Some(end)) = (reference, start, end) {
        let strand = fragment_strand(
            flags.is_reverse_complemented(),
            flags.is_segmented(),
            flags.is_first_segment(),
        );
        // noodles positions are 1-based inclusive
        let location = GenomicLocation::new(reference, start as u64 - 1, end as u64)
            .with_strand(strand);
        alignment = alignment.with_location(location);
    }
    alignment
}
