use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Args;
use noodles::fastq;
use serde::Serialize;
use tracing::info;

use crate::cli::{OutputFormat, StoreArgs};
use crate::core::fragment::{fragment_id, FragmentRecord};
use crate::layout::ReadLayout;
use crate::store::environment::{DEFAULT_CACHE_PERCENT, DEFAULT_CURSOR_BATCH_SIZE};
use crate::store::FragmentStore;

#[derive(Args)]
pub struct DecodeArgs {
    /// Read 1 FASTQ
    #[arg(long, required = true)]
    pub read1: PathBuf,

    /// Layout of read 1 (JSON)
    #[arg(long, required = true)]
    pub layout1: PathBuf,

    /// Read 2 FASTQ
    #[arg(long, requires = "layout2")]
    pub read2: Option<PathBuf>,

    /// Layout of read 2 (JSON)
    #[arg(long, requires = "read2")]
    pub layout2: Option<PathBuf>,

    /// Override the mismatch budget of every barcode element
    #[arg(short, long)]
    pub max_mismatches: Option<u32>,

    /// Also write the decoded fragments to a store in this environment
    #[arg(long)]
    pub env: Option<PathBuf>,

    /// Store to write to when --env is given
    #[arg(long, default_value = "fragments")]
    pub store: String,
}

#[derive(Debug, Serialize)]
struct DecodedRead {
    id: String,
    barcodes: String,
    num_barcodes: usize,
    complete: bool,
}

pub fn run(args: DecodeArgs, format: OutputFormat, verbose: bool) -> anyhow::Result<()> {
    let layout1 = load_layout(&args.layout1, args.max_mismatches)?;
    let layout2 = args
        .layout2
        .as_deref()
        .map(|path| load_layout(path, args.max_mismatches))
        .transpose()?;
    let expected = layout1.num_barcode_positions()
        + layout2.as_ref().map_or(0, |l| l.num_barcode_positions());

    let reads1 = read_fastq(&args.read1)?;
    let reads2 = args.read2.as_deref().map(read_fastq).transpose()?;
    if let Some(reads2) = &reads2 {
        if reads2.len() != reads1.len() {
            bail!(
                "{} has {} reads but {} has {}",
                args.read1.display(),
                reads1.len(),
                args.read2.as_deref().map_or_else(String::new, |p| p.display().to_string()),
                reads2.len()
            );
        }
    }

    let mut fragments = Vec::with_capacity(reads1.len());
    for (i, (name, sequence1)) in reads1.into_iter().enumerate() {
        let sequence2 = match &reads2 {
            Some(reads2) => {
                let (name2, sequence2) = &reads2[i];
                if fragment_id(name2) != fragment_id(&name) {
                    bail!("Read names differ at record {}: {name} vs {name2}", i + 1);
                }
                Some(sequence2.clone())
            }
            None => None,
        };
        fragments.push(FragmentRecord::from_reads(
            &name,
            Some(sequence1),
            sequence2,
            Some(Arc::clone(&layout1)),
            layout2.clone(),
        ));
    }

    let decoded: Vec<DecodedRead> = fragments
        .iter()
        .map(|fragment| DecodedRead {
            id: fragment.id().to_string(),
            barcodes: fragment.barcodes().to_string(),
            num_barcodes: fragment.num_barcodes(),
            complete: fragment.num_barcodes() == expected,
        })
        .collect();
    print_decoded(&decoded, format)?;

    let complete = decoded.iter().filter(|d| d.complete).count();
    info!(reads = decoded.len(), complete, "Decoded reads");
    if verbose {
        eprintln!(
            "Decoded {} reads, {complete} with all {expected} barcodes",
            decoded.len()
        );
    }

    if let Some(env) = args.env {
        let store_args = StoreArgs {
            env,
            store: args.store,
            cache_percent: DEFAULT_CACHE_PERCENT,
            cursor_batch_size: DEFAULT_CURSOR_BATCH_SIZE,
        };
        let env = store_args.open_writable(true)?;
        {
            let store = FragmentStore::open(&env, &store_args.store)?;
            let written = store.put_batch(&fragments)?;
            eprintln!("Wrote {written} fragments to store '{}'", store.name());
        }
        env.close()?;
    }
    Ok(())
}

fn load_layout(path: &Path, max_mismatches: Option<u32>) -> anyhow::Result<Arc<ReadLayout>> {
    let layout = ReadLayout::load_from_file(path)
        .with_context(|| format!("Failed to load layout {}", path.display()))?;
    let layout = match max_mismatches {
        Some(max) => layout.with_barcode_max_mismatches(max),
        None => layout,
    };
    Ok(Arc::new(layout))
}

/// Read names and sequences of every record
fn read_fastq(path: &Path) -> anyhow::Result<Vec<(String, String)>> {
    let mut reader = File::open(path)
        .map(BufReader::new)
        .map(fastq::io::Reader::new)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut reads = Vec::new();
    for result in reader.records() {
        let record = result.with_context(|| format!("Failed to parse {}", path.display()))?;
        let name = String::from_utf8_lossy(<_ as AsRef<[u8]>>::as_ref(record.name())).into_owned();
        let sequence =
            String::from_utf8_lossy(<_ as AsRef<[u8]>>::as_ref(record.sequence())).into_owned();
        reads.push((name, sequence));
    }
    Ok(reads)
}

fn print_decoded(decoded: &[DecodedRead], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => {
            for read in decoded {
                let barcodes = if read.barcodes.is_empty() {
                    "-"
                } else {
                    &read.barcodes
                };
                println!("{}\t{barcodes}", read.id);
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(decoded)?),
        OutputFormat::Tsv => {
            println!("id\tbarcodes\tnum_barcodes\tcomplete");
            for read in decoded {
                println!(
                    "{}\t{}\t{}\t{}",
                    read.id, read.barcodes, read.num_barcodes, read.complete
                );
            }
        }
    }
    Ok(())
}
