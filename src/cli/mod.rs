//! Command-line interface for barcode-join.
//!
//! This module implements the CLI using clap. Available commands:
//!
//! - **load**: Load barcoded alignments (SAM/BAM with `XB` tags) into a store
//! - **query**: Find every fragment sharing barcodes with alignments in a window
//! - **lookup**: Fetch fragments by id, signature or primary key
//! - **decode**: Match FASTQ reads against read layouts and print signatures
//! - **stores**: List or remove the stores of an environment
//!
//! ## Usage
//!
//! ```text
//! # Load an aligned, barcoded BAM
//! barcode-join load --env db sample.bam
//!
//! # Everything sharing barcodes with reads in a window
//! barcode-join query --env db --alignments sample.bam chr1:1000000-1100000
//!
//! # JSON output for scripting
//! barcode-join lookup --env db --barcodes '[DPM6B3][Y10]' --format json
//!
//! # Decode barcodes from paired FASTQs
//! barcode-join decode --read1 r1.fq --layout1 r1.json --read2 r2.fq --layout2 r2.json
//! ```

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::store::environment::{DEFAULT_CURSOR_BATCH_SIZE, MAX_CACHE_PERCENT};
use crate::store::{EnvironmentConfig, StoreEnvironment};

pub mod decode;
pub mod load;
pub mod lookup;
pub mod output;
pub mod query;
pub mod stores;

#[derive(Parser)]
#[command(name = "barcode-join")]
#[command(author = "Fulcrum Genomics")]
#[command(version)]
#[command(about = "Link split-pool barcoded fragments by barcode signature")]
#[command(
    long_about = "barcode-join decodes combinatorial barcodes from reads, stores fragments indexed by identity and barcode signature, and answers window queries.\n\nA window query returns every stored fragment that shares a barcode signature with any alignment in the window."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load barcoded alignments into a store
    Load(load::LoadArgs),

    /// Find fragments sharing barcodes with alignments in a window
    Query(query::QueryArgs),

    /// Fetch fragments by id, barcode signature or primary key
    Lookup(lookup::LookupArgs),

    /// Decode barcode signatures from FASTQ reads
    Decode(decode::DecodeArgs),

    /// List or remove the stores of an environment
    Stores(stores::StoresArgs),
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Tsv,
}

/// Options shared by every command that opens a store
#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// Environment home directory
    #[arg(short, long)]
    pub env: PathBuf,

    /// Store name within the environment
    #[arg(short, long, default_value = "fragments")]
    pub store: String,

    /// Page cache size as a percentage of available memory
    #[arg(long, default_value = "10", value_parser = clap::value_parser!(u8).range(1..=i64::from(MAX_CACHE_PERCENT)))]
    pub cache_percent: u8,

    /// Records fetched per cursor page
    #[arg(long, default_value_t = DEFAULT_CURSOR_BATCH_SIZE)]
    pub cursor_batch_size: usize,
}

impl StoreArgs {
    fn config(&self, read_only: bool) -> EnvironmentConfig {
        let config = if read_only {
            EnvironmentConfig::read_only()
        } else {
            EnvironmentConfig::default()
        };
        config
            .with_cache_percent(self.cache_percent)
            .with_cursor_batch_size(self.cursor_batch_size)
    }

    /// Open the environment for reading only
    pub(crate) fn open_read_only(&self) -> anyhow::Result<StoreEnvironment> {
        Ok(StoreEnvironment::open(&self.env, self.config(true))?)
    }

    /// Open (creating if needed) the environment for writing
    pub(crate) fn open_writable(&self, transactional: bool) -> anyhow::Result<StoreEnvironment> {
        let config = self.config(false).with_transactional(transactional);
        Ok(StoreEnvironment::open(&self.env, config)?)
    }
}
