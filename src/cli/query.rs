use std::path::PathBuf;

use clap::Args;

use crate::cli::output::print_fragments;
use crate::cli::{OutputFormat, StoreArgs};
use crate::query::{AlignmentFile, GenomicRegion, JoinQueryEngine, OverlapMode};
use crate::store::{FragmentCursor, FragmentStore};

#[derive(Args)]
pub struct QueryArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Barcoded alignments (SAM or BAM) to resolve the window against. A BAM
    /// with a `.bai` or `.csi` index is queried by window; anything else is
    /// read in full
    #[arg(short, long)]
    pub alignments: PathBuf,

    /// Window as `reference:start-end` (0-based, half-open) or a bare
    /// reference name for the whole reference
    #[arg(required = true)]
    pub region: String,

    /// Only use alignments fully contained in the window
    #[arg(long)]
    pub contained: bool,
}

pub fn run(args: QueryArgs, format: OutputFormat, verbose: bool) -> anyhow::Result<()> {
    let region = GenomicRegion::parse(&args.region)?;
    let alignments = AlignmentFile::open(&args.alignments)?;
    if verbose && !alignments.is_indexed() {
        eprintln!("Reading all of {} to resolve the window", args.alignments.display());
    }
    let env = args.store.open_read_only()?;

    {
        let store = FragmentStore::open(&env, &args.store.store)?;
        let engine = JoinQueryEngine::new(&store, &alignments);

        let result = if region.is_whole_reference() {
            engine.query_reference(&region.reference)?
        } else {
            let mode = if args.contained {
                OverlapMode::Contained
            } else {
                OverlapMode::Overlapping
            };
            engine.fragments_in_window(&region, mode)?
        };

        let Some(mut cursor) = result else {
            eprintln!("No alignments overlap {region}");
            return Ok(());
        };
        let printed = print_fragments(cursor.by_ref(), format);
        cursor.close();
        let printed = printed?;

        if verbose {
            eprintln!("Found {printed} fragments sharing barcodes with alignments in {region}");
        }
    }

    env.close()?;
    Ok(())
}
