use std::collections::HashMap;
use std::path::PathBuf;

use clap::Args;
use tracing::{debug, info, warn};

use crate::cli::{OutputFormat, StoreArgs};
use crate::core::fragment::{FragmentError, FragmentRecord};
use crate::query::read_alignments;
use crate::store::FragmentStore;

/// Default largest signature group whose members are linked
pub const DEFAULT_MAX_GROUP_SIZE: usize = 1000;

#[derive(Args)]
pub struct LoadArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Barcoded alignments (SAM or BAM) with signatures in the XB tag
    #[arg(required = true)]
    pub input: PathBuf,

    /// Records written per batch
    #[arg(short = 'b', long, default_value = "10000", value_parser = clap::value_parser!(u64).range(1..))]
    pub batch_size: u64,

    /// Commit each record on its own instead of each batch atomically
    #[arg(long)]
    pub non_transactional: bool,

    /// Record, on every fragment, the other fragments sharing its signature.
    /// Holds all fragments in memory until the input is read, and a group of
    /// k fragments stores k*(k-1) member keys
    #[arg(long)]
    pub with_groups: bool,

    /// With --with-groups, leave groups larger than this unlinked
    #[arg(long, default_value_t = DEFAULT_MAX_GROUP_SIZE, requires = "with_groups")]
    pub max_group_size: usize,
}

#[derive(Debug, serde::Serialize)]
struct LoadSummary {
    store: String,
    loaded: usize,
    skipped: usize,
    total_in_store: u64,
}

pub fn run(args: LoadArgs, format: OutputFormat, verbose: bool) -> anyhow::Result<()> {
    let alignments = read_alignments(&args.input)?;
    let batch_size = usize::try_from(args.batch_size).unwrap_or(usize::MAX);

    let env = args.store.open_writable(!args.non_transactional)?;
    let (loaded, skipped) = {
        let store = FragmentStore::open(&env, &args.store.store)?;
        let mut pending: Vec<FragmentRecord> = Vec::new();
        let mut loaded = 0usize;
        let mut skipped = 0usize;
        let mut unmapped = 0usize;

        for alignment in alignments {
            let alignment = alignment?;
            if alignment.location.is_none() {
                unmapped += 1;
                continue;
            }
            match FragmentRecord::from_alignment(&alignment) {
                Ok(fragment) => pending.push(fragment),
                Err(FragmentError::MissingBarcodes(name)) => {
                    debug!(read = %name, "Skipping alignment without barcodes");
                    skipped += 1;
                }
                Err(err) => return Err(err.into()),
            }

            if !args.with_groups && pending.len() >= batch_size {
                loaded += store.put_batch(&pending)?;
                pending.clear();
                info!(store = %args.store.store, loaded, "Wrote batch");
            }
        }

        if args.with_groups {
            let unlinked = link_groups(&mut pending, args.max_group_size)?;
            if unlinked > 0 {
                eprintln!(
                    "Warning: left {unlinked} signature groups larger than {} unlinked",
                    args.max_group_size
                );
            }
        }
        for batch in pending.chunks(batch_size) {
            loaded += store.put_batch(batch)?;
            info!(store = %args.store.store, loaded, "Wrote batch");
        }

        if verbose {
            eprintln!(
                "Read {} mapped alignments ({unmapped} unmapped) from {}",
                loaded + skipped,
                args.input.display()
            );
        }

        let summary = LoadSummary {
            store: args.store.store.clone(),
            loaded,
            skipped,
            total_in_store: store.count()?,
        };
        print_summary(&summary, format)?;
        (loaded, skipped)
    };
    env.close()?;

    if skipped > 0 {
        eprintln!("Warning: skipped {skipped} alignments without an XB barcode tag");
    }
    debug!(loaded, skipped, "Load finished");
    Ok(())
}

/// Make every fragment a member of every other fragment's group when they
/// share a signature, for groups of at most `max_group_size` fragments.
/// Returns how many groups were too large to link.
fn link_groups(fragments: &mut [FragmentRecord], max_group_size: usize) -> anyhow::Result<usize> {
    let mut by_signature: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, fragment) in fragments.iter().enumerate() {
        by_signature
            .entry(fragment.barcodes().as_str().to_string())
            .or_default()
            .push(i);
    }

    let mut unlinked = 0;
    for (signature, members) in by_signature.iter().filter(|(_, members)| members.len() > 1) {
        if members.len() > max_group_size {
            warn!(signature = %signature, size = members.len(), "Signature group too large to link");
            unlinked += 1;
            continue;
        }
        let siblings: Vec<FragmentRecord> = members.iter().map(|&i| fragments[i].clone()).collect();
        for &i in members {
            for sibling in &siblings {
                if sibling.primary_key() != fragments[i].primary_key() {
                    fragments[i].add_fragment_with_same_barcodes(sibling)?;
                }
            }
        }
    }
    Ok(unlinked)
}

fn print_summary(summary: &LoadSummary, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => {
            println!(
                "Loaded {} fragments into store '{}' ({} in store)",
                summary.loaded, summary.store, summary.total_in_store
            );
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(summary)?),
        OutputFormat::Tsv => {
            println!("store\tloaded\tskipped\ttotal_in_store");
            println!(
                "{}\t{}\t{}\t{}",
                summary.store, summary.loaded, summary.skipped, summary.total_in_store
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::signature::BarcodeSequence;
    use crate::core::types::GenomicLocation;

    #[test]
    fn test_link_groups() {
        let shared = BarcodeSequence::from_attribute_string("[a][b]").unwrap();
        let solo = BarcodeSequence::from_attribute_string("[c]").unwrap();
        let mut fragments = vec![
            FragmentRecord::new("r1", shared.clone()).with_location(GenomicLocation::new("chr1", 0, 10)),
            FragmentRecord::new("r2", solo).with_location(GenomicLocation::new("chr1", 5, 15)),
            FragmentRecord::new("r3", shared).with_location(GenomicLocation::new("chr2", 0, 10)),
        ];
        assert_eq!(link_groups(&mut fragments, DEFAULT_MAX_GROUP_SIZE).unwrap(), 0);

        assert_eq!(fragments[0].fragment_group().members(), ["r3:chr2:0-10"]);
        assert!(fragments[1].fragment_group().is_empty());
        assert_eq!(fragments[2].fragment_group().members(), ["r1:chr1:0-10"]);
    }

    #[test]
    fn test_link_groups_skips_oversized_groups() {
        let big = BarcodeSequence::from_attribute_string("[big]").unwrap();
        let pair = BarcodeSequence::from_attribute_string("[pair]").unwrap();
        let mut fragments: Vec<FragmentRecord> = (0..4)
            .map(|i| FragmentRecord::new(format!("b{i}"), big.clone()).with_location(GenomicLocation::new("chr1", i * 10, i * 10 + 5)))
            .collect();
        fragments.push(FragmentRecord::new("p1", pair.clone()).with_location(GenomicLocation::new("chr2", 0, 5)));
        fragments.push(FragmentRecord::new("p2", pair).with_location(GenomicLocation::new("chr2", 10, 15)));

        assert_eq!(link_groups(&mut fragments, 3).unwrap(), 1);
        assert!(fragments[..4].iter().all(|f| f.fragment_group().is_empty()));
        assert_eq!(fragments[4].fragment_group().members(), ["p2:chr2:10-15"]);
    }
}
