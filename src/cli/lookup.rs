use clap::{ArgGroup, Args};

use crate::cli::output::print_fragments;
use crate::cli::{OutputFormat, StoreArgs};
use crate::store::{FragmentCursor, FragmentStore};

#[derive(Args)]
#[command(group(ArgGroup::new("key").required(true).args(["id", "barcodes", "primary_key", "all"])))]
pub struct LookupArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Fragment id (first token of the read name)
    #[arg(long)]
    pub id: Option<String>,

    /// Canonical barcode signature, e.g. `[DPM6B3][Y10]`
    #[arg(long)]
    pub barcodes: Option<String>,

    /// Primary key `id:reference:start-end`
    #[arg(long)]
    pub primary_key: Option<String>,

    /// Every fragment in the store
    #[arg(long)]
    pub all: bool,
}

pub fn run(args: LookupArgs, format: OutputFormat, verbose: bool) -> anyhow::Result<()> {
    let env = args.store.open_read_only()?;
    {
        let store = FragmentStore::open(&env, &args.store.store)?;

        let printed = if let Some(key) = &args.primary_key {
            let found = store.get(key)?;
            if found.is_none() {
                eprintln!("No fragment with primary key {key}");
                return Ok(());
            }
            print_fragments(found.map(Ok), format)?
        } else {
            let mut cursor = match (&args.id, &args.barcodes) {
                (Some(id), _) => store.get_by_id(id)?,
                (None, Some(barcodes)) => store.get_by_barcode_signature(barcodes)?,
                (None, None) => store.get_all()?,
            };
            let printed = print_fragments(cursor.by_ref(), format);
            cursor.close();
            printed?
        };

        if printed == 0 {
            eprintln!("No matching fragments in store '{}'", store.name());
        } else if verbose {
            eprintln!("Found {printed} fragments in store '{}'", store.name());
        }
    }
    env.close()?;
    Ok(())
}
