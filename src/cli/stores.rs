use std::path::PathBuf;

use clap::Args;
use serde::Serialize;

use crate::cli::OutputFormat;
use crate::store::environment::DEFAULT_CACHE_PERCENT;
use crate::store::{EnvironmentConfig, FragmentStore, StoreEnvironment};

#[derive(Args)]
pub struct StoresArgs {
    /// Environment home directory
    #[arg(short, long)]
    pub env: PathBuf,

    /// Drop this store and all of its indices
    #[arg(long)]
    pub remove: Option<String>,

    /// Page cache size as a percentage of available memory
    #[arg(long, default_value_t = DEFAULT_CACHE_PERCENT)]
    pub cache_percent: u8,
}

#[derive(Debug, Serialize)]
struct StoreSummary {
    name: String,
    fragments: u64,
}

pub fn run(args: StoresArgs, format: OutputFormat, verbose: bool) -> anyhow::Result<()> {
    let config = if args.remove.is_some() {
        EnvironmentConfig::default()
    } else {
        EnvironmentConfig::read_only()
    };
    let env = StoreEnvironment::open(&args.env, config)?;

    if let Some(name) = &args.remove {
        env.remove_store(name)?;
        eprintln!("Removed store '{name}'");
    }

    let cache_bytes = env.set_cache_percent(args.cache_percent)?;
    if verbose {
        eprintln!(
            "Environment {} using {cache_bytes} bytes of page cache",
            env.home().display()
        );
    }

    let mut summaries = Vec::new();
    for name in env.store_names()? {
        let store = FragmentStore::open(&env, &name)?;
        summaries.push(StoreSummary {
            fragments: store.count()?,
            name,
        });
    }

    match format {
        OutputFormat::Text => {
            if summaries.is_empty() {
                eprintln!("No stores in {}", env.home().display());
            }
            for summary in &summaries {
                println!("{}\t{} fragments", summary.name, summary.fragments);
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summaries)?),
        OutputFormat::Tsv => {
            println!("store\tfragments");
            for summary in &summaries {
                println!("{}\t{}", summary.name, summary.fragments);
            }
        }
    }

    env.close()?;
    Ok(())
}
