use barcode_join::cli;
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    // Initialize logging based on verbosity flag
    let filter = if cli.verbose {
        EnvFilter::new("barcode_join=debug,info")
    } else {
        EnvFilter::new("barcode_join=warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        cli::Commands::Load(args) => {
            cli::load::run(args, cli.format, cli.verbose)?;
        }
        cli::Commands::Query(args) => {
            cli::query::run(args, cli.format, cli.verbose)?;
        }
        cli::Commands::Lookup(args) => {
            cli::lookup::run(args, cli.format, cli.verbose)?;
        }
        cli::Commands::Decode(args) => {
            cli::decode::run(args, cli.format, cli.verbose)?;
        }
        cli::Commands::Stores(args) => {
            cli::stores::run(args, cli.format, cli.verbose)?;
        }
    }

    Ok(())
}
