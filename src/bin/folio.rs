//! Folio CLI binary.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use folio::cli::args::FolioArgs;
use folio::cli::commands::execute_command;

fn main() -> anyhow::Result<()> {
    let args = FolioArgs::parse();

    // RUST_LOG wins over the verbosity flags
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_directive()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    execute_command(&args)?;
    Ok(())
}
