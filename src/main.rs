//! audioprep CLI
//!
//! Command-line front end for the audioprep transforms.

use clap::Parser;
use env_logger::Env;
use log::debug;

use audioprep::cli::{commands, Cli, Commands};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logger; RUST_LOG still wins over the flag
    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    debug!("audioprep v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Walkthrough { input, json } => commands::walkthrough(&input, json),
        Commands::Inspect { input } => commands::inspect(&input),
        Commands::RoundTrip {
            input,
            quantization_channels,
            exclude_zeros,
        } => commands::round_trip(&input, quantization_channels, exclude_zeros),
        Commands::Apply {
            input,
            pipeline,
            output,
            bit_depth,
        } => commands::apply(&input, &pipeline, output.as_deref(), bit_depth),
    }
}
