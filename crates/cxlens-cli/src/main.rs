//! cxlens CLI: the `cxlens` command.

mod cli;
mod commands;
mod support;

use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve {
            config,
            bind,
            engine,
            timeout_secs,
        } => commands::serve::run(commands::serve::Args {
            config,
            bind,
            engine,
            timeout_secs,
        }),

        Commands::Analyze {
            source,
            config,
            engine,
            timeout_secs,
            json,
        } => commands::analyze::run(commands::analyze::Args {
            source,
            config,
            engine,
            timeout_secs,
            json,
        }),

        Commands::Validate { file, json } => commands::validate::run(file, json),

        Commands::Report { input, out, json } => commands::report::run(input, out, json),
    }
}
