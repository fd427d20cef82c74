//! fwpolicy CLI
//!
//! Command-line interface over the policy engine and its JSON store.

mod args;
mod commands;
mod logging;

use anyhow::Result;
use clap::Parser;
use tracing::error;

use args::Args;
use commands::{Command, EngineSource};

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();
    let source = EngineSource {
        config: args.config.clone(),
        store: args.store.clone(),
    };

    // Logging settings may come from the config file
    let config = source.load_config()?;
    logging::init(&args, &config.logging)?;

    let result = run(args.command, &source);

    if let Err(ref e) = result {
        error!("Fatal error: {:#}", e);
    }

    result
}

fn run(command: Command, source: &EngineSource) -> Result<()> {
    match command {
        Command::Resolve(resolve_args) => commands::resolve::execute(resolve_args, source),
        Command::Domain(domain_args) => commands::domain::execute(domain_args, source),
        Command::Ip(ip_args) => commands::ip::execute(ip_args, source),
        Command::App(app_args) => commands::app::execute(app_args, source),
        Command::Config(config_args) => commands::config::execute(config_args, source),
        Command::Completions(comp_args) => commands::completions::execute(comp_args),
    }
}
