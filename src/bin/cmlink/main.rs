//! cmlink CLI - build, cache and link installable CMake libraries

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    // Parse CLI
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.global.verbose {
        EnvFilter::new("cmlink=debug")
    } else {
        EnvFilter::new("cmlink=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_ansi(!cli.global.no_color)
        .with_writer(std::io::stderr)
        .init();

    // Execute command
    match cli.command {
        Commands::Build(args) => commands::build::execute(args, &cli.global),
        Commands::Flags(args) => commands::flags::execute(args, &cli.global),
        Commands::Fingerprint(args) => commands::fingerprint::execute(args, &cli.global),
        Commands::Cache(args) => commands::cache::execute(args, &cli.global),
        Commands::Completions(args) => commands::completions::execute(args),
    }
}
