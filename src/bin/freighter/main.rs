//! Freighter CLI - packages applications into native distributable bundles

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
    let filter = if cli.verbose {
        EnvFilter::new("freighter=debug")
    } else {
        EnvFilter::new("freighter=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    let color = !cli.no_color;

    // Execute command
    match cli.command {
        Commands::New(args) => commands::new::execute(args),
        Commands::Create(args) => commands::create::execute(args, cli.verbose, color),
        Commands::Update(args) => commands::update::execute(args, cli.verbose, color),
        Commands::Build(args) => commands::build::execute(args, cli.verbose, color),
        Commands::Run(args) => commands::run::execute(args, cli.verbose, color),
        Commands::Package(args) => commands::package::execute(args, cli.verbose, color),
        Commands::Publish(args) => commands::publish::execute(args, cli.verbose, color),
        Commands::Doctor(args) => commands::doctor::execute(args, cli.verbose),
        Commands::Completions(args) => commands::completions::execute(args),
    }
}
