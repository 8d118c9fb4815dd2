//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Freighter - packages applications into native distributable bundles
#[derive(Parser)]
#[command(name = "freighter")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new freighter application
    New(NewArgs),

    /// Materialize the project skeleton for a target
    Create(StageArgs),

    /// Regenerate the skeleton without clobbering local edits
    Update(UpdateArgs),

    /// Build the application for a target
    Build(StageArgs),

    /// Build and execute the application locally
    Run(StageArgs),

    /// Produce the distributable artifact
    Package(StageArgs),

    /// Publish the distributable artifact
    Publish(StageArgs),

    /// Report registered targets and tool availability
    Doctor(DoctorArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args)]
pub struct NewArgs {
    /// Application name
    pub name: String,

    /// Bundle identifier (defaults to com.example.<name>)
    #[arg(long)]
    pub bundle: Option<String>,

    /// Directory to create the application in (defaults to the name)
    #[arg(long)]
    pub path: Option<PathBuf>,
}

#[derive(Args)]
pub struct StageArgs {
    /// Target as `platform:format` (defaults to every target the manifest
    /// declares)
    #[arg(short, long)]
    pub target: Option<String>,

    /// Configuration overrides, highest precedence (repeatable)
    #[arg(short = 'c', long = "config", value_name = "KEY=VALUE")]
    pub config: Vec<String>,
}

#[derive(Args)]
pub struct UpdateArgs {
    #[command(flatten)]
    pub stage: StageArgs,

    /// Overwrite files even if they were modified locally
    #[arg(long)]
    pub force: bool,
}

#[derive(Args)]
pub struct DoctorArgs {
    /// Also probe the required external tools
    #[arg(long)]
    pub tools: bool,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}
