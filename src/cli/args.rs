//! CLI argument definitions using clap derive

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::cli::commands::{
    completions::CompletionsArgs, graph::GraphCommands, init::InitArgs,
    replace::ReplaceCommands, similar::SimilarArgs, track::TrackArgs,
    where_used::WhereUsedArgs,
};

#[derive(Parser)]
#[command(name = "refmerge")]
#[command(author, version, about = "Find duplicate images and merge their references")]
#[command(long_about = "Keeps a dependency graph of project assets, finds visually similar images by fingerprint, and rewrites referencing assets to use one chosen source, with per-reference rollback.")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalOpts,
}

#[derive(clap::Args, Clone, Debug)]
pub struct GlobalOpts {
    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "auto")]
    pub format: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Enable verbose output (debug logging on stderr)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Project root (default: auto-detect by finding .refmerge/)
    #[arg(long, global = true)]
    pub project: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new refmerge project
    Init(InitArgs),

    /// Give files an asset id by writing a .meta sidecar
    Track(TrackArgs),

    /// Dependency graph maintenance and queries
    #[command(subcommand)]
    Graph(GraphCommands),

    /// Show every asset that references an asset, transitively
    WhereUsed(WhereUsedArgs),

    /// List images that look like the given one
    Similar(SimilarArgs),

    /// Merge references of duplicate images into one source
    #[command(subcommand)]
    Replace(ReplaceCommands),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output on a terminal
    #[default]
    Auto,
    /// Tab-separated values (for piping)
    Tsv,
    /// JSON format (for programming)
    Json,
    /// YAML format
    Yaml,
}
