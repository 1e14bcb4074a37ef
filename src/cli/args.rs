//! Command-line arguments for the `vellum` binary (clap derive).

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// The main CLI argument structure.
#[derive(Debug, Parser)]
#[command(
    name = "vellum",
    version,
    about = "Render and check Vellum templates."
)]
pub struct VellumArgs {
    /// Log engine activity to stderr (debug level).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub engine: EngineArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// An enumeration of all available CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Render a template to stdout.
    Render {
        /// Template name, relative to a template root.
        #[arg(required = true)]
        template: String,

        /// JSON object whose entries become template variables.
        #[arg(long, value_name = "FILE")]
        context: Option<PathBuf>,

        /// Fail on undefined references instead of printing them.
        #[arg(long)]
        strict: bool,
    },
    /// Parse and initialise a template without rendering it.
    Check {
        /// Template name, relative to a template root.
        #[arg(required = true)]
        template: String,
    },
}

/// Engine options, accepted before or after the subcommand.
#[derive(Debug, Args)]
pub struct EngineArgs {
    /// Template root directory; repeat to search several, in order.
    #[arg(long = "root", value_name = "DIR", global = true)]
    pub roots: Vec<PathBuf>,

    /// Engine configuration file (TOML).
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,
}
