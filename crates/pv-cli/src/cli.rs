//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands::audit::AuditArgs;
use crate::commands::run::RunArgs;
use crate::commands::simulate::SimulateArgs;

/// Time-bounded voting sessions with one vote per voter.
///
/// Sessions and tallies live for the duration of a single invocation.
#[derive(Debug, Parser)]
#[command(name = "pvote", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Execute a JSON Lines script of voting operations.
    Run(RunArgs),

    /// Cast many votes concurrently against one session and check the tally.
    Simulate(SimulateArgs),

    /// Show the most recent audit records.
    Audit(AuditArgs),
}
