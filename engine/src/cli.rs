//! CLI interface for Cadence
//!
//! Command-line interface using clap's derive API.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Cadence orchestration engine
///
/// Turns a conversation into a validated plan of capability calls, executes it,
/// and pauses for human approval when a step asks for it.
#[derive(Parser, Debug)]
#[command(name = "cadence")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one conversational turn
    Run {
        /// The user's message
        message: String,

        /// Session id to run under (random if omitted)
        #[arg(long)]
        session: Option<String>,

        /// Use the raw message as the task instead of extracting one
        #[arg(long)]
        skip_extraction: bool,

        /// Activate every capability instead of classifying
        #[arg(long)]
        skip_classification: bool,
    },

    /// Answer a pending approval request
    Approve {
        /// Handle printed when the plan was suspended
        handle: String,

        /// Free-text reply, e.g. "yes go ahead"
        reply: String,
    },

    /// List plans waiting for approval
    Pending,

    /// List registered capabilities
    Capabilities,

    /// Check configuration, database and LLM backend
    Doctor,
}
