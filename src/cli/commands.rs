//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - versions: list the tool catalog
//! - describe: print the API params for one version
//! - call: run a single tool call
//! - session: JSON-lines call loop on stdin/stdout

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// toolharness - versioned tool registry and dispatch harness
#[derive(Parser, Debug)]
#[command(name = "toolharness")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List supported tool versions
    Versions,

    /// Print the tool params advertised for a version
    Describe {
        /// Tool version (defaults to the configured version)
        #[arg(short = 't', long)]
        tool_version: Option<String>,
    },

    /// Run a single tool call and print the result
    Call {
        /// Tool version (defaults to the configured version)
        #[arg(short = 't', long)]
        tool_version: Option<String>,

        /// Tool name
        name: String,

        /// Tool input as JSON (defaults to {})
        input: Option<String>,
    },

    /// Read tool calls as JSON lines on stdin, write results on stdout
    Session {
        /// Tool version (defaults to the configured version)
        #[arg(short = 't', long)]
        tool_version: Option<String>,
    },
}

impl Commands {
    /// Tool version requested on the command line, if any
    pub fn tool_version(&self) -> Option<&str> {
        match self {
            Self::Versions => None,
            Self::Describe { tool_version } | Self::Call { tool_version, .. } | Self::Session { tool_version } => {
                tool_version.as_deref()
            }
        }
    }
}
