//! CLI module for toolharness - command-line interface and subcommands.
//!
//! Provides subcommands to list tool versions, print their schemas, run a
//! single call, and drive a JSON-lines session over stdin/stdout.

pub mod commands;
pub mod session;

pub use commands::Cli;
pub use session::{close_collection, run_session};
