//! Command-line interface for airtrack.
//!
//! Runs the monitor and inspects what it recorded: stations, detection
//! events and play sessions.

mod commands;

pub use commands::{Cli, Commands, run_command};
