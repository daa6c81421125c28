//! CLI command definitions and dispatch.
//!
//! Each subcommand group lives in its own submodule:
//! - `monitor`: running the station monitor
//! - `report`: stations, detection events and play sessions
//! - `setup`: config file creation and ISRC checks

mod monitor;
mod report;
mod setup;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::runtime::Runtime;

use crate::config::{self, Config};

pub use monitor::cmd_monitor;
pub use report::{cmd_events, cmd_sessions, cmd_stations};
pub use setup::{cmd_check_isrc, cmd_init_config};

/// Airtrack CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (default: the user config directory)
    #[arg(short, long, global = true, env = "AIRTRACK_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Monitor stations until interrupted
    Monitor {
        /// Only monitor these station ids (default: all active stations)
        #[arg(short, long)]
        station: Vec<i64>,
    },
    /// List known stations
    Stations,
    /// Show play sessions of a station
    Sessions {
        /// Station id
        #[arg(short, long)]
        station: i64,
        /// Maximum number of sessions to show
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },
    /// Show recent detection events of a station
    Events {
        /// Station id
        #[arg(short, long)]
        station: i64,
        /// Maximum number of events to show
        #[arg(short, long, default_value = "20")]
        limit: i64,
        /// Show only accepted detections
        #[arg(long)]
        accepted: bool,
    },
    /// Validate and normalize an ISRC
    CheckIsrc {
        /// The code to check
        code: String,
    },
    /// Write a default config file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Run the specified CLI command.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::CheckIsrc { code } => cmd_check_isrc(code),
        Commands::InitConfig { force } => cmd_init_config(cli.config.as_deref(), *force),
        command => {
            let config = load_config(cli)?;
            let rt = Runtime::new()?;
            match command {
                Commands::Monitor { station } => cmd_monitor(&rt, &config, station),
                Commands::Stations => cmd_stations(&rt, &config),
                Commands::Sessions { station, limit } => {
                    cmd_sessions(&rt, &config, *station, *limit)
                }
                Commands::Events {
                    station,
                    limit,
                    accepted,
                } => cmd_events(&rt, &config, *station, *limit, *accepted),
                Commands::CheckIsrc { .. } | Commands::InitConfig { .. } => Ok(()),
            }
        }
    }
}

// ============================================================================
// Shared helper functions
// ============================================================================

/// Load the config from `--config` (strict) or the default location.
fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let config = match &cli.config {
        Some(path) => config::load_from(path)?,
        None => config::load(),
    };
    config.validate()?;
    Ok(config)
}

/// Open the configured database, running migrations.
pub(crate) async fn open_db(config: &Config) -> anyhow::Result<sqlx::SqlitePool> {
    let db_url = crate::db::db_url(Some(&config.database));
    crate::db::init_db(&db_url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to open database {}: {}", config.database.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sessions_command() {
        let cli = Cli::try_parse_from(["airtrack", "sessions", "--station", "3", "--limit", "5"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Sessions {
                station: 3,
                limit: 5
            }
        ));
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_parse_monitor_with_global_config() {
        let cli = Cli::try_parse_from([
            "airtrack", "monitor", "-s", "1", "-s", "2", "--config", "/tmp/a.toml",
        ])
        .unwrap();
        match cli.command {
            Commands::Monitor { station } => assert_eq!(station, vec![1, 2]),
            _ => panic!("expected monitor"),
        }
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/a.toml")));
    }

    #[test]
    fn test_sessions_requires_station() {
        assert!(Cli::try_parse_from(["airtrack", "sessions"]).is_err());
    }
}
