//! Running the station monitor.

use std::sync::Arc;
use tokio::runtime::Runtime;

use crate::config::Config;
use crate::db::{SqliteStore, activity};
use crate::detection::StatsSink;
use crate::monitor::{self, FanoutStatsSink, LoggingStatsSink, Monitor};

use super::open_db;

/// Monitor stations until Ctrl-C, then close all open sessions.
pub fn cmd_monitor(rt: &Runtime, config: &Config, only: &[i64]) -> anyhow::Result<()> {
    rt.block_on(async {
        let pool = open_db(config).await?;
        for station in &config.stations {
            activity::upsert_station(&pool, station).await?;
        }

        let station_ids: Vec<i64> = config
            .stations
            .iter()
            .filter(|s| s.active)
            .filter(|s| only.is_empty() || only.contains(&s.id))
            .map(|s| s.id)
            .collect();
        if station_ids.is_empty() {
            anyhow::bail!("No active stations to monitor; add [[stations]] to the config");
        }
        for id in only {
            if !station_ids.contains(id) {
                eprintln!("Warning: station {} is unknown or inactive, skipping", id);
            }
        }

        let store = Arc::new(SqliteStore::new(pool));
        let sinks: Vec<Arc<dyn StatsSink>> = vec![store.clone(), Arc::new(LoggingStatsSink)];
        let recovered = monitor::recover_sessions(&store, &FanoutStatsSink::new(sinks)).await?;
        if recovered > 0 {
            println!("Closed {} session(s) left open by a previous run", recovered);
        }

        let handle = Monitor::from_config(config, store)?.start(&station_ids);
        println!(
            "Monitoring {} station(s) from {}. Press Ctrl-C to stop.",
            station_ids.len(),
            config.spool_dir.display()
        );

        tokio::signal::ctrl_c().await?;
        println!("\nStopping...");
        handle.shutdown().await;
        Ok(())
    })
}
