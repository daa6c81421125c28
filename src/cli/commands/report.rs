//! Read-only views of stations, detection events and play sessions.

use tokio::runtime::Runtime;

use crate::config::Config;
use crate::db::activity;
use crate::sessions::format_duration;

use super::open_db;

/// List all stations in the database
pub fn cmd_stations(rt: &Runtime, config: &Config) -> anyhow::Result<()> {
    rt.block_on(async {
        let pool = open_db(config).await?;
        let stations = activity::list_stations(&pool).await?;

        if stations.is_empty() {
            println!("No stations yet. Add [[stations]] to the config and run `monitor`.");
            return Ok(());
        }

        println!("{:>5}  {:<30} {:<8} Stream", "ID", "Name", "Status");
        for station in stations {
            println!(
                "{:>5}  {:<30} {:<8} {}",
                station.id,
                station.name,
                if station.active { "active" } else { "inactive" },
                station.stream_url.as_deref().unwrap_or("-")
            );
        }
        Ok(())
    })
}

/// Show the play sessions of a station, newest first
pub fn cmd_sessions(rt: &Runtime, config: &Config, station_id: i64, limit: i64) -> anyhow::Result<()> {
    rt.block_on(async {
        let pool = open_db(config).await?;
        let sessions = activity::list_sessions(&pool, station_id, limit).await?;

        if sessions.is_empty() {
            println!("No play sessions for station {}", station_id);
            return Ok(());
        }

        println!(
            "{:<25} {:>9} {:>8} {:>6}  State",
            "Started", "Duration", "Track", "Hits"
        );
        for session in sessions {
            println!(
                "{:<25} {:>9} {:>8} {:>6}  {}{}",
                session.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
                format_duration(session.duration_secs()),
                session.track_id,
                session.detection_count,
                session.state.as_str(),
                if session.anomaly { " (overlap)" } else { "" }
            );
        }
        Ok(())
    })
}

/// Show the most recent detection events of a station
pub fn cmd_events(
    rt: &Runtime,
    config: &Config,
    station_id: i64,
    limit: i64,
    accepted_only: bool,
) -> anyhow::Result<()> {
    rt.block_on(async {
        let pool = open_db(config).await?;
        let events = activity::recent_events(&pool, station_id, limit).await?;

        let mut shown = 0;
        for event in events.iter().filter(|e| !accepted_only || e.accepted) {
            let label = match (&event.candidate_title, &event.candidate_artist) {
                (Some(title), Some(artist)) => format!("{} - {}", artist, title),
                (Some(title), None) => title.clone(),
                _ => "-".to_string(),
            };
            println!(
                "{}  {:<18} {:>5.1}%  {}  track={}  {}",
                event.detected_at.format("%Y-%m-%d %H:%M:%S"),
                event.method,
                event.confidence * 100.0,
                if event.accepted { "✓" } else { "?" },
                event
                    .track_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                label
            );
            shown += 1;
        }

        if shown == 0 {
            println!("No detection events for station {}", station_id);
        }
        Ok(())
    })
}
