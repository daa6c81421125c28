//! Config file creation and ISRC checks.

use std::path::Path;

use crate::config::{self, Config, StationConfig};
use crate::detection::normalize_isrc;

/// Write a default config with one example station.
pub fn cmd_init_config(path: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config::config_path().ok_or(config::ConfigError::NoConfigDir)?,
    };

    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    let config = Config {
        stations: vec![StationConfig {
            id: 1,
            name: "Example FM".to_string(),
            stream_url: None,
            active: true,
        }],
        ..Config::default()
    };
    config::save(&config, &path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

/// Print the normalized form of an ISRC, or why it is rejected.
pub fn cmd_check_isrc(code: &str) -> anyhow::Result<()> {
    match normalize_isrc(code) {
        Some(normalized) => {
            println!("✓ {}", normalized);
            println!("  Country:     {}", &normalized[0..2]);
            println!("  Registrant:  {}", &normalized[2..5]);
            println!("  Year:        {}", &normalized[5..7]);
            println!("  Designation: {}", &normalized[7..12]);
            Ok(())
        }
        None => anyhow::bail!("'{}' is not a valid ISRC (expected CC-XXX-YY-NNNNN)", code),
    }
}
