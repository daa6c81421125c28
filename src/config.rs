//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory unless a path is
//! given explicitly on the command line:
//! - Windows: %APPDATA%\airtrack\config.toml
//! - macOS: ~/Library/Application Support/airtrack/config.toml
//! - Linux: ~/.config/airtrack/config.toml
//!
//! The config is loaded once at startup and handed to each component's
//! constructor; nothing reads it from global state.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detection::confidence::{RESERVED_METHOD_TAGS, default_provider_trust};

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file
    pub database: PathBuf,

    /// Directory the capture collaborator writes segment files into
    pub spool_dir: PathBuf,

    /// Matching and session tuning
    pub detection: DetectionConfig,

    /// External recognition providers, in priority order
    pub providers: Vec<ProviderConfig>,

    /// Monitored stations
    pub stations: Vec<StationConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: PathBuf::from(crate::db::DEFAULT_DB_NAME),
            spool_dir: PathBuf::from("spool"),
            detection: DetectionConfig::default(),
            providers: Vec::new(),
            stations: Vec::new(),
        }
    }
}

/// Matching hierarchy and session tracking settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Confidence at which the hierarchy stops escalating (0.0 - 1.0)
    pub acceptance_threshold: f64,

    /// Minimum similarity for an approximate local match (0.0 - 1.0)
    pub min_local_similarity: f64,

    /// Maximum gap between same-track detections merged into one play
    pub continuity_window_secs: u64,

    /// Audio span covered by a single detection when the segment has none
    pub nominal_span_secs: u64,

    /// How often each station loop wakes up
    pub cycle_interval_secs: u64,

    /// Store signatures of externally identified tracks in the local store
    pub learn_signatures: bool,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            acceptance_threshold: 0.8,
            min_local_similarity: 0.3,
            continuity_window_secs: 15,
            nominal_span_secs: 10,
            cycle_interval_secs: 60,
            learn_signatures: true,
        }
    }
}

impl DetectionConfig {
    pub fn continuity_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.continuity_window_secs as i64)
    }

    pub fn nominal_span(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.nominal_span_secs as i64)
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs.max(1))
    }
}

/// Which concrete provider implementation to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    AcoustId,
    AudD,
}

/// One entry of the provider priority list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,

    /// Method tag recorded on detections from this provider
    pub name: String,

    /// Confidence multiplier; defaults by position in the list
    #[serde(default)]
    pub trust_factor: Option<f64>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries after the first attempt, for transient failures only
    #[serde(default = "default_retries")]
    pub retries: u32,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    #[serde(default)]
    pub api_key: Option<String>,

    /// Override the provider's endpoint (testing, proxies)
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

impl ProviderConfig {
    /// Trust factor for this provider at `position` in the priority list.
    pub fn trust_factor_at(&self, position: usize) -> f64 {
        self.trust_factor
            .unwrap_or_else(|| default_provider_trust(position))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// A monitored broadcast source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationConfig {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub stream_url: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Config {
    /// Check value ranges and cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.detection;
        if !(0.0..=1.0).contains(&d.acceptance_threshold) {
            return Err(ConfigError::Invalid(format!(
                "acceptance_threshold must be within [0, 1], got {}",
                d.acceptance_threshold
            )));
        }
        if !(0.0..=1.0).contains(&d.min_local_similarity) {
            return Err(ConfigError::Invalid(format!(
                "min_local_similarity must be within [0, 1], got {}",
                d.min_local_similarity
            )));
        }

        let mut names = HashSet::new();
        for (position, provider) in self.providers.iter().enumerate() {
            if provider.name.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "provider #{} has an empty name",
                    position + 1
                )));
            }
            if RESERVED_METHOD_TAGS.contains(&provider.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "provider name '{}' collides with a built-in method tag",
                    provider.name
                )));
            }
            if !names.insert(provider.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate provider name '{}'",
                    provider.name
                )));
            }
            let trust = provider.trust_factor_at(position);
            if !(0.0..=1.0).contains(&trust) {
                return Err(ConfigError::Invalid(format!(
                    "trust_factor for '{}' must be within [0, 1], got {}",
                    provider.name, trust
                )));
            }
        }

        let mut ids = HashSet::new();
        for station in &self.stations {
            if !ids.insert(station.id) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate station id {}",
                    station.id
                )));
            }
        }

        Ok(())
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("airtrack"))
}

/// Get the full path to the default config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration from the default location
///
/// Returns default config if the file doesn't exist or can't be parsed.
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        tracing::warn!("Could not determine config directory, using defaults");
        return Config::default();
    };

    if !path.exists() {
        tracing::info!("No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match load_from(&path) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            tracing::warn!("Using default configuration");
            Config::default()
        }
    }
}

/// Load configuration from an explicit path, failing on any problem.
pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
    let contents =
        std::fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
    let config: Config =
        toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
    tracing::info!("Loaded config from {:?}", path);
    Ok(config)
}

/// Save configuration to `path`
///
/// Creates the parent directory if it doesn't exist.
pub fn save(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDir(dir.to_path_buf(), e))?;
    }

    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    // Write atomically (write to temp, then rename)
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, path)
        .map_err(|e| ConfigError::Rename(temp_path, path.to_path_buf(), e))?;

    tracing::info!("Saved config to {:?}", path);
    Ok(())
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read config file {0}: {1}")]
    Read(PathBuf, std::io::Error),

    #[error("Failed to parse config file {0}: {1}")]
    Parse(PathBuf, toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(name: &str) -> ProviderConfig {
        ProviderConfig {
            kind: ProviderKind::AcoustId,
            name: name.to_string(),
            trust_factor: None,
            timeout_secs: default_timeout_secs(),
            retries: default_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            api_key: None,
            base_url: None,
        }
    }

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[detection]"));
        assert!(toml.contains("acceptance_threshold = 0.8"));
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.detection.continuity_window_secs = 30;
        config.providers.push(provider("acoustid"));
        config.stations.push(StationConfig {
            id: 7,
            name: "Radio Seven".to_string(),
            stream_url: Some("http://radio7.example/live".to_string()),
            active: true,
        });

        let toml = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();

        assert_eq!(parsed.detection.continuity_window_secs, 30);
        assert_eq!(parsed.providers.len(), 1);
        assert_eq!(parsed.providers[0].kind, ProviderKind::AcoustId);
        assert_eq!(parsed.stations[0].name, "Radio Seven");
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let toml = r#"
database = "monitor.db"

[[providers]]
kind = "audd"
name = "audd"
api_key = "token"

[[stations]]
id = 1
name = "Radio One"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.database, PathBuf::from("monitor.db"));
        assert_eq!(config.detection.acceptance_threshold, 0.8);
        assert_eq!(config.providers[0].kind, ProviderKind::AudD);
        assert_eq!(config.providers[0].timeout_secs, 10);
        assert_eq!(config.providers[0].retries, 3);
        assert!(config.stations[0].active);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_positional_trust_defaults() {
        let p = provider("a");
        assert_eq!(p.trust_factor_at(0), 0.85);
        assert_eq!(p.trust_factor_at(1), 0.80);
        assert_eq!(p.trust_factor_at(2), 0.75);
        assert_eq!(p.trust_factor_at(5), 0.7);

        let explicit = ProviderConfig {
            trust_factor: Some(0.6),
            ..provider("b")
        };
        assert_eq!(explicit.trust_factor_at(0), 0.6);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.detection.acceptance_threshold = 1.5;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.providers = vec![provider("local_exact")];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.providers = vec![provider("x"), provider("x")];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.providers = vec![ProviderConfig {
            trust_factor: Some(1.2),
            ..provider("x")
        }];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load_from() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.detection.min_local_similarity = 0.5;
        save(&config, &path).unwrap();

        let loaded = load_from(&path).unwrap();
        assert_eq!(loaded.detection.min_local_similarity, 0.5);
    }
}
