use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config: {0}")]
    Read(#[from] io::Error),

    #[error("could not parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub location: LocationConfig,
    pub directory: DirectoryConfig,
    pub storage: StorageConfig,
    pub ui: UiConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct LocationConfig {
    pub provider: String,      // "ipapi", "ipwhois", "ipapico" or "none"
    pub lookup_ip: String,     // Address to geolocate; empty asks about our own
    pub allow_live: bool,      // false behaves like a denied permission prompt
    pub timeout_seconds: u64,  // Give up on the live lookup after this long
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            provider: "ipapi".to_string(),
            lookup_ip: String::new(),
            allow_live: true,
            timeout_seconds: 10,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct DirectoryConfig {
    pub paths: Vec<PathBuf>, // Loaded in order; earlier entries win distance ties
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            paths: vec![PathBuf::from("data/facilities.json")],
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub database: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("healthfinder.db"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct UiConfig {
    pub tick_rate_ms: u64,
    pub default_view: String, // "Dashboard" or "Settings"
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            tick_rate_ms: 150,
            default_view: "Dashboard".to_string(),
        }
    }
}

impl Config {
    /// Loads config.toml from the root directory.
    /// If it doesn't exist, creates a default one.
    pub fn load() -> Self {
        Self::load_from("config.toml")
    }

    pub fn load_from<P: AsRef<Path>>(config_path: P) -> Self {
        let config_path = config_path.as_ref();

        match Self::try_load_from(config_path) {
            Ok(config) => return config,
            Err(ConfigError::Parse(e)) => {
                warn!("Failed to parse {}: {}. Using defaults.", config_path.display(), e);
                return Config::default();
            }
            Err(ConfigError::Read(e)) if e.kind() != io::ErrorKind::NotFound => {
                warn!("Failed to read {}: {}. Using defaults.", config_path.display(), e);
                return Config::default();
            }
            Err(ConfigError::Read(_)) => {}
        }

        let default_config = Config::default();

        // Save default config to disk for the user to edit later
        match toml::to_string_pretty(&default_config) {
            Ok(toml_string) => {
                if fs::write(config_path, toml_string).is_err() {
                    warn!("Could not write default {} to disk.", config_path.display());
                }
            }
            Err(e) => warn!("Could not serialize default config: {}", e),
        }

        info!("Loaded default configuration.");
        default_config
    }

    /// Strict variant of [`Config::load_from`]: no defaults, no writes.
    pub fn try_load_from<P: AsRef<Path>>(config_path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(config_path)?;
        Ok(toml::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config::load_from(&path);
        assert_eq!(config.location.provider, "ipapi");
        assert!(path.exists());

        let reloaded = Config::load_from(&path);
        assert_eq!(reloaded.storage.database, config.storage.database);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[location]\nallow_live = false\n\n[directory]\npaths = [\"a.json\", \"b.csv\"]\n",
        )
        .unwrap();

        let config = Config::load_from(&path);
        assert!(!config.location.allow_live);
        assert_eq!(config.location.timeout_seconds, 10);
        assert_eq!(config.directory.paths.len(), 2);
        assert_eq!(config.ui.tick_rate_ms, 150);
    }

    #[test]
    fn unparsable_file_falls_back_without_overwriting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "this is = = not toml").unwrap();

        let config = Config::load_from(&path);
        assert_eq!(config.ui.default_view, "Dashboard");
        assert_eq!(fs::read_to_string(&path).unwrap(), "this is = = not toml");
    }

    #[test]
    fn strict_load_reports_parse_and_read_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let missing = Config::try_load_from(&path).unwrap_err();
        assert!(matches!(missing, ConfigError::Read(_)));
        assert!(!path.exists());

        fs::write(&path, "[ui]\ntick_rate_ms = \"fast\"\n").unwrap();
        let bad = Config::try_load_from(&path).unwrap_err();
        assert!(matches!(bad, ConfigError::Parse(_)));
        assert!(bad.to_string().starts_with("could not parse config"));
    }
}
