//! Application configuration
//!
//! Loaded once at startup from a JSON file and handed to components by value.
//! Nothing in the forecast pipeline mutates it.

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::Location;

/// Environment variable pointing at an explicit config file
pub const CONFIG_PATH_ENV: &str = "ASTRODASH_CONFIG";

/// Environment variable overriding the NASA API key
pub const NASA_API_KEY_ENV: &str = "NASA_API_KEY";

/// Errors that can occur when loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file exists but could not be read
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The config file is not valid JSON for `AppConfig`
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// A value is out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Observer location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: Option<String>,
    pub elevation: Option<f64>,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            name: "Greenwich".to_string(),
            latitude: 51.4769,
            longitude: -0.0005,
            timezone: Some("Europe/London".to_string()),
            elevation: None,
        }
    }
}

/// NASA API settings and per-source switches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NasaConfig {
    pub api_key: String,
    pub base_url: String,
    pub apod: bool,
    pub iss: bool,
    pub neo: bool,
    pub epic: bool,
    /// Manager-level freshness window
    pub cache_duration_secs: u64,
    /// Request budget per sliding hour
    pub requests_per_hour: usize,
    pub apod_max_days: u32,
    pub neo_window_days: u32,
    pub iss_pass_count: u32,
    pub epic_max_attempts: u32,
    pub epic_target_count: usize,
}

impl Default for NasaConfig {
    fn default() -> Self {
        Self {
            api_key: "DEMO_KEY".to_string(),
            base_url: "https://api.nasa.gov".to_string(),
            apod: true,
            iss: true,
            neo: true,
            epic: true,
            cache_duration_secs: 3600,
            requests_per_hour: 1000,
            apod_max_days: 7,
            neo_window_days: 7,
            iss_pass_count: 10,
            epic_max_attempts: 7,
            epic_target_count: 1,
        }
    }
}

/// Weather forecast settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub enabled: bool,
    pub base_url: String,
    pub cache_duration_secs: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://api.open-meteo.com/v1/forecast".to_string(),
            cache_duration_secs: 1800,
        }
    }
}

/// HTTP client settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 2,
            user_agent: concat!("astrodash/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub location: LocationConfig,
    pub nasa: NasaConfig,
    pub weather: WeatherConfig,
    pub http: HttpConfig,
    /// Days requested from each domain
    pub forecast_days: u32,
    /// Freshness window of the combined forecast
    pub combined_refresh_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            location: LocationConfig::default(),
            nasa: NasaConfig::default(),
            weather: WeatherConfig::default(),
            http: HttpConfig::default(),
            forecast_days: 7,
            combined_refresh_secs: 300,
        }
    }
}

impl AppConfig {
    /// Loads configuration, resolving the file path in order:
    /// explicit `path`, `ASTRODASH_CONFIG`, then the platform config directory.
    ///
    /// A missing file is not an error; defaults are used. `NASA_API_KEY`
    /// overrides the key from the file.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from))
            .or_else(default_config_path);

        let mut config = match resolved {
            Some(ref p) if p.exists() => Self::from_file(p)?,
            _ => Self::default(),
        };

        if let Ok(key) = std::env::var(NASA_API_KEY_ENV) {
            if !key.trim().is_empty() {
                config.nasa.api_key = key;
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a config file without applying env overrides
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Checks value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.location()?;

        if self.forecast_days == 0 {
            return Err(ConfigError::Invalid("forecast_days must be at least 1".into()));
        }
        if self.nasa.requests_per_hour == 0 {
            return Err(ConfigError::Invalid(
                "nasa.requests_per_hour must be at least 1".into(),
            ));
        }
        if self.nasa.apod_max_days == 0 || self.nasa.neo_window_days == 0 {
            return Err(ConfigError::Invalid(
                "NASA request windows must be at least 1 day".into(),
            ));
        }
        if self.http.timeout_secs == 0 {
            return Err(ConfigError::Invalid("http.timeout_secs must be non-zero".into()));
        }
        Ok(())
    }

    /// Builds the validated default location
    pub fn location(&self) -> Result<Location, ConfigError> {
        let loc = &self.location;
        Location::new(&loc.name, loc.latitude, loc.longitude)
            .map(|l| {
                l.with_timezone(loc.timezone.clone())
                    .with_elevation(loc.elevation)
            })
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Whether any astronomy source is switched on
    pub fn astronomy_enabled(&self) -> bool {
        self.nasa.apod || self.nasa.iss || self.nasa.neo || self.nasa.epic
    }
}

/// `<config dir>/astrodash/config.json`, if a home directory exists
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "astrodash").map(|dirs| dirs.config_dir().join("config.json"))
}
