//! Command-line interface parsing for astrodash
//!
//! This module handles parsing of CLI arguments using clap and folds them
//! into the loaded configuration. Everything is validated here, before any
//! network I/O happens.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;

use crate::config::{AppConfig, ConfigError};
use crate::data::{CombinedDay, CombinedForecast, Location};
use crate::sources::weather::MAX_FORECAST_DAYS;

/// Error types for CLI argument handling
#[derive(Debug, Error)]
pub enum CliError {
    /// `--days` outside the supported range
    #[error("Invalid day count: {0}. Expected 1 to 16")]
    InvalidDays(u32),

    /// Coordinates or name rejected
    #[error("Invalid location: {0}")]
    InvalidLocation(String),

    /// Both domains switched off
    #[error("Nothing to show: weather and astronomy are both disabled")]
    NothingEnabled,

    /// `--watch 0`
    #[error("Watch interval must be at least 1 second")]
    InvalidWatch,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// astrodash - Weather and astronomy forecast for your sky
#[derive(Parser, Debug)]
#[command(name = "astrodash")]
#[command(about = "Combined weather and astronomy forecast from Open-Meteo and NASA")]
#[command(version)]
pub struct Cli {
    /// Path to a JSON config file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Number of days to forecast
    #[arg(long, value_name = "N")]
    pub days: Option<u32>,

    /// Latitude in degrees (requires --lon)
    #[arg(long, value_name = "LAT", allow_hyphen_values = true, requires = "lon")]
    pub lat: Option<f64>,

    /// Longitude in degrees (requires --lat)
    #[arg(long, value_name = "LON", allow_hyphen_values = true, requires = "lat")]
    pub lon: Option<f64>,

    /// Display name for the location
    #[arg(long, value_name = "NAME")]
    pub name: Option<String>,

    /// Skip the weather forecast
    #[arg(long)]
    pub no_weather: bool,

    /// Skip NASA astronomy data
    #[arg(long)]
    pub no_astronomy: bool,

    /// Print the combined forecast as JSON
    #[arg(long)]
    pub json: bool,

    /// Keep running and refresh every SECS seconds
    ///
    /// Examples:
    ///   astrodash --watch 300        # refresh every 5 minutes
    #[arg(long, value_name = "SECS")]
    pub watch: Option<u64>,
}

/// Everything the binary needs to run, after CLI overrides
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config: AppConfig,
    pub location: Location,
    pub days: u32,
    pub json: bool,
    pub watch: Option<Duration>,
}

impl RunOptions {
    /// Loads the config file named by `--config` (or the default path) and
    /// applies the CLI overrides
    pub fn load(cli: &Cli) -> Result<Self, CliError> {
        let config = AppConfig::load(cli.config.as_deref())?;
        Self::from_cli(cli, config)
    }

    /// Applies CLI overrides to `config` and validates the result
    ///
    /// # Returns
    /// * `Ok(RunOptions)` ready for building the pipeline
    /// * `Err(CliError)` if any value is out of range
    pub fn from_cli(cli: &Cli, mut config: AppConfig) -> Result<Self, CliError> {
        if let (Some(lat), Some(lon)) = (cli.lat, cli.lon) {
            config.location.latitude = lat;
            config.location.longitude = lon;
            // a configured timezone belongs to the configured place
            config.location.timezone = None;
            if cli.name.is_none() {
                config.location.name = format!("{:.4}, {:.4}", lat, lon);
            }
        }
        if let Some(name) = &cli.name {
            config.location.name = name.clone();
        }
        if cli.no_weather {
            config.weather.enabled = false;
        }
        if cli.no_astronomy {
            config.nasa.apod = false;
            config.nasa.iss = false;
            config.nasa.neo = false;
            config.nasa.epic = false;
        }

        let days = cli.days.unwrap_or(config.forecast_days);
        if days == 0 || days > MAX_FORECAST_DAYS {
            return Err(CliError::InvalidDays(days));
        }
        config.forecast_days = days;

        let loc = &config.location;
        let location = Location::new(&loc.name, loc.latitude, loc.longitude)
            .map_err(|e| CliError::InvalidLocation(e.to_string()))?
            .with_timezone(loc.timezone.clone())
            .with_elevation(loc.elevation);

        if !config.weather.enabled && !config.astronomy_enabled() {
            return Err(CliError::NothingEnabled);
        }

        let watch = match cli.watch {
            Some(0) => return Err(CliError::InvalidWatch),
            Some(secs) => Some(Duration::from_secs(secs)),
            None => None,
        };

        config.validate()?;

        Ok(Self {
            config,
            location,
            days,
            json: cli.json,
            watch,
        })
    }
}

/// Renders a combined forecast as plain text, one line per day
pub fn format_forecast(forecast: &CombinedForecast) -> String {
    let mut lines = vec![format!(
        "{} ({:.2}, {:.2}) - {:?}",
        forecast.location.name(),
        forecast.location.latitude(),
        forecast.location.longitude(),
        forecast.status
    )];
    lines.extend(forecast.daily_forecasts.iter().map(format_day));
    lines.extend(forecast.error_messages.iter().map(|m| format!("! {}", m)));
    lines.join("\n")
}

fn format_day(day: &CombinedDay) -> String {
    let weather = day
        .weather
        .as_ref()
        .map(|w| w.summary())
        .unwrap_or_else(|| "no weather".to_string());
    let (moon, event) = match &day.astronomy {
        Some(a) => (
            format!("{} {:.0}%", a.moon_phase().label(), a.moon_illumination() * 100.0),
            a.primary_event()
                .map(|e| e.title().to_string())
                .unwrap_or_else(|| "-".to_string()),
        ),
        None => ("-".to_string(), "-".to_string()),
    };
    format!(
        "{} | {} | {} | {} | {:?}",
        day.date, weather, moon, event, day.quality
    )
}
