//! Core data models for astrodash
//!
//! This module contains the data types shared by both forecast domains:
//! the observer `Location` and the generic multi-day `Forecast` bundle.
//! Domain-specific day records live in the submodules.

pub mod astronomy;
pub mod combined;
pub mod weather;

pub use astronomy::{
    AstronomyDay, AstronomyEvent, AstronomyEventType, AstronomyForecast, EventBuilder,
    EventPriority, MoonPhase,
};
pub use combined::{CombinedDay, CombinedForecast, DataQuality, ForecastStatus};
pub use weather::{WeatherCondition, WeatherDay, WeatherForecast};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// An observer location
///
/// Validated at construction and immutable afterwards. Deserializing goes
/// through the same checks as `Location::new`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LocationFields")]
pub struct Location {
    name: String,
    latitude: f64,
    longitude: f64,
    timezone: Option<String>,
    elevation: Option<f64>,
}

#[derive(Deserialize)]
struct LocationFields {
    name: String,
    latitude: f64,
    longitude: f64,
    timezone: Option<String>,
    elevation: Option<f64>,
}

impl TryFrom<LocationFields> for Location {
    type Error = ApiError;

    fn try_from(fields: LocationFields) -> Result<Self, Self::Error> {
        Ok(Location::new(&fields.name, fields.latitude, fields.longitude)?
            .with_timezone(fields.timezone)
            .with_elevation(fields.elevation))
    }
}

impl Location {
    /// Creates a location, rejecting empty names and out-of-range coordinates
    pub fn new(name: &str, latitude: f64, longitude: f64) -> Result<Self, ApiError> {
        let location = Self {
            name: name.trim().to_string(),
            latitude,
            longitude,
            timezone: None,
            elevation: None,
        };
        location.validate()?;
        Ok(location)
    }

    /// Sets the IANA timezone name
    pub fn with_timezone(mut self, timezone: Option<String>) -> Self {
        self.timezone = timezone;
        self
    }

    /// Sets the elevation in meters
    pub fn with_elevation(mut self, elevation: Option<f64>) -> Self {
        self.elevation = elevation;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn timezone(&self) -> Option<&str> {
        self.timezone.as_deref()
    }

    pub fn elevation(&self) -> Option<f64> {
        self.elevation
    }

    /// Checks the name and coordinate ranges
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.name.is_empty() {
            return Err(ApiError::Data("location name must not be empty".into()));
        }
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(ApiError::Data(format!(
                "latitude {} outside [-90, 90]",
                self.latitude
            )));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(ApiError::Data(format!(
                "longitude {} outside [-180, 180]",
                self.longitude
            )));
        }
        Ok(())
    }

    /// Cache key for a `(location, days)` request
    pub fn cache_key(&self, days: u32) -> String {
        format!("{:.4}_{:.4}_{}", self.latitude, self.longitude, days)
    }

    /// Whether two locations refer to the same coordinates
    pub fn same_place(&self, other: &Location) -> bool {
        (self.latitude - other.latitude).abs() < 1e-6
            && (self.longitude - other.longitude).abs() < 1e-6
    }
}

/// A record covering one calendar date
pub trait DailyRecord {
    fn date(&self) -> NaiveDate;
}

/// Multi-day bundle produced by one source for one fetch cycle
///
/// Superseded, never mutated, by the next successful fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast<D> {
    /// Location the forecast is for
    pub location: Location,
    /// One record per date, chronological
    pub daily: Vec<D>,
    /// When the forecast was assembled
    pub last_updated: DateTime<Utc>,
    /// Name of the producing source
    pub source_name: String,
    /// Number of days that were requested
    pub requested_days: u32,
}

impl<D: DailyRecord> Forecast<D> {
    pub fn new(location: Location, daily: Vec<D>, source_name: &str, requested_days: u32) -> Self {
        Self {
            location,
            daily,
            last_updated: Utc::now(),
            source_name: source_name.to_string(),
            requested_days,
        }
    }

    /// Structural checks: non-empty, within the requested day count,
    /// strictly increasing dates and a sane location
    pub fn validate(&self) -> Result<(), ApiError> {
        self.location.validate()?;

        if self.daily.is_empty() {
            return Err(ApiError::Data(format!(
                "{} forecast contains no days",
                self.source_name
            )));
        }
        if self.daily.len() > self.requested_days as usize {
            return Err(ApiError::Data(format!(
                "{} forecast has {} days but {} were requested",
                self.source_name,
                self.daily.len(),
                self.requested_days
            )));
        }
        if self
            .daily
            .windows(2)
            .any(|pair| pair[0].date() >= pair[1].date())
        {
            return Err(ApiError::Data(format!(
                "{} forecast dates are not strictly increasing",
                self.source_name
            )));
        }
        Ok(())
    }

    /// Record for a specific date
    pub fn day(&self, date: NaiveDate) -> Option<&D> {
        self.daily.iter().find(|d| d.date() == date)
    }

    /// First and last covered dates
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        Some((self.daily.first()?.date(), self.daily.last()?.date()))
    }
}
