//! Weather day records

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use super::{DailyRecord, Forecast};

/// Weather forecast: one `WeatherDay` per date
pub type WeatherForecast = Forecast<WeatherDay>;

/// Types of weather conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeatherCondition {
    Clear,
    PartlyCloudy,
    Cloudy,
    Rain,
    Showers,
    Thunderstorm,
    Snow,
    Fog,
}

impl WeatherCondition {
    pub fn label(&self) -> &'static str {
        match self {
            WeatherCondition::Clear => "Clear",
            WeatherCondition::PartlyCloudy => "Partly cloudy",
            WeatherCondition::Cloudy => "Cloudy",
            WeatherCondition::Rain => "Rain",
            WeatherCondition::Showers => "Showers",
            WeatherCondition::Thunderstorm => "Thunderstorm",
            WeatherCondition::Snow => "Snow",
            WeatherCondition::Fog => "Fog",
        }
    }

    /// Whether the sky is likely clear enough for observing
    pub fn is_clear_sky(&self) -> bool {
        matches!(self, WeatherCondition::Clear | WeatherCondition::PartlyCloudy)
    }
}

/// Forecast weather for one calendar date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherDay {
    /// Forecast date
    pub date: NaiveDate,
    /// Dominant condition
    pub condition: WeatherCondition,
    /// Raw WMO weather code
    pub weather_code: u8,
    /// Maximum temperature in Celsius
    pub temperature_max: f64,
    /// Minimum temperature in Celsius
    pub temperature_min: f64,
    /// Total precipitation in mm
    pub precipitation_sum: f64,
    /// Maximum precipitation probability (0-100)
    pub precipitation_probability: Option<u8>,
    /// Maximum wind speed in km/h
    pub wind_speed_max: f64,
    /// Maximum UV index
    pub uv_index_max: Option<f64>,
    /// Local sunrise time
    pub sunrise: Option<NaiveTime>,
    /// Local sunset time
    pub sunset: Option<NaiveTime>,
}

impl WeatherDay {
    /// One-line description, e.g. "Rain 8°/14°"
    pub fn summary(&self) -> String {
        format!(
            "{} {:.0}°/{:.0}°",
            self.condition.label(),
            self.temperature_min,
            self.temperature_max
        )
    }
}

impl DailyRecord for WeatherDay {
    fn date(&self) -> NaiveDate {
        self.date
    }
}
