//! Open-Meteo daily weather source
//!
//! This module fetches daily forecasts from the Open-Meteo API and parses
//! them into `WeatherDay` records.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use tracing::info;

use super::ForecastSource;
use crate::data::{Location, WeatherCondition, WeatherDay, WeatherForecast};
use crate::error::ApiError;
use crate::transport::HttpTransport;

/// Base URL for the Open-Meteo API
pub const OPEN_METEO_BASE_URL: &str = "https://api.open-meteo.com/v1/forecast";

/// Longest forecast Open-Meteo serves
pub const MAX_FORECAST_DAYS: u32 = 16;

const DAILY_FIELDS: &str = "weather_code,temperature_2m_max,temperature_2m_min,precipitation_sum,precipitation_probability_max,wind_speed_10m_max,uv_index_max,sunrise,sunset";

/// Open-Meteo API response structure
#[derive(Debug, Deserialize)]
struct OpenMeteoResponse {
    daily: DailyWeather,
}

/// Daily weather arrays from Open-Meteo, one element per date
#[derive(Debug, Deserialize)]
struct DailyWeather {
    time: Vec<String>,
    weather_code: Vec<Option<u8>>,
    temperature_2m_max: Vec<Option<f64>>,
    temperature_2m_min: Vec<Option<f64>>,
    #[serde(default)]
    precipitation_sum: Vec<Option<f64>>,
    #[serde(default)]
    precipitation_probability_max: Vec<Option<f64>>,
    #[serde(default)]
    wind_speed_10m_max: Vec<Option<f64>>,
    #[serde(default)]
    uv_index_max: Vec<Option<f64>>,
    #[serde(default)]
    sunrise: Vec<Option<String>>,
    #[serde(default)]
    sunset: Vec<Option<String>>,
}

/// Weather forecast source backed by Open-Meteo
pub struct OpenMeteoSource {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
}

impl OpenMeteoSource {
    /// Create a source against the public Open-Meteo endpoint
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self::with_base_url(transport, OPEN_METEO_BASE_URL)
    }

    /// Create a source against a custom endpoint
    pub fn with_base_url(transport: Arc<dyn HttpTransport>, base_url: &str) -> Self {
        Self {
            transport,
            base_url: base_url.to_string(),
        }
    }

    /// Parse the Open-Meteo response into day records
    fn parse_response(&self, response: OpenMeteoResponse) -> Result<Vec<WeatherDay>, ApiError> {
        let daily = response.daily;
        let len = daily.time.len();

        // Validate that the required arrays have the same length
        if daily.weather_code.len() != len
            || daily.temperature_2m_max.len() != len
            || daily.temperature_2m_min.len() != len
        {
            return Err(ApiError::Data(
                "daily arrays have inconsistent lengths".to_string(),
            ));
        }

        let mut days = Vec::with_capacity(len);
        for i in 0..len {
            let date = NaiveDate::parse_from_str(&daily.time[i], "%Y-%m-%d")
                .map_err(|_| ApiError::Data(format!("Invalid date: {}", daily.time[i])))?;
            let (Some(code), Some(temperature_max), Some(temperature_min)) = (
                daily.weather_code[i],
                daily.temperature_2m_max[i],
                daily.temperature_2m_min[i],
            ) else {
                // Open-Meteo pads the tail of long forecasts with nulls
                continue;
            };

            days.push(WeatherDay {
                date,
                condition: weather_code_to_condition(code),
                weather_code: code,
                temperature_max,
                temperature_min,
                precipitation_sum: at(&daily.precipitation_sum, i).unwrap_or(0.0),
                precipitation_probability: at(&daily.precipitation_probability_max, i)
                    .map(|p| p.clamp(0.0, 100.0).round() as u8),
                wind_speed_max: at(&daily.wind_speed_10m_max, i).unwrap_or(0.0),
                uv_index_max: at(&daily.uv_index_max, i),
                sunrise: text_at(&daily.sunrise, i).and_then(|s| parse_time(s).ok()),
                sunset: text_at(&daily.sunset, i).and_then(|s| parse_time(s).ok()),
            });
        }

        Ok(days)
    }
}

fn at(values: &[Option<f64>], i: usize) -> Option<f64> {
    values.get(i).copied().flatten()
}

fn text_at(values: &[Option<String>], i: usize) -> Option<&str> {
    values.get(i).and_then(|v| v.as_deref())
}

#[async_trait]
impl ForecastSource for OpenMeteoSource {
    type Forecast = WeatherForecast;

    fn name(&self) -> &str {
        "Open-Meteo"
    }

    async fn fetch_forecast(
        &self,
        location: &Location,
        days: u32,
    ) -> Result<WeatherForecast, ApiError> {
        let days = days.clamp(1, MAX_FORECAST_DAYS);
        let params = vec![
            ("latitude", location.latitude().to_string()),
            ("longitude", location.longitude().to_string()),
            ("daily", DAILY_FIELDS.to_string()),
            ("forecast_days", days.to_string()),
            ("timezone", location.timezone().unwrap_or("auto").to_string()),
        ];

        let response = self.transport.get(&self.base_url, &params).await?;
        if !response.is_success() {
            return Err(ApiError::from_status(response.status, "Open-Meteo"));
        }
        let api_response: OpenMeteoResponse = serde_json::from_value(response.body)?;

        let mut daily = self.parse_response(api_response)?;
        daily.truncate(days as usize);

        let forecast = WeatherForecast::new(location.clone(), daily, self.name(), days);
        forecast.validate()?;

        info!(location = location.name(), days = forecast.daily.len(), "Weather forecast fetched");
        Ok(forecast)
    }

    async fn shutdown(&self) {
        self.transport.close().await;
    }
}

/// Parse a time string in ISO 8601 format (e.g., "2024-07-15T05:30") to NaiveTime
fn parse_time(time_str: &str) -> Result<NaiveTime, ApiError> {
    // Extract the time portion after 'T'
    let time_part = time_str
        .split('T')
        .nth(1)
        .ok_or_else(|| ApiError::Data(format!("Invalid time format: {}", time_str)))?;

    NaiveTime::parse_from_str(time_part, "%H:%M")
        .map_err(|_| ApiError::Data(format!("Invalid time format: {}", time_str)))
}

/// Map WMO weather code to WeatherCondition enum
///
/// Weather codes from WMO (World Meteorological Organization):
/// - 0: Clear sky
/// - 1-3: Partly cloudy
/// - 45, 48: Fog
/// - 51-55: Drizzle
/// - 56-57: Freezing drizzle
/// - 61-65: Rain
/// - 66-67: Freezing rain
/// - 71-77: Snow
/// - 80-82: Rain showers
/// - 85-86: Snow showers
/// - 95-99: Thunderstorm
pub fn weather_code_to_condition(code: u8) -> WeatherCondition {
    match code {
        0 => WeatherCondition::Clear,
        1..=3 => WeatherCondition::PartlyCloudy,
        45 | 48 => WeatherCondition::Fog,
        51..=55 | 61..=65 | 80..=82 => WeatherCondition::Rain,
        56..=57 | 66..=67 => WeatherCondition::Showers,
        71..=77 | 85..=86 => WeatherCondition::Snow,
        95..=99 => WeatherCondition::Thunderstorm,
        _ => WeatherCondition::Cloudy, // Default for unknown codes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::{MockReply, MockTransport};
    use serde_json::json;

    /// Sample valid Open-Meteo daily response
    fn valid_response() -> serde_json::Value {
        json!({
            "latitude": 49.28,
            "longitude": -123.12,
            "timezone": "America/Vancouver",
            "daily_units": { "time": "iso8601", "temperature_2m_max": "°C" },
            "daily": {
                "time": ["2024-07-15", "2024-07-16", "2024-07-17"],
                "weather_code": [2, 61, null],
                "temperature_2m_max": [22.5, 18.0, null],
                "temperature_2m_min": [14.0, 12.5, null],
                "precipitation_sum": [0.0, 6.4, null],
                "precipitation_probability_max": [5, 90, null],
                "wind_speed_10m_max": [12.5, 25.1, null],
                "uv_index_max": [7.5, 3.0, null],
                "sunrise": ["2024-07-15T05:30", "2024-07-16T05:31", null],
                "sunset": ["2024-07-15T21:15", "2024-07-16T21:14", null]
            }
        })
    }

    fn location() -> Location {
        Location::new("Vancouver", 49.28, -123.12)
            .unwrap()
            .with_timezone(Some("America/Vancouver".to_string()))
    }

    #[tokio::test]
    async fn test_fetch_parses_daily_records() {
        let transport = Arc::new(MockTransport::new().json("open-meteo", valid_response()));
        let source = OpenMeteoSource::new(transport.clone());

        let forecast = source.fetch_forecast(&location(), 3).await.unwrap();

        // trailing null day is skipped
        assert_eq!(forecast.daily.len(), 2);
        let day = &forecast.daily[0];
        assert_eq!(day.condition, WeatherCondition::PartlyCloudy);
        assert!((day.temperature_max - 22.5).abs() < 0.01);
        assert_eq!(day.precipitation_probability, Some(5));
        assert_eq!(day.sunrise, NaiveTime::from_hms_opt(5, 30, 0));
        assert_eq!(forecast.daily[1].condition, WeatherCondition::Rain);
        assert_eq!(forecast.source_name, "Open-Meteo");

        let (_, params) = &transport.requests()[0];
        assert!(params.contains(&("forecast_days", "3".to_string())));
        assert!(params.contains(&("timezone", "America/Vancouver".to_string())));
    }

    #[tokio::test]
    async fn test_forecast_days_clamped_to_api_limit() {
        let transport = Arc::new(MockTransport::new().json("open-meteo", valid_response()));
        let source = OpenMeteoSource::new(transport.clone());

        source.fetch_forecast(&location(), 30).await.unwrap();

        let (_, params) = &transport.requests()[0];
        assert!(params.contains(&("forecast_days", "16".to_string())));
    }

    #[tokio::test]
    async fn test_inconsistent_arrays_are_data_error() {
        let transport = Arc::new(MockTransport::new().json(
            "open-meteo",
            json!({
                "daily": {
                    "time": ["2024-07-15", "2024-07-16"],
                    "weather_code": [2],
                    "temperature_2m_max": [22.5, 18.0],
                    "temperature_2m_min": [14.0, 12.5]
                }
            }),
        ));

        let result = OpenMeteoSource::new(transport).fetch_forecast(&location(), 2).await;

        assert!(matches!(result, Err(ApiError::Data(_))));
    }

    #[tokio::test]
    async fn test_http_error_propagates() {
        let transport = Arc::new(
            MockTransport::new().route("open-meteo", MockReply::Json(500, json!({}))),
        );

        let result = OpenMeteoSource::new(transport).fetch_forecast(&location(), 2).await;

        assert!(matches!(result, Err(ApiError::Network(_))));
    }

    #[tokio::test]
    async fn test_missing_daily_is_data_error() {
        let transport = Arc::new(MockTransport::new().json("open-meteo", json!({ "current": {} })));

        let result = OpenMeteoSource::new(transport).fetch_forecast(&location(), 2).await;

        assert!(matches!(result, Err(ApiError::Data(_))));
    }

    #[test]
    fn test_weather_code_mapping() {
        // Clear
        assert_eq!(weather_code_to_condition(0), WeatherCondition::Clear);

        // Partly cloudy
        assert_eq!(weather_code_to_condition(1), WeatherCondition::PartlyCloudy);
        assert_eq!(weather_code_to_condition(3), WeatherCondition::PartlyCloudy);

        // Fog
        assert_eq!(weather_code_to_condition(45), WeatherCondition::Fog);
        assert_eq!(weather_code_to_condition(48), WeatherCondition::Fog);

        // Rain (drizzle, rain, rain showers)
        assert_eq!(weather_code_to_condition(51), WeatherCondition::Rain);
        assert_eq!(weather_code_to_condition(63), WeatherCondition::Rain);
        assert_eq!(weather_code_to_condition(82), WeatherCondition::Rain);

        // Showers (freezing drizzle, freezing rain)
        assert_eq!(weather_code_to_condition(56), WeatherCondition::Showers);
        assert_eq!(weather_code_to_condition(67), WeatherCondition::Showers);

        // Snow
        assert_eq!(weather_code_to_condition(71), WeatherCondition::Snow);
        assert_eq!(weather_code_to_condition(86), WeatherCondition::Snow);

        // Thunderstorm
        assert_eq!(weather_code_to_condition(95), WeatherCondition::Thunderstorm);
        assert_eq!(weather_code_to_condition(99), WeatherCondition::Thunderstorm);

        // Unknown codes default to Cloudy
        assert_eq!(weather_code_to_condition(100), WeatherCondition::Cloudy);
        assert_eq!(weather_code_to_condition(255), WeatherCondition::Cloudy);
    }

    #[test]
    fn test_parse_time() {
        let time = parse_time("2024-07-15T05:30").expect("Failed to parse time");
        assert_eq!(time, NaiveTime::from_hms_opt(5, 30, 0).unwrap());

        let time = parse_time("2024-07-15T00:00").expect("Failed to parse time");
        assert_eq!(time, NaiveTime::from_hms_opt(0, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_time_invalid() {
        // Missing T separator
        assert!(parse_time("2024-07-15 05:30").is_err());

        // Invalid format
        assert!(parse_time("not a time").is_err());
    }
}
