//! Combined weather + astronomy forecast

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{AstronomyDay, AstronomyForecast, Location, WeatherDay, WeatherForecast};
use crate::error::Domain;

/// Days covered by a combined forecast when neither domain reaches further
pub const DEFAULT_WINDOW_DAYS: i64 = 7;

/// Which domains contributed to a combined forecast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForecastStatus {
    /// Both domains present with daily records
    Complete,
    /// Only weather present
    WeatherOnly,
    /// Only astronomy present
    AstronomyOnly,
    /// Both domains present but no date could be merged
    PartialFailure,
    /// Neither domain present
    CompleteFailure,
}

impl ForecastStatus {
    /// Derives the status from domain presence and whether any days were merged
    pub fn determine(has_weather: bool, has_astronomy: bool, has_daily: bool) -> Self {
        match (has_weather, has_astronomy) {
            (true, true) if has_daily => ForecastStatus::Complete,
            (true, true) => ForecastStatus::PartialFailure,
            (true, false) => ForecastStatus::WeatherOnly,
            (false, true) => ForecastStatus::AstronomyOnly,
            (false, false) => ForecastStatus::CompleteFailure,
        }
    }
}

/// Quality rating of a combined day
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DataQuality {
    Poor,
    Fair,
    Good,
    Excellent,
}

impl DataQuality {
    pub fn rate(weather: Option<&WeatherDay>, astronomy: Option<&AstronomyDay>) -> Self {
        match (weather, astronomy) {
            (Some(_), Some(a)) if a.has_events() => DataQuality::Excellent,
            (Some(_), Some(_)) => DataQuality::Good,
            (Some(_), None) | (None, Some(_)) => DataQuality::Fair,
            (None, None) => DataQuality::Poor,
        }
    }
}

/// Weather and astronomy for one date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedDay {
    pub date: NaiveDate,
    pub weather: Option<WeatherDay>,
    pub astronomy: Option<AstronomyDay>,
    pub quality: DataQuality,
}

impl CombinedDay {
    /// Good observing night: clear sky and something to look at
    pub fn is_good_for_observing(&self) -> bool {
        let clear = self
            .weather
            .as_ref()
            .map(|w| w.condition.is_clear_sky())
            .unwrap_or(false);
        let interesting = self
            .astronomy
            .as_ref()
            .map(AstronomyDay::has_events)
            .unwrap_or(false);
        clear && interesting
    }
}

/// Result of one combined refresh cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedForecast {
    pub location: Location,
    pub daily_forecasts: Vec<CombinedDay>,
    pub weather_forecast: Option<WeatherForecast>,
    pub astronomy_forecast: Option<AstronomyForecast>,
    pub status: ForecastStatus,
    pub error_messages: Vec<String>,
    pub last_updated: DateTime<Utc>,
}

impl CombinedForecast {
    /// Merges whichever domain forecasts are present into daily records
    ///
    /// Covers `today..today+6` widened to both domains' extents; dates with
    /// data from neither domain are dropped.
    pub fn build(
        location: Location,
        weather: Option<WeatherForecast>,
        astronomy: Option<AstronomyForecast>,
        error_messages: Vec<String>,
        today: NaiveDate,
    ) -> Self {
        let daily_forecasts = merge_daily(weather.as_ref(), astronomy.as_ref(), today);
        let status = ForecastStatus::determine(
            weather.is_some(),
            astronomy.is_some(),
            !daily_forecasts.is_empty(),
        );

        Self {
            location,
            daily_forecasts,
            weather_forecast: weather,
            astronomy_forecast: astronomy,
            status,
            error_messages,
            last_updated: Utc::now(),
        }
    }

    /// Rebuilds with new weather data, keeping the current astronomy data
    pub fn with_weather(&self, weather: WeatherForecast, today: NaiveDate) -> Self {
        Self::build(
            self.location.clone(),
            Some(weather),
            self.astronomy_forecast.clone(),
            errors_without(&self.error_messages, Domain::Weather),
            today,
        )
    }

    /// Rebuilds with new astronomy data, keeping the current weather data
    pub fn with_astronomy(&self, astronomy: AstronomyForecast, today: NaiveDate) -> Self {
        Self::build(
            self.location.clone(),
            self.weather_forecast.clone(),
            Some(astronomy),
            errors_without(&self.error_messages, Domain::Astronomy),
            today,
        )
    }

    pub fn has_data(&self) -> bool {
        !self.daily_forecasts.is_empty()
    }

    pub fn day(&self, date: NaiveDate) -> Option<&CombinedDay> {
        self.daily_forecasts.iter().find(|d| d.date == date)
    }

    /// Dates with clear skies and at least one astronomy event
    pub fn good_observing_days(&self) -> Vec<&CombinedDay> {
        self.daily_forecasts
            .iter()
            .filter(|d| d.is_good_for_observing())
            .collect()
    }
}

/// Formats an error message attributed to a domain
pub fn domain_error(domain: Domain, message: impl std::fmt::Display) -> String {
    format!("{}: {}", domain, message)
}

fn errors_without(messages: &[String], domain: Domain) -> Vec<String> {
    let prefix = format!("{}:", domain);
    messages
        .iter()
        .filter(|m| !m.starts_with(&prefix))
        .cloned()
        .collect()
}

fn merge_daily(
    weather: Option<&WeatherForecast>,
    astronomy: Option<&AstronomyForecast>,
    today: NaiveDate,
) -> Vec<CombinedDay> {
    let mut start = today;
    let mut end = today
        .checked_add_signed(Duration::days(DEFAULT_WINDOW_DAYS - 1))
        .unwrap_or(NaiveDate::MAX);

    let ranges = [
        weather.and_then(|w| w.date_range()),
        astronomy.and_then(|a| a.date_range()),
    ];
    for (first, last) in ranges.into_iter().flatten() {
        start = start.min(first);
        end = end.max(last);
    }

    start
        .iter_days()
        .take_while(|date| *date <= end)
        .filter_map(|date| {
            let weather_day = weather.and_then(|w| w.day(date)).cloned();
            let astronomy_day = astronomy.and_then(|a| a.day(date)).cloned();
            if weather_day.is_none() && astronomy_day.is_none() {
                return None;
            }
            let quality = DataQuality::rate(weather_day.as_ref(), astronomy_day.as_ref());
            Some(CombinedDay {
                date,
                weather: weather_day,
                astronomy: astronomy_day,
                quality,
            })
        })
        .collect()
}
