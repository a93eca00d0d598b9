//! Top-level forecast manager
//!
//! Owns one source (usually a decorated stack) and keeps the last good
//! forecast. Serves it while fresh, refetches when stale, and falls back to
//! it when a refetch fails.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::data::{AstronomyForecast, Location, WeatherForecast};
use crate::error::ApiError;
use crate::refresh::{ManagerEvent, Subscribers};
use crate::sources::{ForecastSource, SharedSource};

/// Manager for the astronomy domain
pub type AstronomyManager = ForecastManager<SharedSource<AstronomyForecast>>;

/// Manager for the weather domain
pub type WeatherManager = ForecastManager<SharedSource<WeatherForecast>>;

/// Cache state snapshot for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheInfo {
    pub has_cached_data: bool,
    pub last_fetch_time: Option<DateTime<Utc>>,
    pub cache_valid: bool,
    pub cache_duration_seconds: u64,
}

struct CachedForecast<F> {
    forecast: F,
    fetched_at: Instant,
    fetched_wall: DateTime<Utc>,
    location: Location,
    days: u32,
}

impl<F> CachedForecast<F> {
    fn is_fresh(&self, max_age: Duration) -> bool {
        self.fetched_at.elapsed() < max_age
    }

    fn info(&self, max_age: Duration) -> CacheInfo {
        CacheInfo {
            has_cached_data: true,
            last_fetch_time: Some(self.fetched_wall),
            cache_valid: self.is_fresh(max_age),
            cache_duration_seconds: max_age.as_secs(),
        }
    }
}

fn empty_info(max_age: Duration) -> CacheInfo {
    CacheInfo {
        has_cached_data: false,
        last_fetch_time: None,
        cache_valid: false,
        cache_duration_seconds: max_age.as_secs(),
    }
}

/// Serves one domain's forecast with a freshness window and stale fallback
///
/// `cached` is only locked to read or replace the entry. Fetches are
/// serialised by `fetching`, so cache info stays available while one runs.
pub struct ForecastManager<S: ForecastSource> {
    source: S,
    default_location: Location,
    cache_duration: Duration,
    cached: Mutex<Option<CachedForecast<S::Forecast>>>,
    fetching: Mutex<()>,
    subscribers: Subscribers<S::Forecast>,
}

impl<S: ForecastSource> ForecastManager<S> {
    pub fn new(source: S, default_location: Location, cache_duration: Duration) -> Self {
        Self {
            source,
            default_location,
            cache_duration,
            cached: Mutex::new(None),
            fetching: Mutex::new(()),
            subscribers: Subscribers::new(),
        }
    }

    /// Location used when a call does not name one
    pub fn default_location(&self) -> &Location {
        &self.default_location
    }

    /// Registers for forecast, error, loading and cache events
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ManagerEvent<S::Forecast>> {
        self.subscribers.subscribe()
    }

    /// Returns the forecast for `location` (or the default location)
    ///
    /// A cached forecast for the same place and day count younger than the
    /// cache duration is returned without touching the source. When a fetch
    /// fails, any cached forecast is returned instead, however old. The
    /// error only propagates when nothing has ever been cached.
    pub async fn get_forecast(
        &self,
        location: Option<&Location>,
        days: u32,
    ) -> Result<S::Forecast, ApiError> {
        let location = location.unwrap_or(&self.default_location);
        if let Some(forecast) = self.fresh(location, days).await {
            return Ok(forecast);
        }

        let _fetching = self.fetching.lock().await;
        // a fetch that finished while we waited may already cover this request
        if let Some(forecast) = self.fresh(location, days).await {
            return Ok(forecast);
        }

        let _loading = self.subscribers.loading();
        match self.source.fetch_forecast(location, days).await {
            Ok(forecast) => {
                info!(source = self.source.name(), location = location.name(), "Forecast refreshed");
                let entry = CachedForecast {
                    forecast: forecast.clone(),
                    fetched_at: Instant::now(),
                    fetched_wall: Utc::now(),
                    location: location.clone(),
                    days,
                };
                let info = entry.info(self.cache_duration);
                *self.cached.lock().await = Some(entry);
                self.subscribers
                    .emit(ManagerEvent::ForecastUpdated(forecast.clone()));
                self.subscribers.emit(ManagerEvent::CacheStatusChanged(info));
                Ok(forecast)
            }
            Err(e) => {
                self.subscribers.emit(ManagerEvent::FetchError(e.to_string()));
                match self.cached.lock().await.as_ref() {
                    Some(entry) => {
                        warn!(
                            source = self.source.name(),
                            error = %e,
                            fetched_at = %entry.fetched_wall,
                            "Fetch failed, serving stale forecast"
                        );
                        Ok(entry.forecast.clone())
                    }
                    None => Err(e),
                }
            }
        }
    }

    async fn fresh(&self, location: &Location, days: u32) -> Option<S::Forecast> {
        let cached = self.cached.lock().await;
        let entry = cached.as_ref()?;
        if entry.is_fresh(self.cache_duration) && entry.days == days && entry.location.same_place(location) {
            debug!(source = self.source.name(), "Serving cached forecast");
            return Some(entry.forecast.clone());
        }
        None
    }

    /// Drops the cached forecast
    pub async fn clear_cache(&self) {
        *self.cached.lock().await = None;
        self.subscribers
            .emit(ManagerEvent::CacheStatusChanged(empty_info(self.cache_duration)));
    }

    pub async fn get_cache_info(&self) -> CacheInfo {
        match self.cached.lock().await.as_ref() {
            Some(entry) => entry.info(self.cache_duration),
            None => empty_info(self.cache_duration),
        }
    }

    /// Drops the cache and shuts down the source stack
    pub async fn shutdown(&self) {
        *self.cached.lock().await = None;
        self.source.shutdown().await;
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Forecast fixtures starting today

    use std::sync::Arc;

    use chrono::Duration as Days;

    use crate::data::{
        AstronomyDay, AstronomyEvent, AstronomyEventType, AstronomyForecast, Location, MoonPhase,
        WeatherCondition, WeatherDay, WeatherForecast,
    };
    use crate::sources::mock::MockSource;
    use crate::sources::SharedSource;

    fn location() -> Location {
        Location::new("Test", 10.0, 20.0).unwrap()
    }

    pub fn weather_forecast(days: i64) -> WeatherForecast {
        let today = chrono::Utc::now().date_naive();
        let daily = (0..days)
            .map(|i| WeatherDay {
                date: today + Days::days(i),
                condition: WeatherCondition::Clear,
                weather_code: 0,
                temperature_max: 18.0,
                temperature_min: 9.0,
                precipitation_sum: 0.0,
                precipitation_probability: Some(0),
                wind_speed_max: 8.0,
                uv_index_max: None,
                sunrise: None,
                sunset: None,
            })
            .collect();
        WeatherForecast::new(location(), daily, "weather", days as u32)
    }

    pub fn astronomy_forecast(days: i64) -> AstronomyForecast {
        let today = chrono::Utc::now().date_naive();
        let daily = (0..days)
            .map(|i| {
                let date = today + Days::days(i);
                let event = AstronomyEvent::builder(
                    AstronomyEventType::Apod,
                    "Picture",
                    "A picture",
                    date.and_hms_opt(12, 0, 0).unwrap().and_utc(),
                )
                .build()
                .unwrap();
                AstronomyDay::new(date, vec![event], MoonPhase::FirstQuarter, 0.5).unwrap()
            })
            .collect();
        AstronomyForecast::new(location(), daily, "astronomy", days as u32)
    }

    pub fn boxed<F: Clone + Send + Sync + 'static>(source: MockSource<F>) -> SharedSource<F> {
        Arc::new(source)
    }
}
