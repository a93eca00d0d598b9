//! Combined weather + astronomy coordinator
//!
//! Refreshes both domain managers concurrently, merges whatever they return
//! into a `CombinedForecast` and keeps the result for a short window on top
//! of the managers' own caches.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::CachedSource;
use crate::config::AppConfig;
use crate::data::combined::domain_error;
use crate::data::{AstronomyForecast, CombinedForecast, Location, WeatherForecast};
use crate::error::{ApiError, CombinedError, Domain};
use crate::manager::{AstronomyManager, CacheInfo, ForecastManager, WeatherManager};
use crate::moon::SynodicMoonCalculator;
use crate::refresh::{ManagerEvent, Subscribers};
use crate::sources::{
    ForecastSource, NasaAstronomySource, OpenMeteoSource, RateLimitedSource, SharedSource,
};
use crate::transport::HttpTransport;

/// How long a combined forecast is reused before the managers are asked again
pub const DEFAULT_REFRESH_WINDOW: Duration = Duration::from_secs(300);

struct CachedCombined {
    forecast: CombinedForecast,
    built_at: Instant,
    built_wall: DateTime<Utc>,
}

/// Coordinates the weather and astronomy managers
///
/// Either manager may be absent. Refreshes are serialised by `refreshing`;
/// `cached` is only locked to read or replace the stored forecast.
pub struct CombinedForecastManager {
    weather: Option<Arc<WeatherManager>>,
    astronomy: Option<Arc<AstronomyManager>>,
    default_location: Location,
    days: u32,
    refresh_window: Duration,
    cached: Mutex<Option<CachedCombined>>,
    refreshing: Mutex<()>,
    subscribers: Subscribers<CombinedForecast>,
}

impl CombinedForecastManager {
    pub fn new(
        weather: Option<Arc<WeatherManager>>,
        astronomy: Option<Arc<AstronomyManager>>,
        default_location: Location,
        days: u32,
    ) -> Self {
        Self {
            weather,
            astronomy,
            default_location,
            days: days.max(1),
            refresh_window: DEFAULT_REFRESH_WINDOW,
            cached: Mutex::new(None),
            refreshing: Mutex::new(()),
            subscribers: Subscribers::new(),
        }
    }

    /// Wires the enabled domains from configuration
    ///
    /// Weather: Open-Meteo behind a cache. Astronomy: the NASA aggregator
    /// behind the rate limiter, behind a cache, so cache hits do not spend
    /// request budget.
    pub fn from_config(
        config: &AppConfig,
        location: Location,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        let weather = config.weather.enabled.then(|| {
            let ttl = Duration::from_secs(config.weather.cache_duration_secs);
            let source =
                OpenMeteoSource::with_base_url(transport.clone(), &config.weather.base_url);
            let stack: SharedSource<WeatherForecast> =
                Arc::new(CachedSource::with_ttl(source, ttl));
            Arc::new(WeatherManager::new(stack, location.clone(), ttl))
        });

        let astronomy = config.astronomy_enabled().then(|| {
            let ttl = Duration::from_secs(config.nasa.cache_duration_secs);
            let source = NasaAstronomySource::from_config(
                &config.nasa,
                transport.clone(),
                Arc::new(SynodicMoonCalculator),
            );
            let limited = RateLimitedSource::new(source, config.nasa.requests_per_hour);
            let stack: SharedSource<AstronomyForecast> =
                Arc::new(CachedSource::with_ttl(limited, ttl));
            Arc::new(AstronomyManager::new(stack, location.clone(), ttl))
        });

        Self::new(weather, astronomy, location, config.forecast_days)
            .with_refresh_window(Duration::from_secs(config.combined_refresh_secs))
    }

    /// Overrides the skip-refresh window
    pub fn with_refresh_window(mut self, window: Duration) -> Self {
        self.refresh_window = window;
        self
    }

    pub fn weather_manager(&self) -> Option<&Arc<WeatherManager>> {
        self.weather.as_ref()
    }

    pub fn astronomy_manager(&self) -> Option<&Arc<AstronomyManager>> {
        self.astronomy.as_ref()
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ManagerEvent<CombinedForecast>> {
        self.subscribers.subscribe()
    }

    /// Returns the combined forecast for `location` (or the default location)
    ///
    /// Reuses the previous result when it is younger than the refresh window,
    /// unless `force_refresh` is set. Fails only when neither domain yields
    /// any daily records.
    pub async fn get_combined_forecast(
        &self,
        location: Option<&Location>,
        force_refresh: bool,
    ) -> Result<CombinedForecast, CombinedError> {
        let location = location.unwrap_or(&self.default_location);
        if !force_refresh {
            if let Some(forecast) = self.reusable(location).await {
                return Ok(forecast);
            }
        }

        let _refreshing = self.refreshing.lock().await;
        if !force_refresh {
            if let Some(forecast) = self.reusable(location).await {
                return Ok(forecast);
            }
        }

        let _loading = self.subscribers.loading();
        let (weather, astronomy) = tokio::join!(
            refresh_domain(self.weather.as_deref(), location, self.days),
            refresh_domain(self.astronomy.as_deref(), location, self.days),
        );

        let mut error_messages = Vec::new();
        let weather = collect(Domain::Weather, weather, &mut error_messages);
        let astronomy = collect(Domain::Astronomy, astronomy, &mut error_messages);
        for message in &error_messages {
            self.subscribers.emit(ManagerEvent::FetchError(message.clone()));
        }

        let unavailable: Vec<Domain> = [
            (Domain::Weather, weather.is_some()),
            (Domain::Astronomy, astronomy.is_some()),
        ]
        .into_iter()
        .filter(|(_, present)| !present)
        .map(|(domain, _)| domain)
        .collect();

        let forecast = CombinedForecast::build(
            location.clone(),
            weather,
            astronomy,
            error_messages,
            today(),
        );
        if !forecast.has_data() {
            warn!(?unavailable, "No forecast data from any domain");
            return Err(CombinedError::NoData {
                unavailable,
                messages: forecast.error_messages,
            });
        }

        info!(
            status = ?forecast.status,
            days = forecast.daily_forecasts.len(),
            "Combined forecast built"
        );
        self.store(&mut *self.cached.lock().await, forecast.clone());
        Ok(forecast)
    }

    async fn reusable(&self, location: &Location) -> Option<CombinedForecast> {
        let cached = self.cached.lock().await;
        let entry = cached.as_ref()?;
        if entry.built_at.elapsed() < self.refresh_window && entry.forecast.location.same_place(location) {
            debug!("Reusing combined forecast");
            return Some(entry.forecast.clone());
        }
        None
    }

    /// Substitutes fresh weather data into the cached combined forecast
    pub async fn apply_weather_update(&self, weather: WeatherForecast) -> CombinedForecast {
        let mut cached = self.cached.lock().await;
        let forecast = match cached.as_ref() {
            Some(entry) => entry.forecast.with_weather(weather, today()),
            None => CombinedForecast::build(
                weather.location.clone(),
                Some(weather),
                None,
                Vec::new(),
                today(),
            ),
        };
        self.store(&mut cached, forecast.clone());
        forecast
    }

    /// Substitutes fresh astronomy data into the cached combined forecast
    pub async fn apply_astronomy_update(&self, astronomy: AstronomyForecast) -> CombinedForecast {
        let mut cached = self.cached.lock().await;
        let forecast = match cached.as_ref() {
            Some(entry) => entry.forecast.with_astronomy(astronomy, today()),
            None => CombinedForecast::build(
                astronomy.location.clone(),
                None,
                Some(astronomy),
                Vec::new(),
                today(),
            ),
        };
        self.store(&mut cached, forecast.clone());
        forecast
    }

    pub async fn get_cache_info(&self) -> CacheInfo {
        let cached = self.cached.lock().await;
        self.info(cached.as_ref())
    }

    /// Drops the combined forecast and both managers' caches
    pub async fn clear_cache(&self) {
        *self.cached.lock().await = None;
        if let Some(weather) = &self.weather {
            weather.clear_cache().await;
        }
        if let Some(astronomy) = &self.astronomy {
            astronomy.clear_cache().await;
        }
        self.subscribers
            .emit(ManagerEvent::CacheStatusChanged(self.info(None)));
    }

    /// Shuts down both managers and their source stacks
    pub async fn shutdown(&self) {
        *self.cached.lock().await = None;
        match (&self.weather, &self.astronomy) {
            (Some(w), Some(a)) => {
                tokio::join!(w.shutdown(), a.shutdown());
            }
            (Some(w), None) => w.shutdown().await,
            (None, Some(a)) => a.shutdown().await,
            (None, None) => {}
        }
    }

    fn store(&self, cached: &mut Option<CachedCombined>, forecast: CombinedForecast) {
        let entry = CachedCombined {
            forecast: forecast.clone(),
            built_at: Instant::now(),
            built_wall: Utc::now(),
        };
        *cached = Some(entry);
        self.subscribers.emit(ManagerEvent::ForecastUpdated(forecast));
        self.subscribers
            .emit(ManagerEvent::CacheStatusChanged(self.info(cached.as_ref())));
    }

    fn info(&self, entry: Option<&CachedCombined>) -> CacheInfo {
        CacheInfo {
            has_cached_data: entry.is_some(),
            last_fetch_time: entry.map(|e| e.built_wall),
            cache_valid: entry
                .map(|e| e.built_at.elapsed() < self.refresh_window)
                .unwrap_or(false),
            cache_duration_seconds: self.refresh_window.as_secs(),
        }
    }
}

fn today() -> chrono::NaiveDate {
    Utc::now().date_naive()
}

/// Asks one manager for its forecast; `None` when the domain is not configured
async fn refresh_domain<S: ForecastSource>(
    manager: Option<&ForecastManager<S>>,
    location: &Location,
    days: u32,
) -> Option<Result<S::Forecast, ApiError>> {
    let manager = manager?;
    Some(manager.get_forecast(Some(location), days).await)
}

fn collect<F>(
    domain: Domain,
    result: Option<Result<F, ApiError>>,
    errors: &mut Vec<String>,
) -> Option<F> {
    match result? {
        Ok(forecast) => Some(forecast),
        Err(e) => {
            warn!(%domain, error = %e, "Domain refresh failed");
            errors.push(domain_error(domain, e));
            None
        }
    }
}
