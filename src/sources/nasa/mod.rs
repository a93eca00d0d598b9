//! NASA astronomy aggregation
//!
//! Each `EventFetcher` wraps one endpoint and maps its payload to
//! `AstronomyEvent`s. `NasaAstronomySource` runs the enabled fetchers
//! concurrently, buckets their events by date and attaches the moon phase.

pub mod apod;
pub mod epic;
pub mod iss;
pub mod neo;

pub use apod::ApodFetcher;
pub use epic::EpicFetcher;
pub use iss::IssPassFetcher;
pub use neo::NeoFetcher;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use tracing::{debug, info, warn};

use super::ForecastSource;
use crate::config::NasaConfig;
use crate::data::{AstronomyDay, AstronomyEvent, AstronomyForecast, Location};
use crate::error::ApiError;
use crate::moon::MoonPhaseCalculator;
use crate::transport::{HttpTransport, QueryParams};

/// Source name recorded on astronomy forecasts
pub const SOURCE_NAME: &str = "NASA";

/// Fetches events from one astronomy endpoint
///
/// Ordinary failures (network, bad payload, nothing published) are logged
/// and yield an empty list. Only `Authentication` and `RateLimit` errors are
/// returned.
#[async_trait]
pub trait EventFetcher: Send + Sync {
    fn name(&self) -> &'static str;

    /// Events starting within `start..=end`
    async fn fetch(
        &self,
        location: &Location,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AstronomyEvent>, ApiError>;
}

/// Applies the fetcher error contract to a raw result
pub(crate) fn fail_soft(
    source: &str,
    result: Result<Vec<AstronomyEvent>, ApiError>,
) -> Result<Vec<AstronomyEvent>, ApiError> {
    match result {
        Ok(events) => Ok(events),
        Err(e) if e.is_auth_or_rate_limit() => Err(e),
        Err(e) => {
            warn!(source, error = %e, "Fetch failed, returning no events");
            Ok(Vec::new())
        }
    }
}

/// Shared access to api.nasa.gov
pub struct NasaApi {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    api_key: String,
}

impl NasaApi {
    pub fn new(transport: Arc<dyn HttpTransport>, base_url: &str, api_key: &str) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// GETs `path` with the API key attached, failing on non-2xx statuses
    pub async fn get_json(
        &self,
        path: &str,
        params: QueryParams,
        context: &str,
    ) -> Result<serde_json::Value, ApiError> {
        self.get_json_opt(path, params, context)
            .await?
            .ok_or_else(|| ApiError::from_status(404, context))
    }

    /// Like `get_json`, but a 404 is `Ok(None)` rather than an error
    pub async fn get_json_opt(
        &self,
        path: &str,
        mut params: QueryParams,
        context: &str,
    ) -> Result<Option<serde_json::Value>, ApiError> {
        params.push(("api_key", self.api_key.clone()));
        let url = format!("{}{}", self.base_url, path);
        let response = self.transport.get(&url, &params).await?;
        match response.status {
            404 => Ok(None),
            _ if response.is_success() => Ok(Some(response.body)),
            status => Err(ApiError::from_status(status, context)),
        }
    }

    pub fn transport(&self) -> &Arc<dyn HttpTransport> {
        &self.transport
    }
}

/// Formats a date the way NASA query parameters expect
pub(crate) fn api_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Aggregates the enabled NASA fetchers into an `AstronomyForecast`
pub struct NasaAstronomySource {
    fetchers: Vec<Box<dyn EventFetcher>>,
    moon: Arc<dyn MoonPhaseCalculator>,
    transport: Arc<dyn HttpTransport>,
}

impl NasaAstronomySource {
    /// Creates a source with no fetchers; add them with `with_fetcher`
    pub fn new(transport: Arc<dyn HttpTransport>, moon: Arc<dyn MoonPhaseCalculator>) -> Self {
        Self {
            fetchers: Vec::new(),
            moon,
            transport,
        }
    }

    /// Creates a source with the fetchers enabled in `config`
    pub fn from_config(
        config: &NasaConfig,
        transport: Arc<dyn HttpTransport>,
        moon: Arc<dyn MoonPhaseCalculator>,
    ) -> Self {
        let api = Arc::new(NasaApi::new(transport.clone(), &config.base_url, &config.api_key));
        let mut source = Self::new(transport.clone(), moon);

        if config.apod {
            source = source.with_fetcher(ApodFetcher::new(api.clone(), config.apod_max_days));
        }
        if config.iss {
            source = source.with_fetcher(IssPassFetcher::new(transport, config.iss_pass_count));
        }
        if config.neo {
            source = source.with_fetcher(NeoFetcher::new(api.clone(), config.neo_window_days));
        }
        if config.epic {
            source = source.with_fetcher(EpicFetcher::new(
                api,
                config.epic_max_attempts,
                config.epic_target_count,
            ));
        }
        source
    }

    pub fn with_fetcher(mut self, fetcher: impl EventFetcher + 'static) -> Self {
        self.fetchers.push(Box::new(fetcher));
        self
    }

    pub fn fetcher_names(&self) -> Vec<&'static str> {
        self.fetchers.iter().map(|f| f.name()).collect()
    }

    /// Builds a forecast for `days` days starting at `start`
    pub async fn fetch_range(
        &self,
        location: &Location,
        start: NaiveDate,
        days: u32,
    ) -> Result<AstronomyForecast, ApiError> {
        let end = start
            .checked_add_signed(Duration::days(i64::from(days.max(1)) - 1))
            .ok_or_else(|| ApiError::Data(format!("{} days from {} is out of range", days, start)))?;

        let results = futures::future::join_all(self.fetchers.iter().map(|fetcher| async move {
            (fetcher.name(), fetcher.fetch(location, start, end).await)
        }))
        .await;

        let mut buckets: BTreeMap<NaiveDate, Vec<AstronomyEvent>> = BTreeMap::new();
        let mut dropped = 0usize;
        for (name, result) in results {
            match result {
                Ok(events) => {
                    debug!(source = name, count = events.len(), "Fetcher returned events");
                    for event in events {
                        let date = event.date();
                        if date < start || date > end {
                            dropped += 1;
                            continue;
                        }
                        buckets.entry(date).or_default().push(event);
                    }
                }
                Err(e) => {
                    warn!(source = name, error = %e, "Source unavailable, contributing no events");
                }
            }
        }
        if dropped > 0 {
            debug!(dropped, "Dropped events outside the requested window");
        }

        let mut daily = Vec::new();
        for date in start.iter_days().take_while(|date| *date <= end).take(days as usize) {
            let events = buckets.remove(&date).unwrap_or_default();
            let (phase, illumination) = self.moon.phase(date);
            daily.push(AstronomyDay::new(date, events, phase, illumination)?);
        }

        let forecast = AstronomyForecast::new(location.clone(), daily, SOURCE_NAME, days);
        forecast.validate()?;

        info!(
            location = location.name(),
            days,
            events = forecast.total_events(),
            "Astronomy forecast assembled"
        );
        Ok(forecast)
    }
}

#[async_trait]
impl ForecastSource for NasaAstronomySource {
    type Forecast = AstronomyForecast;

    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn fetch_forecast(
        &self,
        location: &Location,
        days: u32,
    ) -> Result<AstronomyForecast, ApiError> {
        self.fetch_range(location, Utc::now().date_naive(), days).await
    }

    async fn shutdown(&self) {
        self.transport.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{AstronomyEventType, EventPriority, MoonPhase};
    use crate::moon::SynodicMoonCalculator;
    use crate::transport::mock::MockTransport;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::atomic::Ordering;

    struct FixedMoon;

    impl MoonPhaseCalculator for FixedMoon {
        fn phase(&self, _date: NaiveDate) -> (MoonPhase, f64) {
            (MoonPhase::FirstQuarter, 0.5)
        }
    }

    /// Returns the same events or error on every call
    struct StubFetcher {
        name: &'static str,
        result: Result<Vec<AstronomyEvent>, ApiError>,
    }

    #[async_trait]
    impl EventFetcher for StubFetcher {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn fetch(
            &self,
            _location: &Location,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<Vec<AstronomyEvent>, ApiError> {
            self.result.clone()
        }
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    fn event(title: &str, day: u32, hour: u32, priority: EventPriority) -> AstronomyEvent {
        AstronomyEvent::builder(
            AstronomyEventType::IssPass,
            title,
            "description",
            Utc.with_ymd_and_hms(2025, 6, day, hour, 0, 0).unwrap(),
        )
        .priority(priority)
        .build()
        .unwrap()
    }

    fn location() -> Location {
        Location::new("Test", 40.0, -70.0).unwrap()
    }

    fn source() -> NasaAstronomySource {
        NasaAstronomySource::new(Arc::new(MockTransport::new()), Arc::new(FixedMoon))
    }

    #[tokio::test]
    async fn test_buckets_events_by_date_with_moon_phase() {
        let source = source().with_fetcher(StubFetcher {
            name: "stub",
            result: Ok(vec![
                event("a", 18, 3, EventPriority::Low),
                event("b", 20, 3, EventPriority::Low),
                event("c", 18, 4, EventPriority::Low),
            ]),
        });

        let forecast = source.fetch_range(&location(), date(18), 3).await.unwrap();

        assert_eq!(forecast.daily.len(), 3);
        assert_eq!(forecast.daily[0].event_count(), 2);
        assert_eq!(forecast.daily[1].event_count(), 0);
        assert_eq!(forecast.daily[2].event_count(), 1);
        assert_eq!(forecast.daily[1].moon_phase(), MoonPhase::FirstQuarter);
        assert_eq!(forecast.source_name, SOURCE_NAME);
        assert_eq!(forecast.requested_days, 3);
    }

    #[tokio::test]
    async fn test_primary_event_across_fetchers() {
        let source = source()
            .with_fetcher(StubFetcher {
                name: "one",
                result: Ok(vec![event("high", 18, 23, EventPriority::High)]),
            })
            .with_fetcher(StubFetcher {
                name: "two",
                result: Ok(vec![event("critical", 18, 1, EventPriority::Critical)]),
            });

        let forecast = source.fetch_range(&location(), date(18), 1).await.unwrap();

        assert_eq!(forecast.daily[0].primary_event().unwrap().title(), "critical");
    }

    #[tokio::test]
    async fn test_failing_fetcher_equals_empty_fetcher() {
        let good = || StubFetcher {
            name: "good",
            result: Ok(vec![event("kept", 19, 2, EventPriority::Medium)]),
        };

        let with_failure = source()
            .with_fetcher(good())
            .with_fetcher(StubFetcher {
                name: "bad",
                result: Err(ApiError::RateLimit("quota".into())),
            });
        let with_empty = source().with_fetcher(good()).with_fetcher(StubFetcher {
            name: "bad",
            result: Ok(vec![]),
        });

        let a = with_failure.fetch_range(&location(), date(18), 4).await.unwrap();
        let b = with_empty.fetch_range(&location(), date(18), 4).await.unwrap();

        assert_eq!(a.daily, b.daily);
    }

    #[tokio::test]
    async fn test_events_outside_window_are_dropped() {
        let source = source().with_fetcher(StubFetcher {
            name: "stub",
            result: Ok(vec![event("past", 10, 0, EventPriority::High)]),
        });

        let forecast = source.fetch_range(&location(), date(18), 2).await.unwrap();

        assert_eq!(forecast.total_events(), 0);
    }

    #[tokio::test]
    async fn test_zero_days_fails_validation() {
        let result = source().fetch_range(&location(), date(18), 0).await;
        assert!(matches!(result, Err(ApiError::Data(_))));
    }

    #[tokio::test]
    async fn test_window_past_calendar_end_is_data_error() {
        let result = source().fetch_range(&location(), date(18), u32::MAX).await;
        assert!(matches!(result, Err(ApiError::Data(_))));
    }

    #[tokio::test]
    async fn test_apod_only_day_uses_fallback_title() {
        let transport = Arc::new(MockTransport::new().json(
            "/planetary/apod",
            json!([{
                "date": "2025-06-18",
                "explanation": "A nebula.",
                "media_type": "image",
                "url": "https://apod.nasa.gov/image.jpg"
            }]),
        ));
        let api = Arc::new(NasaApi::new(transport.clone(), "https://api.nasa.gov", "KEY"));
        let source = NasaAstronomySource::new(transport, Arc::new(SynodicMoonCalculator))
            .with_fetcher(ApodFetcher::new(api, 7));

        let forecast = source.fetch_range(&location(), date(18), 1).await.unwrap();

        assert_eq!(forecast.daily.len(), 1);
        assert_eq!(forecast.daily[0].event_count(), 1);
        assert_eq!(
            forecast.daily[0].primary_event().unwrap().title(),
            "Astronomy Picture of the Day"
        );
    }

    #[tokio::test]
    async fn test_from_config_respects_enable_flags() {
        let config = NasaConfig {
            iss: false,
            epic: false,
            ..NasaConfig::default()
        };
        let source = NasaAstronomySource::from_config(
            &config,
            Arc::new(MockTransport::new()),
            Arc::new(SynodicMoonCalculator),
        );
        assert_eq!(source.fetcher_names(), vec!["APOD", "NEO"]);
    }

    #[tokio::test]
    async fn test_shutdown_closes_transport() {
        let transport = Arc::new(MockTransport::new());
        let source = NasaAstronomySource::new(transport.clone(), Arc::new(FixedMoon));

        source.shutdown().await;

        assert!(transport.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_get_json_maps_forbidden_to_auth() {
        let transport = Arc::new(MockTransport::new().route(
            "/planetary/apod",
            crate::transport::mock::MockReply::Json(403, json!({"error": "bad key"})),
        ));
        let api = NasaApi::new(transport.clone(), "https://api.nasa.gov/", "KEY");

        let result = api.get_json("/planetary/apod", Vec::new(), "APOD").await;

        assert!(matches!(result, Err(ApiError::Authentication(_))));
        let (url, params) = &transport.requests()[0];
        assert_eq!(url, "https://api.nasa.gov/planetary/apod");
        assert!(params.contains(&("api_key", "KEY".to_string())));
    }
}
