//! End-to-end tests for the forecast pipeline
//!
//! Wires a fake transport through the fetchers, decorators, managers and the
//! combined coordinator exactly as the binary does.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use serde_json::{json, Value};

use astrodash::combined::CombinedForecastManager;
use astrodash::config::AppConfig;
use astrodash::data::{AstronomyEventType, ForecastStatus, Location};
use astrodash::error::{ApiError, CombinedError, Domain};
use astrodash::transport::{HttpResponse, HttpTransport, QueryParams};

/// Answers by URL fragment; can be switched into an outage
struct FakeTransport {
    routes: Vec<(&'static str, Value)>,
    offline: AtomicBool,
    calls: AtomicUsize,
}

impl FakeTransport {
    fn new(routes: Vec<(&'static str, Value)>) -> Self {
        Self {
            routes,
            offline: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn get(&self, url: &str, _params: &QueryParams) -> Result<HttpResponse, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(ApiError::Network("connection refused".to_string()));
        }
        let (status, body) = self
            .routes
            .iter()
            .find(|(fragment, _)| url.contains(fragment))
            .map(|(_, body)| (200, body.clone()))
            .unwrap_or((404, Value::Null));
        Ok(HttpResponse {
            status,
            body,
            timestamp: Utc::now(),
            source: "fake".to_string(),
            url: url.to_string(),
        })
    }

    async fn close(&self) {}
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn day(offset: i64) -> String {
    (today() + Duration::days(offset)).format("%Y-%m-%d").to_string()
}

fn weather_body() -> Value {
    json!({
        "daily": {
            "time": [day(0), day(1), day(2)],
            "weather_code": [0, 3, 61],
            "temperature_2m_max": [21.0, 19.5, 15.0],
            "temperature_2m_min": [11.0, 10.0, 9.5],
            "precipitation_sum": [0.0, 0.2, 8.1],
            "precipitation_probability_max": [0, 20, 95],
            "wind_speed_10m_max": [9.0, 12.0, 30.0],
            "uv_index_max": [6.0, 5.0, 2.0],
            "sunrise": [format!("{}T04:43", day(0)), format!("{}T04:43", day(1)), format!("{}T04:44", day(2))],
            "sunset": [format!("{}T21:21", day(0)), format!("{}T21:21", day(1)), format!("{}T21:22", day(2))]
        }
    })
}

fn apod_body() -> Value {
    json!([{
        "date": day(0),
        "title": "The Cat's Eye Nebula",
        "explanation": "A planetary nebula in Draco.",
        "media_type": "image",
        "url": "https://apod.nasa.gov/apod/image/catseye.jpg"
    }])
}

fn config() -> AppConfig {
    let mut config = AppConfig::default();
    config.weather.base_url = "https://weather.test/v1/forecast".to_string();
    config.nasa.base_url = "https://nasa.test".to_string();
    config.nasa.iss = false;
    config.nasa.epic = false;
    config
}

fn location() -> Location {
    Location::new("Greenwich", 51.4769, -0.0005).unwrap()
}

fn pipeline(config: &AppConfig) -> (CombinedForecastManager, Arc<FakeTransport>) {
    let transport = Arc::new(FakeTransport::new(vec![
        ("weather.test", weather_body()),
        ("/planetary/apod", apod_body()),
        ("/neo/rest/v1/feed", json!({ "near_earth_objects": {} })),
    ]));
    let coordinator = CombinedForecastManager::from_config(config, location(), transport.clone());
    (coordinator, transport)
}

#[tokio::test]
async fn test_combined_forecast_end_to_end() {
    let (coordinator, _) = pipeline(&config());

    let forecast = coordinator.get_combined_forecast(None, false).await.unwrap();

    assert_eq!(forecast.status, ForecastStatus::Complete);
    // astronomy covers the full week, weather the first three days
    assert_eq!(forecast.daily_forecasts.len(), 7);
    assert!(forecast.error_messages.is_empty());

    let first = &forecast.daily_forecasts[0];
    assert_eq!(first.date, today());
    assert_eq!(first.weather.as_ref().unwrap().summary(), "Clear 11°/21°");
    let astronomy = first.astronomy.as_ref().unwrap();
    let primary = astronomy.primary_event().unwrap();
    assert_eq!(primary.event_type(), AstronomyEventType::Apod);
    assert_eq!(primary.title(), "The Cat's Eye Nebula");

    assert!(forecast.daily_forecasts[3].weather.is_none());
    assert!(forecast.daily_forecasts[3].astronomy.is_some());
}

#[tokio::test]
async fn test_latest_earth_imagery_appears_on_first_day() {
    let mut config = config();
    config.nasa.epic = true;
    let transport = Arc::new(FakeTransport::new(vec![
        ("weather.test", weather_body()),
        ("/planetary/apod", apod_body()),
        ("/neo/rest/v1/feed", json!({ "near_earth_objects": {} })),
        (
            "/EPIC/api/natural/date/",
            json!([{
                "identifier": "20250617003633",
                "caption": "Earth from a million miles",
                "image": "epic_1b_20250617003633",
                "date": format!("{} 00:31:45", day(-1))
            }]),
        ),
    ]));
    let coordinator = CombinedForecastManager::from_config(&config, location(), transport);

    let forecast = coordinator.get_combined_forecast(None, false).await.unwrap();

    let first = forecast.daily_forecasts[0].astronomy.as_ref().unwrap();
    let imagery = first.events_of(AstronomyEventType::EarthImagery);
    assert_eq!(imagery.len(), 1);
    assert_eq!(imagery[0].metadata()["captured_on"], json!(day(-1)));
}

#[tokio::test]
async fn test_repeat_requests_are_served_from_cache() {
    let (coordinator, transport) = pipeline(&config());

    coordinator.get_combined_forecast(None, false).await.unwrap();
    let after_first = transport.calls();
    // forced past the combined window, still inside both manager caches
    coordinator.get_combined_forecast(None, true).await.unwrap();

    assert_eq!(transport.calls(), after_first);
}

#[tokio::test]
async fn test_outage_keeps_last_good_weather() {
    let mut config = config();
    config.weather.cache_duration_secs = 0;
    config.nasa.cache_duration_secs = 0;
    let (coordinator, transport) = pipeline(&config);

    let first = coordinator.get_combined_forecast(None, false).await.unwrap();
    transport.offline.store(true, Ordering::SeqCst);
    let second = coordinator.get_combined_forecast(None, true).await.unwrap();

    assert_eq!(second.weather_forecast, first.weather_forecast);
    assert_eq!(second.status, ForecastStatus::Complete);
    // NASA fetchers degrade to no events rather than failing
    assert!(second.astronomy_forecast.unwrap().total_events() == 0);
}

#[tokio::test]
async fn test_no_data_reports_unavailable_domains() {
    let mut config = config();
    config.nasa.apod = false;
    config.nasa.neo = false;
    let (coordinator, transport) = pipeline(&config);
    transport.offline.store(true, Ordering::SeqCst);

    let result = coordinator.get_combined_forecast(None, false).await;

    match result {
        Err(CombinedError::NoData { unavailable, messages }) => {
            assert_eq!(unavailable, vec![Domain::Weather, Domain::Astronomy]);
            assert_eq!(messages.len(), 1);
            assert!(messages[0].starts_with("weather:"));
        }
        Ok(forecast) => panic!("expected no data, got {:?}", forecast.status),
    }
}
