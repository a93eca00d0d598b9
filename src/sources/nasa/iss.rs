//! ISS pass prediction fetcher
//!
//! The pass endpoint takes a location and a pass count, not a date range, so
//! the window is applied after the response arrives.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Deserialize;
use tracing::warn;

use super::{fail_soft, EventFetcher};
use crate::data::{AstronomyEvent, AstronomyEventType, EventPriority, Location};
use crate::error::ApiError;
use crate::transport::HttpTransport;

/// Default pass prediction endpoint
pub const ISS_PASS_URL: &str = "http://api.open-notify.org/iss-pass.json";

/// Passes at least this long are worth stepping outside for
const LONG_PASS_SECS: i64 = 360;

/// Passes shorter than this are barely noticeable
const SHORT_PASS_SECS: i64 = 120;

#[derive(Debug, Deserialize)]
struct PassResponse {
    message: String,
    #[serde(default)]
    response: Vec<Pass>,
}

#[derive(Debug, Deserialize)]
struct Pass {
    /// Seconds
    duration: i64,
    /// Unix timestamp
    risetime: i64,
}

/// Fetches upcoming ISS passes over a location
pub struct IssPassFetcher {
    transport: Arc<dyn HttpTransport>,
    url: String,
    pass_count: u32,
}

impl IssPassFetcher {
    pub fn new(transport: Arc<dyn HttpTransport>, pass_count: u32) -> Self {
        Self::with_url(transport, ISS_PASS_URL, pass_count)
    }

    pub fn with_url(transport: Arc<dyn HttpTransport>, url: &str, pass_count: u32) -> Self {
        Self {
            transport,
            url: url.to_string(),
            pass_count: pass_count.max(1),
        }
    }

    async fn fetch_events(
        &self,
        location: &Location,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AstronomyEvent>, ApiError> {
        let params = vec![
            ("lat", location.latitude().to_string()),
            ("lon", location.longitude().to_string()),
            ("n", self.pass_count.to_string()),
        ];
        let response = self.transport.get(&self.url, &params).await?;

        if response.status == 404 || !response.body.is_object() {
            warn!(
                status = response.status,
                "ISS pass service temporarily unavailable"
            );
            return Ok(Vec::new());
        }
        if !response.is_success() {
            return Err(ApiError::from_status(response.status, "ISS passes"));
        }

        let passes: PassResponse = serde_json::from_value(response.body)?;
        if passes.message != "success" {
            return Err(ApiError::Data(format!(
                "ISS pass service replied '{}'",
                passes.message
            )));
        }

        Ok(passes
            .response
            .into_iter()
            .filter_map(|pass| pass_event(&pass, location))
            .filter(|event| (start..=end).contains(&event.date()))
            .collect())
    }
}

#[async_trait]
impl EventFetcher for IssPassFetcher {
    fn name(&self) -> &'static str {
        "ISS"
    }

    async fn fetch(
        &self,
        location: &Location,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AstronomyEvent>, ApiError> {
        fail_soft(self.name(), self.fetch_events(location, start, end).await)
    }
}

fn pass_event(pass: &Pass, location: &Location) -> Option<AstronomyEvent> {
    let rise = DateTime::<Utc>::from_timestamp(pass.risetime, 0)?;
    let duration = pass.duration.max(0);
    let minutes = duration / 60;
    let seconds = duration % 60;
    let set = Duration::try_seconds(duration).and_then(|d| rise.checked_add_signed(d))?;

    let priority = if duration >= LONG_PASS_SECS {
        EventPriority::High
    } else if duration >= SHORT_PASS_SECS {
        EventPriority::Medium
    } else {
        EventPriority::Low
    };

    AstronomyEvent::builder(
        AstronomyEventType::IssPass,
        "ISS Pass",
        format!(
            "The International Space Station passes over {} for {} min {} s.",
            location.name(),
            minutes,
            seconds
        ),
        rise,
    )
    .end_time(set)
    .visibility_info(format!(
        "Rises at {} UTC, visible for about {} minutes",
        rise.format("%H:%M"),
        (duration + 30) / 60
    ))
    .source_url("https://spotthestation.nasa.gov/")
    .priority(priority)
    .meta("duration_secs", duration)
    .meta("risetime", pass.risetime)
    .build()
    .ok()
}
