//! Astronomy Picture of the Day fetcher

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use serde::Deserialize;
use tracing::debug;

use super::{api_date, fail_soft, EventFetcher, NasaApi};
use crate::data::{AstronomyEvent, AstronomyEventType, EventPriority, Location};
use crate::error::ApiError;

const APOD_PATH: &str = "/planetary/apod";

/// Title used when the API omits one
pub const FALLBACK_TITLE: &str = "Astronomy Picture of the Day";

const FALLBACK_DESCRIPTION: &str = "NASA's featured astronomy image for the day.";

/// First date the APOD archive covers
pub fn earliest_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1995, 6, 16).unwrap_or(NaiveDate::MIN)
}

/// One APOD entry
#[derive(Debug, Deserialize)]
struct ApodItem {
    date: Option<String>,
    title: Option<String>,
    explanation: Option<String>,
    url: Option<String>,
    hdurl: Option<String>,
    media_type: Option<String>,
    copyright: Option<String>,
    thumbnail_url: Option<String>,
}

/// Fetches APOD entries for a date window
pub struct ApodFetcher {
    api: Arc<NasaApi>,
    max_days: u32,
}

impl ApodFetcher {
    pub fn new(api: Arc<NasaApi>, max_days: u32) -> Self {
        Self {
            api,
            max_days: max_days.max(1),
        }
    }

    async fn fetch_events(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AstronomyEvent>, ApiError> {
        let Some((start, end)) = clamp_window(start, end, Utc::now().date_naive(), self.max_days)
        else {
            debug!("APOD window lies outside the archive, skipping");
            return Ok(Vec::new());
        };

        let params = vec![
            ("start_date", api_date(start)),
            ("end_date", api_date(end)),
            ("thumbs", "true".to_string()),
        ];
        let body = self.api.get_json(APOD_PATH, params, "APOD").await?;

        // a single-date request answers with an object rather than an array
        let items = match body {
            serde_json::Value::Array(items) => items,
            obj @ serde_json::Value::Object(_) => vec![obj],
            other => {
                return Err(ApiError::Data(format!(
                    "unexpected APOD payload: {}",
                    other
                )))
            }
        };

        Ok(items
            .into_iter()
            .filter_map(|value| {
                let item: ApodItem = serde_json::from_value(value)
                    .map_err(|e| debug!(error = %e, "Skipping malformed APOD item"))
                    .ok()?;
                parse_item(item)
            })
            .collect())
    }
}

#[async_trait]
impl EventFetcher for ApodFetcher {
    fn name(&self) -> &'static str {
        "APOD"
    }

    async fn fetch(
        &self,
        _location: &Location,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AstronomyEvent>, ApiError> {
        fail_soft(self.name(), self.fetch_events(start, end).await)
    }
}

/// Clamps to `[earliest, today]` and caps the span at `max_days`
///
/// Returns `None` when nothing of the window is available.
fn clamp_window(
    start: NaiveDate,
    end: NaiveDate,
    today: NaiveDate,
    max_days: u32,
) -> Option<(NaiveDate, NaiveDate)> {
    let start = start.max(earliest_date());
    let end = end.min(today);
    if start > end {
        return None;
    }
    let end = start
        .checked_add_signed(Duration::days(i64::from(max_days) - 1))
        .map_or(end, |capped| end.min(capped));
    Some((start, end))
}

/// Maps one item to an event; a missing or malformed date skips the item
fn parse_item(item: ApodItem) -> Option<AstronomyEvent> {
    let raw_date = item.date?;
    let date = match NaiveDate::parse_from_str(&raw_date, "%Y-%m-%d") {
        Ok(date) => date,
        Err(_) => {
            debug!(date = %raw_date, "Skipping APOD item with malformed date");
            return None;
        }
    };

    let title = non_empty(item.title).unwrap_or_else(|| FALLBACK_TITLE.to_string());
    let description =
        non_empty(item.explanation).unwrap_or_else(|| FALLBACK_DESCRIPTION.to_string());
    let media_type = item.media_type.unwrap_or_else(|| "image".to_string());
    let image_url = match media_type.as_str() {
        "image" => item.hdurl.or_else(|| item.url.clone()),
        "video" => item.thumbnail_url,
        _ => None,
    };

    let mut builder = AstronomyEvent::builder(
        AstronomyEventType::Apod,
        title,
        description,
        date.and_hms_opt(0, 0, 0)?.and_utc(),
    )
    .priority(EventPriority::Medium)
    .source_url(format!(
        "https://apod.nasa.gov/apod/ap{}.html",
        date.format("%y%m%d")
    ))
    .image_url(image_url)
    .meta("media_type", media_type);

    if let Some(url) = item.url {
        builder = builder.meta("url", url);
    }
    if let Some(copyright) = item.copyright {
        builder = builder.meta("copyright", copyright.trim().to_string());
    }

    builder
        .build()
        .map_err(|e| debug!(error = %e, "Skipping invalid APOD item"))
        .ok()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
