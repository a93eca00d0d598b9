//! EPIC Earth imagery fetcher
//!
//! Imagery is published per calendar date, a day or more after capture. The
//! fetcher walks backwards from the newest date that can have images until it
//! has enough days or runs out of attempts.
//!
//! Imagery captured before the requested window is surfaced on the window's
//! first day, with the capture date kept in the `captured_on` metadata.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{api_date, EventFetcher, NasaApi};
use crate::data::{AstronomyEvent, AstronomyEventType, EventPriority, Location};
use crate::error::ApiError;

const EPIC_ARCHIVE_URL: &str = "https://epic.gsfc.nasa.gov/archive/natural";

#[derive(Debug, Deserialize)]
struct EpicImage {
    identifier: Option<String>,
    caption: Option<String>,
    image: String,
    date: String,
}

/// Fetches the most recent days of DSCOVR/EPIC natural-color imagery
pub struct EpicFetcher {
    api: Arc<NasaApi>,
    max_attempts: u32,
    target_count: usize,
}

impl EpicFetcher {
    pub fn new(api: Arc<NasaApi>, max_attempts: u32, target_count: usize) -> Self {
        Self {
            api,
            max_attempts: max_attempts.max(1),
            target_count: target_count.max(1),
        }
    }

    async fn fetch_day(
        &self,
        date: NaiveDate,
        window_start: NaiveDate,
    ) -> Result<Option<AstronomyEvent>, ApiError> {
        let path = format!("/EPIC/api/natural/date/{}", api_date(date));
        let Some(body) = self.api.get_json_opt(&path, Vec::new(), "EPIC").await? else {
            return Ok(None);
        };
        let images: Vec<EpicImage> = serde_json::from_value(body)?;
        Ok(day_event(date, window_start, &images))
    }
}

#[async_trait]
impl EventFetcher for EpicFetcher {
    fn name(&self) -> &'static str {
        "EPIC"
    }

    async fn fetch(
        &self,
        _location: &Location,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AstronomyEvent>, ApiError> {
        let yesterday = Utc::now().date_naive() - Duration::days(1);
        let latest = end.min(yesterday);

        let mut events = Vec::new();
        for offset in 0..self.max_attempts {
            let date = latest - Duration::days(i64::from(offset));
            match self.fetch_day(date, start).await {
                Ok(Some(event)) => {
                    events.push(event);
                    if events.len() >= self.target_count {
                        break;
                    }
                }
                Ok(None) => debug!(date = %date, "No EPIC imagery published"),
                Err(e) if e.is_auth_or_rate_limit() => return Err(e),
                Err(e) => warn!(date = %date, error = %e, "EPIC lookup failed, trying earlier date"),
            }
        }
        Ok(events)
    }
}

fn day_event(
    date: NaiveDate,
    window_start: NaiveDate,
    images: &[EpicImage],
) -> Option<AstronomyEvent> {
    let first = images.first()?;
    let captured = NaiveDateTime::parse_from_str(&first.date, "%Y-%m-%d %H:%M:%S")
        .ok()
        .filter(|t| t.date() == date)
        .or_else(|| date.and_hms_opt(0, 0, 0))?;
    let start_time = if date < window_start {
        window_start.and_hms_opt(0, 0, 0)?
    } else {
        captured
    }
    .and_utc();

    let caption = first
        .caption
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or("Full-disc image of Earth from the DSCOVR spacecraft");

    let image_url = format!(
        "{}/{}/{:02}/{:02}/png/{}.png",
        EPIC_ARCHIVE_URL,
        date.year(),
        date.month(),
        date.day(),
        first.image
    );

    let mut builder = AstronomyEvent::builder(
        AstronomyEventType::EarthImagery,
        "Earth from DSCOVR EPIC",
        format!("{} ({} images published)", caption, images.len()),
        start_time,
    )
    .priority(EventPriority::Low)
    .source_url("https://epic.gsfc.nasa.gov/")
    .image_url(Some(image_url))
    .meta("image_count", images.len())
    .meta("captured_on", api_date(date));
    if let Some(id) = &first.identifier {
        builder = builder.meta("identifier", id.clone());
    }

    builder.build().ok()
}
