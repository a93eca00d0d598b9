//! Near-Earth object feed fetcher
//!
//! Only "interesting" objects surface: potentially hazardous ones, or those
//! at least `NOTABLE_DIAMETER_M` across. Each day with any becomes a single
//! summary event.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Deserialize;
use tracing::debug;

use super::{api_date, fail_soft, EventFetcher, NasaApi};
use crate::data::{AstronomyEvent, AstronomyEventType, EventPriority, Location};
use crate::error::ApiError;

const NEO_FEED_PATH: &str = "/neo/rest/v1/feed";

/// Objects at least this large (max estimated diameter, meters) are reported
pub const NOTABLE_DIAMETER_M: f64 = 100.0;

/// How many objects the description names
const DESCRIBED_OBJECTS: usize = 3;

#[derive(Debug, Deserialize)]
struct NeoFeed {
    near_earth_objects: BTreeMap<String, Vec<NeoObject>>,
}

#[derive(Debug, Deserialize)]
struct NeoObject {
    id: String,
    name: String,
    is_potentially_hazardous_asteroid: bool,
    estimated_diameter: EstimatedDiameter,
    #[serde(default)]
    close_approach_data: Vec<CloseApproach>,
}

#[derive(Debug, Deserialize)]
struct EstimatedDiameter {
    meters: DiameterRange,
}

#[derive(Debug, Deserialize)]
struct DiameterRange {
    estimated_diameter_min: f64,
    estimated_diameter_max: f64,
}

#[derive(Debug, Deserialize)]
struct CloseApproach {
    epoch_date_close_approach: Option<i64>,
    miss_distance: Option<MissDistance>,
}

/// NASA sends these as strings
#[derive(Debug, Deserialize)]
struct MissDistance {
    lunar: Option<String>,
    kilometers: Option<String>,
}

impl NeoObject {
    fn is_interesting(&self) -> bool {
        self.is_potentially_hazardous_asteroid
            || self.estimated_diameter.meters.estimated_diameter_max >= NOTABLE_DIAMETER_M
    }

    fn mean_diameter(&self) -> f64 {
        let m = &self.estimated_diameter.meters;
        (m.estimated_diameter_min + m.estimated_diameter_max) / 2.0
    }

    fn approach(&self) -> Option<&CloseApproach> {
        self.close_approach_data.first()
    }

    fn approach_time(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp_millis(self.approach()?.epoch_date_close_approach?)
    }

    fn miss_distance_lunar(&self) -> Option<f64> {
        self.approach()?.miss_distance.as_ref()?.lunar.as_ref()?.parse().ok()
    }

    fn miss_distance_km(&self) -> Option<f64> {
        self.approach()?
            .miss_distance
            .as_ref()?
            .kilometers
            .as_ref()?
            .parse()
            .ok()
    }
}

/// Fetches the NEO feed and summarizes notable objects per day
pub struct NeoFetcher {
    api: Arc<NasaApi>,
    window_days: u32,
}

impl NeoFetcher {
    pub fn new(api: Arc<NasaApi>, window_days: u32) -> Self {
        Self {
            api,
            window_days: window_days.max(1),
        }
    }

    async fn fetch_events(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AstronomyEvent>, ApiError> {
        if start > end {
            return Ok(Vec::new());
        }
        let end = start
            .checked_add_signed(Duration::days(i64::from(self.window_days)))
            .map_or(end, |capped| end.min(capped));

        let params = vec![("start_date", api_date(start)), ("end_date", api_date(end))];
        let body = self.api.get_json(NEO_FEED_PATH, params, "NEO feed").await?;
        let feed: NeoFeed = serde_json::from_value(body)?;

        let mut events = Vec::new();
        for (raw_date, objects) in feed.near_earth_objects {
            let Ok(date) = NaiveDate::parse_from_str(&raw_date, "%Y-%m-%d") else {
                debug!(date = %raw_date, "Skipping NEO day with malformed date");
                continue;
            };
            if date < start || date > end {
                continue;
            }
            let interesting: Vec<&NeoObject> =
                objects.iter().filter(|o| o.is_interesting()).collect();
            if let Some(event) = day_summary(date, &interesting) {
                events.push(event);
            }
        }
        Ok(events)
    }
}

#[async_trait]
impl EventFetcher for NeoFetcher {
    fn name(&self) -> &'static str {
        "NEO"
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

fn plural(count: usize, word: &str) -> String {
    if count == 1 {
        format!("{} {}", count, word)
    } else {
        format!("{} {}s", count, word)
    }
}

fn day_summary(date: NaiveDate, objects: &[&NeoObject]) -> Option<AstronomyEvent> {
    if objects.is_empty() {
        return None;
    }

    let hazardous = objects
        .iter()
        .filter(|o| o.is_potentially_hazardous_asteroid)
        .count();
    let within_moon_orbit = objects.iter().any(|o| {
        o.is_potentially_hazardous_asteroid
            && o.miss_distance_lunar().map(|d| d < 1.0).unwrap_or(false)
    });

    let (title, priority) = if hazardous > 0 {
        let priority = if within_moon_orbit {
            EventPriority::Critical
        } else {
            EventPriority::High
        };
        (plural(hazardous, "Potentially Hazardous Asteroid"), priority)
    } else {
        (plural(objects.len(), "Notable Near-Earth Object"), EventPriority::Medium)
    };

    let mut closest: Vec<&&NeoObject> = objects.iter().collect();
    closest.sort_by(|a, b| {
        let da = a.miss_distance_lunar().unwrap_or(f64::MAX);
        let db = b.miss_distance_lunar().unwrap_or(f64::MAX);
        da.total_cmp(&db)
    });
    let description = closest
        .iter()
        .take(DESCRIBED_OBJECTS)
        .map(|o| match o.miss_distance_lunar() {
            Some(lunar) => format!(
                "{} (~{:.0} m) passes at {:.1} lunar distances",
                o.name,
                o.mean_diameter(),
                lunar
            ),
            None => format!("{} (~{:.0} m) makes a close approach", o.name, o.mean_diameter()),
        })
        .collect::<Vec<_>>()
        .join("; ");

    let midnight = date.and_hms_opt(0, 0, 0)?.and_utc();
    let start_time = objects
        .iter()
        .filter_map(|o| o.approach_time())
        .filter(|t| t.date_naive() == date)
        .min()
        .unwrap_or(midnight);

    let ids: Vec<serde_json::Value> = objects.iter().map(|o| o.id.clone().into()).collect();
    let closest_km = closest.first().and_then(|o| o.miss_distance_km());

    let mut builder = AstronomyEvent::builder(
        AstronomyEventType::NearEarthObject,
        title,
        description,
        start_time,
    )
    .priority(priority)
    .source_url("https://cneos.jpl.nasa.gov/ca/")
    .meta("object_count", objects.len())
    .meta("hazardous_count", hazardous)
    .meta("object_ids", ids);
    if let Some(km) = closest_km {
        builder = builder.meta("closest_miss_km", km);
    }

    builder.build().ok()
}
