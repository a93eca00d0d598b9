//! Astronomy events and per-day records

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{DailyRecord, Forecast};
use crate::error::ApiError;

/// Astronomy forecast: one `AstronomyDay` per date
pub type AstronomyForecast = Forecast<AstronomyDay>;

/// Kind of astronomy event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AstronomyEventType {
    /// Astronomy Picture of the Day
    Apod,
    /// Visible International Space Station pass
    IssPass,
    /// Near-Earth object close approach
    NearEarthObject,
    /// DSCOVR/EPIC full-disc Earth image
    EarthImagery,
    /// Notable moon phase
    MoonPhase,
}

/// Event importance, ordered from least to most important
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventPriority {
    Low,
    Medium,
    High,
    Critical,
}

/// Phase of the moon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoonPhase {
    NewMoon,
    WaxingCrescent,
    FirstQuarter,
    WaxingGibbous,
    FullMoon,
    WaningGibbous,
    LastQuarter,
    WaningCrescent,
}

impl MoonPhase {
    /// Human-readable phase name
    pub fn label(&self) -> &'static str {
        match self {
            MoonPhase::NewMoon => "New Moon",
            MoonPhase::WaxingCrescent => "Waxing Crescent",
            MoonPhase::FirstQuarter => "First Quarter",
            MoonPhase::WaxingGibbous => "Waxing Gibbous",
            MoonPhase::FullMoon => "Full Moon",
            MoonPhase::WaningGibbous => "Waning Gibbous",
            MoonPhase::LastQuarter => "Last Quarter",
            MoonPhase::WaningCrescent => "Waning Crescent",
        }
    }
}

/// A single astronomy event
///
/// Built through `EventBuilder`, which enforces non-empty text and
/// `end_time >= start_time`. Read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AstronomyEvent {
    event_type: AstronomyEventType,
    title: String,
    description: String,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    visibility_info: Option<String>,
    source_url: Option<String>,
    image_url: Option<String>,
    priority: EventPriority,
    metadata: BTreeMap<String, serde_json::Value>,
}

impl AstronomyEvent {
    /// Starts building an event with the required fields
    pub fn builder(
        event_type: AstronomyEventType,
        title: impl Into<String>,
        description: impl Into<String>,
        start_time: DateTime<Utc>,
    ) -> EventBuilder {
        EventBuilder {
            event: AstronomyEvent {
                event_type,
                title: title.into(),
                description: description.into(),
                start_time,
                end_time: None,
                visibility_info: None,
                source_url: None,
                image_url: None,
                priority: EventPriority::Medium,
                metadata: BTreeMap::new(),
            },
        }
    }

    pub fn event_type(&self) -> AstronomyEventType {
        self.event_type
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn visibility_info(&self) -> Option<&str> {
        self.visibility_info.as_deref()
    }

    pub fn source_url(&self) -> Option<&str> {
        self.source_url.as_deref()
    }

    pub fn image_url(&self) -> Option<&str> {
        self.image_url.as_deref()
    }

    pub fn priority(&self) -> EventPriority {
        self.priority
    }

    pub fn metadata(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.metadata
    }

    /// Calendar date (UTC) the event starts on
    pub fn date(&self) -> NaiveDate {
        self.start_time.date_naive()
    }

    /// Length of the event, if it has an end time
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.end_time.map(|end| end - self.start_time)
    }
}

/// Builder for `AstronomyEvent`
#[derive(Debug, Clone)]
pub struct EventBuilder {
    event: AstronomyEvent,
}

impl EventBuilder {
    pub fn end_time(mut self, end_time: DateTime<Utc>) -> Self {
        self.event.end_time = Some(end_time);
        self
    }

    pub fn visibility_info(mut self, info: impl Into<String>) -> Self {
        self.event.visibility_info = Some(info.into());
        self
    }

    pub fn source_url(mut self, url: impl Into<String>) -> Self {
        self.event.source_url = Some(url.into());
        self
    }

    pub fn image_url(mut self, url: Option<String>) -> Self {
        self.event.image_url = url;
        self
    }

    pub fn priority(mut self, priority: EventPriority) -> Self {
        self.event.priority = priority;
        self
    }

    pub fn meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.event.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Validates and returns the event
    pub fn build(self) -> Result<AstronomyEvent, ApiError> {
        let event = self.event;
        if event.title.trim().is_empty() {
            return Err(ApiError::Data("event title must not be empty".into()));
        }
        if event.description.trim().is_empty() {
            return Err(ApiError::Data(format!(
                "event '{}' has an empty description",
                event.title
            )));
        }
        if let Some(end) = event.end_time {
            if end < event.start_time {
                return Err(ApiError::Data(format!(
                    "event '{}' ends before it starts",
                    event.title
                )));
            }
        }
        Ok(event)
    }
}

/// Astronomy record for one calendar date
///
/// Events are kept in primary-first order: descending by priority, then by
/// start time, so the latest-starting event wins a priority tie.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AstronomyDay {
    date: NaiveDate,
    events: Vec<AstronomyEvent>,
    moon_phase: MoonPhase,
    moon_illumination: f64,
}

impl AstronomyDay {
    /// Creates a day record. Every event must start on `date`.
    pub fn new(
        date: NaiveDate,
        mut events: Vec<AstronomyEvent>,
        moon_phase: MoonPhase,
        moon_illumination: f64,
    ) -> Result<Self, ApiError> {
        if let Some(stray) = events.iter().find(|e| e.date() != date) {
            return Err(ApiError::Data(format!(
                "event '{}' on {} filed under {}",
                stray.title(),
                stray.date(),
                date
            )));
        }
        // stable sort keeps fetcher order for full ties
        events.sort_by(|a, b| {
            (b.priority, b.start_time).cmp(&(a.priority, a.start_time))
        });

        Ok(Self {
            date,
            events,
            moon_phase,
            moon_illumination: moon_illumination.clamp(0.0, 1.0),
        })
    }

    pub fn events(&self) -> &[AstronomyEvent] {
        &self.events
    }

    /// Highest-priority event, latest start time breaking ties
    pub fn primary_event(&self) -> Option<&AstronomyEvent> {
        self.events.first()
    }

    pub fn moon_phase(&self) -> MoonPhase {
        self.moon_phase
    }

    /// Illuminated fraction of the disc, 0.0..=1.0
    pub fn moon_illumination(&self) -> f64 {
        self.moon_illumination
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    pub fn events_of(&self, event_type: AstronomyEventType) -> Vec<&AstronomyEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }

    pub fn high_priority_events(&self) -> Vec<&AstronomyEvent> {
        self.events
            .iter()
            .filter(|e| e.priority >= EventPriority::High)
            .collect()
    }
}

impl DailyRecord for AstronomyDay {
    fn date(&self) -> NaiveDate {
        self.date
    }
}

impl Forecast<AstronomyDay> {
    /// Total number of events across all days
    pub fn total_events(&self) -> usize {
        self.daily.iter().map(AstronomyDay::event_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 18, hour, 0, 0).unwrap()
    }

    fn event(title: &str, priority: EventPriority, hour: u32) -> AstronomyEvent {
        AstronomyEvent::builder(AstronomyEventType::IssPass, title, "desc", at(hour))
            .priority(priority)
            .build()
            .unwrap()
    }

    fn day(events: Vec<AstronomyEvent>) -> AstronomyDay {
        AstronomyDay::new(
            NaiveDate::from_ymd_opt(2025, 6, 18).unwrap(),
            events,
            MoonPhase::WaningGibbous,
            0.6,
        )
        .unwrap()
    }

    #[test]
    fn test_builder_rejects_empty_title() {
        let result = AstronomyEvent::builder(AstronomyEventType::Apod, " ", "d", at(0)).build();
        assert!(matches!(result, Err(ApiError::Data(_))));
    }

    #[test]
    fn test_builder_rejects_end_before_start() {
        let result = AstronomyEvent::builder(AstronomyEventType::IssPass, "t", "d", at(5))
            .end_time(at(4))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_primary_event_prefers_higher_priority() {
        let d = day(vec![
            event("critical early", EventPriority::Critical, 1),
            event("high late", EventPriority::High, 23),
        ]);
        assert_eq!(d.primary_event().unwrap().title(), "critical early");

        let d = day(vec![
            event("high late", EventPriority::High, 23),
            event("critical early", EventPriority::Critical, 1),
        ]);
        assert_eq!(d.primary_event().unwrap().title(), "critical early");
    }

    #[test]
    fn test_primary_event_tie_breaks_on_latest_start() {
        let d = day(vec![
            event("early", EventPriority::Medium, 2),
            event("late", EventPriority::Medium, 20),
            event("middle", EventPriority::Medium, 10),
        ]);
        assert_eq!(d.primary_event().unwrap().title(), "late");
        assert_eq!(d.events()[2].title(), "early");
    }

    #[test]
    fn test_day_rejects_event_from_other_date() {
        let stray = AstronomyEvent::builder(
            AstronomyEventType::Apod,
            "t",
            "d",
            Utc.with_ymd_and_hms(2025, 6, 19, 0, 0, 0).unwrap(),
        )
        .build()
        .unwrap();

        let result = AstronomyDay::new(
            NaiveDate::from_ymd_opt(2025, 6, 18).unwrap(),
            vec![stray],
            MoonPhase::NewMoon,
            0.0,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_day_without_events_has_no_primary() {
        let d = day(vec![]);
        assert!(d.primary_event().is_none());
        assert!(!d.has_events());
    }

    #[test]
    fn test_high_priority_filter() {
        let d = day(vec![
            event("low", EventPriority::Low, 1),
            event("high", EventPriority::High, 2),
            event("critical", EventPriority::Critical, 3),
        ]);
        assert_eq!(d.high_priority_events().len(), 2);
        assert_eq!(d.events_of(AstronomyEventType::IssPass).len(), 3);
    }
}
