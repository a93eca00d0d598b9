//! Moon phase calculation
//!
//! The aggregator only needs `date -> (phase, illumination)`; the calculator is
//! injected so tests can pin the result.

use std::f64::consts::PI;

use chrono::{NaiveDate, NaiveDateTime};

use crate::data::MoonPhase;

/// Mean length of a lunation in days
const SYNODIC_MONTH_DAYS: f64 = 29.530_588_853;

/// Pure function of a date
pub trait MoonPhaseCalculator: Send + Sync {
    /// Phase and illuminated fraction (0.0..=1.0) at noon UTC on `date`
    fn phase(&self, date: NaiveDate) -> (MoonPhase, f64);
}

/// Mean-lunation approximation anchored at the 2000-01-06 18:14 UTC new moon
///
/// Accurate to within a day or so, which is enough for a dashboard.
#[derive(Debug, Clone, Copy, Default)]
pub struct SynodicMoonCalculator;

impl SynodicMoonCalculator {
    fn reference_new_moon() -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(2000, 1, 6)?.and_hms_opt(18, 14, 0)
    }

    /// Moon age in days since the last new moon
    pub fn age_days(date: NaiveDate) -> f64 {
        let (Some(reference), Some(noon)) = (Self::reference_new_moon(), date.and_hms_opt(12, 0, 0))
        else {
            return 0.0;
        };
        let elapsed_days = (noon - reference).num_seconds() as f64 / 86_400.0;
        elapsed_days.rem_euclid(SYNODIC_MONTH_DAYS)
    }
}

impl MoonPhaseCalculator for SynodicMoonCalculator {
    fn phase(&self, date: NaiveDate) -> (MoonPhase, f64) {
        let age = Self::age_days(date);
        let fraction = age / SYNODIC_MONTH_DAYS;
        let illumination = (1.0 - (2.0 * PI * fraction).cos()) / 2.0;

        // eighths of the cycle, centered on the principal phases
        let phase = match ((fraction * 8.0) + 0.5).floor() as u32 % 8 {
            0 => MoonPhase::NewMoon,
            1 => MoonPhase::WaxingCrescent,
            2 => MoonPhase::FirstQuarter,
            3 => MoonPhase::WaxingGibbous,
            4 => MoonPhase::FullMoon,
            5 => MoonPhase::WaningGibbous,
            6 => MoonPhase::LastQuarter,
            _ => MoonPhase::WaningCrescent,
        };

        (phase, illumination)
    }
}
