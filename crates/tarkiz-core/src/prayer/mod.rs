//! Prayer-time domain: names, coordinates, adjustments and the computed
//! daily schedule.
//!
//! The schedule is a derived value. It is recomputed from
//! (date, location, method, adjustments) whenever any of them changes and is
//! never edited in place.

mod engine;
pub mod location;
pub mod method;
mod solar;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

pub use engine::{compute_schedule, compute_schedule_unadjusted, solar_noon, ScheduleCache};
pub use location::{find_city, popular_cities, City};
pub use method::{
    AsrJuristic, CalculationMethod, HighLatitudeRule, IshaRule, MethodOverrides, MethodRegistry,
};

/// Largest manual adjustment, in minutes, in either direction.
pub const MAX_ADJUSTMENT_MINUTES: i32 = 30;

/// The five daily prayers plus sunrise, in their fixed daily order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrayerName {
    Fajr,
    Sunrise,
    Dhuhr,
    Asr,
    Maghrib,
    Isha,
}

impl PrayerName {
    pub const ALL: [PrayerName; 6] = [
        PrayerName::Fajr,
        PrayerName::Sunrise,
        PrayerName::Dhuhr,
        PrayerName::Asr,
        PrayerName::Maghrib,
        PrayerName::Isha,
    ];

    /// The five obligatory prayers (everything except sunrise).
    pub const PRAYERS: [PrayerName; 5] = [
        PrayerName::Fajr,
        PrayerName::Dhuhr,
        PrayerName::Asr,
        PrayerName::Maghrib,
        PrayerName::Isha,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PrayerName::Fajr => "Fajr",
            PrayerName::Sunrise => "Sunrise",
            PrayerName::Dhuhr => "Dhuhr",
            PrayerName::Asr => "Asr",
            PrayerName::Maghrib => "Maghrib",
            PrayerName::Isha => "Isha",
        }
    }

    pub fn arabic_name(self) -> &'static str {
        match self {
            PrayerName::Fajr => "الفجر",
            PrayerName::Sunrise => "الشروق",
            PrayerName::Dhuhr => "الظهر",
            PrayerName::Asr => "العصر",
            PrayerName::Maghrib => "المغرب",
            PrayerName::Isha => "العشاء",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for PrayerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrayerName {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        PrayerName::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CoreError::not_found("prayer", s))
    }
}

/// Observer position plus the fixed UTC offset used for local display.
///
/// Replaced wholesale on relocation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoCoordinate {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub elevation_m: f64,
    pub timezone_offset_minutes: i32,
}

impl GeoCoordinate {
    /// Build a validated coordinate.
    pub fn new(
        latitude: f64,
        longitude: f64,
        elevation_m: f64,
        timezone_offset_minutes: i32,
    ) -> Result<Self> {
        let coord = Self {
            latitude,
            longitude,
            elevation_m,
            timezone_offset_minutes,
        };
        coord.validate()?;
        Ok(coord)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(CoreError::invalid(
                "latitude",
                format!("{} is outside [-90, 90]", self.latitude),
            ));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(CoreError::invalid(
                "longitude",
                format!("{} is outside [-180, 180]", self.longitude),
            ));
        }
        if !self.elevation_m.is_finite() {
            return Err(CoreError::invalid("elevation_m", "must be finite"));
        }
        if !(-840..=840).contains(&self.timezone_offset_minutes) {
            return Err(CoreError::invalid(
                "timezone_offset_minutes",
                format!("{} is outside [-840, 840]", self.timezone_offset_minutes),
            ));
        }
        Ok(())
    }

    pub fn offset(&self) -> FixedOffset {
        fixed_offset(self.timezone_offset_minutes)
    }
}

pub(crate) fn fixed_offset(minutes: i32) -> FixedOffset {
    FixedOffset::east_opt(minutes * 60).unwrap_or_else(|| Utc.fix())
}

/// Per-prayer manual minute offsets, applied after raw computation.
///
/// Absent entries count as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeAdjustments(BTreeMap<PrayerName, i32>);

impl TimeAdjustments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, prayer: PrayerName) -> i32 {
        self.0.get(&prayer).copied().unwrap_or(0)
    }

    pub fn set(&mut self, prayer: PrayerName, minutes: i32) -> Result<()> {
        check_adjustment(prayer, minutes)?;
        if minutes == 0 {
            self.0.remove(&prayer);
        } else {
            self.0.insert(prayer, minutes);
        }
        Ok(())
    }

    pub fn with(mut self, prayer: PrayerName, minutes: i32) -> Result<Self> {
        self.set(prayer, minutes)?;
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(|m| *m == 0)
    }

    pub fn validate(&self) -> Result<()> {
        for (prayer, minutes) in &self.0 {
            check_adjustment(*prayer, *minutes)?;
        }
        Ok(())
    }
}

fn check_adjustment(prayer: PrayerName, minutes: i32) -> Result<()> {
    if minutes.abs() > MAX_ADJUSTMENT_MINUTES {
        return Err(CoreError::invalid(
            format!("adjustments.{}", prayer.as_str().to_lowercase()),
            format!(
                "{minutes} min is outside [-{MAX_ADJUSTMENT_MINUTES}, {MAX_ADJUSTMENT_MINUTES}]"
            ),
        ));
    }
    Ok(())
}

/// One entry of a daily schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrayerTime {
    pub name: PrayerName,
    pub at: DateTime<Utc>,
}

/// Six instants for one calendar day, strictly increasing in
/// [`PrayerName::ALL`] order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrayerSchedule {
    date: NaiveDate,
    timezone_offset_minutes: i32,
    times: Vec<PrayerTime>,
}

impl PrayerSchedule {
    /// Callers must pass six entries already in order; the engine checks this.
    pub(crate) fn from_ordered(
        date: NaiveDate,
        timezone_offset_minutes: i32,
        times: Vec<PrayerTime>,
    ) -> Self {
        Self {
            date,
            timezone_offset_minutes,
            times,
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn timezone_offset_minutes(&self) -> i32 {
        self.timezone_offset_minutes
    }

    pub fn times(&self) -> &[PrayerTime] {
        &self.times
    }

    pub fn iter(&self) -> impl Iterator<Item = &PrayerTime> {
        self.times.iter()
    }

    pub fn get(&self, name: PrayerName) -> DateTime<Utc> {
        self.times[name.index()].at
    }

    /// Entry following `name` in the same day, if any.
    pub fn after(&self, name: PrayerName) -> Option<&PrayerTime> {
        self.times.get(name.index() + 1)
    }

    /// Latest entry that has started at `now`.
    pub fn current(&self, now: DateTime<Utc>) -> Option<&PrayerTime> {
        self.times.iter().rev().find(|t| t.at <= now)
    }

    /// First entry strictly after `now`.
    pub fn next(&self, now: DateTime<Utc>) -> Option<&PrayerTime> {
        self.times.iter().find(|t| t.at > now)
    }

    pub fn local(&self, name: PrayerName) -> DateTime<FixedOffset> {
        self.get(name).with_timezone(&fixed_offset(self.timezone_offset_minutes))
    }

    /// Local wall-clock time as shown on the prayer list, e.g. `5:12 AM`.
    pub fn format_local(&self, name: PrayerName) -> String {
        self.local(name).format("%-I:%M %p").to_string()
    }
}

/// Parse a `YYYY-MM-DD` calendar day.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| CoreError::invalid("date", format!("'{s}': {e}")))
}
