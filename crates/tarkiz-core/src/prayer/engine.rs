//! Prayer schedule computation.
//!
//! A pure function of (date, location, method, adjustments). There is no
//! internal state, so it is safe to call from any thread, and identical
//! inputs always give identical schedules. [`ScheduleCache`] relies on that.
//!
//! ## Pipeline
//!
//! ```text
//! solar geometry -> raw hours -> high-latitude fallback -> round to minute
//!     -> + adjustments -> ordering check -> PrayerSchedule
//! ```

use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};

use super::method::{CalculationMethod, HighLatitudeRule, IshaRule};
use super::solar::{fix_hour, rise_set_angle, SolarDay};
use super::{GeoCoordinate, PrayerName, PrayerSchedule, PrayerTime, TimeAdjustments};
use crate::error::{CoreError, Result};

/// Refinement passes; each pass re-evaluates the sun at the previous estimate.
const PASSES: usize = 2;

/// Initial estimates in hours: fajr, sunrise, dhuhr, asr, sunset, isha.
const INITIAL_GUESS: [f64; 6] = [5.0, 6.0, 12.0, 13.0, 18.0, 18.0];

#[derive(Debug, Clone, Copy)]
struct RawTimes {
    fajr: Option<f64>,
    sunrise: Option<f64>,
    dhuhr: f64,
    asr: Option<f64>,
    sunset: Option<f64>,
    isha: Option<f64>,
}

impl RawTimes {
    fn as_guess(&self, previous: [f64; 6]) -> [f64; 6] {
        [
            self.fajr.unwrap_or(previous[0]),
            self.sunrise.unwrap_or(previous[1]),
            self.dhuhr,
            self.asr.unwrap_or(previous[3]),
            self.sunset.unwrap_or(previous[4]),
            self.isha.unwrap_or(previous[5]),
        ]
    }
}

fn solve(day: &SolarDay, method: &CalculationMethod, elevation_m: f64) -> RawTimes {
    let rise_set = rise_set_angle(elevation_m);
    let mut guess = INITIAL_GUESS;
    let mut raw = RawTimes {
        fajr: None,
        sunrise: None,
        dhuhr: guess[2],
        asr: None,
        sunset: None,
        isha: None,
    };

    for _ in 0..PASSES {
        raw = RawTimes {
            fajr: day.sun_angle_time(method.fajr_angle, guess[0], true),
            sunrise: day.sun_angle_time(rise_set, guess[1], true),
            dhuhr: day.mid_day(guess[2]),
            asr: day.asr_time(method.asr.factor(), guess[3]),
            sunset: day.sun_angle_time(rise_set, guess[4], false),
            isha: match method.isha {
                IshaRule::Angle(angle) => day.sun_angle_time(angle, guess[5], false),
                IshaRule::Interval(_) => None,
            },
        };
        guess = raw.as_guess(guess);
    }
    raw
}

/// Place Fajr/Isha inside the night when the angle gives no usable answer.
///
/// Fajr is measured back from sunrise, Isha forward from sunset.
fn twilight_fallback(
    computed: Option<f64>,
    anchor: f64,
    night: f64,
    angle: f64,
    rule: HighLatitudeRule,
    name: PrayerName,
    date: NaiveDate,
) -> Result<f64> {
    let Some(fraction) = rule.night_portion(angle) else {
        return computed.ok_or_else(|| {
            CoreError::invalid(
                "location",
                format!(
                    "sun never reaches -{angle}° for {name} on {date} \
                     and no high-latitude rule is set"
                ),
            )
        });
    };
    let before_anchor = name == PrayerName::Fajr;
    let portion = fraction * night;
    let distance = |t: f64| {
        if before_anchor {
            fix_hour(anchor - t)
        } else {
            fix_hour(t - anchor)
        }
    };
    match computed {
        Some(t) if distance(t) <= portion => Ok(t),
        _ => {
            tracing::debug!(prayer = %name, ?rule, %date, "applying high-latitude fallback");
            Ok(if before_anchor {
                anchor - portion
            } else {
                anchor + portion
            })
        }
    }
}

/// Raw local-longitude hours in [`PrayerName::ALL`] order, before rounding.
fn raw_hours(
    date: NaiveDate,
    location: &GeoCoordinate,
    method: &CalculationMethod,
) -> Result<[f64; 6]> {
    location.validate()?;
    method.validate()?;

    let day = SolarDay::new(date, location.latitude, location.longitude);
    let raw = solve(&day, method, location.elevation_m);

    let (Some(sunrise), Some(sunset)) = (raw.sunrise, raw.sunset) else {
        return Err(CoreError::invalid(
            "location",
            format!(
                "the sun does not rise and set on {date} at latitude {}",
                location.latitude
            ),
        ));
    };
    let asr = raw.asr.ok_or_else(|| {
        CoreError::invalid(
            "location",
            format!("Asr altitude is never reached on {date} at latitude {}", location.latitude),
        )
    })?;

    let night = fix_hour(sunrise - sunset);
    let rule = method.high_latitude_rule;
    let fajr = twilight_fallback(
        raw.fajr,
        sunrise,
        night,
        method.fajr_angle,
        rule,
        PrayerName::Fajr,
        date,
    )?;
    let isha = match method.isha {
        IshaRule::Angle(angle) => {
            twilight_fallback(raw.isha, sunset, night, angle, rule, PrayerName::Isha, date)?
        }
        IshaRule::Interval(minutes) => sunset + minutes as f64 / 60.0,
    };
    let dhuhr = raw.dhuhr + method.dhuhr_margin_minutes as f64 / 60.0;

    Ok([fajr, sunrise, dhuhr, asr, sunset, isha])
}

fn to_instant(date: NaiveDate, longitude: f64, hours: f64) -> DateTime<Utc> {
    let midnight = date.and_time(chrono::NaiveTime::MIN).and_utc();
    let ms = ((hours - longitude / 15.0) * 3_600_000.0).round() as i64;
    midnight + Duration::milliseconds(ms)
}

fn round_to_minute(at: DateTime<Utc>) -> DateTime<Utc> {
    let ms = at.timestamp_millis();
    let rounded = (ms + 30_000).div_euclid(60_000) * 60_000;
    DateTime::from_timestamp_millis(rounded).unwrap_or(at)
}

/// Schedule with no manual adjustments.
pub fn compute_schedule_unadjusted(
    date: NaiveDate,
    location: &GeoCoordinate,
    method: &CalculationMethod,
) -> Result<PrayerSchedule> {
    compute_schedule(date, location, method, &TimeAdjustments::default())
}

/// Compute the six daily times for `date` at `location`.
///
/// # Errors
///
/// `InputValidation` for out-of-range inputs, polar day/night, an
/// unsolvable twilight with `HighLatitudeRule::None`, or adjustments that
/// would break the Fajr < Sunrise < ... < Isha order. No partial schedule is
/// returned.
pub fn compute_schedule(
    date: NaiveDate,
    location: &GeoCoordinate,
    method: &CalculationMethod,
    adjustments: &TimeAdjustments,
) -> Result<PrayerSchedule> {
    adjustments.validate()?;
    let hours = raw_hours(date, location, method)?;

    let times: Vec<PrayerTime> = PrayerName::ALL
        .into_iter()
        .zip(hours)
        .map(|(name, h)| PrayerTime {
            name,
            at: round_to_minute(to_instant(date, location.longitude, h))
                + Duration::minutes(adjustments.get(name) as i64),
        })
        .collect();

    for pair in times.windows(2) {
        if pair[0].at >= pair[1].at {
            return Err(CoreError::invalid(
                "adjustments",
                format!(
                    "{} ({}) would not precede {} ({})",
                    pair[0].name,
                    pair[0].at.format("%H:%M UTC"),
                    pair[1].name,
                    pair[1].at.format("%H:%M UTC"),
                ),
            ));
        }
    }

    tracing::debug!(
        %date,
        method = %method.id,
        lat = location.latitude,
        lon = location.longitude,
        "computed prayer schedule"
    );
    Ok(PrayerSchedule::from_ordered(
        date,
        location.timezone_offset_minutes,
        times,
    ))
}

/// True solar noon (no Dhuhr margin, not rounded to the minute).
pub fn solar_noon(date: NaiveDate, location: &GeoCoordinate) -> Result<DateTime<Utc>> {
    location.validate()?;
    let day = SolarDay::new(date, location.latitude, location.longitude);
    let mut noon = INITIAL_GUESS[2];
    for _ in 0..PASSES {
        noon = day.mid_day(noon);
    }
    Ok(to_instant(date, location.longitude, noon))
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    date: NaiveDate,
    location: [u64; 3],
    timezone_offset_minutes: i32,
    method: String,
    adjustments: TimeAdjustments,
}

/// Memoizes schedules by their full input.
#[derive(Debug)]
pub struct ScheduleCache {
    entries: HashMap<CacheKey, PrayerSchedule>,
    capacity: usize,
}

impl Default for ScheduleCache {
    fn default() -> Self {
        Self::new(64)
    }
}

impl ScheduleCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get_or_compute(
        &mut self,
        date: NaiveDate,
        location: &GeoCoordinate,
        method: &CalculationMethod,
        adjustments: &TimeAdjustments,
    ) -> Result<PrayerSchedule> {
        let key = CacheKey {
            date,
            location: [
                location.latitude.to_bits(),
                location.longitude.to_bits(),
                location.elevation_m.to_bits(),
            ],
            timezone_offset_minutes: location.timezone_offset_minutes,
            method: serde_json::to_string(method)?,
            adjustments: adjustments.clone(),
        };
        if let Some(hit) = self.entries.get(&key) {
            return Ok(hit.clone());
        }
        let schedule = compute_schedule(date, location, method, adjustments)?;
        if self.entries.len() >= self.capacity {
            self.entries.clear();
        }
        self.entries.insert(key, schedule.clone());
        Ok(schedule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prayer::method::{MethodOverrides, MethodRegistry};
    use chrono::Timelike;

    fn new_york() -> GeoCoordinate {
        GeoCoordinate::new(40.7128, -74.0060, 10.0, -300).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn mwl_new_york_winter_is_ordered_and_plausible() {
        let registry = MethodRegistry::new();
        let mwl = registry.get("mwl").unwrap();
        let schedule = compute_schedule_unadjusted(date(2024, 1, 15), &new_york(), mwl).unwrap();

        let hours: Vec<u32> = PrayerName::ALL
            .iter()
            .map(|p| schedule.local(*p).hour())
            .collect();
        // Roughly 5:42, 7:18, 12:06, 14:34, 16:54, 18:24 EST.
        assert_eq!(hours, [5, 7, 12, 14, 16, 18]);
        assert_eq!(schedule.format_local(PrayerName::Sunrise).len(), "7:18 AM".len());
    }

    #[test]
    fn dhuhr_is_solar_noon_plus_margin() {
        let registry = MethodRegistry::new();
        let method = registry.get("mwl").unwrap();
        let d = date(2024, 7, 4);
        let schedule = compute_schedule_unadjusted(d, &new_york(), method).unwrap();
        let noon = solar_noon(d, &new_york()).unwrap();
        let expected = noon + Duration::minutes(method.dhuhr_margin_minutes);
        let diff = (schedule.get(PrayerName::Dhuhr) - expected).num_seconds().abs();
        assert!(diff <= 30, "diff {diff}s");
    }

    #[test]
    fn hanafi_asr_is_later() {
        let registry = MethodRegistry::new();
        let standard = registry.get("karachi").unwrap();
        let hanafi = registry
            .custom("karachi", &MethodOverrides {
                asr: Some(crate::prayer::AsrJuristic::Hanafi),
                ..Default::default()
            })
            .unwrap();
        let karachi = GeoCoordinate::new(24.8607, 67.0011, 0.0, 300).unwrap();
        let d = date(2024, 1, 15);
        let a = compute_schedule_unadjusted(d, &karachi, standard).unwrap();
        let b = compute_schedule_unadjusted(d, &karachi, &hanafi).unwrap();
        assert!(b.get(PrayerName::Asr) > a.get(PrayerName::Asr));
        assert_eq!(a.get(PrayerName::Dhuhr), b.get(PrayerName::Dhuhr));
    }

    #[test]
    fn interval_isha_follows_maghrib() {
        let registry = MethodRegistry::new();
        let makkah = GeoCoordinate::new(21.3891, 39.8579, 0.0, 180).unwrap();
        let umm_al_qura = registry.get("makkah").unwrap();
        let schedule = compute_schedule_unadjusted(date(2024, 5, 1), &makkah, umm_al_qura).unwrap();
        assert_eq!(
            schedule.get(PrayerName::Isha) - schedule.get(PrayerName::Maghrib),
            Duration::minutes(90)
        );
    }

    #[test]
    fn high_latitude_summer_uses_fallback() {
        let registry = MethodRegistry::new();
        let oslo = GeoCoordinate::new(59.9139, 10.7522, 0.0, 60).unwrap();
        let d = date(2024, 6, 21);
        let schedule = compute_schedule_unadjusted(d, &oslo, registry.get("mwl").unwrap()).unwrap();
        assert!(schedule.get(PrayerName::Fajr) < schedule.get(PrayerName::Sunrise));
        assert!(schedule.get(PrayerName::Isha) > schedule.get(PrayerName::Maghrib));

        let strict = registry
            .custom("mwl", &MethodOverrides {
                high_latitude_rule: Some(HighLatitudeRule::None),
                ..Default::default()
            })
            .unwrap();
        let err = compute_schedule_unadjusted(d, &oslo, &strict).unwrap_err();
        assert!(matches!(err, CoreError::InputValidation { .. }));
    }

    #[test]
    fn middle_of_night_splits_the_night() {
        let registry = MethodRegistry::new();
        let method = registry
            .custom("mwl", &MethodOverrides {
                high_latitude_rule: Some(HighLatitudeRule::MiddleOfNight),
                ..Default::default()
            })
            .unwrap();
        let oslo = GeoCoordinate::new(59.9139, 10.7522, 0.0, 60).unwrap();
        let s = compute_schedule_unadjusted(date(2024, 6, 21), &oslo, &method).unwrap();
        let night = Duration::hours(24) - (s.get(PrayerName::Maghrib) - s.get(PrayerName::Sunrise));
        let isha_gap = s.get(PrayerName::Isha) - s.get(PrayerName::Maghrib);
        assert!((isha_gap - night / 2).num_minutes().abs() <= 1);
    }

    #[test]
    fn polar_day_is_rejected() {
        let registry = MethodRegistry::new();
        let svalbard = GeoCoordinate::new(78.2232, 15.6267, 0.0, 60).unwrap();
        let mwl = registry.get("mwl").unwrap();
        let err = compute_schedule_unadjusted(date(2024, 6, 21), &svalbard, mwl).unwrap_err();
        assert!(matches!(err, CoreError::InputValidation { ref field, .. } if field == "location"));
    }

    #[test]
    fn crossing_adjustments_are_reported() {
        let registry = MethodRegistry::new();
        let makkah = GeoCoordinate::new(21.3891, 39.8579, 0.0, 180).unwrap();
        let method = registry
            .custom("makkah", &MethodOverrides {
                isha: Some(IshaRule::Interval(10)),
                ..Default::default()
            })
            .unwrap();
        let adjustments = TimeAdjustments::new()
            .with(PrayerName::Maghrib, 15)
            .unwrap();
        let err = compute_schedule(date(2024, 5, 1), &makkah, &method, &adjustments).unwrap_err();
        match err {
            CoreError::InputValidation { field, message } => {
                assert_eq!(field, "adjustments");
                assert!(message.contains("Maghrib"), "{message}");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn cache_returns_identical_schedule() {
        let registry = MethodRegistry::new();
        let method = registry.get("isna").unwrap();
        let mut cache = ScheduleCache::new(4);
        let d = date(2024, 9, 1);
        let first = cache
            .get_or_compute(d, &new_york(), method, &TimeAdjustments::default())
            .unwrap();
        let second = cache
            .get_or_compute(d, &new_york(), method, &TimeAdjustments::default())
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
        assert_eq!(first, compute_schedule_unadjusted(d, &new_york(), method).unwrap());
    }

    #[test]
    fn times_are_whole_minutes() {
        let registry = MethodRegistry::new();
        let egypt = registry.get("egypt").unwrap();
        let s = compute_schedule_unadjusted(date(2025, 2, 2), &new_york(), egypt).unwrap();
        for t in s.iter() {
            assert_eq!(t.at.second(), 0);
            assert_eq!(t.at.timestamp_subsec_millis(), 0);
        }
    }
}
