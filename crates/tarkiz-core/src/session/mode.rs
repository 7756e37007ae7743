//! Prayer modes: which prayers open a blocking window, and for how long.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::PrayerWindow;
use crate::error::{CoreError, Result};
use crate::prayer::{PrayerName, PrayerSchedule};

/// Longest blocking window a mode may configure.
pub const MAX_WINDOW_MINUTES: u32 = 180;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrayerMode {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
    pub blocking_prayers: Vec<PrayerName>,
    pub window_minutes: u32,
}

impl PrayerMode {
    pub const DEFAULT_ID: &'static str = "salah";

    pub fn presets() -> Vec<PrayerMode> {
        vec![
            PrayerMode {
                id: "salah".into(),
                name: "Salah Time".into(),
                description: "Block during prayer windows".into(),
                icon: "🕌".into(),
                blocking_prayers: PrayerName::PRAYERS.to_vec(),
                window_minutes: 30,
            },
            PrayerMode {
                id: "focus".into(),
                name: "Focus Mode".into(),
                description: "Deep concentration".into(),
                icon: "🎯".into(),
                blocking_prayers: vec![PrayerName::Dhuhr, PrayerName::Asr],
                window_minutes: 60,
            },
            PrayerMode {
                id: "quran".into(),
                name: "Quran Time".into(),
                description: "For recitation & study".into(),
                icon: "📖".into(),
                blocking_prayers: vec![PrayerName::Fajr, PrayerName::Maghrib, PrayerName::Isha],
                window_minutes: 45,
            },
        ]
    }

    pub fn find(id: &str) -> Result<PrayerMode> {
        let key = id.trim();
        Self::presets()
            .into_iter()
            .find(|m| m.id.eq_ignore_ascii_case(key) || m.name.eq_ignore_ascii_case(key))
            .ok_or_else(|| CoreError::not_found("prayer mode", id))
    }

    pub fn with_window_minutes(mut self, minutes: u32) -> Result<Self> {
        if minutes == 0 || minutes > MAX_WINDOW_MINUTES {
            return Err(CoreError::invalid(
                "window_minutes",
                format!("{minutes} is outside [1, {MAX_WINDOW_MINUTES}]"),
            ));
        }
        self.window_minutes = minutes;
        Ok(self)
    }

    pub fn blocks(&self, prayer: PrayerName) -> bool {
        self.blocking_prayers.contains(&prayer)
    }

    /// Blocking windows for one day, in schedule order.
    ///
    /// A window starts at its prayer and lasts `window_minutes`, cut short by
    /// the next entry of the schedule (Fajr never outlasts sunrise).
    pub fn windows(&self, schedule: &PrayerSchedule) -> Vec<PrayerWindow> {
        schedule
            .iter()
            .filter(|t| self.blocks(t.name))
            .map(|t| {
                let mut end = t.at + Duration::minutes(self.window_minutes as i64);
                if let Some(next) = schedule.after(t.name) {
                    end = end.min(next.at);
                }
                PrayerWindow {
                    prayer: t.name,
                    start: t.at,
                    end,
                }
            })
            .collect()
    }

    pub fn window_at(&self, schedule: &PrayerSchedule, now: DateTime<Utc>) -> Option<PrayerWindow> {
        self.windows(schedule).into_iter().find(|w| w.contains(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prayer::{compute_schedule_unadjusted, GeoCoordinate, MethodRegistry};
    use chrono::NaiveDate;

    fn schedule() -> PrayerSchedule {
        let registry = MethodRegistry::new();
        let cairo = GeoCoordinate::new(30.0444, 31.2357, 23.0, 120).unwrap();
        compute_schedule_unadjusted(
            NaiveDate::from_ymd_opt(2024, 4, 10).unwrap(),
            &cairo,
            registry.get("egypt").unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn salah_blocks_every_prayer_but_not_sunrise() {
        let mode = PrayerMode::find("salah").unwrap();
        let windows = mode.windows(&schedule());
        let prayers: Vec<PrayerName> = windows.iter().map(|w| w.prayer).collect();
        assert_eq!(prayers, PrayerName::PRAYERS.to_vec());
        assert!(!mode.blocks(PrayerName::Sunrise));
    }

    #[test]
    fn windows_are_truncated_at_next_entry() {
        let s = schedule();
        let mode = PrayerMode::find("quran")
            .unwrap()
            .with_window_minutes(MAX_WINDOW_MINUTES)
            .unwrap();
        let fajr = mode.windows(&s)[0];
        assert_eq!(fajr.prayer, PrayerName::Fajr);
        assert_eq!(fajr.end, s.get(PrayerName::Sunrise));
    }

    #[test]
    fn window_at_respects_half_open_interval() {
        let s = schedule();
        let mode = PrayerMode::find("focus").unwrap();
        let asr = s.get(PrayerName::Asr);
        assert_eq!(mode.window_at(&s, asr).unwrap().prayer, PrayerName::Asr);
        assert!(mode.window_at(&s, asr - Duration::minutes(1)).is_none());
        assert!(mode.window_at(&s, asr + Duration::minutes(60)).is_none());
        assert!(mode.window_at(&s, s.get(PrayerName::Isha)).is_none());
    }

    #[test]
    fn window_override_is_validated() {
        let mode = PrayerMode::find("salah").unwrap();
        assert!(mode.clone().with_window_minutes(0).is_err());
        assert_eq!(mode.with_window_minutes(20).unwrap().window_minutes, 20);
        assert!(PrayerMode::find("gaming").is_err());
    }
}
