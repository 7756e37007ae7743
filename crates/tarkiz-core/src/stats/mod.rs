//! Protected-time statistics.
//!
//! Folds the session event history into how long apps were actually blocked,
//! per local day and per Monday-to-Sunday week. A lock still open at `now`
//! counts up to `now`.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use serde::Serialize;

use crate::events::SessionEvent;
use crate::prayer::PrayerName;

/// Daily target the weekly chart is normalized against.
pub const DAILY_GOAL_MINUTES: i64 = 120;

/// One continuous locked interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProtectedSpan {
    pub prayer: Option<PrayerName>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Pair `Locked` and `Unlocked` events into spans, in order.
pub fn protected_spans(events: &[SessionEvent], now: DateTime<Utc>) -> Vec<ProtectedSpan> {
    let mut spans = Vec::new();
    let mut open: Option<(Option<PrayerName>, DateTime<Utc>)> = None;
    for event in events {
        match event {
            SessionEvent::Locked { prayer, at, .. } => open = Some((Some(*prayer), *at)),
            SessionEvent::Unlocked {
                prayer,
                locked_at,
                at,
                ..
            } => {
                open = None;
                if at > locked_at {
                    spans.push(ProtectedSpan {
                        prayer: *prayer,
                        start: *locked_at,
                        end: *at,
                    });
                }
            }
        }
    }
    if let Some((prayer, start)) = open {
        if now > start {
            spans.push(ProtectedSpan { prayer, start, end: now });
        }
    }
    spans
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DaySummary {
    pub date: NaiveDate,
    pub protected_minutes: i64,
    /// Locks that started on this day.
    pub sessions: u32,
}

impl DaySummary {
    /// `1h 05m` style, as on the history list.
    pub fn label(&self) -> String {
        format_minutes(self.protected_minutes)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeekDay {
    pub date: NaiveDate,
    /// `MON` .. `SUN`
    pub label: String,
    pub protected_minutes: i64,
    /// Share of [`DAILY_GOAL_MINUTES`], capped at 1.0.
    pub progress: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeekSummary {
    pub start: NaiveDate,
    pub days: Vec<WeekDay>,
    pub total_minutes: i64,
    /// Total divided by the days elapsed up to the reference date.
    pub daily_average_minutes: i64,
}

pub fn format_minutes(minutes: i64) -> String {
    format!("{}h {:02}m", minutes / 60, minutes % 60)
}

fn day_bounds(date: NaiveDate, offset_minutes: i32) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = date.and_time(NaiveTime::MIN).and_utc() - Duration::minutes(offset_minutes as i64);
    (start, start + Duration::days(1))
}

fn local_date(at: DateTime<Utc>, offset_minutes: i32) -> NaiveDate {
    (at + Duration::minutes(offset_minutes as i64)).date_naive()
}

fn summarize(spans: &[ProtectedSpan], date: NaiveDate, offset_minutes: i32) -> DaySummary {
    let (day_start, day_end) = day_bounds(date, offset_minutes);
    let mut protected = Duration::zero();
    let mut sessions = 0;
    for span in spans {
        let start = span.start.max(day_start);
        let end = span.end.min(day_end);
        if end > start {
            protected += end - start;
        }
        if local_date(span.start, offset_minutes) == date {
            sessions += 1;
        }
    }
    DaySummary {
        date,
        protected_minutes: protected.num_minutes(),
        sessions,
    }
}

pub fn day_summary(
    events: &[SessionEvent],
    offset_minutes: i32,
    date: NaiveDate,
    now: DateTime<Utc>,
) -> DaySummary {
    summarize(&protected_spans(events, now), date, offset_minutes)
}

/// Every local day with protected time, most recent first.
pub fn daily_summaries(
    events: &[SessionEvent],
    offset_minutes: i32,
    now: DateTime<Utc>,
) -> Vec<DaySummary> {
    let spans = protected_spans(events, now);
    let mut dates: Vec<NaiveDate> = Vec::new();
    for span in &spans {
        let mut d = local_date(span.start, offset_minutes);
        let last = local_date(span.end, offset_minutes);
        while d <= last {
            if !dates.contains(&d) {
                dates.push(d);
            }
            d += Duration::days(1);
        }
    }
    dates.sort_unstable_by(|a, b| b.cmp(a));
    dates
        .into_iter()
        .map(|d| summarize(&spans, d, offset_minutes))
        .filter(|s| s.protected_minutes > 0 || s.sessions > 0)
        .collect()
}

/// The Monday-to-Sunday week containing `date`.
pub fn week_summary(
    events: &[SessionEvent],
    offset_minutes: i32,
    date: NaiveDate,
    now: DateTime<Utc>,
) -> WeekSummary {
    let spans = protected_spans(events, now);
    let start = date - Duration::days(date.weekday().num_days_from_monday() as i64);
    let days: Vec<WeekDay> = (0..7)
        .map(|i| {
            let d = start + Duration::days(i);
            let minutes = summarize(&spans, d, offset_minutes).protected_minutes;
            WeekDay {
                date: d,
                label: d.format("%a").to_string().to_uppercase(),
                protected_minutes: minutes,
                progress: (minutes as f64 / DAILY_GOAL_MINUTES as f64).min(1.0),
            }
        })
        .collect();
    let total_minutes: i64 = days.iter().map(|d| d.protected_minutes).sum();
    let elapsed = date.weekday().num_days_from_monday() as i64 + 1;
    WeekSummary {
        start,
        days,
        total_minutes,
        daily_average_minutes: total_minutes / elapsed,
    }
}
