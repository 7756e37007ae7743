//! Emergency unlock quota.
//!
//! A fixed allowance per local day or local ISO week. The counter resets
//! lazily: nothing runs at midnight, the next consume or refresh notices the
//! period rolled over.

use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, Result};

/// Unlocks allowed per period unless configured otherwise.
pub const DEFAULT_EMERGENCY_UNLOCKS: u32 = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaPeriod {
    #[default]
    Daily,
    Weekly,
}

impl QuotaPeriod {
    fn length(self) -> Duration {
        match self {
            QuotaPeriod::Daily => Duration::days(1),
            QuotaPeriod::Weekly => Duration::weeks(1),
        }
    }
}

impl fmt::Display for QuotaPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuotaPeriod::Daily => f.write_str("daily"),
            QuotaPeriod::Weekly => f.write_str("weekly"),
        }
    }
}

impl FromStr for QuotaPeriod {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" | "day" => Ok(QuotaPeriod::Daily),
            "weekly" | "week" => Ok(QuotaPeriod::Weekly),
            other => Err(CoreError::invalid(
                "quota_period",
                format!("'{other}' (expected daily or weekly)"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyQuota {
    limit: u32,
    remaining: u32,
    period: QuotaPeriod,
    timezone_offset_minutes: i32,
    /// UTC instant of the local midnight that opened the current period.
    period_start: DateTime<Utc>,
}

impl EmergencyQuota {
    pub fn new(
        limit: u32,
        period: QuotaPeriod,
        timezone_offset_minutes: i32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            limit,
            remaining: limit,
            period,
            timezone_offset_minutes,
            period_start: period_start(period, timezone_offset_minutes, now),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn period(&self) -> QuotaPeriod {
        self.period
    }

    /// Stored remaining count; may be stale if the period has rolled over.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Remaining count as of `now`, without mutating.
    pub fn available(&self, now: DateTime<Utc>) -> u32 {
        if now >= self.resets_at() {
            self.limit
        } else {
            self.remaining
        }
    }

    pub fn resets_at(&self) -> DateTime<Utc> {
        self.period_start + self.period.length()
    }

    /// Start a new period if `now` is past the current one. Returns whether it reset.
    pub fn refresh(&mut self, now: DateTime<Utc>) -> bool {
        if now < self.resets_at() {
            return false;
        }
        self.remaining = self.limit;
        self.period_start = period_start(self.period, self.timezone_offset_minutes, now);
        tracing::debug!(limit = self.limit, period = %self.period, "emergency quota reset");
        true
    }

    /// Take one unlock from the allowance.
    ///
    /// # Errors
    ///
    /// `QuotaExhausted` when nothing is left; the counter is unchanged.
    pub fn consume(&mut self, now: DateTime<Utc>) -> Result<u32> {
        self.refresh(now);
        if self.remaining == 0 {
            return Err(CoreError::QuotaExhausted {
                limit: self.limit,
                resets_at: self.resets_at(),
            });
        }
        self.remaining -= 1;
        Ok(self.remaining)
    }

    /// Apply new settings, keeping the number already used this period.
    pub fn reconfigure(
        &mut self,
        limit: u32,
        period: QuotaPeriod,
        timezone_offset_minutes: i32,
        now: DateTime<Utc>,
    ) {
        self.refresh(now);
        let used = self.limit.saturating_sub(self.remaining);
        let period_changed =
            period != self.period || timezone_offset_minutes != self.timezone_offset_minutes;
        self.limit = limit;
        self.period = period;
        self.timezone_offset_minutes = timezone_offset_minutes;
        if period_changed {
            self.period_start = period_start(period, timezone_offset_minutes, now);
        }
        self.remaining = limit.saturating_sub(used);
    }

    /// Phrase for the lock screen, e.g. `3 of 5 left today`.
    pub fn describe(&self, now: DateTime<Utc>) -> String {
        let scope = match self.period {
            QuotaPeriod::Daily => "today",
            QuotaPeriod::Weekly => "this week",
        };
        format!("{} of {} left {scope}", self.available(now), self.limit)
    }
}

/// Local midnight (or Monday midnight for weekly) at or before `now`, as UTC.
fn period_start(period: QuotaPeriod, offset_minutes: i32, now: DateTime<Utc>) -> DateTime<Utc> {
    let offset = Duration::minutes(offset_minutes as i64);
    let local_date = (now + offset).date_naive();
    let first_day = match period {
        QuotaPeriod::Daily => local_date,
        QuotaPeriod::Weekly => {
            local_date - Duration::days(local_date.weekday().num_days_from_monday() as i64)
        }
    };
    first_day.and_time(NaiveTime::MIN).and_utc() - offset
}
