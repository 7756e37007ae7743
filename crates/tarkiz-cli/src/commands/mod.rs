pub mod apps;
pub mod config;
pub mod location;
pub mod methods;
pub mod session;
pub mod stats;
pub mod times;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tarkiz_core::prayer::{compute_schedule, PrayerSchedule};
use tarkiz_core::storage::Database;
use tarkiz_core::{Blocklist, Config, MethodRegistry, SessionMachine};

pub type CmdResult = Result<(), Box<dyn std::error::Error>>;
type BoxResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Calendar day at the configured location.
pub fn local_today(config: &Config, now: DateTime<Utc>) -> NaiveDate {
    (now + Duration::minutes(config.location.timezone_offset_minutes as i64)).date_naive()
}

pub fn schedule_for(config: &Config, date: NaiveDate) -> BoxResult<PrayerSchedule> {
    let registry = MethodRegistry::new();
    let method = config.method(&registry)?;
    let schedule = compute_schedule(date, &config.coordinate()?, &method, config.adjustments())?;
    Ok(schedule)
}

/// Saved machine with current settings applied, or a fresh one.
/// Today's schedule, or yesterday's while one of its windows runs past midnight.
pub fn governing_schedule(
    config: &Config,
    machine: &SessionMachine,
    now: DateTime<Utc>,
) -> BoxResult<PrayerSchedule> {
    let today = local_today(config, now);
    let current = schedule_for(config, today)?;
    let Some(yesterday) = today.pred_opt() else {
        return Ok(current);
    };
    let previous = schedule_for(config, yesterday)?;
    Ok(machine.governing_schedule(now, &current, &previous).clone())
}

pub fn load_machine(
    db: &Database,
    config: &Config,
    now: DateTime<Utc>,
) -> BoxResult<SessionMachine> {
    let mut machine = match db.load_session() {
        Ok(Some(machine)) => machine,
        Ok(None) => SessionMachine::new(config.mode()?, config.quota(now), now),
        Err(e) => {
            tracing::warn!(error = %e, "saved session unreadable; starting fresh");
            SessionMachine::new(config.mode()?, config.quota(now), now)
        }
    };
    machine.set_mode(config.mode()?);
    machine.set_strict_mode(config.session.strict_mode);
    machine.reconfigure_quota(
        config.session.emergency_unlocks,
        config.session.quota_period,
        config.location.timezone_offset_minutes,
        now,
    );
    Ok(machine)
}

pub fn load_blocklist(db: &Database) -> Blocklist {
    match db.load_blocklist() {
        Ok(Some(list)) => list,
        Ok(None) => Blocklist::default(),
        Err(e) => {
            tracing::warn!(error = %e, "saved blocklist unreadable; using defaults");
            Blocklist::default()
        }
    }
}
