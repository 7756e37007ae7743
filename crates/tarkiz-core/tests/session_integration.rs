//! End-to-end session scenarios: schedule, state machine, persistence,
//! blocklist enforcement and stats.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tarkiz_core::credentials::{set_passcode, MemoryStore};
use tarkiz_core::prayer::{compute_schedule_unadjusted, find_city, MethodRegistry, PrayerSchedule};
use tarkiz_core::session::{EmergencyQuota, PasscodeVerifier, QuotaPeriod, UnlockGate};
use tarkiz_core::stats::day_summary;
use tarkiz_core::{
    Blocklist, CoreError, Database, PrayerMode, PrayerName, SessionEvent, SessionMachine,
    UnlockReason,
};
use tokio_util::sync::CancellationToken;

fn istanbul_schedule() -> PrayerSchedule {
    let registry = MethodRegistry::new();
    let city = find_city("Istanbul").unwrap();
    compute_schedule_unadjusted(
        NaiveDate::from_ymd_opt(2024, 2, 12).unwrap(),
        &city.coordinate(),
        registry.get("mwl").unwrap(),
    )
    .unwrap()
}

fn machine(limit: u32, now: DateTime<Utc>) -> SessionMachine {
    SessionMachine::new(
        PrayerMode::find("salah").unwrap(),
        EmergencyQuota::new(limit, QuotaPeriod::Daily, 180, now),
        now,
    )
}

#[test]
fn test_full_day_locks_once_per_prayer() {
    let schedule = istanbul_schedule();
    let start = schedule.get(PrayerName::Fajr) - Duration::hours(1);
    let mut m = machine(5, start);
    let mut db = Database::open_memory().unwrap();

    let mut now = start;
    let end = schedule.get(PrayerName::Isha) + Duration::hours(1);
    while now < end {
        m.evaluate(now, &schedule, &mut db).unwrap();
        now += Duration::minutes(1);
    }

    let events = db.events().unwrap();
    let locks: Vec<PrayerName> = events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Locked { prayer, .. } => Some(*prayer),
            _ => None,
        })
        .collect();
    assert_eq!(locks, PrayerName::PRAYERS.to_vec());
    assert!(events.iter().all(|e| match e {
        SessionEvent::Unlocked { reason, .. } => *reason == UnlockReason::WindowEnded,
        _ => true,
    }));
    assert!(!m.is_locked());

    let summary = day_summary(&events, 180, schedule.date(), end);
    let expected: i64 = m.mode().windows(&schedule).iter().map(|w| w.minutes()).sum();
    assert_eq!(summary.protected_minutes, expected);
    assert_eq!(summary.sessions, 5);
}

#[test]
fn test_emergency_quota_of_one() {
    let schedule = istanbul_schedule();
    let dhuhr = schedule.get(PrayerName::Dhuhr);
    let asr = schedule.get(PrayerName::Asr);
    let mut m = machine(1, dhuhr);
    let mut events: Vec<SessionEvent> = Vec::new();

    m.evaluate(dhuhr, &schedule, &mut events).unwrap();
    m.emergency_unlock(dhuhr + Duration::minutes(3), &mut events).unwrap();
    assert!(!m.is_locked());

    m.evaluate(asr, &schedule, &mut events).unwrap();
    let err = m.emergency_unlock(asr + Duration::minutes(1), &mut events).unwrap_err();
    assert!(matches!(err, CoreError::QuotaExhausted { .. }));
    assert!(err.is_user_facing());
    assert!(m.is_locked());
    assert_eq!(events.len(), 3);
}

#[test]
fn test_blocklist_enforced_only_while_locked() {
    let schedule = istanbul_schedule();
    let maghrib = schedule.get(PrayerName::Maghrib);
    let mut m = machine(5, maghrib);
    let mut list = Blocklist::default();
    list.toggle("youtube").unwrap();

    assert!(list.enforced(m.state()).is_empty());
    assert!(!list.is_enforced("tiktok", m.state()).unwrap());

    m.evaluate(maghrib, &schedule, &mut Vec::new()).unwrap();
    let ids: Vec<&str> = list.enforced(m.state()).iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, ["tiktok", "instagram", "facebook", "youtube"]);
    assert!(list.is_enforced("youtube", m.state()).unwrap());
    assert!(!list.is_enforced("candy", m.state()).unwrap());
    assert!(list.is_enforced("myspace", m.state()).is_err());
}

#[test]
fn test_machine_survives_persistence() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tarkiz.db");
    let schedule = istanbul_schedule();
    let isha = schedule.get(PrayerName::Isha);

    {
        let mut db = Database::open_at(&path).unwrap();
        let mut m = machine(2, isha);
        m.set_strict_mode(true);
        m.evaluate(isha, &schedule, &mut db).unwrap();
        db.save_session(&m).unwrap();
    }

    let mut db = Database::open_at(&path).unwrap();
    let mut m = db.load_session().unwrap().unwrap();
    assert!(m.is_locked());
    assert!(m.strict_mode());
    assert!(m.evaluate(isha + Duration::minutes(2), &schedule, &mut db).unwrap().is_none());
    assert_eq!(db.events().unwrap().len(), 1);
}

#[tokio::test]
async fn test_passcode_unlock_flow() {
    let schedule = istanbul_schedule();
    let asr = schedule.get(PrayerName::Asr);
    let store = MemoryStore::new();
    set_passcode(&store, "7860").unwrap();

    let mut m = machine(5, asr);
    let mut events: Vec<SessionEvent> = Vec::new();
    m.evaluate(asr, &schedule, &mut events).unwrap();

    let gate = UnlockGate::new();
    let token = CancellationToken::new();
    let wrong = gate.attempt(&PasscodeVerifier::new(&store, "0000"), &token).await;
    assert!(matches!(wrong, Err(CoreError::VerificationFailed(_))));
    assert!(m.is_locked());

    let verified = gate
        .attempt(&PasscodeVerifier::new(&store, "7860"), &token)
        .await
        .unwrap();
    let event = m.unlock(&verified, asr + Duration::minutes(1), &mut events).unwrap();
    assert!(matches!(
        event,
        Some(SessionEvent::Unlocked { reason: UnlockReason::Credential { .. }, .. })
    ));
    assert_eq!(m.quota().remaining(), 5);

    // The released window stays unlocked.
    assert!(m.evaluate(asr + Duration::minutes(2), &schedule, &mut events).unwrap().is_none());
}
