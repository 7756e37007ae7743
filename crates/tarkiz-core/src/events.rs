use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::prayer::PrayerName;

/// Kind of credential that ended a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnlockMethod {
    Nfc,
    Biometric,
    Passcode,
}

impl std::fmt::Display for UnlockMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnlockMethod::Nfc => write!(f, "NFC tag"),
            UnlockMethod::Biometric => write!(f, "biometrics"),
            UnlockMethod::Passcode => write!(f, "passcode"),
        }
    }
}

/// Why a lock ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnlockReason {
    Credential { method: UnlockMethod },
    WindowEnded,
    Emergency,
    /// Logout or data clear while locked.
    Reset,
}

/// Every session transition produces an event.
/// Stats fold them into protected-time totals; storage keeps the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    Locked {
        prayer: PrayerName,
        mode: String,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    Unlocked {
        reason: UnlockReason,
        prayer: Option<PrayerName>,
        locked_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
}

impl SessionEvent {
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            SessionEvent::Locked { at, .. } | SessionEvent::Unlocked { at, .. } => *at,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::Locked { .. } => "locked",
            SessionEvent::Unlocked { .. } => "unlocked",
        }
    }
}

/// Receives transition events before the transition commits.
///
/// An `Err` aborts the transition; the machine state is left unchanged.
pub trait EventSink {
    fn record(&mut self, event: &SessionEvent) -> Result<()>;
}

impl EventSink for Vec<SessionEvent> {
    fn record(&mut self, event: &SessionEvent) -> Result<()> {
        self.push(event.clone());
        Ok(())
    }
}

/// Discards events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn record(&mut self, _event: &SessionEvent) -> Result<()> {
        Ok(())
    }
}
