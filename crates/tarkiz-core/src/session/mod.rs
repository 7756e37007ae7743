//! Session state machine.
//!
//! Wall-clock driven, like a timer with no thread of its own: the caller
//! invokes [`SessionMachine::evaluate`] periodically (and on wake) with the
//! current time and today's schedule.
//!
//! ## State Transitions
//!
//! ```text
//! Unlocked --(blocking window opens)--> Locked
//! Locked --(credential | emergency | window end | reset)--> Unlocked
//! ```
//!
//! Every transition is handed to an [`EventSink`] before it commits. If the
//! sink fails the machine is left exactly as it was, quota included.

pub mod mode;
pub mod quota;
pub mod unlock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::events::{EventSink, SessionEvent, UnlockReason};
use crate::prayer::{PrayerName, PrayerSchedule};

pub use mode::PrayerMode;
pub use quota::{EmergencyQuota, QuotaPeriod, DEFAULT_EMERGENCY_UNLOCKS};
pub use unlock::{
    NfcTagVerifier, PasscodeVerifier, TagReader, UnlockGate, UnlockVerifier, VerifiedUnlock,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Unlocked,
    Locked,
}

/// Half-open interval `[start, end)` during which a prayer blocks apps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrayerWindow {
    pub prayer: PrayerName,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl PrayerWindow {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }

    pub fn minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub status: SessionStatus,
    /// Set exactly when `status` is `Locked`.
    pub active_window: Option<PrayerWindow>,
    pub last_transition_at: DateTime<Utc>,
}

impl SessionState {
    fn unlocked(at: DateTime<Utc>) -> Self {
        Self {
            status: SessionStatus::Unlocked,
            active_window: None,
            last_transition_at: at,
        }
    }

    fn locked(window: PrayerWindow, at: DateTime<Utc>) -> Self {
        Self {
            status: SessionStatus::Locked,
            active_window: Some(window),
            last_transition_at: at,
        }
    }
}

/// Single owner of session status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMachine {
    state: SessionState,
    mode: PrayerMode,
    quota: EmergencyQuota,
    #[serde(default)]
    strict_mode: bool,
    /// Window the user unlocked early; it does not lock again.
    #[serde(default)]
    released: Option<PrayerWindow>,
    /// Credential attempt applied during the current lock, so a shared
    /// outcome applies once.
    #[serde(default)]
    last_attempt_id: Option<u64>,
}

impl SessionMachine {
    pub fn new(mode: PrayerMode, quota: EmergencyQuota, now: DateTime<Utc>) -> Self {
        Self {
            state: SessionState::unlocked(now),
            mode,
            quota,
            strict_mode: false,
            released: None,
            last_attempt_id: None,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn status(&self) -> SessionStatus {
        self.state.status
    }

    pub fn is_locked(&self) -> bool {
        self.state.status == SessionStatus::Locked
    }

    pub fn mode(&self) -> &PrayerMode {
        &self.mode
    }

    pub fn quota(&self) -> &EmergencyQuota {
        &self.quota
    }

    pub fn strict_mode(&self) -> bool {
        self.strict_mode
    }

    /// The blocking window containing `now`, if any. Pure.
    pub fn blocking_window_at(
        &self,
        now: DateTime<Utc>,
        schedule: &PrayerSchedule,
    ) -> Option<PrayerWindow> {
        self.mode.window_at(schedule, now)
    }

    /// The schedule to evaluate against at `now`: the previous local day's
    /// when one of its windows runs past midnight, today's otherwise.
    pub fn governing_schedule<'a>(
        &self,
        now: DateTime<Utc>,
        today: &'a PrayerSchedule,
        previous: &'a PrayerSchedule,
    ) -> &'a PrayerSchedule {
        if self.blocking_window_at(now, today).is_none()
            && self.blocking_window_at(now, previous).is_some()
        {
            previous
        } else {
            today
        }
    }

    // ── Settings ─────────────────────────────────────────────────────

    /// Takes effect from the next evaluation; an active lock keeps its window.
    pub fn set_mode(&mut self, mode: PrayerMode) {
        self.mode = mode;
    }

    pub fn set_strict_mode(&mut self, strict: bool) {
        self.strict_mode = strict;
    }

    pub fn reconfigure_quota(
        &mut self,
        limit: u32,
        period: QuotaPeriod,
        timezone_offset_minutes: i32,
        now: DateTime<Utc>,
    ) {
        self.quota.reconfigure(limit, period, timezone_offset_minutes, now);
    }

    // ── Transitions ──────────────────────────────────────────────────

    /// Lock when a blocking window opens, unlock when the active one ends.
    ///
    /// Returns the event for the transition taken, or `None`. Repeated calls
    /// inside the same window lock at most once.
    pub fn evaluate<S: EventSink + ?Sized>(
        &mut self,
        now: DateTime<Utc>,
        schedule: &PrayerSchedule,
        sink: &mut S,
    ) -> Result<Option<SessionEvent>> {
        match (self.state.status, self.state.active_window) {
            (SessionStatus::Locked, Some(window)) => {
                if now < window.end {
                    return Ok(None);
                }
                // A late poll still closes the window at its scheduled end.
                self.release(UnlockReason::WindowEnded, window, window.end, sink)
                    .map(Some)
            }
            (SessionStatus::Locked, None) => {
                tracing::warn!("locked without an active window; unlocking");
                let event = SessionEvent::Unlocked {
                    reason: UnlockReason::WindowEnded,
                    prayer: None,
                    locked_at: self.state.last_transition_at,
                    at: now,
                };
                sink.record(&event)?;
                self.state = SessionState::unlocked(now);
                Ok(Some(event))
            }
            (SessionStatus::Unlocked, _) => {
                let Some(window) = self.blocking_window_at(now, schedule) else {
                    return Ok(None);
                };
                if self.released == Some(window) {
                    return Ok(None);
                }
                let event = SessionEvent::Locked {
                    prayer: window.prayer,
                    mode: self.mode.id.clone(),
                    window_start: window.start,
                    window_end: window.end,
                    at: now,
                };
                sink.record(&event)?;
                self.state = SessionState::locked(window, now);
                self.released = None;
                self.last_attempt_id = None;
                tracing::info!(prayer = %window.prayer, until = %window.end, "session locked");
                Ok(Some(event))
            }
        }
    }

    /// Apply a verified credential. Idempotent per attempt id; a no-op when
    /// already unlocked.
    pub fn unlock<S: EventSink + ?Sized>(
        &mut self,
        verified: &VerifiedUnlock,
        now: DateTime<Utc>,
        sink: &mut S,
    ) -> Result<Option<SessionEvent>> {
        if self.last_attempt_id == Some(verified.attempt_id) {
            return Ok(None);
        }
        let Some(window) = self.locked_window() else {
            return Ok(None);
        };
        let event = self.release(
            UnlockReason::Credential {
                method: verified.method,
            },
            window,
            now,
            sink,
        )?;
        self.released = Some(window);
        self.last_attempt_id = Some(verified.attempt_id);
        Ok(Some(event))
    }

    /// Unlock without a credential, spending one unit of quota.
    ///
    /// # Errors
    ///
    /// `QuotaExhausted` when the allowance is spent, or always in strict
    /// mode. Nothing changes on error.
    pub fn emergency_unlock<S: EventSink + ?Sized>(
        &mut self,
        now: DateTime<Utc>,
        sink: &mut S,
    ) -> Result<Option<SessionEvent>> {
        let Some(window) = self.locked_window() else {
            return Ok(None);
        };
        if self.strict_mode {
            return Err(CoreError::QuotaExhausted {
                limit: 0,
                resets_at: window.end,
            });
        }
        let mut quota = self.quota.clone();
        quota.consume(now)?;
        let event = self.release(UnlockReason::Emergency, window, now, sink)?;
        self.quota = quota;
        self.released = Some(window);
        tracing::info!(remaining = self.quota.remaining(), "emergency unlock used");
        Ok(Some(event))
    }

    /// Drop back to a fresh unlocked state (logout or data clear).
    pub fn reset<S: EventSink + ?Sized>(
        &mut self,
        now: DateTime<Utc>,
        sink: &mut S,
    ) -> Result<Option<SessionEvent>> {
        let event = match self.locked_window() {
            Some(window) => Some(self.release(UnlockReason::Reset, window, now, sink)?),
            None => None,
        };
        self.state = SessionState::unlocked(now);
        self.released = None;
        self.last_attempt_id = None;
        Ok(event)
    }

    fn locked_window(&self) -> Option<PrayerWindow> {
        match self.state.status {
            SessionStatus::Locked => self.state.active_window,
            SessionStatus::Unlocked => None,
        }
    }

    fn release<S: EventSink + ?Sized>(
        &mut self,
        reason: UnlockReason,
        window: PrayerWindow,
        now: DateTime<Utc>,
        sink: &mut S,
    ) -> Result<SessionEvent> {
        let event = SessionEvent::Unlocked {
            reason,
            prayer: Some(window.prayer),
            locked_at: self.state.last_transition_at,
            at: now,
        };
        sink.record(&event)?;
        self.state = SessionState::unlocked(now);
        tracing::info!(prayer = %window.prayer, ?reason, "session unlocked");
        Ok(event)
    }
}
