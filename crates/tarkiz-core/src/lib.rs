//! # Tarkiz Core Library
//!
//! Core logic for Tarkiz, a prayer-time focus app: it computes the daily
//! prayer schedule and locks distracting apps for a window after each prayer.
//! Everything is available through the standalone `tarkiz` CLI; a mobile or
//! desktop shell is a thin layer over the same library.
//!
//! ## Architecture
//!
//! - **Prayer engine**: a pure function of (date, location, method,
//!   adjustments) returning six ordered instants
//! - **Method registry**: the five built-in calculation conventions plus
//!   derived custom methods
//! - **Session machine**: a wall-clock-driven Locked/Unlocked state machine
//!   that the caller evaluates periodically
//! - **Blocklist**: which apps the user wants blocked while locked
//! - **Storage**: SQLite for state and history, TOML for configuration, the
//!   OS keyring for unlock credentials
//!
//! ## Key Components
//!
//! - [`compute_schedule`]: prayer schedule computation
//! - [`SessionMachine`]: session state machine
//! - [`Blocklist`]: blocked app list
//! - [`Database`]: state and event persistence
//! - [`Config`]: application configuration management

pub mod blocklist;
pub mod credentials;
pub mod error;
pub mod events;
pub mod prayer;
pub mod session;
pub mod stats;
pub mod storage;

pub use blocklist::{BlockedApp, Blocklist};
pub use credentials::{CredentialStore, KeyringStore, MemoryStore};
pub use error::{ConfigError, CoreError, CredentialError, DatabaseError, Result};
pub use events::{EventSink, NullSink, SessionEvent, UnlockMethod, UnlockReason};
pub use prayer::{
    compute_schedule, CalculationMethod, GeoCoordinate, MethodRegistry, PrayerName, PrayerSchedule,
    TimeAdjustments,
};
pub use session::{PrayerMode, PrayerWindow, SessionMachine, SessionState, SessionStatus};
pub use storage::{Config, Database};
