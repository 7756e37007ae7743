//! Apps the user wants blocked during prayer windows.
//!
//! The blocklist only records intent. Whether an app is blocked *right now*
//! depends on the session: see [`Blocklist::enforced`].

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::session::{SessionState, SessionStatus};

/// Category filter value that matches every app.
pub const ALL_CATEGORIES: &str = "All";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedApp {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub icon: String,
    pub category: String,
    pub blocked: bool,
    /// Typical daily screen time, as shown during onboarding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_average: Option<String>,
}

impl BlockedApp {
    fn new(id: &str, display_name: &str, icon: &str, category: &str, blocked: bool) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            icon: icon.into(),
            category: category.into(),
            blocked,
            daily_average: None,
        }
    }

    fn with_average(mut self, average: &str) -> Self {
        self.daily_average = Some(average.into());
        self
    }
}

/// Ordered app list; order is insertion order and never changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blocklist {
    apps: Vec<BlockedApp>,
}

impl Default for Blocklist {
    fn default() -> Self {
        Self {
            apps: vec![
                BlockedApp::new("tiktok", "TikTok", "🎵", "Social", true).with_average("1h 32m"),
                BlockedApp::new("instagram", "Instagram", "📷", "Social", true)
                    .with_average("1h 53m"),
                BlockedApp::new("facebook", "Facebook", "👤", "Social", true)
                    .with_average("0h 31m"),
                BlockedApp::new("twitter", "X (Twitter)", "🐦", "Social", false)
                    .with_average("0h 45m"),
                BlockedApp::new("youtube", "YouTube", "▶️", "Entertainment", false)
                    .with_average("2h 10m"),
                BlockedApp::new("netflix", "Netflix", "🎬", "Entertainment", false),
                BlockedApp::new("reddit", "Reddit", "🔴", "Social", false),
                BlockedApp::new("candy", "Candy Crush", "🍬", "Games", false),
            ],
        }
    }
}

impl Blocklist {
    /// Build from an explicit list. Ids must be unique.
    pub fn from_apps(apps: Vec<BlockedApp>) -> Result<Self> {
        for (i, app) in apps.iter().enumerate() {
            if app.id.trim().is_empty() {
                return Err(CoreError::invalid("app.id", "must not be empty"));
            }
            if apps[..i].iter().any(|a| a.id == app.id) {
                return Err(CoreError::invalid("app.id", format!("duplicate id '{}'", app.id)));
            }
        }
        Ok(Self { apps })
    }

    pub fn apps(&self) -> &[BlockedApp] {
        &self.apps
    }

    pub fn get(&self, app_id: &str) -> Result<&BlockedApp> {
        self.apps
            .iter()
            .find(|a| a.id == app_id)
            .ok_or_else(|| CoreError::not_found("app", app_id))
    }

    /// Flip one app; returns the new flag.
    pub fn toggle(&mut self, app_id: &str) -> Result<bool> {
        let app = self
            .apps
            .iter_mut()
            .find(|a| a.id == app_id)
            .ok_or_else(|| CoreError::not_found("app", app_id))?;
        app.blocked = !app.blocked;
        tracing::debug!(app = %app.id, blocked = app.blocked, "toggled app");
        Ok(app.blocked)
    }

    pub fn set_all(&mut self, blocked: bool) {
        for app in &mut self.apps {
            app.blocked = blocked;
        }
        tracing::debug!(blocked, count = self.apps.len(), "updated all apps");
    }

    /// Apps in exactly `category` (or any, for [`ALL_CATEGORIES`]) whose
    /// display name contains `search`, ignoring case. Insertion order is kept.
    pub fn filter(&self, category: &str, search: &str) -> Vec<&BlockedApp> {
        let needle = search.to_lowercase();
        self.apps
            .iter()
            .filter(|a| category == ALL_CATEGORIES || a.category == category)
            .filter(|a| needle.is_empty() || a.display_name.to_lowercase().contains(&needle))
            .collect()
    }

    /// `"All"` followed by the distinct categories, sorted.
    pub fn categories(&self) -> Vec<String> {
        let mut unique: Vec<String> = self.apps.iter().map(|a| a.category.clone()).collect();
        unique.sort();
        unique.dedup();
        std::iter::once(ALL_CATEGORIES.to_string()).chain(unique).collect()
    }

    pub fn blocked_count(&self) -> usize {
        self.apps.iter().filter(|a| a.blocked).count()
    }

    /// Apps that must be blocked given the session state.
    pub fn enforced(&self, state: &SessionState) -> Vec<&BlockedApp> {
        match state.status {
            SessionStatus::Locked => self.apps.iter().filter(|a| a.blocked).collect(),
            SessionStatus::Unlocked => Vec::new(),
        }
    }

    pub fn is_enforced(&self, app_id: &str, state: &SessionState) -> Result<bool> {
        let app = self.get(app_id)?;
        Ok(app.blocked && state.status == SessionStatus::Locked)
    }
}
