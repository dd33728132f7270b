//! Progression State Definitions
//!
//! The per-session mutable entity and its parts.
//! Uses BTreeMap so serialized snapshots are stable.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Serialize, Deserialize};

use crate::game::catalog::{
    AchievementDefinition, AchievementMetric, AchievementRequirement, AchievementReward, Catalog,
};

// =============================================================================
// SESSION ID
// =============================================================================

/// Session identifier of the form `session-{unix_seconds}-{16 hex}`.
///
/// The creation second is embedded so the lifetime bound can be measured
/// from the start of the session.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh identifier for a session created at `now`.
    pub fn generate(now: DateTime<Utc>) -> Self {
        let random = uuid::Uuid::new_v4();
        Self(format!("session-{}-{}", now.timestamp(), hex::encode(&random.as_bytes()[..8])))
    }

    /// Creation time parsed from the identifier, if well-formed.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        let mut parts = self.0.splitn(3, '-');
        if parts.next()? != "session" {
            return None;
        }
        let secs: i64 = parts.next()?.parse().ok()?;
        parts.next()?;
        Utc.timestamp_opt(secs, 0).single()
    }

    /// Borrow as str.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// OWNED UPGRADES & ACHIEVEMENTS
// =============================================================================

/// Owned count of one catalog upgrade.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnedUpgrade {
    /// Catalog id.
    pub id: String,
    /// Units owned.
    pub owned: u32,
}

/// A session's copy of an achievement. Once unlocked, never re-locked.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Achievement {
    /// Catalog id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Player-facing description.
    pub description: String,
    /// Unlock predicate.
    pub requirement: AchievementRequirement,
    /// Reward.
    pub reward: AchievementReward,
    /// Unlocked flag.
    pub unlocked: bool,
    /// When it unlocked.
    pub unlocked_at: Option<DateTime<Utc>>,
}

impl Achievement {
    /// Locked copy of a definition.
    pub fn locked(def: &AchievementDefinition) -> Self {
        Self {
            id: def.id.clone(),
            name: def.name.clone(),
            description: def.description.clone(),
            requirement: def.requirement,
            reward: def.reward,
            unlocked: false,
            unlocked_at: None,
        }
    }

    /// Additive multiplier bonus, zero while locked.
    pub fn multiplier_bonus(&self) -> f64 {
        if !self.unlocked {
            return 0.0;
        }
        match self.reward {
            AchievementReward::Multiplier(value) => value,
        }
    }
}

/// Non-economic cosmetic selection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cosmetics {
    /// Equipped skin.
    pub selected_skin: String,
    /// Unlocked skins.
    pub owned_skins: Vec<String>,
}

impl Default for Cosmetics {
    fn default() -> Self {
        Self {
            selected_skin: "default".to_string(),
            owned_skins: vec!["default".to_string()],
        }
    }
}

// =============================================================================
// PROGRESSION STATE
// =============================================================================

/// Full progression of one session.
///
/// `per_click` and `per_second` are a cache of values derived from the
/// owned upgrades and multiplier state; they are recomputed after every
/// transition and never taken from a client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressionState {
    /// Session identifier.
    pub session_id: SessionId,
    /// When the session was created.
    pub created_at: DateTime<Utc>,

    /// Spendable currency.
    pub currency: f64,
    /// Currency earned since the last prestige. Gates prestige.
    pub lifetime_earned: f64,
    /// Clicks since the last prestige.
    pub total_clicks: u64,
    /// Currency earned over the whole session, never decreases.
    pub all_time_earned: f64,
    /// Clicks over the whole session, never decreases.
    pub all_time_clicks: u64,

    /// Cached per-click yield.
    pub per_click: u64,
    /// Cached per-second yield.
    pub per_second: f64,

    /// Last accepted sync.
    pub last_sync: DateTime<Utc>,
    /// Last event roll.
    pub last_event_check: DateTime<Utc>,

    /// Prestige currency balance.
    pub prestige_currency: u64,
    /// Number of prestiges performed.
    pub prestige_count: u32,

    /// Owned upgrades keyed by catalog id.
    pub upgrades: BTreeMap<String, OwnedUpgrade>,
    /// Achievements in catalog order.
    pub achievements: Vec<Achievement>,

    /// Leaderboard display name (empty until a score is submitted).
    pub player_name: String,
    /// Cosmetic selection.
    pub cosmetics: Cosmetics,
}

impl ProgressionState {
    /// Zero-valued state for a new session.
    pub fn new(session_id: SessionId, now: DateTime<Utc>, catalog: &Catalog) -> Self {
        let created_at = session_id.created_at().unwrap_or(now);
        Self {
            session_id,
            created_at,
            currency: 0.0,
            lifetime_earned: 0.0,
            total_clicks: 0,
            all_time_earned: 0.0,
            all_time_clicks: 0,
            per_click: 1,
            per_second: 0.0,
            last_sync: now,
            last_event_check: now,
            prestige_currency: 0,
            prestige_count: 0,
            upgrades: default_upgrades(catalog),
            achievements: catalog.achievements.iter().map(Achievement::locked).collect(),
            player_name: String::new(),
            cosmetics: Cosmetics::default(),
        }
    }

    /// Owned count of an upgrade (zero if never bought).
    pub fn owned(&self, upgrade_id: &str) -> u32 {
        self.upgrades.get(upgrade_id).map(|u| u.owned).unwrap_or(0)
    }

    /// Value of an achievement metric.
    pub fn metric(&self, metric: AchievementMetric) -> f64 {
        match metric {
            AchievementMetric::Clicks => self.all_time_clicks as f64,
            AchievementMetric::CurrencyEarned => self.all_time_earned,
            AchievementMetric::PrestigeCount => self.prestige_count as f64,
        }
    }

    /// Credit earned currency to every running total.
    pub fn credit(&mut self, amount: f64) {
        if amount <= 0.0 {
            return;
        }
        self.currency += amount;
        self.lifetime_earned += amount;
        self.all_time_earned += amount;
    }

    /// Seconds since creation, clamped at zero.
    pub fn age_secs(&self, now: DateTime<Utc>) -> f64 {
        seconds_between(self.created_at, now)
    }
}

/// Zero-owned entries for every catalog upgrade.
pub fn default_upgrades(catalog: &Catalog) -> BTreeMap<String, OwnedUpgrade> {
    catalog
        .upgrades
        .iter()
        .map(|def| (def.id.clone(), OwnedUpgrade { id: def.id.clone(), owned: 0 }))
        .collect()
}

/// Elapsed seconds from `from` to `to` at millisecond precision, never negative.
pub fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    ((to - from).num_milliseconds() as f64 / 1000.0).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_session_id_roundtrip_time() {
        let now = Utc.timestamp_opt(1_762_424_258, 0).unwrap();
        let id = SessionId::generate(now);

        assert!(id.as_str().starts_with("session-1762424258-"));
        assert_eq!(id.as_str().len(), "session-1762424258-".len() + 16);
        assert_eq!(id.created_at(), Some(now));
    }

    #[test]
    fn test_session_id_malformed() {
        assert_eq!(SessionId::from("garbage").created_at(), None);
        assert_eq!(SessionId::from("session-abc-00").created_at(), None);
        assert_eq!(SessionId::from("other-100-00").created_at(), None);
        assert_eq!(SessionId::from("session-100").created_at(), None);
    }

    #[test]
    fn test_generated_ids_differ() {
        let now = Utc::now();
        assert_ne!(SessionId::generate(now), SessionId::generate(now));
    }

    #[test]
    fn test_new_state_is_zeroed() {
        let catalog = Catalog::standard();
        let now = Utc::now();
        let state = ProgressionState::new(SessionId::generate(now), now, &catalog);

        assert_eq!(state.currency, 0.0);
        assert_eq!(state.total_clicks, 0);
        assert_eq!(state.per_click, 1);
        assert_eq!(state.upgrades.len(), catalog.upgrades.len());
        assert!(state.upgrades.values().all(|u| u.owned == 0));
        assert!(state.achievements.iter().all(|a| !a.unlocked));
        assert_eq!(state.cosmetics.selected_skin, "default");
    }

    #[test]
    fn test_credit_updates_all_totals() {
        let catalog = Catalog::standard();
        let now = Utc::now();
        let mut state = ProgressionState::new(SessionId::from("s"), now, &catalog);

        state.credit(12.5);
        state.credit(-3.0);

        assert_eq!(state.currency, 12.5);
        assert_eq!(state.lifetime_earned, 12.5);
        assert_eq!(state.all_time_earned, 12.5);
    }

    #[test]
    fn test_seconds_between_never_negative() {
        let now = Utc::now();
        assert_eq!(seconds_between(now, now - Duration::seconds(5)), 0.0);
        assert_eq!(seconds_between(now, now + Duration::milliseconds(1500)), 1.5);
    }
}
