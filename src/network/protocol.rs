//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Every message is a JSON object tagged by `"type"`.

use serde::{Serialize, Deserialize};

use crate::game::anticheat::{ClickClamp, PlausibilityReport};
use crate::game::catalog::{Catalog, UpgradeCategory};
use crate::game::economy::{upgrade_cost, Yields};
use crate::game::events::ActiveEvent;
use crate::game::leaderboard::PublicLeaderboardEntry;
use crate::game::progression::{Currency, ProgressionError};
use crate::game::rules::GameRules;
use crate::game::state::{Achievement, ProgressionState};
use crate::network::session::SessionError;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Resume a session, or start a new one.
    Init {
        /// Previously issued session id.
        #[serde(default)]
        session_id: Option<String>,
    },

    /// Report clicks since the last sync.
    Sync {
        /// Session id.
        session_id: String,
        /// Clicks made since the last sync.
        pending_clicks: u64,
        /// Yields the client believes it has. Checked, never trusted.
        #[serde(default)]
        declared: Option<Yields>,
    },

    /// Buy one unit of an upgrade.
    Purchase {
        /// Session id.
        session_id: String,
        /// Catalog id.
        upgrade_id: String,
    },

    /// Prestige.
    Prestige {
        /// Session id.
        session_id: String,
    },

    /// Place the session's score under `name`.
    SubmitScore {
        /// Session id.
        session_id: String,
        /// Display name.
        name: String,
    },

    /// Claim a clickable event.
    ClickEvent {
        /// Session id.
        session_id: String,
        /// Event id.
        event_id: String,
    },

    /// Wipe all progress.
    Reset {
        /// Session id.
        session_id: String,
    },

    /// Request a plausibility report.
    Validate {
        /// Session id.
        session_id: String,
    },

    /// Request the leaderboard.
    Leaderboard,

    /// Audit every stored session.
    Audit,

    /// Ping for latency measurement.
    Ping { timestamp: u64 },
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Session loaded or created.
    Session(SessionInfo),

    /// Sync applied.
    Synced(SyncInfo),

    /// Purchase applied.
    Purchased(PurchaseInfo),

    /// Prestige applied.
    Prestiged(PrestigeInfo),

    /// Score placed.
    ScoreSubmitted(ScoreInfo),

    /// Event reward credited.
    EventClaimed(EventRewardInfo),

    /// Session wiped.
    ResetDone(ResetInfo),

    /// Plausibility report.
    Validation(PlausibilityReport),

    /// Audit totals. Per-session reports stay server-side.
    Audit {
        /// Sessions examined.
        total: usize,
        /// Sessions without errors.
        valid: usize,
        /// Sessions with errors.
        invalid: usize,
    },

    /// Current leaderboard.
    Leaderboard {
        /// Ranked entries.
        entries: Vec<PublicLeaderboardEntry>,
    },

    /// Request failed.
    Error(ServerError),

    /// Pong response.
    Pong { timestamp: u64, server_time: u64 },

    /// Server is shutting down.
    Shutdown { reason: String },
}

/// Upgrade as shown to a particular session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpgradeView {
    /// Catalog id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Category.
    pub category: UpgradeCategory,
    /// Price of the next unit.
    pub cost: u64,
    /// Balance the price is paid from.
    pub currency: Currency,
    /// Units owned.
    pub owned: u32,
    /// Prestige gate met?
    pub unlocked: bool,
}

impl UpgradeView {
    /// Catalog in order, priced for `state`.
    pub fn list(state: &ProgressionState, catalog: &Catalog, rules: &GameRules) -> Vec<UpgradeView> {
        catalog
            .upgrades
            .iter()
            .map(|def| {
                let owned = state.owned(&def.id);
                UpgradeView {
                    id: def.id.clone(),
                    name: def.name.clone(),
                    description: def.description.clone(),
                    category: def.category,
                    cost: upgrade_cost(def, owned, rules),
                    currency: if def.is_prestige() { Currency::Prestige } else { Currency::Regular },
                    owned,
                    unlocked: def.is_unlocked(state.prestige_count),
                }
            })
            .collect()
    }
}

/// Session loaded or created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Session id to use from now on.
    pub session_id: String,
    /// Was the session just created?
    pub created: bool,
    /// Current state.
    pub state: ProgressionState,
    /// Priced catalog.
    pub upgrades: Vec<UpgradeView>,
    /// Achievements with unlock status.
    pub achievements: Vec<Achievement>,
    /// Live events.
    pub events: Vec<ActiveEvent>,
}

/// Sync applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncInfo {
    /// State after the sync.
    pub state: ProgressionState,
    /// Click clamping.
    pub clicks: ClickClamp,
    /// Currency from clicks.
    pub click_earnings: f64,
    /// Currency from idle production.
    pub idle_earnings: f64,
    /// Achievements unlocked by this sync.
    pub unlocked: Vec<String>,
    /// Live events.
    pub events: Vec<ActiveEvent>,
    /// Public leaderboard.
    pub leaderboard: Vec<PublicLeaderboardEntry>,
    /// Declared yields were wrong and have been replaced.
    pub yields_corrected: bool,
}

/// Purchase applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseInfo {
    /// Upgrade bought.
    pub upgrade_id: String,
    /// Price paid.
    pub cost: u64,
    /// State after the purchase.
    pub state: ProgressionState,
    /// Re-priced catalog.
    pub upgrades: Vec<UpgradeView>,
    /// Public leaderboard.
    pub leaderboard: Vec<PublicLeaderboardEntry>,
}

/// Prestige applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrestigeInfo {
    /// Prestige currency awarded.
    pub prestige_gained: u64,
    /// State after the prestige.
    pub state: ProgressionState,
    /// Re-priced catalog.
    pub upgrades: Vec<UpgradeView>,
}

/// Score placed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreInfo {
    /// Name recorded.
    pub name: String,
    /// Score offered to the leaderboard.
    pub score: u64,
    /// Was the claimed score accepted as-is?
    pub accepted: bool,
    /// Public leaderboard.
    pub leaderboard: Vec<PublicLeaderboardEntry>,
}

/// Event reward credited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRewardInfo {
    /// Currency awarded.
    pub reward: u64,
    /// State after the claim.
    pub state: ProgressionState,
}

/// Session wiped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetInfo {
    /// Fresh state.
    pub state: ProgressionState,
    /// Re-priced catalog.
    pub upgrades: Vec<UpgradeView>,
}

/// Error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Unknown or expired session; re-init.
    InvalidSession,
    /// Upgrade id not in the catalog.
    UnknownUpgrade,
    /// Prestige gate not met.
    LockedUpgrade,
    /// Not enough currency.
    InsufficientFunds,
    /// Lifetime earnings below the prestige threshold.
    ThresholdNotMet,
    /// Event unknown or expired.
    UnknownEvent,
    /// Event has no click reward.
    NotClickable,
    /// Name empty after trimming.
    EmptyName,
    /// Message could not be parsed.
    InvalidMessage,
    /// Server overloaded.
    ServerOverloaded,
    /// Internal error.
    InternalError,
}

impl From<&ProgressionError> for ErrorCode {
    fn from(err: &ProgressionError) -> Self {
        match err {
            ProgressionError::UnknownUpgrade(_) => ErrorCode::UnknownUpgrade,
            ProgressionError::LockedUpgrade { .. } => ErrorCode::LockedUpgrade,
            ProgressionError::InsufficientFunds { .. } => ErrorCode::InsufficientFunds,
            ProgressionError::ThresholdNotMet { .. } => ErrorCode::ThresholdNotMet,
            ProgressionError::UnknownEvent(_) => ErrorCode::UnknownEvent,
            ProgressionError::NotClickable(_) => ErrorCode::NotClickable,
            ProgressionError::EmptyName => ErrorCode::EmptyName,
        }
    }
}

impl From<&SessionError> for ServerError {
    fn from(err: &SessionError) -> Self {
        let code = match err {
            SessionError::InvalidSession(_) => ErrorCode::InvalidSession,
            SessionError::Progression(e) => ErrorCode::from(e),
        };
        ServerError { code, message: err.to_string() }
    }
}

impl From<SessionError> for ServerMessage {
    fn from(err: SessionError) -> Self {
        ServerMessage::Error(ServerError::from(&err))
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::game::state::SessionId;

    #[test]
    fn test_client_message_wire_shape() {
        let msg = ClientMessage::from_json(
            r#"{"type":"sync","session_id":"session-1-00","pending_clicks":12}"#,
        ).unwrap();
        match msg {
            ClientMessage::Sync { session_id, pending_clicks, declared } => {
                assert_eq!(session_id, "session-1-00");
                assert_eq!(pending_clicks, 12);
                assert!(declared.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }

        assert!(matches!(
            ClientMessage::from_json(r#"{"type":"init"}"#).unwrap(),
            ClientMessage::Init { session_id: None }
        ));
        assert!(matches!(
            ClientMessage::from_json(r#"{"type":"leaderboard"}"#).unwrap(),
            ClientMessage::Leaderboard
        ));
        assert!(ClientMessage::from_json(r#"{"type":"teleport"}"#).is_err());
    }

    #[test]
    fn test_declared_yields_parse() {
        let msg = ClientMessage::from_json(
            r#"{"type":"sync","session_id":"s","pending_clicks":0,"declared":{"per_click":3,"per_second":1.5}}"#,
        ).unwrap();
        let ClientMessage::Sync { declared, .. } = msg else { panic!("not a sync") };
        assert_eq!(declared, Some(Yields { per_click: 3, per_second: 1.5 }));
    }

    #[test]
    fn test_session_info_serializes() {
        let catalog = Catalog::standard();
        let rules = GameRules::default();
        let state = ProgressionState::new(SessionId::generate(Utc::now()), Utc::now(), &catalog);

        let msg = ServerMessage::Session(SessionInfo {
            session_id: state.session_id.to_string(),
            created: true,
            upgrades: UpgradeView::list(&state, &catalog, &rules),
            achievements: state.achievements.clone(),
            events: Vec::new(),
            state,
        });
        let json = msg.to_json().unwrap();
        assert!(json.contains(r#""type":"session""#));

        let parsed = ServerMessage::from_json(&json).unwrap();
        let ServerMessage::Session(info) = parsed else { panic!("not a session") };
        assert_eq!(info.upgrades.len(), catalog.upgrades.len());
    }

    #[test]
    fn test_upgrade_view_prices_and_gates() {
        let catalog = Catalog::standard();
        let rules = GameRules::default();
        let mut state = ProgressionState::new(SessionId::from("s"), Utc::now(), &catalog);
        state.upgrades.get_mut("click_1").unwrap().owned = 1;

        let views = UpgradeView::list(&state, &catalog, &rules);
        let fingers = views.iter().find(|v| v.id == "click_1").unwrap();
        assert_eq!(fingers.cost, 11);
        assert_eq!(fingers.owned, 1);
        assert!(fingers.unlocked);

        let blessing = views.iter().find(|v| v.id == "prestige_1").unwrap();
        assert!(!blessing.unlocked);
        assert_eq!(blessing.currency, Currency::Prestige);
    }

    #[test]
    fn test_error_codes() {
        let err = SessionError::Progression(ProgressionError::InsufficientFunds {
            cost: 10,
            balance: 5.0,
            currency: Currency::Regular,
        });
        let json = ServerMessage::from(err).to_json().unwrap();
        assert!(json.contains("insufficient_funds"));

        let err = ServerError::from(&SessionError::InvalidSession("x".into()));
        assert_eq!(err.code, ErrorCode::InvalidSession);
    }
}
