//! Session Management
//!
//! Orchestrates every player-facing operation: load the session, run the
//! pure transition, apply side effects (events, leaderboard) and write back.
//!
//! Locking:
//! - one `Mutex` per session, so requests on the same session serialize
//!   while different sessions proceed in parallel;
//! - the leaderboard and the event registry each have their own lock;
//! - order is always session first, then leaderboard or events.
//!
//! Loaded sessions are a cache over the store. Handles idle for longer than
//! a TTL are dropped by [`SessionManager::evict_idle`] and reloaded on the
//! next request.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn};

use crate::core::rng::DeterministicRng;
use crate::game::anticheat::{
    assess_lifetime, check_yields, validate_score, AuditSummary, PlausibilityReport, ScoreVerdict, YieldMismatch,
};
use crate::game::catalog::Catalog;
use crate::game::economy::{compute_yields, Yields};
use crate::game::events::{ActiveEvent, EventRegistry};
use crate::game::leaderboard::{Leaderboard, LeaderboardEntry, PublicLeaderboardEntry};
use crate::game::progression::{
    self, PrestigeOutcome, ProgressionError, PurchaseOutcome, SyncOutcome,
};
use crate::game::rules::GameRules;
use crate::game::state::{ProgressionState, SessionId};
use crate::network::store::{SessionRecord, SessionStore, StoreError};

/// Session errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    /// Unknown or expired session id. The client should re-init.
    #[error("Invalid session: {0}")]
    InvalidSession(String),

    /// Transition rejected.
    #[error(transparent)]
    Progression(#[from] ProgressionError),
}

/// Result of `create_or_load`.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    /// Current state.
    pub state: ProgressionState,
    /// Live events.
    pub events: Vec<ActiveEvent>,
    /// Was a new session created?
    pub created: bool,
}

/// Result of a sync.
#[derive(Debug, Clone)]
pub struct SyncResult {
    /// State after the sync.
    pub state: ProgressionState,
    /// Sync details.
    pub outcome: SyncOutcome,
    /// Live events, including one spawned by this sync.
    pub events: Vec<ActiveEvent>,
    /// Public leaderboard.
    pub leaderboard: Vec<PublicLeaderboardEntry>,
    /// Client-declared yields that disagreed with the server.
    pub corruption: Option<YieldMismatch>,
}

/// Result of a purchase.
#[derive(Debug, Clone)]
pub struct PurchaseResult {
    /// State after the purchase.
    pub state: ProgressionState,
    /// Purchase details.
    pub outcome: PurchaseOutcome,
    /// Public leaderboard.
    pub leaderboard: Vec<PublicLeaderboardEntry>,
}

/// Result of a prestige.
#[derive(Debug, Clone)]
pub struct PrestigeResult {
    /// State after the prestige.
    pub state: ProgressionState,
    /// Prestige details.
    pub outcome: PrestigeOutcome,
}

/// Result of a score submission.
#[derive(Debug, Clone)]
pub struct ScoreResult {
    /// Name recorded.
    pub name: String,
    /// Validation verdict.
    pub verdict: ScoreVerdict,
    /// Public leaderboard.
    pub leaderboard: Vec<PublicLeaderboardEntry>,
}

/// Result of claiming a clickable event.
#[derive(Debug, Clone)]
pub struct ClaimResult {
    /// Currency awarded.
    pub reward: u64,
    /// State after the claim.
    pub state: ProgressionState,
}

type SessionHandle = Arc<Mutex<SessionRecord>>;

/// A session held in memory.
struct LoadedSession {
    record: SessionHandle,
    /// Unix millis of the latest request.
    last_access_ms: AtomicI64,
}

impl LoadedSession {
    fn new(record: SessionRecord, now: DateTime<Utc>) -> Self {
        Self {
            record: Arc::new(Mutex::new(record)),
            last_access_ms: AtomicI64::new(now.timestamp_millis()),
        }
    }

    fn touch(&self, now: DateTime<Utc>) {
        self.last_access_ms.fetch_max(now.timestamp_millis(), Ordering::AcqRel);
    }

    fn idle_since(&self, cutoff: DateTime<Utc>) -> bool {
        self.last_access_ms.load(Ordering::Acquire) < cutoff.timestamp_millis()
    }
}

// =============================================================================
// SESSION MANAGER
// =============================================================================

/// Manages all sessions.
pub struct SessionManager {
    catalog: Arc<Catalog>,
    rules: GameRules,
    store: Arc<dyn SessionStore>,
    /// Loaded sessions.
    sessions: RwLock<BTreeMap<SessionId, LoadedSession>>,
    leaderboard: RwLock<Leaderboard>,
    events: Mutex<EventRegistry>,
    /// Mixed into event roll seeds so rolls can't be predicted from the id.
    event_salt: [u8; 16],
}

impl SessionManager {
    /// Create a manager over `store`, rebuilding the leaderboard from it.
    pub fn new(store: Arc<dyn SessionStore>, catalog: Arc<Catalog>, rules: GameRules) -> Self {
        let best: Vec<LeaderboardEntry> = match store.list_all() {
            Ok(records) => records.into_iter().filter_map(|r| r.best_entry).collect(),
            Err(e) => {
                error!("Leaderboard rebuild failed, starting empty: {}", e);
                Vec::new()
            }
        };
        let leaderboard = Leaderboard::rebuild(rules.leaderboard_size, best);
        info!(entries = leaderboard.len(), "Leaderboard rebuilt");

        Self {
            catalog,
            rules,
            store,
            sessions: RwLock::new(BTreeMap::new()),
            leaderboard: RwLock::new(leaderboard),
            events: Mutex::new(EventRegistry::new()),
            event_salt: *uuid::Uuid::new_v4().as_bytes(),
        }
    }

    /// Volatile manager with the standard catalog and rules.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(crate::network::store::MemoryStore::new()),
            Arc::new(Catalog::standard()),
            GameRules::default(),
        )
    }

    /// Upgrade catalog.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Game rules.
    pub fn rules(&self) -> &GameRules {
        &self.rules
    }

    /// Load `session_id` if given and known, otherwise create a new session.
    #[instrument(skip(self))]
    pub async fn create_or_load(
        &self,
        session_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<SessionSnapshot, SessionError> {
        if let Some(id) = session_id {
            let id = SessionId::from(id);
            if let Ok(handle) = self.handle(&id, now).await {
                let record = handle.lock().await;
                let events = self.events.lock().await.active_for(&id, now);
                return Ok(SessionSnapshot { state: record.state.clone(), events, created: false });
            }
            debug!(session = %id, "Unknown session, creating a new one");
        }

        let state = {
            let mut sessions = self.sessions.write().await;
            let mut id = SessionId::generate(now);
            while sessions.contains_key(&id) || self.store.contains(&id).unwrap_or(false) {
                id = SessionId::generate(now);
            }
            let state = ProgressionState::new(id.clone(), now, &self.catalog);
            let record = SessionRecord::new(state.clone());
            self.persist(&record);
            sessions.insert(id, LoadedSession::new(record, now));
            state
        };

        info!(session = %state.session_id, "Session created");
        Ok(SessionSnapshot { state, events: Vec::new(), created: true })
    }

    /// Credit clicks and idle time. `declared` yields from the client are
    /// checked and discarded.
    #[instrument(skip(self, declared))]
    pub async fn sync(
        &self,
        session_id: &str,
        pending_clicks: u64,
        declared: Option<Yields>,
        now: DateTime<Utc>,
    ) -> Result<SyncResult, SessionError> {
        let id = SessionId::from(session_id);
        let handle = self.handle(&id, now).await?;
        let mut record = handle.lock().await;

        let active = self.events.lock().await.active_for(&id, now);

        let corruption = declared.and_then(|declared| {
            let expected = compute_yields(&record.state, &self.catalog, &active, &self.rules);
            check_yields(expected, declared, &self.rules).err()
        });
        if let Some(mismatch) = &corruption {
            warn!(session = %id, "Declared yields rejected: {}", mismatch);
        }

        let mut rng = DeterministicRng::for_event_roll(&self.event_salt, id.as_str(), now.timestamp_millis());
        let transition = progression::sync(
            &record.state,
            pending_clicks,
            now,
            &active,
            &mut rng,
            &self.catalog,
            &self.rules,
        );
        record.state = transition.state;
        let outcome = transition.outcome;

        if outcome.clicks.dropped > 0 {
            debug!(session = %id, dropped = outcome.clicks.dropped, "Clicks over rate limit dropped");
        }

        let events = {
            let mut registry = self.events.lock().await;
            if let Some(event) = &outcome.spawned_event {
                info!(session = %id, kind = ?event.kind, "Event spawned");
                registry.insert(event.clone());
            }
            registry.active_for(&id, now)
        };

        self.offer_named_score(&mut record, now).await;
        self.persist(&record);

        Ok(SyncResult {
            state: record.state.clone(),
            outcome,
            events,
            leaderboard: self.leaderboard().await,
            corruption,
        })
    }

    /// Buy one unit of an upgrade.
    #[instrument(skip(self))]
    pub async fn purchase(
        &self,
        session_id: &str,
        upgrade_id: &str,
        now: DateTime<Utc>,
    ) -> Result<PurchaseResult, SessionError> {
        let id = SessionId::from(session_id);
        let handle = self.handle(&id, now).await?;
        let mut record = handle.lock().await;

        let active = self.events.lock().await.active_for(&id, now);
        let transition = progression::purchase(&record.state, upgrade_id, &active, &self.catalog, &self.rules)?;
        record.state = transition.state;

        self.offer_named_score(&mut record, now).await;
        self.persist(&record);

        Ok(PurchaseResult {
            state: record.state.clone(),
            outcome: transition.outcome,
            leaderboard: self.leaderboard().await,
        })
    }

    /// Prestige the session.
    #[instrument(skip(self))]
    pub async fn prestige(&self, session_id: &str, now: DateTime<Utc>) -> Result<PrestigeResult, SessionError> {
        let id = SessionId::from(session_id);
        let handle = self.handle(&id, now).await?;
        let mut record = handle.lock().await;

        let active = self.events.lock().await.active_for(&id, now);
        let transition = progression::prestige(&record.state, now, &active, &self.catalog, &self.rules)?;
        record.state = transition.state;
        self.persist(&record);

        info!(
            session = %id,
            gained = transition.outcome.prestige_gained,
            count = transition.outcome.prestige_count,
            "Prestiged"
        );
        Ok(PrestigeResult { state: record.state.clone(), outcome: transition.outcome })
    }

    /// Set the player name and place the validated score.
    #[instrument(skip(self))]
    pub async fn submit_score(
        &self,
        session_id: &str,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<ScoreResult, SessionError> {
        let id = SessionId::from(session_id);
        let handle = self.handle(&id, now).await?;
        let mut record = handle.lock().await;

        let transition = progression::rename(&record.state, name, &self.rules)?;
        record.state = transition.state;

        let verdict = self.offer_score(&mut record, now).await;
        if !verdict.accepted {
            warn!(
                session = %id,
                claimed = verdict.claimed,
                capped = verdict.score,
                "Implausible score capped"
            );
        }
        self.persist(&record);

        Ok(ScoreResult {
            name: transition.outcome,
            verdict,
            leaderboard: self.leaderboard().await,
        })
    }

    /// Claim a clickable event.
    #[instrument(skip(self))]
    pub async fn click_event(
        &self,
        session_id: &str,
        event_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ClaimResult, SessionError> {
        let id = SessionId::from(session_id);
        let handle = self.handle(&id, now).await?;
        let mut record = handle.lock().await;

        let (event, active) = {
            let mut registry = self.events.lock().await;
            let event = registry.take_clickable(event_id, &id, now)?;
            (event, registry.active_for(&id, now))
        };

        let transition =
            progression::claim_event_reward(&record.state, &event, now, &active, &self.catalog, &self.rules)?;
        record.state = transition.state;
        self.persist(&record);

        Ok(ClaimResult { reward: transition.outcome, state: record.state.clone() })
    }

    /// Wipe the session back to a fresh start.
    #[instrument(skip(self))]
    pub async fn reset(&self, session_id: &str, now: DateTime<Utc>) -> Result<ProgressionState, SessionError> {
        let id = SessionId::from(session_id);
        let handle = self.handle(&id, now).await?;
        let mut record = handle.lock().await;

        record.state = progression::reset(&record.state, now, &self.catalog).state;
        self.events.lock().await.remove_session(&id);
        self.persist(&record);

        info!(session = %id, "Session reset");
        Ok(record.state.clone())
    }

    /// Lifetime plausibility report without side effects.
    pub async fn validate(&self, session_id: &str, now: DateTime<Utc>) -> Result<PlausibilityReport, SessionError> {
        let id = SessionId::from(session_id);
        let handle = self.handle(&id, now).await?;
        let record = handle.lock().await;
        let active = self.events.lock().await.active_for(&id, now);
        Ok(assess_lifetime(&record.state, &self.catalog, &active, &self.rules, now))
    }

    /// Plausibility report of every stored session.
    pub async fn validate_all(&self, now: DateTime<Utc>) -> Result<AuditSummary, StoreError> {
        let records = self.store.list_all()?;
        let mut registry = self.events.lock().await;

        let mut audit = AuditSummary::default();
        for record in records {
            let id = record.state.session_id.clone();
            let active = registry.active_for(&id, now);
            audit.record(id, assess_lifetime(&record.state, &self.catalog, &active, &self.rules, now));
        }

        for (id, report) in audit.flagged() {
            warn!(session = %id, errors = ?report.errors, "Session failed validation");
        }
        info!(total = audit.total, valid = audit.valid, invalid = audit.invalid, "Audit complete");
        Ok(audit)
    }

    /// Public leaderboard.
    pub async fn leaderboard(&self) -> Vec<PublicLeaderboardEntry> {
        self.leaderboard.read().await.public_view()
    }

    /// Write pending changes to durable storage.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.store.flush()
    }

    /// Drop expired events of every session.
    pub async fn purge_expired_events(&self, now: DateTime<Utc>) -> usize {
        self.events.lock().await.purge_expired(now)
    }

    /// Number of loaded sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drop loaded sessions not touched for `ttl`. Each is written back
    /// first; a session in use or failing to write stays loaded.
    pub async fn evict_idle(&self, now: DateTime<Utc>, ttl: Duration) -> usize {
        let cutoff = now - ttl;
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();

        sessions.retain(|id, loaded| {
            // Handles are only cloned under the map lock, so a count of one
            // means no request holds this session.
            if !loaded.idle_since(cutoff) || Arc::strong_count(&loaded.record) > 1 {
                return true;
            }
            let Ok(record) = loaded.record.try_lock() else {
                return true;
            };
            match self.store.put(record.clone()) {
                Ok(()) => false,
                Err(e) => {
                    error!(session = %id, "Write-back before eviction failed: {}", e);
                    true
                }
            }
        });

        let evicted = before - sessions.len();
        if evicted > 0 {
            debug!(evicted, loaded = sessions.len(), "Idle sessions evicted");
        }
        evicted
    }

    // -------------------------------------------------------------------------

    /// Find a loaded session or load it from the store.
    async fn handle(&self, id: &SessionId, now: DateTime<Utc>) -> Result<SessionHandle, SessionError> {
        if let Some(loaded) = self.sessions.read().await.get(id) {
            loaded.touch(now);
            return Ok(loaded.record.clone());
        }

        let mut record = match self.store.get(id) {
            Ok(Some(record)) => record,
            Ok(None) => return Err(SessionError::InvalidSession(id.to_string())),
            Err(e) => {
                error!(session = %id, "Store read failed: {}", e);
                return Err(SessionError::InvalidSession(id.to_string()));
            }
        };

        // Cached yields are never trusted across a restart
        let cached = Yields { per_click: record.state.per_click, per_second: record.state.per_second };
        let expected = compute_yields(&record.state, &self.catalog, &[], &self.rules);
        if let Err(mismatch) = check_yields(expected, cached, &self.rules) {
            warn!(session = %id, "Stored yields repaired: {}", mismatch);
        }
        record.state.per_click = expected.per_click;
        record.state.per_second = expected.per_second;
        debug!(session = %id, at = %now, "Session loaded");

        let mut sessions = self.sessions.write().await;
        let loaded = sessions
            .entry(id.clone())
            .or_insert_with(|| LoadedSession::new(record, now));
        loaded.touch(now);
        Ok(loaded.record.clone())
    }

    /// Offer the session's validated score if it has a name.
    async fn offer_named_score(&self, record: &mut SessionRecord, now: DateTime<Utc>) {
        if !record.state.player_name.is_empty() {
            self.offer_score(record, now).await;
        }
    }

    /// Validate and place the session's score, tracking its best entry.
    async fn offer_score(&self, record: &mut SessionRecord, now: DateTime<Utc>) -> ScoreVerdict {
        let active = self.events.lock().await.active_for(&record.state.session_id, now);
        let verdict = validate_score(&record.state, &self.catalog, &active, &self.rules, now);
        let entry = LeaderboardEntry {
            name: record.state.player_name.clone(),
            score: verdict.score,
            date: now,
            session_id: record.state.session_id.clone(),
            prestige_count: record.state.prestige_count,
        };

        let improves = record.best_entry.as_ref().map_or(true, |best| entry.score > best.score);
        if improves {
            record.best_entry = Some(entry.clone());
        }
        self.leaderboard.write().await.submit(entry);
        verdict
    }

    /// Fire-and-forget write. A failing store degrades to memory only.
    fn persist(&self, record: &SessionRecord) {
        if let Err(e) = self.store.put(record.clone()) {
            error!(session = %record.state.session_id, "Persist failed: {}", e);
        }
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use crate::network::store::MemoryStore;

    fn t0() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        t0() + Duration::seconds(secs)
    }

    async fn new_session(manager: &SessionManager) -> String {
        let snapshot = manager.create_or_load(None, t0()).await.unwrap();
        snapshot.state.session_id.to_string()
    }

    #[tokio::test]
    async fn test_create_and_reload() {
        let manager = SessionManager::in_memory();

        let created = manager.create_or_load(None, t0()).await.unwrap();
        assert!(created.created);
        assert!(created.state.session_id.as_str().starts_with("session-1700000000-"));
        assert_eq!(created.state.created_at, t0());

        let id = created.state.session_id.to_string();
        let loaded = manager.create_or_load(Some(&id), at(5)).await.unwrap();
        assert!(!loaded.created);
        assert_eq!(loaded.state, created.state);
        assert_eq!(manager.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_id_creates_fresh_session() {
        let manager = SessionManager::in_memory();

        let snapshot = manager.create_or_load(Some("session-1-deadbeef"), t0()).await.unwrap();
        assert!(snapshot.created);
        assert_ne!(snapshot.state.session_id.as_str(), "session-1-deadbeef");
    }

    #[tokio::test]
    async fn test_invalid_session() {
        let manager = SessionManager::in_memory();

        let err = manager.sync("nope", 1, None, t0()).await.unwrap_err();
        assert_eq!(err, SessionError::InvalidSession("nope".into()));
        assert!(matches!(
            manager.purchase("nope", "click_1", t0()).await,
            Err(SessionError::InvalidSession(_))
        ));
        assert!(matches!(manager.reset("nope", t0()).await, Err(SessionError::InvalidSession(_))));
    }

    #[tokio::test]
    async fn test_sync_end_to_end() {
        let manager = SessionManager::in_memory();
        let id = new_session(&manager).await;

        let result = manager.sync(&id, 5, None, at(1)).await.unwrap();
        assert_eq!(result.state.currency, 5.0);
        assert_eq!(result.state.total_clicks, 5);
        assert!(result.corruption.is_none());
    }

    #[tokio::test]
    async fn test_declared_yields_checked_not_trusted() {
        let manager = SessionManager::in_memory();
        let id = new_session(&manager).await;

        let forged = Yields { per_click: 1_000, per_second: 50.0 };
        let result = manager.sync(&id, 5, Some(forged), at(1)).await.unwrap();

        let mismatch = result.corruption.unwrap();
        assert_eq!(mismatch.expected.per_click, 1);
        assert_eq!(result.state.per_click, 1);
        assert_eq!(result.state.currency, 5.0);
    }

    #[tokio::test]
    async fn test_purchase_flow_and_errors() {
        let manager = SessionManager::in_memory();
        let id = new_session(&manager).await;

        let err = manager.purchase(&id, "click_1", at(0)).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Progression(ProgressionError::InsufficientFunds { cost: 10, .. })
        ));

        manager.sync(&id, 20, None, at(1)).await.unwrap();
        let result = manager.purchase(&id, "click_1", at(1)).await.unwrap();
        assert_eq!(result.outcome.owned, 1);
        assert_eq!(result.state.currency, 10.0);
        assert_eq!(result.state.per_click, 2);

        assert!(matches!(
            manager.purchase(&id, "nothing", at(1)).await,
            Err(SessionError::Progression(ProgressionError::UnknownUpgrade(_)))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_purchases_serialize() {
        let manager = Arc::new(SessionManager::in_memory());
        let id = new_session(&manager).await;

        // 200 currency buys exactly ten click_1 (10 + 11 + 13 + ... + 35)
        let synced = manager.sync(&id, 200, None, at(10)).await.unwrap();
        assert_eq!(synced.state.currency, 200.0);

        let mut tasks = Vec::new();
        for _ in 0..20 {
            let manager = manager.clone();
            let id = id.clone();
            tasks.push(tokio::spawn(async move { manager.purchase(&id, "click_1", at(10)).await }));
        }

        let mut bought = 0;
        for task in tasks {
            if task.await.unwrap().is_ok() {
                bought += 1;
            }
        }

        let state = manager.create_or_load(Some(&id), at(10)).await.unwrap().state;
        assert_eq!(bought, 10);
        assert_eq!(state.owned("click_1"), 10);
        assert_eq!(state.currency, 0.0);
    }

    #[tokio::test]
    async fn test_submit_score_and_monotonic_leaderboard() {
        let manager = SessionManager::in_memory();
        let id = new_session(&manager).await;

        assert!(matches!(
            manager.submit_score(&id, "   ", at(0)).await,
            Err(SessionError::Progression(ProgressionError::EmptyName))
        ));

        manager.sync(&id, 50, None, at(5)).await.unwrap();
        let result = manager.submit_score(&id, "  Clicker  ", at(5)).await.unwrap();
        assert_eq!(result.name, "Clicker");
        assert!(result.verdict.accepted);
        assert_eq!(result.leaderboard.len(), 1);
        assert_eq!(result.leaderboard[0].score, 50);

        // Spending lowers currency but never the leaderboard
        let purchase = manager.purchase(&id, "click_1", at(5)).await.unwrap();
        assert_eq!(purchase.leaderboard[0].score, 50);

        // Named sessions are re-offered on sync
        let synced = manager.sync(&id, 100, None, at(10)).await.unwrap();
        assert_eq!(synced.leaderboard[0].score, 40 + 200);
    }

    #[tokio::test]
    async fn test_prestige_threshold_via_manager() {
        let manager = SessionManager::in_memory();
        let id = new_session(&manager).await;

        assert!(matches!(
            manager.prestige(&id, at(1)).await,
            Err(SessionError::Progression(ProgressionError::ThresholdNotMet { .. }))
        ));
    }

    #[tokio::test]
    async fn test_click_event_errors() {
        let manager = SessionManager::in_memory();
        let id = new_session(&manager).await;

        assert!(matches!(
            manager.click_event(&id, "event-missing", at(1)).await,
            Err(SessionError::Progression(ProgressionError::UnknownEvent(_)))
        ));
    }

    #[tokio::test]
    async fn test_click_golden_event() {
        let manager = SessionManager::in_memory();
        let id = new_session(&manager).await;
        let sid = SessionId::from(id.as_str());

        manager
            .events
            .lock()
            .await
            .insert(ActiveEvent::new("event-g".into(), crate::game::events::EventKind::Golden, sid, at(0)));

        let claim = manager.click_event(&id, "event-g", at(3)).await.unwrap();
        assert_eq!(claim.reward, 100);
        assert_eq!(claim.state.currency, 100.0);

        assert!(matches!(
            manager.click_event(&id, "event-g", at(4)).await,
            Err(SessionError::Progression(ProgressionError::UnknownEvent(_)))
        ));
    }

    #[tokio::test]
    async fn test_reset_and_validate() {
        let manager = SessionManager::in_memory();
        let id = new_session(&manager).await;

        manager.sync(&id, 20, None, at(1)).await.unwrap();
        let report = manager.validate(&id, at(1)).await.unwrap();
        assert!(report.valid);
        assert_eq!(report.max_from_clicks, 20.0);

        let state = manager.reset(&id, at(2)).await.unwrap();
        assert_eq!(state.currency, 0.0);
        assert_eq!(state.total_clicks, 0);
        assert_eq!(state.created_at, t0());
    }

    #[tokio::test]
    async fn test_reload_from_store_repairs_yields_and_leaderboard() {
        let store: Arc<dyn SessionStore> = Arc::new(MemoryStore::new());
        let catalog = Arc::new(Catalog::standard());

        let id = {
            let manager = SessionManager::new(store.clone(), catalog.clone(), GameRules::default());
            let id = new_session(&manager).await;
            manager.sync(&id, 30, None, at(2)).await.unwrap();
            manager.submit_score(&id, "Saved", at(2)).await.unwrap();
            id
        };

        // Tamper with the cached yields in storage
        let mut record = store.get(&SessionId::from(id.as_str())).unwrap().unwrap();
        record.state.per_click = 999;
        store.put(record).unwrap();

        let manager = SessionManager::new(store, catalog, GameRules::default());
        assert_eq!(manager.leaderboard().await[0].name, "Saved");

        let loaded = manager.create_or_load(Some(&id), at(3)).await.unwrap();
        assert!(!loaded.created);
        assert_eq!(loaded.state.per_click, 1);
        assert_eq!(loaded.state.currency, 30.0);
    }

    #[tokio::test]
    async fn test_evict_idle_then_reload() {
        let manager = SessionManager::in_memory();
        let idle = new_session(&manager).await;
        let busy = new_session(&manager).await;
        manager.sync(&idle, 12, None, at(1)).await.unwrap();
        manager.sync(&busy, 3, None, at(50)).await.unwrap();

        assert_eq!(manager.evict_idle(at(60), Duration::seconds(30)).await, 1);
        assert_eq!(manager.session_count().await, 1);

        // Reloaded from the store on demand
        let result = manager.sync(&idle, 4, None, at(61)).await.unwrap();
        assert_eq!(result.state.currency, 16.0);
        assert_eq!(result.state.total_clicks, 16);
        assert_eq!(manager.session_count().await, 2);
    }

    #[tokio::test]
    async fn test_unknown_id_flood_is_evicted() {
        let manager = SessionManager::in_memory();
        for _ in 0..500 {
            manager.create_or_load(Some("bogus"), t0()).await.unwrap();
        }
        assert_eq!(manager.session_count().await, 500);

        assert_eq!(manager.evict_idle(at(3_600), Duration::minutes(30)).await, 500);
        assert_eq!(manager.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_evict_keeps_locked_session() {
        let manager = SessionManager::in_memory();
        let id = new_session(&manager).await;
        let handle = manager.handle(&SessionId::from(id.as_str()), t0()).await.unwrap();
        let _guard = handle.lock().await;

        assert_eq!(manager.evict_idle(at(3_600), Duration::seconds(1)).await, 0);
        assert_eq!(manager.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_validate_all_flags_tampered_sessions() {
        let store: Arc<dyn SessionStore> = Arc::new(MemoryStore::new());
        let manager = SessionManager::new(store.clone(), Arc::new(Catalog::standard()), GameRules::default());

        let honest = new_session(&manager).await;
        manager.sync(&honest, 10, None, at(1)).await.unwrap();
        let cheater = new_session(&manager).await;

        let mut record = store.get(&SessionId::from(cheater.as_str())).unwrap().unwrap();
        record.state.currency = 1e9;
        record.state.per_click = 50;
        store.put(record).unwrap();

        let audit = manager.validate_all(at(2)).await.unwrap();
        assert_eq!((audit.total, audit.valid, audit.invalid), (2, 1, 1));

        let report = &audit.reports[&SessionId::from(cheater.as_str())];
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.contains("per_click mismatch")));
        assert!(report.errors.iter().any(|e| e.contains("impossible balance")));
    }
}
