//! Event Engine
//!
//! Time-boxed events rolled on sync, plus the process-wide registry that
//! holds them until they expire or are claimed.
//!
//! Rolls only produce [`ROLLABLE_KINDS`]. [`EventKind::Boost`] is the
//! extension point for operator-granted global boosts: insert one built with
//! [`ActiveEvent::boost`] into the registry and the economy applies it to
//! both yields while it is live.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Serialize, Deserialize};

use crate::core::rng::DeterministicRng;
use crate::game::progression::ProgressionError;
use crate::game::rules::GameRules;
use crate::game::state::SessionId;

/// Kind of spawned event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Doubles idle earnings for a minute.
    Rain,
    /// Cosmetic celebration.
    Festival,
    /// Clickable one-time reward.
    Golden,
    /// Global yield boost.
    Boost,
}

/// Kinds a roll can produce, picked uniformly.
pub const ROLLABLE_KINDS: [EventKind; 3] = [EventKind::Rain, EventKind::Festival, EventKind::Golden];

impl EventKind {
    /// Lifetime in seconds.
    pub fn duration_secs(self) -> i64 {
        match self {
            EventKind::Rain => 60,
            EventKind::Festival => 120,
            EventKind::Golden => 10,
            EventKind::Boost => 60,
        }
    }

    /// Default multiplier.
    pub fn multiplier(self) -> f64 {
        match self {
            EventKind::Rain => 2.0,
            EventKind::Festival | EventKind::Golden | EventKind::Boost => 1.0,
        }
    }

    /// Which computation the multiplier feeds.
    pub fn scope(self) -> BoostScope {
        match self {
            EventKind::Rain => BoostScope::IdleEarnings,
            EventKind::Festival | EventKind::Golden => BoostScope::None,
            EventKind::Boost => BoostScope::Global,
        }
    }

    /// Can the player click it for a reward?
    pub fn is_clickable(self) -> bool {
        self == EventKind::Golden
    }
}

/// Where an event's multiplier applies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoostScope {
    /// Multiplies the global multiplier (both yields).
    Global,
    /// Multiplies time-based earnings on sync only.
    IdleEarnings,
    /// No economic effect.
    None,
}

/// A live event owned by one session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActiveEvent {
    /// Unique id.
    pub id: String,
    /// Kind.
    pub kind: EventKind,
    /// Owning session.
    pub session_id: SessionId,
    /// Start time.
    pub started_at: DateTime<Utc>,
    /// Lifetime in seconds.
    pub duration_secs: i64,
    /// Multiplier applied within `scope`.
    pub multiplier: f64,
    /// Scope of the multiplier.
    pub scope: BoostScope,
}

/// Temporary yield modifiers share the event shape.
pub type ActiveBoost = ActiveEvent;

impl ActiveEvent {
    /// Create an event of `kind` with its default duration and multiplier.
    pub fn new(id: String, kind: EventKind, session_id: SessionId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            kind,
            session_id,
            started_at: now,
            duration_secs: kind.duration_secs(),
            multiplier: kind.multiplier(),
            scope: kind.scope(),
        }
    }

    /// Global yield boost lasting `duration_secs`. Never rolled; see the
    /// module docs.
    pub fn boost(id: String, session_id: SessionId, multiplier: f64, duration_secs: i64, now: DateTime<Utc>) -> Self {
        Self {
            duration_secs,
            multiplier,
            ..Self::new(id, EventKind::Boost, session_id, now)
        }
    }

    /// Live while `now - start < duration`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now - self.started_at < Duration::seconds(self.duration_secs)
    }

    /// When it stops being active.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.started_at + Duration::seconds(self.duration_secs)
    }
}

/// Product of the idle-earnings multipliers of `events`.
pub fn idle_multiplier(events: &[ActiveEvent]) -> f64 {
    events
        .iter()
        .filter(|e| e.scope == BoostScope::IdleEarnings)
        .fold(1.0, |acc, e| acc * e.multiplier)
}

/// Roll for a new event.
///
/// Spawns with `rules.event_probability`; the kind is uniform over
/// [`ROLLABLE_KINDS`].
pub fn roll_event(
    session_id: &SessionId,
    now: DateTime<Utc>,
    rng: &mut DeterministicRng,
    rules: &GameRules,
) -> Option<ActiveEvent> {
    if !rng.chance(rules.event_probability) {
        return None;
    }
    let kind = *rng.choose(&ROLLABLE_KINDS)?;
    let id = format!("event-{}", hex::encode(rng.next_u64().to_be_bytes()));
    Some(ActiveEvent::new(id, kind, session_id.clone(), now))
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Process-wide live events, keyed by event id.
#[derive(Debug, Default)]
pub struct EventRegistry {
    events: BTreeMap<String, ActiveEvent>,
}

impl EventRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new event.
    pub fn insert(&mut self, event: ActiveEvent) {
        self.events.insert(event.id.clone(), event);
    }

    /// Live events of a session. Expired ones of that session are purged.
    pub fn active_for(&mut self, session_id: &SessionId, now: DateTime<Utc>) -> Vec<ActiveEvent> {
        self.events
            .retain(|_, e| &e.session_id != session_id || e.is_active(now));
        self.events
            .values()
            .filter(|e| &e.session_id == session_id)
            .cloned()
            .collect()
    }

    /// Remove and return a clickable event owned by `session_id`.
    ///
    /// Unknown, expired or foreign events are `UnknownEvent`; a live
    /// non-clickable event is left in place and reported `NotClickable`.
    pub fn take_clickable(
        &mut self,
        event_id: &str,
        session_id: &SessionId,
        now: DateTime<Utc>,
    ) -> Result<ActiveEvent, ProgressionError> {
        let event = match self.events.get(event_id) {
            Some(e) if &e.session_id == session_id => e,
            _ => return Err(ProgressionError::UnknownEvent(event_id.to_string())),
        };

        if !event.is_active(now) {
            self.events.remove(event_id);
            return Err(ProgressionError::UnknownEvent(event_id.to_string()));
        }
        if !event.kind.is_clickable() {
            return Err(ProgressionError::NotClickable(event_id.to_string()));
        }

        self.events
            .remove(event_id)
            .ok_or_else(|| ProgressionError::UnknownEvent(event_id.to_string()))
    }

    /// Drop every session's events.
    pub fn remove_session(&mut self, session_id: &SessionId) {
        self.events.retain(|_, e| &e.session_id != session_id);
    }

    /// Sweep expired events of all sessions. Returns how many were dropped.
    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.events.len();
        self.events.retain(|_, e| e.is_active(now));
        before - self.events.len()
    }

    /// Number of tracked events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// No tracked events?
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> SessionId {
        SessionId::from("session-1700000000-00112233aabbccdd")
    }

    fn golden(now: DateTime<Utc>) -> ActiveEvent {
        ActiveEvent::new("event-g".into(), EventKind::Golden, session(), now)
    }

    #[test]
    fn test_expiry_boundary() {
        let now = Utc::now();
        let rain = ActiveEvent::new("event-r".into(), EventKind::Rain, session(), now);

        assert!(rain.is_active(now + Duration::seconds(59)));
        assert!(!rain.is_active(now + Duration::seconds(60)));
        assert_eq!(rain.expires_at(), now + Duration::seconds(60));
    }

    #[test]
    fn test_idle_multiplier_only_counts_rain() {
        let now = Utc::now();
        let events = vec![
            ActiveEvent::new("a".into(), EventKind::Rain, session(), now),
            ActiveEvent::new("b".into(), EventKind::Festival, session(), now),
            ActiveEvent::boost("c".into(), session(), 3.0, 30, now),
        ];
        assert_eq!(idle_multiplier(&events), 2.0);
        assert_eq!(idle_multiplier(&[]), 1.0);
    }

    #[test]
    fn test_roll_respects_probability() {
        let rules_never = GameRules { event_probability: 0.0, ..Default::default() };
        let rules_always = GameRules { event_probability: 1.0, ..Default::default() };
        let now = Utc::now();
        let mut rng = DeterministicRng::new(1);

        for _ in 0..50 {
            assert!(roll_event(&session(), now, &mut rng, &rules_never).is_none());
            let event = roll_event(&session(), now, &mut rng, &rules_always).unwrap();
            assert!(ROLLABLE_KINDS.contains(&event.kind));
            assert_eq!(event.started_at, now);
            assert_eq!(event.session_id, session());
        }
    }

    #[test]
    fn test_roll_is_deterministic() {
        let rules = GameRules { event_probability: 1.0, ..Default::default() };
        let now = Utc::now();

        let a = roll_event(&session(), now, &mut DeterministicRng::new(9), &rules).unwrap();
        let b = roll_event(&session(), now, &mut DeterministicRng::new(9), &rules).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_active_for_purges_lazily() {
        let now = Utc::now();
        let mut registry = EventRegistry::new();
        registry.insert(golden(now));
        registry.insert(ActiveEvent::new("event-f".into(), EventKind::Festival, session(), now));

        assert_eq!(registry.active_for(&session(), now).len(), 2);

        // Golden lasts 10s, festival 120s
        let later = now + Duration::seconds(30);
        let active = registry.active_for(&session(), later);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].kind, EventKind::Festival);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_active_for_leaves_other_sessions() {
        let now = Utc::now();
        let other = SessionId::from("session-1700000000-ffffffffffffffff");
        let mut registry = EventRegistry::new();
        registry.insert(ActiveEvent::new("event-o".into(), EventKind::Golden, other.clone(), now));

        assert!(registry.active_for(&session(), now + Duration::seconds(60)).is_empty());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.purge_expired(now + Duration::seconds(60)), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_take_clickable() {
        let now = Utc::now();
        let mut registry = EventRegistry::new();
        registry.insert(golden(now));

        let taken = registry.take_clickable("event-g", &session(), now).unwrap();
        assert_eq!(taken.kind, EventKind::Golden);
        assert!(registry.is_empty());

        // Consumed
        assert!(matches!(
            registry.take_clickable("event-g", &session(), now),
            Err(ProgressionError::UnknownEvent(_))
        ));
    }

    #[test]
    fn test_take_clickable_rejections() {
        let now = Utc::now();
        let mut registry = EventRegistry::new();
        registry.insert(golden(now));
        registry.insert(ActiveEvent::new("event-r".into(), EventKind::Rain, session(), now));

        let other = SessionId::from("someone-else");
        assert!(matches!(
            registry.take_clickable("event-g", &other, now),
            Err(ProgressionError::UnknownEvent(_))
        ));
        assert!(matches!(
            registry.take_clickable("event-r", &session(), now),
            Err(ProgressionError::NotClickable(_))
        ));
        // Non-clickable event is not consumed
        assert_eq!(registry.len(), 2);

        assert!(matches!(
            registry.take_clickable("event-g", &session(), now + Duration::seconds(10)),
            Err(ProgressionError::UnknownEvent(_))
        ));
        assert_eq!(registry.len(), 1);
    }
}
