//! Leaderboard
//!
//! Bounded top-N ranking with one entry per session. A session's score only
//! ever goes up; the public view never exposes session identifiers.

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::game::state::SessionId;

/// Ranked entry, including the owning session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// Display name.
    pub name: String,
    /// Validated score.
    pub score: u64,
    /// When the score was recorded.
    pub date: DateTime<Utc>,
    /// Owning session.
    pub session_id: SessionId,
    /// Prestige count at the time.
    pub prestige_count: u32,
}

/// What external consumers see.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicLeaderboardEntry {
    /// Display name.
    pub name: String,
    /// Score.
    pub score: u64,
    /// When the score was recorded.
    pub date: DateTime<Utc>,
    /// Prestige count at the time.
    pub prestige_count: u32,
}

impl From<&LeaderboardEntry> for PublicLeaderboardEntry {
    fn from(entry: &LeaderboardEntry) -> Self {
        Self {
            name: entry.name.clone(),
            score: entry.score,
            date: entry.date,
            prestige_count: entry.prestige_count,
        }
    }
}

/// Top-N scores, highest first.
#[derive(Clone, Debug)]
pub struct Leaderboard {
    entries: Vec<LeaderboardEntry>,
    capacity: usize,
}

impl Leaderboard {
    /// Empty board holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self { entries: Vec::with_capacity(capacity + 1), capacity }
    }

    /// Rebuild from every session's best entry.
    pub fn rebuild<I>(capacity: usize, entries: I) -> Self
    where
        I: IntoIterator<Item = LeaderboardEntry>,
    {
        let mut board = Self::new(capacity);
        for entry in entries {
            board.submit(entry);
        }
        board
    }

    /// Offer an entry.
    ///
    /// Inserted if the session has no entry; replaces the existing one only
    /// if the score is strictly higher. Returns whether the board changed.
    pub fn submit(&mut self, entry: LeaderboardEntry) -> bool {
        let session_id = entry.session_id.clone();
        match self.entries.iter_mut().find(|e| e.session_id == session_id) {
            Some(existing) if entry.score > existing.score => *existing = entry,
            Some(_) => return false,
            None => self.entries.push(entry),
        }

        // Stable: equal scores keep their earlier position
        self.entries.sort_by(|a, b| b.score.cmp(&a.score));
        self.entries.truncate(self.capacity);
        self.entry_for(&session_id).is_some()
    }

    /// Ranked entries, including session ids.
    pub fn entries(&self) -> &[LeaderboardEntry] {
        &self.entries
    }

    /// Ranked entries without session ids.
    pub fn public_view(&self) -> Vec<PublicLeaderboardEntry> {
        self.entries.iter().map(PublicLeaderboardEntry::from).collect()
    }

    /// Entry of a session, if ranked.
    pub fn entry_for(&self, session_id: &SessionId) -> Option<&LeaderboardEntry> {
        self.entries.iter().find(|e| &e.session_id == session_id)
    }

    /// Capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of ranked entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// No entries?
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
