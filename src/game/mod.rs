//! Game Logic Module
//!
//! Everything that decides what a session earns. Pure and synchronous:
//! no I/O, no locks, time passed in explicitly.
//!
//! ## Module Structure
//!
//! - `rules`: Tunable constants
//! - `catalog`: Static upgrade and achievement definitions
//! - `state`: Per-session progression state
//! - `economy`: Costs, multipliers, yields
//! - `anticheat`: Click clamping, lifetime bound, yield invariant
//! - `achievements`: Unlock checks
//! - `events`: Timed events and the live-event registry
//! - `progression`: State transitions (sync, purchase, prestige, reset)
//! - `leaderboard`: Top-N ranking

pub mod rules;
pub mod catalog;
pub mod state;
pub mod economy;
pub mod anticheat;
pub mod achievements;
pub mod events;
pub mod progression;
pub mod leaderboard;

// Re-export key types
pub use rules::GameRules;
pub use catalog::{Catalog, UpgradeDefinition, AchievementDefinition};
pub use state::{ProgressionState, SessionId};
pub use economy::Yields;
pub use anticheat::{AuditSummary, PlausibilityReport, ScoreVerdict, YieldMismatch};
pub use events::{ActiveEvent, EventKind, EventRegistry};
pub use progression::{ProgressionError, Transition};
pub use leaderboard::{Leaderboard, LeaderboardEntry, PublicLeaderboardEntry};
