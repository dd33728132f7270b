//! # Idle Economy Server
//!
//! Server-authoritative economy and anti-cheat engine for an incremental
//! clicker game. Clients report clicks; the server decides what they earned.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   IDLE ECONOMY SERVER                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/              - Deterministic primitives               │
//! │  └── rng.rs         - Xorshift128+ PRNG, event seeds         │
//! │                                                              │
//! │  game/              - Economy logic (pure, synchronous)      │
//! │  ├── rules.rs       - Tunable constants                      │
//! │  ├── catalog.rs     - Upgrade and achievement definitions    │
//! │  ├── state.rs       - Per-session progression state          │
//! │  ├── economy.rs     - Costs, multipliers, yields             │
//! │  ├── anticheat.rs   - Click clamp, lifetime bound            │
//! │  ├── achievements.rs- Unlock checks                          │
//! │  ├── events.rs      - Timed events and registry              │
//! │  ├── progression.rs - Sync / purchase / prestige / reset     │
//! │  └── leaderboard.rs - Top-N ranking                          │
//! │                                                              │
//! │  network/           - Shell (async, non-deterministic)       │
//! │  ├── store.rs       - Session persistence                    │
//! │  ├── session.rs     - Per-session locking, orchestration     │
//! │  ├── protocol.rs    - JSON message types                     │
//! │  └── server.rs      - WebSocket server                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Authority
//!
//! - Yields are always recomputed from owned upgrades; client values are
//!   checked and discarded.
//! - Clicks are clamped to the maximum click rate over the elapsed time.
//! - Leaderboard scores are validated against what the session could
//!   plausibly have earned since it was created.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use core::rng::DeterministicRng;
pub use game::{Catalog, GameRules, ProgressionState, SessionId, ProgressionError};
pub use network::{SessionManager, SessionError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
