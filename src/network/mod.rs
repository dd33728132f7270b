//! Network Layer
//!
//! Sessions, persistence and the WebSocket server.
//! This layer is **non-deterministic** - every economic decision runs through `game/`.

pub mod protocol;
pub mod store;
pub mod session;
pub mod server;

pub use protocol::{ClientMessage, ServerMessage, ErrorCode, UpgradeView};
pub use store::{SessionStore, SessionRecord, MemoryStore, JsonFileStore, StoreError};
pub use session::{SessionManager, SessionError};
pub use server::{GameServer, ServerConfig, GameServerError, dispatch};
