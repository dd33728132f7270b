//! WebSocket Game Server
//!
//! Async WebSocket server. Each text frame carries one JSON
//! [`ClientMessage`] and gets exactly one [`ServerMessage`] back.
//! Background tasks flush the session store and sweep expired events.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock, broadcast};
use tokio::time::interval;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{info, warn, error, debug, instrument};

use crate::game::state::SessionId;
use crate::network::protocol::{
    ClientMessage, ServerMessage, ServerError, ErrorCode, UpgradeView, SessionInfo, SyncInfo,
    PurchaseInfo, PrestigeInfo, ScoreInfo, EventRewardInfo, ResetInfo,
};
use crate::network::session::SessionManager;
use crate::network::store::StoreError;

/// Idle connections are dropped after this long without a message.
const IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Snapshot file; `None` keeps sessions in memory only.
    pub data_file: Option<PathBuf>,
    /// How often the session store is flushed.
    pub snapshot_interval: Duration,
    /// Loaded sessions untouched for this long are dropped from memory.
    pub session_idle_ttl: Duration,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            data_file: Some(PathBuf::from("sessions.json")),
            snapshot_interval: Duration::from_secs(30),
            session_idle_ttl: Duration::from_secs(30 * 60),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `BIND_ADDR`, `DATA_FILE`, `MAX_CONNECTIONS`,
    /// `SNAPSHOT_INTERVAL_SECS` and `SESSION_IDLE_TTL_SECS`. An empty `DATA_FILE` disables
    /// persistence; unparsable values are ignored with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: parse_or("BIND_ADDR", lookup("BIND_ADDR"), defaults.bind_addr),
            max_connections: parse_or("MAX_CONNECTIONS", lookup("MAX_CONNECTIONS"), defaults.max_connections),
            data_file: match lookup("DATA_FILE") {
                Some(path) if path.trim().is_empty() => None,
                Some(path) => Some(PathBuf::from(path)),
                None => defaults.data_file,
            },
            snapshot_interval: Duration::from_secs(parse_or(
                "SNAPSHOT_INTERVAL_SECS",
                lookup("SNAPSHOT_INTERVAL_SECS"),
                defaults.snapshot_interval.as_secs(),
            ).max(1)),
            session_idle_ttl: Duration::from_secs(parse_or(
                "SESSION_IDLE_TTL_SECS",
                lookup("SESSION_IDLE_TTL_SECS"),
                defaults.session_idle_ttl.as_secs(),
            )),
            version: defaults.version,
        }
    }
}

fn parse_or<T: FromStr>(key: &str, value: Option<String>, default: T) -> T {
    match value {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring invalid {}={:?}", key, raw);
            default
        }),
        None => default,
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Connection limit reached.
    #[error("Connection limit reached")]
    ConnectionLimitReached,

    /// Session store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Connected client state.
struct ConnectedClient {
    /// Last session the client initialised.
    session_id: Option<SessionId>,
    /// Connection time.
    connected_at: Instant,
    /// Last activity.
    last_activity: Instant,
}

type Clients = Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>;

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Session manager.
    sessions: Arc<SessionManager>,
    /// Connected clients.
    clients: Clients,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server over `sessions`.
    pub fn new(config: ServerConfig, sessions: Arc<SessionManager>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            sessions,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Run the server until [`GameServer::shutdown`] is called.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Game server listening on {}", self.config.bind_addr);

        let snapshot_sessions = self.sessions.clone();
        let snapshot_period = self.config.snapshot_interval;
        let idle_ttl = chrono::Duration::from_std(self.config.session_idle_ttl)
            .unwrap_or_else(|_| chrono::Duration::days(365));
        let snapshot_handle = tokio::spawn(async move {
            Self::run_snapshot_loop(snapshot_sessions, snapshot_period, idle_ttl).await;
        });

        let cleanup_clients = self.clients.clone();
        let cleanup_handle = tokio::spawn(async move {
            Self::run_cleanup_loop(cleanup_clients).await;
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.clients.read().await.len();
                            if clients_count >= self.config.max_connections {
                                warn!("Rejecting {}: {}", addr, GameServerError::ConnectionLimitReached);
                                tokio::spawn(reject_connection(stream, addr));
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        snapshot_handle.abort();
        cleanup_handle.abort();

        self.sessions.flush()?;
        info!("Final snapshot written");
        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let clients = self.clients.clone();
        let sessions = self.sessions.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);

            {
                let mut clients = clients.write().await;
                clients.insert(addr, ConnectedClient {
                    session_id: None,
                    connected_at: Instant::now(),
                    last_activity: Instant::now(),
                });
            }

            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let client_msg = match ClientMessage::from_json(&text) {
                                    Ok(m) => m,
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", addr, e);
                                        let _ = msg_tx.send(error_message(
                                            ErrorCode::InvalidMessage,
                                            "Invalid message format",
                                        )).await;
                                        continue;
                                    }
                                };

                                let response = dispatch(&sessions, client_msg, Utc::now()).await;

                                {
                                    let mut clients = clients.write().await;
                                    if let Some(client) = clients.get_mut(&addr) {
                                        client.last_activity = Instant::now();
                                        if let ServerMessage::Session(info) = &response {
                                            client.session_id = Some(SessionId::from(info.session_id.as_str()));
                                        }
                                    }
                                }

                                if msg_tx.send(response).await.is_err() {
                                    break;
                                }
                            }
                            Some(Ok(Message::Binary(_))) => {
                                let _ = msg_tx.send(error_message(
                                    ErrorCode::InvalidMessage,
                                    "Binary frames are not supported",
                                )).await;
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        }).await;
                        break;
                    }
                }
            }

            // Let queued responses drain before closing
            drop(msg_tx);
            let _ = sender_task.await;

            if let Some(client) = clients.write().await.remove(&addr) {
                info!(
                    session = ?client.session_id.as_ref().map(|s| s.to_string()),
                    connected_secs = client.connected_at.elapsed().as_secs(),
                    "Client {} cleaned up",
                    addr
                );
            }
        });
    }

    /// Evict idle sessions, flush the store and sweep expired events
    /// periodically.
    async fn run_snapshot_loop(sessions: Arc<SessionManager>, period: Duration, idle_ttl: chrono::Duration) {
        let mut interval = interval(period);

        loop {
            interval.tick().await;

            sessions.evict_idle(Utc::now(), idle_ttl).await;

            if let Err(e) = sessions.flush() {
                warn!("Snapshot failed, continuing in memory: {}", e);
            }

            let purged = sessions.purge_expired_events(Utc::now()).await;
            if purged > 0 {
                debug!(purged, "Expired events swept");
            }
        }
    }

    /// Forget clients that went quiet.
    async fn run_cleanup_loop(clients: Clients) {
        let mut interval = interval(Duration::from_secs(60));

        loop {
            interval.tick().await;

            let now = Instant::now();
            let mut clients = clients.write().await;
            let before = clients.len();
            clients.retain(|_, c| now.duration_since(c.last_activity) <= IDLE_TIMEOUT);
            let removed = before - clients.len();
            if removed > 0 {
                info!("Removed {} idle clients", removed);
            }
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Get loaded session count.
    pub async fn session_count(&self) -> usize {
        self.sessions.session_count().await
    }
}

fn error_message(code: ErrorCode, message: &str) -> ServerMessage {
    ServerMessage::Error(ServerError { code, message: message.to_string() })
}

/// Reply sent to a connection turned away at the limit.
fn overloaded_message() -> ServerMessage {
    error_message(ErrorCode::ServerOverloaded, &GameServerError::ConnectionLimitReached.to_string())
}

/// Complete the handshake only to report the limit, then close.
async fn reject_connection(stream: TcpStream, addr: SocketAddr) {
    let mut ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!("Handshake with rejected {} failed: {}", addr, e);
            return;
        }
    };
    if let Ok(text) = overloaded_message().to_json() {
        let _ = ws.send(Message::Text(text)).await;
    }
    let _ = ws.close(None).await;
}

/// Run one client request against the session manager.
pub async fn dispatch(sessions: &SessionManager, msg: ClientMessage, now: DateTime<Utc>) -> ServerMessage {
    let catalog = sessions.catalog();
    let rules = sessions.rules();

    match msg {
        ClientMessage::Init { session_id } => {
            match sessions.create_or_load(session_id.as_deref(), now).await {
                Ok(snapshot) => ServerMessage::Session(SessionInfo {
                    session_id: snapshot.state.session_id.to_string(),
                    created: snapshot.created,
                    upgrades: UpgradeView::list(&snapshot.state, catalog, rules),
                    achievements: snapshot.state.achievements.clone(),
                    events: snapshot.events,
                    state: snapshot.state,
                }),
                Err(e) => e.into(),
            }
        }
        ClientMessage::Sync { session_id, pending_clicks, declared } => {
            match sessions.sync(&session_id, pending_clicks, declared, now).await {
                Ok(result) => ServerMessage::Synced(SyncInfo {
                    state: result.state,
                    clicks: result.outcome.clicks,
                    click_earnings: result.outcome.click_earnings,
                    idle_earnings: result.outcome.idle_earnings,
                    unlocked: result.outcome.unlocked,
                    events: result.events,
                    leaderboard: result.leaderboard,
                    yields_corrected: result.corruption.is_some(),
                }),
                Err(e) => e.into(),
            }
        }
        ClientMessage::Purchase { session_id, upgrade_id } => {
            match sessions.purchase(&session_id, &upgrade_id, now).await {
                Ok(result) => ServerMessage::Purchased(PurchaseInfo {
                    upgrade_id: result.outcome.upgrade_id,
                    cost: result.outcome.cost,
                    upgrades: UpgradeView::list(&result.state, catalog, rules),
                    state: result.state,
                    leaderboard: result.leaderboard,
                }),
                Err(e) => e.into(),
            }
        }
        ClientMessage::Prestige { session_id } => {
            match sessions.prestige(&session_id, now).await {
                Ok(result) => ServerMessage::Prestiged(PrestigeInfo {
                    prestige_gained: result.outcome.prestige_gained,
                    upgrades: UpgradeView::list(&result.state, catalog, rules),
                    state: result.state,
                }),
                Err(e) => e.into(),
            }
        }
        ClientMessage::SubmitScore { session_id, name } => {
            match sessions.submit_score(&session_id, &name, now).await {
                Ok(result) => ServerMessage::ScoreSubmitted(ScoreInfo {
                    name: result.name,
                    score: result.verdict.score,
                    accepted: result.verdict.accepted,
                    leaderboard: result.leaderboard,
                }),
                Err(e) => e.into(),
            }
        }
        ClientMessage::ClickEvent { session_id, event_id } => {
            match sessions.click_event(&session_id, &event_id, now).await {
                Ok(result) => ServerMessage::EventClaimed(EventRewardInfo {
                    reward: result.reward,
                    state: result.state,
                }),
                Err(e) => e.into(),
            }
        }
        ClientMessage::Reset { session_id } => {
            match sessions.reset(&session_id, now).await {
                Ok(state) => ServerMessage::ResetDone(ResetInfo {
                    upgrades: UpgradeView::list(&state, catalog, rules),
                    state,
                }),
                Err(e) => e.into(),
            }
        }
        ClientMessage::Validate { session_id } => {
            match sessions.validate(&session_id, now).await {
                Ok(report) => ServerMessage::Validation(report),
                Err(e) => e.into(),
            }
        }
        ClientMessage::Audit => match sessions.validate_all(now).await {
            Ok(audit) => ServerMessage::Audit {
                total: audit.total,
                valid: audit.valid,
                invalid: audit.invalid,
            },
            Err(e) => {
                error!("Audit failed: {}", e);
                error_message(ErrorCode::InternalError, "Audit failed")
            }
        },
        ClientMessage::Leaderboard => ServerMessage::Leaderboard {
            entries: sessions.leaderboard().await,
        },
        ClientMessage::Ping { timestamp } => ServerMessage::Pong {
            timestamp,
            server_time: now.timestamp_millis().max(0) as u64,
        },
    }
}
