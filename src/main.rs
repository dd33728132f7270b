//! Idle Economy Server
//!
//! Loads sessions from the snapshot file, serves the WebSocket protocol and
//! writes a final snapshot on Ctrl-C.

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use idle_economy::{
    Catalog, GameRules, SessionManager, VERSION,
    network::{GameServer, JsonFileStore, MemoryStore, ServerConfig, SessionStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env();
    info!("Idle Economy Server v{}", VERSION);
    info!("Bind: {}, max connections: {}", config.bind_addr, config.max_connections);

    let store: Arc<dyn SessionStore> = match &config.data_file {
        Some(path) => match JsonFileStore::open(path) {
            Ok(store) => Arc::new(store),
            Err(e) => {
                warn!("Cannot open {}: {}; sessions will not be persisted", path.display(), e);
                Arc::new(MemoryStore::new())
            }
        },
        None => {
            info!("No data file configured; sessions kept in memory");
            Arc::new(MemoryStore::new())
        }
    };

    let sessions = Arc::new(SessionManager::new(store, Arc::new(Catalog::standard()), GameRules::default()));
    match sessions.validate_all(Utc::now()).await {
        Ok(audit) if audit.invalid > 0 => warn!("{} of {} stored sessions failed validation", audit.invalid, audit.total),
        Ok(audit) => info!("All {} stored sessions pass validation", audit.total),
        Err(e) => warn!("Startup audit skipped: {}", e),
    }
    let server = Arc::new(GameServer::new(config, sessions));

    let signal_server = server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received");
            signal_server.shutdown();
        }
    });

    server.run().await.context("server stopped with an error")?;
    info!("Server stopped");
    Ok(())
}
