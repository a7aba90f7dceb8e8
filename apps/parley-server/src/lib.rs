//! Parley Server - newline-delimited JSON transport for the chat engine
//!
//! Every TCP connection starts with a handshake line carrying a token. Once
//! accepted, each inbound line is a request answered by exactly one reply
//! line, and pushes from the engine are interleaved as they happen.

pub mod connection;

use anyhow::{Context, Result};
use parley_core::{ChatService, EngineConfig, Gateway, Hub, StoreOracle, TokenAuthenticator};
use parley_store::{Store, StoreConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

pub use connection::{handle_connection, HandshakeFrame, ReplyFrame, WelcomeFrame};

/// Everything needed to stand up a gateway
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub engine: EngineConfig,
}

/// Open the store and wire the engine together
pub async fn build_gateway(config: &ServerConfig) -> Result<Gateway> {
    let store = Store::open(StoreConfig {
        db_path: config.db_path.clone(),
    })
    .await
    .with_context(|| format!("Failed to open database {}", config.db_path.display()))?;

    let auth = TokenAuthenticator::new(&config.jwt_secret).context("Invalid JWT secret")?;
    let oracle = Arc::new(StoreOracle::new(&store));
    let service = Arc::new(ChatService::new(
        store,
        Arc::new(Hub::new()),
        oracle,
        config.engine.clone(),
    ));

    Ok(Gateway::new(service, Arc::new(auth)))
}

/// Accept connections until the listener fails
pub async fn serve(listener: TcpListener, gateway: Gateway) -> Result<()> {
    let addr = listener.local_addr().context("Listener has no local address")?;
    info!("Listening on {}", addr);

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Failed to accept connection: {}", e);
                continue;
            }
        };

        let gateway = gateway.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, gateway).await {
                warn!("Connection from {} ended with error: {:#}", peer, e);
            }
        });
    }
}
