//! # causerie-server
//!
//! Realtime coordination server for Causerie chat clients.
//!
//! This binary provides:
//! - **WebSocket gateway** (`/ws`): authenticated sessions, presence
//!   broadcasts, room fan-out, typing indicators, and call signaling
//! - **REST API** (axum) for conversations, messages, read receipts, and
//!   chat requests
//! - **Ed25519 token verification** against the identity service's public
//!   key, so credential checks never leave the process

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use causerie_core::conversations::ConversationService;
use causerie_core::identity::{IdentityVerifier, RejectAllVerifier, SignedTokenVerifier};
use causerie_core::messages::MessagePipeline;
use causerie_core::requests::ChatRequestService;
use causerie_core::signaling::SignalingRelay;
use causerie_core::ConnectionRegistry;
use causerie_store::{MemoryStore, RecordStore};

use causerie_server::api::{self, AppState};
use causerie_server::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,causerie_server=debug")),
        )
        .init();

    info!(
        "Starting Causerie coordination server v{}",
        env!("CARGO_PKG_VERSION")
    );

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(
        instance = %config.instance_name,
        addr = %config.http_addr,
        queue_depth = config.session_queue_depth,
        "Loaded configuration"
    );

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------

    // Credential verification against the identity service's public key.
    // Without a key every token is rejected and the server is effectively
    // read-only on /health.
    let verifier: Arc<dyn IdentityVerifier> = match config.identity_pubkey {
        Some(key) => match SignedTokenVerifier::new(&key) {
            Some(v) => Arc::new(v),
            None => {
                warn!("IDENTITY_PUBKEY is not a valid Ed25519 key, rejecting all tokens");
                Arc::new(RejectAllVerifier)
            }
        },
        None => {
            warn!("IDENTITY_PUBKEY not set, rejecting all tokens");
            Arc::new(RejectAllVerifier)
        }
    };

    // In-memory record store. Swap in a durable RecordStore implementation
    // here to persist across restarts.
    let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());

    let registry = Arc::new(ConnectionRegistry::new(
        verifier.clone(),
        config.session_queue_depth,
    ));

    let conversations = ConversationService::new(store.clone());
    let messages = MessagePipeline::new(store.clone(), registry.clone());
    let requests = ChatRequestService::new(store.clone(), registry.clone(), conversations.clone());
    let relay = SignalingRelay::new(registry.clone());

    let http_addr = config.http_addr;
    let app_state = AppState {
        store,
        registry,
        verifier,
        conversations,
        messages,
        requests,
        relay,
        config: Arc::new(config),
    };

    // -----------------------------------------------------------------------
    // 4. Run the HTTP/WebSocket server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
