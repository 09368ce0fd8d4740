//! Server configuration loaded from environment variables.
//!
//! All settings have defaults so the server can start with zero
//! configuration for local development (though without `IDENTITY_PUBKEY`
//! every credential token is rejected).

use std::net::SocketAddr;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP/WebSocket server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// Ed25519 public key of the identity service (hex-encoded, 64 chars).
    /// Env: `IDENTITY_PUBKEY`
    /// Default: unset -- all tokens are rejected.
    pub identity_pubkey: Option<[u8; 32]>,

    /// Bound of each session's outbound event queue.
    /// Env: `SESSION_QUEUE_DEPTH`
    /// Default: `64`
    pub session_queue_depth: usize,

    /// Human-readable name for this server instance.
    /// Env: `INSTANCE_NAME`
    /// Default: `"Causerie"`
    pub instance_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], 8080).into(),
            identity_pubkey: None,
            session_queue_depth: causerie_core::registry::DEFAULT_QUEUE_DEPTH,
            instance_name: "Causerie".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "invalid HTTP_ADDR, using default");
            }
        }

        if let Ok(hex_key) = std::env::var("IDENTITY_PUBKEY") {
            match parse_hex_pubkey(&hex_key) {
                Ok(key) => config.identity_pubkey = Some(key),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "invalid IDENTITY_PUBKEY, all tokens will be rejected"
                    );
                }
            }
        }

        if let Ok(val) = std::env::var("SESSION_QUEUE_DEPTH") {
            if let Ok(n) = val.parse::<usize>() {
                if n > 0 {
                    config.session_queue_depth = n;
                }
            }
        }

        if let Ok(name) = std::env::var("INSTANCE_NAME") {
            config.instance_name = name;
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }
}

/// Parse a 64-character hex string into a 32-byte array.
fn parse_hex_pubkey(input: &str) -> Result<[u8; 32], String> {
    let input = input.trim();
    if input.len() != 64 {
        return Err(format!("expected 64 hex chars, got {}", input.len()));
    }

    let bytes = hex::decode(input).map_err(|e| e.to_string())?;
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Ok(key)
}
