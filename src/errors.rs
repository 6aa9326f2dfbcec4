use std::net::SocketAddr;
use thiserror::Error;

// Gateway error types
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    /// True for errors that are fatal at startup; everything else is local
    /// to a single message or session and the serving loops carry on.
    pub fn is_fatal(&self) -> bool {
        matches!(self, GatewayError::Bind { .. })
    }
}
