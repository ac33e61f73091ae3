//! Server error types.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can stop the server. Per-request failures never surface here;
/// they become status codes in the reply.
#[derive(Debug, Error)]
pub enum ServerError {
    /// IO error on the socket.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The UDP socket could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// Protocol error while encoding a reply.
    #[error("Protocol error: {0}")]
    Protocol(#[from] facility_protocol::ProtocolError),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl ServerError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a bind error.
    pub fn bind(addr: SocketAddr, source: io::Error) -> Self {
        Self::Bind { addr, source }
    }
}
