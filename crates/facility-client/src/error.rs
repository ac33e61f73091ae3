//! Client error types.

use std::fmt;

use facility_protocol::{ProtocolError, Status};
use facility_server::ServerError;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client.
#[derive(Debug)]
pub enum ClientError {
    /// Configuration error.
    Config(String),
    /// Invalid command-line arguments.
    Usage(String),
    /// IO error.
    Io(std::io::Error),
    /// Could not resolve or reach the server.
    Connection(String),
    /// Undecodable datagram.
    Protocol(ProtocolError),
    /// No reply after all retransmissions.
    Timeout { attempts: u32 },
    /// The server answered with a failure status.
    Server(Status),
    /// Error from the embedded server.
    Serve(ServerError),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {}", msg),
            Self::Usage(msg) => write!(f, "invalid arguments: {}", msg),
            Self::Io(err) => write!(f, "IO error: {}", err),
            Self::Connection(msg) => write!(f, "connection error: {}", msg),
            Self::Protocol(err) => write!(f, "protocol error: {}", err),
            Self::Timeout { attempts } => {
                write!(f, "timeout: no reply after {} attempt(s)", attempts)
            }
            Self::Server(status) => write!(f, "server error: {}", status),
            Self::Serve(err) => write!(f, "server failed: {}", err),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Protocol(err) => Some(err),
            Self::Serve(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<ProtocolError> for ClientError {
    fn from(err: ProtocolError) -> Self {
        Self::Protocol(err)
    }
}

impl From<ServerError> for ClientError {
    fn from(err: ServerError) -> Self {
        Self::Serve(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            ClientError::Timeout { attempts: 4 }.to_string(),
            "timeout: no reply after 4 attempt(s)"
        );
        assert_eq!(
            ClientError::Server(Status::UnknownFacility).to_string(),
            format!("server error: {}", Status::UnknownFacility)
        );
        assert_eq!(
            ClientError::Config("bad".into()).to_string(),
            "configuration error: bad"
        );
    }

    #[test]
    fn protocol_error_has_source() {
        let err = ClientError::from(ProtocolError::UnknownOpcode(9));
        assert!(std::error::Error::source(&err).is_some());
    }
}
