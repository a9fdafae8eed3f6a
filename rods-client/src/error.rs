//! Client error types.

use crate::config::ConfigError;
use rods_protocol::ErrorKind;
use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("protocol error: {0}")]
    Protocol(#[from] rods_protocol::ProtocolError),

    #[error("not connected")]
    NotConnected,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("request timeout")]
    Timeout,

    #[error("connection unusable after an earlier transport failure")]
    Poisoned,

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("server error: {kind} ({code})")]
    Remote {
        kind: ErrorKind,
        code: i32,
        messages: Vec<String>,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("short write: server accepted {written} of {expected} bytes")]
    ShortWrite { expected: usize, written: usize },

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl ClientError {
    /// Builds a remote error from a negative status code.
    pub fn remote(code: i32, messages: Vec<String>) -> Self {
        ClientError::Remote {
            kind: ErrorKind::from_code(code),
            code,
            messages,
        }
    }

    /// Returns the server error kind, if this is a remote error.
    pub fn remote_kind(&self) -> Option<ErrorKind> {
        match self {
            ClientError::Remote { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Returns whether the connection can no longer be used.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ClientError::Io(_)
                | ClientError::Connect { .. }
                | ClientError::ConnectionClosed
                | ClientError::Timeout
                | ClientError::Poisoned
                | ClientError::NotConnected
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }
}
