//! Error types used within the `tickcast` application.
//!
//! None of these are fatal to the process once the server is running. A
//! `SendError` is isolated to one connection inside a broadcast and a
//! `RegistryError` only surfaces if connection ids ever collide.

use std::time::Duration;

use thiserror::Error;

use crate::client::ConnectionId;

/// Failures raised by the connection registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("connection {0} is already registered")]
    DuplicateId(ConnectionId),
}

/// Failure to hand a frame to a single connection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SendError {
    /// The connection left the `Open` state before the send was issued.
    #[error("connection is not open")]
    NotOpen,

    /// The writer task for the connection is gone.
    #[error("outbound channel closed")]
    Closed,

    /// The outbound queue stayed full for longer than the send timeout.
    #[error("send timed out after {0:?}")]
    Timeout(Duration),
}

/// Start-up and accept-loop failures of the WebSocket server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] config::ConfigError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
