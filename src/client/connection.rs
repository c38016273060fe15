//! Connection representation
//!
//! `Connection` models one accepted WebSocket session. It holds the sending
//! side of a bounded per-connection queue drained by the transport's writer
//! task, the lifecycle state, and the connection's subscriptions. The entry
//! is shared through the registry, but only the owning handler changes its
//! state or its subscriptions.

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;
use tungstenite::protocol::Message as WsMessage;
use uuid::Uuid;

use crate::broker::topic::SubscriptionSet;
use crate::utils::error::SendError;

pub type ConnectionId = String;

/// Lifecycle of a connection. Transitions only move forward.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open = 0,
    Closing = 1,
    Closed = 2,
}

impl ConnectionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Open,
            1 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub connected_at: Instant,
    sender: Sender<WsMessage>,
    state: AtomicU8,
    subscriptions: SubscriptionSet,
    close_signal: CancellationToken,
}

impl Connection {
    /// Create an open connection with a fresh `client-<uuid>` id.
    pub fn new(sender: Sender<WsMessage>, close_signal: CancellationToken) -> Self {
        Self::with_id(format!("client-{}", Uuid::new_v4()), sender, close_signal)
    }

    pub fn with_id(
        id: impl Into<ConnectionId>,
        sender: Sender<WsMessage>,
        close_signal: CancellationToken,
    ) -> Self {
        Self {
            id: id.into(),
            connected_at: Instant::now(),
            sender,
            state: AtomicU8::new(ConnectionState::Open as u8),
            subscriptions: SubscriptionSet::new(),
            close_signal,
        }
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Move the connection forward to `next`. Backward moves are ignored so
    /// a `Closed` entry never reopens.
    pub fn set_state(&self, next: ConnectionState) {
        self.state.fetch_max(next as u8, Ordering::AcqRel);
    }

    pub fn subscriptions(&self) -> &SubscriptionSet {
        &self.subscriptions
    }

    /// Record interest in `topic`. Returns `false` if it was already held.
    pub fn subscribe(&self, topic: &str) -> bool {
        self.subscriptions.insert(topic)
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.subscriptions.contains(topic)
    }

    /// Queue a frame for the writer task, waiting at most `timeout` for room.
    pub async fn send(&self, frame: WsMessage, timeout: Duration) -> Result<(), SendError> {
        if !self.is_open() {
            return Err(SendError::NotOpen);
        }
        match tokio::time::timeout(timeout, self.sender.send(frame)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(SendError::Closed),
            Err(_) => Err(SendError::Timeout(timeout)),
        }
    }

    /// Ask the owning handler to tear this connection down.
    pub fn schedule_close(&self) {
        self.close_signal.cancel();
    }

    pub fn close_signal(&self) -> &CancellationToken {
        &self.close_signal
    }
}
