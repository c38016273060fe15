//! Broadcast engine
//!
//! `BroadcastEngine` fans a text message out to the registry:
//! - it snapshots the registry, then keeps the connections that are `Open`
//!   and, when a topic filter is given, subscribed to that topic
//! - every kept connection gets exactly one send attempt, and all attempts
//!   run concurrently
//! - each attempt resolves on its own; a failure is logged, recorded in the
//!   returned `BroadcastReport`, and the failing connection is told to close
//!   so its handler reaps it. Sibling sends are never affected.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::broker::message::Message;
use crate::broker::registry::ConnectionRegistry;
use crate::client::ConnectionId;
use crate::utils::error::SendError;

/// Outcome of one broadcast.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Connections that matched the filter and got a send attempt.
    pub attempted: usize,
    pub delivered: usize,
    pub failed: Vec<(ConnectionId, SendError)>,
}

#[derive(Debug, Clone)]
pub struct BroadcastEngine {
    registry: Arc<ConnectionRegistry>,
    send_timeout: Duration,
}

impl BroadcastEngine {
    pub fn new(registry: Arc<ConnectionRegistry>, send_timeout: Duration) -> Self {
        Self {
            registry,
            send_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Send `message` to every open connection, or only to subscribers of
    /// `topic` when one is given. Returns once every attempt has resolved.
    pub async fn broadcast(&self, message: &str, topic: Option<&str>) -> BroadcastReport {
        let recipients: Vec<_> = self
            .registry
            .snapshot()
            .into_iter()
            .filter(|conn| conn.is_open() && topic.is_none_or(|t| conn.is_subscribed(t)))
            .collect();

        debug!(
            topic = topic.unwrap_or("*"),
            recipients = recipients.len(),
            "broadcasting message"
        );

        let frame = WsMessage::text(message.to_owned());
        let sends = recipients.iter().map(|conn| {
            let frame = frame.clone();
            async move { conn.send(frame, self.send_timeout).await }
        });
        let results = join_all(sends).await;

        let mut report = BroadcastReport {
            attempted: recipients.len(),
            ..BroadcastReport::default()
        };
        for (conn, result) in recipients.iter().zip(results) {
            match result {
                Ok(()) => report.delivered += 1,
                Err(SendError::NotOpen) => {
                    // Closed between the snapshot and the send; its handler is
                    // already tearing it down.
                    debug!(conn_id = %conn.id, "skipped connection that started closing");
                    report.failed.push((conn.id.clone(), SendError::NotOpen));
                }
                Err(e) => {
                    warn!(conn_id = %conn.id, error = %e, "failed to send broadcast");
                    conn.schedule_close();
                    report.failed.push((conn.id.clone(), e));
                }
            }
        }
        report
    }

    pub async fn publish(&self, message: &Message) -> BroadcastReport {
        self.broadcast(&message.payload, message.topic.as_deref())
            .await
    }
}
