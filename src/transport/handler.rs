//! Per-connection handler
//!
//! One handler task owns each upgraded socket. It registers the connection,
//! spawns a writer task that drains the connection's outbound queue into the
//! socket, and runs the receive loop. The connection moves through
//! `Open -> Closing -> Closed`; any of a close frame, a read error, the end of
//! the stream, a writer failure or process shutdown starts `Closing`. Only
//! once `Closed` is the entry removed from the registry, and only here.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tungstenite::protocol::CloseFrame;
use tungstenite::protocol::Message as WsMessage;
use tungstenite::protocol::frame::coding::CloseCode;

use crate::broker::ConnectionRegistry;
use crate::client::{Connection, ConnectionId, ConnectionState};
use crate::config::BrokerSettings;
use crate::transport::message::ClientCommand;

/// Why the receive loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer sent a close frame.
    Peer,
    /// Read error or end of stream.
    Transport,
    /// Shutdown, a failed write, or a failed broadcast send.
    Local,
}

/// Run one connection to completion. Returns the connection id once the
/// entry has been removed from `registry`.
pub async fn handle_connection<S>(
    ws_stream: WebSocketStream<S>,
    registry: Arc<ConnectionRegistry>,
    settings: BrokerSettings,
    shutdown: CancellationToken,
) -> Option<ConnectionId>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (ws_sender, mut ws_receiver) = ws_stream.split();
    let (tx, rx) = mpsc::channel::<WsMessage>(settings.outbound_buffer.max(1));
    let close_signal = shutdown.child_token();
    let conn = Arc::new(Connection::new(tx.clone(), close_signal.clone()));
    let conn_id = conn.id.clone();

    if let Err(e) = registry.add(Arc::clone(&conn)) {
        warn!(conn_id = %conn_id, error = %e, "rejecting connection");
        return None;
    }
    info!(conn_id = %conn_id, "connection opened");

    let mut writer = tokio::spawn(write_loop(
        ws_sender,
        rx,
        conn_id.clone(),
        close_signal.clone(),
    ));

    let reason = loop {
        tokio::select! {
            frame = ws_receiver.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => apply_frame(&conn, text.as_str()),
                Some(Ok(WsMessage::Close(_))) => break CloseReason::Peer,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(conn_id = %conn_id, error = %e, "read failed");
                    break CloseReason::Transport;
                }
                None => break CloseReason::Transport,
            },
            () = close_signal.cancelled() => break CloseReason::Local,
        }
    };

    conn.set_state(ConnectionState::Closing);
    close_handshake(
        &mut ws_receiver,
        &tx,
        &writer,
        reason,
        shutdown.is_cancelled(),
        settings.close_timeout(),
    )
    .await;
    drop(tx);

    if tokio::time::timeout(settings.close_timeout(), &mut writer)
        .await
        .is_err()
    {
        warn!(conn_id = %conn_id, "writer did not finish in time, aborting");
        writer.abort();
    }

    conn.set_state(ConnectionState::Closed);
    registry.remove(&conn_id);
    info!(conn_id = %conn_id, ?reason, "connection closed");
    Some(conn_id)
}

fn apply_frame(conn: &Connection, text: &str) {
    debug!(conn_id = %conn.id, frame = %text.chars().take(100).collect::<String>(), "received");
    match ClientCommand::parse(text) {
        ClientCommand::Subscribe(topic) => {
            if conn.subscribe(&topic) {
                info!(conn_id = %conn.id, topic = %topic, "client subscribed to topic");
            } else {
                debug!(conn_id = %conn.id, topic = %topic, "already subscribed");
            }
        }
        ClientCommand::Ignore => {}
    }
}

/// Queue our close frame and, when we started the close, give the peer a
/// bounded window to answer it.
async fn close_handshake<S>(
    ws_receiver: &mut SplitStream<WebSocketStream<S>>,
    tx: &mpsc::Sender<WsMessage>,
    writer: &JoinHandle<()>,
    reason: CloseReason,
    shutting_down: bool,
    timeout: Duration,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if writer.is_finished() {
        return;
    }

    let frame = shutting_down.then(|| CloseFrame {
        code: CloseCode::Away,
        reason: "server shutting down".into(),
    });
    let queued = matches!(
        tokio::time::timeout(timeout, tx.send(WsMessage::Close(frame))).await,
        Ok(Ok(()))
    );

    if queued && reason == CloseReason::Local {
        let _ = tokio::time::timeout(timeout, async {
            while let Some(Ok(msg)) = ws_receiver.next().await {
                if msg.is_close() {
                    break;
                }
            }
        })
        .await;
    }
}

/// Forward queued frames to the socket. Stops after writing a close frame,
/// or on the first write error, which also asks the handler to close.
async fn write_loop<S>(
    mut ws_sender: SplitSink<WebSocketStream<S>, WsMessage>,
    mut rx: mpsc::Receiver<WsMessage>,
    conn_id: ConnectionId,
    close_signal: CancellationToken,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(msg) = rx.recv().await {
        let closing = msg.is_close();
        if let Err(e) = ws_sender.send(msg).await {
            if !closing {
                warn!(conn_id = %conn_id, error = %e, "failed to send message");
                close_signal.cancel();
            }
            break;
        }
        if closing {
            break;
        }
    }
    let _ = ws_sender.close().await;
    debug!(conn_id = %conn_id, "send loop closed");
}
