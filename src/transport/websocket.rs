//! WebSocket transport
//!
//! Accepts TCP connections, performs the WebSocket upgrade on the configured
//! path and hands each upgraded socket to [`handle_connection`]. On shutdown
//! the accept loop stops, and the server returns once every connection
//! handler has finished its close handshake.
//! Requests without `Upgrade: websocket` are answered `400 Bad Request`.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_tungstenite::accept_hdr_async;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::http::StatusCode;

use crate::broker::ConnectionRegistry;
use crate::config::BrokerSettings;
use crate::transport::handler::handle_connection;
use crate::transport::rewind::{Rewind, is_upgrade_request, read_request_head};
use crate::utils::error::ServerError;

/// Everything a connection handler needs, shared by all accepted sockets.
#[derive(Debug, Clone)]
pub struct ServerContext {
    pub registry: Arc<ConnectionRegistry>,
    pub broker: BrokerSettings,
    pub path: String,
}

impl ServerContext {
    pub fn new(registry: Arc<ConnectionRegistry>, broker: BrokerSettings, path: String) -> Self {
        Self {
            registry,
            broker,
            path,
        }
    }
}

pub async fn bind(addr: &str) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })
}

pub async fn start_websocket_server(
    listener: TcpListener,
    ctx: ServerContext,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    let local = listener.local_addr()?;
    info!("WebSocket server listening on ws://{local}{}", ctx.path);

    let tracker = TaskTracker::new();
    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let ctx = ctx.clone();
                    let shutdown = shutdown.clone();
                    tracker.spawn(async move {
                        accept_connection(stream, peer.to_string(), ctx, shutdown).await;
                    });
                }
                Err(e) => warn!(error = %e, "failed to accept connection"),
            },
        }
    }

    tracker.close();
    info!(open = tracker.len(), "stopped accepting, draining connections");
    tracker.wait().await;
    info!("WebSocket server stopped");
    Ok(())
}

const BAD_REQUEST: &[u8] =
    b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

/// Upgrade one raw stream and run its handler to completion.
pub async fn accept_connection<S>(
    mut stream: S,
    peer: String,
    ctx: ServerContext,
    shutdown: CancellationToken,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let head = tokio::select! {
        () = shutdown.cancelled() => return,
        head = read_request_head(&mut stream) => head,
    };
    let head = match head {
        Ok(head) => head,
        Err(e) => {
            warn!(peer = %peer, error = %e, "failed to read request");
            return;
        }
    };
    if !is_upgrade_request(&head) {
        debug!(peer = %peer, "not a WebSocket upgrade, answering 400");
        if let Err(e) = stream.write_all(BAD_REQUEST).await {
            debug!(peer = %peer, error = %e, "failed to write 400 response");
        }
        let _ = stream.shutdown().await;
        return;
    }

    let path = ctx.path.clone();
    let stream = Rewind::new(head, stream);
    let ws_stream = match accept_hdr_async(stream, move |req: &Request, resp: Response| {
        check_path(&path, req, resp)
    })
    .await
    {
        Ok(ws) => ws,
        Err(e) => {
            warn!(peer = %peer, error = %e, "WebSocket handshake error");
            return;
        }
    };
    debug!(peer = %peer, "handshake complete");

    handle_connection(ws_stream, ctx.registry, ctx.broker, shutdown).await;
}

/// Only the configured path is upgraded; everything else gets a 404.
pub fn check_path(
    expected: &str,
    req: &Request,
    resp: Response,
) -> Result<Response, ErrorResponse> {
    let path = req.uri().path();
    if path == expected {
        return Ok(resp);
    }
    let mut err = ErrorResponse::new(Some(format!("no WebSocket endpoint at {path}")));
    *err.status_mut() = StatusCode::NOT_FOUND;
    Err(err)
}
