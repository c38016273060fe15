use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::{WebSocketStream, client_async, connect_async};
use tokio_util::sync::CancellationToken;
use tungstenite::handshake::server::{Request, Response};
use tungstenite::http::StatusCode;
use tungstenite::protocol::Message as WsMessage;
use tungstenite::protocol::frame::coding::CloseCode;

use super::message::ClientCommand;
use super::rewind::{Rewind, is_upgrade_request};
use super::websocket::check_path;
use super::{ServerContext, accept_connection, bind, start_websocket_server};
use crate::broker::{BroadcastEngine, ConnectionRegistry};
use crate::client::Connection;
use crate::config::Settings;
use crate::publisher::{TimePublisher, run_publisher};

fn context() -> ServerContext {
    let mut broker = Settings::default().broker;
    broker.close_timeout_ms = 500;
    ServerContext::new(Arc::new(ConnectionRegistry::new()), broker, "/".to_string())
}

async fn connect(
    ctx: &ServerContext,
    shutdown: &CancellationToken,
) -> (WebSocketStream<DuplexStream>, JoinHandle<()>) {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let server = tokio::spawn(accept_connection(
        server_io,
        "duplex".to_string(),
        ctx.clone(),
        shutdown.clone(),
    ));
    let (ws, _) = client_async("ws://localhost/", client_io)
        .await
        .expect("WebSocket handshake failed");
    (ws, server)
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn only_connection(ctx: &ServerContext) -> Arc<Connection> {
    let snapshot = ctx.registry.snapshot();
    assert_eq!(snapshot.len(), 1);
    Arc::clone(&snapshot[0])
}

async fn send_text(ws: &mut WebSocketStream<DuplexStream>, text: &str) {
    ws.send(WsMessage::text(text.to_string()))
        .await
        .expect("Failed to send frame");
}

async fn next_text(ws: &mut WebSocketStream<DuplexStream>) -> String {
    let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("no frame in time")
        .expect("stream ended")
        .expect("read failed");
    msg.into_text().expect("text frame").to_string()
}

#[test]
fn test_parse_subscribe() {
    assert_eq!(
        ClientCommand::parse("SUBSCRIBE:TIME"),
        ClientCommand::Subscribe("TIME".to_string())
    );
    assert_eq!(
        ClientCommand::parse("SUBSCRIBE:  prices \n"),
        ClientCommand::Subscribe("prices".to_string())
    );
}

#[test]
fn test_parse_keeps_everything_after_first_colon() {
    assert_eq!(
        ClientCommand::parse("SUBSCRIBE:a:b"),
        ClientCommand::Subscribe("a:b".to_string())
    );
}

#[test]
fn test_parse_ignores_everything_else() {
    assert_eq!(ClientCommand::parse("SUBSCRIBE:"), ClientCommand::Ignore);
    assert_eq!(ClientCommand::parse("SUBSCRIBE:   "), ClientCommand::Ignore);
    assert_eq!(ClientCommand::parse("subscribe:TIME"), ClientCommand::Ignore);
    assert_eq!(ClientCommand::parse(" SUBSCRIBE:TIME"), ClientCommand::Ignore);
    assert_eq!(ClientCommand::parse("SUBSCRIBE TIME"), ClientCommand::Ignore);
    assert_eq!(ClientCommand::parse(""), ClientCommand::Ignore);
}

#[test]
fn test_check_path() {
    let ok = Request::builder().uri("/").body(()).unwrap();
    assert!(check_path("/", &ok, Response::new(())).is_ok());

    let wrong = Request::builder().uri("/other").body(()).unwrap();
    let err = check_path("/", &wrong, Response::new(())).unwrap_err();
    assert_eq!(err.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_wrong_path_is_rejected() {
    let ctx = context();
    let shutdown = CancellationToken::new();
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let server = tokio::spawn(accept_connection(
        server_io,
        "duplex".to_string(),
        ctx.clone(),
        shutdown,
    ));

    match client_async("ws://localhost/elsewhere", client_io).await {
        Err(tungstenite::Error::Http(resp)) => assert_eq!(resp.status(), StatusCode::NOT_FOUND),
        Err(e) => panic!("expected a 404 handshake failure, got {e}"),
        Ok(_) => panic!("handshake on an unknown path should fail"),
    }
    server.await.unwrap();
    assert!(ctx.registry.is_empty());
}

#[tokio::test]
async fn test_plain_http_request_gets_bad_request() {
    let ctx = context();
    let shutdown = CancellationToken::new();
    let (mut client_io, server_io) = tokio::io::duplex(64 * 1024);
    let server = tokio::spawn(accept_connection(
        server_io,
        "duplex".to_string(),
        ctx.clone(),
        shutdown,
    ));

    client_io
        .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();
    let mut response = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), client_io.read_to_end(&mut response))
        .await
        .expect("server never answered")
        .unwrap();
    let response = String::from_utf8(response).unwrap();
    assert!(response.starts_with("HTTP/1.1 400"), "got {response:?}");

    server.await.unwrap();
    assert!(ctx.registry.is_empty());
}

#[test]
fn test_is_upgrade_request() {
    let upgrade = b"GET / HTTP/1.1\r\nHost: x\r\nConnection: Upgrade\r\nupgrade: WebSocket\r\n\r\n";
    assert!(is_upgrade_request(upgrade));
    assert!(!is_upgrade_request(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n"));
    assert!(!is_upgrade_request(b"GET / HTTP/1.1\r\nUpgrade: h2c\r\n\r\n"));
    // header after the blank line is body, not head
    assert!(!is_upgrade_request(b"GET / HTTP/1.1\r\n\r\nUpgrade: websocket\r\n"));
}

#[tokio::test]
async fn test_rewind_replays_prefix_before_stream() {
    let (mut client_io, server_io) = tokio::io::duplex(1024);
    client_io.write_all(b" world").await.unwrap();
    drop(client_io);

    let mut rewound = Rewind::new(b"hello".to_vec(), server_io);
    let mut out = String::new();
    rewound.read_to_string(&mut out).await.unwrap();
    assert_eq!(out, "hello world");
}

#[tokio::test]
async fn test_connection_is_registered_and_subscribes() {
    let ctx = context();
    let shutdown = CancellationToken::new();
    let (mut ws, _server) = connect(&ctx, &shutdown).await;
    wait_until(|| ctx.registry.len() == 1).await;

    send_text(&mut ws, "SUBSCRIBE:  TIME ").await;
    let conn = only_connection(&ctx);
    wait_until(|| conn.is_subscribed("TIME")).await;
    assert!(conn.is_open());
}

#[tokio::test]
async fn test_resubscribe_keeps_one_entry() {
    let ctx = context();
    let shutdown = CancellationToken::new();
    let (mut ws, _server) = connect(&ctx, &shutdown).await;
    wait_until(|| ctx.registry.len() == 1).await;

    send_text(&mut ws, "SUBSCRIBE:TIME").await;
    send_text(&mut ws, "SUBSCRIBE:TIME").await;
    send_text(&mut ws, "SUBSCRIBE:done").await;
    let conn = only_connection(&ctx);
    wait_until(|| conn.is_subscribed("done")).await;
    assert_eq!(conn.subscriptions().topics(), vec!["TIME", "done"]);

    let engine = BroadcastEngine::new(Arc::clone(&ctx.registry), Duration::from_secs(1));
    engine.broadcast("TIME: once", Some("TIME")).await;
    engine.broadcast("after", None).await;
    assert_eq!(next_text(&mut ws).await, "TIME: once");
    assert_eq!(next_text(&mut ws).await, "after");
}

#[tokio::test]
async fn test_empty_and_unknown_commands_are_ignored() {
    let ctx = context();
    let shutdown = CancellationToken::new();
    let (mut ws, _server) = connect(&ctx, &shutdown).await;
    wait_until(|| ctx.registry.len() == 1).await;

    send_text(&mut ws, "SUBSCRIBE:").await;
    send_text(&mut ws, "SUBSCRIBE:   ").await;
    send_text(&mut ws, "HELLO").await;
    ws.send(WsMessage::binary(b"SUBSCRIBE:TIME".to_vec()))
        .await
        .unwrap();
    send_text(&mut ws, "SUBSCRIBE:marker").await;

    let conn = only_connection(&ctx);
    wait_until(|| conn.is_subscribed("marker")).await;
    assert_eq!(conn.subscriptions().len(), 1);
    assert!(conn.is_open());

    let engine = BroadcastEngine::new(Arc::clone(&ctx.registry), Duration::from_secs(1));
    let report = engine.broadcast("TIME: now", Some("TIME")).await;
    assert_eq!(report.attempted, 0);
}

#[tokio::test]
async fn test_topic_isolation_over_websocket() {
    let ctx = context();
    let shutdown = CancellationToken::new();
    let (mut c1, _s1) = connect(&ctx, &shutdown).await;
    let (mut c2, _s2) = connect(&ctx, &shutdown).await;
    wait_until(|| ctx.registry.len() == 2).await;

    send_text(&mut c1, "SUBSCRIBE:TIME").await;
    wait_until(|| ctx.registry.snapshot().iter().any(|c| c.is_subscribed("TIME"))).await;

    let engine = BroadcastEngine::new(Arc::clone(&ctx.registry), Duration::from_secs(1));
    let report = engine.broadcast("TIME: t", Some("TIME")).await;
    assert_eq!(report.delivered, 1);
    assert_eq!(next_text(&mut c1).await, "TIME: t");

    engine.broadcast("CPU: 1.00%", None).await;
    assert_eq!(next_text(&mut c1).await, "CPU: 1.00%");
    assert_eq!(next_text(&mut c2).await, "CPU: 1.00%");
}

#[tokio::test]
async fn test_client_close_removes_connection() {
    let ctx = context();
    let shutdown = CancellationToken::new();
    let (mut c1, server) = connect(&ctx, &shutdown).await;
    let (mut c2, _s2) = connect(&ctx, &shutdown).await;
    wait_until(|| ctx.registry.len() == 2).await;

    send_text(&mut c1, "SUBSCRIBE:TIME").await;
    send_text(&mut c2, "SUBSCRIBE:TIME").await;
    wait_until(|| {
        ctx.registry
            .snapshot()
            .iter()
            .all(|c| c.is_subscribed("TIME"))
    })
    .await;

    c1.close(None).await.expect("Failed to close WebSocket");
    wait_until(|| ctx.registry.len() == 1).await;
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("handler should finish")
        .unwrap();

    let engine = BroadcastEngine::new(Arc::clone(&ctx.registry), Duration::from_secs(1));
    let report = engine.broadcast("TIME: later", Some("TIME")).await;
    assert_eq!(report.attempted, 1);
    assert!(report.failed.is_empty());
    assert_eq!(next_text(&mut c2).await, "TIME: later");
}

#[tokio::test]
async fn test_dropped_client_is_reaped() {
    let ctx = context();
    let shutdown = CancellationToken::new();
    let (ws, server) = connect(&ctx, &shutdown).await;
    wait_until(|| ctx.registry.len() == 1).await;

    drop(ws);
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("handler should finish")
        .unwrap();
    assert!(ctx.registry.is_empty());
}

#[tokio::test]
async fn test_shutdown_sends_going_away() {
    let ctx = context();
    let shutdown = CancellationToken::new();
    let (mut ws, server) = connect(&ctx, &shutdown).await;
    wait_until(|| ctx.registry.len() == 1).await;

    shutdown.cancel();

    let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("no close frame in time")
        .expect("stream ended")
        .expect("read failed");
    match msg {
        WsMessage::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::Away),
        other => panic!("expected a close frame, got {other:?}"),
    }
    // Polling again flushes our close reply.
    let _ = ws.next().await;

    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("handler should finish")
        .unwrap();
    assert!(ctx.registry.is_empty());
}

#[tokio::test]
async fn test_server_end_to_end_over_tcp() {
    let ctx = context();
    let registry = Arc::clone(&ctx.registry);
    let shutdown = CancellationToken::new();

    let listener = bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(start_websocket_server(listener, ctx, shutdown.clone()));

    let engine = BroadcastEngine::new(Arc::clone(&registry), Duration::from_secs(1));
    let publisher = tokio::spawn(run_publisher(
        TimePublisher::new(Duration::from_secs(1)),
        engine,
        shutdown.clone(),
    ));

    let (mut subscriber, _) = connect_async(format!("ws://{addr}/"))
        .await
        .expect("connect");
    let (mut idle, _) = connect_async(format!("ws://{addr}/"))
        .await
        .expect("connect");
    subscriber
        .send(WsMessage::text("SUBSCRIBE:TIME"))
        .await
        .unwrap();

    let received = tokio::time::timeout(Duration::from_secs(5), subscriber.next())
        .await
        .expect("no TIME message in time")
        .unwrap()
        .unwrap();
    assert!(received.to_text().unwrap().starts_with("TIME: "));

    shutdown.cancel();
    publisher.await.unwrap();

    // The idle client saw no TIME message, only the server's close frame.
    let msg = tokio::time::timeout(Duration::from_secs(5), idle.next())
        .await
        .expect("no close frame in time")
        .unwrap()
        .unwrap();
    assert!(msg.is_close());
    let _ = idle.next().await;
    let _ = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(Ok(_)) = subscriber.next().await {}
    })
    .await;

    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server should stop")
        .unwrap()
        .unwrap();
    assert!(registry.is_empty());
}
