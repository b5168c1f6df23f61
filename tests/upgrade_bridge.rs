//! End-to-end tests: a real [`Bridge`] on a loopback port, driven by
//! WebSocket, HTTP and raw TCP clients.

#![allow(clippy::panic, clippy::unwrap_used, clippy::expect_used, missing_docs)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;

use upgrade_bridge::api;
use upgrade_bridge::config::BridgeConfig;
use upgrade_bridge::error::BridgeError;
use upgrade_bridge::server::Bridge;
use upgrade_bridge::socket::{EventKind, LogicalSocket, MessageData, ReadyState, SocketEvent};
use upgrade_bridge::upgrade::{Upgrade, UpgradeWebSocket};

const WAIT: Duration = Duration::from_secs(5);

/// Starts a bridge over `router`; cancel the token to stop accepting.
async fn start(router: Router) -> (SocketAddr, CancellationToken) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let bridge = Bridge::new(router, BridgeConfig::default());
    tokio::spawn(bridge.serve(listener, shutdown.clone().cancelled_owned()));
    (addr, shutdown)
}

fn handshake_request(path: &str, extra: &str) -> String {
    format!(
        "GET {path} HTTP/1.1\r\n\
         Host: 127.0.0.1\r\n\
         Connection: Upgrade\r\n\
         Upgrade: websocket\r\n\
         Sec-WebSocket-Version: 13\r\n\
         {extra}\r\n"
    )
}

/// Sends a raw handshake and returns every byte the server wrote before
/// closing the connection.
async fn raw_exchange(addr: SocketAddr, request: &str) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut received = Vec::new();
    let read = tokio::time::timeout(WAIT, stream.read_to_end(&mut received)).await;
    assert!(read.is_ok(), "server kept the connection open");
    received
}

type SocketSlot = Arc<Mutex<Option<LogicalSocket>>>;

/// `/reject` asks for the upgrade and then answers 403 instead.
fn rejecting_router(slot: &SocketSlot) -> Router {
    let slot = Arc::clone(slot);
    Router::new().route(
        "/reject",
        get(move |upgrade: UpgradeWebSocket| {
            let slot = Arc::clone(&slot);
            async move {
                let Upgrade { socket, .. } = upgrade.upgrade_websocket().await?;
                *slot.lock().unwrap() = Some(socket);
                Ok::<Response, BridgeError>(StatusCode::FORBIDDEN.into_response())
            }
        }),
    )
}

/// `/observe` forwards every socket event to `tx`.
fn observing_router(tx: mpsc::UnboundedSender<SocketEvent>) -> Router {
    Router::new().route(
        "/observe",
        get(move |upgrade: UpgradeWebSocket| {
            let tx = tx.clone();
            async move {
                let Upgrade { socket, response } = upgrade.upgrade_websocket().await?;
                for kind in [
                    EventKind::Open,
                    EventKind::Message,
                    EventKind::Error,
                    EventKind::Close,
                ] {
                    let tx = tx.clone();
                    socket.add_event_listener(kind, move |event| {
                        let _ = tx.send(event.clone());
                    });
                }
                Ok::<Response, BridgeError>(response.into_response())
            }
        }),
    )
}

/// `/bye` greets the client on open and closes straight away.
fn closing_router() -> Router {
    Router::new().route(
        "/bye",
        get(|upgrade: UpgradeWebSocket| async move {
            let Upgrade { socket, response } = upgrade.upgrade_websocket().await?;
            let handle = socket.clone();
            socket.set_onopen(move |_| {
                handle.send("bye").unwrap();
                handle.close().unwrap();
            });
            Ok::<Response, BridgeError>(response.into_response())
        }),
    )
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<SocketEvent>) -> SocketEvent {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for a socket event")
        .expect("event channel closed")
}

#[tokio::test]
async fn echo_round_trip_over_websocket() {
    let (addr, _shutdown) = start(api::build_router(&BridgeConfig::default())).await;

    let (mut ws, response) = connect_async(format!("ws://{addr}/echo")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);

    ws.send(Message::text("hello")).await.unwrap();
    let reply = tokio::time::timeout(WAIT, ws.next()).await.unwrap();
    assert_eq!(reply.unwrap().unwrap(), Message::text("hello"));

    ws.send(Message::binary(vec![0u8, 1, 2, 255])).await.unwrap();
    let reply = tokio::time::timeout(WAIT, ws.next()).await.unwrap();
    assert_eq!(reply.unwrap().unwrap(), Message::binary(vec![0u8, 1, 2, 255]));

    ws.close(None).await.unwrap();
}

#[tokio::test]
async fn handler_sees_open_messages_and_clean_close() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let (addr, _shutdown) = start(observing_router(tx)).await;

    let (mut ws, _) = connect_async(format!("ws://{addr}/observe")).await.unwrap();
    assert!(matches!(next_event(&mut rx).await, SocketEvent::Open(_)));

    ws.send(Message::text("first")).await.unwrap();
    ws.send(Message::binary(vec![7u8, 8])).await.unwrap();
    ws.close(Some(CloseFrame {
        code: CloseCode::from(4001),
        reason: String::from("done").into(),
    }))
    .await
    .unwrap();

    let SocketEvent::Message(first) = next_event(&mut rx).await else {
        panic!("expected the text message");
    };
    assert_eq!(first.data, MessageData::Text("first".to_string()));

    let SocketEvent::Message(second) = next_event(&mut rx).await else {
        panic!("expected the binary message");
    };
    assert_eq!(second.data.as_binary().map(|b| b.to_vec()), Some(vec![7u8, 8]));

    let SocketEvent::Close(close) = next_event(&mut rx).await else {
        panic!("expected the close event");
    };
    assert_eq!(close.code, 4001);
    assert_eq!(close.reason, "done");
    assert!(close.was_clean);
}

#[tokio::test]
async fn server_side_send_and_close_reach_the_client() {
    let (addr, _shutdown) = start(closing_router()).await;

    let (mut ws, _) = connect_async(format!("ws://{addr}/bye")).await.unwrap();

    let greeting = tokio::time::timeout(WAIT, ws.next()).await.unwrap();
    assert_eq!(greeting.unwrap().unwrap(), Message::text("bye"));

    let closing = tokio::time::timeout(WAIT, ws.next()).await.unwrap();
    assert!(matches!(closing, Some(Ok(Message::Close(_)))));
}

#[tokio::test]
async fn rejected_upgrade_writes_nothing() {
    let slot = SocketSlot::default();
    let (addr, _shutdown) = start(rejecting_router(&slot)).await;

    let request = handshake_request("/reject", "Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n");
    let received = raw_exchange(addr, &request).await;
    assert!(received.is_empty(), "got {:?}", String::from_utf8_lossy(&received));

    let socket = slot.lock().unwrap().clone().expect("handler ran");
    assert!(!socket.is_attached());
    assert_eq!(socket.ready_state(), ReadyState::Connecting);
}

#[tokio::test]
async fn upgrade_to_a_plain_route_writes_nothing() {
    let (addr, _shutdown) = start(api::build_router(&BridgeConfig::default())).await;

    let request = handshake_request("/health", "Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n");
    let received = raw_exchange(addr, &request).await;
    assert!(received.is_empty());
}

#[tokio::test]
async fn rejected_upgrade_fails_websocket_client() {
    let (addr, _shutdown) = start(rejecting_router(&SocketSlot::default())).await;
    assert!(connect_async(format!("ws://{addr}/reject")).await.is_err());
}

#[tokio::test]
async fn invalid_handshake_gets_an_http_error() {
    let (addr, _shutdown) = start(api::build_router(&BridgeConfig::default())).await;

    // No Sec-WebSocket-Key.
    let request = "GET /echo HTTP/1.1\r\n\
                   Host: 127.0.0.1\r\n\
                   Connection: Upgrade, close\r\n\
                   Upgrade: websocket\r\n\
                   Sec-WebSocket-Version: 13\r\n\r\n";
    let received = raw_exchange(addr, request).await;
    let head = String::from_utf8_lossy(&received);
    assert!(head.starts_with("HTTP/1.1 400"), "got {head:?}");
}

#[tokio::test]
async fn plain_requests_pass_through() {
    let (addr, _shutdown) = start(api::build_router(&BridgeConfig::default())).await;

    let response = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "healthy");

    let response = reqwest::get(format!("http://{addr}/echo")).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::UPGRADE_REQUIRED);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], 1001);
}

#[tokio::test]
async fn shutdown_stops_accepting() {
    let (addr, shutdown) = start(api::build_router(&BridgeConfig::default())).await;
    shutdown.cancel();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let connected = tokio::time::timeout(WAIT, TcpStream::connect(addr)).await.unwrap();
    assert!(connected.is_err());
}
