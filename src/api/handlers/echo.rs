//! `/echo`: a WebSocket that sends every message straight back.

use axum::Router;
use axum::response::{IntoResponse, Response};
use axum::routing::get;

use crate::error::BridgeError;
use crate::socket::MessageData;
use crate::upgrade::{Upgrade, UpgradeWebSocket};

/// `GET /echo`: upgrades the connection and echoes messages back.
///
/// # Errors
///
/// Plain requests (no upgrade attempt) get [`BridgeError::NotAnUpgrade`],
/// rendered as `426 Upgrade Required`.
pub async fn echo_handler(upgrade: Option<UpgradeWebSocket>) -> Result<Response, BridgeError> {
    let Some(upgrade) = upgrade else {
        return Err(BridgeError::NotAnUpgrade);
    };
    let Upgrade { socket, response } = upgrade.upgrade_websocket().await?;

    let replies = socket.clone();
    socket.set_onopen(|_| tracing::debug!("echo socket open"));
    socket.set_onmessage(move |event| {
        let sent = match &event.data {
            MessageData::Text(text) => replies.send(text.as_str()),
            MessageData::Binary(data) => replies.send(data.clone()),
        };
        if let Err(err) = sent {
            tracing::warn!(socket_id = %replies.id(), %err, "echo failed");
        }
    });
    socket.set_onclose(|event| {
        tracing::debug!(code = event.code, reason = %event.reason, "echo socket closed");
    });

    Ok(response.into_response())
}

/// Echo routes.
pub fn routes() -> Router {
    Router::new().route("/echo", get(echo_handler))
}
