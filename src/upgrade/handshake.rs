//! Completing or refusing the physical handshake.
//!
//! [`Handshake`] is the dispatcher's view of the raw upgrade: it can be
//! accepted, producing the `101` response and later a live transport, or
//! discarded, tearing the connection down without a response.
//! [`WsHandshake`] implements it on top of axum's [`WebSocketUpgrade`].

use std::fmt;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::extract::Request;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::response::Response;
use tokio_util::sync::CancellationToken;

use crate::config::BridgeConfig;
use crate::transport::{Transport, WsTransport};

/// Callback run with the live transport once an accepted handshake
/// completes.
pub type OnConnect = Box<dyn FnOnce(Arc<dyn Transport>) + Send>;

/// The two ways a raw upgrade can end.
pub trait Handshake: Send + 'static {
    /// Completes the handshake.
    ///
    /// Returns the response to write to the client. `on_connect` runs once
    /// the connection has switched protocols.
    fn accept(self, on_connect: OnConnect) -> Response;

    /// Tears the connection down without writing anything.
    fn discard(self);
}

/// Handshake over an axum [`WebSocketUpgrade`].
pub struct WsHandshake {
    upgrade: WebSocketUpgrade,
    url: String,
    teardown: CancellationToken,
}

impl WsHandshake {
    /// Validates the upgrade headers of `request` and splits off the
    /// handshake, returning the request to render alongside it.
    ///
    /// `teardown` is cancelled on [`Handshake::discard`]; the connection
    /// server drops the connection when it fires.
    ///
    /// # Errors
    ///
    /// Returns axum's [`WebSocketUpgradeRejection`] when the request is not
    /// a valid WebSocket upgrade (wrong method, missing key, unsupported
    /// version, or a connection that cannot be upgraded).
    pub async fn from_request(
        request: Request,
        config: &BridgeConfig,
        teardown: CancellationToken,
    ) -> Result<(Request, Self), WebSocketUpgradeRejection> {
        let (mut parts, body) = request.into_parts();
        let upgrade: WebSocketUpgrade = WebSocketUpgrade::from_request_parts(&mut parts, &()).await?;
        let upgrade = upgrade
            .max_message_size(config.max_message_size)
            .max_frame_size(config.max_frame_size)
            .protocols(config.protocols.clone());
        let url = parts.uri.to_string();

        Ok((
            Request::from_parts(parts, body),
            Self {
                upgrade,
                url,
                teardown,
            },
        ))
    }
}

impl fmt::Debug for WsHandshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WsHandshake")
            .field("url", &self.url)
            .field("discarded", &self.teardown.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Handshake for WsHandshake {
    fn accept(self, on_connect: OnConnect) -> Response {
        let url = self.url;
        self.upgrade
            .on_failed_upgrade(|err: axum::Error| {
                tracing::warn!(%err, "websocket upgrade failed");
            })
            .on_upgrade(move |socket| async move {
                let transport: Arc<dyn Transport> = WsTransport::spawn(socket, url);
                on_connect(transport);
            })
    }

    fn discard(self) {
        self.teardown.cancel();
    }
}
