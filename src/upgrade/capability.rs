//! The request-local `upgrade_websocket()` capability.
//!
//! The dispatcher inserts an [`UpgradeWebSocket`] into the extensions of
//! every upgrade request before rendering it. Handlers pull it out with the
//! usual extractor machinery:
//!
//! ```no_run
//! use axum::response::{IntoResponse, Response};
//! use upgrade_bridge::error::BridgeError;
//! use upgrade_bridge::upgrade::{Upgrade, UpgradeWebSocket};
//!
//! async fn handler(locals: UpgradeWebSocket) -> Result<Response, BridgeError> {
//!     let Upgrade { socket, response } = locals.upgrade_websocket().await?;
//!     socket.set_onmessage(|event| tracing::info!(data = ?event.data, "received"));
//!     Ok(response.into_response())
//! }
//! ```
//!
//! Requests that did not come through the dispatcher have no capability;
//! extracting `UpgradeWebSocket` then rejects with `426 Upgrade Required`,
//! and `Option<UpgradeWebSocket>` yields `None`.

use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{FromRequestParts, OptionalFromRequestParts};
use axum::http::request::Parts;

use super::{AttemptId, SentinelResponse};
use crate::config::DEFAULT_EVENT_CAPACITY;
use crate::error::BridgeError;
use crate::socket::LogicalSocket;
use crate::sync::lock;

/// The pair handed out by [`UpgradeWebSocket::upgrade_websocket`].
#[derive(Debug)]
pub struct Upgrade {
    /// The logical socket, attached once the handshake completes.
    pub socket: LogicalSocket,
    /// Return this from the handler to go ahead with the upgrade.
    pub response: SentinelResponse,
}

/// Capability that lets a handler request the WebSocket upgrade.
///
/// Clones share the same state, so the "at most once per attempt" rule
/// holds no matter how many times the capability is extracted or how long a
/// clone outlives the render.
#[derive(Debug, Clone)]
pub struct UpgradeWebSocket {
    attempt: AttemptId,
    event_capacity: usize,
    state: Arc<Requested>,
}

#[derive(Debug, Default)]
struct Requested {
    /// Set by the first call and never reset.
    used: AtomicBool,
    socket: Mutex<Option<LogicalSocket>>,
}

impl UpgradeWebSocket {
    pub(crate) fn new(attempt: AttemptId, event_capacity: usize) -> Self {
        Self {
            attempt,
            event_capacity,
            state: Arc::new(Requested::default()),
        }
    }

    /// The attempt this capability belongs to.
    #[must_use]
    pub const fn attempt(&self) -> AttemptId {
        self.attempt
    }

    /// Creates the logical socket and its sentinel response.
    ///
    /// Return `response` from the handler to have the connection upgraded
    /// and `socket` attached. Returning anything else rejects the upgrade
    /// and the socket stays `Connecting` forever.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UpgradeAlreadyRequested`] if called more than
    /// once for the same attempt.
    pub async fn upgrade_websocket(&self) -> Result<Upgrade, BridgeError> {
        if self.state.used.swap(true, Ordering::SeqCst) {
            return Err(BridgeError::UpgradeAlreadyRequested(self.attempt));
        }
        let socket = LogicalSocket::with_capacity(self.event_capacity);
        *lock(&self.state.socket) = Some(socket.clone());
        tracing::debug!(attempt = %self.attempt, socket_id = %socket.id(), "upgrade requested");
        Ok(Upgrade {
            socket,
            response: SentinelResponse::new(self.attempt),
        })
    }

    /// Takes the socket created by this attempt, if any.
    ///
    /// The capability stays spent afterwards.
    pub(crate) fn take_socket(&self) -> Option<LogicalSocket> {
        lock(&self.state.socket).take()
    }
}

impl Default for UpgradeWebSocket {
    fn default() -> Self {
        Self::new(AttemptId::new(), DEFAULT_EVENT_CAPACITY)
    }
}

impl<S> FromRequestParts<S> for UpgradeWebSocket
where
    S: Send + Sync,
{
    type Rejection = BridgeError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or(BridgeError::NotAnUpgrade)
    }
}

impl<S> OptionalFromRequestParts<S> for UpgradeWebSocket
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<Self>().cloned())
    }
}
