//! The sentinel response and render classification.
//!
//! A handler signals "upgrade me" by returning a [`SentinelResponse`]. It
//! renders as an ordinary [`Response`] carrying `101 Switching Protocols`
//! and an [`UpgradeMarker`] extension naming the attempt it belongs to. The
//! dispatcher never looks at the status alone: [`classify`] turns the
//! rendered response into a tagged [`RenderOutcome`] by matching the marker
//! against the attempt being dispatched.

use axum::body::Body;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use super::AttemptId;
use crate::socket::LogicalSocket;

/// Response extension identifying the attempt a sentinel belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UpgradeMarker(AttemptId);

impl UpgradeMarker {
    /// Returns the attempt this marker belongs to.
    #[must_use]
    pub const fn attempt(&self) -> AttemptId {
        self.0
    }
}

/// Marker response returned by a handler that wants the upgrade.
///
/// Only obtainable from [`super::UpgradeWebSocket::upgrade_websocket`],
/// paired with exactly one [`LogicalSocket`]. It is never written to the
/// client: the handshake produces the real `101` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentinelResponse {
    attempt: AttemptId,
}

impl SentinelResponse {
    pub(crate) const fn new(attempt: AttemptId) -> Self {
        Self { attempt }
    }

    /// Returns the attempt this sentinel belongs to.
    #[must_use]
    pub const fn attempt(&self) -> AttemptId {
        self.attempt
    }
}

impl IntoResponse for SentinelResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
        response.extensions_mut().insert(UpgradeMarker(self.attempt));
        response
    }
}

/// What a render resolved to.
#[derive(Debug)]
pub enum RenderOutcome {
    /// Any response other than this attempt's sentinel.
    Normal(Response),
    /// The attempt's sentinel, with the logical socket paired to it.
    UpgradeRequested(LogicalSocket),
}

/// Classifies a rendered response for `attempt`.
///
/// The result is [`RenderOutcome::UpgradeRequested`] only when the response
/// carries `attempt`'s marker and the capability produced a socket. A `101`
/// without a matching marker is logged and treated as a normal response.
#[must_use]
pub fn classify(
    response: Response,
    attempt: AttemptId,
    socket: Option<LogicalSocket>,
) -> RenderOutcome {
    let marker = response.extensions().get::<UpgradeMarker>().copied();
    match (marker, socket) {
        (Some(marker), Some(socket)) if marker.attempt() == attempt => {
            RenderOutcome::UpgradeRequested(socket)
        }
        (marker, _) => {
            if response.status() == StatusCode::SWITCHING_PROTOCOLS {
                tracing::warn!(
                    %attempt,
                    foreign_marker = marker.is_some(),
                    "101 response without this attempt's sentinel, treating as rejection"
                );
            }
            RenderOutcome::Normal(response)
        }
    }
}
