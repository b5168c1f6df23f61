//! The upgrade dispatcher.
//!
//! [`Dispatcher`] owns the renderer (any `tower` service producing axum
//! responses, usually an [`axum::Router`]) and runs one upgrade attempt per
//! call to [`Dispatcher::dispatch`]:
//!
//! 1. Mint an [`AttemptId`] and inject an [`UpgradeWebSocket`] capability
//!    into the request extensions.
//! 2. Render the request. This is the only suspension point.
//! 3. [`classify`] the response. This attempt's sentinel accepts the
//!    handshake and attaches the paired socket once the connection has
//!    switched protocols; anything else discards the connection.
//!
//! A socket that never gets attached (rejected render, or a handshake whose
//! connection callback is dropped unrun) is released so that handlers
//! capturing it cannot keep it alive.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::Request;
use axum::response::Response;
use tower::{Service, ServiceExt};

use super::{
    AttemptId, AttemptState, Handshake, RenderOutcome, UpgradeWebSocket, attach, classify,
};
use crate::config::DEFAULT_EVENT_CAPACITY;
use crate::socket::LogicalSocket;
use crate::transport::Transport;

/// How a dispatched upgrade ended, from the server's point of view.
#[derive(Debug)]
pub enum Dispatch {
    /// Write this response (the handshake's `101`).
    Respond(Response),
    /// The connection has been discarded; write nothing.
    Discarded,
}

impl Dispatch {
    /// The attempt state reached when dispatch returned.
    ///
    /// `Accepted` becomes `Attached` asynchronously, once the upgraded
    /// connection is live.
    #[must_use]
    pub const fn state(&self) -> AttemptState {
        match self {
            Self::Respond(_) => AttemptState::Accepted,
            Self::Discarded => AttemptState::Discarded,
        }
    }
}

/// Per-attempt state tracker; logs every transition.
#[derive(Debug)]
struct Attempt {
    id: AttemptId,
    state: AttemptState,
}

impl Attempt {
    fn new(id: AttemptId) -> Self {
        tracing::debug!(attempt = %id, state = %AttemptState::Pending, "upgrade attempt started");
        Self {
            id,
            state: AttemptState::Pending,
        }
    }

    fn advance(&mut self, next: AttemptState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal attempt transition {} -> {next}",
            self.state
        );
        tracing::debug!(attempt = %self.id, from = %self.state, to = %next, "upgrade attempt transition");
        self.state = next;
    }
}

/// Accepted socket waiting for its transport.
///
/// Releases the socket if dropped before [`PendingAttach::attach`] runs.
struct PendingAttach {
    attempt: Attempt,
    socket: Option<LogicalSocket>,
}

impl PendingAttach {
    fn attach(mut self, transport: Arc<dyn Transport>) {
        let Some(socket) = self.socket.take() else {
            return;
        };
        let id = self.attempt.id;
        match attach(&socket, Arc::clone(&transport)) {
            Ok(()) => self.attempt.advance(AttemptState::Attached),
            Err(err) => {
                tracing::error!(attempt = %id, %err, "attachment failed, closing transport");
                if let Err(err) = transport.close() {
                    tracing::warn!(attempt = %id, %err, "failed to close surplus transport");
                }
            }
        }
    }
}

impl Drop for PendingAttach {
    fn drop(&mut self) {
        if let Some(socket) = self.socket.take() {
            tracing::debug!(attempt = %self.attempt.id, "handshake never connected, releasing socket");
            socket.release();
        }
    }
}

/// Renders upgrade requests and completes or discards their handshakes.
#[derive(Debug, Clone)]
pub struct Dispatcher<R> {
    renderer: R,
    event_capacity: usize,
}

impl<R> Dispatcher<R>
where
    R: Service<Request, Response = Response, Error = Infallible> + Clone + Send + Sync + 'static,
    R::Future: Send,
{
    /// Creates a dispatcher around `renderer`.
    #[must_use]
    pub fn new(renderer: R) -> Self {
        Self {
            renderer,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Sets the broadcast capacity of the logical sockets this dispatcher
    /// creates.
    #[must_use]
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Renders a request that is not an upgrade attempt.
    pub async fn render(&self, request: Request) -> Response {
        match self.renderer.clone().oneshot(request).await {
            Ok(response) => response,
            Err(never) => match never {},
        }
    }

    /// Runs one upgrade attempt for `request`.
    ///
    /// Never fails: a render that does not return this attempt's sentinel is
    /// a rejection, and a failed attachment is logged and its transport
    /// closed.
    pub async fn dispatch<H>(&self, mut request: Request, handshake: H) -> Dispatch
    where
        H: Handshake,
    {
        let id = AttemptId::new();
        let mut attempt = Attempt::new(id);
        let capability = UpgradeWebSocket::new(id, self.event_capacity);
        request.extensions_mut().insert(capability.clone());

        let response = self.render(request).await;
        let socket = capability.take_socket();

        match classify(response, id, socket.clone()) {
            RenderOutcome::UpgradeRequested(socket) => {
                attempt.advance(AttemptState::Accepted);
                let pending = PendingAttach {
                    attempt,
                    socket: Some(socket),
                };
                let response = handshake.accept(Box::new(move |transport: Arc<dyn Transport>| {
                    pending.attach(transport);
                }));
                Dispatch::Respond(response)
            }
            RenderOutcome::Normal(response) => {
                attempt.advance(AttemptState::Rejected);
                tracing::debug!(attempt = %id, status = %response.status(), "upgrade not requested");
                if let Some(socket) = socket {
                    socket.release();
                }
                handshake.discard();
                attempt.advance(AttemptState::Discarded);
                Dispatch::Discarded
            }
        }
    }
}
