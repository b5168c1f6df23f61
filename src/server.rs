//! Connection server.
//!
//! [`Bridge`] serves a renderer over raw TCP with `hyper_util`'s auto
//! builder. Plain requests are rendered as-is; HTTP/1.1 WebSocket upgrade
//! attempts go through the [`Dispatcher`]. A discarded attempt cancels the
//! connection's teardown token and the connection is dropped without a
//! single byte written.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::Request;
use axum::http::{HeaderMap, HeaderValue, header};
use axum::response::{IntoResponse, Response};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tower::Service;

use crate::config::BridgeConfig;
use crate::upgrade::{Dispatch, Dispatcher, WsHandshake};

/// HTTP server that routes upgrade attempts through a [`Dispatcher`].
#[derive(Debug, Clone)]
pub struct Bridge<R> {
    dispatcher: Dispatcher<R>,
    config: Arc<BridgeConfig>,
}

impl<R> Bridge<R>
where
    R: Service<Request, Response = Response, Error = Infallible> + Clone + Send + Sync + 'static,
    R::Future: Send,
{
    /// Creates a bridge rendering through `renderer`.
    #[must_use]
    pub fn new(renderer: R, config: BridgeConfig) -> Self {
        let dispatcher = Dispatcher::new(renderer).with_event_capacity(config.event_capacity);
        Self {
            dispatcher,
            config: Arc::new(config),
        }
    }

    /// Handles one request on a connection whose teardown token is
    /// `teardown`.
    ///
    /// When the upgrade attempt is discarded the returned future never
    /// resolves; the connection owner is expected to drop it once
    /// `teardown` fires.
    pub async fn handle(&self, request: Request, teardown: CancellationToken) -> Response {
        if !is_upgrade_request(request.headers()) {
            return self.dispatcher.render(request).await;
        }

        let (request, handshake) =
            match WsHandshake::from_request(request, &self.config, teardown).await {
                Ok(split) => split,
                Err(rejection) => {
                    tracing::debug!(%rejection, "invalid websocket handshake");
                    return rejection.into_response();
                }
            };

        match self.dispatcher.dispatch(request, handshake).await {
            Dispatch::Respond(response) => response,
            Dispatch::Discarded => std::future::pending().await,
        }
    }

    /// Accepts connections from `listener` until `shutdown` resolves.
    ///
    /// Connections already in flight keep running after shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener's local address cannot be read.
    /// Failed accepts are logged and skipped.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let addr = listener.local_addr()?;
        tracing::info!(%addr, "bridge listening");

        tokio::pin!(shutdown);
        loop {
            let (stream, remote) = tokio::select! {
                () = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        tracing::warn!(%err, "failed to accept connection");
                        continue;
                    }
                },
            };
            tokio::spawn(self.clone().serve_connection(stream, remote));
        }

        tracing::info!(%addr, "bridge stopped accepting connections");
        Ok(())
    }

    async fn serve_connection(self, stream: TcpStream, remote: SocketAddr) {
        let teardown = CancellationToken::new();
        let service = {
            let teardown = teardown.clone();
            service_fn(move |request: hyper::Request<Incoming>| {
                let bridge = self.clone();
                let teardown = teardown.clone();
                async move {
                    let response = bridge.handle(request.map(Body::new), teardown).await;
                    Ok::<_, Infallible>(response)
                }
            })
        };

        let builder = AutoBuilder::new(TokioExecutor::new());
        let connection = builder.serve_connection_with_upgrades(TokioIo::new(stream), service);

        tokio::select! {
            result = connection => {
                if let Err(err) = result {
                    tracing::debug!(%remote, %err, "connection ended with error");
                }
            }
            () = teardown.cancelled() => {
                tracing::debug!(%remote, "upgrade discarded, dropping connection");
            }
        }
    }
}

/// Whether the request asks to switch to the WebSocket protocol.
///
/// Only the HTTP/1.1 `Connection: upgrade` + `Upgrade: websocket` form is
/// bridged. WebSocket over h2 (extended CONNECT) is rendered as a plain
/// request; the teardown token is per connection, so discarding an h2
/// stream would take its sibling streams down with it.
fn is_upgrade_request(headers: &HeaderMap) -> bool {
    let has = |name: header::HeaderName, token: &str| {
        headers
            .get_all(name)
            .iter()
            .any(|value| header_has_token(value, token))
    };
    has(header::CONNECTION, "upgrade") && has(header::UPGRADE, "websocket")
}

fn header_has_token(value: &HeaderValue, token: &str) -> bool {
    value.to_str().is_ok_and(|value| {
        value
            .split(',')
            .any(|part| part.trim().eq_ignore_ascii_case(token))
    })
}
