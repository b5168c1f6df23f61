//! Demonstration router: the renderer served by the `upgrade-bridge` binary.
//!
//! | Route     | Behaviour                                               |
//! |-----------|---------------------------------------------------------|
//! | `/health` | JSON health status                                      |
//! | `/echo`   | upgrades and echoes every message back to the client    |

pub mod handlers;

use axum::Router;
use axum::http::StatusCode;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::BridgeConfig;

/// Builds the demonstration router with tracing, CORS and, when configured,
/// a render timeout.
pub fn build_router(config: &BridgeConfig) -> Router {
    let router = Router::new()
        .merge(handlers::system::routes())
        .merge(handlers::echo::routes());

    let router = match config.render_timeout {
        Some(timeout) => router.layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            timeout,
        )),
        None => router,
    };

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
