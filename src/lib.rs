//! # upgrade-bridge
//!
//! Bridges raw HTTP upgrade events into an axum-rendered request/response
//! cycle.
//!
//! A request handler asks for a WebSocket by calling
//! [`upgrade::UpgradeWebSocket::upgrade_websocket`], which hands back a
//! [`socket::LogicalSocket`] and a [`upgrade::SentinelResponse`]. Returning
//! the sentinel commits the upgrade: the handshake completes and the
//! physical connection is attached to the logical socket. Returning
//! anything else rejects it and the connection is dropped silently.
//!
//! ## Architecture
//!
//! ```text
//! TCP connection
//!     │
//!     ├── Bridge (server.rs)            hyper auto builder, upgrades enabled
//!     │       ├── plain request  → Router
//!     │       └── upgrade        → Dispatcher (upgrade/)
//!     │
//!     ├── Dispatcher                    capability, render, classify
//!     │       ├── sentinel       → Handshake::accept → attach
//!     │       └── anything else  → Handshake::discard
//!     │
//!     ├── LogicalSocket (socket/)       facade handed to handlers
//!     └── Transport (transport/)        axum WebSocket or in-memory
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod server;
pub mod socket;
pub(crate) mod sync;
pub mod transport;
pub mod upgrade;
