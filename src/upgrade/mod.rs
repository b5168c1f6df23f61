//! Upgrade layer: sentinel dispatch, attachment, and handshake orchestration.
//!
//! ```text
//! raw upgrade request
//!     │
//!     ├── Dispatcher (dispatcher.rs)      inject UpgradeWebSocket, render
//!     │       │
//!     │       ├── handler calls upgrade_websocket()
//!     │       │       └── LogicalSocket + SentinelResponse (capability.rs, sentinel.rs)
//!     │       │
//!     │       └── classify rendered response (sentinel.rs)
//!     │
//!     ├── UpgradeRequested → Handshake::accept → attach() (handshake.rs, attach.rs)
//!     └── Normal           → Handshake::discard (connection dropped, no bytes)
//! ```

pub mod attach;
pub mod attempt;
pub mod capability;
pub mod dispatcher;
pub mod handshake;
pub mod sentinel;

pub use attach::{attach, translate};
pub use attempt::{AttemptId, AttemptState};
pub use capability::{Upgrade, UpgradeWebSocket};
pub use dispatcher::{Dispatch, Dispatcher};
pub use handshake::{Handshake, OnConnect, WsHandshake};
pub use sentinel::{RenderOutcome, SentinelResponse, UpgradeMarker, classify};
