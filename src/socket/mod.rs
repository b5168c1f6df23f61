//! Logical socket layer: the standards-shaped WebSocket facade.
//!
//! A [`LogicalSocket`] exists before any physical connection does. It is
//! handed to application code by the upgrade capability and bound to a
//! live transport later by [`crate::upgrade::attach`].

pub mod event;
pub mod logical;
pub mod payload;
pub mod state;

pub use event::{
    CloseEvent, ErrorEvent, EventKind, MessageData, MessageEvent, OpenEvent, SocketEvent,
};
pub use logical::{Delivery, ListenerId, LogicalSocket};
pub use payload::{Blob, SendData};
pub use state::{BinaryType, ReadyState};
