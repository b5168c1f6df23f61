//! Physical transport abstraction.
//!
//! A [`Transport`] is a live, byte-level WebSocket connection owned by the
//! underlying socket library. The bridge never owns one; it only reads its
//! accessors, forwards `send`/`close`, and listens to its native events.
//!
//! Two implementations ship with the crate:
//!
//! - [`WsTransport`] drives an upgraded `axum` WebSocket.
//! - [`MemoryTransport`] is an in-process stand-in for tests and embedders.

pub mod memory;
pub mod ws;

use std::fmt;

use bytes::Bytes;

use crate::error::TransportError;
use crate::socket::{BinaryType, ReadyState};

pub use memory::MemoryTransport;
pub use ws::WsTransport;

/// A frame to be written to the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A text frame.
    Text(String),
    /// A binary frame.
    Binary(Bytes),
}

impl Frame {
    /// Returns the payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(data) => data.len(),
        }
    }

    /// Returns `true` if the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Message payload in the transport's own vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativePayload {
    /// A text message.
    Text(String),
    /// A binary message as one buffer ([`BinaryType::Buffer`] or
    /// [`BinaryType::ArrayBuffer`]).
    Binary(Bytes),
    /// A binary message as received fragments ([`BinaryType::Fragments`]).
    Fragments(Vec<Bytes>),
}

/// Event emitted by a transport, in the transport's own vocabulary.
///
/// Optional fields are left empty when the transport has nothing to say;
/// the facade fills in defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection opened.
    Open,
    /// A message arrived.
    Message(NativePayload),
    /// Something went wrong on the connection.
    Error {
        /// Description of the error (its kind or debug rendering).
        description: String,
        /// The error's message text.
        message: String,
    },
    /// The connection closed.
    Close {
        /// Close code, if one was received or inferred.
        code: Option<u16>,
        /// Close reason, if one was received.
        reason: Option<String>,
        /// Whether the close handshake completed, if known.
        was_clean: Option<bool>,
    },
}

/// Callback registered with [`Transport::add_listener`].
pub type TransportListener = Box<dyn Fn(TransportEvent) + Send + Sync>;

/// Operations the bridge needs from an upgrade-capable socket library.
///
/// Events that occur before the first listener is registered must be
/// buffered by the implementation and delivered once a listener exists.
/// After a `Close` event the implementation releases its listeners.
pub trait Transport: Send + Sync + fmt::Debug {
    /// Current lifecycle state.
    fn ready_state(&self) -> ReadyState;

    /// Bytes accepted by `send` but not yet written to the wire.
    fn buffered_amount(&self) -> usize;

    /// Negotiated subprotocol, empty if none.
    fn protocol(&self) -> String;

    /// Negotiated extensions, empty if none.
    fn extensions(&self) -> String;

    /// URL the connection was established on.
    fn url(&self) -> String;

    /// Selects how binary messages are handed to listeners.
    fn set_binary_type(&self, binary_type: BinaryType);

    /// Queues a frame for writing.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotOpen`] unless the transport is open, or
    /// [`TransportError::WriterClosed`] if the writer has shut down.
    fn send(&self, frame: Frame) -> Result<(), TransportError>;

    /// Starts the close handshake. A no-op if already closing or closed.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::WriterClosed`] if the close frame could not
    /// be queued.
    fn close(&self) -> Result<(), TransportError>;

    /// Registers a listener for every future (and buffered) event.
    fn add_listener(&self, listener: TransportListener);
}
