//! Events delivered by a [`super::LogicalSocket`].
//!
//! This is the facade's single, stable event vocabulary. Transport-native
//! events are mapped onto it by [`crate::upgrade::attach::translate`].

use bytes::Bytes;
use chrono::{DateTime, Utc};

/// Event type discriminator, used to register listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// The connection opened.
    Open,
    /// A message arrived.
    Message,
    /// The transport reported an error.
    Error,
    /// The connection closed.
    Close,
}

/// Payload of a received message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageData {
    /// A text frame.
    Text(String),
    /// A binary frame, always one contiguous buffer.
    Binary(Bytes),
}

impl MessageData {
    /// Returns the text payload, if this is a text message.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(_) => None,
        }
    }

    /// Returns the binary payload, if this is a binary message.
    #[must_use]
    pub fn as_binary(&self) -> Option<&Bytes> {
        match self {
            Self::Binary(data) => Some(data),
            Self::Text(_) => None,
        }
    }
}

/// The connection is open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenEvent {
    /// When the event was created.
    pub timestamp: DateTime<Utc>,
}

impl OpenEvent {
    /// Creates an open event stamped with the current time.
    #[must_use]
    pub fn now() -> Self {
        Self {
            timestamp: Utc::now(),
        }
    }
}

/// A message was received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEvent {
    /// The received payload, unchanged.
    pub data: MessageData,
    /// When the event was created.
    pub timestamp: DateTime<Utc>,
}

/// The transport reported an error. Does not by itself imply closure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEvent {
    /// Description of the underlying error.
    pub error: String,
    /// The underlying error's message text.
    pub message: String,
    /// When the event was created.
    pub timestamp: DateTime<Utc>,
}

/// The connection closed. Terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseEvent {
    /// Close code, `0` when the transport did not supply one.
    pub code: u16,
    /// Close reason, empty when the transport did not supply one.
    pub reason: String,
    /// Whether the close handshake completed, `false` when unknown.
    pub was_clean: bool,
    /// When the event was created.
    pub timestamp: DateTime<Utc>,
}

/// Any event a logical socket delivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// See [`OpenEvent`].
    Open(OpenEvent),
    /// See [`MessageEvent`].
    Message(MessageEvent),
    /// See [`ErrorEvent`].
    Error(ErrorEvent),
    /// See [`CloseEvent`].
    Close(CloseEvent),
}

impl SocketEvent {
    /// Returns the discriminator of this event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Open(_) => EventKind::Open,
            Self::Message(_) => EventKind::Message,
            Self::Error(_) => EventKind::Error,
            Self::Close(_) => EventKind::Close,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        let close = SocketEvent::Close(CloseEvent {
            code: 1000,
            reason: String::new(),
            was_clean: true,
            timestamp: Utc::now(),
        });
        assert_eq!(close.kind(), EventKind::Close);
        assert_eq!(SocketEvent::Open(OpenEvent::now()).kind(), EventKind::Open);
    }

    #[test]
    fn message_data_accessors() {
        let text = MessageData::Text("hi".to_string());
        assert_eq!(text.as_text(), Some("hi"));
        assert!(text.as_binary().is_none());

        let binary = MessageData::Binary(Bytes::from_static(b"\x01\x02"));
        assert_eq!(binary.as_binary().map(Bytes::len), Some(2));
        assert!(binary.as_text().is_none());
    }
}
