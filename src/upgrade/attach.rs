//! The attachment protocol.
//!
//! [`attach`] binds a live transport to a logical socket exactly once and
//! forwards every transport event to it through [`translate`], the single
//! place where the transport's event vocabulary meets the facade's.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use chrono::Utc;

use crate::error::BridgeError;
use crate::socket::{
    BinaryType, CloseEvent, ErrorEvent, LogicalSocket, MessageData, MessageEvent, OpenEvent,
    ReadyState, SocketEvent,
};
use crate::transport::{NativePayload, Transport, TransportEvent};

/// Binds `transport` to `socket` and starts forwarding its events.
///
/// Steps, in order: claim the socket, switch the transport to
/// [`BinaryType::ArrayBuffer`], deliver a synthesized `open` if the
/// transport is already open, then register the forwarding listener.
///
/// # Errors
///
/// Returns [`BridgeError::AlreadyAttached`] if `socket` already has a
/// transport. Nothing is changed in that case.
pub fn attach(socket: &LogicalSocket, transport: Arc<dyn Transport>) -> Result<(), BridgeError> {
    socket.bind(Arc::clone(&transport))?;
    transport.set_binary_type(BinaryType::ArrayBuffer);

    if transport.ready_state() == ReadyState::Open {
        socket.dispatch(SocketEvent::Open(OpenEvent::now()));
    }

    let target = socket.clone();
    transport.add_listener(Box::new(move |event| target.dispatch(translate(event))));

    tracing::debug!(
        socket_id = %socket.id(),
        url = %transport.url(),
        protocol = %transport.protocol(),
        "logical socket attached"
    );
    Ok(())
}

/// Maps a transport-native event onto the facade's event vocabulary.
///
/// | Transport                         | Facade                                   |
/// |-----------------------------------|------------------------------------------|
/// | `Open`                            | `Open`                                   |
/// | `Message(Text / Binary)`          | `Message`, payload unchanged             |
/// | `Message(Fragments)`              | `Message`, fragments joined              |
/// | `Error { description, message }`  | `Error { error, message }`               |
/// | `Close { code, reason, clean }`   | `Close`, defaults `0` / `""` / `false`   |
#[must_use]
pub fn translate(event: TransportEvent) -> SocketEvent {
    let timestamp = Utc::now();
    match event {
        TransportEvent::Open => SocketEvent::Open(OpenEvent { timestamp }),
        TransportEvent::Message(payload) => {
            let data = match payload {
                NativePayload::Text(text) => MessageData::Text(text),
                NativePayload::Binary(data) => MessageData::Binary(data),
                NativePayload::Fragments(parts) => MessageData::Binary(concat(parts)),
            };
            SocketEvent::Message(MessageEvent { data, timestamp })
        }
        TransportEvent::Error {
            description,
            message,
        } => SocketEvent::Error(ErrorEvent {
            error: description,
            message,
            timestamp,
        }),
        TransportEvent::Close {
            code,
            reason,
            was_clean,
        } => SocketEvent::Close(CloseEvent {
            code: code.unwrap_or(0),
            reason: reason.unwrap_or_default(),
            was_clean: was_clean.unwrap_or(false),
            timestamp,
        }),
    }
}

fn concat(parts: Vec<Bytes>) -> Bytes {
    if parts.len() == 1 {
        return parts.into_iter().next().unwrap_or_default();
    }
    let mut joined = BytesMut::with_capacity(parts.iter().map(Bytes::len).sum());
    for part in parts {
        joined.extend_from_slice(&part);
    }
    joined.freeze()
}
