//! Transport over an upgraded `axum` WebSocket.
//!
//! The socket is split into a writer task fed by an unbounded channel (so
//! `send` stays synchronous) and a reader task that turns incoming frames
//! into [`TransportEvent`]s. The reader only starts once the first listener
//! registers; until then unread frames stay in the socket's own buffers.

use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use super::{Frame, NativePayload, Transport, TransportEvent, TransportListener};
use crate::error::TransportError;
use crate::socket::{BinaryType, ReadyState};
use crate::sync::lock;

/// Close code reported when the peer vanished without a close frame.
const ABNORMAL_CLOSURE: u16 = 1006;

type SharedListener = Arc<dyn Fn(TransportEvent) + Send + Sync>;

/// State shared between the handle and its reader/writer tasks.
struct Shared {
    state: AtomicU8,
    buffered: AtomicUsize,
    binary_type: Mutex<BinaryType>,
    listeners: Mutex<Vec<SharedListener>>,
}

impl Shared {
    fn state(&self) -> ReadyState {
        ReadyState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: ReadyState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    fn emit(&self, event: &TransportEvent) {
        let listeners: Vec<SharedListener> = lock(&self.listeners).iter().map(Arc::clone).collect();
        for listener in &listeners {
            listener(event.clone());
        }
    }

    fn binary_payload(&self, data: Bytes) -> NativePayload {
        match *lock(&self.binary_type) {
            BinaryType::Fragments => NativePayload::Fragments(vec![data]),
            BinaryType::Buffer | BinaryType::ArrayBuffer => NativePayload::Binary(data),
        }
    }
}

/// A live WebSocket connection driven by background tasks.
pub struct WsTransport {
    shared: Arc<Shared>,
    outbound: mpsc::UnboundedSender<Message>,
    reader: Mutex<Option<SplitStream<WebSocket>>>,
    protocol: String,
    url: String,
}

impl WsTransport {
    /// Takes ownership of an upgraded socket and starts its writer task.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn(socket: WebSocket, url: impl Into<String>) -> Arc<Self> {
        let protocol = socket
            .protocol()
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_owned();
        let (sink, stream) = socket.split();
        let (outbound, rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            state: AtomicU8::new(ReadyState::Open.as_u8()),
            buffered: AtomicUsize::new(0),
            binary_type: Mutex::new(BinaryType::Buffer),
            listeners: Mutex::new(Vec::new()),
        });
        tokio::spawn(write_loop(sink, rx, Arc::clone(&shared)));

        Arc::new(Self {
            shared,
            outbound,
            reader: Mutex::new(Some(stream)),
            protocol,
            url: url.into(),
        })
    }
}

impl fmt::Debug for WsTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WsTransport")
            .field("state", &self.shared.state())
            .field("protocol", &self.protocol)
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl Transport for WsTransport {
    fn ready_state(&self) -> ReadyState {
        self.shared.state()
    }

    fn buffered_amount(&self) -> usize {
        self.shared.buffered.load(Ordering::SeqCst)
    }

    fn protocol(&self) -> String {
        self.protocol.clone()
    }

    // Permessage extensions are not negotiated by axum.
    fn extensions(&self) -> String {
        String::new()
    }

    fn url(&self) -> String {
        self.url.clone()
    }

    fn set_binary_type(&self, binary_type: BinaryType) {
        *lock(&self.shared.binary_type) = binary_type;
    }

    fn send(&self, frame: Frame) -> Result<(), TransportError> {
        let state = self.shared.state();
        if state != ReadyState::Open {
            return Err(TransportError::NotOpen(state));
        }
        let len = frame.len();
        let message = match frame {
            Frame::Text(text) => Message::text(text),
            Frame::Binary(data) => Message::Binary(data),
        };
        self.shared.buffered.fetch_add(len, Ordering::SeqCst);
        self.outbound.send(message).map_err(|_| {
            self.shared.buffered.fetch_sub(len, Ordering::SeqCst);
            TransportError::WriterClosed
        })
    }

    fn close(&self) -> Result<(), TransportError> {
        if matches!(self.shared.state(), ReadyState::Closing | ReadyState::Closed) {
            return Ok(());
        }
        self.shared.set_state(ReadyState::Closing);
        self.outbound
            .send(Message::Close(None))
            .map_err(|_| TransportError::WriterClosed)
    }

    fn add_listener(&self, listener: TransportListener) {
        lock(&self.shared.listeners).push(Arc::from(listener));
        if let Some(stream) = lock(&self.reader).take() {
            tokio::spawn(read_loop(stream, Arc::clone(&self.shared)));
        }
    }
}

/// Writes queued messages until the channel closes, a write fails, or a
/// close frame has been sent.
async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
    shared: Arc<Shared>,
) {
    while let Some(message) = rx.recv().await {
        let len = match &message {
            Message::Text(text) => text.len(),
            Message::Binary(data) => data.len(),
            Message::Ping(_) | Message::Pong(_) | Message::Close(_) => 0,
        };
        let closing = matches!(message, Message::Close(_));
        let result = sink.send(message).await;
        shared.buffered.fetch_sub(len, Ordering::SeqCst);
        if let Err(err) = result {
            tracing::debug!(%err, "ws transport writer stopped");
            break;
        }
        if closing {
            break;
        }
    }
}

/// Turns incoming frames into events until the stream ends, then emits the
/// terminal `Close` and releases the listeners.
async fn read_loop(mut stream: SplitStream<WebSocket>, shared: Arc<Shared>) {
    let mut close = None;
    while let Some(item) = stream.next().await {
        match item {
            Ok(Message::Text(text)) => {
                shared.emit(&TransportEvent::Message(NativePayload::Text(text.to_string())));
            }
            Ok(Message::Binary(data)) => {
                shared.emit(&TransportEvent::Message(shared.binary_payload(data)));
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            Ok(Message::Close(frame)) => {
                // Keep polling so the close reply gets flushed.
                shared.set_state(ReadyState::Closing);
                close = Some(match frame {
                    Some(frame) => TransportEvent::Close {
                        code: Some(frame.code),
                        reason: Some(frame.reason.to_string()),
                        was_clean: Some(true),
                    },
                    None => TransportEvent::Close {
                        code: None,
                        reason: None,
                        was_clean: Some(true),
                    },
                });
            }
            Err(err) => {
                if close.is_none() {
                    shared.emit(&TransportEvent::Error {
                        description: format!("{err:?}"),
                        message: err.to_string(),
                    });
                }
                break;
            }
        }
    }

    shared.set_state(ReadyState::Closed);
    shared.emit(&close.unwrap_or(TransportEvent::Close {
        code: Some(ABNORMAL_CLOSURE),
        reason: None,
        was_clean: Some(false),
    }));
    lock(&shared.listeners).clear();
    tracing::debug!("ws transport reader finished");
}
