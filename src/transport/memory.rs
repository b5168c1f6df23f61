//! In-process transport.
//!
//! [`MemoryTransport`] records everything written to it and lets the owner
//! inject native events. Events emitted before any listener exists are kept
//! in a backlog and replayed to the first listener, which is the buffering
//! behaviour the attachment protocol relies on.

use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{Frame, Transport, TransportEvent, TransportListener};
use crate::error::TransportError;
use crate::socket::{BinaryType, ReadyState};
use crate::sync::lock;

type SharedListener = Arc<dyn Fn(TransportEvent) + Send + Sync>;

/// A transport that lives entirely in memory.
pub struct MemoryTransport {
    state: AtomicU8,
    buffered: AtomicUsize,
    close_calls: AtomicUsize,
    protocol: String,
    extensions: String,
    url: String,
    binary_type: Mutex<Option<BinaryType>>,
    sent: Mutex<Vec<Frame>>,
    listeners: Mutex<Vec<SharedListener>>,
    backlog: Mutex<Vec<TransportEvent>>,
}

impl MemoryTransport {
    /// Creates a transport in the `Connecting` state.
    #[must_use]
    pub fn new() -> Self {
        Self::with_state(ReadyState::Connecting)
    }

    /// Creates a transport that is already open.
    #[must_use]
    pub fn open() -> Self {
        Self::with_state(ReadyState::Open)
    }

    /// Creates a transport in the given state.
    #[must_use]
    pub fn with_state(state: ReadyState) -> Self {
        Self {
            state: AtomicU8::new(state.as_u8()),
            buffered: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
            protocol: String::new(),
            extensions: String::new(),
            url: String::new(),
            binary_type: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
            listeners: Mutex::new(Vec::new()),
            backlog: Mutex::new(Vec::new()),
        }
    }

    /// Sets the negotiated subprotocol.
    #[must_use]
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    /// Sets the negotiated extensions.
    #[must_use]
    pub fn with_extensions(mut self, extensions: impl Into<String>) -> Self {
        self.extensions = extensions.into();
        self
    }

    /// Sets the connection URL.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Overrides the reported buffered amount.
    pub fn set_buffered_amount(&self, amount: usize) {
        self.buffered.store(amount, Ordering::SeqCst);
    }

    /// Emits a native event.
    ///
    /// `Open` and `Close` update the ready state first. Without listeners
    /// the event is kept until one registers. After a `Close` has been
    /// delivered the listeners are released.
    pub fn emit(&self, event: TransportEvent) {
        match event {
            TransportEvent::Open => self.set_state(ReadyState::Open),
            TransportEvent::Close { .. } => self.set_state(ReadyState::Closed),
            TransportEvent::Message(_) | TransportEvent::Error { .. } => {}
        }
        let closing = matches!(event, TransportEvent::Close { .. });

        let listeners: Vec<SharedListener> = {
            let listeners = lock(&self.listeners);
            if listeners.is_empty() {
                lock(&self.backlog).push(event);
                return;
            }
            listeners.iter().map(Arc::clone).collect()
        };
        for listener in &listeners {
            listener(event.clone());
        }
        if closing {
            lock(&self.listeners).clear();
        }
    }

    /// Returns every frame written so far, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<Frame> {
        lock(&self.sent).clone()
    }

    /// Returns how many times `close` was called.
    #[must_use]
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Returns the binary type selected by the last `set_binary_type` call.
    #[must_use]
    pub fn configured_binary_type(&self) -> Option<BinaryType> {
        *lock(&self.binary_type)
    }

    /// Returns the number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }

    fn set_state(&self, state: ReadyState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("state", &self.ready_state())
            .field("url", &self.url)
            .field("sent", &lock(&self.sent).len())
            .field("listeners", &lock(&self.listeners).len())
            .finish_non_exhaustive()
    }
}

impl Transport for MemoryTransport {
    fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn buffered_amount(&self) -> usize {
        self.buffered.load(Ordering::SeqCst)
    }

    fn protocol(&self) -> String {
        self.protocol.clone()
    }

    fn extensions(&self) -> String {
        self.extensions.clone()
    }

    fn url(&self) -> String {
        self.url.clone()
    }

    fn set_binary_type(&self, binary_type: BinaryType) {
        *lock(&self.binary_type) = Some(binary_type);
    }

    fn send(&self, frame: Frame) -> Result<(), TransportError> {
        let state = self.ready_state();
        if state != ReadyState::Open {
            return Err(TransportError::NotOpen(state));
        }
        lock(&self.sent).push(frame);
        Ok(())
    }

    fn close(&self) -> Result<(), TransportError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if matches!(self.ready_state(), ReadyState::Connecting | ReadyState::Open) {
            self.set_state(ReadyState::Closing);
        }
        Ok(())
    }

    fn add_listener(&self, listener: TransportListener) {
        let listener: SharedListener = Arc::from(listener);
        lock(&self.listeners).push(Arc::clone(&listener));

        let backlog = std::mem::take(&mut *lock(&self.backlog));
        for event in backlog {
            let closing = matches!(event, TransportEvent::Close { .. });
            listener(event);
            if closing {
                lock(&self.listeners).clear();
            }
        }
    }
}
