//! The logical socket handle.
//!
//! A [`LogicalSocket`] is created before its physical connection exists.
//! It starts unattached, reporting quiescent defaults, and becomes a
//! read-through view of a [`Transport`] once
//! [`crate::upgrade::attach`] binds one. Binding happens at most once.
//!
//! # Event delivery
//!
//! Each event is delivered, in order, to the single-slot handler for its
//! kind (`set_onopen` and friends), to every listener registered for its
//! kind, and to broadcast subscribers. At most one `open` is delivered and
//! it precedes every `message`; `close` is terminal, after which handlers
//! and listeners are released and subscribers see the channel close.
//!
//! A socket whose upgrade is rejected never gets a `close`; the dispatcher
//! releases it instead, so handlers that capture the socket do not keep it
//! alive.
//!
//! # Sending
//!
//! Text and binary data go straight to the transport. Blobs are
//! materialized on a per-socket pipeline task; while any blob is pending,
//! later sends queue behind it so the transport sees frames in call order.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};

use tokio::sync::{broadcast, mpsc, oneshot};

use super::event::{CloseEvent, ErrorEvent, EventKind, MessageEvent, OpenEvent, SocketEvent};
use super::payload::{Blob, SendData};
use super::state::{BinaryType, ReadyState};
use crate::config::DEFAULT_EVENT_CAPACITY;
use crate::error::BridgeError;
use crate::sync::lock;
use crate::transport::{Frame, Transport};

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;
type Listener = Arc<dyn Fn(&SocketEvent) + Send + Sync>;
type Ack = oneshot::Sender<Result<(), BridgeError>>;

/// Identifies a listener registered with [`LogicalSocket::add_event_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
struct Handlers {
    onopen: Option<Handler<OpenEvent>>,
    onmessage: Option<Handler<MessageEvent>>,
    onerror: Option<Handler<ErrorEvent>>,
    onclose: Option<Handler<CloseEvent>>,
    listeners: Vec<(ListenerId, EventKind, Listener)>,
    next_id: u64,
}

impl Handlers {
    fn listeners_for(&self, kind: EventKind) -> Vec<Listener> {
        self.listeners
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .map(|(_, _, listener)| Arc::clone(listener))
            .collect()
    }
}

enum Pending {
    Ready(Frame),
    Blob(Blob),
}

struct Queued {
    item: Pending,
    ack: Ack,
}

/// Ordering state of the send pipeline.
#[derive(Default)]
struct Outbox {
    /// Queued sends not yet handed to the transport.
    pending: usize,
    queue: Option<mpsc::UnboundedSender<Queued>>,
}

struct Inner {
    id: uuid::Uuid,
    transport: OnceLock<Arc<dyn Transport>>,
    handlers: Mutex<Handlers>,
    /// Dropped on release so subscribers observe `RecvError::Closed`.
    bus: Mutex<Option<broadcast::Sender<SocketEvent>>>,
    outbox: Arc<Mutex<Outbox>>,
    opened: AtomicBool,
    closed: AtomicBool,
}

/// Standards-shaped WebSocket handle, independent of any physical
/// connection at construction time.
///
/// Cloning is cheap and clones share identity.
#[derive(Clone)]
pub struct LogicalSocket {
    inner: Arc<Inner>,
}

impl LogicalSocket {
    /// Creates an unattached socket.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Creates an unattached socket whose broadcast subscription holds up
    /// to `capacity` events per lagging receiver.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: uuid::Uuid::new_v4(),
                transport: OnceLock::new(),
                handlers: Mutex::new(Handlers::default()),
                bus: Mutex::new(Some(broadcast::channel(capacity.max(1)).0)),
                outbox: Arc::new(Mutex::new(Outbox::default())),
                opened: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Stable identity of this socket.
    #[must_use]
    pub fn id(&self) -> uuid::Uuid {
        self.inner.id
    }

    /// Returns `true` if both handles refer to the same socket.
    #[must_use]
    pub fn same_socket(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// The representation of received binary messages. Always
    /// [`BinaryType::ArrayBuffer`].
    #[must_use]
    pub const fn binary_type(&self) -> BinaryType {
        BinaryType::ArrayBuffer
    }

    /// Returns `true` once a transport has been attached.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.inner.transport.get().is_some()
    }

    /// Connection state; `Connecting` until attached.
    #[must_use]
    pub fn ready_state(&self) -> ReadyState {
        self.inner
            .transport
            .get()
            .map_or(ReadyState::Connecting, |t| t.ready_state())
    }

    /// Bytes queued on the transport but not yet written; `0` until attached.
    #[must_use]
    pub fn buffered_amount(&self) -> usize {
        self.inner.transport.get().map_or(0, |t| t.buffered_amount())
    }

    /// Negotiated subprotocol; empty until attached.
    #[must_use]
    pub fn protocol(&self) -> String {
        self.inner.transport.get().map(|t| t.protocol()).unwrap_or_default()
    }

    /// Negotiated extensions; empty until attached.
    #[must_use]
    pub fn extensions(&self) -> String {
        self.inner
            .transport
            .get()
            .map(|t| t.extensions())
            .unwrap_or_default()
    }

    /// URL of the connection; empty until attached.
    #[must_use]
    pub fn url(&self) -> String {
        self.inner.transport.get().map(|t| t.url()).unwrap_or_default()
    }

    /// Sets the single-slot `open` handler, replacing any previous one.
    pub fn set_onopen(&self, handler: impl Fn(&OpenEvent) + Send + Sync + 'static) {
        let handler: Handler<OpenEvent> = Arc::new(handler);
        lock(&self.inner.handlers).onopen = Some(handler);
    }

    /// Sets the single-slot `message` handler, replacing any previous one.
    pub fn set_onmessage(&self, handler: impl Fn(&MessageEvent) + Send + Sync + 'static) {
        let handler: Handler<MessageEvent> = Arc::new(handler);
        lock(&self.inner.handlers).onmessage = Some(handler);
    }

    /// Sets the single-slot `error` handler, replacing any previous one.
    pub fn set_onerror(&self, handler: impl Fn(&ErrorEvent) + Send + Sync + 'static) {
        let handler: Handler<ErrorEvent> = Arc::new(handler);
        lock(&self.inner.handlers).onerror = Some(handler);
    }

    /// Sets the single-slot `close` handler, replacing any previous one.
    pub fn set_onclose(&self, handler: impl Fn(&CloseEvent) + Send + Sync + 'static) {
        let handler: Handler<CloseEvent> = Arc::new(handler);
        lock(&self.inner.handlers).onclose = Some(handler);
    }

    /// Removes all four single-slot handlers. Listeners are kept.
    pub fn clear_handlers(&self) {
        let mut handlers = lock(&self.inner.handlers);
        handlers.onopen = None;
        handlers.onmessage = None;
        handlers.onerror = None;
        handlers.onclose = None;
    }

    /// Registers an additional listener for events of `kind`.
    pub fn add_event_listener(
        &self,
        kind: EventKind,
        listener: impl Fn(&SocketEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        let listener: Listener = Arc::new(listener);
        let mut handlers = lock(&self.inner.handlers);
        let id = ListenerId(handlers.next_id);
        handlers.next_id += 1;
        handlers.listeners.push((id, kind, listener));
        id
    }

    /// Unregisters a listener. Returns `false` if it was not registered.
    pub fn remove_event_listener(&self, id: ListenerId) -> bool {
        let mut handlers = lock(&self.inner.handlers);
        let before = handlers.listeners.len();
        handlers.listeners.retain(|(listener_id, _, _)| *listener_id != id);
        handlers.listeners.len() != before
    }

    /// Subscribes to every future event of this socket.
    ///
    /// Once the socket has closed (or was released unattached) the receiver
    /// reports `RecvError::Closed` straight away.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SocketEvent> {
        match lock(&self.inner.bus).as_ref() {
            Some(sender) => sender.subscribe(),
            None => broadcast::channel(1).1,
        }
    }

    /// Sends data over the attached transport.
    ///
    /// Text and binary data are handed to the transport before this returns,
    /// unless an earlier blob is still being materialized, in which case
    /// they queue behind it. The returned [`Delivery`] resolves once the
    /// frame has reached the transport.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::NotAttached`] before attachment,
    /// [`BridgeError::Transport`] if the transport refuses a direct send, or
    /// [`BridgeError::NoRuntime`] if a send must be queued outside a tokio
    /// runtime. Failures of queued sends surface via
    /// [`Delivery::delivered`].
    pub fn send(&self, data: impl Into<SendData>) -> Result<Delivery, BridgeError> {
        let transport = self.transport()?;
        let mut outbox = lock(&self.inner.outbox);
        let item = match data.into() {
            SendData::Text(text) => Pending::Ready(Frame::Text(text)),
            SendData::Binary(data) => Pending::Ready(Frame::Binary(data)),
            SendData::Blob(blob) => Pending::Blob(blob),
        };
        match item {
            Pending::Ready(frame) if outbox.pending == 0 => {
                transport.send(frame)?;
                Ok(Delivery::sent())
            }
            item => self.enqueue(&mut outbox, transport, item),
        }
    }

    /// Starts closing the attached transport.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::NotAttached`] before attachment, or
    /// [`BridgeError::Transport`] if the transport cannot queue the close.
    pub fn close(&self) -> Result<(), BridgeError> {
        self.transport()?.close()?;
        Ok(())
    }

    /// Binds `transport` to this socket. Fails if one is already bound.
    pub(crate) fn bind(&self, transport: Arc<dyn Transport>) -> Result<(), BridgeError> {
        self.inner
            .transport
            .set(transport)
            .map_err(|_| BridgeError::AlreadyAttached(self.inner.id))
    }

    /// Drops every handler, listener and subscription sender.
    ///
    /// Run on the terminal `close`, and by the dispatcher for sockets whose
    /// upgrade never reached attachment.
    pub(crate) fn release(&self) {
        {
            let mut handlers = lock(&self.inner.handlers);
            let next_id = handlers.next_id;
            *handlers = Handlers {
                next_id,
                ..Handlers::default()
            };
        }
        lock(&self.inner.bus).take();
    }

    /// Delivers an event to the handler slot, listeners and subscribers.
    pub(crate) fn dispatch(&self, event: SocketEvent) {
        if self.inner.closed.load(Ordering::SeqCst) {
            return;
        }
        match &event {
            SocketEvent::Open(_) => {
                if self.inner.opened.swap(true, Ordering::SeqCst) {
                    return;
                }
            }
            SocketEvent::Message(_) if !self.inner.opened.load(Ordering::SeqCst) => {
                tracing::warn!(socket_id = %self.inner.id, "message before open, dropping");
                return;
            }
            SocketEvent::Close(_) => {
                if self.inner.closed.swap(true, Ordering::SeqCst) {
                    return;
                }
            }
            SocketEvent::Message(_) | SocketEvent::Error(_) => {}
        }

        let (slot, listeners) = {
            let handlers = lock(&self.inner.handlers);
            let slot = match &event {
                SocketEvent::Open(e) => handlers
                    .onopen
                    .as_ref()
                    .map(|h| Slot::Open(Arc::clone(h), e.clone())),
                SocketEvent::Message(e) => handlers
                    .onmessage
                    .as_ref()
                    .map(|h| Slot::Message(Arc::clone(h), e.clone())),
                SocketEvent::Error(e) => handlers
                    .onerror
                    .as_ref()
                    .map(|h| Slot::Error(Arc::clone(h), e.clone())),
                SocketEvent::Close(e) => handlers
                    .onclose
                    .as_ref()
                    .map(|h| Slot::Close(Arc::clone(h), e.clone())),
            };
            (slot, handlers.listeners_for(event.kind()))
        };

        if let Some(slot) = slot {
            slot.call();
        }
        for listener in &listeners {
            listener(&event);
        }
        let terminal = event.kind() == EventKind::Close;
        if let Some(sender) = lock(&self.inner.bus).as_ref() {
            // No subscribers is not an error.
            let _ = sender.send(event);
        }

        if terminal {
            self.release();
        }
    }

    fn transport(&self) -> Result<&Arc<dyn Transport>, BridgeError> {
        self.inner.transport.get().ok_or(BridgeError::NotAttached)
    }

    fn enqueue(
        &self,
        outbox: &mut Outbox,
        transport: &Arc<dyn Transport>,
        item: Pending,
    ) -> Result<Delivery, BridgeError> {
        let queue = match &outbox.queue {
            Some(queue) if !queue.is_closed() => queue.clone(),
            _ => {
                let runtime =
                    tokio::runtime::Handle::try_current().map_err(|_| BridgeError::NoRuntime)?;
                let (queue, rx) = mpsc::unbounded_channel();
                runtime.spawn(drain(
                    rx,
                    Arc::clone(transport),
                    Arc::downgrade(&self.inner.outbox),
                ));
                outbox.queue = Some(queue.clone());
                queue
            }
        };

        let (ack, rx) = oneshot::channel();
        queue
            .send(Queued { item, ack })
            .map_err(|_| BridgeError::DeliveryDropped)?;
        outbox.pending += 1;
        Ok(Delivery { pending: Some(rx) })
    }
}

impl Default for LogicalSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LogicalSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogicalSocket")
            .field("id", &self.inner.id)
            .field("attached", &self.is_attached())
            .field("ready_state", &self.ready_state())
            .finish()
    }
}

/// A handler slot paired with the event it is about to receive.
enum Slot {
    Open(Handler<OpenEvent>, OpenEvent),
    Message(Handler<MessageEvent>, MessageEvent),
    Error(Handler<ErrorEvent>, ErrorEvent),
    Close(Handler<CloseEvent>, CloseEvent),
}

impl Slot {
    fn call(self) {
        match self {
            Self::Open(handler, event) => handler(&event),
            Self::Message(handler, event) => handler(&event),
            Self::Error(handler, event) => handler(&event),
            Self::Close(handler, event) => handler(&event),
        }
    }
}

/// Outcome of a [`LogicalSocket::send`] call.
#[derive(Debug)]
pub struct Delivery {
    pending: Option<oneshot::Receiver<Result<(), BridgeError>>>,
}

impl Delivery {
    fn sent() -> Self {
        Self { pending: None }
    }

    /// Returns `true` if the frame was queued rather than sent directly.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Waits until the frame has reached the transport.
    ///
    /// # Errors
    ///
    /// Returns the blob conversion or transport error of a queued send, or
    /// [`BridgeError::DeliveryDropped`] if the pipeline went away.
    pub async fn delivered(self) -> Result<(), BridgeError> {
        match self.pending {
            None => Ok(()),
            Some(rx) => rx.await.unwrap_or(Err(BridgeError::DeliveryDropped)),
        }
    }
}

/// Materializes queued sends one at a time and hands them to the
/// transport in queue order. Exits once the owning socket is gone.
async fn drain(
    mut rx: mpsc::UnboundedReceiver<Queued>,
    transport: Arc<dyn Transport>,
    outbox: Weak<Mutex<Outbox>>,
) {
    while let Some(Queued { item, ack }) = rx.recv().await {
        let frame = match item {
            Pending::Ready(frame) => Ok(frame),
            Pending::Blob(blob) => blob
                .bytes()
                .await
                .map(Frame::Binary)
                .map_err(BridgeError::from),
        };
        let Some(outbox) = outbox.upgrade() else {
            let _ = ack.send(Err(BridgeError::DeliveryDropped));
            break;
        };
        let result = {
            let mut outbox = lock(&outbox);
            outbox.pending = outbox.pending.saturating_sub(1);
            frame.and_then(|frame| transport.send(frame).map_err(BridgeError::from))
        };
        if let Err(err) = &result {
            tracing::debug!(%err, "queued send failed");
        }
        let _ = ack.send(result);
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;

    use super::*;
    use crate::error::{BlobError, TransportError};
    use crate::socket::MessageData;
    use crate::transport::MemoryTransport;

    fn attached(transport: &Arc<MemoryTransport>) -> LogicalSocket {
        let socket = LogicalSocket::new();
        let handle: Arc<dyn Transport> = Arc::clone(transport) as Arc<dyn Transport>;
        if socket.bind(handle).is_err() {
            panic!("fresh socket should bind");
        }
        socket
    }

    fn message(text: &str) -> SocketEvent {
        SocketEvent::Message(MessageEvent {
            data: MessageData::Text(text.to_string()),
            timestamp: chrono::Utc::now(),
        })
    }

    fn close_event() -> SocketEvent {
        SocketEvent::Close(CloseEvent {
            code: 1000,
            reason: String::new(),
            was_clean: true,
            timestamp: chrono::Utc::now(),
        })
    }

    #[test]
    fn unattached_socket_reports_quiescent_defaults() {
        let socket = LogicalSocket::new();
        assert!(!socket.is_attached());
        assert_eq!(socket.ready_state(), ReadyState::Connecting);
        assert_eq!(socket.buffered_amount(), 0);
        assert_eq!(socket.protocol(), "");
        assert_eq!(socket.extensions(), "");
        assert_eq!(socket.url(), "");
        assert_eq!(socket.binary_type(), BinaryType::ArrayBuffer);
    }

    #[test]
    fn accessors_read_through_after_bind() {
        let transport = Arc::new(
            MemoryTransport::open()
                .with_protocol("chat")
                .with_extensions("permessage-deflate")
                .with_url("/ws"),
        );
        transport.set_buffered_amount(42);
        let socket = attached(&transport);

        assert_eq!(socket.ready_state(), ReadyState::Open);
        assert_eq!(socket.buffered_amount(), 42);
        assert_eq!(socket.protocol(), "chat");
        assert_eq!(socket.extensions(), "permessage-deflate");
        assert_eq!(socket.url(), "/ws");
    }

    #[test]
    fn send_and_close_before_attach_fail() {
        let socket = LogicalSocket::new();
        assert!(matches!(socket.send("hi"), Err(BridgeError::NotAttached)));
        assert!(matches!(socket.close(), Err(BridgeError::NotAttached)));
    }

    #[test]
    fn second_bind_is_rejected() {
        let transport = Arc::new(MemoryTransport::open());
        let socket = attached(&transport);
        let again: Arc<dyn Transport> = Arc::new(MemoryTransport::open());
        assert!(matches!(
            socket.bind(again),
            Err(BridgeError::AlreadyAttached(id)) if id == socket.id()
        ));
    }

    #[test]
    fn text_and_binary_are_sent_synchronously() {
        let transport = Arc::new(MemoryTransport::open());
        let socket = attached(&transport);

        let Ok(delivery) = socket.send("hello") else {
            panic!("send should succeed");
        };
        assert!(!delivery.is_pending());
        let view: &[u8] = &[1, 2, 3];
        assert!(socket.send(view).is_ok());

        assert_eq!(
            transport.sent(),
            vec![
                Frame::Text("hello".to_string()),
                Frame::Binary(Bytes::from_static(&[1, 2, 3])),
            ]
        );
    }

    #[test]
    fn send_after_close_reports_transport_state() {
        let transport = Arc::new(MemoryTransport::open());
        let socket = attached(&transport);
        assert!(socket.close().is_ok());
        assert!(matches!(
            socket.send("late"),
            Err(BridgeError::Transport(TransportError::NotOpen(ReadyState::Closing)))
        ));
    }

    #[tokio::test]
    async fn blob_sends_keep_call_order() {
        let transport = Arc::new(MemoryTransport::open());
        let socket = attached(&transport);

        let slow = Blob::new(async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok(Bytes::from_static(b"one"))
        });
        let Ok(first) = socket.send(slow) else {
            panic!("blob send should queue");
        };
        let Ok(second) = socket.send("two") else {
            panic!("text send should queue");
        };
        let Ok(third) = socket.send(Blob::from_bytes(Bytes::from_static(b"three"))) else {
            panic!("blob send should queue");
        };
        assert!(first.is_pending());
        assert!(second.is_pending());
        assert!(transport.sent().is_empty());

        tokio_test::assert_ok!(first.delivered().await);
        tokio_test::assert_ok!(second.delivered().await);
        tokio_test::assert_ok!(third.delivered().await);

        assert_eq!(
            transport.sent(),
            vec![
                Frame::Binary(Bytes::from_static(b"one")),
                Frame::Text("two".to_string()),
                Frame::Binary(Bytes::from_static(b"three")),
            ]
        );

        // Pipeline idle again: direct sends resume.
        let Ok(direct) = socket.send("four") else {
            panic!("direct send should succeed");
        };
        assert!(!direct.is_pending());
    }

    #[tokio::test]
    async fn blob_failure_propagates_to_caller() {
        let transport = Arc::new(MemoryTransport::open());
        let socket = attached(&transport);

        let failing = Blob::new(async { Err(BlobError::new("unreadable")) });
        let Ok(delivery) = socket.send(failing) else {
            panic!("blob send should queue");
        };
        assert!(matches!(delivery.delivered().await, Err(BridgeError::Blob(_))));
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn slot_and_listeners_both_receive_events() {
        let socket = LogicalSocket::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        socket.set_onmessage(move |e| {
            lock(&sink).push(format!("slot:{:?}", e.data.as_text()));
        });
        let sink = Arc::clone(&seen);
        socket.add_event_listener(EventKind::Message, move |e| {
            lock(&sink).push(format!("listener:{:?}", e.kind()));
        });
        let sink = Arc::clone(&seen);
        socket.add_event_listener(EventKind::Close, move |_| {
            lock(&sink).push("close".to_string());
        });

        socket.dispatch(SocketEvent::Open(OpenEvent::now()));
        socket.dispatch(message("a"));

        assert_eq!(
            *lock(&seen),
            vec!["slot:Some(\"a\")".to_string(), "listener:Message".to_string()]
        );
    }

    #[test]
    fn open_is_delivered_at_most_once() {
        let socket = LogicalSocket::new();
        let opens = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&opens);
        socket.set_onopen(move |_| *lock(&sink) += 1);

        socket.dispatch(SocketEvent::Open(OpenEvent::now()));
        socket.dispatch(SocketEvent::Open(OpenEvent::now()));
        assert_eq!(*lock(&opens), 1);
    }

    #[test]
    fn nothing_is_delivered_after_close() {
        let socket = LogicalSocket::new();
        let count = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&count);
        let id = socket.add_event_listener(EventKind::Message, move |_| *lock(&sink) += 1);

        socket.dispatch(SocketEvent::Open(OpenEvent::now()));
        socket.dispatch(message("before"));
        socket.dispatch(close_event());
        socket.dispatch(message("after"));

        assert_eq!(*lock(&count), 1);
        // Listeners were released by the terminal close.
        assert!(!socket.remove_event_listener(id));
    }

    #[test]
    fn remove_event_listener_stops_delivery() {
        let socket = LogicalSocket::new();
        let count = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&count);
        let id = socket.add_event_listener(EventKind::Open, move |_| *lock(&sink) += 1);
        assert!(socket.remove_event_listener(id));

        socket.dispatch(SocketEvent::Open(OpenEvent::now()));
        assert_eq!(*lock(&count), 0);
    }

    #[tokio::test]
    async fn subscribers_see_events() {
        let socket = LogicalSocket::new();
        let mut rx = socket.subscribe();

        socket.dispatch(SocketEvent::Open(OpenEvent::now()));
        socket.dispatch(message("hi"));

        let Ok(first) = rx.recv().await else {
            panic!("expected open");
        };
        let Ok(second) = rx.recv().await else {
            panic!("expected message");
        };
        assert_eq!(first.kind(), EventKind::Open);
        assert!(matches!(
            second,
            SocketEvent::Message(MessageEvent { data: MessageData::Text(ref t), .. }) if t == "hi"
        ));
    }

    #[tokio::test]
    async fn subscribers_see_the_channel_close_after_close() {
        let socket = LogicalSocket::new();
        let mut rx = socket.subscribe();

        socket.dispatch(SocketEvent::Open(OpenEvent::now()));
        socket.dispatch(close_event());

        assert!(matches!(rx.recv().await, Ok(SocketEvent::Open(_))));
        assert!(matches!(rx.recv().await, Ok(SocketEvent::Close(_))));
        assert!(matches!(rx.recv().await, Err(broadcast::error::RecvError::Closed)));

        let mut late = socket.subscribe();
        assert!(matches!(late.recv().await, Err(broadcast::error::RecvError::Closed)));
    }

    #[test]
    fn release_breaks_handler_cycles() {
        let marker = Arc::new(());
        let alive = Arc::downgrade(&marker);
        let socket = LogicalSocket::new();

        let own = socket.clone();
        socket.set_onmessage(move |_| {
            let _keep = (&own, &marker);
        });
        let listener_own = socket.clone();
        let id = socket.add_event_listener(EventKind::Close, move |_| {
            let _keep = &listener_own;
        });

        socket.release();
        assert!(alive.upgrade().is_none());
        assert!(!socket.remove_event_listener(id));
        assert_eq!(Arc::strong_count(&socket.inner), 1);
    }

    #[test]
    fn clones_share_identity() {
        let socket = LogicalSocket::new();
        let clone = socket.clone();
        assert!(socket.same_socket(&clone));
        assert_eq!(socket.id(), clone.id());
        assert!(!socket.same_socket(&LogicalSocket::new()));
    }
}
