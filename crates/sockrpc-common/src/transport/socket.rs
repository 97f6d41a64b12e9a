//! The message transport wrapper.
//!
//! [`SocketTransport`] owns one logical duplex connection and everything
//! that must outlive a single physical socket:
//!
//! - the **outbound queue** of messages sent while no connection is usable,
//!   flushed oldest first as soon as a connection opens
//! - the **listener registrations**, `(filter, channel)` pairs that every
//!   inbound message is tested against in registration order
//! - the connection-scoped **call id counter**
//!
//! # Lifecycle
//!
//! ```text
//!            connect()                     close / error
//!  idle ─────────────────▶ connected ─────────────────────▶ disconnected
//!                             ▲                                  │
//!                             └──── reconnect_delay, reconnect ──┘
//! ```
//!
//! A transport driven through [`SocketTransport::connect`] has a
//! reconnection target and keeps reconnecting until it is shut down. One
//! driven through [`SocketTransport::attach`] serves a single connection
//! and stops when that connection closes. Stopping closes every listener:
//! pending [`Expectation`]s resolve to [`RpcError::Closed`] and
//! [`Subscription`]s end.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use futures_util::{SinkExt, Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::protocol::error::{Result, RpcError};
use crate::protocol::{CallId, Filter, Message, Value};

use super::codec::JsonCodec;
use super::config::TransportConfig;
use super::connection::{Connection, Connector, FrameSink, FrameStream};

type ListenerId = u64;

enum Delivery {
    Once(Option<oneshot::Sender<Value>>),
    Many(mpsc::UnboundedSender<Value>),
}

struct Listener {
    id: ListenerId,
    filter: Filter,
    delivery: Delivery,
}

struct Writer {
    epoch: u64,
    tx: mpsc::UnboundedSender<String>,
}

#[derive(Default)]
struct State {
    outbound: VecDeque<String>,
    writer: Option<Writer>,
    listeners: Vec<Listener>,
    started: bool,
    stopped: bool,
}

struct Inner {
    config: TransportConfig,
    state: Mutex<State>,
    connected: watch::Sender<bool>,
    shutdown: watch::Sender<bool>,
    next_call_id: AtomicU64,
    next_listener_id: AtomicU64,
    next_epoch: AtomicU64,
}

/// Shuts the transport down once the last user handle is dropped.
struct Handle {
    inner: Arc<Inner>,
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.inner.request_shutdown();
    }
}

/// A handle on one logical duplex connection.
///
/// Cheap to clone; all clones share the same queue, listeners and id
/// counter. The transport shuts down when the last clone is dropped.
///
/// # Example
///
/// ```no_run
/// use sockrpc_common::protocol::{Filter, Message};
/// use sockrpc_common::transport::{SocketTransport, TransportConfig, WebSocketConnector};
///
/// # #[tokio::main]
/// # async fn main() -> sockrpc_common::Result<()> {
/// let transport = SocketTransport::new(TransportConfig::default());
/// let description = transport.expect_one(Filter::description());
/// transport.connect(WebSocketConnector::new("ws://127.0.0.1:8000/ws"))?;
///
/// let message = description.await?;
/// println!("{}", message);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SocketTransport {
    handle: Arc<Handle>,
}

enum Outcome {
    Closed,
    Failed(RpcError),
    Shutdown,
}

impl SocketTransport {
    /// Creates a transport with no connection yet.
    ///
    /// Messages sent before a connection opens are queued; listeners may
    /// be registered right away.
    pub fn new(config: TransportConfig) -> Self {
        let (connected, _) = watch::channel(false);
        let (shutdown, _) = watch::channel(false);
        let inner = Arc::new(Inner {
            config,
            state: Mutex::new(State::default()),
            connected,
            shutdown,
            next_call_id: AtomicU64::new(0),
            next_listener_id: AtomicU64::new(0),
            next_epoch: AtomicU64::new(0),
        });
        Self {
            handle: Arc::new(Handle { inner }),
        }
    }

    fn inner(&self) -> &Arc<Inner> {
        &self.handle.inner
    }

    /// Starts connecting through `connector` and keeps reconnecting after
    /// every close or error, waiting `reconnect_delay` between attempts.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport was already started or stopped.
    pub fn connect<C: Connector>(&self, connector: C) -> Result<()> {
        self.inner().try_start()?;
        info!("Connecting to {}", connector.describe());
        tokio::spawn(supervise(self.inner().clone(), Arc::new(connector)));
        Ok(())
    }

    /// Drives a single already-open connection; the transport stops when
    /// it closes.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport was already started or stopped.
    pub fn attach(&self, connection: Connection) -> Result<()> {
        self.inner().try_start()?;
        tokio::spawn(drive_once(self.inner().clone(), connection));
        Ok(())
    }

    /// Sends a message.
    ///
    /// Never blocks and never fails: with a usable connection the message
    /// is handed to the writer immediately, otherwise it is appended to the
    /// outbound queue.
    pub fn send(&self, message: &Message) {
        match JsonCodec::encode(message) {
            Ok(text) => self.inner().send_text(text),
            Err(e) => error!("Failed to encode {} message: {}", message.kind(), e),
        }
    }

    /// Waits for one message matching `filter`.
    ///
    /// The listener is registered when this method is called, not when the
    /// returned future is first polled, so registering before sending the
    /// request cannot miss the reply. The registration is removed on the
    /// first match or when the [`Expectation`] is dropped.
    pub fn expect_one(&self, filter: Filter) -> Expectation {
        let (tx, rx) = oneshot::channel();
        let guard = self.inner().register(filter, Delivery::Once(Some(tx)));
        Expectation { rx, _guard: guard }
    }

    /// Subscribes to every message matching `filter`.
    ///
    /// The subscription stays registered until it is dropped or the
    /// transport stops.
    pub fn expect_many(&self, filter: Filter) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let guard = self.inner().register(filter, Delivery::Many(tx));
        Subscription { rx, _guard: guard }
    }

    /// Allocates the next call id on this connection.
    pub fn next_call_id(&self) -> CallId {
        self.inner().next_call_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn is_connected(&self) -> bool {
        *self.inner().connected.borrow()
    }

    /// Whether the transport has stopped for good.
    pub fn is_closed(&self) -> bool {
        self.inner().state.lock().stopped
    }

    /// Watches connection state transitions.
    pub fn watch_connected(&self) -> watch::Receiver<bool> {
        self.inner().connected.subscribe()
    }

    /// Waits until a connection is usable.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Closed`] if the transport stops first.
    pub async fn wait_connected(&self) -> Result<()> {
        let mut connected = self.watch_connected();
        loop {
            if *connected.borrow_and_update() {
                return Ok(());
            }
            if self.is_closed() {
                return Err(RpcError::Closed);
            }
            connected.changed().await.map_err(|_| RpcError::Closed)?;
        }
    }

    /// Stops the transport: closes the connection, ends reconnection and
    /// closes every listener.
    pub fn shutdown(&self) {
        self.inner().request_shutdown();
    }

    /// Number of standing listener registrations.
    pub fn listener_count(&self) -> usize {
        self.inner().state.lock().listeners.len()
    }

    /// Number of messages waiting in the outbound queue.
    pub fn queued_len(&self) -> usize {
        self.inner().state.lock().outbound.len()
    }

    pub fn config(&self) -> &TransportConfig {
        &self.inner().config
    }
}

impl std::fmt::Debug for SocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner().state.lock();
        f.debug_struct("SocketTransport")
            .field("connected", &*self.inner().connected.borrow())
            .field("listeners", &state.listeners.len())
            .field("queued", &state.outbound.len())
            .field("stopped", &state.stopped)
            .finish()
    }
}

impl Inner {
    fn try_start(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.stopped {
            return Err(RpcError::Closed);
        }
        if state.started {
            return Err(RpcError::Connection("transport already started".to_string()));
        }
        state.started = true;
        Ok(())
    }

    fn request_shutdown(&self) {
        self.shutdown.send_replace(true);
        let started = self.state.lock().started;
        if !started {
            self.stop();
        }
    }

    /// Final teardown; closes every listener.
    fn stop(&self) {
        let listeners = {
            let mut state = self.state.lock();
            if state.stopped {
                return;
            }
            state.stopped = true;
            state.writer = None;
            if !state.outbound.is_empty() {
                warn!("Discarding {} queued messages", state.outbound.len());
                state.outbound.clear();
            }
            std::mem::take(&mut state.listeners)
        };
        debug!("Closing {} listeners", listeners.len());
        drop(listeners);
        self.connected.send_replace(false);
    }

    fn send_text(&self, text: String) {
        let mut state = self.state.lock();
        if state.stopped {
            debug!("Transport closed, dropping outgoing message");
            return;
        }
        let unsent = match &state.writer {
            Some(writer) => match writer.tx.send(text) {
                Ok(()) => None,
                Err(mpsc::error::SendError(text)) => Some(text),
            },
            None => Some(text),
        };
        if let Some(text) = unsent {
            state.writer = None;
            state.outbound.push_back(text);
        }
    }

    fn register(self: &Arc<Self>, filter: Filter, delivery: Delivery) -> ListenerGuard {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock();
        // A stopped transport drops the delivery channel, closing the
        // listener right away.
        if !state.stopped {
            state.listeners.push(Listener {
                id,
                filter,
                delivery,
            });
        }
        ListenerGuard {
            id,
            inner: Arc::downgrade(self),
        }
    }

    fn unregister(&self, id: ListenerId) {
        self.state.lock().listeners.retain(|listener| listener.id != id);
    }

    fn handle_frame(&self, text: &str) {
        if text.len() > self.config.max_message_size {
            warn!(
                "Ignoring message of {} bytes (max {} bytes)",
                text.len(),
                self.config.max_message_size
            );
            return;
        }
        match JsonCodec::decode_value(text) {
            Ok(value) => self.dispatch(value),
            Err(e) => warn!("Ignoring malformed message: {}", e),
        }
    }

    /// Hands `value` to every matching listener, in registration order.
    fn dispatch(&self, value: Value) {
        let mut delivered = 0usize;
        let mut state = self.state.lock();
        state.listeners.retain_mut(|listener| {
            if !listener.filter.matches(&value) {
                return true;
            }
            match &mut listener.delivery {
                Delivery::Once(slot) => {
                    if let Some(tx) = slot.take() {
                        if tx.send(value.clone()).is_ok() {
                            delivered += 1;
                        }
                    }
                    false
                }
                Delivery::Many(tx) => {
                    if tx.send(value.clone()).is_ok() {
                        delivered += 1;
                        true
                    } else {
                        false
                    }
                }
            }
        });
        drop(state);

        if delivered == 0 {
            debug!("No listener for incoming message: {}", value);
        }
    }

    /// Installs a writer for a fresh connection and flushes the outbound
    /// queue into it, oldest first.
    fn open(&self, epoch: u64, tx: mpsc::UnboundedSender<String>) {
        let mut state = self.state.lock();
        let flushed = state.outbound.len();
        for text in state.outbound.drain(..) {
            // The receiver is alive until `close` runs.
            let _ = tx.send(text);
        }
        state.writer = Some(Writer { epoch, tx });
        drop(state);

        if flushed > 0 {
            debug!("Flushed {} queued messages", flushed);
        }
        self.connected.send_replace(true);
    }

    /// Detaches the connection's writer and puts everything it did not
    /// confirm back at the front of the outbound queue, in order.
    fn close(&self, epoch: u64, rx: &mut mpsc::UnboundedReceiver<String>, in_flight: Option<String>) {
        self.connected.send_replace(false);
        let mut state = self.state.lock();
        if state.writer.as_ref().is_some_and(|writer| writer.epoch == epoch) {
            state.writer = None;
        }
        rx.close();

        let mut unsent: Vec<String> = in_flight.into_iter().collect();
        while let Ok(text) = rx.try_recv() {
            unsent.push(text);
        }
        if state.stopped {
            return;
        }
        for text in unsent.into_iter().rev() {
            state.outbound.push_front(text);
        }
    }
}

/// Removes its listener registration when dropped.
struct ListenerGuard {
    id: ListenerId,
    inner: Weak<Inner>,
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.unregister(self.id);
        }
    }
}

/// A pending [`SocketTransport::expect_one`] match.
///
/// Resolves to the matching message, or [`RpcError::Closed`] if the
/// transport stops first.
pub struct Expectation {
    rx: oneshot::Receiver<Value>,
    _guard: ListenerGuard,
}

impl Future for Expectation {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.map_err(|_| RpcError::Closed))
    }
}

/// A standing [`SocketTransport::expect_many`] registration.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Value>,
    _guard: ListenerGuard,
}

impl Subscription {
    /// Waits for the next matching message; `None` once the transport has
    /// stopped.
    pub async fn next(&mut self) -> Option<Value> {
        self.rx.recv().await
    }
}

impl Stream for Subscription {
    type Item = Value;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Value>> {
        self.rx.poll_recv(cx)
    }
}

async fn supervise(inner: Arc<Inner>, connector: Arc<dyn Connector>) {
    let mut shutdown = inner.shutdown.subscribe();
    let target = connector.describe();

    loop {
        if *shutdown.borrow_and_update() {
            break;
        }

        let attempt = tokio::select! {
            attempt = connector.connect() => attempt,
            _ = shutdown.changed() => break,
        };

        match attempt {
            Ok(connection) => {
                info!("Connected to {}", target);
                match drive(&inner, connection, &mut shutdown).await {
                    Outcome::Shutdown => break,
                    Outcome::Closed => info!("Connection to {} closed", target),
                    Outcome::Failed(e) => warn!("Connection to {} failed: {}", target, e),
                }
            }
            Err(e) => warn!("Failed to connect to {}: {}", target, e),
        }

        let delay = inner.config.reconnect_delay;
        info!("Reconnecting to {} in {}ms", target, delay.as_millis());
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => break,
        }
    }

    inner.stop();
}

async fn drive_once(inner: Arc<Inner>, connection: Connection) {
    let mut shutdown = inner.shutdown.subscribe();
    match drive(&inner, connection, &mut shutdown).await {
        Outcome::Closed => debug!("Connection closed by peer"),
        Outcome::Failed(e) => warn!("Connection error: {}", e),
        Outcome::Shutdown => debug!("Connection shut down"),
    }
    inner.stop();
}

/// Runs one physical connection until it closes, fails or the transport
/// shuts down.
async fn drive(inner: &Arc<Inner>, connection: Connection, shutdown: &mut watch::Receiver<bool>) -> Outcome {
    let Connection { mut sink, mut stream } = connection;
    let epoch = inner.next_epoch.fetch_add(1, Ordering::Relaxed);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut in_flight: Option<String> = None;

    inner.open(epoch, tx);

    let outcome = tokio::select! {
        result = write_frames(&mut sink, &mut rx, &mut in_flight) => match result {
            Ok(()) => Outcome::Closed,
            Err(e) => Outcome::Failed(e),
        },
        result = read_frames(inner, &mut stream) => match result {
            Ok(()) => Outcome::Closed,
            Err(e) => Outcome::Failed(e),
        },
        _ = wait_for_shutdown(shutdown) => Outcome::Shutdown,
    };

    inner.close(epoch, &mut rx, in_flight);
    if matches!(outcome, Outcome::Shutdown) {
        let _ = sink.close().await;
    }
    outcome
}

async fn write_frames(
    sink: &mut FrameSink,
    rx: &mut mpsc::UnboundedReceiver<String>,
    in_flight: &mut Option<String>,
) -> Result<()> {
    while let Some(text) = rx.recv().await {
        *in_flight = Some(text.clone());
        sink.send(text).await?;
        *in_flight = None;
    }
    Ok(())
}

async fn read_frames(inner: &Inner, stream: &mut FrameStream) -> Result<()> {
    while let Some(frame) = stream.next().await {
        inner.handle_frame(&frame?);
    }
    Ok(())
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
