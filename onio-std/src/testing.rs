//! Testing utilities for onio.
//!
//! This module provides utilities to make testing middleware, listeners and
//! whole applications easier.
//!
//! # Features
//!
//! - [`MemoryTransport`] / [`MemoryConnection`]: an in-process transport that
//!   lets a test play the remote peer
//! - [`RecordingMiddleware`]: records the onion traversal order
//! - [`CountingListener`]: counts invocations
//! - [`FailingListener`]: always fails, for fault isolation tests

use onio_core::{
    BoxError, Connection, ConnectionCallback, ConnectionId, Context, EventCallback, Listener,
    Middleware, Next, Transport, TransportError, Value,
};
use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
};

// ============================================================================
// Memory Transport
// ============================================================================

/// An event sent from the application to a [`MemoryConnection`].
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Event name.
    pub event: String,
    /// Event arguments.
    pub args: Vec<Value>,
}

/// One end of an in-memory connection.
///
/// The test acts as the remote peer: [`MemoryConnection::deliver`] plays an
/// inbound event, [`MemoryConnection::sent`] inspects what the application
/// emitted.
pub struct MemoryConnection {
    id: ConnectionId,
    callback: Mutex<Option<EventCallback>>,
    connected: AtomicBool,
    sent: Mutex<Vec<Frame>>,
}

impl MemoryConnection {
    /// Create a standalone connection (not attached to a transport).
    pub fn new(id: ConnectionId) -> Arc<Self> {
        Arc::new(Self {
            id,
            callback: Mutex::new(None),
            connected: AtomicBool::new(true),
            sent: Mutex::new(Vec::new()),
        })
    }

    /// Deliver an inbound event, as if the peer had sent it.
    ///
    /// Returns `false` if the connection is closed or nobody registered an
    /// event callback.
    pub fn deliver(&self, event: impl Into<String>, args: Vec<Value>) -> bool {
        if !self.is_connected() {
            return false;
        }
        let callback = self
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match callback {
            Some(callback) => {
                callback(event.into(), args);
                true
            }
            None => false,
        }
    }

    /// Frames emitted to this connection so far.
    pub fn sent(&self) -> Vec<Frame> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether an event callback is registered.
    pub fn has_listener(&self) -> bool {
        self.callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl Connection for MemoryConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn on_event(&self, callback: EventCallback) {
        *self.callback.lock().unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }

    fn emit(&self, event: &str, args: Vec<Value>) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected(self.id.to_string()));
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Frame {
                event: event.to_owned(),
                args,
            });
        Ok(())
    }

    fn disconnect(&self) {
        self.connected.store(false, Ordering::Release);
        // Dropping the callback closes the application's side of the connection.
        self.callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

/// An in-process [`Transport`].
///
/// # Example
///
/// ```rust,ignore
/// let transport = MemoryTransport::new();
/// app.attach(&transport)?;
///
/// let client = transport.connect();
/// client.deliver("req", vec![]);
/// ```
pub struct MemoryTransport {
    next_id: AtomicU64,
    callbacks: Mutex<Vec<ConnectionCallback>>,
}

impl MemoryTransport {
    /// Create a transport with no connections.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            callbacks: Mutex::new(Vec::new()),
        }
    }

    /// Open a new connection and announce it to every connection callback.
    pub fn connect(&self) -> Arc<MemoryConnection> {
        let id = ConnectionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let connection = MemoryConnection::new(id);
        let callbacks = self
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for callback in callbacks {
            callback(connection.clone() as Arc<dyn Connection>);
        }
        connection
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MemoryTransport {
    fn on_connection(&self, callback: ConnectionCallback) {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(callback);
    }
}

// ============================================================================
// Recording Middleware
// ============================================================================

/// A middleware that records `"<label>:down"` and `"<label>:up"` around
/// `next` into a shared log.
///
/// # Example
///
/// ```rust,ignore
/// let log = RecordingMiddleware::log();
/// app.use_middleware(RecordingMiddleware::new("a", &log));
/// app.use_middleware(RecordingMiddleware::new("b", &log));
/// // after one dispatch: ["a:down", "b:down", "b:up", "a:up"]
/// ```
pub struct RecordingMiddleware {
    label: String,
    log: Arc<Mutex<Vec<String>>>,
}

impl RecordingMiddleware {
    /// Create a fresh shared log.
    pub fn log() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    /// Create a recording middleware writing to `log`.
    pub fn new(label: impl Into<String>, log: &Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            label: label.into(),
            log: log.clone(),
        }
    }

    fn push(&self, phase: &str) {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(format!("{}:{phase}", self.label));
    }
}

impl Middleware for RecordingMiddleware {
    async fn handle(&self, ctx: &mut Context, next: Next<'_>) -> Result<(), BoxError> {
        self.push("down");
        next.run(ctx).await?;
        self.push("up");
        Ok(())
    }
}

// ============================================================================
// Counting Listener
// ============================================================================

/// A listener that counts invocations.
///
/// # Example
///
/// ```rust,ignore
/// let counter = CountingListener::new();
/// app.on("req", counter.clone());
/// // ...
/// assert_eq!(counter.count(), 1);
/// ```
#[derive(Clone, Default)]
pub struct CountingListener {
    count: Arc<AtomicUsize>,
}

impl CountingListener {
    /// Create a new counting listener.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current count.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Reset the counter.
    pub fn reset(&self) {
        self.count.store(0, Ordering::SeqCst);
    }
}

impl Listener for CountingListener {
    async fn call(&self, _ctx: &mut Context) -> Result<(), BoxError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Failing Listener
// ============================================================================

/// A listener that always fails with the given message.
pub struct FailingListener {
    message: String,
}

impl FailingListener {
    /// Create a failing listener.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Listener for FailingListener {
    async fn call(&self, _ctx: &mut Context) -> Result<(), BoxError> {
        Err(self.message.clone().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_memory_transport_announces_connections() {
        let transport = MemoryTransport::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        transport.on_connection(Arc::new(move |conn: Arc<dyn Connection>| {
            sink.lock().unwrap().push(conn.id());
        }));

        let a = transport.connect();
        let b = transport.connect();
        assert_ne!(a.id(), b.id());
        assert_eq!(*seen.lock().unwrap(), vec![a.id(), b.id()]);
    }

    #[test]
    fn test_memory_connection_deliver() {
        let conn = MemoryConnection::new(ConnectionId::new(1));
        assert!(!conn.deliver("req", vec![]), "no callback yet");

        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        conn.on_event(Arc::new(move |event: String, args: Vec<Value>| {
            sink.lock().unwrap().push((event, args));
        }));
        assert!(conn.has_listener());
        assert!(conn.deliver("req", vec![json!(1)]));
        assert_eq!(
            *received.lock().unwrap(),
            vec![("req".to_owned(), vec![json!(1)])]
        );
    }

    #[test]
    fn test_memory_connection_disconnect() {
        let conn = MemoryConnection::new(ConnectionId::new(2));
        conn.on_event(Arc::new(|_, _| {}));
        conn.emit("hello", vec![]).unwrap();

        conn.disconnect();
        assert!(!conn.is_connected());
        assert!(!conn.has_listener());
        assert!(!conn.deliver("req", vec![]));
        assert!(matches!(
            conn.emit("late", vec![]),
            Err(TransportError::Disconnected(_))
        ));
        assert_eq!(
            conn.sent(),
            vec![Frame {
                event: "hello".to_owned(),
                args: vec![]
            }]
        );
    }

    #[tokio::test]
    async fn test_counting_and_failing_listeners() {
        let counter = CountingListener::new();
        let mut ctx = Context::detached("req", vec![]);
        counter.call(&mut ctx).await.unwrap();
        counter.clone().call(&mut ctx).await.unwrap();
        assert_eq!(counter.count(), 2);
        counter.reset();
        assert_eq!(counter.count(), 0);

        let failing = FailingListener::new("nope");
        let err = failing.call(&mut ctx).await.unwrap_err();
        assert_eq!(err.to_string(), "nope");
    }
}
