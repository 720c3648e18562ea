//! The application: middleware chain, listener registry and dispatcher.

use crate::{
    config::{AppBuilder, AppConfig},
    report::DispatchReport,
};
use futures::FutureExt;
use onio_core::{
    BoxError, BoxFuture, Composed, Connection, ConnectionId, Context, DispatchError, DynListener,
    DynMiddleware, Listener, ListenerFault, Middleware, Next, PanicError, Value, compose,
    listener_fn, middleware_fn, sync_listener,
};
use onio_std::{ListenerHandle, ListenerRegistry};
use std::{
    collections::HashMap,
    fmt,
    panic::AssertUnwindSafe,
    sync::{Arc, PoisonError, RwLock, Weak},
};
use tracing::{Instrument, debug, debug_span, warn};

/// A realtime event application.
///
/// Holds the middleware chain, the listener registry and the table of live
/// connections. Cloning is cheap and every clone refers to the same
/// application, so it can be handed to transport callbacks and tasks.
///
/// # Example
///
/// ```rust,ignore
/// let app = App::new();
///
/// app.use_fn(|ctx, next| {
///     Box::pin(async move {
///         ctx.insert("count", 0_u32);
///         next.run(ctx).await
///     })
/// });
///
/// app.on_sync("req", |ctx| {
///     assert_eq!(ctx.get::<u32>("count"), Some(&0));
///     Ok(())
/// });
///
/// app.attach(&transport)?;
/// ```
#[derive(Clone)]
pub struct App {
    inner: Arc<Inner>,
}

struct Inner {
    config: AppConfig,
    chain: RwLock<Composed>,
    listeners: ListenerRegistry,
    connections: RwLock<HashMap<ConnectionId, Weak<dyn Connection>>>,
}

impl App {
    /// Create an application with default settings.
    pub fn new() -> Self {
        AppBuilder::new().build()
    }

    /// Start configuring an application.
    pub fn builder() -> AppBuilder {
        AppBuilder::new()
    }

    /// Create an application from a configuration.
    pub fn with_config(config: AppConfig) -> Self {
        AppBuilder::from_config(config).build()
    }

    pub(crate) fn from_parts(config: AppConfig, middleware: Vec<Arc<dyn DynMiddleware>>) -> Self {
        let chain = compose(middleware).catch_panics(config.catch_panics);
        Self {
            inner: Arc::new(Inner {
                config,
                chain: RwLock::new(chain),
                listeners: ListenerRegistry::new(),
                connections: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// The application settings.
    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    // ------------------------------------------------------------------------
    // Middleware
    // ------------------------------------------------------------------------

    /// Append a middleware to the chain.
    ///
    /// Affects dispatches started after this call; dispatches in flight keep
    /// the chain they started with.
    pub fn use_middleware<M: Middleware>(&self, middleware: M) -> &Self {
        self.use_dyn(Arc::new(middleware))
    }

    /// Append an already type-erased middleware to the chain.
    pub fn use_dyn(&self, middleware: Arc<dyn DynMiddleware>) -> &Self {
        let mut chain = self.inner.chain.write().unwrap_or_else(PoisonError::into_inner);
        *chain = chain.with(middleware);
        debug!(middleware = chain.len(), "Middleware added");
        self
    }

    /// Append a closure middleware to the chain.
    pub fn use_fn<F>(&self, func: F) -> &Self
    where
        F: for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a, Result<(), BoxError>>
            + Send
            + Sync
            + 'static,
    {
        self.use_middleware(middleware_fn(func))
    }

    /// Number of middleware in the chain.
    pub fn middleware_count(&self) -> usize {
        self.chain().len()
    }

    fn chain(&self) -> Composed {
        self.inner
            .chain
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // ------------------------------------------------------------------------
    // Listeners
    // ------------------------------------------------------------------------

    /// Register a listener for `event`.
    pub fn on<L: Listener>(&self, event: impl Into<String>, listener: L) -> ListenerHandle {
        self.inner.listeners.register(event, listener)
    }

    /// Register an async closure listener for `event`.
    pub fn on_fn<F>(&self, event: impl Into<String>, func: F) -> ListenerHandle
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Result<(), BoxError>>
            + Send
            + Sync
            + 'static,
    {
        self.on(event, listener_fn(func))
    }

    /// Register a synchronous closure listener for `event`.
    pub fn on_sync<F>(&self, event: impl Into<String>, func: F) -> ListenerHandle
    where
        F: Fn(&mut Context) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.on(event, sync_listener(func))
    }

    /// Remove the registration `handle` from `event`.
    ///
    /// Returns `false` if it was not registered; that is not an error.
    pub fn off(&self, event: &str, handle: ListenerHandle) -> bool {
        self.inner.listeners.unregister(event, handle)
    }

    /// Remove every listener for `event`.
    pub fn off_all(&self, event: &str) -> usize {
        self.inner.listeners.unregister_all(event)
    }

    /// The listener registry.
    pub fn listeners(&self) -> &ListenerRegistry {
        &self.inner.listeners
    }

    // ------------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------------

    /// Dispatch one event received on `connection`.
    ///
    /// Builds a fresh [`Context`], runs the middleware chain and, if the chain
    /// completed, every listener registered for `event` in order.
    ///
    /// # Errors
    ///
    /// Returns the chain's [`DispatchError`] if a middleware failed or called
    /// `next` twice; no listener runs in that case. Listener failures are not
    /// errors: they are logged and collected in the [`DispatchReport`].
    pub async fn handle_event(
        &self,
        connection: &Arc<dyn Connection>,
        event: impl Into<String>,
        args: Vec<Value>,
    ) -> Result<DispatchReport, DispatchError> {
        self.dispatch(Context::new(connection, event, args)).await
    }

    /// Dispatch an already built context.
    pub async fn dispatch(&self, mut ctx: Context) -> Result<DispatchReport, DispatchError> {
        let span = debug_span!(
            "dispatch",
            event = %ctx.event(),
            connection = ?ctx.connection_id(),
        );
        self.run(&mut ctx).instrument(span).await
    }

    async fn run(&self, ctx: &mut Context) -> Result<DispatchReport, DispatchError> {
        let chain = self.chain();
        debug!(middleware = chain.len(), "Dispatch started");
        if let Err(err) = chain.call(ctx).await {
            warn!(error = %err, "Middleware chain aborted, listeners skipped");
            return Err(err);
        }

        let listeners = self.inner.listeners.listeners_for(ctx.event());
        let mut report = DispatchReport::new(ctx.event());

        for (index, entry) in listeners.iter().enumerate() {
            let outcome = self
                .call_listener(entry.listener(), ctx)
                .await
                .map_err(|source| ListenerFault::new(ctx.event(), index, source));

            if let Err(fault) = &outcome {
                warn!(index, error = %fault.source, "Listener failed");
            }
            report.record(outcome);
        }

        debug!(
            listeners = report.invoked(),
            faults = report.faults().len(),
            "Dispatch complete"
        );
        Ok(report)
    }

    async fn call_listener(
        &self,
        listener: &dyn DynListener,
        ctx: &mut Context,
    ) -> Result<(), BoxError> {
        if self.inner.config.catch_panics {
            AssertUnwindSafe(listener.call_dyn(ctx))
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| Err(Box::new(PanicError::from_payload(payload)) as BoxError))
        } else {
            listener.call_dyn(ctx).await
        }
    }

    // ------------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------------

    pub(crate) fn track(&self, connection: &Arc<dyn Connection>) {
        self.inner
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(connection.id(), Arc::downgrade(connection));
    }

    pub(crate) fn untrack(&self, id: ConnectionId) {
        self.inner
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    /// Live connections accepted through [`App::attach`] or [`App::accept`].
    ///
    /// Entries whose connection has been dropped are pruned.
    pub fn connections(&self) -> Vec<Arc<dyn Connection>> {
        let mut table = self
            .inner
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        table.retain(|_, weak| weak.strong_count() > 0);
        table
            .values()
            .filter_map(Weak::upgrade)
            .filter(|connection| connection.is_connected())
            .collect()
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.connections().len()
    }

    /// Emit an event to every live connection.
    ///
    /// Returns how many connections accepted the event.
    pub fn broadcast(&self, event: &str, args: Vec<Value>) -> usize {
        let mut delivered = 0;
        for connection in self.connections() {
            match connection.emit(event, args.clone()) {
                Ok(()) => delivered += 1,
                Err(err) => {
                    debug!(connection = %connection.id(), %event, error = %err, "Broadcast skipped connection");
                }
            }
        }
        delivered
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("config", &self.inner.config)
            .field("middleware", &self.middleware_count())
            .field("listeners", &self.inner.listeners)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use onio_std::testing::MemoryConnection;

    fn connection() -> Arc<dyn Connection> {
        MemoryConnection::new(ConnectionId::new(1))
    }

    #[tokio::test]
    async fn test_unknown_event_runs_chain_only() {
        let app = App::new();
        app.use_fn(|ctx, next| {
            Box::pin(async move {
                ctx.insert("seen", true);
                next.run(ctx).await
            })
        });

        let report = app
            .handle_event(&connection(), "nobody-listens", vec![])
            .await
            .unwrap();
        assert_eq!(report.invoked(), 0);
        assert!(report.is_clean());
        assert_eq!(report.event(), "nobody-listens");
    }

    #[tokio::test]
    async fn test_middleware_added_later_applies_to_later_dispatches() {
        let app = App::new();
        assert_eq!(app.middleware_count(), 0);
        app.use_fn(|_ctx, _next| Box::pin(async { Err(BoxError::from("closed")) }));
        assert_eq!(app.middleware_count(), 1);

        let err = app
            .handle_event(&connection(), "req", vec![])
            .await
            .unwrap_err();
        assert_eq!(err.position(), 0);
    }

    #[tokio::test]
    async fn test_listener_panic_is_a_fault() {
        let app = App::new();
        app.on_sync("req", |ctx| {
            if ctx.event() == "req" {
                panic!("listener exploded");
            }
            Ok(())
        });
        app.on_sync("req", |ctx| {
            ctx.insert("second", true);
            Ok(())
        });

        let report = app.handle_event(&connection(), "req", vec![]).await.unwrap();
        assert_eq!(report.invoked(), 2);
        assert_eq!(report.succeeded(), 1);
        assert!(report.faults()[0].source.to_string().contains("listener exploded"));
    }

    #[derive(Clone, Default)]
    struct Capture(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_dispatch_logs_start_and_completion() {
        let capture = Capture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let app = App::new();
        app.on_sync("req", |_ctx| Ok(()));
        app.handle_event(&connection(), "req", vec![]).await.unwrap();

        let output = String::from_utf8_lossy(&capture.0.lock().unwrap()).into_owned();
        let started = output.find("Dispatch started").unwrap();
        let complete = output.find("Dispatch complete").unwrap();
        assert!(started < complete, "{output}");
    }

    #[test]
    fn test_connections_pruned_when_dropped() {
        let app = App::new();
        let conn = connection();
        app.track(&conn);
        assert_eq!(app.connection_count(), 1);
        drop(conn);
        assert_eq!(app.connection_count(), 0);
    }
}
