//! Binding an [`App`] to a transport.
//!
//! Every accepted connection gets one driver task. The connection's event
//! callback only pushes into an unbounded channel; the driver pulls events
//! out and dispatches them according to [`Delivery`]. The driver holds the
//! connection weakly, so dropping the connection ends it.

use crate::{app::App, config::Delivery};
use onio_core::{Connection, ConnectionId, Context, OnioError, Transport, Value};
use std::sync::{Arc, Weak};
use tokio::{
    runtime::Handle,
    sync::mpsc::{self, UnboundedReceiver},
};
use tracing::{Instrument, debug, info, info_span};

struct Inbound {
    event: String,
    args: Vec<Value>,
}

impl App {
    /// Accept every connection the transport announces from now on.
    ///
    /// Must be called from within a tokio runtime; connection drivers are
    /// spawned onto it.
    ///
    /// # Errors
    ///
    /// Returns [`OnioError::Custom`] if no tokio runtime is running.
    pub fn attach<T: Transport + ?Sized>(&self, transport: &T) -> Result<(), OnioError> {
        let runtime = current_runtime()?;
        let app = self.clone();
        transport.on_connection(Arc::new(move |connection| {
            app.accept_on(&runtime, connection);
        }));
        info!("Attached to transport");
        Ok(())
    }

    /// Accept a single connection.
    ///
    /// # Errors
    ///
    /// Returns [`OnioError::Custom`] if no tokio runtime is running.
    pub fn accept(&self, connection: Arc<dyn Connection>) -> Result<(), OnioError> {
        let runtime = current_runtime()?;
        self.accept_on(&runtime, connection);
        Ok(())
    }

    fn accept_on(&self, runtime: &Handle, connection: Arc<dyn Connection>) {
        let id = connection.id();
        let (tx, rx) = mpsc::unbounded_channel();

        connection.on_event(Arc::new(move |event, args| {
            if tx.send(Inbound { event, args }).is_err() {
                debug!(connection = %id, "Driver stopped, inbound event dropped");
            }
        }));
        self.track(&connection);

        let driver = self.clone().drive(id, Arc::downgrade(&connection), rx);
        runtime.spawn(driver.instrument(info_span!("connection", connection = %id)));
        debug!(connection = %id, "Connection accepted");
    }

    async fn drive(
        self,
        id: ConnectionId,
        connection: Weak<dyn Connection>,
        mut rx: UnboundedReceiver<Inbound>,
    ) {
        while let Some(Inbound { event, args }) = rx.recv().await {
            let Some(live) = connection.upgrade() else {
                break;
            };
            let ctx = Context::new(&live, event, args);
            drop(live);

            // Failures are logged by `dispatch`; nobody is waiting for the outcome.
            match self.config().delivery {
                Delivery::Sequential => {
                    let _ = self.dispatch(ctx).await;
                }
                Delivery::Concurrent => {
                    let app = self.clone();
                    tokio::spawn(
                        async move {
                            let _ = app.dispatch(ctx).await;
                        }
                        .in_current_span(),
                    );
                }
            }
        }

        self.untrack(id);
        debug!(connection = %id, "Connection closed");
    }
}

fn current_runtime() -> Result<Handle, OnioError> {
    Handle::try_current().map_err(|err| OnioError::Custom(Box::new(err)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use onio_std::testing::MemoryTransport;

    #[test]
    fn test_attach_requires_runtime() {
        let app = App::new();
        let transport = MemoryTransport::new();
        assert!(matches!(app.attach(&transport), Err(OnioError::Custom(_))));
    }

    #[tokio::test]
    async fn test_accept_tracks_connection() {
        let app = App::new();
        let transport = MemoryTransport::new();
        app.attach(&transport).unwrap();

        let client = transport.connect();
        assert!(client.has_listener());
        assert_eq!(app.connection_count(), 1);
    }
}
