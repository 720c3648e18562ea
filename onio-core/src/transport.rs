//! Transport collaborator interface.
//!
//! onio does not speak any wire protocol. A transport adapter accepts
//! connections, decodes inbound frames into `(event, args)` pairs and hands
//! them to the single event callback registered on each connection.

use crate::error::TransportError;
use serde_json::Value;
use std::{fmt, sync::Arc};

/// Identifier of a connection, unique within one transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Create an identifier from a raw value.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Callback invoked once per inbound event on a connection.
pub type EventCallback = Arc<dyn Fn(String, Vec<Value>) + Send + Sync>;

/// Callback invoked once per accepted connection.
pub type ConnectionCallback = Arc<dyn Fn(Arc<dyn Connection>) + Send + Sync>;

/// A persistent bidirectional connection provided by a transport.
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a `Connection`",
    label = "missing `Connection` implementation",
    note = "Transport adapters must implement `Connection` for their connection handles."
)]
pub trait Connection: Send + Sync + 'static {
    /// The connection identifier.
    fn id(&self) -> ConnectionId;

    /// Register the event callback for this connection.
    ///
    /// A connection holds exactly one callback; registering again replaces
    /// the previous one.
    fn on_event(&self, callback: EventCallback);

    /// Send an event to the remote peer.
    fn emit(&self, event: &str, args: Vec<Value>) -> Result<(), TransportError>;

    /// Close the connection. The engine itself never calls this.
    fn disconnect(&self);

    /// Whether the connection is still open.
    fn is_connected(&self) -> bool;
}

/// A source of connections.
pub trait Transport: Send + Sync {
    /// Register a callback invoked for every new connection.
    fn on_connection(&self, callback: ConnectionCallback);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new(7);
        assert_eq!(id.get(), 7);
        assert_eq!(id.to_string(), "conn-7");
    }
}
