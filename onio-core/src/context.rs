//! # Per-dispatch Context
//!
//! A [`Context`] is created for exactly one event occurrence and dropped once
//! every listener for that occurrence has returned. It is passed by mutable
//! reference through the middleware chain and into listeners, so a value
//! stored by an early middleware is visible to everything that runs after it
//! within the same dispatch and to nothing else.
//!
//! The connection is held as a [`Weak`] reference: a context never keeps a
//! disconnected connection alive.

use crate::{
    error::TransportError,
    transport::{Connection, ConnectionId},
};
use serde_json::Value;
use std::{
    any::Any,
    collections::HashMap,
    fmt,
    sync::{Arc, Weak},
};

/// Typed, string-keyed extension store attached to a [`Context`].
///
/// Values of any `Send + Sync + 'static` type can be stored. Reads are typed:
/// asking for a key with the wrong type returns `None`.
#[derive(Default)]
pub struct State {
    entries: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl State {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`, replacing any previous value.
    pub fn insert<T: Send + Sync + 'static>(&mut self, key: impl Into<String>, value: T) {
        self.entries.insert(key.into(), Box::new(value));
    }

    /// Get a shared reference to the value under `key`.
    pub fn get<T: 'static>(&self, key: &str) -> Option<&T> {
        self.entries.get(key)?.downcast_ref()
    }

    /// Get a mutable reference to the value under `key`.
    pub fn get_mut<T: 'static>(&mut self, key: &str) -> Option<&mut T> {
        self.entries.get_mut(key)?.downcast_mut()
    }

    /// Remove and return the value under `key`.
    ///
    /// If the stored value is not a `T`, it is left in place and `None` is
    /// returned.
    pub fn remove<T: 'static>(&mut self, key: &str) -> Option<T> {
        if !self.entries.get(key)?.is::<T>() {
            return None;
        }
        let boxed = self.entries.remove(key)?;
        boxed.downcast::<T>().ok().map(|value| *value)
    }

    /// Whether a value (of any type) is stored under `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Iterate over the stored keys.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

/// The per-dispatch carrier of event data and middleware-contributed state.
pub struct Context {
    event: String,
    args: Vec<Value>,
    connection_id: Option<ConnectionId>,
    connection: Option<Weak<dyn Connection>>,
    state: State,
}

impl Context {
    /// Create the context for one event received on `connection`.
    pub fn new(connection: &Arc<dyn Connection>, event: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            event: event.into(),
            args,
            connection_id: Some(connection.id()),
            connection: Some(Arc::downgrade(connection)),
            state: State::new(),
        }
    }

    /// Create a context that is not bound to any connection.
    pub fn detached(event: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            event: event.into(),
            args,
            connection_id: None,
            connection: None,
            state: State::new(),
        }
    }

    /// The event name.
    pub fn event(&self) -> &str {
        &self.event
    }

    /// The event arguments.
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Mutable access to the event arguments.
    pub fn args_mut(&mut self) -> &mut Vec<Value> {
        &mut self.args
    }

    /// The argument at `index`, if present.
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    /// Identifier of the originating connection.
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.connection_id
    }

    /// The originating connection, if it is still alive.
    pub fn connection(&self) -> Option<Arc<dyn Connection>> {
        self.connection.as_ref()?.upgrade()
    }

    /// Send an event back on the originating connection.
    pub fn emit(&self, event: &str, args: Vec<Value>) -> Result<(), TransportError> {
        match self.connection() {
            Some(connection) => connection.emit(event, args),
            None => Err(TransportError::Disconnected(
                self.connection_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "<detached>".to_owned()),
            )),
        }
    }

    /// The extension store.
    pub fn state(&self) -> &State {
        &self.state
    }

    /// Mutable access to the extension store.
    pub fn state_mut(&mut self) -> &mut State {
        &mut self.state
    }

    /// Shorthand for `self.state().get(key)`.
    pub fn get<T: 'static>(&self, key: &str) -> Option<&T> {
        self.state.get(key)
    }

    /// Shorthand for `self.state_mut().get_mut(key)`.
    pub fn get_mut<T: 'static>(&mut self, key: &str) -> Option<&mut T> {
        self.state.get_mut(key)
    }

    /// Shorthand for `self.state_mut().insert(key, value)`.
    pub fn insert<T: Send + Sync + 'static>(&mut self, key: impl Into<String>, value: T) {
        self.state.insert(key, value);
    }

    /// Shorthand for `self.state_mut().remove(key)`.
    pub fn remove<T: 'static>(&mut self, key: &str) -> Option<T> {
        self.state.remove(key)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("event", &self.event)
            .field("args", &self.args)
            .field("connection_id", &self.connection_id)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_state_typed_access() {
        let mut state = State::new();
        state.insert("count", 1_u32);
        state.insert("name", String::from("alice"));

        assert_eq!(state.get::<u32>("count"), Some(&1));
        assert_eq!(state.get::<String>("name").map(String::as_str), Some("alice"));
        // Wrong type reads as absent
        assert_eq!(state.get::<i64>("count"), None);
        assert_eq!(state.len(), 2);
    }

    #[test]
    fn test_state_get_mut() {
        let mut state = State::new();
        state.insert("count", 0_u32);
        *state.get_mut::<u32>("count").unwrap() += 5;
        assert_eq!(state.get::<u32>("count"), Some(&5));
    }

    #[test]
    fn test_state_remove_wrong_type_keeps_value() {
        let mut state = State::new();
        state.insert("flag", true);
        assert_eq!(state.remove::<u8>("flag"), None);
        assert!(state.contains_key("flag"));
        assert_eq!(state.remove::<bool>("flag"), Some(true));
        assert!(state.is_empty());
    }

    #[test]
    fn test_state_replace() {
        let mut state = State::new();
        state.insert("v", 1_u8);
        state.insert("v", "text");
        assert_eq!(state.get::<u8>("v"), None);
        assert_eq!(state.get::<&str>("v"), Some(&"text"));
    }

    #[test]
    fn test_detached_context() {
        let mut ctx = Context::detached("req", vec![json!(1), json!("two")]);
        assert_eq!(ctx.event(), "req");
        assert_eq!(ctx.arg(1), Some(&json!("two")));
        assert_eq!(ctx.arg(2), None);
        assert!(ctx.connection().is_none());
        assert!(ctx.connection_id().is_none());

        ctx.args_mut().push(json!(null));
        assert_eq!(ctx.args().len(), 3);

        let err = ctx.emit("reply", vec![]).unwrap_err();
        assert!(matches!(err, TransportError::Disconnected(_)));
    }

    #[test]
    fn test_context_state_shorthands() {
        let mut ctx = Context::detached("req", vec![]);
        ctx.insert("foo", true);
        assert_eq!(ctx.get::<bool>("foo"), Some(&true));
        *ctx.get_mut::<bool>("foo").unwrap() = false;
        assert_eq!(ctx.remove::<bool>("foo"), Some(false));
        assert!(ctx.state().is_empty());
    }
}
