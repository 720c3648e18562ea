//! Listener registry.
//!
//! Maps event names to the ordered list of listeners registered for them.
//! Lookups return an immutable snapshot (`Arc<[ListenerEntry]>`); every
//! registration change builds a new list and swaps it in under the write
//! lock. A dispatch that already took its snapshot keeps iterating the old
//! list, and no reader ever observes a half-applied change.

use onio_core::{DynListener, Listener};
use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc, PoisonError, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};
use tracing::debug;

/// Identifies one registration returned by [`ListenerRegistry::register`].
///
/// Registering the same listener twice yields two distinct handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerHandle(u64);

impl ListenerHandle {
    /// The raw value.
    pub fn get(self) -> u64 {
        self.0
    }
}

/// A registered listener together with its handle.
#[derive(Clone)]
pub struct ListenerEntry {
    handle: ListenerHandle,
    listener: Arc<dyn DynListener>,
}

impl ListenerEntry {
    /// The registration handle.
    pub fn handle(&self) -> ListenerHandle {
        self.handle
    }

    /// The listener.
    pub fn listener(&self) -> &dyn DynListener {
        &*self.listener
    }
}

impl fmt::Debug for ListenerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerEntry")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

/// An immutable view of the listeners for one event, in registration order.
pub type ListenerSnapshot = Arc<[ListenerEntry]>;

/// Event name to listener list mapping.
///
/// Event names are compared exactly (case-sensitive). No name is reserved.
pub struct ListenerRegistry {
    routes: RwLock<HashMap<String, ListenerSnapshot>>,
    next_handle: AtomicU64,
}

impl ListenerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            routes: RwLock::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Append `listener` to the list for `event`.
    pub fn register<L: Listener>(&self, event: impl Into<String>, listener: L) -> ListenerHandle {
        self.register_dyn(event, Arc::new(listener))
    }

    /// Append an already type-erased listener to the list for `event`.
    pub fn register_dyn(
        &self,
        event: impl Into<String>,
        listener: Arc<dyn DynListener>,
    ) -> ListenerHandle {
        let event = event.into();
        let handle = ListenerHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let entry = ListenerEntry { handle, listener };

        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        let updated: ListenerSnapshot = match routes.get(&event) {
            Some(current) => current
                .iter()
                .cloned()
                .chain(std::iter::once(entry))
                .collect(),
            None => Arc::from(vec![entry]),
        };
        let count = updated.len();
        routes.insert(event.clone(), updated);
        drop(routes);

        debug!(%event, handle = handle.0, listeners = count, "Listener registered");
        handle
    }

    /// Remove the registration identified by `handle` from `event`.
    ///
    /// Returns `false` (and changes nothing) if no such registration exists.
    pub fn unregister(&self, event: &str, handle: ListenerHandle) -> bool {
        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        let Some(current) = routes.get(event) else {
            return false;
        };
        if !current.iter().any(|entry| entry.handle == handle) {
            return false;
        }

        let remaining: Vec<ListenerEntry> = current
            .iter()
            .filter(|entry| entry.handle != handle)
            .cloned()
            .collect();
        if remaining.is_empty() {
            routes.remove(event);
        } else {
            routes.insert(event.to_owned(), remaining.into());
        }
        drop(routes);

        debug!(%event, handle = handle.0, "Listener unregistered");
        true
    }

    /// Remove every listener for `event`. Returns how many were removed.
    pub fn unregister_all(&self, event: &str) -> usize {
        let removed = self
            .routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(event)
            .map_or(0, |entries| entries.len());
        if removed > 0 {
            debug!(%event, removed, "Listeners cleared");
        }
        removed
    }

    /// The listeners for `event` in registration order.
    ///
    /// Unknown events yield an empty snapshot.
    pub fn listeners_for(&self, event: &str) -> ListenerSnapshot {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event)
            .cloned()
            .unwrap_or_else(|| Arc::from(Vec::new()))
    }

    /// Number of listeners registered for `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event)
            .map_or(0, |entries| entries.len())
    }

    /// Names of all events with at least one listener.
    pub fn event_names(&self) -> Vec<String> {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Whether no listener is registered at all.
    pub fn is_empty(&self) -> bool {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let routes = self.routes.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_map()
            .entries(routes.iter().map(|(event, entries)| (event, entries.len())))
            .finish()
    }
}
