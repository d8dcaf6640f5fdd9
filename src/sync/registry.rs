//! Live listener set
//!
//! The registry is plain data with no interior locking. It is owned by the hub
//! task and only ever touched from there, so a fan-out pass can never observe
//! a concurrent insert or removal.

use std::collections::BTreeMap;
use std::fmt;

/// Process-unique identifier of one listener connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(pub u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Registered listeners keyed by id. Iteration order is ascending id.
pub struct Registry<S> {
    listeners: BTreeMap<ListenerId, S>,
}

impl<S> Registry<S> {
    pub fn new() -> Self {
        Self {
            listeners: BTreeMap::new(),
        }
    }

    /// Add a listener. Returns `false` and keeps the existing entry if the id
    /// is already registered.
    pub fn register(&mut self, id: ListenerId, sink: S) -> bool {
        if self.listeners.contains_key(&id) {
            return false;
        }
        self.listeners.insert(id, sink);
        true
    }

    /// Remove a listener, handing its sink back so the caller can close it.
    /// Absent ids are a no-op.
    pub fn deregister(&mut self, id: ListenerId) -> Option<S> {
        self.listeners.remove(&id)
    }

    /// Ids registered right now.
    pub fn snapshot(&self) -> Vec<ListenerId> {
        self.listeners.keys().copied().collect()
    }

    pub fn get_mut(&mut self, id: ListenerId) -> Option<&mut S> {
        self.listeners.get_mut(&id)
    }

    pub fn contains(&self, id: ListenerId) -> bool {
        self.listeners.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Empty the registry, yielding every sink.
    pub fn drain(&mut self) -> impl Iterator<Item = (ListenerId, S)> {
        std::mem::take(&mut self.listeners).into_iter()
    }
}

impl<S> Default for Registry<S> {
    fn default() -> Self {
        Self::new()
    }
}
