//! Per-node listener registries

use std::rc::Rc;

use indexmap::IndexMap;

use crate::graph::NodeId;
use crate::value::NodeValue;

/// Identifies a listener within the registry of the node it was added to.
///
/// Ids are allocated by the owning node and never reused by it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub(crate) u64);

/// Callback invoked with a node's value after each mutation
pub type Listener = Rc<dyn Fn(&NodeValue)>;

#[derive(Clone)]
pub(crate) enum ListenerEntry {
    /// Called with the value of the node that owns the registry
    Callback(Listener),
    /// Called with the value of another node (a pair reporting its joint state)
    Relay { node: NodeId, listener: Listener },
    /// Notifies every listener registered on another node (interpolation fan-out)
    Fanout(NodeId),
}

#[derive(Default)]
pub(crate) struct ListenerRegistry {
    next_id: u64,
    entries: IndexMap<ListenerId, ListenerEntry>,
}

impl ListenerRegistry {
    pub(crate) fn insert(&mut self, entry: ListenerEntry) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.entries.insert(id, entry);
        id
    }

    pub(crate) fn remove(&mut self, id: ListenerId) -> Option<ListenerEntry> {
        self.entries.shift_remove(&id)
    }

    pub(crate) fn retain(&mut self, mut keep: impl FnMut(&ListenerEntry) -> bool) {
        self.entries.retain(|_, entry| keep(entry));
    }

    pub(crate) fn snapshot(&self) -> Vec<ListenerEntry> {
        self.entries.values().cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
