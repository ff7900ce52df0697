//! Listener registry and subscription handles.
//!
//! One `RwLock` guards both the per-name listener lists and the interceptor
//! chain. Dispatch clones what it needs under the read lock and runs user
//! code with no lock held, so listeners may subscribe, unsubscribe or
//! dispatch re-entrantly.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use crate::interceptor::Interceptor;
use crate::listener::{Listener, SubscribeOptions};

pub(crate) struct ListenerEntry {
    pub(crate) id: u64,
    pub(crate) listener: Arc<dyn Listener>,
    pub(crate) options: SubscribeOptions,
    fired: AtomicBool,
}

impl ListenerEntry {
    pub(crate) fn new(id: u64, listener: Arc<dyn Listener>, options: SubscribeOptions) -> Self {
        Self {
            id,
            listener,
            options,
            fired: AtomicBool::new(false),
        }
    }

    /// Take the right to invoke this entry. `once` entries grant it to
    /// exactly one caller; others always grant it.
    pub(crate) fn claim(&self) -> bool {
        !self.options.once || !self.fired.swap(true, Ordering::AcqRel)
    }

    /// Give a claim back when the invocation never started.
    pub(crate) fn release(&self) {
        if self.options.once {
            self.fired.store(false, Ordering::Release);
        }
    }

    /// A `once` entry that has been claimed and is due for removal.
    pub(crate) fn is_spent(&self) -> bool {
        self.options.once && self.fired.load(Ordering::Acquire)
    }
}

#[derive(Default)]
pub(crate) struct Registry {
    listeners: HashMap<String, Vec<Arc<ListenerEntry>>>,
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl Registry {
    pub(crate) fn insert(&mut self, name: &str, entry: ListenerEntry) {
        let list = self.listeners.entry(name.to_string()).or_default();
        list.push(Arc::new(entry));
        // Stable: equal priorities keep subscription order.
        list.sort_by_key(|entry| entry.options.priority);
    }

    pub(crate) fn remove(&mut self, name: &str, id: u64) -> bool {
        let Some(list) = self.listeners.get_mut(name) else {
            return false;
        };
        let before = list.len();
        list.retain(|entry| entry.id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            self.listeners.remove(name);
        }
        removed
    }

    pub(crate) fn remove_all(&mut self, name: &str, ids: &[u64]) {
        if let Some(list) = self.listeners.get_mut(name) {
            list.retain(|entry| !ids.contains(&entry.id));
            if list.is_empty() {
                self.listeners.remove(name);
            }
        }
    }

    pub(crate) fn contains(&self, name: &str, id: u64) -> bool {
        self.listeners
            .get(name)
            .is_some_and(|list| list.iter().any(|entry| entry.id == id))
    }

    pub(crate) fn count(&self, name: &str) -> usize {
        self.listeners.get(name).map_or(0, Vec::len)
    }

    pub(crate) fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.listeners.keys().cloned().collect();
        names.sort();
        names
    }

    pub(crate) fn push_interceptor(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.interceptors.push(interceptor);
    }

    /// Copy of the listeners for `name` and the interceptor chain.
    pub(crate) fn snapshot(
        &self,
        name: &str,
    ) -> (Vec<Arc<ListenerEntry>>, Vec<Arc<dyn Interceptor>>) {
        (
            self.listeners.get(name).cloned().unwrap_or_default(),
            self.interceptors.clone(),
        )
    }
}

/// Handle returned by subscribe.
///
/// Dropping it leaves the listener registered; call
/// [`unsubscribe`](Subscription::unsubscribe) to remove it.
pub struct Subscription {
    name: String,
    id: u64,
    registry: Weak<RwLock<Registry>>,
    active: AtomicBool,
}

impl Subscription {
    pub(crate) fn new(name: &str, id: u64, registry: &Arc<RwLock<Registry>>) -> Self {
        Self {
            name: name.to_string(),
            id,
            registry: Arc::downgrade(registry),
            active: AtomicBool::new(true),
        }
    }

    /// A handle that was never registered. Unsubscribing it does nothing.
    pub fn noop() -> Self {
        Self {
            name: String::new(),
            id: 0,
            registry: Weak::new(),
            active: AtomicBool::new(false),
        }
    }

    pub fn event_name(&self) -> &str {
        &self.name
    }

    /// Remove exactly this listener. Later calls are no-ops.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&self.name, self.id);
        }
    }

    /// Whether the listener is still registered. False after unsubscribe,
    /// after a `once` listener has run, or once the dispatcher is gone.
    pub fn is_active(&self) -> bool {
        if !self.active.load(Ordering::Acquire) {
            return false;
        }
        self.registry.upgrade().is_some_and(|registry| {
            registry
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .contains(&self.name, self.id)
        })
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
