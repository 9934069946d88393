//! In-process observable values implementing [`crate::NotificationSource`].
//!
//! Two flavours are provided: [`Property`], a single typed value, and [`KeyValueStore`], a
//! string keyed map whose keys can be observed individually.  Handlers run synchronously on the
//! thread performing the mutation, after the data lock has been released.  Dispatch is
//! serialized per source so every observer sees changes in mutation order.  Handlers may
//! subscribe to (or unsubscribe from) the source they observe, but must not mutate it: doing so
//! panics.

pub use property::Property;
pub use registry::RegistrationToken;
pub use store::KeyValueStore;

mod property;
mod registry;
mod store;

use core::borrow::Borrow;
use core::fmt::Debug;
use core::hash::Hash;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use log::trace;

use crate::change::{ChangeKind, ObservedChange};
use crate::options::ObservingOptions;
use crate::source::ChangeHandler;
use registry::ObserverRegistry;

/// Shared machinery behind [`Property`] and [`KeyValueStore`]: values by key plus the observers
/// of each key.
struct ObservableMap<K, V> {
    inner: Mutex<Inner<K, V>>,

    /// Held for the duration of a mutation and its notifications.
    dispatch: Mutex<()>,

    /// Thread currently holding `dispatch`.
    dispatch_owner: Mutex<Option<ThreadId>>,
}

/// Ownership of the dispatch lock.  The owner is cleared before the lock is released.
struct DispatchGuard<'a> {
    owner: &'a Mutex<Option<ThreadId>>,
    _lock: MutexGuard<'a, ()>,
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        *self.owner.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

struct Inner<K, V> {
    values: HashMap<K, V>,
    registry: ObserverRegistry<K, V>,
}

impl<K: Eq + Hash + Clone + Debug, V: Clone> ObservableMap<K, V> {
    fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                values: HashMap::new(),
                registry: ObserverRegistry::new(),
            }),
            dispatch: Mutex::new(()),
            dispatch_owner: Mutex::new(None),
        }
    }

    fn with_values(values: HashMap<K, V>) -> Self {
        let map = Self::new();
        map.lock_inner().values = values;
        map
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner<K, V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_dispatch_owner(&self) -> MutexGuard<'_, Option<ThreadId>> {
        self.dispatch_owner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the dispatch lock, or `None` if this thread already holds it (that is, we are being
    /// called from a handler).
    fn enter_dispatch(&self) -> Option<DispatchGuard<'_>> {
        let current = thread::current().id();
        if *self.lock_dispatch_owner() == Some(current) {
            return None;
        }
        let lock = self.dispatch.lock().unwrap_or_else(PoisonError::into_inner);
        *self.lock_dispatch_owner() = Some(current);
        Some(DispatchGuard {
            owner: &self.dispatch_owner,
            _lock: lock,
        })
    }

    fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.lock_inner().values.get(key).cloned()
    }

    fn len(&self) -> usize {
        self.lock_inner().values.len()
    }

    fn observer_count(&self) -> usize {
        self.lock_inner().registry.len()
    }

    /// Replace (`Some`) or remove (`None`) the value under `key` and notify its observers.
    /// `classify` decides the change kind from the old and new value, or skips the update
    /// entirely by returning `None`.
    fn update(
        &self,
        key: K,
        value: Option<V>,
        classify: impl FnOnce(Option<&V>, Option<&V>) -> Option<ChangeKind>,
    ) {
        let _dispatch = match self.enter_dispatch() {
            Some(guard) => guard,
            None => panic!("handlers must not mutate the source they observe (key {key:?})"),
        };

        let (kind, old_value, observers) = {
            let inner = self.lock_inner();
            let old_value = inner.values.get(&key).cloned();
            let kind = match classify(old_value.as_ref(), value.as_ref()) {
                Some(kind) => kind,
                None => return,
            };
            (kind, old_value, inner.registry.observers_for(&key))
        };

        let prior = ObservedChange::prior(kind, old_value.clone());
        for observer in observers.iter().filter(|observer| observer.options.prior) {
            observer.notify(&prior);
        }

        {
            let mut inner = self.lock_inner();
            match &value {
                Some(value) => inner.values.insert(key.clone(), value.clone()),
                None => inner.values.remove(&key),
            };
        }

        trace!(
            "{kind:?} on {key:?}, notifying {} observer(s)",
            observers.len()
        );
        let change = ObservedChange::new(kind, value, old_value);
        for observer in &observers {
            observer.notify(&change);
        }
    }

    fn register(
        &self,
        key: K,
        options: ObservingOptions,
        handler: ChangeHandler<V>,
    ) -> RegistrationToken<K> {
        // Already held when a handler subscribes; delivery order is preserved either way.
        let _dispatch = self.enter_dispatch();

        let (token, observer, current) = {
            let mut inner = self.lock_inner();
            let current = inner.values.get(&key).cloned();
            let (token, observer) = inner.registry.register(key, options, handler);
            (token, observer, current)
        };

        if options.initial {
            observer.notify(&ObservedChange::new(ChangeKind::Setting, current, None));
        }
        token
    }

    fn deregister(&self, token: RegistrationToken<K>) {
        self.lock_inner().registry.deregister(token);
    }
}
