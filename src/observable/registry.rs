use alloc::sync::Arc;
use core::fmt::Debug;
use core::hash::Hash;
use std::collections::HashMap;

use log::{debug, warn};

use crate::change::ObservedChange;
use crate::options::ObservingOptions;
use crate::source::ChangeHandler;

pub(crate) type SharedHandler<V> = Arc<dyn Fn(ObservedChange<V>) + Send + Sync>;

/// Bookkeeping of which handlers observe which key, grouped by key so that a change only has
/// to look at its own observers.
pub(crate) struct ObserverRegistry<K, V> {
    next_id: u64,
    registrations_by_key: HashMap<K, Vec<Registration<V>>>,
}

struct Registration<V> {
    id: u64,
    observer: Observer<V>,
}

/// Snapshot of a single registration, taken so that handlers can be invoked without holding
/// any lock.
pub(crate) struct Observer<V> {
    pub options: ObservingOptions,
    pub handler: SharedHandler<V>,
}

/// Subscription token for the in-memory sources in this module.  Not `Clone`: the token is
/// consumed when the observation is released.
#[derive(Debug, PartialEq, Eq)]
pub struct RegistrationToken<K> {
    key: K,
    id: u64,
}

impl<K: Eq + Hash + Clone + Debug, V> ObserverRegistry<K, V> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            registrations_by_key: HashMap::new(),
        }
    }

    pub fn register(
        &mut self,
        key: K,
        options: ObservingOptions,
        handler: ChangeHandler<V>,
    ) -> (RegistrationToken<K>, Observer<V>) {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);

        let observer = Observer {
            options,
            handler: Arc::from(handler),
        };
        let snapshot = observer.clone();
        let for_key = self.registrations_by_key.entry(key.clone()).or_default();
        for_key.push(Registration { id, observer });
        debug!(
            "Registered observer #{id} for {key:?} ({} total)",
            for_key.len()
        );

        (RegistrationToken { key, id }, snapshot)
    }

    pub fn deregister(&mut self, token: RegistrationToken<K>) {
        let RegistrationToken { key, id } = token;
        let for_key = match self.registrations_by_key.get_mut(&key) {
            Some(for_key) => for_key,
            None => {
                warn!("No observers registered for {key:?}, cannot release #{id}");
                return;
            }
        };
        let before = for_key.len();
        for_key.retain(|registration| registration.id != id);
        if for_key.len() == before {
            warn!("Observer #{id} for {key:?} was already released");
        } else {
            debug!("Released observer #{id} for {key:?}");
        }
        if for_key.is_empty() {
            self.registrations_by_key.remove(&key);
        }
    }

    pub fn observers_for(&self, key: &K) -> Vec<Observer<V>> {
        self.registrations_by_key
            .get(key)
            .map(|for_key| {
                for_key
                    .iter()
                    .map(|registration| registration.observer.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.registrations_by_key.values().map(Vec::len).sum()
    }
}

impl<V> Clone for Observer<V> {
    fn clone(&self) -> Self {
        Self {
            options: self.options,
            handler: self.handler.clone(),
        }
    }
}

impl<V: Clone> Observer<V> {
    /// Deliver a change, filling in only the payloads this observer asked for.
    pub fn notify(&self, change: &ObservedChange<V>) {
        let filtered = ObservedChange {
            kind: change.kind,
            new_value: change.new_value.clone().filter(|_| self.options.new),
            old_value: change.old_value.clone().filter(|_| self.options.old),
            is_prior: change.is_prior,
        };
        (self.handler)(filtered);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::ChangeKind;
    use std::sync::Mutex;

    fn recording_handler(log: &Arc<Mutex<Vec<ObservedChange<u32>>>>) -> ChangeHandler<u32> {
        let log = log.clone();
        Box::new(move |change| log.lock().unwrap().push(change))
    }

    #[test]
    fn test_register_and_deregister() {
        let mut registry = ObserverRegistry::<String, u32>::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let (a, _) = registry.register(
            "a".to_string(),
            ObservingOptions::new(),
            recording_handler(&log),
        );
        let (b, _) = registry.register(
            "a".to_string(),
            ObservingOptions::new(),
            recording_handler(&log),
        );
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.observers_for(&"a".to_string()).len(), 2);
        assert!(registry.observers_for(&"b".to_string()).is_empty());

        registry.deregister(a);
        assert_eq!(registry.len(), 1);
        registry.deregister(b);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_notify_filters_payloads() {
        let mut registry = ObserverRegistry::<(), u32>::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let (_, observer) =
            registry.register((), ObservingOptions::new().with_old(), recording_handler(&log));
        observer.notify(&ObservedChange::new(ChangeKind::Setting, Some(2), Some(1)));

        assert_eq!(
            log.lock().unwrap().as_slice(),
            &[ObservedChange::new(ChangeKind::Setting, None, Some(1))]
        );
    }
}
