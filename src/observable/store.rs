use alloc::string::{String, ToString};
use alloc::sync::Arc;
use core::fmt::{self, Debug};

use crate::change::ChangeKind;
use crate::observable::{ObservableMap, RegistrationToken};
use crate::options::ObservingOptions;
use crate::source::{ChangeHandler, NotificationSource};

/// String keyed store whose entries can be observed individually, comparable to a user
/// defaults database.  Cloning yields another handle to the same store.
///
/// Setting a key that was absent is reported as [`ChangeKind::Insertion`], overwriting an
/// existing one as [`ChangeKind::Replacement`] and removing one as [`ChangeKind::Removal`].
pub struct KeyValueStore<V> {
    inner: Arc<ObservableMap<String, V>>,
}

impl<V: Clone> KeyValueStore<V> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ObservableMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.inner.get(key)
    }

    pub fn set(&self, key: impl Into<String>, value: V) {
        self.inner.update(key.into(), Some(value), |old, _| {
            Some(match old {
                Some(_) => ChangeKind::Replacement,
                None => ChangeKind::Insertion,
            })
        });
    }

    /// Remove `key`, notifying its observers only if it was present.
    pub fn remove(&self, key: &str) {
        self.inner.update(key.to_string(), None, |old, _| {
            old.map(|_| ChangeKind::Removal)
        });
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn observer_count(&self) -> usize {
        self.inner.observer_count()
    }
}

impl<V: Clone> Default for KeyValueStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Clone for KeyValueStore<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V> Debug for KeyValueStore<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyValueStore").finish_non_exhaustive()
    }
}

impl<V: Clone> NotificationSource for KeyValueStore<V> {
    type Path = str;
    type Value = V;
    type Token = RegistrationToken<String>;

    fn subscribe(
        &self,
        key: &str,
        options: ObservingOptions,
        handler: ChangeHandler<V>,
    ) -> Self::Token {
        self.inner.register(key.to_string(), options, handler)
    }

    fn unsubscribe(&self, token: Self::Token) {
        self.inner.deregister(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::{Change, ObservedChange};
    use crate::sequence::ObserveExt;
    use futures::FutureExt;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    type User = BTreeMap<&'static str, String>;

    fn user(fields: &[(&'static str, &str)]) -> User {
        fields
            .iter()
            .map(|(field, value)| (*field, value.to_string()))
            .collect()
    }

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[tokio::test]
    async fn test_produces_values() {
        init_logging();
        let defaults = KeyValueStore::<User>::new();
        let mut users = defaults.changes("user", ObservingOptions::new().with_new());

        defaults.set("user", user(&[("name", "Alice"), ("age", "23")]));
        let element = users.next().await.unwrap();
        let value = element.new_value.unwrap();
        assert_eq!(value["name"], "Alice");
        assert_eq!(value["age"], "23");

        defaults.set("user", user(&[("name", "Bob")]));
        let element = users.next().await.unwrap();
        assert_eq!(element.new_value.unwrap()["name"], "Bob");

        defaults.set("user", user(&[("name", "Charlie"), ("age", "42")]));
        let element = users.next().await.unwrap();
        let value = element.new_value.unwrap();
        assert_eq!(value["name"], "Charlie");
        assert_eq!(value["age"], "42");

        defaults.remove("user");
        let element = users.next().await.unwrap();
        assert_eq!(element.new_value, None);
        assert_eq!(element.old_value, None);
    }

    #[tokio::test]
    async fn test_includes_old_and_new_values() {
        init_logging();
        let defaults = KeyValueStore::<User>::new();
        let mut users = defaults.changes("user", ObservingOptions::new().with_old().with_new());

        // The second set supersedes the first, which survives only as the old value.
        defaults.set("user", user(&[("name", "Alice")]));
        defaults.set("user", user(&[("name", "Bob")]));

        assert_eq!(
            users.next().await,
            Some(Change {
                new_value: Some(user(&[("name", "Bob")])),
                old_value: Some(user(&[("name", "Alice")])),
            })
        );
    }

    #[test]
    fn test_receives_changes() {
        let defaults = KeyValueStore::<User>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = seen.clone();
        let token = defaults.subscribe(
            "user",
            ObservingOptions::new().with_old().with_new(),
            Box::new(move |change| recorder.lock().unwrap().push(change)),
        );

        defaults.set("user", user(&[("name", "Alice"), ("age", "23")]));
        defaults.remove("user");
        defaults.remove("user");
        defaults.unsubscribe(token);

        let seen = seen.lock().unwrap();
        assert_eq!(
            seen.as_slice(),
            &[
                ObservedChange::new(
                    ChangeKind::Insertion,
                    Some(user(&[("name", "Alice"), ("age", "23")])),
                    None,
                ),
                ObservedChange::new(
                    ChangeKind::Removal,
                    None,
                    Some(user(&[("name", "Alice"), ("age", "23")])),
                ),
            ]
        );
        assert_eq!(defaults.observer_count(), 0);
    }

    #[test]
    fn test_keys_are_observed_independently() {
        let store = KeyValueStore::<u32>::new();
        let mut a = store.values("a", ObservingOptions::new());
        let mut b = store.values("b", ObservingOptions::new());

        store.set("a", 1);
        assert_eq!(a.next().now_or_never(), Some(Some(Some(1))));
        assert!(b.next().now_or_never().is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_replacement_kind() {
        let store = KeyValueStore::<u32>::new();
        store.set("k", 1);
        let mut kinds = crate::ObservationStream::open(
            store.clone(),
            "k",
            ObservingOptions::new(),
            |change| change.kind,
        );

        store.set("k", 2);
        assert_eq!(
            kinds.next().now_or_never(),
            Some(Some(ChangeKind::Replacement))
        );
    }
}
