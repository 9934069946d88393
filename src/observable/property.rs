use alloc::sync::Arc;
use core::fmt::{self, Debug};
use std::collections::HashMap;

use crate::change::ChangeKind;
use crate::observable::{ObservableMap, RegistrationToken};
use crate::options::ObservingOptions;
use crate::source::{ChangeHandler, NotificationSource};

/// A single observable value which may be empty, comparable to an optional property on an
/// object.  Cloning yields another handle to the same value.
///
/// ```
/// use futures::FutureExt;
/// use observe_stream::{ObserveExt, ObservingOptions, Property};
///
/// let name = Property::<String>::empty();
/// let mut names = name.values(&(), ObservingOptions::new());
///
/// name.set("Hika".to_string());
/// assert_eq!(names.next().now_or_never(), Some(Some(Some("Hika".to_string()))));
/// ```
pub struct Property<V> {
    inner: Arc<ObservableMap<(), V>>,
}

impl<V: Clone> Property<V> {
    pub fn new(value: V) -> Self {
        let values = HashMap::from([((), value)]);
        Self {
            inner: Arc::new(ObservableMap::with_values(values)),
        }
    }

    pub fn empty() -> Self {
        Self {
            inner: Arc::new(ObservableMap::new()),
        }
    }

    pub fn get(&self) -> Option<V> {
        self.inner.get(&())
    }

    /// Assign a new value.  Observers are notified even if the value is unchanged.
    pub fn set(&self, value: V) {
        self.inner.update((), Some(value), |_, _| Some(ChangeKind::Setting));
    }

    /// Reset to empty.  Observers see a change with no new value.
    pub fn clear(&self) {
        self.inner.update((), None, |_, _| Some(ChangeKind::Setting));
    }

    pub fn observer_count(&self) -> usize {
        self.inner.observer_count()
    }
}

impl<V: Clone> Default for Property<V> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<V> Clone for Property<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V: Clone + Debug> Debug for Property<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Property").field(&self.get()).finish()
    }
}

impl<V: Clone> NotificationSource for Property<V> {
    type Path = ();
    type Value = V;
    type Token = RegistrationToken<()>;

    fn subscribe(
        &self,
        _path: &(),
        options: ObservingOptions,
        handler: ChangeHandler<V>,
    ) -> Self::Token {
        self.inner.register((), options, handler)
    }

    fn unsubscribe(&self, token: Self::Token) {
        self.inner.deregister(token)
    }
}
