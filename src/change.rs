/// How the observed value changed.  Mirrors the classic key-value observing change kinds so
/// that sources backed by collections can describe what happened to the key.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// The value was assigned as a whole.
    Setting,
    Insertion,
    Removal,
    Replacement,
}

/// Raw change record delivered by a [`crate::source::NotificationSource`] to its handlers.
///
/// Which payloads are present depends on the [`crate::ObservingOptions`] used to subscribe:
/// `new_value` is only filled in when `new` was requested, `old_value` only when `old` was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedChange<V> {
    pub kind: ChangeKind,
    pub new_value: Option<V>,
    pub old_value: Option<V>,

    /// Set for the extra notification sent *before* a change when subscribed with
    /// [`crate::ObservingOptions::with_prior`].
    pub is_prior: bool,
}

/// Element of [`crate::ObserveExt::changes`]: the old and new value of a single change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change<V> {
    pub new_value: Option<V>,
    pub old_value: Option<V>,
}

impl<V> ObservedChange<V> {
    pub fn new(kind: ChangeKind, new_value: Option<V>, old_value: Option<V>) -> Self {
        Self {
            kind,
            new_value,
            old_value,
            is_prior: false,
        }
    }

    pub(crate) fn prior(kind: ChangeKind, old_value: Option<V>) -> Self {
        Self {
            kind,
            new_value: None,
            old_value,
            is_prior: true,
        }
    }
}

impl<V> From<ObservedChange<V>> for Change<V> {
    fn from(change: ObservedChange<V>) -> Self {
        Self {
            new_value: change.new_value,
            old_value: change.old_value,
        }
    }
}
