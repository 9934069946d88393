use alloc::boxed::Box;

use crate::change::ObservedChange;
use crate::options::ObservingOptions;

/// Callback invoked for each change of an observed path.  May be invoked from any thread, any
/// number of times, until the subscription is released.
pub type ChangeHandler<V> = Box<dyn Fn(ObservedChange<V>) + Send + Sync>;

/// Generalization of a callback-driven change observation mechanism, intended to make it easy
/// to bridge any platform or in-process observation facility into an
/// [`crate::ObservationStream`].
///
/// The token returned by [`NotificationSource::subscribe`] represents an active observation.
/// It is consumed by [`NotificationSource::unsubscribe`], so a token can only ever be released
/// once.
pub trait NotificationSource {
    /// What is being observed on this source (a key, a property path, or `()` for sources that
    /// only hold a single value).
    type Path: ?Sized;

    type Value;

    type Token: Send;

    /// Begin delivering changes for `path` to `handler`.  With
    /// [`ObservingOptions::initial`] set, `handler` must be invoked with the current value
    /// before this method returns.
    fn subscribe(
        &self,
        path: &Self::Path,
        options: ObservingOptions,
        handler: ChangeHandler<Self::Value>,
    ) -> Self::Token;

    /// Stop delivering changes to the handler registered with `token`.  Notifications that were
    /// already in flight may still arrive after this returns.
    fn unsubscribe(&self, token: Self::Token);
}
