use crate::bridge::ObservationStream;
use crate::change::Change;
use crate::options::ObservingOptions;
use crate::source::NotificationSource;

/// Convenience constructors for the two common element shapes.  Implemented for every cloneable
/// [`NotificationSource`].
///
/// Prior notifications are not meaningful for these shapes and are never requested; use
/// [`ObservationStream::open`] with a custom extractor to receive them.
pub trait ObserveExt: NotificationSource + Clone + Send + Sync + Sized + 'static {
    /// Stream of the new value after each change.  `None` elements mean the value was cleared.
    /// The `new` option is always enabled.
    fn values(
        &self,
        path: &Self::Path,
        options: ObservingOptions,
    ) -> ObservationStream<Self, Option<Self::Value>>
    where
        Self::Value: Send + 'static,
    {
        let options = ObservingOptions {
            prior: false,
            ..options.with_new()
        };
        ObservationStream::open(self.clone(), path, options, |change| change.new_value)
    }

    /// Stream of old/new pairs.  Which halves are filled in follows `options`.
    fn changes(
        &self,
        path: &Self::Path,
        options: ObservingOptions,
    ) -> ObservationStream<Self, Change<Self::Value>>
    where
        Self::Value: Send + 'static,
    {
        let options = ObservingOptions {
            prior: false,
            ..options
        };
        ObservationStream::open(self.clone(), path, options, Change::from)
    }
}

impl<S> ObserveExt for S where S: NotificationSource + Clone + Send + Sync + 'static {}
