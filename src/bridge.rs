//! Async pull adapter over a [`CoalescingHandoff`] fed by a [`NotificationSource`].

use alloc::sync::{Arc, Weak};
use core::fmt::{self, Debug};
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};
use std::sync::{Mutex, PoisonError};

use futures::Stream;
use log::{debug, trace};
use pin_project::pin_project;
use tokio::sync::oneshot;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::change::ObservedChange;
use crate::handoff::{
    CancelAction, CoalescingHandoff, PollResult, ProducedAction, RegisterResult,
};
use crate::options::ObservingOptions;
use crate::source::{ChangeHandler, NotificationSource};

type Waiter<E> = oneshot::Sender<Option<E>>;

/// Single-consumer async sequence of elements derived from the changes delivered by a
/// [`NotificationSource`].
///
/// The observation is established as soon as the stream is opened so no change is missed even
/// if the first pull happens much later.  While nobody is pulling, only the latest element is
/// retained; older unconsumed ones are dropped.
///
/// The sequence never ends on its own.  It ends when cancelled, either explicitly via
/// [`ObservationStream::cancel`] / [`Canceller`], or by dropping a suspended [`Next`] future.
/// Dropping the stream releases the underlying subscription.
pub struct ObservationStream<S: NotificationSource, E> {
    shared: Arc<Shared<S, E>>,

    /// Receiving half of the waiter registered in the handoff while a pull is suspended.
    in_flight: Option<oneshot::Receiver<Option<E>>>,
}

struct Shared<S: NotificationSource, E> {
    source: S,
    handoff: Mutex<CoalescingHandoff<E, Waiter<E>, S::Token>>,
}

/// Cloneable handle which ends an [`ObservationStream`] from anywhere, for example from another
/// task while the consumer is suspended in [`ObservationStream::next`].  Does not keep the
/// stream or its source alive.
#[derive(Clone)]
pub struct Canceller {
    shared: Weak<dyn CancelSequence>,
}

trait CancelSequence: Send + Sync {
    fn cancel(&self) -> bool;
}

impl<S, E> ObservationStream<S, E>
where
    S: NotificationSource + Send + Sync + 'static,
    E: Send + 'static,
{
    /// Subscribe to `path` on `source` immediately, mapping each delivered change through
    /// `extractor`.  Any change delivered before the first pull (including the initial value
    /// requested by [`ObservingOptions::initial`]) is buffered and returned by that pull
    /// without suspending.
    pub fn open<F>(source: S, path: &S::Path, options: ObservingOptions, extractor: F) -> Self
    where
        F: Fn(ObservedChange<S::Value>) -> E + Send + Sync + 'static,
    {
        let shared = Arc::new(Shared {
            source,
            handoff: Mutex::new(CoalescingHandoff::new()),
        });

        let weak_shared = Arc::downgrade(&shared);
        let handler: ChangeHandler<S::Value> = Box::new(move |change| {
            if let Some(shared) = weak_shared.upgrade() {
                shared.element_produced(extractor(change));
            }
        });

        let token = shared.source.subscribe(path, options, handler);
        shared.with_handoff(|handoff| handoff.subscription_established(token));
        debug!("Observation established with options [{options}]");

        Self {
            shared,
            in_flight: None,
        }
    }

    pub fn canceller(&self) -> Canceller {
        let shared: Arc<dyn CancelSequence> = self.shared.clone();
        Canceller {
            shared: Arc::downgrade(&shared),
        }
    }
}

impl<S: NotificationSource, E> ObservationStream<S, E> {
    /// Pull the next element, or `None` once the sequence has ended.  Resolves without
    /// suspending when an element is already buffered.
    ///
    /// Dropping the returned future while it is suspended cancels the whole sequence, just like
    /// [`ObservationStream::cancel`], unless a change was delivered to it first: that element is
    /// then kept for the next pull and the sequence continues.  Use the [`Stream`] implementation instead if pulls need
    /// to be abandoned and resumed (e.g. inside `tokio::select!`).
    pub fn next(&mut self) -> Next<'_, S, E> {
        Next {
            stream: self,
            suspended: false,
        }
    }

    /// Like [`ObservationStream::next`], but cancels the sequence and resolves to `None` when
    /// `token` is cancelled first.
    pub fn next_until<'a>(&'a mut self, token: &'a CancellationToken) -> NextUntil<'a, S, E> {
        NextUntil {
            next: self.next(),
            cancelled: token.cancelled(),
        }
    }

    /// End the sequence and release the subscription.  A suspended pull resolves to `None`.
    /// Returns `false` if the sequence had already ended.
    pub fn cancel(&mut self) -> bool {
        self.in_flight = None;
        self.shared.finish()
    }

    pub fn is_finished(&self) -> bool {
        self.shared.with_handoff(|handoff| handoff.is_finished())
    }

    fn poll_element(&mut self, cx: &mut Context<'_>) -> Poll<Option<E>> {
        if self.in_flight.is_none() {
            if let PollResult::Ready(element) = self.shared.with_handoff(|handoff| handoff.poll())
            {
                return Poll::Ready(element);
            }

            let (waiter, receiver) = oneshot::channel();
            match self
                .shared
                .with_handoff(|handoff| handoff.register_waiter(waiter))
            {
                RegisterResult::Ready(element) => return Poll::Ready(element),
                RegisterResult::Pending => {
                    trace!("Suspending until the next change");
                    self.in_flight = Some(receiver);
                }
            }
        }

        let receiver = match self.in_flight.as_mut() {
            Some(receiver) => receiver,
            None => return Poll::Ready(None),
        };
        match Pin::new(receiver).poll(cx) {
            Poll::Ready(result) => {
                self.in_flight = None;
                // A dropped waiter means the handoff itself went away: end-of-sequence.
                Poll::Ready(result.unwrap_or(None))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<S: NotificationSource, E> Stream for ObservationStream<S, E> {
    type Item = E;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().poll_element(cx)
    }
}

impl<S: NotificationSource, E> Drop for ObservationStream<S, E> {
    fn drop(&mut self) {
        if self.shared.finish() {
            debug!("Observation released on drop");
        }
    }
}

impl<S: NotificationSource, E> Debug for ObservationStream<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handoff = self.shared.with_handoff(|handoff| format!("{handoff:?}"));
        f.debug_struct("ObservationStream")
            .field("handoff", &handoff)
            .field("suspended", &self.in_flight.is_some())
            .finish()
    }
}

impl<S: NotificationSource, E> Shared<S, E> {
    fn with_handoff<R>(
        &self,
        f: impl FnOnce(&mut CoalescingHandoff<E, Waiter<E>, S::Token>) -> R,
    ) -> R {
        // Contract violations leave the handoff in a valid state, so poisoning is not fatal.
        let mut handoff = self.handoff.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut handoff)
    }

    fn element_produced(&self, element: E) {
        let action = self.with_handoff(|handoff| handoff.value_produced(element));
        self.resume(action);
    }

    fn resume(&self, mut action: ProducedAction<E, Waiter<E>>) {
        while let ProducedAction::WakeWaiter(waiter, element) = action {
            trace!("Resuming suspended consumer");
            match waiter.send(Some(element)) {
                Err(Some(element)) => {
                    trace!("Suspended consumer went away, keeping the element for the next pull");
                    action = self.with_handoff(|handoff| handoff.value_returned(element));
                }
                _ => return,
            }
        }
    }

    /// A suspended pull was dropped.  Ends the sequence unless a value already claimed the
    /// waiter, in which case that value stays available to the next pull.
    fn abandon(&self, mut receiver: oneshot::Receiver<Option<E>>) {
        let action = self.with_handoff(|handoff| handoff.abandon_waiter());
        if self.release_and_wake(action) {
            debug!("Pending pull abandoned, ending sequence");
            return;
        }

        // After close() a racing send fails and the producer returns the element itself.
        receiver.close();
        if let Ok(Some(element)) = receiver.try_recv() {
            trace!("Pending pull abandoned after delivery, keeping the element");
            let action = self.with_handoff(|handoff| handoff.value_returned(element));
            self.resume(action);
        }
    }

    fn finish(&self) -> bool {
        let action = self.with_handoff(|handoff| handoff.cancel());
        let cancelled = self.release_and_wake(action);
        if cancelled {
            debug!("Observation cancelled");
        }
        cancelled
    }

    fn release_and_wake(&self, action: CancelAction<Waiter<E>, S::Token>) -> bool {
        match action {
            CancelAction::None => false,
            CancelAction::Release(token) => {
                self.source.unsubscribe(token);
                true
            }
            CancelAction::WakeWaiterAndRelease(waiter, token) => {
                let _ = waiter.send(None);
                self.source.unsubscribe(token);
                true
            }
        }
    }
}

impl<S, E> CancelSequence for Shared<S, E>
where
    S: NotificationSource + Send + Sync,
    E: Send,
{
    fn cancel(&self) -> bool {
        self.finish()
    }
}

impl Canceller {
    /// End the associated sequence.  Returns `false` if it had already ended or the stream
    /// was dropped.
    pub fn cancel(&self) -> bool {
        match self.shared.upgrade() {
            Some(shared) => shared.cancel(),
            None => false,
        }
    }
}

impl Debug for Canceller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Canceller")
            .field("alive", &(self.shared.strong_count() > 0))
            .finish()
    }
}

/// Future returned by [`ObservationStream::next`].
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Next<'a, S: NotificationSource, E> {
    stream: &'a mut ObservationStream<S, E>,

    /// Whether the last poll of this future left it waiting on the handoff.
    suspended: bool,
}

impl<'a, S: NotificationSource, E> Future for Next<'a, S, E> {
    type Output = Option<E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let result = this.stream.poll_element(cx);
        this.suspended = result.is_pending();
        result
    }
}

impl<'a, S: NotificationSource, E> Drop for Next<'a, S, E> {
    fn drop(&mut self) {
        if !self.suspended {
            return;
        }
        if let Some(receiver) = self.stream.in_flight.take() {
            self.stream.shared.abandon(receiver);
        }
    }
}

/// Future returned by [`ObservationStream::next_until`].
#[pin_project]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct NextUntil<'a, S: NotificationSource, E> {
    #[pin]
    next: Next<'a, S, E>,
    #[pin]
    cancelled: WaitForCancellationFuture<'a>,
}

impl<'a, S: NotificationSource, E> Future for NextUntil<'a, S, E> {
    type Output = Option<E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut this = self.project();
        if let Poll::Ready(element) = this.next.as_mut().poll(cx) {
            return Poll::Ready(element);
        }
        match this.cancelled.poll(cx) {
            Poll::Ready(()) => {
                this.next.get_mut().stream.cancel();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
