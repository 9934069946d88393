//! Coalescing single-slot handoff between a push-style producer and a single pull-style
//! consumer.
//!
//! The state machine is pure: every operation mutates the state and returns a description of
//! what the caller must do next (resume a waiter, release a subscription token).  Callers are
//! expected to hold one lock across each call and perform the returned actions only after
//! releasing it.

use core::fmt;
use core::mem;

/// Zero-or-one buffered element, zero-or-one suspended consumer and the subscription token,
/// transitioning `AwaitingSubscription -> Buffering -> Finished`.
pub struct CoalescingHandoff<E, W, T> {
    state: HandoffState<E, W, T>,
}

enum HandoffState<E, W, T> {
    /// The subscription has not been established yet.  Only the latest value is kept around to
    /// avoid unbounded growth.
    AwaitingSubscription { pending: Option<E> },

    /// Normal operating state.  `pending` and `waiting` are never both occupied.
    Buffering {
        pending: Option<E>,
        waiting: Option<W>,
        token: T,
    },

    Finished,
}

/// Outcome of [`CoalescingHandoff::poll`].
#[derive(Debug, PartialEq, Eq)]
pub enum PollResult<E> {
    /// `Ready(None)` signals end-of-sequence.
    Ready(Option<E>),

    /// Nothing buffered; the caller must suspend via [`CoalescingHandoff::register_waiter`].
    MustSuspend,
}

/// Outcome of [`CoalescingHandoff::register_waiter`].
#[derive(Debug, PartialEq, Eq)]
pub enum RegisterResult<E> {
    /// A value (or end-of-sequence) became available between `poll` and `register_waiter`.
    /// The handle was not stored.
    Ready(Option<E>),

    /// The handle is stored and will be returned by a later `value_produced` or `cancel`.
    Pending,
}

/// Outcome of [`CoalescingHandoff::value_produced`].
#[must_use = "a returned waiter must be resumed with the value"]
#[derive(Debug, PartialEq, Eq)]
pub enum ProducedAction<E, W> {
    None,
    WakeWaiter(W, E),
}

/// Outcome of [`CoalescingHandoff::cancel`].
#[must_use = "a returned waiter must be resumed and a returned token released"]
#[derive(Debug, PartialEq, Eq)]
pub enum CancelAction<W, T> {
    /// Already finished (or never subscribed), nothing to do.
    None,

    /// No consumer was waiting; release the subscription.
    Release(T),

    /// Resume the waiter with end-of-sequence, then release the subscription.
    WakeWaiterAndRelease(W, T),
}

impl<E, W, T> CoalescingHandoff<E, W, T> {
    pub fn new() -> Self {
        Self {
            state: HandoffState::AwaitingSubscription { pending: None },
        }
    }

    /// Record the subscription token.  Must be called exactly once, before any `poll`.
    pub fn subscription_established(&mut self, token: T) {
        match mem::replace(&mut self.state, HandoffState::Finished) {
            HandoffState::AwaitingSubscription { pending } => {
                self.state = HandoffState::Buffering {
                    pending,
                    waiting: None,
                    token,
                };
            }
            HandoffState::Buffering { .. } => {
                panic!("subscription_established called twice");
            }
            HandoffState::Finished => {
                panic!("subscription_established called after the sequence finished");
            }
        }
    }

    /// Consumer asks for the next element without yet being willing to suspend.
    pub fn poll(&mut self) -> PollResult<E> {
        match &mut self.state {
            HandoffState::AwaitingSubscription { .. } => {
                panic!("poll called before the subscription was established");
            }
            HandoffState::Buffering {
                pending, waiting, ..
            } => {
                assert!(
                    waiting.is_none(),
                    "poll called while another consumer is suspended"
                );
                match pending.take() {
                    Some(value) => PollResult::Ready(Some(value)),
                    None => PollResult::MustSuspend,
                }
            }
            HandoffState::Finished => PollResult::Ready(None),
        }
    }

    /// Consumer suspends after `poll` returned [`PollResult::MustSuspend`].
    pub fn register_waiter(&mut self, handle: W) -> RegisterResult<E> {
        match &mut self.state {
            HandoffState::AwaitingSubscription { .. } => {
                panic!("register_waiter called before the subscription was established");
            }
            HandoffState::Buffering {
                pending, waiting, ..
            } => {
                assert!(
                    waiting.is_none(),
                    "register_waiter called while another consumer is suspended"
                );
                match pending.take() {
                    Some(value) => RegisterResult::Ready(Some(value)),
                    None => {
                        *waiting = Some(handle);
                        RegisterResult::Pending
                    }
                }
            }
            HandoffState::Finished => RegisterResult::Ready(None),
        }
    }

    /// Producer delivered a value, possibly from a different thread than the consumer.
    pub fn value_produced(&mut self, value: E) -> ProducedAction<E, W> {
        match &mut self.state {
            HandoffState::AwaitingSubscription { pending } => {
                *pending = Some(value);
                ProducedAction::None
            }
            HandoffState::Buffering {
                pending, waiting, ..
            } => match waiting.take() {
                Some(waiter) => {
                    debug_assert!(pending.is_none());
                    ProducedAction::WakeWaiter(waiter, value)
                }
                None => {
                    *pending = Some(value);
                    ProducedAction::None
                }
            },
            HandoffState::Finished => ProducedAction::None,
        }
    }

    /// Consumer abandons the sequence.  Transitions to `Finished` unconditionally; idempotent.
    pub fn cancel(&mut self) -> CancelAction<W, T> {
        match mem::replace(&mut self.state, HandoffState::Finished) {
            HandoffState::AwaitingSubscription { .. } | HandoffState::Finished => {
                CancelAction::None
            }
            HandoffState::Buffering {
                waiting: Some(waiter),
                token,
                ..
            } => CancelAction::WakeWaiterAndRelease(waiter, token),
            HandoffState::Buffering {
                waiting: None,
                token,
                ..
            } => CancelAction::Release(token),
        }
    }

    /// Consumer drops a suspended pull.  Ends the sequence like [`CoalescingHandoff::cancel`]
    /// only while its waiter is still registered; if a value already claimed the waiter the
    /// delivery won and nothing changes.
    pub fn abandon_waiter(&mut self) -> CancelAction<W, T> {
        if self.has_waiter() {
            self.cancel()
        } else {
            CancelAction::None
        }
    }

    /// Hand back a value that was claimed for a waiter but never received.  Unlike
    /// `value_produced` it never replaces a newer pending value.
    pub fn value_returned(&mut self, value: E) -> ProducedAction<E, W> {
        match &mut self.state {
            HandoffState::AwaitingSubscription { pending } => {
                if pending.is_none() {
                    *pending = Some(value);
                }
            }
            HandoffState::Buffering {
                pending, waiting, ..
            } => {
                if let Some(waiter) = waiting.take() {
                    return ProducedAction::WakeWaiter(waiter, value);
                }
                if pending.is_none() {
                    *pending = Some(value);
                }
            }
            HandoffState::Finished => {}
        }
        ProducedAction::None
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, HandoffState::Finished)
    }

    fn has_waiter(&self) -> bool {
        matches!(
            self.state,
            HandoffState::Buffering {
                waiting: Some(_),
                ..
            }
        )
    }
}

impl<E, W, T> Default for CoalescingHandoff<E, W, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E, W, T> fmt::Debug for CoalescingHandoff<E, W, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            HandoffState::AwaitingSubscription { pending } => f
                .debug_struct("AwaitingSubscription")
                .field("pending", &pending.is_some())
                .finish(),
            HandoffState::Buffering {
                pending, waiting, ..
            } => f
                .debug_struct("Buffering")
                .field("pending", &pending.is_some())
                .field("waiting", &waiting.is_some())
                .finish(),
            HandoffState::Finished => f.write_str("Finished"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestHandoff = CoalescingHandoff<&'static str, u32, &'static str>;

    fn subscribed() -> TestHandoff {
        let mut handoff = TestHandoff::new();
        handoff.subscription_established("token");
        handoff
    }

    #[test]
    fn test_value_before_subscription_is_kept() {
        let mut handoff = TestHandoff::new();
        assert_eq!(handoff.value_produced("a"), ProducedAction::None);
        assert_eq!(handoff.value_produced("b"), ProducedAction::None);
        handoff.subscription_established("token");

        assert_eq!(handoff.poll(), PollResult::Ready(Some("b")));
        assert_eq!(handoff.poll(), PollResult::MustSuspend);
    }

    #[test]
    fn test_coalesces_to_latest() {
        let mut handoff = subscribed();
        for value in ["1", "2", "3", "4"] {
            assert_eq!(handoff.value_produced(value), ProducedAction::None);
        }
        assert_eq!(handoff.poll(), PollResult::Ready(Some("4")));
        assert_eq!(handoff.poll(), PollResult::MustSuspend);
    }

    #[test]
    fn test_waiter_is_woken_with_value() {
        let mut handoff = subscribed();
        assert_eq!(handoff.poll(), PollResult::MustSuspend);
        assert_eq!(handoff.register_waiter(7), RegisterResult::Pending);
        assert!(handoff.has_waiter());

        assert_eq!(
            handoff.value_produced("hello"),
            ProducedAction::WakeWaiter(7, "hello")
        );
        assert!(!handoff.has_waiter());

        // Nothing was buffered on the way through.
        assert_eq!(handoff.poll(), PollResult::MustSuspend);
    }

    #[test]
    fn test_register_after_concurrent_delivery() {
        let mut handoff = subscribed();
        assert_eq!(handoff.poll(), PollResult::MustSuspend);
        assert_eq!(handoff.value_produced("raced"), ProducedAction::None);
        assert_eq!(handoff.register_waiter(1), RegisterResult::Ready(Some("raced")));
        assert!(!handoff.has_waiter());
    }

    #[test]
    fn test_register_after_concurrent_cancel() {
        let mut handoff = subscribed();
        assert_eq!(handoff.poll(), PollResult::MustSuspend);
        assert_eq!(handoff.cancel(), CancelAction::Release("token"));
        assert_eq!(handoff.register_waiter(1), RegisterResult::Ready(None));
    }

    #[test]
    fn test_cancel_wakes_waiter_and_releases() {
        let mut handoff = subscribed();
        assert_eq!(handoff.poll(), PollResult::MustSuspend);
        assert_eq!(handoff.register_waiter(3), RegisterResult::Pending);
        assert_eq!(
            handoff.cancel(),
            CancelAction::WakeWaiterAndRelease(3, "token")
        );
        assert!(handoff.is_finished());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let mut handoff = subscribed();
        assert_eq!(handoff.cancel(), CancelAction::Release("token"));
        assert_eq!(handoff.cancel(), CancelAction::None);
        assert!(handoff.is_finished());
    }

    #[test]
    fn test_finished_is_stable() {
        let mut handoff = subscribed();
        let _ = handoff.cancel();
        assert_eq!(handoff.value_produced("late"), ProducedAction::None);
        assert_eq!(handoff.poll(), PollResult::Ready(None));
        assert_eq!(handoff.poll(), PollResult::Ready(None));
    }

    #[test]
    fn test_cancel_drops_pending_value() {
        let mut handoff = subscribed();
        assert_eq!(handoff.value_produced("unread"), ProducedAction::None);
        assert_eq!(handoff.cancel(), CancelAction::Release("token"));
        assert_eq!(handoff.poll(), PollResult::Ready(None));
    }

    #[test]
    fn test_abandon_after_delivery_keeps_sequence() {
        let mut handoff = subscribed();
        assert_eq!(handoff.register_waiter(5), RegisterResult::Pending);
        assert_eq!(
            handoff.value_produced("won"),
            ProducedAction::WakeWaiter(5, "won")
        );

        assert_eq!(handoff.abandon_waiter(), CancelAction::None);
        assert!(!handoff.is_finished());
        assert_eq!(handoff.value_returned("won"), ProducedAction::None);
        assert_eq!(handoff.poll(), PollResult::Ready(Some("won")));
    }

    #[test]
    fn test_abandon_while_waiting_finishes() {
        let mut handoff = subscribed();
        assert_eq!(handoff.register_waiter(5), RegisterResult::Pending);
        assert_eq!(
            handoff.abandon_waiter(),
            CancelAction::WakeWaiterAndRelease(5, "token")
        );
        assert!(handoff.is_finished());
    }

    #[test]
    fn test_returned_value_never_replaces_newer() {
        let mut handoff = subscribed();
        assert_eq!(handoff.value_produced("newer"), ProducedAction::None);
        assert_eq!(handoff.value_returned("older"), ProducedAction::None);
        assert_eq!(handoff.poll(), PollResult::Ready(Some("newer")));
    }

    #[test]
    fn test_returned_value_wakes_new_waiter() {
        let mut handoff = subscribed();
        assert_eq!(handoff.register_waiter(9), RegisterResult::Pending);
        assert_eq!(
            handoff.value_returned("kept"),
            ProducedAction::WakeWaiter(9, "kept")
        );

        let _ = handoff.cancel();
        assert_eq!(handoff.value_returned("late"), ProducedAction::None);
        assert_eq!(handoff.poll(), PollResult::Ready(None));
    }

    #[test]
    #[should_panic(expected = "before the subscription was established")]
    fn test_poll_before_subscription_panics() {
        let mut handoff = TestHandoff::new();
        let _ = handoff.poll();
    }

    #[test]
    #[should_panic(expected = "another consumer is suspended")]
    fn test_second_waiter_panics() {
        let mut handoff = subscribed();
        assert_eq!(handoff.register_waiter(1), RegisterResult::Pending);
        let _ = handoff.register_waiter(2);
    }

    #[test]
    #[should_panic(expected = "called twice")]
    fn test_double_subscription_panics() {
        let mut handoff = subscribed();
        handoff.subscription_established("again");
    }
}
