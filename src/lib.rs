//! Pull-based async streams over callback-driven change observation.
//!
//! Change notifications from a [`NotificationSource`] arrive whenever and on whatever thread the
//! source pleases.  [`ObservationStream`] turns them into a single-consumer async sequence that
//! never misses the first change, keeps only the latest unconsumed element, and can be
//! cancelled while waiting.
//!
//! # Examples
//! ```
//! use observe_stream::{KeyValueStore, ObserveExt, ObservingOptions};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let defaults = KeyValueStore::<String>::new();
//!     let mut changes = defaults.changes("user", ObservingOptions::new().with_old().with_new());
//!
//!     defaults.set("user", "Alice".to_string());
//!     defaults.set("user", "Bob".to_string());
//!
//!     let change = changes.next().await.unwrap();
//!     assert_eq!(change.old_value.as_deref(), Some("Alice"));
//!     assert_eq!(change.new_value.as_deref(), Some("Bob"));
//! }
//! ```

extern crate alloc;

pub use bridge::{Canceller, Next, NextUntil, ObservationStream};
pub use change::{Change, ChangeKind, ObservedChange};
pub use observable::{KeyValueStore, Property, RegistrationToken};
pub use options::{InvalidOption, ObservingOptions};
pub use sequence::ObserveExt;
pub use source::{ChangeHandler, NotificationSource};

pub mod bridge;
pub mod change;
pub mod handoff;
pub mod observable;
pub mod options;
pub mod sequence;
pub mod source;
