//! # turnstile-limit
//!
//! `turnstile-limit` provides the admission primitives used by the turnstile
//! request pipeline.
//!
//! ## Key Concepts
//!
//! * **Fixed windows**: [`FixedWindow`] counts admissions in a window that
//!   starts with the first request it sees and resets once the window elapses.
//! * **Partitioning**: [`KeyedFixedWindow`] keeps one fixed window per caller
//!   key (a remote address, for example) in a sharded map, so callers never
//!   contend with each other.
//! * **Windowed counters**: [`CounterStore`] maps a key to a count and an expiry
//!   instant. Expiry is lazy: an expired entry reads as absent.
//!
//! ## Example
//!
//! ```rust
//! use turnstile_limit::KeyedFixedWindow;
//! use turnstile_limit::KeyedStrategy;
//! use std::time::Duration;
//! use std::num::NonZeroUsize;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let limit = NonZeroUsize::new(5).unwrap();
//! let limiter = KeyedFixedWindow::new(limit, Duration::from_secs(10));
//!
//! if limiter.process("203.0.113.7").is_continue() {
//!     // Request allowed
//! }
//! # }
//! ```

use std::fmt::Debug;
use std::ops::ControlFlow;
use std::time::Duration;

mod counter_store;
mod fixed_window;
mod keyed;

pub use counter_store::CounterEntry;
pub use counter_store::CounterStore;
pub use counter_store::next_utc_midnight;
pub use fixed_window::FixedWindow;
pub use fixed_window::MAX_CAPACITY;
pub use keyed::KeyedFixedWindow;

/// Reasons why a request might be rejected by a strategy.
#[derive(Debug, PartialEq)]
pub enum Reason {
    Overloaded { retry_after: Duration },
}

/// The core trait for a single admission window.
///
/// Strategies must be `Send` and `Sync` to allow sharing across thread boundaries
/// via `Arc`.
pub trait Strategy: Debug {
    /// Attempts to admit a single request.
    ///
    /// This method is non-blocking and uses atomic operations to update
    /// internal state.
    ///
    /// # Errors
    ///
    /// Returns `Reason` if the limit has been reached.
    fn process(&self) -> ControlFlow<Reason>;
}

/// A strategy that keeps independent state per caller key.
pub trait KeyedStrategy: Debug {
    /// Attempts to admit a single request on behalf of `key`.
    ///
    /// # Errors
    ///
    /// Returns `Reason` if the limit for `key` has been reached.
    fn process(&self, key: &str) -> ControlFlow<Reason>;
}
