use std::num::NonZeroUsize;
use std::ops::ControlFlow;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::time::Instant;

use super::Reason;
use super::Strategy;

// The window state is one word: the expiry in milliseconds since `anchor`
// above the low COUNT_BITS, and the number of admissions below them.
const COUNT_BITS: u32 = 24;
const COUNT_MASK: u64 = (1 << COUNT_BITS) - 1;
const MAX_EXPIRES: u64 = u64::MAX >> COUNT_BITS;

/// The largest capacity a [`FixedWindow`] can enforce. Larger values are clamped.
pub const MAX_CAPACITY: usize = COUNT_MASK as usize;

fn pack(expires: u64, used: u64) -> u64 {
    (expires << COUNT_BITS) | used
}

fn unpack(state: u64) -> (u64, u64) {
    (state >> COUNT_BITS, state & COUNT_MASK)
}

/// A simple window-based limiter.
///
/// A window opens with the first request after the previous one has elapsed,
/// so boundaries are aligned to traffic rather than to the wall clock. Up to
/// `capacity` requests are admitted per window; there is no queueing.
///
/// Opening a window and counting an admission are a single compare and swap,
/// so a request racing a rollover is counted in exactly one window.
/// Time is read from `tokio::time` at millisecond resolution, so a paused
/// runtime controls it in tests.
#[derive(Debug)]
pub struct FixedWindow {
    capacity: u64,
    // Zero expiry means no window has been opened yet.
    state: AtomicU64,
    interval: u64,
    anchor: Instant,
}

impl Strategy for FixedWindow {
    fn process(&self) -> ControlFlow<Reason> {
        let now = self.elapsed_millis();

        let result = self
            .state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |state| {
                let (expires, used) = unpack(state);
                if now >= expires {
                    let next_expires = now.saturating_add(self.interval).min(MAX_EXPIRES);
                    Some(pack(next_expires, 1))
                } else if used < self.capacity {
                    Some(pack(expires, used + 1))
                } else {
                    None
                }
            });

        match result {
            Ok(_) => ControlFlow::Continue(()),
            Err(state) => {
                let (expires, _) = unpack(state);
                ControlFlow::Break(Reason::Overloaded {
                    retry_after: Duration::from_millis(expires.saturating_sub(now)),
                })
            }
        }
    }
}

impl FixedWindow {
    /// Creates a new `FixedWindow` strategy.
    ///
    /// # Arguments
    ///
    /// * `capacity` - The maximum number of requests allowed within a single
    ///   window, at most [`MAX_CAPACITY`].
    /// * `interval` - The duration of the fixed time window, in whole milliseconds.
    pub fn new(capacity: NonZeroUsize, interval: Duration) -> Self {
        Self {
            capacity: capacity.get().min(MAX_CAPACITY) as u64,
            state: AtomicU64::new(pack(0, 0)),
            interval: (interval.as_millis() as u64).clamp(1, MAX_EXPIRES),
            anchor: Instant::now(),
        }
    }

    /// Returns `true` once the current window has closed, or if none was ever opened.
    ///
    /// An expired window holds no state worth keeping: the next request will
    /// open a fresh one.
    pub fn is_expired(&self) -> bool {
        let (expires, _) = unpack(self.state.load(Ordering::Acquire));
        self.elapsed_millis() >= expires
    }

    fn elapsed_millis(&self) -> u64 {
        Instant::now().duration_since(self.anchor).as_millis() as u64
    }
}
