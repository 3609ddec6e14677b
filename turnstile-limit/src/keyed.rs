use std::num::NonZeroUsize;
use std::ops::ControlFlow;
use std::time::Duration;

use dashmap::DashMap;

use super::FixedWindow;
use super::KeyedStrategy;
use super::Reason;
use super::Strategy;

/// A [`FixedWindow`] per caller key.
///
/// Partitions are created on first sight of a key and each one opens its
/// window with that key's first request. Keys live in a sharded map, so
/// callers only contend when they hash to the same shard.
#[derive(Debug)]
pub struct KeyedFixedWindow {
    capacity: NonZeroUsize,
    interval: Duration,
    partitions: DashMap<String, FixedWindow>,
}

impl KeyedStrategy for KeyedFixedWindow {
    fn process(&self, key: &str) -> ControlFlow<Reason> {
        // Fast path: the read guard must be released before `entry` locks the shard.
        if let Some(window) = self.partitions.get(key) {
            return window.process();
        }

        self.partitions
            .entry(key.to_owned())
            .or_insert_with(|| FixedWindow::new(self.capacity, self.interval))
            .process()
    }
}

impl KeyedFixedWindow {
    /// Creates a new `KeyedFixedWindow`.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Requests admitted per key within a single window.
    /// * `interval` - The duration of each key's window.
    pub fn new(capacity: NonZeroUsize, interval: Duration) -> Self {
        Self {
            capacity,
            interval,
            partitions: DashMap::new(),
        }
    }

    /// Drops every partition whose window has elapsed.
    ///
    /// Returns the number of partitions removed.
    pub fn purge_idle(&self) -> usize {
        let before = self.partitions.len();
        self.partitions.retain(|_, window| !window.is_expired());
        before.saturating_sub(self.partitions.len())
    }

    /// The number of tracked partitions.
    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    pub fn capacity(&self) -> NonZeroUsize {
        self.capacity
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::time::advance;
    use tokio::time::pause;

    fn limiter(capacity: usize, interval: Duration) -> KeyedFixedWindow {
        KeyedFixedWindow::new(NonZeroUsize::new(capacity).unwrap(), interval)
    }

    #[tokio::test]
    async fn test_sixth_request_is_rejected_until_next_window() {
        pause();
        let rl = limiter(5, Duration::from_secs(10));

        for _ in 0..5 {
            assert_eq!(rl.process("10.0.0.1"), ControlFlow::Continue(()));
        }
        assert!(matches!(rl.process("10.0.0.1"), ControlFlow::Break(..)));

        advance(Duration::from_secs(11)).await;
        assert_eq!(rl.process("10.0.0.1"), ControlFlow::Continue(()));
    }

    #[tokio::test]
    async fn test_keys_do_not_share_windows() {
        pause();
        let rl = limiter(1, Duration::from_secs(10));

        assert_eq!(rl.process("10.0.0.1"), ControlFlow::Continue(()));
        assert!(matches!(rl.process("10.0.0.1"), ControlFlow::Break(..)));
        assert_eq!(rl.process("10.0.0.2"), ControlFlow::Continue(()));
        assert_eq!(rl.process("unknown"), ControlFlow::Continue(()));
        assert_eq!(rl.len(), 3);
    }

    #[tokio::test]
    async fn test_windows_align_per_key() {
        pause();
        let rl = limiter(1, Duration::from_secs(10));

        assert_eq!(rl.process("a"), ControlFlow::Continue(()));
        advance(Duration::from_secs(6)).await;
        assert_eq!(rl.process("b"), ControlFlow::Continue(()));

        // "a" rolls over at 10s, "b" not until 16s
        advance(Duration::from_secs(5)).await;
        assert_eq!(rl.process("a"), ControlFlow::Continue(()));
        assert!(matches!(rl.process("b"), ControlFlow::Break(..)));
    }

    #[tokio::test]
    async fn test_purge_idle_drops_only_expired_partitions() {
        pause();
        let rl = limiter(3, Duration::from_secs(10));

        let _ = rl.process("old");
        advance(Duration::from_secs(8)).await;
        let _ = rl.process("fresh");
        advance(Duration::from_secs(3)).await;

        assert_eq!(rl.purge_idle(), 1);
        assert_eq!(rl.len(), 1);
        assert!(matches!(rl.process("fresh"), ControlFlow::Continue(())));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_keys() {
        let rl = Arc::new(limiter(10, Duration::from_secs(60)));

        let mut handles = vec![];
        for i in 0..200 {
            let rl = Arc::clone(&rl);
            let key = format!("10.0.0.{}", i % 4);
            handles.push(tokio::spawn(async move { rl.process(&key) }));
        }

        let admitted = futures::future::join_all(handles)
            .await
            .into_iter()
            .filter(|r| matches!(r, Ok(ControlFlow::Continue(()))))
            .count();

        assert_eq!(admitted, 40);
        assert_eq!(rl.len(), 4);
    }
}
