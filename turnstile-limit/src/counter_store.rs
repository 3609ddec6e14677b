use chrono::DateTime;
use chrono::NaiveTime;
use chrono::TimeDelta;
use chrono::Utc;
use dashmap::DashMap;

/// A stored count and the instant it stops being valid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CounterEntry {
    pub count: u64,
    pub expires_at: DateTime<Utc>,
}

impl CounterEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// An in-memory, time-windowed counter cache.
///
/// Each key maps to a [`CounterEntry`]. Entries are never deleted eagerly;
/// an entry read at or after its expiry behaves as if it were absent and is
/// reset in place. Every operation holds the shard lock for its key for its
/// whole read-modify-write, so updates to one key are never lost and
/// unrelated keys rarely contend.
///
/// Nothing is persisted: a restart forgets every counter.
#[derive(Debug, Default)]
pub struct CounterStore {
    entries: DashMap<String, CounterEntry>,
}

impl CounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current count for `key`.
    ///
    /// If the key is absent or expired, an entry with count 0 expiring at
    /// `expires_at` (the start of the next window) is stored first.
    pub fn get_or_create(&self, key: &str, expires_at: DateTime<Utc>) -> u64 {
        self.get_or_create_at(key, expires_at, Utc::now())
    }

    pub fn get_or_create_at(&self, key: &str, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
        let mut entry = self
            .entries
            .entry(key.to_owned())
            .or_insert(CounterEntry {
                count: 0,
                expires_at,
            });
        if entry.is_expired(now) {
            *entry = CounterEntry {
                count: 0,
                expires_at,
            };
        }
        entry.count
    }

    /// Overwrites the count for `key` and resets its expiry to `now + ttl`.
    pub fn set(&self, key: &str, count: u64, ttl: TimeDelta) {
        self.set_at(key, count, ttl, Utc::now())
    }

    pub fn set_at(&self, key: &str, count: u64, ttl: TimeDelta, now: DateTime<Utc>) {
        self.entries.insert(
            key.to_owned(),
            CounterEntry {
                count,
                expires_at: expiry(now, ttl),
            },
        );
    }

    /// Adds one to the count for `key` and resets its expiry to `now + ttl`.
    ///
    /// An expired entry counts from zero. Returns the new count.
    pub fn increment(&self, key: &str, ttl: TimeDelta) -> u64 {
        self.increment_at(key, ttl, Utc::now())
    }

    pub fn increment_at(&self, key: &str, ttl: TimeDelta, now: DateTime<Utc>) -> u64 {
        let expires_at = expiry(now, ttl);
        let mut entry = self
            .entries
            .entry(key.to_owned())
            .or_insert(CounterEntry {
                count: 0,
                expires_at,
            });
        if entry.is_expired(now) {
            entry.count = 0;
        }
        entry.count = entry.count.saturating_add(1);
        entry.expires_at = expires_at;
        entry.count
    }

    /// Reads the live count for `key` without creating an entry.
    pub fn peek(&self, key: &str) -> Option<u64> {
        self.peek_at(key, Utc::now())
    }

    pub fn peek_at(&self, key: &str, now: DateTime<Utc>) -> Option<u64> {
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.count)
    }

    /// Removes every expired entry, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Utc::now())
    }

    pub fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// The number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn expiry(now: DateTime<Utc>, ttl: TimeDelta) -> DateTime<Utc> {
    now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// The first instant of the UTC day after `now`.
pub fn next_utc_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .succ_opt()
        .map(|day| day.and_time(NaiveTime::MIN).and_utc())
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
