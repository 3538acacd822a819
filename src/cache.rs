//! A thread-safe in-memory key-value cache with per-entry expiration.
//!
//! [`ExpiringCache`] expires entries in two ways: lazily, when a [`get`](ExpiringCache::get)
//! finds a stale entry, and proactively, from a background sweeper thread owned by the cache. The
//! sweeper bounds memory used by keys that are written once and never read again.
use std::{
    collections::HashMap,
    sync::{Arc, RwLock, Weak},
    time::{Duration, Instant},
};

use crate::{
    clock::{Clock, SystemClock},
    config::CacheConfig,
    sweeper::SweeperThread,
    Result,
};

struct CacheEntry<V> {
    value: V,
    /// `None` means the entry never expires.
    expires_at: Option<Instant>,
}

impl<V> CacheEntry<V> {
    fn is_valid_at(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(expires_at) => now < expires_at,
            None => true,
        }
    }
}

struct Entries<V, C> {
    map: RwLock<HashMap<String, CacheEntry<V>>>,
    clock: C,
}

impl<V, C: Clock> Entries<V, C> {
    fn sweep(&self) -> usize {
        let now = self.clock.now();

        let mut map = self
            .map
            .write()
            .expect("thread holding cache lock should not panic");
        let before = map.len();
        map.retain(|_, entry| entry.is_valid_at(now));
        before - map.len()
    }
}

/// `ExpiringCache` is a `Sync` string-keyed cache that allows concurrent access for readers and
/// writers.
///
/// Values are cloned out on [`get`](ExpiringCache::get), so large values are best stored behind
/// an [`Arc`].
///
/// The sweeper thread is started when the cache is created. It stops when
/// [`shutdown`](ExpiringCache::shutdown) is called or when the cache is dropped.
pub struct ExpiringCache<V, C: Clock = SystemClock> {
    entries: Arc<Entries<V, C>>,
    sweeper: SweeperThread,
}

impl<V: Clone + Send + Sync + 'static> ExpiringCache<V> {
    /// Create a new empty cache and start its sweeper thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the sweeper thread failed to start.
    pub fn new(config: CacheConfig) -> std::io::Result<Self> {
        ExpiringCache::with_clock(config, SystemClock)
    }
}

impl<V: Clone + Send + Sync + 'static, C: Clock> ExpiringCache<V, C> {
    /// Create a new empty cache that reads time from `clock`.
    pub fn with_clock(config: CacheConfig, clock: C) -> std::io::Result<Self> {
        let entries = Arc::new(Entries {
            map: RwLock::new(HashMap::with_capacity(128)),
            clock,
        });

        // The sweeper only holds a weak reference, so it never keeps a dropped cache alive.
        let weak: Weak<Entries<V, C>> = Arc::downgrade(&entries);
        let sweeper = SweeperThread::start(config.effective_sweep_interval(), move || {
            let Some(entries) = weak.upgrade() else {
                return false;
            };
            let removed = entries.sweep();
            if removed > 0 {
                log::debug!(target: "splitter", removed; "swept expired cache entries");
            }
            true
        })?;

        Ok(ExpiringCache { entries, sweeper })
    }

    /// Store `value` under `key`, replacing any previous entry. A zero `ttl` means the entry never
    /// expires, and so does a `ttl` too large to be represented as an [`Instant`].
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        // Constructing new entry before requesting the lock to minimize lock span.
        let expires_at = if ttl.is_zero() {
            None
        } else {
            self.entries.clock.now().checked_add(ttl)
        };
        let entry = CacheEntry { value, expires_at };

        let mut map = self
            .entries
            .map
            .write()
            .expect("thread holding cache lock should not panic");
        map.insert(key.into(), entry);
    }

    /// Get the value stored under `key`.
    ///
    /// Returns `None` if the key is absent or its entry has expired. An expired entry is removed.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.entries.clock.now();

        {
            let map = self
                .entries
                .map
                .read()
                .expect("thread holding cache lock should not panic");
            let entry = map.get(key)?;
            if entry.is_valid_at(now) {
                return Some(entry.value.clone());
            }
        }

        let mut map = self
            .entries
            .map
            .write()
            .expect("thread holding cache lock should not panic");
        // Another writer may have refreshed the entry between the two locks.
        if map.get(key).is_some_and(|entry| !entry.is_valid_at(now)) {
            map.remove(key);
        }
        None
    }

    /// Remove `key`. Does nothing if it is absent.
    pub fn delete(&self, key: &str) {
        let mut map = self
            .entries
            .map
            .write()
            .expect("thread holding cache lock should not panic");
        map.remove(key);
    }

    /// Remove all expired entries now, returning how many were removed. The sweeper thread calls
    /// this periodically.
    pub fn sweep(&self) -> usize {
        self.entries.sweep()
    }

    /// Number of stored entries, including expired entries that were not reclaimed yet.
    pub fn len(&self) -> usize {
        self.entries
            .map
            .read()
            .expect("thread holding cache lock should not panic")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop the sweeper thread and block waiting for it to exit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SweeperThreadPanicked`](crate::Error::SweeperThreadPanicked) if the
    /// thread has panicked.
    pub fn shutdown(self) -> Result<()> {
        self.sweeper.shutdown()
    }
}
