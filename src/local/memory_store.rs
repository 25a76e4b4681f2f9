use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::{DashMap, mapref::entry::Entry};

use crate::{
    AtomicRateLimitStore, History, RateConfig, RateLimitStore, ThrottleError, ThrottleKey,
    Timestamp, WindowCounts,
};

pub(crate) struct StoredHistory {
    pub history: History,
    pub expires_at: Instant,
}

impl StoredHistory {
    fn new(history: History, expiry: Duration) -> Self {
        Self {
            history,
            expires_at: Instant::now() + expiry,
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at <= Instant::now()
    }
}

/// In-process [`RateLimitStore`] backed by a [`DashMap`].
///
/// # Semantics
///
/// **Expiry:**
/// - Each `set` resets the entry's deadline to `now + expiry`
/// - Expired entries read as absent and are dropped lazily on access
/// - [`MemoryStore::purge_expired`] drops every expired entry eagerly
///
/// **Atomicity:**
/// - `get` and `set` are individually atomic, nothing more
/// - [`AtomicRateLimitStore::record_if_within`] holds the key's map shard lock for
///   the whole prune, count and append step, so strict mode never overshoots
///
/// **Scope:** state is process-local. Use a shared store (e.g. Redis) when several
/// processes must see the same limits.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use tiered_throttle::{MemoryStore, RateConfig, TieredRateLimiter};
///
/// let store = Arc::new(MemoryStore::new());
/// let limiter = TieredRateLimiter::new(store, RateConfig::new(5, 100, 500).unwrap());
/// ```
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<ThrottleKey, StoredHistory>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn entries(&self) -> &DashMap<ThrottleKey, StoredHistory> {
        &self.entries
    }

    /// Number of live (unexpired) keys.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|entry| !entry.is_expired()).count()
    }

    /// Whether no live key is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, stored| !stored.is_expired());
        let removed = before.saturating_sub(self.entries.len());

        if removed > 0 {
            tracing::trace!(removed, "memory_store.purge_expired");
        }

        removed
    } // end method purge_expired
}

#[async_trait]
impl RateLimitStore for MemoryStore {
    async fn get(&self, key: &ThrottleKey) -> Result<Option<History>, ThrottleError> {
        if let Some(stored) = self.entries.get(key)
            && !stored.is_expired()
        {
            return Ok(Some(stored.history.clone()));
        }

        self.entries.remove_if(key, |_, stored| stored.is_expired());

        Ok(None)
    }

    async fn set(
        &self,
        key: &ThrottleKey,
        history: &History,
        expiry: Duration,
    ) -> Result<(), ThrottleError> {
        self.entries
            .insert(key.clone(), StoredHistory::new(history.clone(), expiry));

        Ok(())
    }
}

#[async_trait]
impl AtomicRateLimitStore for MemoryStore {
    async fn record_if_within(
        &self,
        key: &ThrottleKey,
        now: Timestamp,
        rates: &RateConfig,
        expiry: Duration,
    ) -> Result<WindowCounts, ThrottleError> {
        match self.entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let stored = occupied.get_mut();
                let mut history = if stored.is_expired() {
                    History::new()
                } else {
                    stored.history.clone()
                };

                let counts = WindowCounts::prune_and_count(&mut history, now);

                if rates.admits(&counts) {
                    history.push(now);
                    *stored = StoredHistory::new(history, expiry);
                }

                Ok(counts)
            }
            Entry::Vacant(vacant) => {
                let counts = WindowCounts::default();

                if rates.admits(&counts) {
                    vacant.insert(StoredHistory::new(vec![now], expiry));
                }

                Ok(counts)
            }
        }
    } // end method record_if_within
}
