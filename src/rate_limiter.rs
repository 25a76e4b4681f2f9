//! Tiered minute/hour/day limiter over an injected store.

use std::sync::Arc;

use crate::{
    AtomicRateLimitStore, Decision, HISTORY_TTL, KeyPolicy, RateConfig, RateLimitStore,
    RequestContext, ThrottleError, ThrottleKey, Timestamp, WindowCounts, common::now_timestamp,
};

/// How a [`TieredRateLimiter`] guards the read-modify-write of a key's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Consistency {
    /// Read, evaluate and write back as separate store calls.
    ///
    /// Concurrent requests for the same key may all observe the same history and all
    /// be admitted, exceeding a window by up to `racers - 1` requests.
    BestEffort,
    /// Evaluate and record in a single atomic store operation. No overshoot.
    Strict,
}

enum Backend {
    BestEffort(Arc<dyn RateLimitStore>),
    Strict(Arc<dyn AtomicRateLimitStore>),
}

/// Per-key limiter enforcing three nested windows at once.
///
/// # Algorithm
///
/// For each request against `key`, at time `now`:
///
/// 1. **Read** the key's history (absent is empty)
/// 2. **Prune** timestamps at or before `now - 86 400`
/// 3. **Count** timestamps after `now - 60` and `now - 3 600`, plus the whole history
/// 4. **Decide:** deny if any count has reached its threshold in [`RateConfig`]
/// 5. **Record:** on admission only, append `now` and write back with a one-day expiry
///
/// Denied requests are never recorded, so a caller hammering a closed window does
/// not push its own reopening further out.
///
/// # Sharing
///
/// The limiter holds no per-call state: every call returns its own [`Decision`].
/// One instance can serve any number of concurrent requests and keys.
///
/// # Consistency
///
/// See [`Consistency`]. [`TieredRateLimiter::new`] gives best-effort semantics over any
/// [`RateLimitStore`]; [`TieredRateLimiter::strict`] requires an
/// [`AtomicRateLimitStore`].
///
/// # Errors
///
/// Store failures surface as [`ThrottleError::StoreUnavailable`] and undecodable
/// histories as [`ThrottleError::CorruptState`]. The limiter never substitutes an
/// empty history for an error; whether to fail open is the caller's decision.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use tiered_throttle::{MemoryStore, RateConfig, ThrottleKey, TieredRateLimiter};
///
/// # futures::executor::block_on(async {
/// let limiter = TieredRateLimiter::new(
///     Arc::new(MemoryStore::new()),
///     RateConfig::new(1, 5, 10).unwrap(),
/// );
/// let key = ThrottleKey::try_from("user:42").unwrap();
///
/// assert!(limiter.allow(&key).await.unwrap().is_admitted());
///
/// let decision = limiter.allow(&key).await.unwrap();
/// assert!(!decision.is_admitted());
/// assert_eq!(decision.retry_after_secs(), Some(60));
/// # });
/// ```
pub struct TieredRateLimiter {
    backend: Backend,
    rates: RateConfig,
}

impl TieredRateLimiter {
    /// Best-effort limiter over `store`.
    pub fn new(store: Arc<dyn RateLimitStore>, rates: RateConfig) -> Self {
        Self {
            backend: Backend::BestEffort(store),
            rates,
        }
    }

    /// Strict limiter over an atomic `store`.
    pub fn strict(store: Arc<dyn AtomicRateLimitStore>, rates: RateConfig) -> Self {
        Self {
            backend: Backend::Strict(store),
            rates,
        }
    }

    /// Thresholds enforced by this limiter.
    pub fn rates(&self) -> RateConfig {
        self.rates
    }

    /// Consistency level this limiter provides.
    pub fn consistency(&self) -> Consistency {
        match self.backend {
            Backend::BestEffort(_) => Consistency::BestEffort,
            Backend::Strict(_) => Consistency::Strict,
        }
    }

    /// Evaluate and, if admitted, record a request for `key` at the current time.
    pub async fn allow(&self, key: &ThrottleKey) -> Result<Decision, ThrottleError> {
        self.allow_at(key, now_timestamp()).await
    }

    /// Like [`TieredRateLimiter::allow`], with an explicit clock reading in epoch seconds.
    pub async fn allow_at(
        &self,
        key: &ThrottleKey,
        now: Timestamp,
    ) -> Result<Decision, ThrottleError> {
        let counts = match &self.backend {
            Backend::BestEffort(store) => self.record_best_effort(store.as_ref(), key, now).await?,
            Backend::Strict(store) => {
                store
                    .record_if_within(key, now, &self.rates, HISTORY_TTL)
                    .await?
            }
        };

        let decision = Decision::evaluate(counts, self.rates);

        match decision.limited_by() {
            Some(window) if !decision.is_admitted() => {
                tracing::debug!(
                    key = %key,
                    window = %window,
                    minute = counts.minute,
                    hour = counts.hour,
                    day = counts.day,
                    "throttle.rejected"
                );
            }
            _ => {
                tracing::trace!(
                    key = %key,
                    minute = counts.minute,
                    hour = counts.hour,
                    day = counts.day,
                    "throttle.admitted"
                );
            }
        }

        Ok(decision)
    } // end method allow_at

    async fn record_best_effort(
        &self,
        store: &dyn RateLimitStore,
        key: &ThrottleKey,
        now: Timestamp,
    ) -> Result<WindowCounts, ThrottleError> {
        let mut history = store.get(key).await?.unwrap_or_default();
        let counts = WindowCounts::prune_and_count(&mut history, now);

        if self.rates.admits(&counts) {
            history.push(now);
            store.set(key, &history, HISTORY_TTL).await?;
        }

        Ok(counts)
    }

    /// Derive a key for `context` with `policy`, then [`allow`](Self::allow) it.
    ///
    /// A context the policy cannot attribute to any key is admitted without touching
    /// the store.
    pub async fn check(
        &self,
        policy: &dyn KeyPolicy,
        context: &RequestContext,
    ) -> Result<Decision, ThrottleError> {
        match policy.derive_key(context)? {
            Some(key) => self.allow(&key).await,
            None => {
                tracing::debug!("throttle.unkeyed, admitting request without a throttle key");
                Ok(Decision::unkeyed(self.rates))
            }
        }
    }
}
