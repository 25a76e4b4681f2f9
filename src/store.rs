//! Storage interface consumed by [`TieredRateLimiter`](crate::TieredRateLimiter).
//!
//! The limiter keeps no state of its own: every history lives in a key-value store
//! with per-entry expiry, which is the single coordination point between processes.
//!
//! - [`RateLimitStore`]: plain `get`/`set`, last write wins. Enough for
//!   [`Consistency::BestEffort`](crate::Consistency::BestEffort).
//! - [`AtomicRateLimitStore`]: adds a single atomic evaluate-and-record step for
//!   [`Consistency::Strict`](crate::Consistency::Strict).

use std::time::Duration;

use async_trait::async_trait;

use crate::{History, RateConfig, ThrottleError, ThrottleKey, Timestamp, WindowCounts};

/// Key-value store holding one [`History`] per [`ThrottleKey`].
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Read the history stored under `key`.
    ///
    /// An absent or expired key is `Ok(None)`, never an error. Failing to reach the
    /// store is [`ThrottleError::StoreUnavailable`].
    async fn get(&self, key: &ThrottleKey) -> Result<Option<History>, ThrottleError>;

    /// Replace the history stored under `key` and reset its expiry to `expiry`.
    async fn set(
        &self,
        key: &ThrottleKey,
        history: &History,
        expiry: Duration,
    ) -> Result<(), ThrottleError>;
}

/// A store that can evaluate and record a request in one indivisible step.
#[async_trait]
pub trait AtomicRateLimitStore: RateLimitStore {
    /// Atomically, with respect to other calls for the same key:
    ///
    /// 1. prune the history of `key` to the trailing day relative to `now`,
    /// 2. count the minute, hour and day windows,
    /// 3. if `rates` admits those counts, append `now` and persist the history with
    ///    `expiry`; otherwise leave the stored value untouched.
    ///
    /// Returns the counts observed before `now` was appended.
    async fn record_if_within(
        &self,
        key: &ThrottleKey,
        now: Timestamp,
        rates: &RateConfig,
        expiry: Duration,
    ) -> Result<WindowCounts, ThrottleError>;
}
