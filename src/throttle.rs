use std::sync::Arc;

use crate::{
    AtomicRateLimitStore, Decision, DocumentKeyPolicy, IdentityKeyPolicy, KeyPolicy,
    RateLimitStore, RequestContext, ThrottleClass, ThrottleError, ThrottleSettings,
    TieredRateLimiter,
};

/// A key policy bound to a limiter: the whole caller contract in one call.
///
/// Build one per caller class at startup. Construction fails with
/// [`ThrottleError::Configuration`] when the class has no thresholds.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use tiered_throttle::{MemoryStore, RequestContext, Throttle, ThrottleSettings};
///
/// # futures::executor::block_on(async {
/// let settings = ThrottleSettings::from_json(
///     r#"{"document": {"minute": 5, "hour": 100, "day": 500}}"#,
/// )
/// .unwrap();
/// let throttle = Throttle::document(Arc::new(MemoryStore::new()), &settings).unwrap();
///
/// let decision = throttle
///     .check(&RequestContext::new().with_document_id("3f1c"))
///     .await
///     .unwrap();
///
/// if !decision.is_admitted() {
///     // reply 429 with `Retry-After: decision.retry_after_secs()`
/// }
/// # });
/// ```
pub struct Throttle<P> {
    policy: P,
    limiter: TieredRateLimiter,
}

impl<P: KeyPolicy> Throttle<P> {
    /// Bind `policy` to `limiter`.
    pub fn new(policy: P, limiter: TieredRateLimiter) -> Self {
        Self { policy, limiter }
    }

    /// Key policy in use.
    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Underlying limiter.
    pub fn limiter(&self) -> &TieredRateLimiter {
        &self.limiter
    }

    /// Derive the request's key and evaluate it.
    ///
    /// Requests the policy cannot attribute to a key are admitted without touching
    /// the store.
    pub async fn check(&self, context: &RequestContext) -> Result<Decision, ThrottleError> {
        self.limiter.check(&self.policy, context).await
    }
}

impl Throttle<DocumentKeyPolicy> {
    /// Per-document throttle with the `document` thresholds of `settings`.
    pub fn document(
        store: Arc<dyn RateLimitStore>,
        settings: &ThrottleSettings,
    ) -> Result<Self, ThrottleError> {
        let rates = settings.rates_for(ThrottleClass::Document)?;
        Ok(Self::new(DocumentKeyPolicy, TieredRateLimiter::new(store, rates)))
    }

    /// Like [`Throttle::document`], evaluating atomically in the store.
    pub fn document_strict(
        store: Arc<dyn AtomicRateLimitStore>,
        settings: &ThrottleSettings,
    ) -> Result<Self, ThrottleError> {
        let rates = settings.rates_for(ThrottleClass::Document)?;
        Ok(Self::new(DocumentKeyPolicy, TieredRateLimiter::strict(store, rates)))
    }
}

impl Throttle<IdentityKeyPolicy> {
    /// Per-user (or per-IP for anonymous callers) throttle with the `user` thresholds
    /// of `settings`.
    pub fn user(
        store: Arc<dyn RateLimitStore>,
        settings: &ThrottleSettings,
    ) -> Result<Self, ThrottleError> {
        let rates = settings.rates_for(ThrottleClass::User)?;
        Ok(Self::new(IdentityKeyPolicy, TieredRateLimiter::new(store, rates)))
    }

    /// Like [`Throttle::user`], evaluating atomically in the store.
    pub fn user_strict(
        store: Arc<dyn AtomicRateLimitStore>,
        settings: &ThrottleSettings,
    ) -> Result<Self, ThrottleError> {
        let rates = settings.rates_for(ThrottleClass::User)?;
        Ok(Self::new(IdentityKeyPolicy, TieredRateLimiter::strict(store, rates)))
    }
}
