//! Key derivation: which history a request is counted against.

use std::net::IpAddr;

use crate::{ThrottleError, ThrottleKey};

/// What a key policy may know about an incoming request.
///
/// Built by the caller from its own request type. Fields a policy does not need can
/// stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// Document the request targets, from the route.
    pub document_id: Option<String>,
    /// Authenticated user. `None` for anonymous requests.
    pub user_id: Option<String>,
    /// Raw `X-Forwarded-For` header value.
    pub forwarded_for: Option<String>,
    /// Address of the directly connected peer.
    pub remote_addr: Option<IpAddr>,
}

impl RequestContext {
    /// An empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the targeted document.
    pub fn with_document_id(mut self, document_id: impl Into<String>) -> Self {
        self.document_id = Some(document_id.into());
        self
    }

    /// Mark the request as authenticated by `user_id`.
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the raw `X-Forwarded-For` header value.
    pub fn with_forwarded_for(mut self, forwarded_for: impl Into<String>) -> Self {
        self.forwarded_for = Some(forwarded_for.into());
        self
    }

    /// Set the peer address.
    pub fn with_remote_addr(mut self, remote_addr: IpAddr) -> Self {
        self.remote_addr = Some(remote_addr);
        self
    }

    /// Best-effort client IP: the first `X-Forwarded-For` entry, else the peer address.
    ///
    /// Blank forwarded entries are ignored. The value is not parsed, so proxies that
    /// forward hostnames or ports still yield a stable identifier.
    pub fn client_ip(&self) -> Option<String> {
        self.forwarded_for
            .as_deref()
            .and_then(|header| header.split(',').next())
            .map(str::trim)
            .filter(|first| !first.is_empty())
            .map(str::to_string)
            .or_else(|| self.remote_addr.map(|addr| addr.to_string()))
    }
}

/// Turns a request into the key its history is stored under.
///
/// Implement this to add a scope (for example per API key) without touching
/// [`TieredRateLimiter`](crate::TieredRateLimiter).
pub trait KeyPolicy: Send + Sync {
    /// Key for `context`.
    ///
    /// `Ok(None)` means the request cannot be attributed to anyone; the limiter admits
    /// it without consulting the store.
    fn derive_key(&self, context: &RequestContext) -> Result<Option<ThrottleKey>, ThrottleError>;
}

/// Scope prefix of document keys.
pub const DOCUMENT_SCOPE: &str = "document";
/// Scope prefix of authenticated-user keys.
pub const USER_SCOPE: &str = "user";
/// Scope prefix of anonymous, per-IP keys.
pub const ANONYMOUS_SCOPE: &str = "anon";

/// One history per document: `document:<id>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentKeyPolicy;

impl KeyPolicy for DocumentKeyPolicy {
    fn derive_key(&self, context: &RequestContext) -> Result<Option<ThrottleKey>, ThrottleError> {
        let document_id = context
            .document_id
            .as_deref()
            .filter(|id| !id.trim().is_empty());

        let Some(document_id) = document_id else {
            return Err(ThrottleError::Configuration(
                "document throttling requires a document id in the request context".to_string(),
            ));
        };

        ThrottleKey::scoped(DOCUMENT_SCOPE, document_id).map(Some)
    }
}

/// One history per caller: `user:<id>` when authenticated, else `anon:<ip>`.
///
/// A request with neither a user nor a determinable IP gets no key and is therefore
/// never throttled. This fail-open behaviour lets unidentifiable callers through
/// without limit; deployments behind a proxy that always sets `X-Forwarded-For`, or
/// that always know the peer address, are not affected.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityKeyPolicy;

impl KeyPolicy for IdentityKeyPolicy {
    fn derive_key(&self, context: &RequestContext) -> Result<Option<ThrottleKey>, ThrottleError> {
        if let Some(user_id) = context.user_id.as_deref() {
            return ThrottleKey::scoped(USER_SCOPE, user_id).map(Some);
        }

        match context.client_ip() {
            Some(ip) => ThrottleKey::scoped(ANONYMOUS_SCOPE, &ip).map(Some),
            None => Ok(None),
        }
    }
}
