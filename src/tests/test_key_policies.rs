use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::{
    DocumentKeyPolicy, IdentityKeyPolicy, KeyPolicy, RequestContext, ThrottleError, ThrottleKey,
};

fn derived(policy: &dyn KeyPolicy, context: &RequestContext) -> Option<String> {
    policy
        .derive_key(context)
        .unwrap()
        .map(|key| key.to_string())
}

#[test]
fn document_key_uses_document_id() {
    let context = RequestContext::new()
        .with_document_id("3f1c")
        .with_user_id("ignored");

    assert_eq!(
        derived(&DocumentKeyPolicy, &context),
        Some("document:3f1c".to_string())
    );
}

#[test]
fn document_key_without_document_id_is_configuration_error() {
    for context in [
        RequestContext::new().with_user_id("42"),
        RequestContext::new().with_document_id("  "),
    ] {
        assert!(matches!(
            DocumentKeyPolicy.derive_key(&context),
            Err(ThrottleError::Configuration(_))
        ));
    }
}

#[test]
fn identity_key_prefers_authenticated_user() {
    let context = RequestContext::new()
        .with_user_id("42")
        .with_forwarded_for("203.0.113.7")
        .with_remote_addr(IpAddr::V4(Ipv4Addr::LOCALHOST));

    assert_eq!(
        derived(&IdentityKeyPolicy, &context),
        Some("user:42".to_string())
    );
}

#[test]
fn identity_key_uses_first_forwarded_for_entry() {
    let context = RequestContext::new()
        .with_forwarded_for(" 203.0.113.7 , 10.0.0.1, 10.0.0.2")
        .with_remote_addr(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)));

    assert_eq!(
        derived(&IdentityKeyPolicy, &context),
        Some("anon:203.0.113.7".to_string())
    );
}

#[test]
fn identity_key_falls_back_to_remote_addr() {
    let context = RequestContext::new().with_remote_addr(IpAddr::V6(Ipv6Addr::LOCALHOST));
    assert_eq!(
        derived(&IdentityKeyPolicy, &context),
        Some("anon:::1".to_string())
    );

    // A blank forwarded header is the same as no header.
    let context = RequestContext::new()
        .with_forwarded_for(" , 10.0.0.1")
        .with_remote_addr(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)));
    assert_eq!(
        derived(&IdentityKeyPolicy, &context),
        Some("anon:192.0.2.1".to_string())
    );
}

#[test]
fn identity_key_without_any_identity_is_none() {
    assert_eq!(derived(&IdentityKeyPolicy, &RequestContext::new()), None);
    assert_eq!(
        derived(
            &IdentityKeyPolicy,
            &RequestContext::new().with_forwarded_for("")
        ),
        None
    );
}

/// Keys requests by API key, proving new scopes need no limiter change.
struct ApiKeyPolicy {
    api_key: Option<String>,
}

impl KeyPolicy for ApiKeyPolicy {
    fn derive_key(&self, _context: &RequestContext) -> Result<Option<ThrottleKey>, ThrottleError> {
        self.api_key
            .as_deref()
            .map(|api_key| ThrottleKey::scoped("apikey", api_key))
            .transpose()
    }
}

#[test]
fn custom_policy_plugs_into_the_same_trait() {
    let with_key = ApiKeyPolicy {
        api_key: Some("sk-123".to_string()),
    };
    let without_key = ApiKeyPolicy { api_key: None };

    assert_eq!(
        derived(&with_key, &RequestContext::new()),
        Some("apikey:sk-123".to_string())
    );
    assert_eq!(derived(&without_key, &RequestContext::new()), None);
}
