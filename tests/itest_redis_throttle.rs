#![cfg(any(feature = "redis-tokio", feature = "redis-smol"))]

use std::{
    env,
    future::Future,
    net::{IpAddr, Ipv4Addr},
    sync::Arc,
    time::Duration,
};

use tiered_throttle::redis::{KeyPrefix, RedisStore, RedisStoreOptions, ThrottleRedisClient};
use tiered_throttle::{RateLimitStore, RequestContext, Throttle, ThrottleKey, ThrottleSettings};

fn redis_url() -> Option<String> {
    env::var("REDIS_URL").ok()
}

fn unique_prefix() -> KeyPrefix {
    let n: u64 = rand::random();
    KeyPrefix::try_from(format!("throttle_itest_{n}")).unwrap()
}

#[cfg(feature = "redis-tokio")]
fn block_on<F: Future<Output = T>, T>(f: F) -> T {
    tokio::runtime::Runtime::new().unwrap().block_on(f)
}

#[cfg(all(feature = "redis-smol", not(feature = "redis-tokio")))]
fn block_on<F: Future<Output = T>, T>(f: F) -> T {
    smol::block_on(f)
}

fn settings() -> ThrottleSettings {
    ThrottleSettings::from_json(
        r#"{
            "document": {"minute": 2, "hour": 20, "day": 200},
            "user": {"minute": 3, "hour": 30, "day": 300}
        }"#,
    )
    .unwrap()
}

async fn build_store(url: &str) -> Arc<RedisStore> {
    let client = redis::Client::open(url).unwrap();

    Arc::new(RedisStore::new(RedisStoreOptions {
        client: ThrottleRedisClient::default_from_client(client).await.unwrap(),
        prefix: Some(unique_prefix()),
    }))
}

#[test]
fn document_throttle_over_redis() {
    let Some(url) = redis_url() else {
        return;
    };

    block_on(async {
        let store = build_store(&url).await;
        let throttle = Throttle::document(store.clone(), &settings()).unwrap();
        let context = RequestContext::new().with_document_id("doc-1");

        assert!(throttle.check(&context).await.unwrap().is_admitted());
        assert!(throttle.check(&context).await.unwrap().is_admitted());

        let denied = throttle.check(&context).await.unwrap();
        assert!(!denied.is_admitted());
        assert_eq!(denied.wait(), Some(Duration::from_secs(60)));

        let other = RequestContext::new().with_document_id("doc-2");
        assert!(throttle.check(&other).await.unwrap().is_admitted());

        let history = store
            .get(&ThrottleKey::try_from("document:doc-1").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(history.len(), 2);
    });
}

#[test]
fn strict_user_throttle_shares_state_across_instances() {
    let Some(url) = redis_url() else {
        return;
    };

    block_on(async {
        let store = build_store(&url).await;

        // Two app servers sharing the same Redis.
        let a = Throttle::user_strict(store.clone(), &settings()).unwrap();
        let b = Throttle::user_strict(store.clone(), &settings()).unwrap();

        let context = RequestContext::new()
            .with_forwarded_for("198.51.100.4, 10.0.0.1")
            .with_remote_addr(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));

        let mut admitted = 0;
        for i in 0..6 {
            let throttle = if i % 2 == 0 { &a } else { &b };
            if throttle.check(&context).await.unwrap().is_admitted() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 3);

        let history = store
            .get(&ThrottleKey::try_from("anon:198.51.100.4").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(history.len(), 3);
    });
}

#[test]
fn unidentifiable_requests_are_admitted() {
    let Some(url) = redis_url() else {
        return;
    };

    block_on(async {
        let throttle = Throttle::user(build_store(&url).await, &settings()).unwrap();

        for _ in 0..10 {
            assert!(
                throttle
                    .check(&RequestContext::new())
                    .await
                    .unwrap()
                    .is_admitted()
            );
        }
    });
}
