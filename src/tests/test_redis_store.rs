use std::{env, sync::Arc, time::Duration};

use redis::AsyncCommands;

use super::runtime::block_on_redis;
use crate::{
    AtomicRateLimitStore, HISTORY_TTL, KeyPrefix, RateConfig, RateLimitStore, RedisStore,
    RedisStoreOptions, ThrottleError, ThrottleKey, ThrottleRedisClient, TieredRateLimiter,
    WindowCounts,
};

const NOW: f64 = 1_700_000_000.0;

fn redis_url() -> Option<String> {
    env::var("REDIS_URL").ok()
}

fn unique_prefix() -> KeyPrefix {
    let n: u64 = rand::random();
    KeyPrefix::try_from(format!("throttle_test_{n}")).unwrap()
}

fn key(s: &str) -> ThrottleKey {
    ThrottleKey::try_from(s).unwrap()
}

async fn build_store(url: &str) -> (RedisStore, redis::aio::ConnectionManager) {
    let client = redis::Client::open(url).unwrap();
    let cm = client.get_connection_manager().await.unwrap();

    let store = RedisStore::new(RedisStoreOptions {
        client: ThrottleRedisClient::from_client(client, 2).await.unwrap(),
        prefix: Some(unique_prefix()),
    });

    (store, cm)
}

#[test]
fn key_prefix_validation() {
    assert_eq!(&*KeyPrefix::default(), "throttle_ai");
    assert!(KeyPrefix::try_from("myapp".to_string()).is_ok());

    for invalid in [String::new(), "a:b".to_string(), "x".repeat(256)] {
        assert!(matches!(
            KeyPrefix::try_from(invalid),
            Err(ThrottleError::InvalidKey(_))
        ));
    }
}

#[test]
fn set_then_get_round_trips_with_expiry() {
    let Some(url) = redis_url() else {
        return;
    };

    block_on_redis(async {
        let (store, mut cm) = build_store(&url).await;
        let k = key("user:1");

        assert_eq!(store.get(&k).await.unwrap(), None);

        store.set(&k, &vec![NOW - 1.5, NOW], HISTORY_TTL).await.unwrap();
        assert_eq!(store.get(&k).await.unwrap(), Some(vec![NOW - 1.5, NOW]));

        let ttl: i64 = cm.ttl(store.store_key(&k)).await.unwrap();
        assert!(ttl > 86_000 && ttl <= 86_400, "unexpected ttl {ttl}");
    });
}

#[test]
fn corrupt_value_is_reported() {
    let Some(url) = redis_url() else {
        return;
    };

    block_on_redis(async {
        let (store, mut cm) = build_store(&url).await;
        let k = key("user:corrupt");

        let _: () = cm.set(store.store_key(&k), "not json").await.unwrap();

        assert!(matches!(
            store.get(&k).await,
            Err(ThrottleError::CorruptState { .. })
        ));

        let rates = RateConfig::new(1, 5, 10).unwrap();
        assert!(matches!(
            store.record_if_within(&k, NOW, &rates, HISTORY_TTL).await,
            Err(ThrottleError::CorruptState { .. })
        ));
    });
}

#[test]
fn record_if_within_prunes_counts_and_appends() {
    let Some(url) = redis_url() else {
        return;
    };

    block_on_redis(async {
        let (store, _cm) = build_store(&url).await;
        let k = key("document:atomic");
        let rates = RateConfig::new(2, 5, 10).unwrap();

        store
            .set(&k, &vec![NOW - 90_000.0, NOW - 1_000.0, NOW - 30.0], HISTORY_TTL)
            .await
            .unwrap();

        let counts = store
            .record_if_within(&k, NOW, &rates, HISTORY_TTL)
            .await
            .unwrap();
        assert_eq!(
            counts,
            WindowCounts {
                minute: 1,
                hour: 2,
                day: 2
            }
        );
        assert_eq!(
            store.get(&k).await.unwrap(),
            Some(vec![NOW - 1_000.0, NOW - 30.0, NOW])
        );

        // Minute is now full: nothing is written.
        let counts = store
            .record_if_within(&k, NOW + 1.0, &rates, HISTORY_TTL)
            .await
            .unwrap();
        assert_eq!(counts.minute, 2);
        assert_eq!(
            store.get(&k).await.unwrap(),
            Some(vec![NOW - 1_000.0, NOW - 30.0, NOW])
        );
    });
}

#[test]
fn limiter_over_redis_matches_tiered_semantics() {
    let Some(url) = redis_url() else {
        return;
    };

    block_on_redis(async {
        let (store, _cm) = build_store(&url).await;
        let store = Arc::new(store);
        let rates = RateConfig::new(1, 5, 10).unwrap();

        for limiter in [
            TieredRateLimiter::new(store.clone(), rates),
            TieredRateLimiter::strict(store.clone(), rates),
        ] {
            let k = key(&format!("user:{:?}", limiter.consistency()));

            assert!(limiter.allow_at(&k, NOW).await.unwrap().is_admitted());

            let denied = limiter.allow_at(&k, NOW + 1.0).await.unwrap();
            assert!(!denied.is_admitted());
            assert_eq!(denied.wait(), Some(Duration::from_secs(60)));
        }
    });
}
