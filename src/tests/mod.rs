mod runtime;

mod test_key_policies;
#[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
mod test_redis_store;
