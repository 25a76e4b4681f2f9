//! Redis storage provider.
//!
//! [`RedisStore`] keeps histories in Redis so that every process throttling the same
//! keys sees the same counts. Requires the `redis-tokio` or `redis-smol` feature.

mod common;
pub use common::*;

mod redis_store;
pub use redis_store::*;
