#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![forbid(unsafe_code)]

mod rate_limiter;
pub use rate_limiter::*;

mod store;
pub use store::*;

pub mod local;
pub use local::*;

#[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
pub mod redis;
#[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
pub use self::redis::*;

mod policy;
pub use policy::*;

mod throttle;
pub use throttle::*;

pub mod settings;
pub use settings::{RateConfigInput, ThrottleClass, ThrottleSettings};

mod error;
pub use error::*;

mod common;
pub use common::{
    Decision, HISTORY_TTL, History, RateConfig, RequestLimit, ThrottleKey, Timestamp, Window,
    WindowCounts,
};

#[cfg(test)]
mod tests;
