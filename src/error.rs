/// Error type for this crate.
#[derive(Debug, thiserror::Error)]
pub enum ThrottleError {
    /// Missing or invalid rate thresholds, or a request context that lacks the
    /// input a key policy requires.
    #[error("invalid throttle configuration: {0}")]
    Configuration(String),

    /// Empty throttle key or invalid store prefix.
    #[error("invalid throttle key: {0}")]
    InvalidKey(String),

    /// The backing store could not be read or written.
    #[error("rate limit store unavailable: {0}")]
    StoreUnavailable(String),

    /// The stored history for a key could not be decoded.
    #[error("corrupt rate limit history for `{key}`: {reason}")]
    CorruptState {
        /// Store key holding the undecodable value.
        key: String,
        /// Decoder error.
        reason: String,
    },
}

#[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
impl From<redis::RedisError> for ThrottleError {
    fn from(err: redis::RedisError) -> Self {
        ThrottleError::StoreUnavailable(format!("redis error: {err}"))
    }
}
