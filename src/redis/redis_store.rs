use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;

use crate::{
    AtomicRateLimitStore, History, KeyPrefix, RateConfig, RateLimitStore, ThrottleError,
    ThrottleKey, ThrottleRedisClient, Timestamp, Window, WindowCounts,
};

/// Configuration for [`RedisStore`].
///
/// # Examples
///
/// ```ignore
/// use tiered_throttle::{KeyPrefix, RedisStoreOptions, ThrottleRedisClient};
///
/// let client = redis::Client::open("redis://127.0.0.1:6379/")?;
///
/// let options = RedisStoreOptions {
///     client: ThrottleRedisClient::from_client(client, 4).await?,
///     prefix: Some(KeyPrefix::try_from("myapp".to_string())?), // Keys: myapp:<key>
/// };
/// ```
#[derive(Clone, Debug)]
pub struct RedisStoreOptions {
    /// Connections used by the store.
    pub client: ThrottleRedisClient,

    /// Namespace for every key written by the store.
    ///
    /// Keys are stored as `<prefix>:<throttle key>`, e.g. `throttle_ai:user:42`.
    /// If `None`, defaults to [`KeyPrefix::default_prefix`].
    pub prefix: Option<KeyPrefix>,
}

/// Shared [`RateLimitStore`] backed by Redis.
///
/// # Data model
///
/// One string key per throttle key, holding the history as a JSON array of epoch
/// seconds, written with `SET ... EX`. Expiry is refreshed on every write, so a key
/// disappears a day after its last admitted request.
///
/// # Consistency
///
/// - `get`/`set`: last write wins. Two processes evaluating the same key at the same
///   moment may both admit.
/// - [`AtomicRateLimitStore::record_if_within`]: a single Lua script prunes, counts
///   and appends, so concurrent callers are serialized by Redis.
///
/// # Errors
///
/// - Connection and command failures map to [`ThrottleError::StoreUnavailable`]
/// - A stored value that is not a JSON array of numbers maps to
///   [`ThrottleError::CorruptState`]
pub struct RedisStore {
    client: ThrottleRedisClient,
    prefix: KeyPrefix,
}

impl RedisStore {
    /// Create a store from `options`.
    pub fn new(options: RedisStoreOptions) -> Self {
        Self {
            client: options.client,
            prefix: options.prefix.unwrap_or_default(),
        }
    }

    /// Redis key used for `key`.
    pub fn store_key(&self, key: &ThrottleKey) -> String {
        self.prefix.store_key(key)
    }
}

#[async_trait]
impl RateLimitStore for RedisStore {
    async fn get(&self, key: &ThrottleKey) -> Result<Option<History>, ThrottleError> {
        let store_key = self.store_key(key);
        let mut connection_manager = self.client.get()?;

        let raw: Option<String> = connection_manager.get(&store_key).await.map_err(|err| {
            tracing::warn!(key = %store_key, error = ?err, "redis.read.error");
            ThrottleError::from(err)
        })?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        serde_json::from_str::<History>(&raw)
            .map(Some)
            .map_err(|err| {
                tracing::warn!(key = %store_key, error = %err, "redis.corrupt_state");
                ThrottleError::CorruptState {
                    key: store_key,
                    reason: err.to_string(),
                }
            })
    }

    async fn set(
        &self,
        key: &ThrottleKey,
        history: &History,
        expiry: Duration,
    ) -> Result<(), ThrottleError> {
        let store_key = self.store_key(key);
        let payload = serde_json::to_string(history).map_err(|err| ThrottleError::CorruptState {
            key: store_key.clone(),
            reason: err.to_string(),
        })?;

        let mut connection_manager = self.client.get()?;

        let _: () = connection_manager
            .set_ex(&store_key, payload, expiry.as_secs().max(1))
            .await
            .map_err(|err| {
                tracing::warn!(key = %store_key, error = ?err, "redis.write.error");
                ThrottleError::from(err)
            })?;

        Ok(())
    }
}

#[async_trait]
impl AtomicRateLimitStore for RedisStore {
    async fn record_if_within(
        &self,
        key: &ThrottleKey,
        now: Timestamp,
        rates: &RateConfig,
        expiry: Duration,
    ) -> Result<WindowCounts, ThrottleError> {
        let script = redis::Script::new(
            r#"
            local history_key = KEYS[1]

            local now = tonumber(ARGV[1])
            local minute_limit = tonumber(ARGV[2])
            local hour_limit = tonumber(ARGV[3])
            local day_limit = tonumber(ARGV[4])
            local expiry_seconds = tonumber(ARGV[5])
            local minute_seconds = tonumber(ARGV[6])
            local hour_seconds = tonumber(ARGV[7])
            local day_seconds = tonumber(ARGV[8])

            local history = {}
            local raw = redis.call("GET", history_key)
            if raw then
                local ok, decoded = pcall(cjson.decode, raw)
                if not ok or type(decoded) ~= "table" then
                    return {"corrupt", 0, 0, 0}
                end
                history = decoded
            end

            local kept = {}
            local minute_count = 0
            local hour_count = 0

            for i = 1, #history do
                local timestamp = tonumber(history[i])
                if timestamp == nil then
                    return {"corrupt", 0, 0, 0}
                end

                if timestamp > now - day_seconds then
                    kept[#kept + 1] = timestamp

                    if timestamp > now - hour_seconds then
                        hour_count = hour_count + 1
                    end

                    if timestamp > now - minute_seconds then
                        minute_count = minute_count + 1
                    end
                end
            end

            local day_count = #kept

            if minute_count < minute_limit and hour_count < hour_limit and day_count < day_limit then
                kept[#kept + 1] = now
                redis.call("SET", history_key, cjson.encode(kept), "EX", expiry_seconds)
            end

            return {"ok", minute_count, hour_count, day_count}
        "#,
        );

        let store_key = self.store_key(key);
        let mut connection_manager = self.client.get()?;

        let (status, minute, hour, day): (String, u64, u64, u64) = script
            .key(&store_key)
            .arg(now)
            .arg(*rates.minute)
            .arg(*rates.hour)
            .arg(*rates.day)
            .arg(expiry.as_secs().max(1))
            .arg(Window::Minute.seconds())
            .arg(Window::Hour.seconds())
            .arg(Window::Day.seconds())
            .invoke_async(&mut connection_manager)
            .await
            .map_err(|err| {
                tracing::warn!(key = %store_key, error = ?err, "redis.script.error");
                ThrottleError::from(err)
            })?;

        match status.as_str() {
            "ok" => Ok(WindowCounts { minute, hour, day }),
            _ => {
                tracing::warn!(key = %store_key, "redis.corrupt_state");
                Err(ThrottleError::CorruptState {
                    key: store_key,
                    reason: "stored history is not an array of numbers".to_string(),
                })
            }
        }
    } // end method record_if_within
}
