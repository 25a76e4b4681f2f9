use std::{
    fmt,
    ops::Deref,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use serde::Serialize;

use crate::ThrottleError;

/// Seconds since the Unix epoch.
pub type Timestamp = f64;

/// Request timestamps recorded under a single [`ThrottleKey`], oldest first.
pub type History = Vec<Timestamp>;

/// How long a history lives in the store after its last write.
///
/// Equal to the largest window so that abandoned keys are reclaimed once nothing
/// in them can count any more.
pub const HISTORY_TTL: Duration = Duration::from_secs(86_400);

pub(crate) fn now_timestamp() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or_default()
}

/// One of the three trailing windows a history is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Window {
    /// Trailing 60 seconds.
    Minute,
    /// Trailing 3 600 seconds.
    Hour,
    /// Trailing 86 400 seconds.
    Day,
}

impl Window {
    /// All windows, finest first.
    pub const ALL: [Window; 3] = [Window::Minute, Window::Hour, Window::Day];

    /// Window length in seconds.
    pub const fn seconds(self) -> u64 {
        match self {
            Window::Minute => 60,
            Window::Hour => 3_600,
            Window::Day => 86_400,
        }
    }

    /// Window length as a [`Duration`].
    ///
    /// This is also the backoff recommended to a caller rejected by this window.
    pub const fn duration(self) -> Duration {
        Duration::from_secs(self.seconds())
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Window::Minute => write!(f, "minute"),
            Window::Hour => write!(f, "hour"),
            Window::Day => write!(f, "day"),
        }
    }
}

/// Maximum number of admitted requests within one window.
///
/// Must be at least 1; a window that admits nothing is a configuration error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RequestLimit(u64);

impl Deref for RequestLimit {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<u64> for RequestLimit {
    type Error = ThrottleError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value == 0 {
            Err(ThrottleError::Configuration(
                "Request limit must be greater than 0".to_string(),
            ))
        } else {
            Ok(Self(value))
        }
    }
}

/// Thresholds for the three windows of a [`TieredRateLimiter`](crate::TieredRateLimiter).
///
/// Build one from raw numbers with [`RateConfig::new`] or from deserialized settings
/// via [`RateConfigInput`](crate::settings::RateConfigInput).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RateConfig {
    /// Admitted requests allowed within the trailing minute.
    pub minute: RequestLimit,
    /// Admitted requests allowed within the trailing hour.
    pub hour: RequestLimit,
    /// Admitted requests allowed within the trailing day.
    pub day: RequestLimit,
}

impl RateConfig {
    /// Validate and assemble a config from raw thresholds.
    pub fn new(minute: u64, hour: u64, day: u64) -> Result<Self, ThrottleError> {
        Ok(Self {
            minute: RequestLimit::try_from(minute)?,
            hour: RequestLimit::try_from(hour)?,
            day: RequestLimit::try_from(day)?,
        })
    }

    /// Threshold configured for `window`.
    pub fn limit(&self, window: Window) -> RequestLimit {
        match window {
            Window::Minute => self.minute,
            Window::Hour => self.hour,
            Window::Day => self.day,
        }
    }

    /// Whether a request observing `counts` may be admitted.
    pub fn admits(&self, counts: &WindowCounts) -> bool {
        Window::ALL
            .into_iter()
            .all(|window| counts.get(window) < *self.limit(window))
    }
}

/// Trailing request counts observed for a key at evaluation time.
///
/// Counts are taken before the evaluated request is recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct WindowCounts {
    /// Requests within the trailing 60 seconds.
    pub minute: u64,
    /// Requests within the trailing 3 600 seconds.
    pub hour: u64,
    /// Requests within the trailing 86 400 seconds.
    pub day: u64,
}

impl WindowCounts {
    /// Count for `window`.
    pub fn get(&self, window: Window) -> u64 {
        match window {
            Window::Minute => self.minute,
            Window::Hour => self.hour,
            Window::Day => self.day,
        }
    }

    /// Drop every entry of `history` at or before `now - 1 day`, then count the rest.
    pub fn prune_and_count(history: &mut History, now: Timestamp) -> Self {
        let day_start = now - Window::Day.seconds() as f64;
        history.retain(|&ts| ts > day_start);

        let since = |window: Window| {
            let start = now - window.seconds() as f64;
            history.iter().filter(|&&ts| ts > start).count() as u64
        };

        Self {
            minute: since(Window::Minute),
            hour: since(Window::Hour),
            day: history.len() as u64,
        }
    }
}

/// Outcome of evaluating one request against a key's history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    admitted: bool,
    counts: WindowCounts,
    rates: RateConfig,
}

impl Decision {
    pub(crate) fn evaluate(counts: WindowCounts, rates: RateConfig) -> Self {
        Self {
            admitted: rates.admits(&counts),
            counts,
            rates,
        }
    }

    /// Decision for a request that could not be attributed to any key.
    ///
    /// Such requests are admitted without consulting the store.
    pub(crate) fn unkeyed(rates: RateConfig) -> Self {
        Self {
            admitted: true,
            counts: WindowCounts::default(),
            rates,
        }
    }

    /// Whether the request was admitted and recorded.
    pub fn is_admitted(&self) -> bool {
        self.admitted
    }

    /// Trailing counts observed before this request.
    pub fn counts(&self) -> WindowCounts {
        self.counts
    }

    /// Thresholds the request was evaluated against.
    pub fn rates(&self) -> RateConfig {
        self.rates
    }

    /// Coarsest window whose threshold was reached, if any.
    pub fn limited_by(&self) -> Option<Window> {
        Window::ALL
            .into_iter()
            .rev()
            .find(|&window| self.counts.get(window) >= *self.rates.limit(window))
    }

    /// Recommended backoff before retrying.
    ///
    /// Escalates with the coarsest violated window: a caller blocked by both the day
    /// and the minute threshold waits a full day. `None` when no threshold was reached.
    pub fn wait(&self) -> Option<Duration> {
        self.limited_by().map(Window::duration)
    }

    /// [`Decision::wait`] in whole seconds, suitable for a `Retry-After` header.
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.limited_by().map(Window::seconds)
    }
}

/// Identifier of one independent rate-limit history.
///
/// Any non-empty string. Key policies produce `document:<id>`, `user:<id>` and
/// `anon:<ip>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThrottleKey(Arc<str>);

impl ThrottleKey {
    /// Join `scope` and `id` as `<scope>:<id>`.
    pub fn scoped(scope: &str, id: &str) -> Result<Self, ThrottleError> {
        if id.trim().is_empty() {
            return Err(ThrottleError::InvalidKey(format!(
                "{scope} identifier must not be empty"
            )));
        }

        Self::try_from(format!("{scope}:{id}"))
    }
}

impl Deref for ThrottleKey {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for ThrottleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ThrottleKey {
    type Error = ThrottleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.trim().is_empty() {
            Err(ThrottleError::InvalidKey(
                "Throttle key must not be empty".to_string(),
            ))
        } else {
            Ok(Self(Arc::from(value)))
        }
    }
}

impl TryFrom<&str> for ThrottleKey {
    type Error = ThrottleError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_from(value.to_string())
    }
}
