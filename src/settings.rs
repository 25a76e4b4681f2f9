//! Rate thresholds per caller class.
//!
//! Settings are plain serde data so they can come from any configuration source.
//! [`ThrottleSettings::from_env`] reads the two classes from JSON environment
//! variables:
//!
//! ```text
//! AI_DOCUMENT_RATE_THROTTLE_RATES={"minute": 5, "hour": 100, "day": 500}
//! AI_USER_RATE_THROTTLE_RATES={"minute": 3, "hour": 50, "day": 200}
//! ```

use std::env;

use serde::{Deserialize, Serialize};

use crate::{RateConfig, ThrottleError, Window};

/// Environment variable holding the document-scoped thresholds.
pub const DOCUMENT_RATES_ENV: &str = "AI_DOCUMENT_RATE_THROTTLE_RATES";

/// Environment variable holding the identity-scoped thresholds.
pub const USER_RATES_ENV: &str = "AI_USER_RATE_THROTTLE_RATES";

/// Raw thresholds as they appear in settings, before validation.
///
/// Every field is optional so that a missing threshold surfaces as a
/// [`ThrottleError::Configuration`] instead of a deserialization failure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RateConfigInput {
    /// Requests per trailing minute.
    pub minute: Option<u64>,
    /// Requests per trailing hour.
    pub hour: Option<u64>,
    /// Requests per trailing day.
    pub day: Option<u64>,
}

impl TryFrom<RateConfigInput> for RateConfig {
    type Error = ThrottleError;

    fn try_from(input: RateConfigInput) -> Result<Self, Self::Error> {
        let require = |value: Option<u64>, window: Window| {
            value.ok_or_else(|| {
                ThrottleError::Configuration(format!("missing `{window}` rate threshold"))
            })
        };

        RateConfig::new(
            require(input.minute, Window::Minute)?,
            require(input.hour, Window::Hour)?,
            require(input.day, Window::Day)?,
        )
    }
}

/// The caller classes a throttle can be built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThrottleClass {
    /// Limits keyed by document.
    Document,
    /// Limits keyed by authenticated user or client IP.
    User,
}

/// Thresholds for every caller class. A class without thresholds cannot be throttled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ThrottleSettings {
    /// Document-scoped thresholds.
    #[serde(default)]
    pub document: Option<RateConfigInput>,
    /// Identity-scoped thresholds.
    #[serde(default)]
    pub user: Option<RateConfigInput>,
}

impl ThrottleSettings {
    /// Parse settings from a JSON document such as
    /// `{"document": {"minute": 5, "hour": 100, "day": 500}}`.
    pub fn from_json(json: &str) -> Result<Self, ThrottleError> {
        serde_json::from_str(json)
            .map_err(|err| ThrottleError::Configuration(format!("invalid throttle settings: {err}")))
    }

    /// Read [`DOCUMENT_RATES_ENV`] and [`USER_RATES_ENV`]. Unset variables leave their
    /// class unconfigured.
    pub fn from_env() -> Result<Self, ThrottleError> {
        Self::from_lookup(|name| {
            env::var_os(name).map(|value| value.to_string_lossy().into_owned())
        })
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ThrottleError> {
        let parse = |name: &str| {
            lookup(name)
                .map(|raw| {
                    serde_json::from_str::<RateConfigInput>(&raw).map_err(|err| {
                        ThrottleError::Configuration(format!("invalid {name}: {err}"))
                    })
                })
                .transpose()
        };

        Ok(Self {
            document: parse(DOCUMENT_RATES_ENV)?,
            user: parse(USER_RATES_ENV)?,
        })
    }

    /// Validated thresholds for `class`.
    pub fn rates_for(&self, class: ThrottleClass) -> Result<RateConfig, ThrottleError> {
        let input = match class {
            ThrottleClass::Document => self.document,
            ThrottleClass::User => self.user,
        };

        let Some(input) = input else {
            return Err(ThrottleError::Configuration(format!(
                "no rate thresholds configured for {class:?} throttling"
            )));
        };

        RateConfig::try_from(input)
    }
}
