//! Runner configuration.
//!
//! Durations are written as strings with a unit suffix (`250ms`, `30s`,
//! `5m`, `1h`).

use crate::errors::BuildflowError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What happens to in-flight siblings when a required stage fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortPolicy {
    /// Let every dispatched stage of the failing wave finish.
    #[default]
    FinishWave,
    /// Cancel running parallel siblings as soon as a required one fails.
    CancelSiblings,
}

/// Logging configuration used by [`crate::observability::init_tracing`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is not set.
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

/// Configuration for a [`crate::pipeline::PipelineRunner`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Timeout for stages that do not set their own.
    #[serde(with = "duration_serde")]
    pub default_stage_timeout: Duration,
    /// Sibling handling after a required failure.
    pub abort_policy: AbortPolicy,
    /// Logging setup.
    pub log: LogConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            default_stage_timeout: Duration::from_secs(300),
            abort_policy: AbortPolicy::FinishWave,
            log: LogConfig::default(),
        }
    }
}

impl RunnerConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default stage timeout.
    #[must_use]
    pub const fn with_default_stage_timeout(mut self, timeout: Duration) -> Self {
        self.default_stage_timeout = timeout;
        self
    }

    /// Sets the abort policy.
    #[must_use]
    pub const fn with_abort_policy(mut self, policy: AbortPolicy) -> Self {
        self.abort_policy = policy;
        self
    }

    /// Sets the logging configuration.
    #[must_use]
    pub fn with_log(mut self, log: LogConfig) -> Self {
        self.log = log;
        self
    }

    /// Parses and validates a JSON configuration document.
    ///
    /// Missing fields take their default values.
    pub fn from_json(input: &str) -> Result<Self, BuildflowError> {
        let config: Self = serde_json::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration for values the runner cannot honor.
    pub fn validate(&self) -> Result<(), BuildflowError> {
        if self.default_stage_timeout.is_zero() {
            return Err(BuildflowError::Config(
                "default_stage_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}ms", duration.as_millis()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse(&s).map_err(serde::de::Error::custom)
    }

    pub fn parse(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        let (digits, unit) = s
            .find(|c: char| !c.is_ascii_digit())
            .map_or((s, ""), |idx| s.split_at(idx));
        let n: u64 = digits
            .parse()
            .map_err(|e| format!("invalid duration '{s}': {e}"))?;
        let secs_per_unit = match unit {
            "ms" => return Ok(Duration::from_millis(n)),
            "s" => 1,
            "m" => 60,
            "h" => 3600,
            _ => return Err(format!("unknown duration unit in '{s}'")),
        };
        n.checked_mul(secs_per_unit)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("duration '{s}' is too large"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = RunnerConfig::default();
        assert_eq!(config.default_stage_timeout, Duration::from_secs(300));
        assert_eq!(config.abort_policy, AbortPolicy::FinishWave);
        assert_eq!(config.log.filter, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_partial() {
        let config = RunnerConfig::from_json(
            r#"{"default_stage_timeout": "90s", "abort_policy": "cancel_siblings"}"#,
        )
        .unwrap();

        assert_eq!(config.default_stage_timeout, Duration::from_secs(90));
        assert_eq!(config.abort_policy, AbortPolicy::CancelSiblings);
        assert_eq!(config.log, LogConfig::default());
    }

    #[test]
    fn test_from_json_rejects_zero_timeout() {
        let err = RunnerConfig::from_json(r#"{"default_stage_timeout": "0ms"}"#).unwrap_err();
        assert!(matches!(err, BuildflowError::Config(_)));
    }

    #[test]
    fn test_from_json_rejects_bad_unit() {
        let err = RunnerConfig::from_json(r#"{"default_stage_timeout": "5 fortnights"}"#).unwrap_err();
        assert!(matches!(err, BuildflowError::Serialization(_)));
    }

    #[test]
    fn test_roundtrip_duration_format() {
        let config = RunnerConfig::new().with_default_stage_timeout(Duration::from_millis(1500));
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["default_stage_timeout"], "1500ms");
    }

    #[test]
    fn test_parse_units() {
        assert_eq!(duration_serde::parse("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(duration_serde::parse("5m"), Ok(Duration::from_secs(300)));
        assert_eq!(duration_serde::parse("2h"), Ok(Duration::from_secs(7200)));
        assert!(duration_serde::parse("ms").is_err());
        assert!(duration_serde::parse("10").is_err());
    }

    #[test]
    fn test_from_json_rejects_overflowing_duration() {
        let err = RunnerConfig::from_json(r#"{"default_stage_timeout": "10000000000000000h"}"#)
            .unwrap_err();
        assert!(matches!(err, BuildflowError::Serialization(_)));
        assert!(err.to_string().contains("too large"));

        assert!(duration_serde::parse("307445734561825861m").is_err());
        assert_eq!(
            duration_serde::parse("18446744073709551615s"),
            Ok(Duration::from_secs(u64::MAX))
        );
    }
}
