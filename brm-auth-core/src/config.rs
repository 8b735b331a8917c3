//! Policy configuration for login throttling and the sign-in flow.

use std::str::FromStr;

use chrono::Duration;

use crate::error::ConfigError;

/// Brute force policy for [`LoginThrottleGuard`](crate::services::LoginThrottleGuard).
///
/// Defaults: CAPTCHA after 3 failures, 30 second lockout after 5 failures,
/// every sign-in padded to at least one second.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottleConfig {
    /// When false, nothing is recorded and nothing is ever locked.
    pub enabled: bool,
    /// Failures after which a CAPTCHA token is required.
    pub captcha_threshold: u32,
    /// Failures after which the identifier is locked. Must exceed
    /// `captcha_threshold`.
    pub lockout_threshold: u32,
    pub lockout_duration: Duration,
    /// Minimum wall-clock time of a protected sign-in.
    pub timing_floor: std::time::Duration,
    /// Re-arm the lock on failures recorded while already locked.
    pub extend_lockout_on_failure: bool,
    /// Forget a streak whose first failure is older than this. `None` keeps
    /// streaks until success or lockout expiry.
    pub attempt_window: Option<Duration>,
    /// Period of the background purge started by `start_cleanup_task`.
    pub cleanup_interval: std::time::Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            captcha_threshold: 3,
            lockout_threshold: 5,
            lockout_duration: Duration::seconds(30),
            timing_floor: std::time::Duration::from_millis(1000),
            extend_lockout_on_failure: false,
            attempt_window: None,
            cleanup_interval: std::time::Duration::from_secs(60),
        }
    }
}

impl ThrottleConfig {
    /// A configuration that turns all throttling off.
    ///
    /// Timing protection stays active; it costs nothing but latency.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Check the thresholds and durations are coherent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.captcha_threshold == 0 {
            return Err(ConfigError::InvalidThreshold(
                "captcha_threshold must be at least 1".to_string(),
            ));
        }
        if self.lockout_threshold <= self.captcha_threshold {
            return Err(ConfigError::InvalidThreshold(format!(
                "lockout_threshold ({}) must be greater than captcha_threshold ({})",
                self.lockout_threshold, self.captcha_threshold
            )));
        }
        if self.lockout_duration <= Duration::zero() {
            return Err(ConfigError::InvalidDuration(
                "lockout_duration must be positive".to_string(),
            ));
        }
        if self.attempt_window.is_some_and(|w| w <= Duration::zero()) {
            return Err(ConfigError::InvalidDuration(
                "attempt_window must be positive".to_string(),
            ));
        }
        if self.cleanup_interval.is_zero() {
            return Err(ConfigError::InvalidDuration(
                "cleanup_interval must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Build a configuration from `BRM_AUTH_*` environment variables, falling
    /// back to the defaults for anything unset.
    ///
    /// | variable | field |
    /// |---|---|
    /// | `BRM_AUTH_ENABLED` | `enabled` |
    /// | `BRM_AUTH_CAPTCHA_THRESHOLD` | `captcha_threshold` |
    /// | `BRM_AUTH_LOCKOUT_THRESHOLD` | `lockout_threshold` |
    /// | `BRM_AUTH_LOCKOUT_SECONDS` | `lockout_duration` |
    /// | `BRM_AUTH_TIMING_FLOOR_MS` | `timing_floor` |
    /// | `BRM_AUTH_EXTEND_LOCKOUT` | `extend_lockout_on_failure` |
    /// | `BRM_AUTH_ATTEMPT_WINDOW_SECONDS` | `attempt_window` |
    /// | `BRM_AUTH_CLEANUP_INTERVAL_SECONDS` | `cleanup_interval` |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(val) = parse_var::<bool>(&lookup, "BRM_AUTH_ENABLED")? {
            config.enabled = val;
        }
        if let Some(val) = parse_var(&lookup, "BRM_AUTH_CAPTCHA_THRESHOLD")? {
            config.captcha_threshold = val;
        }
        if let Some(val) = parse_var(&lookup, "BRM_AUTH_LOCKOUT_THRESHOLD")? {
            config.lockout_threshold = val;
        }
        if let Some(val) = parse_seconds(&lookup, "BRM_AUTH_LOCKOUT_SECONDS")? {
            config.lockout_duration = val;
        }
        if let Some(val) = parse_var(&lookup, "BRM_AUTH_TIMING_FLOOR_MS")? {
            config.timing_floor = std::time::Duration::from_millis(val);
        }
        if let Some(val) = parse_var::<bool>(&lookup, "BRM_AUTH_EXTEND_LOCKOUT")? {
            config.extend_lockout_on_failure = val;
        }
        if let Some(val) = parse_seconds(&lookup, "BRM_AUTH_ATTEMPT_WINDOW_SECONDS")? {
            config.attempt_window = Some(val);
        }
        if let Some(val) = parse_var(&lookup, "BRM_AUTH_CLEANUP_INTERVAL_SECONDS")? {
            config.cleanup_interval = std::time::Duration::from_secs(val);
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw,
            }),
    }
}

/// Parse a whole number of seconds into a `Duration`, rejecting values
/// outside chrono's range.
fn parse_seconds(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<Duration>, ConfigError> {
    let Some(secs) = parse_var::<i64>(lookup, key)? else {
        return Ok(None);
    };
    Duration::try_seconds(secs)
        .map(Some)
        .ok_or_else(|| ConfigError::InvalidValue {
            key: key.to_string(),
            value: secs.to_string(),
        })
}

/// Settings for [`SignInService`](crate::services::SignInService).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignInConfig {
    /// Upper bound on a single identity provider call. `None` waits as long
    /// as the provider takes.
    pub provider_timeout: Option<std::time::Duration>,
}
