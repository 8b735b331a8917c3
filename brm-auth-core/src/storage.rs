use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Failed login bookkeeping for one normalized identifier.
///
/// A record exists only while there is something to remember: it is created
/// by the first failure of a streak and removed on success or once an
/// expired lock is noticed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub identifier: String,
    pub failure_count: u32,
    pub first_failure_at: DateTime<Utc>,
    pub locked_until: Option<DateTime<Utc>>,
}

impl AttemptRecord {
    /// A fresh record for the first failure of a streak.
    pub fn first_failure(identifier: &str, at: DateTime<Utc>) -> Self {
        Self {
            identifier: identifier.to_string(),
            failure_count: 1,
            first_failure_at: at,
            locked_until: None,
        }
    }

    pub fn is_locked_at(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| now < until)
    }

    /// The lock deadline has been reached.
    pub fn lock_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| now >= until)
    }

    /// Nothing left worth keeping.
    pub fn is_collectible(&self) -> bool {
        self.failure_count == 0 && self.locked_until.is_none()
    }
}

/// Named states of the escalation ladder for one identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThrottleState {
    /// No failures on record.
    Clean,
    /// Some failures, still below the CAPTCHA threshold.
    Warming,
    /// CAPTCHA threshold reached; sign-in needs a token.
    CaptchaRequired,
    /// Lockout in force until `locked_until`.
    Locked,
}

/// Point-in-time view of an identifier's throttle state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockoutStatus {
    pub identifier: String,
    pub failed_attempts: u32,
    pub is_locked: bool,
    pub captcha_required: bool,
    pub locked_until: Option<DateTime<Utc>>,
}

impl LockoutStatus {
    /// Status for an identifier with no record.
    pub fn clean(identifier: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            failed_attempts: 0,
            is_locked: false,
            captcha_required: false,
            locked_until: None,
        }
    }

    pub fn state(&self) -> ThrottleState {
        if self.is_locked {
            ThrottleState::Locked
        } else if self.captcha_required {
            ThrottleState::CaptchaRequired
        } else if self.failed_attempts > 0 {
            ThrottleState::Warming
        } else {
            ThrottleState::Clean
        }
    }

    /// Seconds until the lock lifts, rounded up, e.g. for a `Retry-After`
    /// header. `None` when not locked.
    pub fn retry_after_seconds(&self, now: DateTime<Utc>) -> Option<u64> {
        let until = self.locked_until.filter(|_| self.is_locked)?;
        let millis = (until - now).num_milliseconds();
        (millis > 0).then(|| ((millis + 999) / 1000) as u64)
    }

    /// Whole minutes until the lock lifts, rounded up; 0 when not locked.
    pub fn minutes_remaining(&self, now: DateTime<Utc>) -> u64 {
        match self.locked_until.filter(|_| self.is_locked) {
            Some(until) => minutes_until(now, until),
            None => 0,
        }
    }
}

/// `ceil((until - now) / 1 minute)`, or 0 once `until` has passed.
pub fn minutes_until(now: DateTime<Utc>, until: DateTime<Utc>) -> u64 {
    const MINUTE_MS: i64 = 60_000;

    let millis = (until - now).num_milliseconds();
    if millis <= 0 {
        return 0;
    }
    ((millis + MINUTE_MS - 1) / MINUTE_MS) as u64
}
