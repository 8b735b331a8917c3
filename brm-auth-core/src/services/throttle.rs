//! Login throttling for the sign-in flow.
//!
//! This module tracks failed sign-ins per normalized email and escalates in
//! three steps: after `captcha_threshold` failures a CAPTCHA token is
//! required, after `lockout_threshold` failures the identifier is locked for
//! `lockout_duration`, and once the lock deadline passes the identifier starts
//! over from a clean slate.
//!
//! # Limitations
//!
//! The guard keeps its records in process memory. A client that restarts, or
//! talks to the identity provider directly, is not throttled by it. It is a
//! fast, local first line; the provider's own rate limits remain the
//! authority.
//!
//! # Example
//!
//! ```rust,ignore
//! use brm_auth_core::{LoginThrottleGuard, InMemoryAttemptRepository, ThrottleConfig};
//!
//! let guard = LoginThrottleGuard::new(
//!     Arc::new(InMemoryAttemptRepository::new()),
//!     ThrottleConfig::default(),
//! );
//!
//! if guard.is_locked("user@example.com") {
//!     let minutes = guard.lockout_time_remaining("user@example.com");
//!     // Tell the user to come back in `minutes`
//! }
//!
//! let result = guard.with_timing_protection(provider.sign_in(..)).await;
//! match result {
//!     Ok(_) => guard.reset_login_attempts("user@example.com"),
//!     Err(_) => { guard.record_login_attempt("user@example.com"); }
//! }
//! ```

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    clock::{Clock, SystemClock},
    config::ThrottleConfig,
    repositories::AttemptRepository,
    services::timing::TimingProtection,
    storage::{AttemptRecord, LockoutStatus, ThrottleState, minutes_until},
    validation::normalize_identifier,
};

/// Per-identifier brute force guard.
///
/// Every bookkeeping method is infallible and synchronous; expired locks are
/// discovered lazily when an identifier is next looked at, so no timer is
/// needed for correctness.
///
/// # Thread Safety
///
/// The guard can be shared across tasks behind an `Arc`. Each record update
/// goes through [`AttemptRepository::update`], which is atomic per
/// identifier.
pub struct LoginThrottleGuard<R: AttemptRepository> {
    repository: Arc<R>,
    config: ThrottleConfig,
    clock: Arc<dyn Clock>,
    timing: TimingProtection,
}

impl<R: AttemptRepository> LoginThrottleGuard<R> {
    /// Create a guard that reads the system clock.
    ///
    /// # Arguments
    ///
    /// * `repository` - The store holding attempt records
    /// * `config` - Thresholds and durations for CAPTCHA escalation and lockout
    pub fn new(repository: Arc<R>, config: ThrottleConfig) -> Self {
        Self::with_clock(repository, config, Arc::new(SystemClock))
    }

    /// Create a guard with an explicit time source.
    ///
    /// # Arguments
    ///
    /// * `repository` - The store holding attempt records
    /// * `config` - Thresholds and durations for CAPTCHA escalation and lockout
    /// * `clock` - The source of "now" for every lockout decision
    pub fn with_clock(repository: Arc<R>, config: ThrottleConfig, clock: Arc<dyn Clock>) -> Self {
        let timing = TimingProtection::new(config.timing_floor);
        Self {
            repository,
            config,
            clock,
            timing,
        }
    }

    /// Get the current configuration.
    pub fn config(&self) -> &ThrottleConfig {
        &self.config
    }

    /// Check if throttling is enabled.
    ///
    /// A disabled guard records nothing and never locks or asks for a
    /// CAPTCHA; timing protection still applies.
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// The underlying attempt store.
    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    /// The current time according to the guard's clock.
    ///
    /// Use this, not the system time, when interpreting the timestamps of a
    /// [`LockoutStatus`] returned by this guard.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Check if an identifier is currently locked out.
    ///
    /// A lock whose deadline has passed is cleared here, together with the
    /// failure count, before `false` is returned.
    ///
    /// # Arguments
    ///
    /// * `identifier` - The email to check; normalized before lookup
    ///
    /// # Returns
    ///
    /// `true` while `now < locked_until`, `false` otherwise, including for
    /// identifiers that were never seen.
    pub fn is_locked(&self, identifier: &str) -> bool {
        if !self.config.enabled {
            return false;
        }
        let now = self.clock.now();
        self.current(&normalize_identifier(identifier), now)
            .is_some_and(|record| record.is_locked_at(now))
    }

    /// Minutes until the lock on an identifier lifts.
    ///
    /// Meant for user-facing messages such as "try again in N minutes".
    ///
    /// # Arguments
    ///
    /// * `identifier` - The email to check; normalized before lookup
    ///
    /// # Returns
    ///
    /// `ceil((locked_until - now) / 1 minute)` while locked, `0` otherwise.
    pub fn lockout_time_remaining(&self, identifier: &str) -> u64 {
        if !self.config.enabled {
            return 0;
        }
        let now = self.clock.now();
        self.current(&normalize_identifier(identifier), now)
            .and_then(|record| record.locked_until.filter(|until| now < *until))
            .map_or(0, |until| minutes_until(now, until))
    }

    /// Check if the next sign-in for an identifier must carry a CAPTCHA token.
    ///
    /// # Arguments
    ///
    /// * `identifier` - The email to check; normalized before lookup
    ///
    /// # Returns
    ///
    /// `true` once `captcha_threshold` failures are on record and the
    /// identifier is not locked. Locked identifiers report `false`: the lock
    /// takes precedence.
    pub fn should_require_captcha(&self, identifier: &str) -> bool {
        if !self.config.enabled {
            return false;
        }
        let now = self.clock.now();
        self.current(&normalize_identifier(identifier), now)
            .is_some_and(|record| {
                !record.is_locked_at(now) && record.failure_count >= self.config.captcha_threshold
            })
    }

    /// Get the full throttle status for an identifier.
    ///
    /// Applies the same lazy expiry as [`is_locked`](Self::is_locked).
    ///
    /// # Arguments
    ///
    /// * `identifier` - The email to check; normalized before lookup
    ///
    /// # Returns
    ///
    /// A [`LockoutStatus`] snapshot taken at [`now`](Self::now).
    pub fn lockout_status(&self, identifier: &str) -> LockoutStatus {
        let identifier = normalize_identifier(identifier);
        if !self.config.enabled {
            return LockoutStatus::clean(&identifier);
        }
        let now = self.clock.now();
        match self.current(&identifier, now) {
            Some(record) => self.status_of(&record, now),
            None => LockoutStatus::clean(&identifier),
        }
    }

    /// The named escalation state of an identifier.
    ///
    /// Shorthand for `lockout_status(identifier).state()`.
    pub fn state(&self, identifier: &str) -> ThrottleState {
        self.lockout_status(identifier).state()
    }

    /// Record a failed sign-in.
    ///
    /// Never fails. The first failure of a streak stamps `first_failure_at`;
    /// reaching `lockout_threshold` locks the identifier until
    /// `now + lockout_duration`, saturating at the latest representable
    /// instant. Once locked, further failures bump the counter but leave
    /// `locked_until` alone, unless `extend_lockout_on_failure` is set, in
    /// which case the lock is pushed out to `now + lockout_duration` (never
    /// shortened).
    ///
    /// If protection is disabled, this is a no-op that returns a clean status.
    ///
    /// # Arguments
    ///
    /// * `identifier` - The email that was attempted (may or may not exist)
    ///
    /// # Returns
    ///
    /// The updated [`LockoutStatus`] after recording the attempt.
    pub fn record_login_attempt(&self, identifier: &str) -> LockoutStatus {
        let identifier = normalize_identifier(identifier);
        if !self.config.enabled {
            return LockoutStatus::clean(&identifier);
        }

        let now = self.clock.now();
        let config = &self.config;
        let mut newly_locked = false;

        let updated = self.repository.update(&identifier, |current| {
            let mut record = current
                .filter(|record| !is_stale(config, record, now))
                .unwrap_or_else(|| AttemptRecord {
                    identifier: identifier.clone(),
                    failure_count: 0,
                    first_failure_at: now,
                    locked_until: None,
                });

            if record.is_locked_at(now) {
                record.failure_count = record.failure_count.saturating_add(1);
                if config.extend_lockout_on_failure {
                    let rearmed = lock_deadline(now, config.lockout_duration);
                    if record.locked_until.is_none_or(|until| rearmed > until) {
                        record.locked_until = Some(rearmed);
                    }
                }
                return Some(record);
            }

            if record.failure_count == 0 {
                record.first_failure_at = now;
            }
            record.failure_count = record.failure_count.saturating_add(1);

            if record.failure_count >= config.lockout_threshold {
                record.locked_until = Some(lock_deadline(now, config.lockout_duration));
                newly_locked = true;
            }
            Some(record)
        });

        let status = match updated {
            Some(record) => self.status_of(&record, now),
            None => LockoutStatus::clean(&identifier),
        };

        if newly_locked {
            tracing::warn!(
                identifier = %identifier,
                failed_attempts = status.failed_attempts,
                locked_until = ?status.locked_until,
                "Too many failed sign-in attempts, locking identifier"
            );
        } else {
            tracing::debug!(
                identifier = %identifier,
                failed_attempts = status.failed_attempts,
                captcha_required = status.captcha_required,
                "Recorded failed sign-in attempt"
            );
        }

        status
    }

    /// Clear all failures for an identifier on successful sign-in.
    ///
    /// Deletes the record, which resets the counter and lifts any lock.
    ///
    /// # Arguments
    ///
    /// * `identifier` - The email that signed in; normalized before lookup
    pub fn reset_login_attempts(&self, identifier: &str) {
        let identifier = normalize_identifier(identifier);
        if self.repository.remove(&identifier).is_some() {
            tracing::debug!(identifier = %identifier, "Cleared failed sign-in attempts");
        }
    }

    /// Unlock an identifier (e.g., after a password reset).
    ///
    /// # Arguments
    ///
    /// * `identifier` - The email to unlock
    ///
    /// # Returns
    ///
    /// `true` if the identifier was locked, `false` otherwise.
    pub fn unlock(&self, identifier: &str) -> bool {
        let was_locked = self.is_locked(identifier);
        self.reset_login_attempts(identifier);
        if was_locked {
            tracing::info!(identifier = %normalize_identifier(identifier), "Identifier unlocked");
        }
        was_locked
    }

    /// Run `op` with its completion padded to the configured timing floor.
    ///
    /// # Arguments
    ///
    /// * `op` - The authentication call to wrap
    ///
    /// # Returns
    ///
    /// Whatever `op` produced, unchanged, no sooner than `timing_floor`
    /// after the call began. See [`TimingProtection::protect`].
    pub async fn with_timing_protection<F>(&self, op: F) -> F::Output
    where
        F: Future,
    {
        self.timing.protect(op).await
    }

    /// Drop every record that no longer affects any decision.
    ///
    /// Returns the number of records removed.
    pub fn purge_expired(&self) -> usize {
        purge(&*self.repository, &self.config, self.clock.now())
    }

    /// Start the background purge task.
    ///
    /// Correctness never depends on this task; it only bounds memory held by
    /// identifiers that failed once and never came back. Runs every
    /// `cleanup_interval`.
    ///
    /// # Arguments
    ///
    /// * `shutdown` - The task stops when this changes or its sender is dropped
    ///
    /// # Returns
    ///
    /// A `JoinHandle` for the spawned task.
    pub fn start_cleanup_task(
        &self,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let repository = Arc::clone(&self.repository);
        let config = self.config.clone();
        let clock = Arc::clone(&self.clock);

        tokio::spawn(async move {
            // `interval` panics on a zero period.
            let period = config
                .cleanup_interval
                .max(std::time::Duration::from_millis(1));
            let mut interval_timer = tokio::time::interval(period);

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        let count = purge(&*repository, &config, clock.now());
                        if count > 0 {
                            tracing::info!(
                                count = count,
                                "Purged stale sign-in attempt records"
                            );
                        }
                    }
                    _ = shutdown.changed() => {
                        tracing::info!("Shutting down sign-in attempt cleanup task");
                        break;
                    }
                }
            }
        })
    }

    /// The record for `identifier` after lazy expiry, if any is left.
    fn current(&self, identifier: &str, now: DateTime<Utc>) -> Option<AttemptRecord> {
        let record = self.repository.get(identifier)?;
        if !is_stale(&self.config, &record, now) {
            return Some(record);
        }

        // Re-check under the entry lock; a concurrent failure may have
        // started a new streak since the read above.
        let record = self.repository.update(identifier, |current| {
            current.filter(|record| !is_stale(&self.config, record, now))
        });
        if record.is_none() {
            tracing::debug!(identifier = %identifier, "Cleared expired sign-in lockout");
        }
        record
    }

    fn status_of(&self, record: &AttemptRecord, now: DateTime<Utc>) -> LockoutStatus {
        let is_locked = record.is_locked_at(now);
        LockoutStatus {
            identifier: record.identifier.clone(),
            failed_attempts: record.failure_count,
            is_locked,
            captcha_required: !is_locked
                && record.failure_count >= self.config.captcha_threshold,
            locked_until: record.locked_until.filter(|_| is_locked),
        }
    }
}

/// A record is stale once nothing it holds can influence a decision: its
/// lock has run out, its streak has aged past `attempt_window`, or it is
/// empty.
fn is_stale(config: &ThrottleConfig, record: &AttemptRecord, now: DateTime<Utc>) -> bool {
    if record.lock_expired_at(now) || record.is_collectible() {
        return true;
    }
    !record.is_locked_at(now)
        && config
            .attempt_window
            .is_some_and(|window| now - record.first_failure_at >= window)
}

/// `now + duration`, saturating at the latest representable instant so an
/// oversized lockout cannot overflow.
fn lock_deadline(now: DateTime<Utc>, duration: chrono::Duration) -> DateTime<Utc> {
    now.checked_add_signed(duration).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn purge<R: AttemptRepository>(repository: &R, config: &ThrottleConfig, now: DateTime<Utc>) -> usize {
    repository.retain(|record| !is_stale(config, record, now))
}
