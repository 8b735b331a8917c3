//! Password sign-in guarded by the login throttle.
//!
//! Lockout and CAPTCHA checks run before any network call, so a throttled
//! user gets an immediate answer. Only the provider call itself is wrapped
//! in timing protection.

use std::sync::Arc;

use crate::{
    Error,
    config::SignInConfig,
    error::AuthError,
    provider::{AuthenticatedUser, IdentityProvider},
    repositories::AttemptRepository,
    services::throttle::LoginThrottleGuard,
    storage::LockoutStatus,
    validation::{normalize_identifier, validate_email},
};

/// Orchestrates a password sign-in against an [`IdentityProvider`].
pub struct SignInService<P: IdentityProvider, R: AttemptRepository> {
    provider: Arc<P>,
    guard: Arc<LoginThrottleGuard<R>>,
    config: SignInConfig,
}

impl<P: IdentityProvider, R: AttemptRepository> SignInService<P, R> {
    /// Create a new SignInService.
    ///
    /// # Arguments
    ///
    /// * `provider` - The identity provider that checks passwords
    /// * `guard` - The throttle guard consulted before and after each call
    /// * `config` - Provider timeout settings
    pub fn new(provider: Arc<P>, guard: Arc<LoginThrottleGuard<R>>, config: SignInConfig) -> Self {
        Self {
            provider,
            guard,
            config,
        }
    }

    /// The throttle guard shared with this service.
    pub fn guard(&self) -> &Arc<LoginThrottleGuard<R>> {
        &self.guard
    }

    /// Get the current configuration.
    pub fn config(&self) -> &SignInConfig {
        &self.config
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] for an empty or malformed email.
    /// - [`AuthError::AccountLocked`] while the email is locked out, with the
    ///   remaining minutes and retry-after seconds.
    /// - [`AuthError::CaptchaRequired`] past the CAPTCHA threshold without a
    ///   (non-blank) token.
    /// - [`AuthError::ProviderTimeout`] when `provider_timeout` elapses.
    /// - [`Error::Provider`] with the provider's error, unchanged.
    ///
    /// Only credential failures ([`ProviderError::counts_as_failure`](crate::ProviderError::counts_as_failure))
    /// are recorded against the email; outages and timeouts are not.
    pub async fn sign_in(
        &self,
        email: &str,
        password: &str,
        captcha_token: Option<&str>,
    ) -> Result<AuthenticatedUser, Error> {
        validate_email(email)?;
        let identifier = normalize_identifier(email);

        if self.guard.is_locked(&identifier) {
            let minutes_remaining = self.guard.lockout_time_remaining(&identifier);
            let retry_after_seconds = self
                .guard
                .lockout_status(&identifier)
                .retry_after_seconds(self.guard.now())
                .unwrap_or(0);
            tracing::debug!(
                identifier = %identifier,
                minutes_remaining,
                retry_after_seconds,
                "Rejecting sign-in for locked identifier"
            );
            return Err(AuthError::AccountLocked {
                minutes_remaining,
                retry_after_seconds,
            }
            .into());
        }

        let captcha_token = captcha_token.map(str::trim).filter(|t| !t.is_empty());
        if captcha_token.is_none() && self.guard.should_require_captcha(&identifier) {
            tracing::debug!(identifier = %identifier, "Rejecting sign-in without CAPTCHA token");
            return Err(AuthError::CaptchaRequired.into());
        }

        let result = self
            .guard
            .with_timing_protection(self.call_provider(&identifier, password, captcha_token))
            .await;

        match result {
            Ok(user) => {
                self.guard.reset_login_attempts(&identifier);
                tracing::info!(
                    user_id = %user.id,
                    requires_password_change = user.requires_password_change,
                    "Sign-in succeeded"
                );
                Ok(user)
            }
            Err(Error::Provider(e)) if e.counts_as_failure() => {
                let status = self.guard.record_login_attempt(&identifier);
                tracing::info!(
                    identifier = %identifier,
                    failed_attempts = status.failed_attempts,
                    is_locked = status.is_locked,
                    "Sign-in rejected by identity provider"
                );
                Err(e.into())
            }
            Err(e) => {
                tracing::warn!(identifier = %identifier, error = %e, "Sign-in failed");
                Err(e)
            }
        }
    }

    /// Get the current throttle status for an email.
    ///
    /// # Arguments
    ///
    /// * `email` - The email address to check
    pub fn lockout_status(&self, email: &str) -> LockoutStatus {
        self.guard.lockout_status(email)
    }

    /// Clear all failures and any lock for an email.
    ///
    /// # Arguments
    ///
    /// * `email` - The email address to unlock
    ///
    /// # Returns
    ///
    /// `true` if the account was locked, `false` otherwise.
    pub fn unlock_account(&self, email: &str) -> bool {
        self.guard.unlock(email)
    }

    async fn call_provider(
        &self,
        identifier: &str,
        password: &str,
        captcha_token: Option<&str>,
    ) -> Result<AuthenticatedUser, Error> {
        let call = self
            .provider
            .sign_in_with_password(identifier, password, captcha_token);

        match self.config.provider_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| AuthError::ProviderTimeout)?
                .map_err(Error::from),
            None => call.await.map_err(Error::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::ThrottleConfig;
    use crate::error::{ProviderError, ValidationError};
    use crate::repositories::InMemoryAttemptRepository;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    const EMAIL: &str = "user@example.com";
    const PASSWORD: &str = "correct horse";

    #[derive(Debug, Clone, PartialEq)]
    struct Call {
        email: String,
        captcha_token: Option<String>,
    }

    /// Mock provider that accepts one password and records every call
    struct MockProvider {
        calls: Mutex<Vec<Call>>,
        outcome: Mutex<Option<ProviderError>>,
        delay: Duration,
    }

    impl MockProvider {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                outcome: Mutex::new(None),
                delay: Duration::from_millis(10),
            }
        }

        fn failing_with(error: ProviderError) -> Self {
            let provider = Self::new();
            *provider.outcome.lock().unwrap() = Some(error);
            provider
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl IdentityProvider for MockProvider {
        async fn sign_in_with_password(
            &self,
            email: &str,
            password: &str,
            captcha_token: Option<&str>,
        ) -> Result<AuthenticatedUser, ProviderError> {
            self.calls.lock().unwrap().push(Call {
                email: email.to_string(),
                captcha_token: captcha_token.map(str::to_string),
            });
            tokio::time::sleep(self.delay).await;

            if let Some(error) = self.outcome.lock().unwrap().clone() {
                return Err(error);
            }
            if password != PASSWORD {
                return Err(ProviderError::InvalidCredentials);
            }
            Ok(AuthenticatedUser {
                id: "usr_1".to_string(),
                email: email.to_string(),
                requires_password_change: false,
            })
        }
    }

    fn service_with(
        provider: MockProvider,
        config: SignInConfig,
    ) -> (
        SignInService<MockProvider, InMemoryAttemptRepository>,
        Arc<MockProvider>,
        ManualClock,
    ) {
        let clock = ManualClock::default();
        let guard = Arc::new(LoginThrottleGuard::with_clock(
            Arc::new(InMemoryAttemptRepository::new()),
            ThrottleConfig::default(),
            Arc::new(clock.clone()),
        ));
        let provider = Arc::new(provider);
        let service = SignInService::new(Arc::clone(&provider), guard, config);
        (service, provider, clock)
    }

    fn service() -> (
        SignInService<MockProvider, InMemoryAttemptRepository>,
        Arc<MockProvider>,
        ManualClock,
    ) {
        service_with(MockProvider::new(), SignInConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_sign_in_normalizes_email() {
        let (service, provider, _) = service();

        let user = service
            .sign_in("  User@Example.com ", PASSWORD, None)
            .await
            .unwrap();

        assert_eq!(user.email, EMAIL);
        assert_eq!(provider.calls.lock().unwrap()[0].email, EMAIL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_email_rejected_before_provider() {
        let (service, provider, _) = service();

        let err = service.sign_in("", PASSWORD, None).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::MissingField(_))
        ));

        let err = service.sign_in("marina", PASSWORD, None).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::InvalidEmail(_))
        ));

        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrong_password_is_counted_and_passed_through() {
        let (service, _, _) = service();

        let err = service.sign_in(EMAIL, "wrong", None).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Provider(ProviderError::InvalidCredentials)
        ));
        assert_eq!(service.lockout_status(EMAIL).failed_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_captcha_required_after_threshold() {
        let (service, provider, _) = service();

        for _ in 0..3 {
            let _ = service.sign_in(EMAIL, "wrong", None).await;
        }

        let err = service.sign_in(EMAIL, PASSWORD, None).await.unwrap_err();
        assert!(matches!(err, Error::Auth(AuthError::CaptchaRequired)));

        let err = service
            .sign_in(EMAIL, PASSWORD, Some("   "))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Auth(AuthError::CaptchaRequired)));
        assert_eq!(provider.call_count(), 3);

        let user = service
            .sign_in(EMAIL, PASSWORD, Some("hcaptcha-token"))
            .await
            .unwrap();
        assert_eq!(user.email, EMAIL);
        assert_eq!(
            provider.calls.lock().unwrap()[3].captcha_token.as_deref(),
            Some("hcaptcha-token")
        );
        assert_eq!(service.lockout_status(EMAIL).failed_attempts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_locked_account_rejected_without_network_call() {
        let (service, provider, clock) = service();

        for _ in 0..3 {
            let _ = service.sign_in(EMAIL, "wrong", None).await;
        }
        for _ in 0..2 {
            let _ = service.sign_in(EMAIL, "wrong", Some("token")).await;
        }
        assert_eq!(provider.call_count(), 5);

        let err = service
            .sign_in(EMAIL, PASSWORD, Some("token"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Auth(AuthError::AccountLocked {
                minutes_remaining: 1,
                retry_after_seconds: 30,
            })
        ));
        assert_eq!(provider.call_count(), 5);

        clock.advance(chrono::Duration::seconds(31));
        let user = service.sign_in(EMAIL, PASSWORD, None).await.unwrap();
        assert_eq!(user.id, "usr_1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_outage_is_not_counted() {
        let (service, _, _) = service_with(
            MockProvider::failing_with(ProviderError::Unavailable("503".to_string())),
            SignInConfig::default(),
        );

        for _ in 0..6 {
            let err = service.sign_in(EMAIL, PASSWORD, None).await.unwrap_err();
            assert!(matches!(
                err,
                Error::Provider(ProviderError::Unavailable(_))
            ));
        }
        assert_eq!(service.lockout_status(EMAIL).failed_attempts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_captcha_is_counted() {
        let (service, _, _) = service_with(
            MockProvider::failing_with(ProviderError::CaptchaRejected),
            SignInConfig::default(),
        );

        let _ = service.sign_in(EMAIL, PASSWORD, Some("stale")).await;
        assert_eq!(service.lockout_status(EMAIL).failed_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sign_in_takes_at_least_timing_floor() {
        let (service, _, _) = service();
        let floor = service.guard().config().timing_floor;

        let started = tokio::time::Instant::now();
        let _ = service.sign_in(EMAIL, "wrong", None).await;
        assert!(started.elapsed() >= floor);

        let started = tokio::time::Instant::now();
        service.sign_in(EMAIL, PASSWORD, None).await.unwrap();
        assert!(started.elapsed() >= floor);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_rejections_are_immediate() {
        let (service, _, _) = service();
        for _ in 0..3 {
            let _ = service.sign_in(EMAIL, "wrong", None).await;
        }

        let started = tokio::time::Instant::now();
        let err = service.sign_in(EMAIL, PASSWORD, None).await.unwrap_err();
        assert!(err.is_throttled());
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_timeout() {
        let mut provider = MockProvider::new();
        provider.delay = Duration::from_secs(30);
        let (service, _, _) = service_with(
            provider,
            SignInConfig {
                provider_timeout: Some(Duration::from_secs(5)),
            },
        );

        let err = service.sign_in(EMAIL, PASSWORD, None).await.unwrap_err();
        assert!(matches!(err, Error::Auth(AuthError::ProviderTimeout)));
        assert_eq!(service.lockout_status(EMAIL).failed_attempts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unlock_account() {
        let (service, _, _) = service();
        for _ in 0..3 {
            let _ = service.sign_in(EMAIL, "wrong", None).await;
        }
        for _ in 0..2 {
            let _ = service.sign_in(EMAIL, "wrong", Some("token")).await;
        }

        assert!(service.unlock_account(EMAIL));
        assert!(!service.lockout_status(EMAIL).is_locked);
        service.sign_in(EMAIL, PASSWORD, None).await.unwrap();
    }
}
