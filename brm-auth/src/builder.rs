//! Builder pattern for constructing BrmAuth instances
//!
//! The builder uses a type-state marker so that an identity provider must be
//! supplied before [`build`](BrmAuthBuilder::build) is available.
//!
//! # Example
//!
//! ```rust,ignore
//! use brm_auth::{BrmAuthBuilder, ThrottleConfig};
//!
//! let auth = BrmAuthBuilder::new()
//!     .with_identity_provider(Arc::new(provider))
//!     .with_throttle_config(ThrottleConfig::from_env()?)
//!     .with_provider_timeout(std::time::Duration::from_secs(10))
//!     .build()?;
//! ```

use std::sync::Arc;

use brm_auth_core::{
    AttemptRepository, Clock, ConfigError, IdentityProvider, InMemoryAttemptRepository,
    LoginThrottleGuard, SignInConfig, SignInService, SystemClock, ThrottleConfig,
};

use crate::BrmAuth;

/// Errors that can occur when building a BrmAuth instance.
#[derive(Debug, thiserror::Error)]
pub enum BrmAuthBuilderError {
    /// Invalid configuration provided
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(#[from] ConfigError),
}

/// Marker type indicating no identity provider has been configured yet.
pub struct NoProvider;

/// Marker type indicating an identity provider has been configured.
pub struct WithProvider<P: IdentityProvider> {
    provider: Arc<P>,
}

/// A type-safe builder for constructing [`BrmAuth`] instances.
///
/// # Defaults
///
/// - Throttling: CAPTCHA after 3 failures, 30 second lockout after 5
/// - Timing floor: 1 second
/// - Provider timeout: none
/// - Clock: system clock
pub struct BrmAuthBuilder<Provider> {
    provider: Provider,
    throttle_config: ThrottleConfig,
    sign_in_config: SignInConfig,
    clock: Arc<dyn Clock>,
}

impl Default for BrmAuthBuilder<NoProvider> {
    fn default() -> Self {
        Self::new()
    }
}

impl BrmAuthBuilder<NoProvider> {
    pub fn new() -> Self {
        Self {
            provider: NoProvider,
            throttle_config: ThrottleConfig::default(),
            sign_in_config: SignInConfig::default(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Set the identity provider that performs the actual password check.
    pub fn with_identity_provider<P: IdentityProvider>(
        self,
        provider: Arc<P>,
    ) -> BrmAuthBuilder<WithProvider<P>> {
        BrmAuthBuilder {
            provider: WithProvider { provider },
            throttle_config: self.throttle_config,
            sign_in_config: self.sign_in_config,
            clock: self.clock,
        }
    }
}

impl<Provider> BrmAuthBuilder<Provider> {
    /// Configure brute force protection settings.
    ///
    /// The configuration is validated by `build`.
    pub fn with_throttle_config(mut self, config: ThrottleConfig) -> Self {
        self.throttle_config = config;
        self
    }

    pub fn with_sign_in_config(mut self, config: SignInConfig) -> Self {
        self.sign_in_config = config;
        self
    }

    /// Bound every identity provider call by `timeout`.
    pub fn with_provider_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.sign_in_config.provider_timeout = Some(timeout);
        self
    }

    /// Replace the time source, e.g. with a [`ManualClock`](brm_auth_core::ManualClock)
    /// in tests.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl<P: IdentityProvider> BrmAuthBuilder<WithProvider<P>> {
    /// Build with the default in-memory attempt store.
    pub fn build(self) -> Result<BrmAuth<P>, BrmAuthBuilderError> {
        self.build_with_repository(Arc::new(InMemoryAttemptRepository::new()))
    }

    /// Build with a caller-supplied attempt store.
    pub fn build_with_repository<R: AttemptRepository>(
        self,
        repository: Arc<R>,
    ) -> Result<BrmAuth<P, R>, BrmAuthBuilderError> {
        self.throttle_config.validate()?;

        let guard = Arc::new(LoginThrottleGuard::with_clock(
            repository,
            self.throttle_config,
            self.clock,
        ));
        let sign_in = SignInService::new(self.provider.provider, guard, self.sign_in_config);

        tracing::debug!(
            enabled = sign_in.guard().is_enabled(),
            captcha_threshold = sign_in.guard().config().captcha_threshold,
            lockout_threshold = sign_in.guard().config().lockout_threshold,
            "Built sign-in guard"
        );

        Ok(BrmAuth { sign_in })
    }
}
