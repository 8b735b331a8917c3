//! # BrmAuth
//!
//! Sign-in for the BR Marinas IT asset administration app. Passwords are
//! checked by a hosted identity provider; this crate puts a brute force guard
//! in front of it:
//! - CAPTCHA escalation after repeated failures
//! - Temporary per-email lockout
//! - Response-time padding so failures do not reveal whether an email exists
//!
//! ## Warning
//!
//! Attempt records are held in process memory. The guard gives fast feedback
//! and trims obvious abuse, but a restarted or different client starts from
//! scratch; the identity provider's own limits remain authoritative.
//!
//! ## Example
//!
//! ```rust,ignore
//! use brm_auth::BrmAuthBuilder;
//!
//! let auth = BrmAuthBuilder::new()
//!     .with_identity_provider(Arc::new(provider))
//!     .build()?;
//!
//! match auth.sign_in("user@example.com", "password", None).await {
//!     Ok(user) if user.requires_password_change => { /* force a password change */ }
//!     Ok(user) => { /* signed in */ }
//!     Err(e) if e.is_throttled() => { /* show lockout or CAPTCHA prompt */ }
//!     Err(e) => { /* show provider error */ }
//! }
//! ```
use std::sync::Arc;

use brm_auth_core::SignInService;

pub mod builder;

pub use builder::{BrmAuthBuilder, BrmAuthBuilderError, NoProvider, WithProvider};

/// Re-export core types from brm_auth_core
///
/// These types are commonly used when working with the BrmAuth API.
pub use brm_auth_core::{
    AttemptRepository, AuthError, AuthenticatedUser, Clock, Error, IdentityProvider,
    InMemoryAttemptRepository, LockoutStatus, LoginThrottleGuard, ManualClock, ProviderError,
    SignInConfig, SystemClock, ThrottleConfig, ThrottleState, ValidationError,
};

/// Sign-in entry point for the application.
///
/// Construct through [`BrmAuthBuilder`].
pub struct BrmAuth<P: IdentityProvider, R: AttemptRepository = InMemoryAttemptRepository> {
    sign_in: SignInService<P, R>,
}

impl<P: IdentityProvider, R: AttemptRepository> BrmAuth<P, R> {
    /// Sign a user in with email and password.
    ///
    /// Pass the CAPTCHA widget's token once [`requires_captcha`](Self::requires_captcha)
    /// reports true.
    pub async fn sign_in(
        &self,
        email: &str,
        password: &str,
        captcha_token: Option<&str>,
    ) -> Result<AuthenticatedUser, Error> {
        self.sign_in.sign_in(email, password, captcha_token).await
    }

    /// Whether the login form should render the CAPTCHA widget for `email`.
    pub fn requires_captcha(&self, email: &str) -> bool {
        self.guard().should_require_captcha(email)
    }

    pub fn is_locked(&self, email: &str) -> bool {
        self.guard().is_locked(email)
    }

    pub fn lockout_status(&self, email: &str) -> LockoutStatus {
        self.sign_in.lockout_status(email)
    }

    /// Clear failures and any lock for `email`, e.g. after a password reset.
    ///
    /// Returns whether the account was locked.
    pub fn unlock_account(&self, email: &str) -> bool {
        self.sign_in.unlock_account(email)
    }

    /// Start periodic purging of stale attempt records.
    ///
    /// Send `true` on the paired watch sender (or drop it) to stop the task.
    pub fn start_cleanup_task(
        &self,
        shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        self.guard().start_cleanup_task(shutdown)
    }

    pub fn guard(&self) -> &Arc<LoginThrottleGuard<R>> {
        self.sign_in.guard()
    }
}
