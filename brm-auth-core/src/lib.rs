//! Core functionality for BR Marinas admin sign-in
//!
//! This crate holds the brute force guard that sits in front of the hosted
//! identity provider: per-email failure tracking, CAPTCHA escalation,
//! temporary lockout and response-time padding.
//!
//! See [`LoginThrottleGuard`] for the guard itself, [`SignInService`] for the
//! sign-in flow built on it, and [`IdentityProvider`] for the provider seam.
//!
pub mod clock;
pub mod config;
pub mod error;
pub mod provider;
pub mod repositories;
pub mod services;
pub mod storage;
pub mod validation;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{SignInConfig, ThrottleConfig};
pub use error::{AuthError, ConfigError, Error, ProviderError, ValidationError};
pub use provider::{AuthenticatedUser, IdentityProvider};
pub use repositories::{AttemptRepository, InMemoryAttemptRepository};
pub use services::{LoginThrottleGuard, SignInService, TimingProtection};
pub use storage::{AttemptRecord, LockoutStatus, ThrottleState};
