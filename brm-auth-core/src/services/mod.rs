//! Service layer for the sign-in flow
//!
//! The throttle guard and timing protection are usable on their own; the
//! sign-in service wires them around an [`IdentityProvider`](crate::provider::IdentityProvider).

pub mod sign_in;
pub mod throttle;
pub mod timing;

pub use sign_in::SignInService;
pub use throttle::LoginThrottleGuard;
pub use timing::TimingProtection;
