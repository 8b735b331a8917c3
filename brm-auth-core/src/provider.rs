//! The hosted identity provider seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// The account returned by a successful password sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub id: String,
    pub email: String,
    /// The account was issued a temporary password and must set a new one
    /// before using the application.
    pub requires_password_change: bool,
}

/// Remote password authentication.
///
/// Implementations wrap the hosted auth SDK. They receive the normalized
/// email and forward the CAPTCHA token, if any, for the provider to verify.
#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
        captcha_token: Option<&str>,
    ) -> Result<AuthenticatedUser, ProviderError>;
}
