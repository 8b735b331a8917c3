use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Identity provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Rejections raised by the sign-in flow before (or instead of) reaching the
/// identity provider.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Account temporarily locked, try again in {minutes_remaining} minute(s)")]
    AccountLocked {
        minutes_remaining: u64,
        retry_after_seconds: u64,
    },

    #[error("CAPTCHA verification required")]
    CaptchaRequired,

    #[error("Identity provider did not respond in time")]
    ProviderTimeout,
}

/// Errors reported by the remote identity provider.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("CAPTCHA token rejected")]
    CaptchaRejected,

    #[error("Email not confirmed")]
    EmailNotConfirmed,

    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Other(String),
}

impl ProviderError {
    /// Whether this failure was a credential check the attacker controls, and
    /// therefore counts towards CAPTCHA escalation and lockout.
    pub fn counts_as_failure(&self) -> bool {
        matches!(
            self,
            ProviderError::InvalidCredentials | ProviderError::CaptchaRejected
        )
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid email format: {0}")]
    InvalidEmail(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),

    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

impl Error {
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Error::Auth(_))
    }

    pub fn is_provider_error(&self) -> bool {
        matches!(self, Error::Provider(_))
    }

    pub fn is_validation_error(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::Config(_))
    }

    /// True for the two rejections that are decided locally, without a
    /// network round-trip.
    pub fn is_throttled(&self) -> bool {
        matches!(
            self,
            Error::Auth(AuthError::AccountLocked { .. }) | Error::Auth(AuthError::CaptchaRequired)
        )
    }
}
