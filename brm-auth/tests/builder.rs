mod common;

use std::sync::Arc;

use brm_auth::{
    AttemptRepository, BrmAuthBuilder, BrmAuthBuilderError, InMemoryAttemptRepository,
    ThrottleConfig,
};
use common::{EMAIL, FakeProvider};

#[test]
fn test_build_with_defaults() {
    let auth = BrmAuthBuilder::new()
        .with_identity_provider(Arc::new(FakeProvider::new()))
        .build()
        .unwrap();

    let config = auth.guard().config();
    assert!(config.enabled);
    assert_eq!(config.captcha_threshold, 3);
    assert_eq!(config.lockout_threshold, 5);
}

#[test]
fn test_build_rejects_invalid_thresholds() {
    let result = BrmAuthBuilder::new()
        .with_throttle_config(ThrottleConfig {
            captcha_threshold: 5,
            lockout_threshold: 3,
            ..ThrottleConfig::default()
        })
        .with_identity_provider(Arc::new(FakeProvider::new()))
        .build();

    let err = result.err().unwrap();
    assert!(matches!(err, BrmAuthBuilderError::InvalidConfiguration(_)));
    assert!(err.to_string().starts_with("Invalid configuration: Invalid threshold"));
}

#[test]
fn test_build_with_shared_repository() {
    let repository = Arc::new(InMemoryAttemptRepository::new());
    let auth = BrmAuthBuilder::new()
        .with_identity_provider(Arc::new(FakeProvider::new()))
        .build_with_repository(Arc::clone(&repository))
        .unwrap();

    auth.guard().record_login_attempt(EMAIL);
    assert_eq!(repository.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_provider_timeout_is_applied() {
    let auth = BrmAuthBuilder::new()
        .with_identity_provider(Arc::new(FakeProvider::new()))
        .with_provider_timeout(std::time::Duration::from_millis(5))
        .build()
        .unwrap();

    let err = auth.sign_in(EMAIL, "irrelevant", None).await.unwrap_err();
    assert!(matches!(
        err,
        brm_auth::Error::Auth(brm_auth::AuthError::ProviderTimeout)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_disabled_throttle_never_locks() {
    let auth = BrmAuthBuilder::new()
        .with_identity_provider(Arc::new(FakeProvider::new()))
        .with_throttle_config(ThrottleConfig::disabled())
        .build()
        .unwrap();

    for _ in 0..10 {
        let err = auth.sign_in(EMAIL, "wrong", None).await.unwrap_err();
        assert!(!err.is_throttled());
    }
    assert!(!auth.is_locked(EMAIL));
}
