#![allow(dead_code)]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use brm_auth::{
    AuthenticatedUser, BrmAuth, BrmAuthBuilder, IdentityProvider, ManualClock, ProviderError,
    ThrottleConfig,
};

pub const EMAIL: &str = "user@example.com";
pub const PASSWORD: &str = "Marina#2024";
pub const TEMP_EMAIL: &str = "novo.colaborador@example.com";

/// In-memory stand-in for the hosted identity provider.
pub struct FakeProvider {
    accounts: Mutex<Vec<(String, String, bool)>>,
    calls: AtomicUsize,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            accounts: Mutex::new(vec![
                (EMAIL.to_string(), PASSWORD.to_string(), false),
                (TEMP_EMAIL.to_string(), "temporaria123".to_string(), true),
            ]),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
        _captcha_token: Option<&str>,
    ) -> Result<AuthenticatedUser, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let accounts = self.accounts.lock().unwrap().clone();
        // Unknown email and wrong password look the same to the caller.
        accounts
            .iter()
            .position(|(e, p, _)| e == email && p == password)
            .map(|i| AuthenticatedUser {
                id: format!("usr_{i}"),
                email: accounts[i].0.clone(),
                requires_password_change: accounts[i].2,
            })
            .ok_or(ProviderError::InvalidCredentials)
    }
}

pub fn setup(config: ThrottleConfig) -> (BrmAuth<FakeProvider>, Arc<FakeProvider>, ManualClock) {
    let _ = tracing_subscriber::fmt().try_init();

    let provider = Arc::new(FakeProvider::new());
    let clock = ManualClock::default();
    let auth = BrmAuthBuilder::new()
        .with_identity_provider(Arc::clone(&provider))
        .with_throttle_config(config)
        .with_clock(Arc::new(clock.clone()))
        .build()
        .unwrap();

    (auth, provider, clock)
}
