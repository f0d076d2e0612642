//! In-memory identity provider for unit tests.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::claims::IdentityClaims;
use crate::error::AuthenticationError;
use crate::provider::{CallbackData, IdentityProvider, LoginInitiation};
use crate::session::{Handshake, TokenGrant};

pub(crate) const LOGIN_STATE: &str = "state-1";
pub(crate) const LOGIN_URL: &str = "https://idp.test/auth?state=state-1";
pub(crate) const LOGOUT_URL: &str = "https://idp.test/logout";

pub(crate) fn grant(token: &str, lifetime: Duration, subject: &str) -> TokenGrant {
    TokenGrant::new(token, Utc::now() + lifetime)
        .with_refresh_token(format!("{token}-refresh"))
        .with_claims(IdentityClaims::new().with_claim("sub", [subject]))
}

pub(crate) struct FakeProvider {
    silent: Mutex<Result<Handshake, AuthenticationError>>,
    refreshed: Mutex<Result<TokenGrant, AuthenticationError>>,
    login_grant: Mutex<Result<TokenGrant, AuthenticationError>>,
    login_error: Mutex<Option<AuthenticationError>>,
    delay: std::time::Duration,
    pub(crate) silent_calls: AtomicUsize,
    pub(crate) refresh_calls: AtomicUsize,
}

impl FakeProvider {
    pub(crate) fn new() -> Self {
        Self {
            silent: Mutex::new(Ok(Handshake::Anonymous)),
            refreshed: Mutex::new(Err(AuthenticationError::RefreshRejected {
                reason: "no refresh configured".to_string(),
            })),
            login_grant: Mutex::new(Err(AuthenticationError::NotAuthenticated)),
            login_error: Mutex::new(None),
            delay: std::time::Duration::ZERO,
            silent_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_silent(self, result: Result<Handshake, AuthenticationError>) -> Self {
        self.set_silent(result);
        self
    }

    /// Changes what later identity checks return.
    pub(crate) fn set_silent(&self, result: Result<Handshake, AuthenticationError>) {
        *self.silent.lock().unwrap() = result;
    }

    /// Makes starting a login fail with `error` until cleared.
    pub(crate) fn fail_login(&self, error: Option<AuthenticationError>) {
        *self.login_error.lock().unwrap() = error;
    }

    pub(crate) fn with_refresh(self, result: Result<TokenGrant, AuthenticationError>) -> Self {
        *self.refreshed.lock().unwrap() = result;
        self
    }

    pub(crate) fn with_login(self, grant: TokenGrant) -> Self {
        *self.login_grant.lock().unwrap() = Ok(grant);
        self
    }

    pub(crate) fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn silent_calls(&self) -> usize {
        self.silent_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    async fn silent_check(&self) -> Result<Handshake, AuthenticationError> {
        self.silent_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.silent.lock().unwrap().clone()
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<TokenGrant, AuthenticationError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.refreshed.lock().unwrap().clone()
    }

    async fn login(&self) -> Result<LoginInitiation, AuthenticationError> {
        if let Some(error) = self.login_error.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(LoginInitiation {
            authorization_url: LOGIN_URL.to_string(),
            state: LOGIN_STATE.to_string(),
        })
    }

    async fn complete_login(
        &self,
        callback: &CallbackData,
    ) -> Result<TokenGrant, AuthenticationError> {
        if callback.state != LOGIN_STATE {
            return Err(AuthenticationError::StateMismatch);
        }
        self.login_grant.lock().unwrap().clone()
    }

    fn logout_url(&self) -> Option<String> {
        Some(LOGOUT_URL.to_string())
    }
}
