//! Local engine server and session wiring for unit tests.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tidal_bridge_session::{
    AuthenticationError, AuthorizedClient, CallbackData, Handshake, IdentityClaims,
    IdentityProvider, LoginInitiation, RefreshConfig, RefreshGate, RequestInterceptor, TokenGrant,
    TokenStore,
};

use crate::client::EngineClient;
use crate::config::EngineConfig;

/// Serves `router` on an ephemeral local port and returns its base URL.
pub(crate) async fn serve(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test server");
    let addr = listener.local_addr().expect("local address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("test server");
    });
    format!("http://{addr}")
}

/// Provider whose refreshes always fail.
struct NoRefreshProvider;

#[async_trait]
impl IdentityProvider for NoRefreshProvider {
    fn name(&self) -> &str {
        "test"
    }

    async fn silent_check(&self) -> Result<Handshake, AuthenticationError> {
        Ok(Handshake::Anonymous)
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<TokenGrant, AuthenticationError> {
        Err(AuthenticationError::RefreshRejected {
            reason: "test provider".to_string(),
        })
    }

    async fn login(&self) -> Result<LoginInitiation, AuthenticationError> {
        Err(AuthenticationError::NotAuthenticated)
    }

    async fn complete_login(
        &self,
        _callback: &CallbackData,
    ) -> Result<TokenGrant, AuthenticationError> {
        Err(AuthenticationError::StateMismatch)
    }

    fn logout_url(&self) -> Option<String> {
        None
    }
}

pub(crate) struct EngineHarness {
    pub(crate) store: TokenStore,
    pub(crate) interceptor: Arc<RequestInterceptor>,
    pub(crate) client: EngineClient,
}

impl EngineHarness {
    fn with_lifetime(base_url: String, token: &str, lifetime: Duration) -> Self {
        let store = TokenStore::new();
        let epoch = store.set_from_handshake(Handshake::Authenticated(
            TokenGrant::new(token, Utc::now() + lifetime)
                .with_refresh_token("refresh")
                .with_claims(IdentityClaims::new().with_claim("sub", ["alice"])),
        ));
        let gate = RefreshGate::new(
            store.clone(),
            Arc::new(NoRefreshProvider),
            RefreshConfig::default(),
        );
        let interceptor = Arc::new(RequestInterceptor::new(gate));
        interceptor.install(epoch);
        let http = AuthorizedClient::new(reqwest::Client::new(), interceptor.clone());
        let client = EngineClient::new(EngineConfig::new(base_url, "iou"), http)
            .expect("engine client");
        Self {
            store,
            interceptor,
            client,
        }
    }

    /// A session whose token is valid for an hour.
    pub(crate) fn authenticated(base_url: String, token: &str) -> Self {
        Self::with_lifetime(base_url, token, Duration::hours(1))
    }

    /// A session whose token has expired and cannot be refreshed.
    pub(crate) fn expired(base_url: String) -> Self {
        Self::with_lifetime(base_url, "expired-token", Duration::seconds(-1))
    }
}
