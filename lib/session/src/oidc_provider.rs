//! OIDC identity provider built on the openidconnect crate.
//!
//! A native client has no hidden frame to run a passive session check in,
//! so the silent check is a refresh-token grant using a stored offline
//! token: no stored token or an `invalid_grant` answer means the user is
//! anonymous, while discovery and transport failures are errors.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use openidconnect::core::{
    CoreAuthenticationFlow, CoreClient, CoreErrorResponseType, CoreProviderMetadata,
    CoreTokenResponse,
};
use openidconnect::{
    AuthorizationCode, ClientId, ClientSecret, CsrfToken, IssuerUrl, Nonce, OAuth2TokenResponse,
    PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, RefreshToken, RequestTokenError, Scope,
    StandardErrorResponse, TokenResponse,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};
use tokio::sync::OnceCell;
use tracing::{debug, instrument, warn};

use crate::claims::IdentityClaims;
use crate::error::AuthenticationError;
use crate::oidc::OidcConfig;
use crate::provider::{CallbackData, IdentityProvider, LoginInitiation};
use crate::session::{Handshake, TokenGrant};

/// Lifetime assumed when the provider reports neither `expires_in` nor `exp`.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 300;

/// Logins started but not completed that are remembered at once.
const MAX_PENDING_LOGINS: usize = 8;

/// Secrets kept between starting a login and its callback.
#[derive(Debug)]
struct PendingLogin {
    started: u64,
    pkce_verifier: String,
    nonce: String,
}

/// Identity provider backed by an OIDC issuer.
///
/// Provider metadata is discovered lazily on first use so that discovery
/// failures surface through the session bootstrapper instead of at
/// construction time.
pub struct OidcProvider {
    config: OidcConfig,
    http_client: reqwest::Client,
    metadata: OnceCell<CoreProviderMetadata>,
    offline_token: RwLock<Option<String>>,
    pending_logins: Mutex<HashMap<String, PendingLogin>>,
    login_sequence: AtomicU64,
}

impl OidcProvider {
    /// Creates a provider for the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if the HTTP client cannot be built.
    pub fn new(config: OidcConfig) -> Result<Self, AuthenticationError> {
        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AuthenticationError::InvalidConfiguration {
                reason: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            config,
            http_client,
            metadata: OnceCell::new(),
            offline_token: RwLock::new(None),
            pending_logins: Mutex::new(HashMap::new()),
            login_sequence: AtomicU64::new(0),
        })
    }

    /// Seeds the provider with a previously stored offline token.
    #[must_use]
    pub fn with_offline_token(self, token: Option<String>) -> Self {
        *self
            .offline_token
            .write()
            .unwrap_or_else(PoisonError::into_inner) = token;
        self
    }

    /// Returns the most recent refresh token issued by the provider.
    ///
    /// Hosts persist this to restore the session on the next start.
    #[must_use]
    pub fn offline_token(&self) -> Option<String> {
        self.offline_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &OidcConfig {
        &self.config
    }

    fn remember_offline_token(&self, token: Option<&str>) {
        if let Some(token) = token {
            *self
                .offline_token
                .write()
                .unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
        }
    }

    fn forget_offline_token(&self) {
        *self
            .offline_token
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn pending_logins(&self) -> MutexGuard<'_, HashMap<String, PendingLogin>> {
        self.pending_logins
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores a started login, forgetting the oldest when too many are open.
    fn remember_login(&self, state: String, pkce_verifier: String, nonce: String) {
        let started = self.login_sequence.fetch_add(1, Ordering::Relaxed);
        let mut pending = self.pending_logins();
        while pending.len() >= MAX_PENDING_LOGINS {
            let Some(oldest) = pending
                .iter()
                .min_by_key(|(_, login)| login.started)
                .map(|(state, _)| state.clone())
            else {
                break;
            };
            debug!("forgetting abandoned login");
            pending.remove(&oldest);
        }
        pending.insert(
            state,
            PendingLogin {
                started,
                pkce_verifier,
                nonce,
            },
        );
    }

    fn provider_error(&self, reason: String) -> AuthenticationError {
        AuthenticationError::ProviderError {
            provider: self.config.issuer_url().to_string(),
            reason,
        }
    }

    async fn metadata(&self) -> Result<&CoreProviderMetadata, AuthenticationError> {
        self.metadata
            .get_or_try_init(|| async {
                let issuer_url = IssuerUrl::new(self.config.issuer_url().to_string()).map_err(
                    |e| AuthenticationError::InvalidConfiguration {
                        reason: format!("invalid issuer URL: {e}"),
                    },
                )?;

                debug!(issuer = %self.config.issuer_url(), "discovering identity provider");

                CoreProviderMetadata::discover_async(issuer_url, &self.http_client)
                    .await
                    .map_err(|e| self.provider_error(format!("discovery failed: {e}")))
            })
            .await
    }

    fn client_id(&self) -> ClientId {
        ClientId::new(self.config.client_id().to_string())
    }

    fn client_secret(&self) -> Option<ClientSecret> {
        self.config
            .client_secret()
            .map(|secret| ClientSecret::new(secret.to_string()))
    }

    fn redirect_url(&self) -> Result<RedirectUrl, AuthenticationError> {
        RedirectUrl::new(self.config.redirect_uri().to_string()).map_err(|e| {
            AuthenticationError::InvalidConfiguration {
                reason: format!("invalid redirect URI: {e}"),
            }
        })
    }

    fn token_error<RE>(
        &self,
        error: RequestTokenError<RE, StandardErrorResponse<CoreErrorResponseType>>,
    ) -> AuthenticationError
    where
        RE: std::error::Error + 'static,
    {
        match error {
            RequestTokenError::ServerResponse(response)
                if *response.error() == CoreErrorResponseType::InvalidGrant =>
            {
                AuthenticationError::RefreshRejected {
                    reason: response.to_string(),
                }
            }
            other => self.provider_error(format!("token request failed: {other}")),
        }
    }
}

impl std::fmt::Debug for OidcProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OidcProvider")
            .field("issuer_url", &self.config.issuer_url())
            .field("client_id", &self.config.client_id())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl IdentityProvider for OidcProvider {
    fn name(&self) -> &str {
        self.config.issuer_url()
    }

    #[instrument(skip(self))]
    async fn silent_check(&self) -> Result<Handshake, AuthenticationError> {
        let Some(token) = self.offline_token() else {
            debug!("no stored session");
            return Ok(Handshake::Anonymous);
        };

        match self.refresh(&token).await {
            Ok(grant) => Ok(Handshake::Authenticated(grant)),
            Err(AuthenticationError::RefreshRejected { reason }) => {
                debug!(reason = %reason, "stored session is no longer valid");
                self.forget_offline_token();
                Ok(Handshake::Anonymous)
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip_all)]
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AuthenticationError> {
        let metadata = self.metadata().await?;
        let client = CoreClient::from_provider_metadata(
            metadata.clone(),
            self.client_id(),
            self.client_secret(),
        )
        .set_redirect_uri(self.redirect_url()?);

        let refresh_token = RefreshToken::new(refresh_token.to_string());
        let response = client
            .exchange_refresh_token(&refresh_token)
            .map_err(|e| AuthenticationError::InvalidConfiguration {
                reason: format!("token endpoint: {e}"),
            })?
            .request_async(&self.http_client)
            .await
            .map_err(|e| self.token_error(e))?;

        let grant = grant_from_response(&response);
        self.remember_offline_token(grant.refresh_token.as_deref());
        debug!(expires_at = %grant.expires_at, "token refreshed");
        Ok(grant)
    }

    #[instrument(skip(self))]
    async fn login(&self) -> Result<LoginInitiation, AuthenticationError> {
        let metadata = self.metadata().await?;
        let client = CoreClient::from_provider_metadata(
            metadata.clone(),
            self.client_id(),
            self.client_secret(),
        )
        .set_redirect_uri(self.redirect_url()?);

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let mut auth_request = client
            .authorize_url(
                CoreAuthenticationFlow::AuthorizationCode,
                CsrfToken::new_random,
                Nonce::new_random,
            )
            .set_pkce_challenge(pkce_challenge);

        // openid is always requested by the flow itself
        for scope in self.config.scopes().into_iter().filter(|s| *s != "openid") {
            auth_request = auth_request.add_scope(Scope::new(scope.to_string()));
        }

        let (auth_url, csrf_token, nonce) = auth_request.url();

        self.remember_login(
            csrf_token.secret().clone(),
            pkce_verifier.secret().clone(),
            nonce.secret().clone(),
        );

        Ok(LoginInitiation {
            authorization_url: auth_url.to_string(),
            state: csrf_token.secret().clone(),
        })
    }

    #[instrument(skip_all)]
    async fn complete_login(
        &self,
        callback: &CallbackData,
    ) -> Result<TokenGrant, AuthenticationError> {
        let pending = self
            .pending_logins()
            .remove(&callback.state)
            .ok_or(AuthenticationError::StateMismatch)?;

        let metadata = self.metadata().await?;
        let client = CoreClient::from_provider_metadata(
            metadata.clone(),
            self.client_id(),
            self.client_secret(),
        )
        .set_redirect_uri(self.redirect_url()?);

        let response = client
            .exchange_code(AuthorizationCode::new(callback.code.clone()))
            .map_err(|e| AuthenticationError::InvalidConfiguration {
                reason: format!("token endpoint: {e}"),
            })?
            .set_pkce_verifier(PkceCodeVerifier::new(pending.pkce_verifier))
            .request_async(&self.http_client)
            .await
            .map_err(|e| self.token_error(e))?;

        if let Some(id_token) = response.id_token() {
            let nonce = Nonce::new(pending.nonce);
            id_token
                .claims(&client.id_token_verifier(), &nonce)
                .map_err(|e| AuthenticationError::InvalidToken {
                    reason: format!("ID token validation failed: {e}"),
                })?;
        }

        let grant = grant_from_response(&response);
        self.remember_offline_token(grant.refresh_token.as_deref());
        Ok(grant)
    }

    fn logout_url(&self) -> Option<String> {
        self.config.logout_url().map(str::to_string)
    }
}

/// Builds a grant from a token endpoint response.
///
/// Claims come from the access token when it is a JWT, otherwise from the
/// ID token. Expiry prefers `expires_in`, then the `exp` claim.
fn grant_from_response(response: &CoreTokenResponse) -> TokenGrant {
    let access_token = response.access_token().secret().clone();
    let refresh_token = response.refresh_token().map(|t| t.secret().clone());

    let claims = IdentityClaims::from_jwt(&access_token)
        .or_else(|_| id_token_claims(response))
        .unwrap_or_else(|e| {
            warn!(error = %e, "token response carries no readable claims");
            IdentityClaims::new()
        });

    let expires_at = response
        .expires_in()
        .and_then(|lifetime| Duration::from_std(lifetime).ok())
        .map(|lifetime| Utc::now() + lifetime)
        .or_else(|| claims.expires_at())
        .unwrap_or_else(|| Utc::now() + Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS));

    TokenGrant {
        access_token,
        refresh_token,
        expires_at,
        claims,
    }
}

/// Reads claims from the raw ID token in a token response.
fn id_token_claims(response: &CoreTokenResponse) -> Result<IdentityClaims, AuthenticationError> {
    let response_json =
        serde_json::to_value(response).map_err(|e| AuthenticationError::InvalidToken {
            reason: format!("failed to serialize token response: {e}"),
        })?;

    let id_token = response_json
        .get("id_token")
        .and_then(|v| v.as_str())
        .ok_or_else(|| AuthenticationError::InvalidToken {
            reason: "no id_token in response".to_string(),
        })?;

    IdentityClaims::from_jwt(id_token)
}
