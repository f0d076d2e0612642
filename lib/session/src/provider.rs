//! Identity provider abstraction.
//!
//! The bootstrapper and refresh gate only talk to the identity provider
//! through [`IdentityProvider`], so they can be tested without a real OIDC
//! server. [`OidcProvider`](crate::oidc_provider::OidcProvider) is the
//! production implementation.

use async_trait::async_trait;

use crate::error::AuthenticationError;
use crate::session::{Handshake, TokenGrant};

/// Login initiation data for redirecting to the identity provider.
#[derive(Debug, Clone)]
pub struct LoginInitiation {
    /// The URL to send the user to for authentication.
    pub authorization_url: String,
    /// State parameter echoed back on the callback.
    pub state: String,
}

/// Data the identity provider hands back after interactive login.
#[derive(Debug, Clone)]
pub struct CallbackData {
    /// The authorization code from the provider.
    pub code: String,
    /// The state parameter (must match the one from login initiation).
    pub state: String,
}

/// Operations the session layer needs from an identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Returns a short provider name for logs.
    fn name(&self) -> &str;

    /// Passively checks for an existing session without user interaction.
    ///
    /// Returns `Handshake::Anonymous` when there is no session. Errors are
    /// reserved for network and configuration failures.
    async fn silent_check(&self) -> Result<Handshake, AuthenticationError>;

    /// Exchanges a refresh token for a new grant.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AuthenticationError>;

    /// Starts an interactive login.
    async fn login(&self) -> Result<LoginInitiation, AuthenticationError>;

    /// Completes an interactive login started by [`IdentityProvider::login`].
    async fn complete_login(
        &self,
        callback: &CallbackData,
    ) -> Result<TokenGrant, AuthenticationError>;

    /// Returns the URL that ends the provider session, if any.
    fn logout_url(&self) -> Option<String>;
}
