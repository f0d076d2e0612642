//! OIDC (OpenID Connect) configuration.
//!
//! This module provides configuration types for connecting to the identity
//! provider that protects the engine.

use serde::{Deserialize, Serialize};

/// Configuration for the OIDC identity provider.
///
/// Frontends are public clients, so the client secret is optional.
/// Fields with defaults can be omitted when loading from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OidcConfig {
    /// The OIDC issuer URL (e.g., "https://auth.example.com/realms/acme").
    /// Used for OIDC discovery.
    issuer_url: String,
    /// The OAuth2 client ID registered with the provider.
    client_id: String,
    /// The OAuth2 client secret, for confidential clients only.
    #[serde(default)]
    client_secret: Option<String>,
    /// Where the provider sends the user back after login.
    redirect_uri: String,
    /// OAuth2 scopes to request as a comma-separated string.
    /// Default: "openid,profile,email,offline_access"
    #[serde(default = "default_scopes")]
    scopes: String,
    /// Where to send the user to end the provider session.
    #[serde(default)]
    logout_url: Option<String>,
}

fn default_scopes() -> String {
    "openid,profile,email,offline_access".to_string()
}

impl OidcConfig {
    /// Creates a public-client configuration with the default scopes.
    #[must_use]
    pub fn new(
        issuer_url: impl Into<String>,
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            issuer_url: issuer_url.into(),
            client_id: client_id.into(),
            client_secret: None,
            redirect_uri: redirect_uri.into(),
            scopes: default_scopes(),
            logout_url: None,
        }
    }

    /// Makes this a confidential client.
    #[must_use]
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Requests `scope` in addition to the configured ones.
    #[must_use]
    pub fn with_scope(mut self, scope: &str) -> Self {
        if !self.scopes().contains(&scope) {
            if !self.scopes.is_empty() {
                self.scopes.push(',');
            }
            self.scopes.push_str(scope);
        }
        self
    }

    /// Sets where logout sends the user.
    #[must_use]
    pub fn with_logout_url(mut self, url: impl Into<String>) -> Self {
        self.logout_url = Some(url.into());
        self
    }

    /// Returns the issuer URL.
    #[must_use]
    pub fn issuer_url(&self) -> &str {
        &self.issuer_url
    }

    /// Returns the client ID.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Returns the client secret of a confidential client.
    #[must_use]
    pub fn client_secret(&self) -> Option<&str> {
        self.client_secret.as_deref()
    }

    /// Returns the redirect URI.
    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Returns the scopes to request. Blank entries are ignored.
    #[must_use]
    pub fn scopes(&self) -> Vec<&str> {
        self.scopes
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Returns the logout URL, if configured.
    #[must_use]
    pub fn logout_url(&self) -> Option<&str> {
        self.logout_url.as_deref()
    }
}
