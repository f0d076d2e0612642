//! Session material held by the token store.
//!
//! A session is created by a successful identity provider handshake,
//! mutated by token refresh, and destroyed on logout or hard failure. Only
//! [`TokenStore`](crate::store::TokenStore) mutates it.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::claims::IdentityClaims;

/// Tokens returned by the identity provider for one grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    /// Bearer token for engine calls.
    pub access_token: String,
    /// Refresh token, if the provider issued one.
    pub refresh_token: Option<String>,
    /// When the access token stops being accepted.
    pub expires_at: DateTime<Utc>,
    /// Claims decoded from the token.
    pub claims: IdentityClaims,
}

impl TokenGrant {
    /// Creates a grant with no refresh token and no claims.
    #[must_use]
    pub fn new(access_token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at,
            claims: IdentityClaims::new(),
        }
    }

    /// Sets the refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Sets the claims.
    #[must_use]
    pub fn with_claims(mut self, claims: IdentityClaims) -> Self {
        self.claims = claims;
        self
    }
}

/// Outcome of the initial identity check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handshake {
    /// An existing session was found.
    Authenticated(TokenGrant),
    /// No session exists; the user is anonymous.
    Anonymous,
}

/// Current authentication state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    authenticated: bool,
    token: Option<String>,
    token_expiry: Option<DateTime<Utc>>,
    #[serde(skip)]
    refresh_token: Option<String>,
    claims: IdentityClaims,
    /// Bumped on every identity change so late refresh results can be detected.
    epoch: u64,
    /// Set when the provider reported an unrecoverable error.
    terminal_reason: Option<String>,
}

impl Session {
    /// Creates an anonymous session.
    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            authenticated: false,
            token: None,
            token_expiry: None,
            refresh_token: None,
            claims: IdentityClaims::new(),
            epoch: 0,
            terminal_reason: None,
        }
    }

    pub(crate) fn from_grant(grant: TokenGrant, epoch: u64) -> Self {
        Self {
            authenticated: true,
            token: Some(grant.access_token),
            token_expiry: Some(grant.expires_at),
            refresh_token: grant.refresh_token,
            claims: grant.claims,
            epoch,
            terminal_reason: None,
        }
    }

    pub(crate) fn cleared(epoch: u64) -> Self {
        Self {
            epoch,
            ..Self::anonymous()
        }
    }

    pub(crate) fn terminal(epoch: u64, reason: String) -> Self {
        Self {
            epoch,
            terminal_reason: Some(reason),
            ..Self::anonymous()
        }
    }

    /// Replaces the token material after a refresh.
    ///
    /// Claims are only replaced when the new grant carries some; a refresh
    /// response with an opaque token keeps the claims from login.
    pub(crate) fn refresh(&mut self, grant: TokenGrant) {
        self.token = Some(grant.access_token);
        self.token_expiry = Some(grant.expires_at);
        if grant.refresh_token.is_some() {
            self.refresh_token = grant.refresh_token;
        }
        if !grant.claims.is_empty() {
            self.claims = grant.claims;
        }
    }

    /// Returns true if the session is authenticated.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Returns the access token.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Returns when the access token expires.
    #[must_use]
    pub fn token_expiry(&self) -> Option<DateTime<Utc>> {
        self.token_expiry
    }

    /// Returns the refresh token.
    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    /// Returns the identity claims.
    #[must_use]
    pub fn claims(&self) -> &IdentityClaims {
        &self.claims
    }

    /// Returns the identity epoch.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Returns the reason for a terminal failure, if any.
    #[must_use]
    pub fn terminal_reason(&self) -> Option<&str> {
        self.terminal_reason.as_deref()
    }

    /// Returns the remaining token lifetime, if any.
    #[must_use]
    pub fn remaining_lifetime(&self) -> Option<Duration> {
        self.token_expiry.map(|expiry| expiry - Utc::now())
    }

    /// Returns true if the token has at least `margin` of lifetime left.
    #[must_use]
    pub fn is_fresh(&self, margin: Duration) -> bool {
        self.authenticated
            && self.token.is_some()
            && self
                .remaining_lifetime()
                .is_some_and(|remaining| remaining >= margin)
    }

    /// Returns true if the token has not expired yet.
    #[must_use]
    pub fn is_unexpired(&self) -> bool {
        self.authenticated
            && self.token.is_some()
            && self
                .remaining_lifetime()
                .is_some_and(|remaining| remaining > Duration::zero())
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::anonymous()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(lifetime: Duration) -> TokenGrant {
        TokenGrant::new("access", Utc::now() + lifetime)
            .with_refresh_token("refresh")
            .with_claims(IdentityClaims::new().with_claim("sub", ["alice"]))
    }

    #[test]
    fn anonymous_session_has_no_token() {
        let session = Session::anonymous();
        assert!(!session.is_authenticated());
        assert!(session.token().is_none());
        assert!(!session.is_fresh(Duration::zero()));
        assert!(!session.is_unexpired());
    }

    #[test]
    fn session_from_grant() {
        let session = Session::from_grant(grant(Duration::hours(1)), 3);
        assert!(session.is_authenticated());
        assert_eq!(session.token(), Some("access"));
        assert_eq!(session.refresh_token(), Some("refresh"));
        assert_eq!(session.claims().subject(), Some("alice"));
        assert_eq!(session.epoch(), 3);
    }

    #[test]
    fn freshness_respects_margin() {
        let session = Session::from_grant(grant(Duration::seconds(30)), 1);
        assert!(session.is_unexpired());
        assert!(session.is_fresh(Duration::seconds(10)));
        assert!(!session.is_fresh(Duration::seconds(70)));
    }

    #[test]
    fn expired_session_is_not_unexpired() {
        let session = Session::from_grant(grant(Duration::seconds(-1)), 1);
        assert!(session.is_authenticated());
        assert!(!session.is_unexpired());
    }

    #[test]
    fn refresh_keeps_claims_for_opaque_tokens() {
        let mut session = Session::from_grant(grant(Duration::seconds(5)), 1);
        session.refresh(TokenGrant::new("next", Utc::now() + Duration::hours(1)));

        assert_eq!(session.token(), Some("next"));
        assert_eq!(session.refresh_token(), Some("refresh"));
        assert_eq!(session.claims().subject(), Some("alice"));
    }

    #[test]
    fn refresh_token_is_not_serialized() {
        let session = Session::from_grant(grant(Duration::hours(1)), 1);
        let json = serde_json::to_string(&session).expect("serialize");
        assert!(!json.contains("refresh"));
    }
}
