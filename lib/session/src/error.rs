//! Error types for the session crate.
//!
//! Callers higher up wrap these in rootcause reports. The enum is
//! `Clone` because a single refresh outcome is fanned out to every caller
//! waiting on it.

use std::fmt;
use tidal_bridge_core::AuthFailure;

/// Errors from authentication and token operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationError {
    /// The token could not be refreshed and is no longer valid.
    AuthExpired,
    /// There is no authenticated session to work with.
    NotAuthenticated,
    /// The identity provider rejected a refresh token (e.g. `invalid_grant`).
    RefreshRejected { reason: String },
    /// A refresh attempt failed for a reason other than rejection.
    RefreshFailed { reason: String },
    /// A token could not be decoded.
    InvalidToken { reason: String },
    /// The identity provider could not be reached or answered unexpectedly.
    ProviderError { provider: String, reason: String },
    /// Identity provider configuration is invalid; not retried.
    InvalidConfiguration { reason: String },
    /// A login callback did not match any login this client started.
    StateMismatch,
}

impl AuthenticationError {
    /// Returns true for errors that mark the provider setup as unusable.
    #[must_use]
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, Self::InvalidConfiguration { .. })
    }
}

impl fmt::Display for AuthenticationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AuthExpired => {
                write!(f, "session has expired and could not be refreshed")
            }
            Self::NotAuthenticated => {
                write!(f, "no authenticated session")
            }
            Self::RefreshRejected { reason } => {
                write!(f, "refresh token rejected: {reason}")
            }
            Self::RefreshFailed { reason } => {
                write!(f, "token refresh failed: {reason}")
            }
            Self::InvalidToken { reason } => {
                write!(f, "invalid token: {reason}")
            }
            Self::ProviderError { provider, reason } => {
                write!(f, "identity provider '{provider}' error: {reason}")
            }
            Self::InvalidConfiguration { reason } => {
                write!(f, "invalid identity provider configuration: {reason}")
            }
            Self::StateMismatch => {
                write!(f, "login callback state does not match a pending login")
            }
        }
    }
}

impl std::error::Error for AuthenticationError {}

impl AuthFailure for AuthenticationError {
    fn is_auth_expired(&self) -> bool {
        matches!(self, Self::AuthExpired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_expired_display() {
        let err = AuthenticationError::AuthExpired;
        assert!(err.to_string().contains("expired"));
    }

    #[test]
    fn provider_error_display() {
        let err = AuthenticationError::ProviderError {
            provider: "keycloak".to_string(),
            reason: "connection timeout".to_string(),
        };
        assert!(err.to_string().contains("keycloak"));
        assert!(err.to_string().contains("connection timeout"));
    }

    #[test]
    fn only_auth_expired_is_auth_failure() {
        assert!(AuthenticationError::AuthExpired.is_auth_expired());
        assert!(!AuthenticationError::NotAuthenticated.is_auth_expired());
        assert!(
            !AuthenticationError::RefreshFailed {
                reason: "timeout".to_string()
            }
            .is_auth_expired()
        );
    }

    #[test]
    fn configuration_errors_are_unrecoverable() {
        let err = AuthenticationError::InvalidConfiguration {
            reason: "bad issuer".to_string(),
        };
        assert!(err.is_unrecoverable());
        assert!(!AuthenticationError::StateMismatch.is_unrecoverable());
    }
}
