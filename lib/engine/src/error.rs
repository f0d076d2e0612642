//! Engine error types.

use std::fmt;
use tidal_bridge_core::AuthFailure;

/// Errors from calls to the protocol engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The session expired and could not be refreshed; the user has to log
    /// in again.
    AuthExpired,
    /// The engine rejected the request's credentials (401).
    Unauthorized,
    /// The engine refused the request despite valid credentials (403).
    Forbidden {
        /// The engine's explanation, if any.
        message: String,
    },
    /// The resource does not exist (404).
    NotFound {
        /// The requested path.
        path: String,
    },
    /// The engine could not be reached or failed (transport error or 5xx).
    NetworkError {
        /// Error details.
        details: String,
    },
    /// The engine rejected the request on business rules (400, 409, 422).
    ValidationRejected {
        /// The HTTP status code.
        status: u16,
        /// The engine's message, verbatim.
        message: String,
    },
    /// The engine answered with a status this client does not expect.
    UnexpectedStatus {
        /// The HTTP status code.
        status: u16,
    },
    /// The response body could not be decoded.
    InvalidResponse {
        /// Error details.
        details: String,
    },
    /// The engine configuration is unusable.
    InvalidConfiguration {
        /// Error details.
        details: String,
    },
}

impl EngineError {
    /// Returns true for transient failures a user may retry.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkError { .. })
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AuthExpired => write!(f, "session expired; log in again"),
            Self::Unauthorized => write!(f, "request was not authorized"),
            Self::Forbidden { message } if message.is_empty() => write!(f, "access forbidden"),
            Self::Forbidden { message } => write!(f, "access forbidden: {message}"),
            Self::NotFound { path } => write!(f, "resource not found: {path}"),
            Self::NetworkError { details } => write!(f, "engine unavailable: {details}"),
            Self::ValidationRejected { message, .. } => write!(f, "{message}"),
            Self::UnexpectedStatus { status } => {
                write!(f, "unexpected response status {status}")
            }
            Self::InvalidResponse { details } => write!(f, "invalid engine response: {details}"),
            Self::InvalidConfiguration { details } => {
                write!(f, "invalid engine configuration: {details}")
            }
        }
    }
}

impl std::error::Error for EngineError {}

impl AuthFailure for EngineError {
    fn is_auth_expired(&self) -> bool {
        matches!(self, Self::AuthExpired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_is_shown_verbatim() {
        let err = EngineError::ValidationRejected {
            status: 422,
            message: "Amount must be positive".to_string(),
        };
        assert_eq!(err.to_string(), "Amount must be positive");
    }

    #[test]
    fn only_auth_expired_asks_for_login() {
        assert!(EngineError::AuthExpired.is_auth_expired());
        assert!(!EngineError::Unauthorized.is_auth_expired());
        assert!(
            !EngineError::Forbidden {
                message: String::new()
            }
            .is_auth_expired()
        );
    }

    #[test]
    fn only_network_errors_are_retryable() {
        assert!(
            EngineError::NetworkError {
                details: "connection reset".to_string()
            }
            .is_retryable()
        );
        assert!(!EngineError::UnexpectedStatus { status: 302 }.is_retryable());
    }
}
