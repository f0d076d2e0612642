//! Probe error types.

use std::fmt;

/// Errors that end a probe run.
#[derive(Debug)]
pub enum ProbeError {
    /// Configuration could not be loaded.
    Configuration {
        /// What was wrong.
        details: String,
    },
    /// The session could not be established.
    Session {
        /// Description of the failure.
        reason: String,
    },
    /// The pasted callback URL was not usable.
    InvalidCallback {
        /// Why it was rejected.
        reason: String,
    },
    /// Reading or writing the token cache failed.
    TokenCache {
        /// Description of the failure.
        reason: String,
    },
    /// An engine request failed.
    Engine,
    /// The requested action is not offered on the resource.
    ActionNotPermitted {
        /// The resource the action was requested on.
        resource: String,
        /// The action name.
        action: String,
    },
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeError::Configuration { details } => {
                write!(f, "Invalid configuration: {details}")
            }
            ProbeError::Session { reason } => write!(f, "Session error: {reason}"),
            ProbeError::InvalidCallback { reason } => {
                write!(f, "Invalid callback URL: {reason}")
            }
            ProbeError::TokenCache { reason } => write!(f, "Token cache error: {reason}"),
            ProbeError::Engine => write!(f, "Engine request failed"),
            ProbeError::ActionNotPermitted { resource, action } => {
                write!(f, "Action '{action}' is not permitted on {resource}")
            }
        }
    }
}

impl std::error::Error for ProbeError {}
