//! Capability error types.

use std::fmt;

/// Capability errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    /// The server did not list the action for this resource.
    ActionNotPermitted {
        /// The resource the action was attempted on.
        resource: String,
        /// The action that was requested.
        action: String,
    },
    /// An action name does not belong to the action type.
    UnknownAction {
        /// The action type.
        action_type: &'static str,
        /// The name that failed to parse.
        name: String,
    },
}

impl fmt::Display for CapabilityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ActionNotPermitted { resource, action } => {
                write!(f, "action '{action}' is not permitted on '{resource}'")
            }
            Self::UnknownAction { action_type, name } => {
                write!(f, "'{name}' is not a known {action_type} action")
            }
        }
    }
}

impl std::error::Error for CapabilityError {}
