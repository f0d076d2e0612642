//! Strongly-typed IDs for locally generated handles.
//!
//! Remote resource identifiers are opaque strings owned by the engine; the
//! IDs here are minted by the client itself. They are ULIDs so they sort by
//! creation time in logs, and display with a short prefix naming the kind
//! of handle (`icpt_01J...`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Error returned when a string is not a valid ID of the expected kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The ID type that was expected.
    pub id_type: &'static str,
    /// What was wrong with the input.
    pub reason: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: {}", self.id_type, self.reason)
    }
}

impl std::error::Error for ParseIdError {}

fn parse_prefixed(s: &str, prefix: &str, id_type: &'static str) -> Result<Ulid, ParseIdError> {
    let raw = match s.split_once('_') {
        Some((found, rest)) if found == prefix => rest,
        Some((found, _)) => {
            return Err(ParseIdError {
                id_type,
                reason: format!("expected prefix '{prefix}', found '{found}'"),
            });
        }
        None => s,
    };
    raw.parse().map_err(|e: ulid::DecodeError| ParseIdError {
        id_type,
        reason: e.to_string(),
    })
}

macro_rules! local_id {
    ($(#[$meta:meta])* $name:ident => $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Ulid);

        impl $name {
            /// Display prefix for this kind of ID.
            pub const PREFIX: &'static str = $prefix;

            /// Mints a new ID.
            #[must_use]
            pub fn new() -> Self {
                Self(Ulid::new())
            }

            /// Returns the underlying ULID.
            #[must_use]
            pub const fn as_ulid(&self) -> Ulid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", Self::PREFIX, self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            /// Accepts the display form or a bare ULID.
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                parse_prefixed(s, Self::PREFIX, stringify!($name)).map(Self)
            }
        }
    };
}

local_id! {
    /// Registration handle for an installed request interceptor.
    InterceptorId => "icpt"
}

local_id! {
    /// Identifier for a live-update subscription.
    SubscriptionId => "sub"
}

local_id! {
    /// Correlation identifier attached to outbound engine requests.
    RequestId => "req"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_display_with_their_prefix() {
        assert!(InterceptorId::new().to_string().starts_with("icpt_"));
        assert!(SubscriptionId::new().to_string().starts_with("sub_"));
        assert!(RequestId::new().to_string().starts_with("req_"));
    }

    #[test]
    fn display_form_parses_back() {
        let id = SubscriptionId::new();
        let parsed: SubscriptionId = id.to_string().parse().expect("should parse");
        assert_eq!(id, parsed);
    }

    #[test]
    fn bare_ulid_parses() {
        let ulid = Ulid::new();
        let id: InterceptorId = ulid.to_string().parse().expect("should parse");
        assert_eq!(id.as_ulid(), ulid);
    }

    #[test]
    fn other_kinds_prefix_is_rejected() {
        let request = RequestId::new().to_string();
        let err = request.parse::<InterceptorId>().unwrap_err();
        assert_eq!(err.id_type, "InterceptorId");
        assert!(err.reason.contains("'req'"));
    }

    #[test]
    fn malformed_ulid_is_rejected() {
        assert!("icpt_nope".parse::<InterceptorId>().is_err());
    }

    #[test]
    fn ids_order_by_creation() {
        let first = RequestId::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = RequestId::new();
        assert!(first < second);
    }

    #[test]
    fn serde_uses_the_bare_ulid() {
        let id = RequestId::new();
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, format!("\"{}\"", id.as_ulid()));
    }
}
