//! Identity claims carried by an access token.
//!
//! Claims are read from the token payload without verifying the signature.
//! The engine verifies every token it receives; the client only needs the
//! claims to label the session and to hint at party membership in the UI.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

use crate::error::AuthenticationError;

/// Mapping of claim name to the list of values the identity holds for it.
///
/// Scalar claims are stored as one-element lists so every claim can be
/// compared the same way.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityClaims(BTreeMap<String, Vec<String>>);

impl IdentityClaims {
    /// Creates an empty claim set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a claim with the given values.
    #[must_use]
    pub fn with_claim<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.0
            .insert(name.into(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Decodes the payload segment of a JWT.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` if the token is not a three-part JWT or the
    /// payload is not a JSON object.
    pub fn from_jwt(token: &str) -> Result<Self, AuthenticationError> {
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 {
            return Err(AuthenticationError::InvalidToken {
                reason: "not a JWT".to_string(),
            });
        }

        let payload_bytes =
            URL_SAFE_NO_PAD
                .decode(parts[1])
                .map_err(|e| AuthenticationError::InvalidToken {
                    reason: format!("payload is not base64url: {e}"),
                })?;

        let payload: JsonValue = serde_json::from_slice(&payload_bytes).map_err(|e| {
            AuthenticationError::InvalidToken {
                reason: format!("payload is not JSON: {e}"),
            }
        })?;

        Self::from_payload(&payload)
    }

    /// Builds claims from a decoded token payload.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` if the payload is not a JSON object.
    pub fn from_payload(payload: &JsonValue) -> Result<Self, AuthenticationError> {
        let object = payload
            .as_object()
            .ok_or_else(|| AuthenticationError::InvalidToken {
                reason: "payload is not an object".to_string(),
            })?;

        let claims = object
            .iter()
            .filter_map(|(name, value)| claim_values(value).map(|values| (name.clone(), values)))
            .collect();

        Ok(Self(claims))
    }

    /// Returns the values of a claim, or an empty slice if absent.
    #[must_use]
    pub fn get(&self, name: &str) -> &[String] {
        self.0.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// Returns the first value of a claim.
    #[must_use]
    pub fn first(&self, name: &str) -> Option<&str> {
        self.get(name).first().map(String::as_str)
    }

    /// Returns the `sub` claim.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.first("sub")
    }

    /// Returns the expiry recorded in the `exp` claim.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.first("exp")
            .and_then(|exp| exp.parse::<i64>().ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
    }

    /// Returns true if the claim holds the given value.
    #[must_use]
    pub fn contains(&self, name: &str, value: &str) -> bool {
        self.get(name).iter().any(|v| v == value)
    }

    /// Returns true if these claims are a superset of `required`.
    ///
    /// This is how the engine decides whether an identity fills a party.
    /// The client uses it for display hints only; permitted actions always
    /// come from the server.
    #[must_use]
    pub fn satisfies(&self, required: &BTreeMap<String, Vec<String>>) -> bool {
        required
            .iter()
            .all(|(name, values)| values.iter().all(|value| self.contains(name, value)))
    }

    /// Iterates over claim names and their values.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Returns the number of claims.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no claims.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn claim_values(value: &JsonValue) -> Option<Vec<String>> {
    match value {
        JsonValue::String(s) => Some(vec![s.clone()]),
        JsonValue::Number(n) => Some(vec![n.to_string()]),
        JsonValue::Bool(b) => Some(vec![b.to_string()]),
        JsonValue::Array(items) => Some(
            items
                .iter()
                .filter_map(|item| match item {
                    JsonValue::String(s) => Some(s.clone()),
                    JsonValue::Number(n) => Some(n.to_string()),
                    JsonValue::Bool(b) => Some(b.to_string()),
                    _ => None,
                })
                .collect(),
        ),
        JsonValue::Null | JsonValue::Object(_) => None,
    }
}
