//! Engine resource model.
//!
//! Resource instances are replaced wholesale on every fetch and never
//! patched locally.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use tidal_bridge_capability::{HasPermittedActions, PermittedActions};
use tidal_bridge_session::IdentityClaims;

/// Claims that bind a party of a protocol instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyBinding {
    /// Claims a user must hold to act as the party.
    #[serde(default)]
    pub entity: BTreeMap<String, Vec<String>>,
    /// Claims that grant read access without acting as the party.
    #[serde(default)]
    pub access: BTreeMap<String, Vec<String>>,
}

impl PartyBinding {
    /// Creates a binding with no claims.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a required entity claim.
    #[must_use]
    pub fn with_entity<I, V>(mut self, claim: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.entity
            .insert(claim.into(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Adds an access claim.
    #[must_use]
    pub fn with_access<I, V>(mut self, claim: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.access
            .insert(claim.into(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Returns true if the claims are a superset of the entity claims.
    ///
    /// A hint for presentation only; the engine decides who may act.
    #[must_use]
    pub fn is_satisfied_by(&self, claims: &IdentityClaims) -> bool {
        claims.satisfies(&self.entity)
    }
}

/// A protocol instance as returned by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceInstance {
    /// Engine-assigned identifier.
    #[serde(rename = "@id")]
    pub id: String,
    /// Current protocol state, if the protocol has states.
    #[serde(rename = "@state", default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Actions the current user may take.
    #[serde(rename = "@actions", default)]
    pub actions: PermittedActions,
    /// Party bindings by party name.
    #[serde(rename = "@parties", default)]
    pub parties: BTreeMap<String, PartyBinding>,
    /// Business fields.
    #[serde(flatten)]
    pub fields: Map<String, JsonValue>,
}

impl ResourceInstance {
    /// Returns a business field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&JsonValue> {
        self.fields.get(name)
    }

    /// Returns the names of the parties whose entity claims `claims` satisfy.
    pub fn parties_of<'a>(&'a self, claims: &'a IdentityClaims) -> impl Iterator<Item = &'a str> {
        self.parties
            .iter()
            .filter(|(_, binding)| binding.is_satisfied_by(claims))
            .map(|(name, _)| name.as_str())
    }
}

impl HasPermittedActions for ResourceInstance {
    fn permitted_actions(&self) -> &PermittedActions {
        &self.actions
    }

    fn describe(&self) -> String {
        self.id.clone()
    }
}

/// One page of a resource listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourcePage {
    /// The instances on this page.
    pub items: Vec<ResourceInstance>,
    /// Page number, when the engine pages results.
    pub page: Option<u64>,
    /// Total number of instances, when reported.
    pub total_items: Option<u64>,
}

impl<'de> Deserialize<'de> for ResourcePage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Paged {
            items: Vec<ResourceInstance>,
            #[serde(default)]
            page: Option<u64>,
            #[serde(default)]
            total_items: Option<u64>,
        }

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Paged(Paged),
            Bare(Vec<ResourceInstance>),
        }

        Ok(match Wire::deserialize(deserializer)? {
            Wire::Paged(paged) => Self {
                items: paged.items,
                page: paged.page,
                total_items: paged.total_items,
            },
            Wire::Bare(items) => Self {
                items,
                page: None,
                total_items: None,
            },
        })
    }
}

/// Body of a create call: party bindings plus business fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CreateRequest {
    /// Party bindings by party name.
    #[serde(rename = "@parties")]
    pub parties: BTreeMap<String, PartyBinding>,
    /// Business fields.
    #[serde(flatten)]
    pub fields: Map<String, JsonValue>,
}

impl CreateRequest {
    /// Creates an empty request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a party.
    #[must_use]
    pub fn party(mut self, name: impl Into<String>, binding: PartyBinding) -> Self {
        self.parties.insert(name.into(), binding);
        self
    }

    /// Sets a business field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }
}
