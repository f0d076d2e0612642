//! Capability gating for tidal-bridge.
//!
//! The engine attaches the actions the current user may take to every
//! resource it returns. This crate decides what to offer from that list
//! alone: an action is available exactly when the server listed it.
//! Nothing about parties, roles or states is re-evaluated on the client.

mod error;
mod resolver;
mod types;

pub use error::CapabilityError;
pub use resolver::CapabilityResolver;
pub use types::{Action, Affordance, Affordances, HasPermittedActions, PermittedActions};
