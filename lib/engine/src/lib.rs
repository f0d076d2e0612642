//! Client for the hosted protocol engine.
//!
//! This crate provides:
//! - Engine endpoint configuration and the resource path convention (`EngineConfig`, `ResourcePath`)
//! - The resource model (`ResourceInstance`, `PartyBinding`, `CreateRequest`)
//! - A resource client mapping HTTP outcomes to `EngineError` (`EngineClient`)
//! - Staleness-guarded views (`ResourceView`)
//! - Live updates over server-sent events (`LiveChannel`)
//!
//! All requests go through the session crate's `AuthorizedClient`, so the
//! bearer token is always the one the token store holds when the request
//! leaves.

mod client;
mod config;
mod error;
mod live;
mod model;
mod view;

#[cfg(test)]
mod testing;

pub use client::EngineClient;
pub use config::{EngineConfig, ResourcePath};
pub use error::EngineError;
pub use live::{LiveChannel, LiveConfig, LiveEvent, LiveEventKind, LiveFilter, LiveSubscription};
pub use model::{CreateRequest, PartyBinding, ResourceInstance, ResourcePage};
pub use view::{ResourceView, ViewSnapshot, ViewState, ViewTicket};
