//! Core types shared by the tidal-bridge crates.
//!
//! This crate provides the error handling foundation and the locally
//! generated identifiers used by the session, capability and engine crates.

pub mod error;
pub mod id;

pub use error::{AuthFailure, Result};
pub use id::{InterceptorId, ParseIdError, RequestId, SubscriptionId};
