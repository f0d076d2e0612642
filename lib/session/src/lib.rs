//! Session and request authorization for tidal-bridge clients.
//!
//! This crate provides:
//! - The token store that owns the current [`Session`] (`TokenStore`)
//! - Single-flight token refresh ahead of expiry (`RefreshGate`)
//! - Bearer injection for outbound requests (`RequestInterceptor`, `AuthorizedClient`)
//! - Start-up identity check and login redirects (`SessionBootstrapper`)
//! - An OIDC identity provider (`OidcProvider`)
//!
//! # Session model
//!
//! The store is the only writer of the session. Every identity change bumps
//! the session epoch, and work started for one epoch (a refresh, an
//! interceptor registration) never affects a later one.
//!
//! # Example
//!
//! ```
//! use chrono::{Duration, Utc};
//! use tidal_bridge_session::{Handshake, IdentityClaims, TokenGrant, TokenStore};
//!
//! let store = TokenStore::new();
//! let reader = store.clone();
//!
//! let grant = TokenGrant::new("access-token", Utc::now() + Duration::minutes(5))
//!     .with_claims(IdentityClaims::new().with_claim("sub", ["alice"]));
//! store.set_from_handshake(Handshake::Authenticated(grant));
//!
//! assert!(reader.is_authenticated());
//! assert_eq!(reader.claims().subject(), Some("alice"));
//! assert!(reader.fresh_token(Duration::seconds(70)).is_some());
//! ```

pub mod bootstrap;
pub mod claims;
pub mod error;
pub mod interceptor;
pub mod oidc;
pub mod oidc_provider;
pub mod provider;
pub mod refresh;
pub mod session;
pub mod store;

#[cfg(test)]
mod testing;

// Re-export main types at crate root
pub use bootstrap::{BootState, Navigator, RouteAccess, SessionBootstrapper};
pub use claims::IdentityClaims;
pub use error::AuthenticationError;
pub use interceptor::{AuthorizedClient, Intercepted, RequestInterceptor};
pub use oidc::OidcConfig;
pub use oidc_provider::OidcProvider;
pub use provider::{CallbackData, IdentityProvider, LoginInitiation};
pub use refresh::{RefreshConfig, RefreshGate, RefreshSchedule};
pub use session::{Handshake, Session, TokenGrant};
pub use store::TokenStore;
