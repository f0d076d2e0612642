//! Command-line probe for a protocol engine behind an OIDC provider.
//!
//! The probe restores or establishes a session, shows a resource as the
//! logged-in user sees it, optionally invokes an action the server offers,
//! and can follow live updates to the resource.

pub mod callback;
pub mod config;
pub mod error;
pub mod render;
pub mod token_cache;

use tidal_bridge_session::Navigator;

/// Navigator for terminals: prints where the user should go.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutNavigator;

impl Navigator for StdoutNavigator {
    fn redirect(&self, url: &str) {
        println!("Open this URL in a browser, then paste the address you are sent back to:");
        println!("{url}");
    }
}
