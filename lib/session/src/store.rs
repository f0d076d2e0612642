//! Token store: the single owner of the current [`Session`].
//!
//! The store is a shared holder. Cloning it is cheap and every clone sees
//! the same session, so asynchronous callbacks read the session at call
//! time through the store instead of capturing a copy that can go stale
//! after a re-login.

use chrono::Duration;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::claims::IdentityClaims;
use crate::session::{Handshake, Session, TokenGrant};

/// Shared holder for the current session.
#[derive(Debug, Clone)]
pub struct TokenStore {
    inner: Arc<watch::Sender<Session>>,
}

impl TokenStore {
    /// Creates a store holding an anonymous session.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _receiver) = watch::channel(Session::anonymous());
        Self {
            inner: Arc::new(sender),
        }
    }

    /// Returns the current token without side effects.
    #[must_use]
    pub fn get_token(&self) -> Option<String> {
        let session = self.inner.borrow();
        if session.is_authenticated() {
            session.token().map(str::to_string)
        } else {
            None
        }
    }

    /// Returns true if the session is authenticated.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner.borrow().is_authenticated()
    }

    /// Returns the current identity claims.
    #[must_use]
    pub fn claims(&self) -> IdentityClaims {
        self.inner.borrow().claims().clone()
    }

    /// Returns the current identity epoch.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.inner.borrow().epoch()
    }

    /// Returns a copy of the current session for display or diagnostics.
    ///
    /// Components that act on the session should call the accessors at the
    /// time they need a value rather than keep this copy around.
    #[must_use]
    pub fn snapshot(&self) -> Session {
        self.inner.borrow().clone()
    }

    /// Returns a receiver that observes every session change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.inner.subscribe()
    }

    /// Returns the token if it has at least `margin` of lifetime left.
    #[must_use]
    pub fn fresh_token(&self, margin: Duration) -> Option<String> {
        let session = self.inner.borrow();
        if session.is_fresh(margin) {
            session.token().map(str::to_string)
        } else {
            None
        }
    }

    /// Returns the token if it has not expired yet.
    #[must_use]
    pub fn unexpired_token(&self) -> Option<String> {
        let session = self.inner.borrow();
        if session.is_unexpired() {
            session.token().map(str::to_string)
        } else {
            None
        }
    }

    /// Returns the epoch of the current session if it is authenticated.
    #[must_use]
    pub fn authenticated_epoch(&self) -> Option<u64> {
        let session = self.inner.borrow();
        session.is_authenticated().then(|| session.epoch())
    }

    /// Returns the refresh token if the session is still at `epoch`.
    #[must_use]
    pub fn refresh_token_for(&self, epoch: u64) -> Option<String> {
        let session = self.inner.borrow();
        if session.is_authenticated() && session.epoch() == epoch {
            session.refresh_token().map(str::to_string)
        } else {
            None
        }
    }

    /// Installs the result of the initial identity check.
    ///
    /// Returns the new identity epoch.
    pub fn set_from_handshake(&self, handshake: Handshake) -> u64 {
        let mut epoch = 0;
        self.inner.send_modify(|session| {
            epoch = session.epoch() + 1;
            *session = match handshake {
                Handshake::Authenticated(grant) => Session::from_grant(grant, epoch),
                Handshake::Anonymous => Session::cleared(epoch),
            };
        });
        debug!(
            epoch,
            authenticated = self.is_authenticated(),
            "session set from handshake"
        );
        epoch
    }

    /// Installs a refreshed grant if the session is still at `epoch`.
    ///
    /// Returns false and leaves the session untouched when the identity
    /// changed while the refresh was in flight.
    pub fn apply_refresh(&self, epoch: u64, grant: TokenGrant) -> bool {
        let applied = self.inner.send_if_modified(|session| {
            if session.is_authenticated() && session.epoch() == epoch {
                session.refresh(grant);
                true
            } else {
                false
            }
        });
        if applied {
            debug!(epoch, "refreshed token applied");
        } else {
            debug!(epoch, "discarding refresh for a replaced session");
        }
        applied
    }

    /// Destroys the session (logout or expired authentication).
    pub fn clear(&self) {
        self.inner.send_modify(|session| {
            *session = Session::cleared(session.epoch() + 1);
        });
        debug!("session cleared");
    }

    /// Moves the store into a terminal unauthenticated state.
    ///
    /// No retry is attempted here; the bootstrapper owns retry policy.
    pub fn fail_terminal(&self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(reason = %reason, "session failed terminally");
        self.inner.send_modify(|session| {
            *session = Session::terminal(session.epoch() + 1, reason);
        });
    }

    /// Returns true if the store is in a terminal failure state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.inner.borrow().terminal_reason().is_some()
    }
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new()
    }
}
