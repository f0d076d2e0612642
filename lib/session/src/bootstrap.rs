//! Session bootstrapper: start-up identity check and login redirects.
//!
//! The bootstrapper is the only place that sends the user to the identity
//! provider. Every other component reports `AuthExpired` upwards and
//! [`SessionBootstrapper::handle_auth_failure`] decides whether a redirect
//! is due, so a page that needs authentication cannot loop between the
//! application and the login screen.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tidal_bridge_core::{AuthFailure, InterceptorId};
use tokio::sync::{Mutex as AsyncMutex, watch};
use tracing::{debug, info, instrument, warn};

use crate::error::AuthenticationError;
use crate::interceptor::RequestInterceptor;
use crate::provider::{CallbackData, IdentityProvider};
use crate::refresh::{RefreshGate, RefreshSchedule};
use crate::session::Handshake;
use crate::store::TokenStore;

/// Whether the route the application starts on needs a logged-in user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAccess {
    /// Anonymous users may see the route.
    Public,
    /// Anonymous users are sent to login.
    RequiresAuth,
}

/// Bootstrap state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootState {
    /// The identity check has not completed.
    Init,
    /// A session is established.
    Authenticated,
    /// The identity provider reports no session.
    Anonymous,
    /// The identity check itself failed. No redirect is issued.
    Failed {
        /// Human-readable failure description.
        reason: String,
    },
}

/// Performs navigation on behalf of the bootstrapper.
///
/// Browser hosts change the location; native hosts open or print the URL.
pub trait Navigator: Send + Sync {
    /// Sends the user to `url`.
    fn redirect(&self, url: &str);
}

/// Refresh task and interceptor registration for the current identity.
struct ActiveSession {
    registration: InterceptorId,
    _schedule: RefreshSchedule,
}

/// Drives the session from start-up to authenticated or anonymous.
pub struct SessionBootstrapper {
    provider: Arc<dyn IdentityProvider>,
    gate: RefreshGate,
    interceptor: Arc<RequestInterceptor>,
    navigator: Arc<dyn Navigator>,
    /// Set once the identity check reaches an answer that retrying cannot change.
    handshake: AsyncMutex<bool>,
    handshake_attempts: AtomicU64,
    state: watch::Sender<BootState>,
    redirect_issued: AtomicBool,
    active: Mutex<Option<ActiveSession>>,
}

impl SessionBootstrapper {
    /// Creates a bootstrapper in the `Init` state.
    ///
    /// The provider, gate and interceptor must all refer to the same
    /// token store.
    #[must_use]
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        interceptor: Arc<RequestInterceptor>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let (state, _receiver) = watch::channel(BootState::Init);
        Self {
            provider,
            gate: interceptor.gate().clone(),
            interceptor,
            navigator,
            handshake: AsyncMutex::new(false),
            handshake_attempts: AtomicU64::new(0),
            state,
            redirect_issued: AtomicBool::new(false),
            active: Mutex::new(None),
        }
    }

    /// Returns the token store.
    #[must_use]
    pub fn store(&self) -> &TokenStore {
        self.gate.store()
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> BootState {
        self.state.borrow().clone()
    }

    /// Returns a receiver that observes state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<BootState> {
        self.state.subscribe()
    }

    fn active(&self) -> MutexGuard<'_, Option<ActiveSession>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs the identity check and applies the route's access rule.
    ///
    /// Concurrent calls share one identity check. Once the check settles
    /// the session, repeated calls reuse its outcome; after a recoverable
    /// failure the next call checks again. When the user is anonymous and
    /// `route` requires authentication, one login redirect is issued no
    /// matter how many times this is called.
    #[instrument(skip(self))]
    pub async fn start(&self, route: RouteAccess) -> BootState {
        self.ensure_handshake().await;

        let state = self.state();
        if state == BootState::Anonymous && route == RouteAccess::RequiresAuth {
            if let Err(e) = self.redirect_to_login().await {
                warn!(error = %e, "could not start login");
            }
        }
        state
    }

    async fn ensure_handshake(&self) {
        let seen = self.handshake_attempts.load(Ordering::SeqCst);
        let mut settled = self.handshake.lock().await;
        // A caller that waited on an attempt made by someone else takes its outcome.
        if *settled || self.handshake_attempts.load(Ordering::SeqCst) != seen {
            return;
        }
        *settled = self.handshake_once().await;
        self.handshake_attempts.fetch_add(1, Ordering::SeqCst);
    }

    /// Returns true when the outcome should not be checked again.
    async fn handshake_once(&self) -> bool {
        debug!(provider = self.provider.name(), "checking for an existing session");
        match self.provider.silent_check().await {
            Ok(handshake @ Handshake::Authenticated(_)) => {
                let epoch = self.store().set_from_handshake(handshake);
                self.activate(epoch);
                let claims = self.store().claims();
                info!(subject = ?claims.subject(), "session restored");
                self.state.send_replace(BootState::Authenticated);
                true
            }
            Ok(Handshake::Anonymous) => {
                self.store().set_from_handshake(Handshake::Anonymous);
                debug!("no existing session");
                self.state.send_replace(BootState::Anonymous);
                true
            }
            Err(e) if e.is_unrecoverable() => {
                warn!(error = %e, "session check cannot succeed");
                self.store().fail_terminal(e.to_string());
                self.state.send_replace(BootState::Failed {
                    reason: e.to_string(),
                });
                true
            }
            Err(e) => {
                warn!(error = %e, "session check failed; will retry on next start");
                self.state.send_replace(BootState::Failed {
                    reason: e.to_string(),
                });
                false
            }
        }
    }

    /// Finishes an interactive login when the provider sends the user back.
    ///
    /// # Errors
    ///
    /// Returns the provider's error if the code exchange fails or the state
    /// does not match a login started here.
    #[instrument(skip_all)]
    pub async fn complete_login(&self, callback: &CallbackData) -> Result<(), AuthenticationError> {
        let grant = self.provider.complete_login(callback).await?;
        let epoch = self
            .store()
            .set_from_handshake(Handshake::Authenticated(grant));
        self.activate(epoch);
        self.redirect_issued.store(false, Ordering::SeqCst);
        let claims = self.store().claims();
        info!(subject = ?claims.subject(), "login complete");
        self.state.send_replace(BootState::Authenticated);
        Ok(())
    }

    /// Decides what to do with an error that reached the top of a request.
    ///
    /// Errors that mean the session has expired end the session and issue
    /// at most one login redirect until the user logs in again. Other
    /// errors are left to the caller. Returns true if a redirect was issued.
    pub async fn handle_auth_failure<E>(&self, error: &E) -> bool
    where
        E: AuthFailure + ?Sized,
    {
        if !error.is_auth_expired() {
            return false;
        }

        if self.state() == BootState::Authenticated {
            info!("session expired");
            self.deactivate();
            self.store().clear();
            self.state.send_replace(BootState::Anonymous);
        }

        match self.redirect_to_login().await {
            Ok(issued) => issued,
            Err(e) => {
                warn!(error = %e, "could not start login");
                false
            }
        }
    }

    /// Sends the user to login regardless of earlier redirects.
    ///
    /// # Errors
    ///
    /// Returns the provider's error if login cannot be started.
    pub async fn login(&self) -> Result<(), AuthenticationError> {
        self.redirect_issued.store(true, Ordering::SeqCst);
        let initiation = match self.provider.login().await {
            Ok(initiation) => initiation,
            Err(e) => {
                self.redirect_issued.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };
        self.navigator.redirect(&initiation.authorization_url);
        Ok(())
    }

    /// Ends the session locally and at the provider.
    pub fn logout(&self) {
        self.deactivate();
        self.store().clear();
        self.state.send_replace(BootState::Anonymous);
        info!("logged out");
        if let Some(url) = self.provider.logout_url() {
            self.navigator.redirect(&url);
        }
    }

    async fn redirect_to_login(&self) -> Result<bool, AuthenticationError> {
        if self.redirect_issued.swap(true, Ordering::SeqCst) {
            debug!("login redirect already issued");
            return Ok(false);
        }

        match self.provider.login().await {
            Ok(initiation) => {
                info!("redirecting to login");
                self.navigator.redirect(&initiation.authorization_url);
                Ok(true)
            }
            Err(e) => {
                self.redirect_issued.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    fn activate(&self, epoch: u64) {
        let registration = self.interceptor.install(epoch);
        let schedule = self.gate.spawn_periodic();
        // Replacing the previous session drops its refresh task.
        *self.active() = Some(ActiveSession {
            registration,
            _schedule: schedule,
        });
    }

    fn deactivate(&self) {
        if let Some(active) = self.active().take() {
            self.interceptor.remove(active.registration);
        }
    }
}

impl std::fmt::Debug for SessionBootstrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionBootstrapper")
            .field("provider", &self.provider.name())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
