//! Refresh gate: hands out a token that is fresh enough to send.
//!
//! At most one refresh runs per session epoch. Callers that find the token
//! inside the safety margin while a refresh is already running await that
//! same refresh and receive its outcome.

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, instrument, warn};

use crate::error::AuthenticationError;
use crate::provider::IdentityProvider;
use crate::store::TokenStore;

/// Token refresh timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Minimum remaining lifetime, in seconds, a token must have to be sent
    /// without refreshing first.
    #[serde(default = "default_margin_seconds")]
    margin_seconds: u64,
    /// Period of the background refresh task, in seconds.
    #[serde(default = "default_interval_seconds")]
    interval_seconds: u64,
}

fn default_margin_seconds() -> u64 {
    70
}

fn default_interval_seconds() -> u64 {
    60
}

impl RefreshConfig {
    /// Creates a refresh configuration.
    #[must_use]
    pub fn new(margin_seconds: u64, interval_seconds: u64) -> Self {
        Self {
            margin_seconds,
            interval_seconds,
        }
    }

    /// Returns the safety margin in seconds.
    #[must_use]
    pub fn margin_seconds(&self) -> u64 {
        self.margin_seconds
    }

    /// Returns the background refresh period in seconds.
    #[must_use]
    pub fn interval_seconds(&self) -> u64 {
        self.interval_seconds
    }

    /// Returns the safety margin.
    #[must_use]
    /// Margins too large to represent saturate, so every token counts as stale.
    pub fn margin(&self) -> chrono::TimeDelta {
        i64::try_from(self.margin_seconds)
            .ok()
            .and_then(chrono::TimeDelta::try_seconds)
            .unwrap_or(chrono::TimeDelta::MAX)
    }

    /// Returns the background refresh period, never shorter than a second.
    #[must_use]
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_seconds.max(1))
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self::new(default_margin_seconds(), default_interval_seconds())
    }
}

type SharedRefresh = Shared<BoxFuture<'static, Result<String, AuthenticationError>>>;

struct InFlight {
    id: u64,
    epoch: u64,
    refresh: SharedRefresh,
}

struct GateInner {
    store: TokenStore,
    provider: Arc<dyn IdentityProvider>,
    config: RefreshConfig,
    in_flight: Mutex<Option<InFlight>>,
    next_flight: AtomicU64,
}

/// Single-flight token refresher.
///
/// Cloning is cheap; clones share the in-flight slot.
#[derive(Clone)]
pub struct RefreshGate {
    inner: Arc<GateInner>,
}

impl RefreshGate {
    /// Creates a gate that refreshes the session held by `store`.
    #[must_use]
    pub fn new(
        store: TokenStore,
        provider: Arc<dyn IdentityProvider>,
        config: RefreshConfig,
    ) -> Self {
        Self {
            inner: Arc::new(GateInner {
                store,
                provider,
                config,
                in_flight: Mutex::new(None),
                next_flight: AtomicU64::new(1),
            }),
        }
    }

    /// Returns the token store this gate refreshes.
    #[must_use]
    pub fn store(&self) -> &TokenStore {
        &self.inner.store
    }

    /// Returns the refresh configuration.
    #[must_use]
    pub fn config(&self) -> &RefreshConfig {
        &self.inner.config
    }

    /// Returns a token with at least the configured margin of lifetime left.
    ///
    /// If the current token is inside the margin, a refresh is started or an
    /// in-flight one is joined. When the refresh fails the current token is
    /// still returned as long as it has not expired.
    ///
    /// # Errors
    ///
    /// Returns `NotAuthenticated` if there is no session and `AuthExpired`
    /// if the refresh failed and the current token has expired.
    #[instrument(skip(self))]
    pub async fn ensure_fresh(&self) -> Result<String, AuthenticationError> {
        let store = &self.inner.store;
        let Some(epoch) = store.authenticated_epoch() else {
            return Err(AuthenticationError::NotAuthenticated);
        };

        if let Some(token) = store.fresh_token(self.inner.config.margin()) {
            return Ok(token);
        }

        let (id, refresh) = self.join_or_start(epoch);
        let outcome = refresh.await;
        self.finish(id);

        match outcome {
            Ok(token) => Ok(token),
            Err(error) => match store.unexpired_token() {
                Some(token) => {
                    warn!(error = %error, "token refresh failed; using current token until it expires");
                    Ok(token)
                }
                None => {
                    warn!(error = %error, "token refresh failed and the token has expired");
                    Err(AuthenticationError::AuthExpired)
                }
            },
        }
    }

    /// Starts a background task that keeps the token fresh.
    ///
    /// The task goes through [`RefreshGate::ensure_fresh`], so it shares the
    /// in-flight refresh with request traffic. Dropping the returned handle
    /// stops the task.
    #[must_use]
    pub fn spawn_periodic(&self) -> RefreshSchedule {
        let gate = self.clone();
        let period = self.inner.config.interval();

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                if !gate.inner.store.is_authenticated() {
                    continue;
                }
                match gate.ensure_fresh().await {
                    Ok(_) => debug!("periodic token check complete"),
                    Err(e) => warn!(error = %e, "periodic token refresh failed"),
                }
            }
        });

        RefreshSchedule { task }
    }

    fn join_or_start(&self, epoch: u64) -> (u64, SharedRefresh) {
        let mut slot = self
            .inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(flight) = slot.as_ref().filter(|flight| flight.epoch == epoch) {
            debug!(epoch, "joining in-flight refresh");
            return (flight.id, flight.refresh.clone());
        }

        let id = self.inner.next_flight.fetch_add(1, Ordering::Relaxed);
        let refresh = run_refresh(
            self.inner.store.clone(),
            Arc::clone(&self.inner.provider),
            epoch,
        )
        .boxed()
        .shared();

        debug!(epoch, flight = id, "starting token refresh");
        *slot = Some(InFlight {
            id,
            epoch,
            refresh: refresh.clone(),
        });
        (id, refresh)
    }

    fn finish(&self, id: u64) {
        let mut slot = self
            .inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|flight| flight.id == id) {
            *slot = None;
        }
    }
}

impl std::fmt::Debug for RefreshGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshGate")
            .field("provider", &self.inner.provider.name())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

async fn run_refresh(
    store: TokenStore,
    provider: Arc<dyn IdentityProvider>,
    epoch: u64,
) -> Result<String, AuthenticationError> {
    let refresh_token = store
        .refresh_token_for(epoch)
        .ok_or_else(|| AuthenticationError::RefreshFailed {
            reason: "session has no refresh token".to_string(),
        })?;

    let grant = provider.refresh(&refresh_token).await?;
    let token = grant.access_token.clone();

    if store.apply_refresh(epoch, grant) {
        Ok(token)
    } else {
        // The identity changed mid-flight; hand out whatever is current.
        store
            .unexpired_token()
            .ok_or(AuthenticationError::AuthExpired)
    }
}

/// Handle to the background refresh task. Dropping it stops the task.
#[derive(Debug)]
pub struct RefreshSchedule {
    task: JoinHandle<()>,
}

impl RefreshSchedule {
    /// Returns true if the task has stopped.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for RefreshSchedule {
    fn drop(&mut self) {
        self.task.abort();
    }
}
