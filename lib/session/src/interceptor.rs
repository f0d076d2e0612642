//! Request interceptor: bearer injection for outbound engine calls.

use reqwest::header::{AUTHORIZATION, HeaderValue};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tidal_bridge_core::InterceptorId;
use tracing::{debug, instrument};

use crate::error::AuthenticationError;
use crate::refresh::RefreshGate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Registration {
    id: InterceptorId,
    epoch: u64,
}

/// Decorates outbound requests with the session's bearer token.
///
/// The interceptor holds at most one registration. Installing for the epoch
/// already registered returns the existing registration; installing for a
/// new epoch revokes the previous one. Requests decorated while nothing is
/// installed pass through untouched.
#[derive(Debug)]
pub struct RequestInterceptor {
    gate: RefreshGate,
    registration: Mutex<Option<Registration>>,
}

impl RequestInterceptor {
    /// Creates an interceptor with no registration.
    #[must_use]
    pub fn new(gate: RefreshGate) -> Self {
        Self {
            gate,
            registration: Mutex::new(None),
        }
    }

    /// Returns the refresh gate used to obtain tokens.
    #[must_use]
    pub fn gate(&self) -> &RefreshGate {
        &self.gate
    }

    fn registration(&self) -> MutexGuard<'_, Option<Registration>> {
        self.registration
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers the interceptor for a session epoch.
    pub fn install(&self, epoch: u64) -> InterceptorId {
        let mut registration = self.registration();
        let current = *registration;
        match current {
            Some(current) if current.epoch == epoch => current.id,
            previous => {
                if let Some(previous) = previous {
                    debug!(id = %previous.id, epoch = previous.epoch, "revoking interceptor");
                }
                let id = InterceptorId::new();
                *registration = Some(Registration { id, epoch });
                debug!(id = %id, epoch, "interceptor installed");
                id
            }
        }
    }

    /// Removes a registration. Removing a revoked registration does nothing.
    ///
    /// Returns true if the registration was active.
    pub fn remove(&self, id: InterceptorId) -> bool {
        let mut registration = self.registration();
        if registration.is_some_and(|current| current.id == id) {
            *registration = None;
            debug!(id = %id, "interceptor removed");
            true
        } else {
            false
        }
    }

    /// Returns the active registration, if any.
    #[must_use]
    pub fn installed(&self) -> Option<InterceptorId> {
        self.registration().map(|current| current.id)
    }

    /// Sets exactly one `Authorization: Bearer` header on the request.
    ///
    /// # Errors
    ///
    /// Returns the refresh gate's error when no usable token is available.
    /// The request has any existing `Authorization` header removed and can
    /// still be sent; the caller decides what the failure means.
    #[instrument(skip_all, fields(method = %request.method(), url = %request.url()))]
    pub async fn decorate(&self, request: &mut reqwest::Request) -> Result<(), AuthenticationError> {
        if self.installed().is_none() {
            return Ok(());
        }

        let token = match self.gate.ensure_fresh().await {
            Ok(token) => token,
            Err(e) => {
                request.headers_mut().remove(AUTHORIZATION);
                debug!(error = %e, "sending request without credentials");
                return Err(e);
            }
        };

        match HeaderValue::from_str(&format!("Bearer {token}")) {
            Ok(mut value) => {
                value.set_sensitive(true);
                request.headers_mut().insert(AUTHORIZATION, value);
                Ok(())
            }
            Err(_) => {
                request.headers_mut().remove(AUTHORIZATION);
                Err(AuthenticationError::InvalidToken {
                    reason: "token is not a valid header value".to_string(),
                })
            }
        }
    }
}

/// A response together with the outcome of decorating its request.
#[derive(Debug)]
pub struct Intercepted {
    /// The server's response.
    pub response: reqwest::Response,
    /// Set when the request went out without a usable token.
    pub auth_failure: Option<AuthenticationError>,
}

impl Intercepted {
    /// Returns true if the request was sent without a token because the
    /// session could not be refreshed.
    #[must_use]
    pub fn auth_expired(&self) -> bool {
        self.auth_failure == Some(AuthenticationError::AuthExpired)
    }
}

/// HTTP client whose requests all pass through one [`RequestInterceptor`].
#[derive(Debug, Clone)]
pub struct AuthorizedClient {
    http: reqwest::Client,
    interceptor: Arc<RequestInterceptor>,
}

impl AuthorizedClient {
    /// Wraps an HTTP client.
    #[must_use]
    pub fn new(http: reqwest::Client, interceptor: Arc<RequestInterceptor>) -> Self {
        Self { http, interceptor }
    }

    /// Returns the interceptor.
    #[must_use]
    pub fn interceptor(&self) -> &Arc<RequestInterceptor> {
        &self.interceptor
    }

    /// Starts building a request. Send it with [`AuthorizedClient::execute`].
    pub fn request(&self, method: reqwest::Method, url: reqwest::Url) -> reqwest::RequestBuilder {
        self.http.request(method, url)
    }

    /// Decorates and sends a request. Never retries.
    ///
    /// # Errors
    ///
    /// Returns transport errors from the HTTP client.
    pub async fn execute(&self, mut request: reqwest::Request) -> Result<Intercepted, reqwest::Error> {
        let auth_failure = self.interceptor.decorate(&mut request).await.err();
        let response = self.http.execute(request).await?;
        Ok(Intercepted {
            response,
            auth_failure,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refresh::RefreshConfig;
    use crate::session::Handshake;
    use crate::store::TokenStore;
    use crate::testing::{FakeProvider, grant};
    use chrono::Duration;

    fn interceptor(store: &TokenStore, provider: FakeProvider) -> RequestInterceptor {
        RequestInterceptor::new(RefreshGate::new(
            store.clone(),
            Arc::new(provider),
            RefreshConfig::default(),
        ))
    }

    fn request() -> reqwest::Request {
        reqwest::Request::new(
            reqwest::Method::GET,
            "http://engine.test/npl/orders/Order/".parse().unwrap(),
        )
    }

    fn authorization_values(request: &reqwest::Request) -> Vec<String> {
        request
            .headers()
            .get_all(AUTHORIZATION)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn install_is_idempotent_per_epoch() {
        let store = TokenStore::new();
        let interceptor = interceptor(&store, FakeProvider::new());

        let first = interceptor.install(1);
        let again = interceptor.install(1);
        assert_eq!(first, again);

        let second = interceptor.install(2);
        assert_ne!(first, second);
        assert_eq!(interceptor.installed(), Some(second));

        assert!(!interceptor.remove(first));
        assert_eq!(interceptor.installed(), Some(second));
        assert!(interceptor.remove(second));
        assert!(!interceptor.remove(second));
        assert!(interceptor.installed().is_none());
    }

    #[tokio::test]
    async fn reinstalled_interceptor_sets_one_header() {
        let store = TokenStore::new();
        let first = store.set_from_handshake(Handshake::Authenticated(grant(
            "one",
            Duration::hours(1),
            "alice",
        )));
        let interceptor = interceptor(&store, FakeProvider::new());
        interceptor.install(first);
        interceptor.install(first);

        let second = store.set_from_handshake(Handshake::Authenticated(grant(
            "two",
            Duration::hours(1),
            "alice",
        )));
        interceptor.install(second);

        let mut request = request();
        request
            .headers_mut()
            .append(AUTHORIZATION, HeaderValue::from_static("Bearer leftover"));
        interceptor.decorate(&mut request).await.unwrap();
        interceptor.decorate(&mut request).await.unwrap();

        assert_eq!(authorization_values(&request), vec!["Bearer two"]);
    }

    #[tokio::test]
    async fn failed_refresh_strips_stale_header() {
        let store = TokenStore::new();
        let epoch = store.set_from_handshake(Handshake::Authenticated(grant(
            "expired",
            Duration::seconds(-1),
            "alice",
        )));
        let interceptor = interceptor(&store, FakeProvider::new());
        interceptor.install(epoch);

        let mut request = request();
        request
            .headers_mut()
            .insert(AUTHORIZATION, HeaderValue::from_static("Bearer expired"));
        let err = interceptor.decorate(&mut request).await.unwrap_err();

        assert_eq!(err, AuthenticationError::AuthExpired);
        assert!(authorization_values(&request).is_empty());
    }

    #[tokio::test]
    async fn uninstalled_interceptor_leaves_request_alone() {
        let store = TokenStore::new();
        store.set_from_handshake(Handshake::Authenticated(grant(
            "tok",
            Duration::hours(1),
            "alice",
        )));
        let interceptor = interceptor(&store, FakeProvider::new());

        let mut request = request();
        interceptor.decorate(&mut request).await.unwrap();

        assert!(authorization_values(&request).is_empty());
    }
}
