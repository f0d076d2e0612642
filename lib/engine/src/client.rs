//! HTTP client for engine resources.

use reqwest::header::{ACCEPT, HeaderValue};
use reqwest::{Method, StatusCode};
use rootcause::prelude::Report;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tidal_bridge_core::RequestId;
use tidal_bridge_session::{AuthorizedClient, Intercepted};
use tracing::{debug, instrument, warn};

use crate::config::{EngineConfig, ResourcePath};
use crate::error::EngineError;
use crate::model::{CreateRequest, ResourceInstance, ResourcePage};

/// Engine resource client.
///
/// Every request goes through the session's [`AuthorizedClient`], so it
/// carries the current bearer token. Nothing is retried: mutating calls are
/// not idempotent, and reads are retried by the user if at all.
#[derive(Debug, Clone)]
pub struct EngineClient {
    config: EngineConfig,
    http: AuthorizedClient,
}

impl EngineClient {
    /// Creates a client.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if the configured URLs are unusable.
    pub fn new(config: EngineConfig, http: AuthorizedClient) -> Result<Self, Report<EngineError>> {
        config.resource_url(&ResourcePath::collection("_"))?;
        Ok(Self { config, http })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the authorized HTTP client.
    #[must_use]
    pub fn http(&self) -> &AuthorizedClient {
        &self.http
    }

    /// Fetches one instance.
    #[instrument(skip(self), fields(request_id = %RequestId::new()))]
    pub async fn get(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<ResourceInstance, Report<EngineError>> {
        let path = ResourcePath::instance(resource_type, id);
        self.call(Method::GET, &path, None::<&()>).await
    }

    /// Lists the instances of a type visible to the current user.
    #[instrument(skip(self), fields(request_id = %RequestId::new()))]
    pub async fn list(&self, resource_type: &str) -> Result<ResourcePage, Report<EngineError>> {
        let path = ResourcePath::collection(resource_type);
        self.call(Method::GET, &path, None::<&()>).await
    }

    /// Creates an instance.
    #[instrument(skip(self, request), fields(request_id = %RequestId::new()))]
    pub async fn create(
        &self,
        resource_type: &str,
        request: &CreateRequest,
    ) -> Result<ResourceInstance, Report<EngineError>> {
        let path = ResourcePath::collection(resource_type);
        self.call(Method::POST, &path, Some(request)).await
    }

    /// Invokes an action and returns its result.
    ///
    /// Actions without a return value yield `null`.
    #[instrument(skip(self, body), fields(request_id = %RequestId::new()))]
    pub async fn invoke(
        &self,
        resource_type: &str,
        id: &str,
        action: &str,
        body: Option<&JsonValue>,
    ) -> Result<JsonValue, Report<EngineError>> {
        let path = ResourcePath::action(resource_type, id, action);
        let empty = JsonValue::Object(serde_json::Map::new());
        let response = self
            .send(Method::POST, &path, Some(body.unwrap_or(&empty)))
            .await?;

        let bytes = response.bytes().await.map_err(|e| EngineError::NetworkError {
            details: e.to_string(),
        })?;
        if bytes.is_empty() {
            return Ok(JsonValue::Null);
        }
        serde_json::from_slice(&bytes).map_err(|e| {
            EngineError::InvalidResponse {
                details: e.to_string(),
            }
            .into()
        })
    }

    async fn call<B, T>(
        &self,
        method: Method,
        path: &ResourcePath,
        body: Option<&B>,
    ) -> Result<T, Report<EngineError>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send(method, path, body).await?;
        response.json::<T>().await.map_err(|e| {
            EngineError::InvalidResponse {
                details: e.to_string(),
            }
            .into()
        })
    }

    async fn send<B>(
        &self,
        method: Method,
        path: &ResourcePath,
        body: Option<&B>,
    ) -> Result<reqwest::Response, Report<EngineError>>
    where
        B: Serialize + ?Sized,
    {
        let url = self.config.resource_url(path)?;
        let mut builder = self
            .http
            .request(method.clone(), url.clone())
            .header(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let request = builder.build().map_err(|e| EngineError::InvalidConfiguration {
            details: format!("failed to build request: {e}"),
        })?;

        debug!(method = %method, path = url.path(), "engine request");
        let intercepted = self
            .http
            .execute(request)
            .await
            .map_err(|e| EngineError::NetworkError {
                details: e.to_string(),
            })?;

        if intercepted.response.status().is_success() {
            return Ok(intercepted.response);
        }

        let error = error_from_response(intercepted, url.path()).await;
        warn!(method = %method, path = url.path(), error = %error, "engine request failed");
        Err(error.into())
    }
}

/// Maps a failed response to the error taxonomy.
pub(crate) async fn error_from_response(intercepted: Intercepted, path: &str) -> EngineError {
    let auth_expired = intercepted.auth_expired();
    let status = intercepted.response.status();

    match status {
        StatusCode::UNAUTHORIZED if auth_expired => EngineError::AuthExpired,
        StatusCode::UNAUTHORIZED => EngineError::Unauthorized,
        StatusCode::FORBIDDEN => EngineError::Forbidden {
            message: server_message(intercepted.response).await,
        },
        StatusCode::NOT_FOUND => EngineError::NotFound {
            path: path.to_string(),
        },
        StatusCode::BAD_REQUEST | StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
            EngineError::ValidationRejected {
                status: status.as_u16(),
                message: server_message(intercepted.response).await,
            }
        }
        s if s.is_server_error() => EngineError::NetworkError {
            details: format!("engine returned {s}"),
        },
        s => EngineError::UnexpectedStatus { status: s.as_u16() },
    }
}

/// Extracts the engine's `message` field, falling back to the raw body.
async fn server_message(response: reqwest::Response) -> String {
    let body = response.text().await.unwrap_or_default();
    serde_json::from_str::<JsonValue>(&body)
        .ok()
        .and_then(|value| {
            value
                .get("message")
                .and_then(JsonValue::as_str)
                .map(str::to_string)
        })
        .unwrap_or(body)
}
