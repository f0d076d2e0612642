//! Engine endpoint configuration and the resource path convention.

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Where the engine lives and which protocol package the client talks to.
///
/// Resource paths follow `/{prefix}/{package}/{ResourceType}/[{id}/][{action}]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Engine base URL (e.g., "https://engine.example.com").
    base_url: String,
    /// First path segment of every resource path.
    /// Default: "npl"
    #[serde(default = "default_prefix")]
    prefix: String,
    /// Protocol package the resources belong to.
    package: String,
    /// Path of the server-sent event stream, relative to the base URL.
    /// Default: "/{prefix}/{package}/-/stream"
    #[serde(default)]
    stream_path: Option<String>,
}

fn default_prefix() -> String {
    "npl".to_string()
}

impl EngineConfig {
    /// Creates a configuration with the default prefix.
    #[must_use]
    pub fn new(base_url: impl Into<String>, package: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            prefix: default_prefix(),
            package: package.into(),
            stream_path: None,
        }
    }

    /// Sets the path prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Sets the event stream path.
    #[must_use]
    pub fn with_stream_path(mut self, path: impl Into<String>) -> Self {
        self.stream_path = Some(path.into());
        self
    }

    /// Returns the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the path prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the protocol package.
    #[must_use]
    pub fn package(&self) -> &str {
        &self.package
    }

    fn parsed_base(&self) -> Result<Url, EngineError> {
        let base = Url::parse(&self.base_url).map_err(|e| EngineError::InvalidConfiguration {
            details: format!("invalid base URL '{}': {e}", self.base_url),
        })?;
        if base.cannot_be_a_base() {
            return Err(EngineError::InvalidConfiguration {
                details: format!("base URL '{}' cannot carry a path", self.base_url),
            });
        }
        Ok(base)
    }

    /// Returns the URL of a resource path.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if the base URL is unusable.
    pub fn resource_url(&self, path: &ResourcePath) -> Result<Url, EngineError> {
        let mut url = self.parsed_base()?;
        {
            let mut segments = url.path_segments_mut().map_err(|()| {
                EngineError::InvalidConfiguration {
                    details: format!("base URL '{}' cannot carry a path", self.base_url),
                }
            })?;
            segments
                .pop_if_empty()
                .push(&self.prefix)
                .push(&self.package)
                .push(&path.resource_type);
            match (&path.id, &path.action) {
                (None, None) => {
                    // Collection paths end in a slash.
                    segments.push("");
                }
                (None, Some(action)) => {
                    segments.push(action);
                }
                (Some(id), None) => {
                    segments.push(id).push("");
                }
                (Some(id), Some(action)) => {
                    segments.push(id).push(action);
                }
            }
        }
        Ok(url)
    }

    /// Returns the URL of the event stream.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if the base URL or stream path is unusable.
    pub fn stream_url(&self) -> Result<Url, EngineError> {
        let base = self.parsed_base()?;
        match &self.stream_path {
            Some(path) => base.join(path).map_err(|e| EngineError::InvalidConfiguration {
                details: format!("invalid stream path '{path}': {e}"),
            }),
            None => {
                let mut url = base;
                url.path_segments_mut()
                    .map_err(|()| EngineError::InvalidConfiguration {
                        details: format!("base URL '{}' cannot carry a path", self.base_url),
                    })?
                    .pop_if_empty()
                    .push(&self.prefix)
                    .push(&self.package)
                    .push("-")
                    .push("stream");
                Ok(url)
            }
        }
    }
}

/// A path in the engine's resource convention.
///
/// Segments are case-sensitive and percent-encoded when rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePath {
    resource_type: String,
    id: Option<String>,
    action: Option<String>,
}

impl ResourcePath {
    /// The collection of a resource type: `/{prefix}/{package}/{Type}/`.
    #[must_use]
    pub fn collection(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: None,
            action: None,
        }
    }

    /// One instance: `/{prefix}/{package}/{Type}/{id}/`.
    #[must_use]
    pub fn instance(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: Some(id.into()),
            action: None,
        }
    }

    /// An action on an instance: `/{prefix}/{package}/{Type}/{id}/{action}`.
    #[must_use]
    pub fn action(
        resource_type: impl Into<String>,
        id: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: Some(id.into()),
            action: Some(action.into()),
        }
    }

    /// Returns the resource type segment.
    #[must_use]
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// Returns the instance id, if any.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}
