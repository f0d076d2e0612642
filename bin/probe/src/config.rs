//! Centralized probe configuration.
//!
//! This module provides strongly-typed configuration for the probe, loaded
//! via the `config` crate from environment variables such as
//! `OIDC__ISSUER_URL`, `ENGINE__BASE_URL` or `PROBE__RESOURCE_TYPE`.
//!
//! See [`OidcConfig`](tidal_bridge_session::OidcConfig) for identity
//! provider configuration and [`EngineConfig`](tidal_bridge_engine::EngineConfig)
//! for engine endpoints.

use serde::Deserialize;
use std::path::PathBuf;
use tidal_bridge_engine::{EngineConfig, LiveConfig};
use tidal_bridge_session::{OidcConfig, RefreshConfig};

/// Probe configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct ProbeConfig {
    /// Identity provider configuration.
    pub oidc: OidcConfig,

    /// Engine endpoints.
    pub engine: EngineConfig,

    /// Token refresh timing.
    #[serde(default)]
    pub refresh: RefreshConfig,

    /// Live update reconnect timing.
    #[serde(default)]
    pub live: LiveConfig,

    /// What the probe does once logged in.
    #[serde(default)]
    pub probe: ProbeSettings,
}

/// Probe behaviour.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeSettings {
    /// Resource type to list or show.
    #[serde(default)]
    pub resource_type: Option<String>,

    /// Instance to show. Lists the type when absent.
    #[serde(default)]
    pub resource_id: Option<String>,

    /// Action to invoke on the instance, if the server permits it.
    #[serde(default)]
    pub action: Option<String>,

    /// Keep running and re-fetch the instance on live updates.
    #[serde(default)]
    pub follow: bool,

    /// File that keeps the offline token between runs.
    #[serde(default)]
    pub token_cache: Option<PathBuf>,
}

impl ProbeConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::from_source(config::Environment::default())
    }

    fn from_source(environment: config::Environment) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(environment.separator("__").try_parsing(true))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn environment(vars: &[(&str, &str)]) -> config::Environment {
        let source: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        config::Environment::default().source(Some(source))
    }

    #[test]
    fn loads_nested_sections_with_defaults() {
        let config = ProbeConfig::from_source(environment(&[
            ("OIDC__ISSUER_URL", "https://auth.example.com/realms/acme"),
            ("OIDC__CLIENT_ID", "probe"),
            ("OIDC__REDIRECT_URI", "http://localhost:5173/"),
            ("ENGINE__BASE_URL", "https://engine.example.com"),
            ("ENGINE__PACKAGE", "iou"),
            ("PROBE__RESOURCE_TYPE", "Iou"),
            ("PROBE__FOLLOW", "true"),
        ]))
        .expect("load config");

        assert_eq!(config.oidc.client_id(), "probe");
        assert_eq!(config.engine.package(), "iou");
        assert_eq!(config.engine.prefix(), "npl");
        assert_eq!(config.refresh.margin_seconds(), 70);
        assert_eq!(config.refresh.interval_seconds(), 60);
        assert_eq!(config.live.initial_backoff().as_millis(), 500);
        assert_eq!(config.probe.resource_type.as_deref(), Some("Iou"));
        assert!(config.probe.follow);
        assert!(config.probe.resource_id.is_none());
    }

    #[test]
    fn refresh_timing_is_configurable() {
        let config = ProbeConfig::from_source(environment(&[
            ("OIDC__ISSUER_URL", "https://auth.example.com/realms/acme"),
            ("OIDC__CLIENT_ID", "probe"),
            ("OIDC__REDIRECT_URI", "http://localhost:5173/"),
            ("ENGINE__BASE_URL", "https://engine.example.com"),
            ("ENGINE__PACKAGE", "iou"),
            ("REFRESH__MARGIN_SECONDS", "120"),
        ]))
        .expect("load config");

        assert_eq!(config.refresh.margin_seconds(), 120);
        assert_eq!(config.refresh.interval_seconds(), 60);
    }

    #[test]
    fn missing_engine_section_is_an_error() {
        let result = ProbeConfig::from_source(environment(&[
            ("OIDC__ISSUER_URL", "https://auth.example.com/realms/acme"),
            ("OIDC__CLIENT_ID", "probe"),
            ("OIDC__REDIRECT_URI", "http://localhost:5173/"),
        ]));

        assert!(result.is_err());
    }
}
