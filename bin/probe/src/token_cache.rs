//! File that keeps the provider's offline token between probe runs.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::ProbeError;

/// Offline token persisted to a single file.
#[derive(Debug, Clone)]
pub struct TokenCache {
    path: PathBuf,
}

impl TokenCache {
    /// Creates a cache backed by `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the cached token. A missing or empty file is no token.
    ///
    /// # Errors
    ///
    /// Returns `TokenCache` if the file exists but cannot be read.
    pub async fn load(&self) -> Result<Option<String>, ProbeError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => {
                let token = contents.trim();
                Ok((!token.is_empty()).then(|| token.to_string()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.error(e)),
        }
    }

    /// Writes `token`, or removes the file when there is none.
    ///
    /// # Errors
    ///
    /// Returns `TokenCache` if the file cannot be written or removed.
    pub async fn store(&self, token: Option<&str>) -> Result<(), ProbeError> {
        match token {
            Some(token) => tokio::fs::write(&self.path, token)
                .await
                .map_err(|e| self.error(e)),
            None => match tokio::fs::remove_file(&self.path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(self.error(e)),
            },
        }
    }

    fn error(&self, e: std::io::Error) -> ProbeError {
        ProbeError::TokenCache {
            reason: format!("{}: {e}", self.path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_is_no_token() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = TokenCache::new(dir.path().join("offline-token"));

        assert_eq!(cache.load().await.expect("load"), None);
    }

    #[tokio::test]
    async fn stored_token_is_loaded_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = TokenCache::new(dir.path().join("offline-token"));

        cache.store(Some("r1")).await.expect("store");
        assert_eq!(cache.load().await.expect("load").as_deref(), Some("r1"));

        cache.store(None).await.expect("clear");
        assert_eq!(cache.load().await.expect("load"), None);
        assert!(!cache.path().exists());
    }

    #[tokio::test]
    async fn clearing_an_absent_cache_succeeds() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = TokenCache::new(dir.path().join("offline-token"));

        cache.store(None).await.expect("clear");
    }

    #[tokio::test]
    async fn unreadable_path_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = TokenCache::new(dir.path());

        assert!(matches!(
            cache.load().await,
            Err(ProbeError::TokenCache { .. })
        ));
    }
}
