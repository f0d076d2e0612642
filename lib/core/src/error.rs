//! Error handling foundation for tidal-bridge.
//!
//! This module provides the `Result` type alias using rootcause, plus the
//! `AuthFailure` classification that lets the session bootstrapper make a
//! single redirect decision for errors raised in any crate. Each crate
//! defines its own domain-specific error types in its own error module.

use rootcause::Report;

/// A Result type alias using rootcause's Report for error handling.
///
/// Each layer adds its own context via `.context()` as errors propagate.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;

/// Classifies whether an error means the session can no longer be used.
///
/// Implemented by every error type that can carry an expired session so the
/// top-level redirect decision does not need to know which crate failed.
pub trait AuthFailure {
    /// Returns true if the error means the token could not be refreshed and
    /// the user has to log in again.
    fn is_auth_expired(&self) -> bool;
}

impl<C: AuthFailure + ?Sized> AuthFailure for &C {
    fn is_auth_expired(&self) -> bool {
        (**self).is_auth_expired()
    }
}

impl<C: AuthFailure + Send + Sync + 'static> AuthFailure for Report<C> {
    fn is_auth_expired(&self) -> bool {
        self.current_context().is_auth_expired()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Expired;

    impl std::fmt::Display for Expired {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "expired")
        }
    }

    impl std::error::Error for Expired {}

    impl AuthFailure for Expired {
        fn is_auth_expired(&self) -> bool {
            true
        }
    }

    #[test]
    fn result_type_works() {
        let ok: Result<i32> = Ok(42);
        assert_eq!(ok.expect("should be ok"), 42);
    }

    #[test]
    fn auth_failure_through_reference() {
        let err = Expired;
        let by_ref = &err;
        assert!(by_ref.is_auth_expired());
    }

    #[test]
    fn auth_failure_through_report() {
        let report: Report<Expired> = Expired.into();
        assert!(report.is_auth_expired());
    }
}
