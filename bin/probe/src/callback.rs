//! Parsing of the redirect URL the identity provider sends the user to.

use reqwest::Url;
use tidal_bridge_session::CallbackData;

use crate::error::ProbeError;

/// Extracts the authorization code and state from a callback URL.
///
/// # Errors
///
/// Returns `InvalidCallback` if the URL does not parse, carries an `error`
/// parameter from the provider, or lacks `code` or `state`.
pub fn parse_callback(url: &str) -> Result<CallbackData, ProbeError> {
    let url = Url::parse(url.trim()).map_err(|e| ProbeError::InvalidCallback {
        reason: e.to_string(),
    })?;

    let mut code = None;
    let mut state = None;
    let mut error = None;
    for (name, value) in url.query_pairs() {
        match name.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Err(ProbeError::InvalidCallback {
            reason: format!("provider returned '{error}'"),
        });
    }

    match (code, state) {
        (Some(code), Some(state)) => Ok(CallbackData { code, state }),
        (None, _) => Err(ProbeError::InvalidCallback {
            reason: "missing 'code' parameter".to_string(),
        }),
        (_, None) => Err(ProbeError::InvalidCallback {
            reason: "missing 'state' parameter".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_code_and_state() {
        let callback =
            parse_callback("http://localhost:5173/?state=s%201&session_state=x&code=abc\n")
                .expect("callback");

        assert_eq!(callback.code, "abc");
        assert_eq!(callback.state, "s 1");
    }

    #[test]
    fn provider_error_is_reported() {
        let result = parse_callback("http://localhost:5173/?error=access_denied&state=s");

        match result {
            Err(ProbeError::InvalidCallback { reason }) => {
                assert!(reason.contains("access_denied"));
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn missing_parameters_are_rejected() {
        assert!(parse_callback("http://localhost:5173/?code=abc").is_err());
        assert!(parse_callback("http://localhost:5173/?state=s").is_err());
        assert!(parse_callback("not a url").is_err());
    }
}
