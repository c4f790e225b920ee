//! Classification of remote error bodies.

use reqwest::StatusCode;
use serde::Deserialize;

/// Error codes the service uses when the bearer token is no longer valid.
const TOKEN_EXPIRED_CODES: &[&str] = &["TokenExpired"];

/// Structured error returned by the API as `{"error": {"code": .., "message": ..}}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: RemoteError,
}

/// Parse a structured error body, returning `None` for anything else.
pub fn parse_remote_error(body: &str) -> Option<RemoteError> {
    serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .map(|envelope| envelope.error)
}

/// Whether a failed call was rejected because the access token expired.
///
/// Only a 403 whose body parses as a structured error with a token-expired
/// code qualifies. Other 403 causes (missing permissions, capacity limits) and
/// unparseable bodies are hard failures.
pub fn is_expiry_indicated(status: StatusCode, body: &str) -> bool {
    if status != StatusCode::FORBIDDEN {
        return false;
    }
    parse_remote_error(body).is_some_and(|err| {
        TOKEN_EXPIRED_CODES
            .iter()
            .any(|code| err.code.eq_ignore_ascii_case(code))
    })
}
