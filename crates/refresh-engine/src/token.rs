//! OAuth2 refresh-token exchange against the identity provider.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info, instrument};

use crate::config::Endpoints;
use crate::error::{RefreshError, Result};
use crate::retry::{RetryAction, RetryPolicy, retry_with_backoff};
use crate::transport::{ApiRequest, RequestBody, Transport};

/// Lifetime assumed when the provider omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;

/// Credentials are renewed this long before their nominal expiry.
const EXPIRY_SKEW_SECS: i64 = 60;

/// Application credentials and the refresh token loaded for this run.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    /// Identity of the credential set, used to validate cached refresh tokens.
    pub identity: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("identity", &self.identity)
            .finish()
    }
}

/// A bearer token with its expiry. Replaced wholesale on renewal.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessCredential {
    token: String,
    expires_at: DateTime<Utc>,
}

impl fmt::Debug for AccessCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessCredential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl AccessCredential {
    pub fn new(token: impl Into<String>, expires_in_secs: u64) -> Self {
        let lifetime = TimeDelta::seconds(i64::try_from(expires_in_secs).unwrap_or(i64::MAX));
        Self {
            token: token.into(),
            expires_at: Utc::now()
                .checked_add_signed(lifetime)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    #[inline]
    pub fn is_expired(&self) -> bool {
        Utc::now() + TimeDelta::seconds(EXPIRY_SKEW_SECS) >= self.expires_at
    }

    /// `Authorization` header value for this credential.
    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

/// Result of one successful exchange.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access: AccessCredential,
    /// Rotated refresh token; callers persist it for later runs.
    pub refresh_token: String,
    pub expires_in: u64,
    pub refresh_token_expires_in: Option<u64>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<serde_json::Value>,
    #[serde(default)]
    refresh_token_expires_in: Option<serde_json::Value>,
}

/// The v1 endpoint encodes numbers as strings.
fn lenient_u64(value: Option<&serde_json::Value>) -> Option<u64> {
    match value? {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Exchanges refresh tokens for access credentials.
#[derive(Clone)]
pub struct TokenManager {
    transport: Arc<dyn Transport>,
    endpoints: Endpoints,
    retry: RetryPolicy,
}

impl TokenManager {
    pub fn new(transport: Arc<dyn Transport>, endpoints: Endpoints, retry: RetryPolicy) -> Self {
        Self {
            transport,
            endpoints,
            retry,
        }
    }

    /// Exchange the refresh token carried by `credentials`.
    pub async fn acquire(&self, credentials: &Credentials) -> Result<TokenGrant> {
        self.exchange(credentials, &credentials.refresh_token).await
    }

    /// Exchange an explicit refresh token, e.g. one rotated earlier in the run.
    #[instrument(skip_all, fields(client_id = %credentials.client_id))]
    pub async fn exchange(&self, credentials: &Credentials, refresh_token: &str) -> Result<TokenGrant> {
        let form = vec![
            ("client_id", credentials.client_id.clone()),
            ("client_secret", credentials.client_secret.clone()),
            ("grant_type", "refresh_token".to_string()),
            ("resource", self.endpoints.token_resource.clone()),
            ("refresh_token", refresh_token.to_string()),
        ];
        let form = &form;

        let grant = retry_with_backoff(&self.retry, "token exchange", |attempt| async move {
            let request = ApiRequest::post(
                self.endpoints.token_url.as_str(),
                RequestBody::Form(form.clone()),
            );
            let response = match self.transport.send(request).await {
                Ok(response) => response,
                Err(err) => return RetryAction::Retry(RefreshError::auth(attempt + 1, err.to_string())),
            };

            if response.status != StatusCode::OK {
                let reason = format!(
                    "{} {}",
                    response.status.as_u16(),
                    response.status.canonical_reason().unwrap_or("Unknown")
                );
                debug!(attempt = attempt + 1, %reason, "Token endpoint refused the exchange");
                return RetryAction::Retry(RefreshError::auth(attempt + 1, reason));
            }

            match parse_grant(&response.body, refresh_token) {
                Ok(grant) => RetryAction::Success(grant),
                Err(err) => RetryAction::Fail(err),
            }
        })
        .await?;

        info!(
            expires_in = grant.expires_in,
            expires_at = %grant.access.expires_at(),
            "Obtained access token"
        );
        Ok(grant)
    }
}

fn parse_grant(body: &str, previous_refresh_token: &str) -> Result<TokenGrant> {
    let parsed: TokenResponse = serde_json::from_str(body)
        .map_err(|e| RefreshError::auth(1, format!("malformed token response: {e}")))?;

    if parsed.access_token.is_empty() {
        return Err(RefreshError::auth(1, "token response carried an empty access_token"));
    }

    let expires_in = lenient_u64(parsed.expires_in.as_ref()).unwrap_or(DEFAULT_EXPIRES_IN_SECS);
    let refresh_token = parsed
        .refresh_token
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| previous_refresh_token.to_string());

    Ok(TokenGrant {
        access: AccessCredential::new(parsed.access_token, expires_in),
        refresh_token,
        expires_in,
        refresh_token_expires_in: lenient_u64(parsed.refresh_token_expires_in.as_ref()),
    })
}
