use reqwest::StatusCode;

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, RefreshError>;

#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    /// The token exchange could not succeed; nothing downstream can proceed.
    #[error("unable to obtain an access token after {attempts} attempt(s): {reason}")]
    Auth { attempts: u32, reason: String },

    #[error("transient failure while {operation} for dataset `{resource}`: {reason}")]
    TransientNetwork {
        resource: String,
        operation: &'static str,
        reason: String,
    },

    #[error("dataset `{resource}` rejected with HTTP {status}: {code}: {message}")]
    RemoteValidation {
        resource: String,
        status: StatusCode,
        code: String,
        message: String,
    },

    #[error("refresh of dataset `{resource}` failed: {detail}")]
    RemoteServiceFailure { resource: String, detail: String },

    #[error("timed out waiting for refresh of: {}", .resources.join(", "))]
    Timeout { resources: Vec<String> },

    #[error("HTTP request failed: {source}")]
    Http {
        #[from]
        source: reqwest::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("protocol error: {reason}")]
    Protocol { reason: String },

    #[error("refresh history for dataset `{resource}` unavailable (HTTP {status}): {body}")]
    HistoryUnavailable {
        resource: String,
        status: StatusCode,
        body: String,
    },

    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    #[error("no datasets configured; specify at least one dataset")]
    NoResources,

    #[error("dataset `{resource}` finished with error {detail}")]
    FailFast { resource: String, detail: String },

    #[error("one or more dataset refreshes finished with error: {summary}")]
    RunFailed { summary: String },
}

impl RefreshError {
    pub fn auth(attempts: u32, reason: impl Into<String>) -> Self {
        Self::Auth {
            attempts,
            reason: reason.into(),
        }
    }

    pub fn transient(
        resource: impl Into<String>,
        operation: &'static str,
        reason: impl ToString,
    ) -> Self {
        Self::TransientNetwork {
            resource: resource.into(),
            operation,
            reason: reason.to_string(),
        }
    }

    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol {
            reason: reason.into(),
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Whether another attempt at the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransientNetwork { .. } | Self::RemoteValidation { .. } | Self::Http { .. }
        )
    }

    /// Whether the error aborts the whole run rather than a single dataset.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Auth { .. }
                | Self::HistoryUnavailable { .. }
                | Self::Protocol { .. }
                | Self::Configuration { .. }
                | Self::NoResources
        )
    }
}
