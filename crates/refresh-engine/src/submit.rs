//! Refresh submission.

use std::sync::Arc;

use reqwest::StatusCode;
use tracing::{info, instrument, warn};

use crate::config::{Endpoints, NotifyOption};
use crate::error::{RefreshError, Result};
use crate::expiry::parse_remote_error;
use crate::retry::{RetryAction, RetryPolicy, retry_with_backoff};
use crate::session::AuthSession;
use crate::transport::{ApiRequest, ApiResponse, RequestBody, Transport};

/// Response header carrying the remote job identifier.
pub const REQUEST_ID_HEADER: &str = "RequestId";

/// Longest slice of an unparseable error body kept in error messages.
const MAX_BODY_EXCERPT: usize = 256;

/// Triggers dataset refreshes.
pub struct RefreshSubmitter {
    transport: Arc<dyn Transport>,
    endpoints: Endpoints,
    workspace: Option<String>,
    retry: RetryPolicy,
    notify_option: NotifyOption,
}

impl RefreshSubmitter {
    pub fn new(
        transport: Arc<dyn Transport>,
        endpoints: Endpoints,
        workspace: Option<String>,
        retry: RetryPolicy,
        notify_option: NotifyOption,
    ) -> Self {
        Self {
            transport,
            endpoints,
            workspace,
            retry,
            notify_option,
        }
    }

    /// Request a refresh of `resource` and return the remote request id.
    ///
    /// Expired tokens are renewed and the attempt resent without consuming a
    /// retry slot. A renewal failure is returned as [`RefreshError::Auth`].
    #[instrument(skip(self, session), fields(resource = %resource))]
    pub async fn submit(&self, resource: &str, session: &AuthSession) -> Result<String> {
        let url = self
            .endpoints
            .refreshes_url(self.workspace.as_deref(), resource);
        let url = url.as_str();
        let body = serde_json::json!({ "notifyOption": self.notify_option.as_str() });
        let body = &body;

        let request_id = retry_with_backoff(&self.retry, "dataset refresh", move |_| async move {
            RetryAction::from_result(self.attempt(resource, url, body, session).await)
        })
        .await?;

        info!(request_id = %request_id, "Refresh accepted");
        Ok(request_id)
    }

    async fn attempt(
        &self,
        resource: &str,
        url: &str,
        body: &serde_json::Value,
        session: &AuthSession,
    ) -> Result<String> {
        let response = session
            .send_authorized(self.transport.as_ref(), || {
                ApiRequest::post(url, RequestBody::Json(body.clone()))
            })
            .await
            .map_err(|err| match err {
                RefreshError::Http { source } => {
                    RefreshError::transient(resource, "submitting refresh", source)
                }
                other => other,
            })?;

        if response.status != StatusCode::ACCEPTED {
            let err = rejection(resource, &response);
            warn!(status = response.status.as_u16(), error = %err, "Refresh request not accepted");
            return Err(err);
        }

        match response.header(REQUEST_ID_HEADER) {
            Some(id) if !id.trim().is_empty() => Ok(id.trim().to_string()),
            _ => Err(RefreshError::RemoteValidation {
                resource: resource.to_string(),
                status: response.status,
                code: "MissingRequestId".to_string(),
                message: format!("accepted response carried no {REQUEST_ID_HEADER} header"),
            }),
        }
    }
}

/// Build the error for a non-202 response.
fn rejection(resource: &str, response: &ApiResponse) -> RefreshError {
    let status = response.status;
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return RefreshError::transient(
            resource,
            "submitting refresh",
            format!("HTTP {}: {}", status.as_u16(), excerpt(&response.body)),
        );
    }

    let (code, message) = match parse_remote_error(&response.body) {
        Some(remote) => (remote.code, remote.message),
        None => ("Unknown".to_string(), excerpt(&response.body)),
    };
    RefreshError::RemoteValidation {
        resource: resource.to_string(),
        status,
        code,
        message,
    }
}

fn excerpt(body: &str) -> String {
    let body = body.trim();
    match body.char_indices().nth(MAX_BODY_EXCERPT) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
