//! Refresh status polling.

use std::sync::Arc;

use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::config::Endpoints;
use crate::error::{RefreshError, Result};
use crate::jobs::{JobState, RefreshJob};
use crate::session::AuthSession;
use crate::transport::{ApiRequest, Transport};

const NO_ERROR_DETAIL: &str = "no error detail reported";

#[derive(Debug, Deserialize)]
struct RefreshHistory {
    value: Vec<RefreshEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshEntry {
    #[serde(default)]
    request_id: Option<String>,
    #[serde(default)]
    status: String,
    #[serde(default)]
    service_exception_json: Option<String>,
}

/// What one poll learned about a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The job's history entry was found.
    Observed {
        state: JobState,
        /// Remote error detail for failed refreshes.
        detail: Option<String>,
    },
    /// The request id is not in the history.
    Missing,
    /// The history could not be fetched this time (connection error, timeout).
    Unreachable { reason: String },
}

/// Reads refresh history and classifies job status.
pub struct StatusPoller {
    transport: Arc<dyn Transport>,
    endpoints: Endpoints,
    workspace: Option<String>,
}

impl StatusPoller {
    pub fn new(transport: Arc<dyn Transport>, endpoints: Endpoints, workspace: Option<String>) -> Self {
        Self {
            transport,
            endpoints,
            workspace,
        }
    }

    /// Poll the refresh history of `job.resource` for `job.request_id`.
    ///
    /// An expired token is renewed and the same poll sent once more; any other
    /// non-200 answer is fatal for the run.
    #[instrument(skip(self, session), fields(resource = %job.resource, request_id = %job.request_id))]
    pub async fn poll(&self, job: &RefreshJob, session: &AuthSession) -> Result<PollOutcome> {
        let url = self
            .endpoints
            .refreshes_url(self.workspace.as_deref(), &job.resource);

        let response = match session
            .send_authorized(self.transport.as_ref(), || ApiRequest::get(url.as_str()))
            .await
        {
            Ok(response) => response,
            Err(RefreshError::Http { source }) => {
                warn!(error = %source, "Refresh history request failed; will poll again");
                return Ok(PollOutcome::Unreachable {
                    reason: source.to_string(),
                });
            }
            Err(err) => return Err(err),
        };

        if response.status != StatusCode::OK {
            return Err(RefreshError::HistoryUnavailable {
                resource: job.resource.clone(),
                status: response.status,
                body: response.body,
            });
        }

        let history: RefreshHistory = serde_json::from_str(&response.body).map_err(|e| {
            RefreshError::protocol(format!(
                "malformed refresh history for dataset `{}`: {e}",
                job.resource
            ))
        })?;

        let outcome = classify(&history, &job.request_id);
        debug!(?outcome, "Polled refresh status");
        Ok(outcome)
    }
}

fn classify(history: &RefreshHistory, request_id: &str) -> PollOutcome {
    let Some(entry) = history.value.iter().find(|entry| {
        entry
            .request_id
            .as_deref()
            .is_some_and(|id| id.eq_ignore_ascii_case(request_id))
    }) else {
        return PollOutcome::Missing;
    };

    let state = JobState::from_remote(&entry.status);
    let detail = match state {
        JobState::Failed if entry.status.eq_ignore_ascii_case("Cancelled") => {
            Some("refresh was cancelled".to_string())
        }
        JobState::Failed => Some(
            entry
                .service_exception_json
                .clone()
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| NO_ERROR_DETAIL.to_string()),
        ),
        _ => None,
    };
    PollOutcome::Observed { state, detail }
}
