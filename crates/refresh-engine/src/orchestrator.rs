//! Run orchestration: submission, optional polling, aggregation.
//!
//! A run moves through three phases:
//! 1. **Submit** every configured dataset in order. Accepted refreshes become
//!    [`RefreshJob`]s in the active [`JobSet`]; rejected ones are recorded as
//!    submission failures and never polled.
//! 2. **Decide**: without `wait`, every accepted refresh counts as succeeded.
//! 3. **Poll** the active set once per pass, sleeping `poll_interval` between
//!    passes, until it is empty or the deadline passes. Jobs still running at
//!    the deadline are reported as timed out, distinct from failed. The
//!    deadline is fixed when the run starts, so submission retries count
//!    against it.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{EngineConfig, validate_resources};
use crate::error::Result;
use crate::jobs::{JobSet, JobState, RefreshJob, ResourceFailure, RunReport};
use crate::poll::{PollOutcome, StatusPoller};
use crate::session::AuthSession;
use crate::submit::RefreshSubmitter;
use crate::transport::Transport;

const MISSING_FROM_HISTORY: &str =
    "request id not found in refresh history; outcome could not be determined";

/// Run-level policy knobs.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub wait: bool,
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub fail_fast: bool,
}

impl From<&EngineConfig> for RunSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            wait: config.wait,
            timeout: config.timeout,
            poll_interval: config.poll_interval,
            fail_fast: config.fail_fast,
        }
    }
}

pub struct Orchestrator {
    submitter: RefreshSubmitter,
    poller: StatusPoller,
    resources: Vec<String>,
    settings: RunSettings,
}

impl Orchestrator {
    pub fn new(config: &EngineConfig, transport: Arc<dyn Transport>) -> Self {
        let workspace = config.workspace().map(str::to_owned);
        Self {
            submitter: RefreshSubmitter::new(
                Arc::clone(&transport),
                config.endpoints.clone(),
                workspace.clone(),
                config.retry.clone(),
                config.notify_option,
            ),
            poller: StatusPoller::new(transport, config.endpoints.clone(), workspace),
            resources: config.resources.clone(),
            settings: RunSettings::from(config),
        }
    }

    pub fn from_parts(
        submitter: RefreshSubmitter,
        poller: StatusPoller,
        resources: Vec<String>,
        settings: RunSettings,
    ) -> Self {
        Self {
            submitter,
            poller,
            resources,
            settings,
        }
    }

    /// Execute one run.
    ///
    /// Returns `Err` only for run-aborting errors (authentication, unreadable
    /// refresh history, invalid configuration). Dataset-level failures,
    /// timeouts and fail-fast aborts are reported in the [`RunReport`]; use
    /// [`RunReport::into_result`] to turn a failing report into an error.
    pub async fn run(&self, session: &AuthSession) -> Result<RunReport> {
        let mut report = RunReport::default();
        self.execute(session, &mut report).await?;
        Ok(report)
    }

    /// Like [`Orchestrator::run`], but fills a caller-owned report. When a
    /// run-aborting error is returned, `report` still holds every dataset
    /// settled before the abort.
    #[instrument(skip_all, fields(datasets = self.resources.len(), wait = self.settings.wait))]
    pub async fn execute(&self, session: &AuthSession, report: &mut RunReport) -> Result<()> {
        validate_resources(&self.resources)?;

        // The timeout covers the whole run, submission retries included.
        let deadline = Instant::now() + self.settings.timeout;
        let jobs = self.submit_all(session, report).await?;

        if !self.settings.wait {
            report.succeeded.extend(jobs.resources());
            info!(
                submitted = report.succeeded.len(),
                failed = report.submission_failed.len(),
                "Refreshes submitted; not waiting for completion"
            );
            return Ok(());
        }

        self.poll_until_settled(jobs, deadline, session, report).await
    }

    async fn submit_all(&self, session: &AuthSession, report: &mut RunReport) -> Result<JobSet> {
        info!(datasets = ?self.resources, "Submitting dataset refreshes");
        let mut jobs = JobSet::new();
        for resource in &self.resources {
            match self.submitter.submit(resource, session).await {
                Ok(request_id) => jobs.push(RefreshJob::new(resource.as_str(), request_id)),
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    error!(resource = %resource, error = %err, "Failed to submit dataset refresh");
                    report
                        .submission_failed
                        .push(ResourceFailure::new(resource.as_str(), err.to_string()));
                }
            }
        }
        Ok(jobs)
    }

    async fn poll_until_settled(
        &self,
        mut jobs: JobSet,
        deadline: Instant,
        session: &AuthSession,
        report: &mut RunReport,
    ) -> Result<()> {
        let mut pass = 0u32;

        while !jobs.is_empty() && Instant::now() < deadline {
            pass += 1;
            debug!(pass, active = jobs.len(), "Polling refresh status");

            let mut still_running = JobSet::new();
            let mut remaining = jobs.into_iter();
            while let Some(mut job) = remaining.next() {
                match self.poller.poll(&job, session).await? {
                    PollOutcome::Observed { state, detail } => {
                        job.state = state;
                        match state {
                            JobState::Running => still_running.push(job),
                            JobState::Completed => {
                                info!(resource = %job.resource, "Dataset refresh completed");
                                report.succeeded.push(job.resource);
                            }
                            JobState::Disabled => {
                                info!(resource = %job.resource, "Dataset refresh is disabled");
                                report.disabled.push(job.resource);
                            }
                            JobState::Failed => {
                                let failure = ResourceFailure::new(
                                    job.resource,
                                    detail.unwrap_or_default(),
                                );
                                error!(
                                    resource = %failure.resource,
                                    detail = %failure.detail,
                                    "Dataset refresh failed"
                                );
                                report.failed.push(failure.clone());

                                if self.settings.fail_fast {
                                    report.pending.extend(still_running.resources());
                                    report.pending.extend(remaining.by_ref().map(|j| j.resource));
                                    warn!(
                                        resource = %failure.resource,
                                        pending = ?report.pending,
                                        "Aborting run after the first failed refresh"
                                    );
                                    report.aborted_by = Some(failure);
                                    return Ok(());
                                }
                            }
                        }
                    }
                    PollOutcome::Missing => {
                        warn!(
                            resource = %job.resource,
                            request_id = %job.request_id,
                            "Refresh request missing from history; giving up on it"
                        );
                        report
                            .failed
                            .push(ResourceFailure::new(job.resource, MISSING_FROM_HISTORY));
                    }
                    PollOutcome::Unreachable { .. } => still_running.push(job),
                }
            }
            jobs = still_running;

            info!(
                running = ?jobs.resources(),
                refreshed = ?report.succeeded,
                failed = report.failed.len(),
                "Polling pass finished"
            );

            if jobs.is_empty() {
                break;
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            tokio::time::sleep(self.settings.poll_interval.min(deadline - now)).await;
        }

        if !jobs.is_empty() {
            let timed_out = jobs.resources();
            warn!(
                datasets = ?timed_out,
                timeout_secs = self.settings.timeout.as_secs(),
                "Stopped waiting for refreshes that are still running"
            );
            report.timed_out.extend(timed_out);
        }
        Ok(())
    }
}
