//! Job records, the active job set, and the run report.

use std::fmt;

use serde::Serialize;

use crate::error::{RefreshError, Result};

/// State of one submitted refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobState {
    /// Accepted and not yet settled; also covers the remote `Unknown` status.
    Running,
    Completed,
    Failed,
    /// The dataset's refresh is disabled; settled without counting as a failure.
    Disabled,
}

impl JobState {
    /// Map a remote refresh-history status string.
    pub fn from_remote(status: &str) -> Self {
        match status {
            s if s.eq_ignore_ascii_case("Completed") => Self::Completed,
            s if s.eq_ignore_ascii_case("Failed") || s.eq_ignore_ascii_case("Cancelled") => {
                Self::Failed
            }
            s if s.eq_ignore_ascii_case("Disabled") => Self::Disabled,
            _ => Self::Running,
        }
    }

    #[inline]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Running => "Running",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Disabled => "Disabled",
        };
        f.write_str(name)
    }
}

/// Local record of one in-flight remote refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshJob {
    pub resource: String,
    pub request_id: String,
    pub state: JobState,
}

impl RefreshJob {
    pub fn new(resource: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            request_id: request_id.into(),
            state: JobState::Running,
        }
    }
}

/// Jobs still waiting for a terminal state, in configuration order.
#[derive(Debug, Clone, Default)]
pub struct JobSet {
    jobs: Vec<RefreshJob>,
}

impl JobSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, job: RefreshJob) {
        self.jobs.push(job);
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RefreshJob> {
        self.jobs.iter()
    }

    pub fn resources(&self) -> Vec<String> {
        self.jobs.iter().map(|j| j.resource.clone()).collect()
    }
}

impl IntoIterator for JobSet {
    type Item = RefreshJob;
    type IntoIter = std::vec::IntoIter<RefreshJob>;

    fn into_iter(self) -> Self::IntoIter {
        self.jobs.into_iter()
    }
}

impl FromIterator<RefreshJob> for JobSet {
    fn from_iter<I: IntoIterator<Item = RefreshJob>>(iter: I) -> Self {
        Self {
            jobs: iter.into_iter().collect(),
        }
    }
}

/// A dataset together with why it did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceFailure {
    pub resource: String,
    pub detail: String,
}

impl ResourceFailure {
    pub fn new(resource: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            detail: detail.into(),
        }
    }
}

/// Outcome of one run.
///
/// Every configured dataset ends up in exactly one of `succeeded`, `failed`,
/// `submission_failed`, `timed_out`, `disabled` or `pending`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<ResourceFailure>,
    pub submission_failed: Vec<ResourceFailure>,
    pub timed_out: Vec<String>,
    pub disabled: Vec<String>,
    /// Still running when a fail-fast abort stopped the run.
    pub pending: Vec<String>,
    /// The failure that triggered a fail-fast abort.
    pub aborted_by: Option<ResourceFailure>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
            && self.submission_failed.is_empty()
            && self.timed_out.is_empty()
            && self.pending.is_empty()
            && self.aborted_by.is_none()
    }

    /// Number of datasets accounted for.
    pub fn total(&self) -> usize {
        self.succeeded.len()
            + self.failed.len()
            + self.submission_failed.len()
            + self.timed_out.len()
            + self.disabled.len()
            + self.pending.len()
    }

    /// Short human-readable description of everything that went wrong.
    pub fn failure_summary(&self) -> String {
        let mut parts = Vec::new();
        if !self.submission_failed.is_empty() {
            parts.push(format!(
                "not submitted: [{}]",
                describe_failures(&self.submission_failed)
            ));
        }
        if !self.failed.is_empty() {
            parts.push(format!("failed: [{}]", describe_failures(&self.failed)));
        }
        if !self.timed_out.is_empty() {
            parts.push(format!(
                "timed out (still running when polling stopped): [{}]",
                self.timed_out.join(", ")
            ));
        }
        if !self.pending.is_empty() {
            parts.push(format!(
                "not completed (run aborted): [{}]",
                self.pending.join(", ")
            ));
        }
        parts.join("; ")
    }

    /// Turn a failing report into the matching error.
    pub fn into_result(self) -> Result<Self> {
        if let Some(abort) = &self.aborted_by {
            return Err(RefreshError::FailFast {
                resource: abort.resource.clone(),
                detail: abort.detail.clone(),
            });
        }
        if self.is_success() {
            return Ok(self);
        }
        if self.failed.is_empty() && self.submission_failed.is_empty() && self.pending.is_empty() {
            return Err(RefreshError::Timeout {
                resources: self.timed_out,
            });
        }
        Err(RefreshError::RunFailed {
            summary: self.failure_summary(),
        })
    }
}

fn describe_failures(failures: &[ResourceFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.resource, f.detail))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_statuses_map_to_states() {
        assert_eq!(JobState::from_remote("Completed"), JobState::Completed);
        assert_eq!(JobState::from_remote("Failed"), JobState::Failed);
        assert_eq!(JobState::from_remote("Cancelled"), JobState::Failed);
        assert_eq!(JobState::from_remote("Disabled"), JobState::Disabled);
        assert_eq!(JobState::from_remote("Unknown"), JobState::Running);
        assert_eq!(JobState::from_remote("InProgress"), JobState::Running);
        assert_eq!(JobState::from_remote(""), JobState::Running);
    }

    #[test]
    fn only_running_is_non_terminal() {
        assert!(!JobState::Running.is_terminal());
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(JobState::Disabled.is_terminal());
    }

    #[test]
    fn disabled_datasets_do_not_fail_the_run() {
        let report = RunReport {
            succeeded: vec!["a".to_string()],
            disabled: vec!["b".to_string()],
            ..Default::default()
        };
        assert!(report.is_success());
        assert_eq!(report.total(), 2);
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn timeouts_alone_produce_a_timeout_error() {
        let report = RunReport {
            timed_out: vec!["a".to_string()],
            ..Default::default()
        };
        let err = report.into_result().unwrap_err();
        assert!(matches!(err, RefreshError::Timeout { .. }));
    }

    #[test]
    fn mixed_failures_are_summarized_by_category() {
        let report = RunReport {
            failed: vec![ResourceFailure::new("a", "capacity exceeded")],
            submission_failed: vec![ResourceFailure::new("b", "ItemNotFound")],
            timed_out: vec!["c".to_string()],
            ..Default::default()
        };
        let message = report.into_result().unwrap_err().to_string();
        assert!(message.contains("not submitted: [b (ItemNotFound)]"));
        assert!(message.contains("failed: [a (capacity exceeded)]"));
        assert!(message.contains("timed out"));
    }

    #[test]
    fn fail_fast_abort_reports_the_triggering_dataset() {
        let report = RunReport {
            failed: vec![ResourceFailure::new("b", "boom")],
            pending: vec!["a".to_string()],
            aborted_by: Some(ResourceFailure::new("b", "boom")),
            ..Default::default()
        };
        let err = report.into_result().unwrap_err();
        assert_eq!(err.to_string(), "dataset `b` finished with error boom");
    }

    #[test]
    fn job_set_preserves_order() {
        let set: JobSet = ["a", "b", "a"]
            .iter()
            .enumerate()
            .map(|(i, r)| RefreshJob::new(*r, format!("req-{i}")))
            .collect();
        assert_eq!(set.resources(), vec!["a", "b", "a"]);
        assert!(set.iter().all(|j| j.state == JobState::Running));
    }
}
