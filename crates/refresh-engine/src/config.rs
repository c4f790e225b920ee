use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RefreshError, Result};
use crate::retry::RetryPolicy;

pub const DEFAULT_TOKEN_URL: &str = "https://login.microsoftonline.com/common/oauth2/token";
pub const DEFAULT_API_BASE: &str = "https://api.powerbi.com/v1.0/myorg";
pub const DEFAULT_TOKEN_RESOURCE: &str = "https://analysis.windows.net/powerbi/api";

/// Remote endpoints used by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub token_url: String,
    pub api_base: String,
    /// OAuth `resource` the access token is requested for.
    pub token_resource: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            token_url: DEFAULT_TOKEN_URL.to_owned(),
            api_base: DEFAULT_API_BASE.to_owned(),
            token_resource: DEFAULT_TOKEN_RESOURCE.to_owned(),
        }
    }
}

impl Endpoints {
    fn scope(&self, workspace: Option<&str>) -> String {
        let base = self.api_base.trim_end_matches('/');
        match workspace.filter(|w| !w.is_empty()) {
            Some(workspace) => format!("{base}/groups/{}", urlencoding::encode(workspace)),
            None => base.to_owned(),
        }
    }

    /// `GET` lists datasets of the workspace.
    pub fn datasets_url(&self, workspace: Option<&str>) -> String {
        format!("{}/datasets", self.scope(workspace))
    }

    /// `POST` triggers a refresh, `GET` returns the refresh history.
    pub fn refreshes_url(&self, workspace: Option<&str>, dataset: &str) -> String {
        format!(
            "{}/datasets/{}/refreshes",
            self.scope(workspace),
            urlencoding::encode(dataset)
        )
    }
}

/// Mail notification requested with each refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotifyOption {
    #[default]
    MailOnFailure,
    MailOnCompletion,
    NoNotification,
}

impl NotifyOption {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MailOnFailure => "MailOnFailure",
            Self::MailOnCompletion => "MailOnCompletion",
            Self::NoNotification => "NoNotification",
        }
    }
}

/// Everything the engine needs for one run.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Workspace (group) id; `None` targets "My workspace".
    pub workspace: Option<String>,
    /// Dataset ids in the order they are submitted and polled.
    pub resources: Vec<String>,
    pub wait: bool,
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub fail_fast: bool,
    pub notify_option: NotifyOption,
    pub retry: RetryPolicy,
    pub endpoints: Endpoints,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workspace: None,
            resources: Vec::new(),
            wait: false,
            timeout: Duration::from_secs(7200),
            poll_interval: Duration::from_secs(30),
            fail_fast: true,
            notify_option: NotifyOption::default(),
            retry: RetryPolicy::default(),
            endpoints: Endpoints::default(),
        }
    }
}

impl EngineConfig {
    /// Reject configurations that cannot start a run.
    pub fn validate(&self) -> Result<()> {
        validate_resources(&self.resources)?;
        if self.wait && self.poll_interval.is_zero() {
            return Err(RefreshError::configuration(
                "poll interval must be greater than zero when waiting for completion",
            ));
        }
        Ok(())
    }

    pub fn workspace(&self) -> Option<&str> {
        self.workspace.as_deref().filter(|w| !w.is_empty())
    }
}

pub(crate) fn validate_resources(resources: &[String]) -> Result<()> {
    if resources.is_empty() {
        return Err(RefreshError::NoResources);
    }
    if let Some(position) = resources.iter().position(|r| r.trim().is_empty()) {
        return Err(RefreshError::configuration(format!(
            "dataset #{} has an empty id",
            position + 1
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_without_workspace_have_no_group_prefix() {
        let endpoints = Endpoints::default();
        assert_eq!(
            endpoints.refreshes_url(None, "abc"),
            "https://api.powerbi.com/v1.0/myorg/datasets/abc/refreshes"
        );
        assert_eq!(
            endpoints.refreshes_url(Some(""), "abc"),
            "https://api.powerbi.com/v1.0/myorg/datasets/abc/refreshes"
        );
    }

    #[test]
    fn urls_with_workspace_are_scoped_to_the_group() {
        let endpoints = Endpoints {
            api_base: "http://localhost:8080/v1.0/myorg/".to_string(),
            ..Default::default()
        };
        assert_eq!(
            endpoints.datasets_url(Some("ws-1")),
            "http://localhost:8080/v1.0/myorg/groups/ws-1/datasets"
        );
        assert_eq!(
            endpoints.refreshes_url(Some("ws-1"), "ds 1"),
            "http://localhost:8080/v1.0/myorg/groups/ws-1/datasets/ds%201/refreshes"
        );
    }

    #[test]
    fn validate_rejects_empty_resource_lists() {
        let config = EngineConfig::default();
        assert!(matches!(config.validate(), Err(RefreshError::NoResources)));
    }

    #[test]
    fn validate_rejects_blank_ids() {
        let config = EngineConfig {
            resources: vec!["a".to_string(), " ".to_string()],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("dataset #2"));
    }

    #[test]
    fn validate_rejects_zero_interval_when_waiting() {
        let config = EngineConfig {
            resources: vec!["a".to_string()],
            wait: true,
            poll_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(RefreshError::Configuration { .. })
        ));
    }
}
