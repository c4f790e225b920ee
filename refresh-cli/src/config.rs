use std::path::{Path, PathBuf};
use std::time::Duration;

use refresh_engine::config::{DEFAULT_API_BASE, DEFAULT_TOKEN_RESOURCE, DEFAULT_TOKEN_URL};
use refresh_engine::{Credentials, EngineConfig, Endpoints, NotifyOption, RetryPolicy};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AppError, Result};
use crate::state::credentials_id;

pub const ENV_CLIENT_ID: &str = "PBI_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "PBI_CLIENT_SECRET";
pub const ENV_REFRESH_TOKEN: &str = "PBI_REFRESH_TOKEN";

/// Application configuration, loaded from TOML with environment overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub auth: AuthConfig,
    pub refresh: RefreshConfig,
    pub retry: RetryConfig,
    pub endpoints: EndpointsConfig,
    pub http: HttpConfig,
}

#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
    /// Authorization payload as stored by an OAuth broker: a JSON document
    /// with a `refresh_token` field. Used when `refresh_token` is not set.
    pub token_data: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("token_data", &self.token_data.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    pub workspace: Option<String>,
    pub datasets: Vec<String>,
    /// Used when `datasets` is empty or its first entry is blank.
    pub selected_datasets: Vec<String>,
    pub wait: bool,
    pub timeout_secs: u64,
    pub interval_secs: u64,
    pub fail_fast: bool,
    pub notify_option: NotifyOption,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            workspace: None,
            datasets: Vec::new(),
            selected_datasets: Vec::new(),
            wait: false,
            timeout_secs: 7200,
            interval_secs: 30,
            fail_fast: true,
            notify_option: NotifyOption::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_secs: u64,
    pub max_delay_secs: u64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 16,
            max_delay_secs: 300,
            jitter: false,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_secs(config.base_delay_secs),
            max_delay: Duration::from_secs(config.max_delay_secs),
            jitter: config.jitter,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointsConfig {
    pub token_url: String,
    pub api_base: String,
    pub token_resource: String,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            token_url: DEFAULT_TOKEN_URL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            token_resource: DEFAULT_TOKEN_RESOURCE.to_string(),
        }
    }
}

impl From<&EndpointsConfig> for Endpoints {
    fn from(config: &EndpointsConfig) -> Self {
        Self {
            token_url: config.token_url.clone(),
            api_base: config.api_base.clone(),
            token_resource: config.token_resource.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout; 0 disables it.
    pub request_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 60,
        }
    }
}

/// Command-line overrides for a single run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOverrides {
    pub wait: Option<bool>,
    pub fail_fast: Option<bool>,
    pub timeout_secs: Option<u64>,
    pub interval_secs: Option<u64>,
    pub datasets: Vec<String>,
}

impl AppConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("pbi-refresh").join("config.toml"))
    }

    /// Load the configuration file and apply environment overrides.
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => {
                    debug!("No configuration file found, using defaults");
                    Self::default()
                }
            },
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), "Loaded configuration file");
        toml::from_str(&content).map_err(|source| AppError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Override credentials from the environment.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(client_id) = non_empty(ENV_CLIENT_ID) {
            self.auth.client_id = Some(client_id);
        }
        if let Some(client_secret) = non_empty(ENV_CLIENT_SECRET) {
            self.auth.client_secret = Some(client_secret);
        }
        if let Some(refresh_token) = non_empty(ENV_REFRESH_TOKEN) {
            self.auth.refresh_token = Some(refresh_token);
        }
    }

    /// Datasets to refresh, in configuration order.
    pub fn resources(&self) -> Vec<String> {
        let datasets = &self.refresh.datasets;
        let blank = datasets.first().is_none_or(|d| d.trim().is_empty());
        if blank {
            self.refresh.selected_datasets.clone()
        } else {
            datasets.clone()
        }
    }

    pub fn credentials(&self) -> Result<Credentials> {
        let required = |value: &Option<String>, name: &str| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_owned)
                .ok_or_else(|| AppError::invalid_config(format!("auth.{name} is not set")))
        };
        let client_id = required(&self.auth.client_id, "client_id")?;
        let client_secret = required(&self.auth.client_secret, "client_secret")?;
        let refresh_token = self.configured_refresh_token()?;

        Ok(Credentials {
            identity: Some(credentials_id(&client_id, &refresh_token)),
            client_id,
            client_secret,
            refresh_token,
        })
    }

    fn configured_refresh_token(&self) -> Result<String> {
        if let Some(token) = self.auth.refresh_token.as_deref().filter(|t| !t.is_empty()) {
            return Ok(token.to_owned());
        }

        #[derive(Deserialize)]
        struct TokenData {
            refresh_token: String,
        }

        let data = self.auth.token_data.as_deref().ok_or_else(|| {
            AppError::invalid_config("auth.refresh_token or auth.token_data must be set")
        })?;
        let parsed: TokenData = serde_json::from_str(data).map_err(|e| {
            AppError::invalid_config(format!("auth.token_data is not valid token JSON: {e}"))
        })?;
        if parsed.refresh_token.is_empty() {
            return Err(AppError::invalid_config(
                "auth.token_data contains an empty refresh_token",
            ));
        }
        Ok(parsed.refresh_token)
    }

    pub fn endpoints(&self) -> Endpoints {
        Endpoints::from(&self.endpoints)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from(&self.retry)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.http.request_timeout_secs)
    }

    pub fn engine_config(&self, overrides: &RunOverrides) -> EngineConfig {
        let refresh = &self.refresh;
        let resources = if overrides.datasets.is_empty() {
            self.resources()
        } else {
            overrides.datasets.clone()
        };

        EngineConfig {
            workspace: refresh.workspace.clone().filter(|w| !w.trim().is_empty()),
            resources,
            wait: overrides.wait.unwrap_or(refresh.wait),
            timeout: Duration::from_secs(overrides.timeout_secs.unwrap_or(refresh.timeout_secs)),
            poll_interval: Duration::from_secs(
                overrides.interval_secs.unwrap_or(refresh.interval_secs),
            ),
            fail_fast: overrides.fail_fast.unwrap_or(refresh.fail_fast),
            notify_option: refresh.notify_option,
            retry: self.retry_policy(),
            endpoints: self.endpoints(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    const SAMPLE: &str = r#"
[auth]
client_id = "app-id"
client_secret = "app-secret"
token_data = '{"refresh_token": "from-data", "token_type": "Bearer"}'

[refresh]
workspace = "ws-1"
datasets = ["a", "b"]
wait = true
interval_secs = 15
fail_fast = false

[retry]
max_attempts = 5
"#;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_sections_and_keeps_defaults() {
        let file = write_config(SAMPLE);
        let config = AppConfig::from_file(file.path()).unwrap();

        assert_eq!(config.refresh.workspace.as_deref(), Some("ws-1"));
        assert_eq!(config.refresh.timeout_secs, 7200);
        assert_eq!(config.refresh.interval_secs, 15);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_secs, 16);
        assert_eq!(config.endpoints.api_base, DEFAULT_API_BASE);
    }

    #[test]
    fn malformed_file_reports_its_path() {
        let file = write_config("[refresh\nwait = ");
        let err = AppConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, AppError::ConfigParse { .. }));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn refresh_token_comes_from_token_data() {
        let config: AppConfig = toml::from_str(SAMPLE).unwrap();
        let credentials = config.credentials().unwrap();
        assert_eq!(credentials.refresh_token, "from-data");
        assert_eq!(
            credentials.identity.as_deref(),
            Some(credentials_id("app-id", "from-data").as_str())
        );
    }

    #[test]
    fn environment_overrides_file_credentials() {
        let mut config: AppConfig = toml::from_str(SAMPLE).unwrap();
        let env: HashMap<&str, &str> = [
            (ENV_CLIENT_SECRET, "env-secret"),
            (ENV_REFRESH_TOKEN, "env-token"),
            (ENV_CLIENT_ID, ""),
        ]
        .into_iter()
        .collect();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        let credentials = config.credentials().unwrap();
        assert_eq!(credentials.client_id, "app-id");
        assert_eq!(credentials.client_secret, "env-secret");
        assert_eq!(credentials.refresh_token, "env-token");
    }

    #[test]
    fn missing_credentials_are_configuration_errors() {
        let config = AppConfig::default();
        let err = config.credentials().unwrap_err();
        assert!(err.to_string().contains("auth.client_id"));

        let mut config: AppConfig = toml::from_str(SAMPLE).unwrap();
        config.auth.token_data = Some("{}".into());
        assert!(matches!(
            config.credentials(),
            Err(AppError::InvalidConfig(_))
        ));
    }

    #[test]
    fn selected_datasets_apply_when_datasets_are_blank() {
        let mut config = AppConfig::default();
        config.refresh.datasets = vec![String::new()];
        config.refresh.selected_datasets = vec!["x".into(), "y".into()];
        assert_eq!(config.resources(), vec!["x", "y"]);

        config.refresh.datasets = vec!["a".into()];
        assert_eq!(config.resources(), vec!["a"]);
    }

    #[test]
    fn command_line_overrides_win() {
        let config: AppConfig = toml::from_str(SAMPLE).unwrap();
        let engine = config.engine_config(&RunOverrides {
            wait: Some(false),
            timeout_secs: Some(60),
            datasets: vec!["c".into()],
            ..Default::default()
        });

        assert_eq!(engine.workspace.as_deref(), Some("ws-1"));
        assert_eq!(engine.resources, vec!["c"]);
        assert!(!engine.wait);
        assert!(!engine.fail_fast);
        assert_eq!(engine.timeout, Duration::from_secs(60));
        assert_eq!(engine.poll_interval, Duration::from_secs(15));
        assert_eq!(engine.retry.max_attempts, 5);
    }
}
