use std::path::PathBuf;

use refresh_engine::RefreshError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Refresh(#[from] RefreshError),

    #[error("Invalid configuration file {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("State file {}: {reason}", path.display())]
    State { path: PathBuf, reason: String },
}

impl AppError {
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig(reason.into())
    }

    /// Process exit code: 1 for configuration and run outcomes the user can
    /// act on, 2 for everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::ConfigParse { .. } | AppError::InvalidConfig(_) => 1,
            AppError::Refresh(err) => match err {
                RefreshError::Auth { .. }
                | RefreshError::Configuration { .. }
                | RefreshError::NoResources
                | RefreshError::Timeout { .. }
                | RefreshError::FailFast { .. }
                | RefreshError::RunFailed { .. } => 1,
                _ => 2,
            },
            _ => 2,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_outcomes_exit_with_one() {
        let err = AppError::from(RefreshError::RunFailed {
            summary: "failed: A".into(),
        });
        assert_eq!(err.exit_code(), 1);
        assert_eq!(AppError::invalid_config("missing client_id").exit_code(), 1);
    }

    #[test]
    fn unexpected_errors_exit_with_two() {
        let err = AppError::from(RefreshError::protocol("unexpected body"));
        assert_eq!(err.exit_code(), 2);
        let io = AppError::from(std::io::Error::other("disk full"));
        assert_eq!(io.exit_code(), 2);
    }
}
