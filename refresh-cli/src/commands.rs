use std::sync::Arc;

use refresh_engine::{
    AuthSession, DatasetCatalog, Orchestrator, ReqwestTransport, RunReport, TokenManager,
    Transport,
};
use tracing::{error, info, warn};

use crate::config::{AppConfig, RunOverrides};
use crate::error::Result;
use crate::state::StateStore;

pub struct CommandExecutor {
    config: AppConfig,
    state: StateStore,
    transport: Arc<dyn Transport>,
}

impl CommandExecutor {
    pub fn new(config: AppConfig, state: StateStore) -> Result<Self> {
        let transport = Arc::new(ReqwestTransport::new(config.request_timeout())?);
        Ok(Self::with_transport(config, state, transport))
    }

    pub fn with_transport(
        config: AppConfig,
        state: StateStore,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            config,
            state,
            transport,
        }
    }

    /// Exchange the refresh token and persist the rotated one right away, so a
    /// crash later in the run does not strand a retired token on disk.
    async fn open_session(&self) -> Result<AuthSession> {
        let credentials = self.state.resolve(self.config.credentials()?);
        let manager = TokenManager::new(
            Arc::clone(&self.transport),
            self.config.endpoints(),
            self.config.retry_policy(),
        );
        let session = AuthSession::establish(manager, credentials).await?;
        self.state.persist(&session)?;
        Ok(session)
    }

    /// Run one refresh cycle and return its report.
    ///
    /// A failing report is returned as `Ok`; the caller decides how to
    /// surface it.
    pub async fn run_refresh(&self, overrides: &RunOverrides) -> Result<RunReport> {
        let engine = self.config.engine_config(overrides);
        engine.validate()?;

        let session = self.open_session().await?;
        let orchestrator = Orchestrator::new(&engine, Arc::clone(&self.transport));
        let mut report = RunReport::default();
        let outcome = orchestrator.execute(&session, &mut report).await;

        if session.renewals() > 0 {
            info!(renewals = session.renewals(), "Access token was renewed during the run");
        }
        if let Err(e) = self.state.persist(&session) {
            warn!(error = %e, "Failed to persist the latest refresh token");
        }

        if let Err(e) = outcome {
            error!(error = %e, "Run aborted");
            log_report(&report);
            return Err(e.into());
        }
        log_report(&report);
        Ok(report)
    }

    pub async fn list_datasets(&self, json: bool) -> Result<()> {
        let session = self.open_session().await?;
        let workspace = self
            .config
            .refresh
            .workspace
            .clone()
            .filter(|w| !w.trim().is_empty());
        let catalog = DatasetCatalog::new(
            Arc::clone(&self.transport),
            self.config.endpoints(),
            workspace,
        );
        let datasets = catalog.list(&session).await?;

        if json {
            println!("{}", serde_json::to_string_pretty(&datasets)?);
        } else if datasets.is_empty() {
            println!("No datasets found");
        } else {
            let width = datasets.iter().map(|d| d.id.len()).max().unwrap_or(0);
            for dataset in &datasets {
                println!("{:<width$}  {}", dataset.id, dataset.name);
            }
        }
        Ok(())
    }
}

fn log_report(report: &RunReport) {
    info!(
        succeeded = ?report.succeeded,
        disabled = ?report.disabled,
        "Refresh run finished"
    );
    for failure in report.submission_failed.iter().chain(&report.failed) {
        error!(resource = %failure.resource, detail = %failure.detail, "Dataset did not refresh");
    }
    if !report.timed_out.is_empty() {
        warn!(datasets = ?report.timed_out, "Timed out waiting for datasets");
    }
    if !report.pending.is_empty() {
        warn!(datasets = ?report.pending, "Datasets left running after abort");
    }
}
