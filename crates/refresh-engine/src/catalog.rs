//! Dataset listing for a workspace.

use std::sync::Arc;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::config::Endpoints;
use crate::error::{RefreshError, Result};
use crate::session::AuthSession;
use crate::transport::{ApiRequest, Transport};

/// A dataset as listed by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Deserialize)]
struct DatasetList {
    value: Vec<DatasetSummary>,
}

pub struct DatasetCatalog {
    transport: Arc<dyn Transport>,
    endpoints: Endpoints,
    workspace: Option<String>,
}

impl DatasetCatalog {
    pub fn new(transport: Arc<dyn Transport>, endpoints: Endpoints, workspace: Option<String>) -> Self {
        Self {
            transport,
            endpoints,
            workspace,
        }
    }

    #[instrument(skip(self, session))]
    pub async fn list(&self, session: &AuthSession) -> Result<Vec<DatasetSummary>> {
        let url = self.endpoints.datasets_url(self.workspace.as_deref());
        let response = session
            .send_authorized(self.transport.as_ref(), || ApiRequest::get(url.as_str()))
            .await?;

        if response.status != StatusCode::OK {
            return Err(RefreshError::protocol(format!(
                "listing datasets failed with HTTP {}: {}",
                response.status.as_u16(),
                response.body.trim()
            )));
        }

        let list: DatasetList = serde_json::from_str(&response.body)?;
        Ok(list.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use crate::token::{Credentials, TokenManager};
    use crate::transport::ApiResponse;
    use crate::transport::fake::{QueueTransport, token};

    #[tokio::test]
    async fn lists_datasets_of_the_workspace() {
        let transport = Arc::new(QueueTransport::new(vec![
            token("at-1", "rt-1"),
            ApiResponse::new(
                StatusCode::OK,
                r#"{"value":[{"id":"d1","name":"Sales","isRefreshable":true},{"id":"d2","name":"Ops"}]}"#,
            ),
        ]));
        let manager = TokenManager::new(
            transport.clone(),
            Endpoints::default(),
            RetryPolicy::default(),
        );
        let credentials = Credentials {
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            refresh_token: "rt-0".to_string(),
            identity: None,
        };
        let session = AuthSession::establish(manager, credentials).await.unwrap();
        let catalog =
            DatasetCatalog::new(transport.clone(), Endpoints::default(), Some("ws".to_string()));

        let datasets = catalog.list(&session).await.unwrap();
        assert_eq!(datasets.len(), 2);
        assert_eq!(datasets[0].name, "Sales");
        assert!(transport.requests.lock()[1].url.ends_with("/groups/ws/datasets"));
    }
}
