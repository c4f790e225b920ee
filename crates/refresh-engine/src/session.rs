//! The run's single access credential and its renewal.

use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use tracing::{info, instrument};

use crate::error::Result;
use crate::expiry::is_expiry_indicated;
use crate::token::{AccessCredential, Credentials, TokenGrant, TokenManager};
use crate::transport::{ApiRequest, ApiResponse, Transport};

struct SessionState {
    access: AccessCredential,
    refresh_token: String,
}

/// Holds the current access credential for a run.
///
/// Submitter and poller only read the current value; on an expiry signal they
/// call [`AuthSession::renew`], which replaces it before they retry.
pub struct AuthSession {
    manager: TokenManager,
    credentials: Credentials,
    state: Mutex<SessionState>,
    renewals: AtomicU32,
}

impl AuthSession {
    /// Perform the initial exchange and start a session.
    pub async fn establish(manager: TokenManager, credentials: Credentials) -> Result<Self> {
        let grant = manager.acquire(&credentials).await?;
        Ok(Self::from_grant(manager, credentials, grant))
    }

    pub fn from_grant(manager: TokenManager, credentials: Credentials, grant: TokenGrant) -> Self {
        Self {
            manager,
            credentials,
            state: Mutex::new(SessionState {
                access: grant.access,
                refresh_token: grant.refresh_token,
            }),
            renewals: AtomicU32::new(0),
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn current(&self) -> AccessCredential {
        self.state.lock().access.clone()
    }

    /// Latest refresh token, to be persisted for the next run.
    pub fn refresh_token(&self) -> String {
        self.state.lock().refresh_token.clone()
    }

    /// Number of renewals performed since the session was established.
    pub fn renewals(&self) -> u32 {
        self.renewals.load(Ordering::Relaxed)
    }

    /// Exchange the latest refresh token for a new access credential.
    #[instrument(skip(self))]
    pub async fn renew(&self) -> Result<AccessCredential> {
        let refresh_token = self.refresh_token();
        let grant = self.manager.exchange(&self.credentials, &refresh_token).await?;
        let access = grant.access.clone();

        {
            let mut state = self.state.lock();
            state.access = grant.access;
            state.refresh_token = grant.refresh_token;
        }
        self.renewals.fetch_add(1, Ordering::Relaxed);
        info!("Access token renewed");
        Ok(access)
    }

    /// Current credential, renewed first when it is about to expire.
    pub async fn valid(&self) -> Result<AccessCredential> {
        let access = self.current();
        if access.is_expired() {
            info!(expires_at = %access.expires_at(), "Access token is about to expire");
            return self.renew().await;
        }
        Ok(access)
    }

    /// Send an authorized request, renewing once and resending on an expiry signal.
    ///
    /// Any other response, including a second expiry signal, is returned to
    /// the caller unchanged.
    pub async fn send_authorized<F>(
        &self,
        transport: &dyn Transport,
        build: F,
    ) -> Result<ApiResponse>
    where
        F: Fn() -> ApiRequest,
    {
        let access = self.valid().await?;
        let response = transport
            .send(build().with_authorization(access.authorization_header()))
            .await?;

        if !is_expiry_indicated(response.status, &response.body) {
            return Ok(response);
        }

        info!("Remote call rejected with an expired token; renewing");
        let access = self.renew().await?;
        transport
            .send(build().with_authorization(access.authorization_header()))
            .await
    }
}
