//! Dataset refresh orchestration for the Power BI REST API.
//!
//! The engine exchanges an OAuth2 refresh token for an access token, triggers a
//! refresh for each configured dataset, and optionally polls the refresh
//! history until every dataset settles or a deadline passes.
//!
//! # Architecture
//!
//! - [`TokenManager`]: refresh-token exchange with retry
//! - [`AuthSession`]: the run's current access credential and its renewal
//! - [`RefreshSubmitter`]: triggers one refresh, retrying with backoff
//! - [`StatusPoller`]: classifies the status of one submitted refresh
//! - [`Orchestrator`]: drives a whole run and builds the [`RunReport`]
//!
//! All remote calls go through the [`Transport`] trait; [`ReqwestTransport`]
//! is the production implementation.

pub mod catalog;
pub mod config;
pub mod error;
pub mod expiry;
pub mod jobs;
pub mod orchestrator;
pub mod poll;
pub mod retry;
pub mod session;
pub mod submit;
pub mod token;
pub mod transport;

pub use catalog::{DatasetCatalog, DatasetSummary};
pub use config::{EngineConfig, Endpoints, NotifyOption};
pub use error::{RefreshError, Result};
pub use expiry::{RemoteError, is_expiry_indicated, parse_remote_error};
pub use jobs::{JobSet, JobState, RefreshJob, ResourceFailure, RunReport};
pub use orchestrator::{Orchestrator, RunSettings};
pub use poll::{PollOutcome, StatusPoller};
pub use retry::{RetryAction, RetryPolicy, retry_with_backoff};
pub use session::AuthSession;
pub use submit::RefreshSubmitter;
pub use token::{AccessCredential, Credentials, TokenGrant, TokenManager};
pub use transport::{ApiRequest, ApiResponse, Method, ReqwestTransport, RequestBody, Transport};
