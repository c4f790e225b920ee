//! Scripted transport shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use refresh_engine::{
    ApiRequest, ApiResponse, AuthSession, Credentials, EngineConfig, Endpoints, Method,
    RefreshError, Result, RetryPolicy, TokenManager, Transport,
};
use reqwest::StatusCode;
use reqwest::header::HeaderValue;

pub const TOKEN_URL: &str = "https://login.test/common/oauth2/token";
pub const API_BASE: &str = "https://api.test/v1.0/myorg";

/// What a route answers with.
#[derive(Clone)]
pub enum Reply {
    Response(ApiResponse),
    /// The request never reached the service.
    ConnectionError,
}

impl From<ApiResponse> for Reply {
    fn from(response: ApiResponse) -> Self {
        Reply::Response(response)
    }
}

struct Route {
    method: Method,
    url_suffix: String,
    /// Consumed in order; the last reply repeats.
    replies: VecDeque<Reply>,
}

/// Routes requests by method and URL suffix to canned responses.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<Vec<Route>>,
    log: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on(&self, method: Method, url_suffix: &str, responses: Vec<ApiResponse>) {
        self.on_replies(
            method,
            url_suffix,
            responses.into_iter().map(Reply::from).collect(),
        );
    }

    pub fn on_replies(&self, method: Method, url_suffix: &str, replies: Vec<Reply>) {
        assert!(!replies.is_empty(), "a route needs at least one reply");
        self.routes.lock().push(Route {
            method,
            url_suffix: url_suffix.to_string(),
            replies: replies.into(),
        });
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.log.lock().clone()
    }

    pub fn count(&self, method: Method, url_suffix: &str) -> usize {
        self.log
            .lock()
            .iter()
            .filter(|r| r.method == method && r.url.ends_with(url_suffix))
            .count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        self.log.lock().push(request.clone());
        let mut routes = self.routes.lock();
        let route = routes
            .iter_mut()
            .find(|r| r.method == request.method && request.url.ends_with(&r.url_suffix));
        let reply = match route {
            Some(route) if route.replies.len() > 1 => route.replies.pop_front(),
            Some(route) => route.replies.front().cloned(),
            None => None,
        };
        match reply {
            Some(Reply::Response(response)) => Ok(response),
            Some(Reply::ConnectionError) => Err(RefreshError::Http {
                source: connection_error(),
            }),
            None => Ok(ApiResponse::new(StatusCode::NOT_FOUND, "no route")),
        }
    }
}

/// A genuine `reqwest::Error`; building a request for a URL without a host
/// fails before any I/O.
fn connection_error() -> reqwest::Error {
    refresh_engine::transport::install_rustls_provider();
    reqwest::Client::builder()
        .build()
        .expect("client")
        .get("http://")
        .build()
        .expect_err("a URL without a host is rejected")
}

pub fn token(access: &str) -> ApiResponse {
    ApiResponse::new(
        StatusCode::OK,
        serde_json::json!({
            "access_token": access,
            "refresh_token": format!("refresh-for-{access}"),
            "expires_in": "3599",
        })
        .to_string(),
    )
}

pub fn accepted(request_id: &str) -> ApiResponse {
    let mut response = ApiResponse::new(StatusCode::ACCEPTED, "");
    response.headers.insert(
        "RequestId",
        HeaderValue::from_str(request_id).expect("valid header"),
    );
    response
}

pub fn rejected(code: &str, message: &str) -> ApiResponse {
    ApiResponse::new(
        StatusCode::BAD_REQUEST,
        serde_json::json!({ "error": { "code": code, "message": message } }).to_string(),
    )
}

pub fn token_expired() -> ApiResponse {
    ApiResponse::new(
        StatusCode::FORBIDDEN,
        r#"{"error":{"code":"TokenExpired","message":"Access token has expired, resubmit with a new access token"}}"#,
    )
}

/// History document with `(request id, status)` entries.
pub fn history(entries: &[(&str, &str)]) -> ApiResponse {
    let value: Vec<_> = entries
        .iter()
        .map(|(id, status)| serde_json::json!({ "requestId": id, "status": status }))
        .collect();
    ApiResponse::new(
        StatusCode::OK,
        serde_json::json!({ "value": value }).to_string(),
    )
}

pub fn failed_history(request_id: &str, detail: &str) -> ApiResponse {
    ApiResponse::new(
        StatusCode::OK,
        serde_json::json!({
            "value": [{
                "requestId": request_id,
                "status": "Failed",
                "serviceExceptionJson": detail,
            }]
        })
        .to_string(),
    )
}

pub fn refreshes(dataset: &str) -> String {
    format!("/datasets/{dataset}/refreshes")
}

pub fn endpoints() -> Endpoints {
    Endpoints {
        token_url: TOKEN_URL.to_string(),
        api_base: API_BASE.to_string(),
        ..Default::default()
    }
}

pub fn config(resources: &[&str]) -> EngineConfig {
    EngineConfig {
        resources: resources.iter().map(|r| r.to_string()).collect(),
        timeout: Duration::from_secs(600),
        poll_interval: Duration::from_secs(10),
        endpoints: endpoints(),
        ..Default::default()
    }
}

pub fn credentials() -> Credentials {
    Credentials {
        client_id: "client".to_string(),
        client_secret: "secret".to_string(),
        refresh_token: "initial-refresh".to_string(),
        identity: None,
    }
}

pub async fn session(transport: Arc<ScriptedTransport>) -> AuthSession {
    let manager = TokenManager::new(transport, endpoints(), RetryPolicy::default());
    AuthSession::establish(manager, credentials())
        .await
        .expect("initial token exchange")
}
