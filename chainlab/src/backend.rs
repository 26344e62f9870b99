// chainlab/src/backend.rs
//!
//! Backend: the HTTP surface component runners call out to
//!
//! Architecture:
//! - `Backend` trait: what a runner needs (completion, search, transcript,
//!   document search, file loading). Tests swap in a recording mock.
//! - `HttpBackend`: blocking `ureq` client for the `/v1` API, plus the
//!   account and application calls the CLI uses.
//!
//! Errors are normalized here so every component shows the same text:
//! `Error: <server message>` when the server answered, a fixed timeout
//! message when it did not.

use crate::casing;
use crate::chain::Application;
use crate::component::ComponentKind;
use crate::config::{Config, Timeouts};
use crate::credentials::TokenSource;
use crate::table::FileRecord;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;

pub const AUTH_HEADER: &str = "XAuthorization";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    #[error("Error: You are not logged in. Run `chainlab login` first.")]
    Unauthenticated,
    #[error("Error: {message}")]
    Http { status: u16, message: String },
    #[error("Error: No response received from the server, possible timeout.")]
    NoResponse,
    #[error("Error: {0}")]
    Transport(String),
    #[error("Error: Unexpected response from the server.")]
    Decode(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    OpenAi,
    Anthropic,
}

impl ModelProvider {
    pub fn for_kind(kind: ComponentKind) -> Option<Self> {
        match kind {
            ComponentKind::OpenAi => Some(ModelProvider::OpenAi),
            ComponentKind::Anthropic => Some(ModelProvider::Anthropic),
            _ => None,
        }
    }

    pub fn kind(&self) -> ComponentKind {
        match self {
            ModelProvider::OpenAi => ComponentKind::OpenAi,
            ModelProvider::Anthropic => ComponentKind::Anthropic,
        }
    }
}

/// One model call. `parameters` keeps the component's camelCase keys.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub provider: ModelProvider,
    pub input: String,
    pub parameters: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSearchRequest {
    pub embedding_id: String,
    pub input: String,
    pub top_n: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoginSession {
    pub token: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub id: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quota {
    pub quota_available: f64,
    #[serde(default)]
    pub quota_used: f64,
}

/// External actions a component can perform.
pub trait Backend: Send + Sync {
    fn complete(&self, request: &CompletionRequest) -> Result<String, BackendError>;

    fn google_search(&self, query: &str, num_results: u32) -> Result<String, BackendError>;

    /// Raw transcript document; the runner pretty-prints it.
    fn youtube_transcript(&self, video_url: &str) -> Result<Value, BackendError>;

    fn search_documents(&self, request: &DocumentSearchRequest) -> Result<String, BackendError>;

    fn load_file(&self, file_id: &str) -> Result<FileRecord, BackendError>;
}

// ============================================================================
// HTTP implementation
// ============================================================================

pub struct HttpBackend {
    base_url: String,
    timeouts: Timeouts,
    tokens: Arc<dyn TokenSource>,
    agent: ureq::Agent,
}

impl HttpBackend {
    pub fn new(config: &Config, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeouts: config.timeouts.clone(),
            tokens,
            agent: ureq::AgentBuilder::new().build(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn bearer(&self) -> Result<String, BackendError> {
        self.tokens
            .token()
            .filter(|token| !token.is_empty())
            .map(|token| format!("Bearer {token}"))
            .ok_or(BackendError::Unauthenticated)
    }

    fn post(
        &self,
        path: &str,
        body: &Value,
        timeout: Duration,
        authenticated: bool,
    ) -> Result<Value, BackendError> {
        let mut request = self
            .agent
            .post(&self.url(path))
            .timeout(timeout)
            .set("Content-Type", "application/json");
        if authenticated {
            request = request.set(AUTH_HEADER, &self.bearer()?);
        }

        tracing::debug!(path, "POST");
        read_json(request.send_json(body))
    }

    fn get(&self, path: &str, timeout: Duration) -> Result<Value, BackendError> {
        let request = self
            .agent
            .get(&self.url(path))
            .timeout(timeout)
            .set(AUTH_HEADER, &self.bearer()?);

        tracing::debug!(path, "GET");
        read_json(request.call())
    }

    pub fn login(&self, email: &str, password: &str) -> Result<LoginSession, BackendError> {
        let body = json!({ "email": email, "password": password });
        let response = self.post("user/login", &body, self.timeouts.default_timeout(), false)?;

        if response["success"] == Value::Bool(false) {
            return Err(BackendError::Http {
                status: 200,
                message: server_message(&response).unwrap_or_else(|| "Login failed".into()),
            });
        }
        decode(response["data"].clone())
    }

    pub fn logout(&self) -> Result<(), BackendError> {
        self.post("user/logout", &json!({}), self.timeouts.default_timeout(), true)?;
        Ok(())
    }

    /// Saves (creates or updates) an application and returns the stored record.
    pub fn save_application(&self, application: &Application) -> Result<Application, BackendError> {
        let body = application
            .to_wire()
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        let stored = self.post("app/modify", &body, self.timeouts.default_timeout(), true)?;
        Application::from_wire(stored).map_err(|e| BackendError::Decode(e.to_string()))
    }

    pub fn load_application(&self, app_id: &str) -> Result<Application, BackendError> {
        let record = self.get(&format!("app/load/{app_id}"), self.timeouts.default_timeout())?;
        Application::from_wire(record).map_err(|e| BackendError::Decode(e.to_string()))
    }

    pub fn check_quota(&self) -> Result<Quota, BackendError> {
        decode(self.get("quota/check", self.timeouts.default_timeout())?)
    }
}

impl Backend for HttpBackend {
    fn complete(&self, request: &CompletionRequest) -> Result<String, BackendError> {
        let body = json!({
            "model_provider": request.provider,
            "input": request.input,
            "parameters": casing::decamelize_keys(Value::Object(request.parameters.clone())),
        });
        let timeout = self.timeouts.for_kind(request.provider.kind());
        let response = self.post("task/complete", &body, timeout, true)?;
        result_text(&response)
    }

    fn google_search(&self, query: &str, num_results: u32) -> Result<String, BackendError> {
        let body = json!({ "query": query, "num_results": num_results });
        let timeout = self.timeouts.for_kind(ComponentKind::GoogleSearch);
        let response = self.post("task/google_search", &body, timeout, true)?;
        result_text(&response)
    }

    fn youtube_transcript(&self, video_url: &str) -> Result<Value, BackendError> {
        let body = json!({ "video_url": video_url });
        let timeout = self.timeouts.for_kind(ComponentKind::YoutubeTranscript);
        let mut response = self.post("task/youtube_transcript", &body, timeout, true)?;
        match response.get_mut("result") {
            Some(result) => Ok(result.take()),
            None => Err(BackendError::Decode("missing `result`".into())),
        }
    }

    fn search_documents(&self, request: &DocumentSearchRequest) -> Result<String, BackendError> {
        let body = json!({
            "embedding_id": request.embedding_id,
            "input": request.input,
            "input_variables": {},
            "parameters": { "top_n": request.top_n },
        });
        let timeout = self.timeouts.for_kind(ComponentKind::DocSearch);
        let response = self.post("embedding/search", &body, timeout, true)?;
        result_text(&response)
    }

    fn load_file(&self, file_id: &str) -> Result<FileRecord, BackendError> {
        let response = self.get(&format!("file/load/{file_id}"), self.timeouts.default_timeout())?;
        decode(response["file"].clone())
    }
}

// ============================================================================
// Response handling
// ============================================================================

fn read_json(response: Result<ureq::Response, ureq::Error>) -> Result<Value, BackendError> {
    match response {
        Ok(response) => response.into_json::<Value>().map_err(|e| {
            tracing::error!(error = %e, "backend returned a body that is not JSON");
            BackendError::Decode(e.to_string())
        }),
        Err(ureq::Error::Status(status, response)) => {
            let status_text = response.status_text().to_string();
            let message = response
                .into_string()
                .ok()
                .and_then(|body| serde_json::from_str::<Value>(&body).ok())
                .and_then(|body| server_message(&body))
                .unwrap_or_else(|| {
                    if status_text.is_empty() {
                        format!("HTTP {status}")
                    } else {
                        status_text
                    }
                });
            tracing::warn!(status, %message, "backend request failed");
            Err(BackendError::Http { status, message })
        }
        Err(ureq::Error::Transport(transport)) => {
            use ureq::ErrorKind;
            match transport.kind() {
                ErrorKind::Dns
                | ErrorKind::ConnectionFailed
                | ErrorKind::Io
                | ErrorKind::ProxyConnect
                | ErrorKind::TooManyRedirects
                | ErrorKind::BadStatus
                | ErrorKind::BadHeader => {
                    tracing::warn!(error = %transport, "no response from backend");
                    Err(BackendError::NoResponse)
                }
                _ => Err(BackendError::Transport(transport.to_string())),
            }
        }
    }
}

/// `message`, then `error`, then `msg`: the keys the backend reports problems under.
fn server_message(body: &Value) -> Option<String> {
    ["message", "error", "msg"]
        .iter()
        .filter_map(|key| body.get(*key))
        .find_map(|value| match value {
            Value::String(text) if !text.is_empty() => Some(text.clone()),
            _ => None,
        })
}

fn result_text(response: &Value) -> Result<String, BackendError> {
    match response.get("result") {
        Some(Value::String(text)) => Ok(text.clone()),
        Some(Value::Null) | None => {
            tracing::error!("backend response has no `result`");
            Err(BackendError::Decode("missing `result`".into()))
        }
        Some(other) => serde_json::to_string_pretty(other)
            .map_err(|e| BackendError::Decode(e.to_string())),
    }
}

fn decode<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, BackendError> {
    serde_json::from_value(value).map_err(|e| {
        tracing::error!(error = %e, "unexpected backend payload");
        BackendError::Decode(e.to_string())
    })
}
