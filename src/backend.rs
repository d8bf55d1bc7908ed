use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::dictionary::{DictOp, PathEntry};
use crate::types::{Credentials, RawPayload, ScanMode, ScanRequest};

const FALLBACK_MESSAGE: &str = "An unexpected error occurred during the scan.";

/// One field-level complaint from the backend's request validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub location: Vec<String>,
    pub message: String,
}

/// Whatever went wrong talking to the backend, reduced to one of three shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendFailure {
    Validation(Vec<FieldViolation>),
    Message(String),
    Unrecognized(Value),
}

impl BackendFailure {
    /// Classify a `detail` value from an error body.
    pub fn from_detail(detail: Value) -> Self {
        match detail {
            Value::String(s) => BackendFailure::Message(s),
            Value::Array(items) => {
                let mut violations = Vec::with_capacity(items.len());
                for item in &items {
                    match field_violation(item) {
                        Some(v) => violations.push(v),
                        None => return BackendFailure::Unrecognized(Value::Array(items)),
                    }
                }
                BackendFailure::Validation(violations)
            }
            other => BackendFailure::Unrecognized(other),
        }
    }

    /// Single human-readable line for the `Failed` state.
    pub fn message(&self) -> String {
        match self {
            BackendFailure::Validation(v) if !v.is_empty() => v
                .iter()
                .map(|f| format!("{} - {}", f.location.join("."), f.message))
                .collect::<Vec<_>>()
                .join("; "),
            BackendFailure::Message(m) if !m.trim().is_empty() => m.clone(),
            _ => FALLBACK_MESSAGE.to_string(),
        }
    }
}

fn field_violation(item: &Value) -> Option<FieldViolation> {
    let message = item.get("msg")?.as_str()?.to_string();
    let location = match item.get("loc") {
        Some(Value::Array(parts)) => parts
            .iter()
            .map(|p| match p {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    };
    Some(FieldViolation { location, message })
}

/// The external service that actually crawls and probes targets.
#[async_trait]
pub trait ScanBackend: Send + Sync {
    async fn scan(&self, request: &ScanRequest) -> Result<RawPayload, BackendFailure>;
}

/// Request body understood by the scanning service.
#[derive(Debug, Serialize)]
pub(crate) struct WireScanRequest<'a> {
    target_urls: &'a [String],
    mode: ScanMode,
    exclusions: Vec<&'a str>,
    max_depth: u32,
    respect_robots_txt: bool,
    dictionary_operations: &'a [DictOp],
    use_default_dictionary: bool,
    dictionary: &'a [PathEntry],
    #[serde(skip_serializing_if = "Option::is_none")]
    session_cookies_string: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<&'a str>,
}

impl<'a> From<&'a ScanRequest> for WireScanRequest<'a> {
    fn from(r: &'a ScanRequest) -> Self {
        let (cookies, username, password) = match &r.credentials {
            Some(Credentials::SessionCookie(c)) => (Some(c.as_str()), None, None),
            Some(Credentials::Basic { username, password }) => {
                (None, Some(username.as_str()), Some(password.as_str()))
            }
            None => (None, None, None),
        };
        Self {
            target_urls: &r.targets,
            mode: r.mode,
            exclusions: r.exclusions.iter().map(String::as_str).collect(),
            max_depth: r.max_depth,
            respect_robots_txt: r.respect_robots,
            dictionary_operations: &r.operations,
            use_default_dictionary: r.use_baseline,
            dictionary: &r.dictionary,
            session_cookies_string: cookies,
            username,
            password,
        }
    }
}

/// Live response body. Extra top-level fields are ignored.
#[derive(Deserialize)]
struct ScanEnvelope {
    result: RawPayload,
}

/// Strict envelope, only so a recorded file can be told apart from a bare payload.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RecordedEnvelope {
    result: RawPayload,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Recorded {
    Envelope(RecordedEnvelope),
    Bare(RawPayload),
}

/// Talks to the scanning service over HTTP (`POST <base>/scan`).
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url: base_url.into() })
    }

    pub fn scan_url(&self) -> String {
        format!("{}/scan", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ScanBackend for HttpBackend {
    async fn scan(&self, request: &ScanRequest) -> Result<RawPayload, BackendFailure> {
        let url = self.scan_url();
        info!(%url, targets = request.targets.len(), "submitting scan to backend");

        let response = self
            .client
            .post(&url)
            .json(&WireScanRequest::from(request))
            .send()
            .await
            .map_err(|e| BackendFailure::Message(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BackendFailure::Message(format!("failed to read backend response: {e}")))?;
        debug!(%status, bytes = body.len(), "backend responded");

        if !status.is_success() {
            return Err(error_from_body(status, &body));
        }

        decode_scan_response(&body)
    }
}

fn decode_scan_response(body: &str) -> Result<RawPayload, BackendFailure> {
    serde_json::from_str::<ScanEnvelope>(body)
        .map(|env| env.result)
        .map_err(|e| BackendFailure::Message(format!("malformed scan response: {e}")))
}

fn error_from_body(status: reqwest::StatusCode, body: &str) -> BackendFailure {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(mut obj)) => match obj.remove("detail") {
            Some(detail) => BackendFailure::from_detail(detail),
            None => BackendFailure::Unrecognized(Value::Object(obj)),
        },
        Ok(other) => BackendFailure::Unrecognized(other),
        Err(_) if !body.trim().is_empty() => {
            BackendFailure::Message(format!("backend returned {status}: {}", body.trim()))
        }
        Err(_) => BackendFailure::Message(format!("backend returned {status}")),
    }
}

/// Serves a previously recorded payload instead of calling a live service.
#[derive(Debug, Clone)]
pub struct ReplayBackend {
    payload: RawPayload,
}

impl ReplayBackend {
    pub fn new(payload: RawPayload) -> Self {
        Self { payload }
    }

    /// Accepts either the bare payload or the service's `{"result": ...}` envelope.
    pub fn from_json_str(s: &str) -> anyhow::Result<Self> {
        let recorded: Recorded = serde_json::from_str(s).context("recorded payload is not a scan result")?;
        Ok(Self::new(match recorded {
            Recorded::Envelope(env) => env.result,
            Recorded::Bare(payload) => payload,
        }))
    }

    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("failed to read recorded payload: {}", path.as_ref().display()))?;
        Self::from_json_str(&content)
    }
}

#[async_trait]
impl ScanBackend for ReplayBackend {
    async fn scan(&self, request: &ScanRequest) -> Result<RawPayload, BackendFailure> {
        debug!(targets = request.targets.len(), "replaying recorded payload");
        Ok(self.payload.clone())
    }
}
