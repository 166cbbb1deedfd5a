use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use crate::error::SessionError;
use crate::stream::{self, StreamEvent};
use crate::types::AnalyzeOptions;

pub const PRODUCTION_BASE_URL: &str = "https://api.comlens.app";
pub const LOCAL_BASE_URL: &str = "http://localhost:8787";

/// Maximum characters of a non-JSON body echoed back in error messages.
const PREVIEW_LEN: usize = 200;

/// Which deployment of the analysis backend to talk to.
#[derive(Clone, Debug, Default)]
pub enum Backend {
    #[default]
    Production,
    Local,
    Custom(String),
}

impl Backend {
    pub fn base_url(&self) -> &str {
        match self {
            Backend::Production => PRODUCTION_BASE_URL,
            Backend::Local => LOCAL_BASE_URL,
            Backend::Custom(url) => url,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Backend::Production => "production",
            Backend::Local => "local",
            Backend::Custom(_) => "custom",
        }
    }
}

/// Envelope of `POST /analyze`. On `success=false` the `error` string is
/// the failure reason; `result` is the raw AI payload handed to the parser.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub comments: Option<Vec<Value>>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Seam between the session controller and the network, mockable in tests.
#[async_trait]
pub trait AnalyzeTransport: Send + Sync {
    async fn analyze(
        &self,
        video_id: &str,
        opts: &AnalyzeOptions,
        token: &str,
    ) -> Result<AnalyzeResponse, SessionError>;

    /// SSE variant; progress and the final payload arrive as events.
    async fn open_stream(
        &self,
        video_id: &str,
        opts: &AnalyzeOptions,
        token: &str,
    ) -> Result<mpsc::Receiver<StreamEvent>, SessionError>;
}

/// Real transport over reqwest.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    backend: Backend,
}

impl HttpTransport {
    pub fn new(backend: Backend) -> Self {
        Self {
            client: reqwest::Client::new(),
            backend,
        }
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }
}

#[async_trait]
impl AnalyzeTransport for HttpTransport {
    async fn analyze(
        &self,
        video_id: &str,
        opts: &AnalyzeOptions,
        token: &str,
    ) -> Result<AnalyzeResponse, SessionError> {
        let base_url = self.backend.base_url();
        let mut body = json!({
            "videoId": video_id,
            "comments": [],
            "commentLimit": opts.comment_limit,
            "summaryLength": opts.summary_length.as_str(),
        });
        if let Some(lang) = &opts.language {
            body["language"] = json!(lang);
        }
        if opts.no_cache {
            body["noCache"] = json!(true);
        }

        let response = self
            .client
            .post(format!("{base_url}/analyze"))
            .header("Authorization", format!("Bearer {token}"))
            .json(&body)
            .send()
            .await
            .map_err(|e| SessionError::unreachable(base_url, e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| SessionError::unreachable(base_url, e.to_string()))?;

        if !(200..300).contains(&status) {
            let message = error_message_from_body(&text)
                .unwrap_or_else(|| format!("request failed with status {status}"));
            return Err(classify_failure(status, message));
        }

        let parsed: AnalyzeResponse = match serde_json::from_str(&text) {
            Ok(parsed) => parsed,
            Err(_) => {
                return Err(SessionError::UnexpectedContentType {
                    status,
                    preview: preview(&text),
                });
            }
        };

        if !parsed.success {
            let message = parsed
                .error
                .unwrap_or_else(|| "analysis failed without a reason".to_string());
            return Err(classify_failure(status, message));
        }

        Ok(parsed)
    }

    async fn open_stream(
        &self,
        video_id: &str,
        opts: &AnalyzeOptions,
        token: &str,
    ) -> Result<mpsc::Receiver<StreamEvent>, SessionError> {
        stream::open_analysis_stream(&self.client, &self.backend, video_id, opts, token).await
    }
}

/// Pull the human-readable reason out of a structured error body.
fn error_message_from_body(body: &str) -> Option<String> {
    let value = serde_json::from_str::<Value>(body).ok()?;
    value
        .get("error")
        .or_else(|| value.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Quota exhaustion gets its own variant so the UI can point at the top-up
/// flow instead of showing a generic HTTP failure.
pub(crate) fn classify_failure(status: u16, message: String) -> SessionError {
    if is_quota_message(&message) {
        SessionError::QuotaExceeded { message }
    } else {
        SessionError::Http { status, message }
    }
}

fn is_quota_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("credit") || lower.contains("quota") || lower.contains("insufficient")
}

fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(PREVIEW_LEN).collect();
    if text.chars().count() > PREVIEW_LEN {
        out.push('…');
    }
    out
}
