use super::logging::{debug_payload_enabled, emit_debug_payload};
use crate::config::Config;
use crate::types::{ApiMessage, LlmModel, LlmModelConfig, Templates};
use crate::util::is_local_endpoint_url;
use anyhow::{anyhow, bail, Result};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::{Stream, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::pin::Pin;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Marker the completion endpoint puts in rate-limit failures.
pub const RATE_LIMIT_MARKER: &str = "Rate limit";

/// Body of one completion request.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<ApiMessage>,
    pub template: Templates,
    pub model: Option<LlmModel>,
    pub config: LlmModelConfig,
}

/// Opens the byte stream of one structured-object completion.
pub trait FragmentStreamSource: Send + Sync {
    fn open_stream<'a>(&'a self, request: &'a ChatRequest) -> BoxFuture<'a, Result<ByteStream>>;
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    chat_url: String,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self::with_url(config.chat_url.clone()))
    }

    pub fn with_url(chat_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            chat_url: chat_url.into(),
        }
    }

    pub fn is_local_endpoint(&self) -> bool {
        is_local_endpoint_url(&self.chat_url)
    }

    pub async fn create_stream(&self, request: &ChatRequest) -> Result<ByteStream> {
        if debug_payload_enabled() {
            let payload = serde_json::to_value(request)?;
            emit_debug_payload(&self.chat_url, &payload);
        }

        let response = self
            .http
            .post(&self.chat_url)
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|error| map_api_request_error(error, &self.chat_url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!(error_message_from_body(status, &body));
        }

        let request_url_for_stream = self.chat_url.clone();
        let stream = response.bytes_stream().map(move |item| {
            item.map_err(|error| map_api_request_error(error, &request_url_for_stream))
        });
        Ok(Box::pin(stream))
    }
}

impl FragmentStreamSource for ApiClient {
    fn open_stream<'a>(&'a self, request: &'a ChatRequest) -> BoxFuture<'a, Result<ByteStream>> {
        Box::pin(self.create_stream(request))
    }
}

/// Turns a non-2xx reply into the user-facing error text. JSON bodies with an
/// `error`/`message` field are unwrapped; a bare 429 is labelled as a rate limit so
/// the marker check still classifies it.
pub(crate) fn error_message_from_body(status: reqwest::StatusCode, body: &str) -> String {
    let trimmed = body.trim();
    let extracted = serde_json::from_str::<Value>(trimmed)
        .ok()
        .and_then(|value| {
            ["error", "message"]
                .iter()
                .find_map(|key| value.get(*key).and_then(Value::as_str).map(str::to_string))
        })
        .unwrap_or_else(|| trimmed.to_string());

    let message = if extracted.is_empty() {
        format!("HTTP {status}")
    } else {
        extracted
    };

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS && !message.contains(RATE_LIMIT_MARKER) {
        format!("{RATE_LIMIT_MARKER} exceeded: {message}")
    } else {
        message
    }
}

pub(crate) fn map_api_request_error(error: reqwest::Error, request_url: &str) -> anyhow::Error {
    if error.is_connect() && is_local_endpoint_url(request_url) {
        return anyhow!(
            "cannot reach local endpoint '{}': {}. Start the app server or update FRAGMENTS_CHAT_URL.",
            request_url,
            error
        );
    }
    if error.is_connect() {
        return anyhow!("cannot reach endpoint '{}': {}", request_url, error);
    }
    if error.is_timeout() {
        return anyhow!("request to '{}' timed out: {}", request_url, error);
    }
    if let Some(status) = error.status() {
        return anyhow!(
            "endpoint '{}' returned HTTP {}: {}",
            request_url,
            status,
            error
        );
    }
    anyhow!("request to '{}' failed: {}", request_url, error)
}
