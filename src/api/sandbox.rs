use super::client::map_api_request_error;
use super::logging::{debug_payload_enabled, emit_debug_payload};
use crate::config::Config;
use crate::types::{ExecutionResult, Fragment};
use anyhow::{bail, Context, Result};
use futures::future::BoxFuture;
use serde::Serialize;

/// Runs a completed fragment in a remote sandbox.
pub trait SandboxExecutor: Send + Sync {
    fn execute<'a>(
        &'a self,
        fragment: &'a Fragment,
        user_id: &'a str,
    ) -> BoxFuture<'a, Result<ExecutionResult>>;
}

#[derive(Serialize)]
struct SandboxRequest<'a> {
    fragment: &'a Fragment,
    #[serde(rename = "userID")]
    user_id: &'a str,
}

#[derive(Clone)]
pub struct SandboxClient {
    http: reqwest::Client,
    sandbox_url: String,
}

impl SandboxClient {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self::with_url(config.sandbox_url.clone()))
    }

    pub fn with_url(sandbox_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            sandbox_url: sandbox_url.into(),
        }
    }

    pub async fn run(&self, fragment: &Fragment, user_id: &str) -> Result<ExecutionResult> {
        let body = SandboxRequest { fragment, user_id };
        if debug_payload_enabled() {
            emit_debug_payload(&self.sandbox_url, &serde_json::to_value(&body)?);
        }

        let response = self
            .http
            .post(&self.sandbox_url)
            .json(&body)
            .send()
            .await
            .map_err(|error| map_api_request_error(error, &self.sandbox_url))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!(
                "sandbox endpoint '{}' returned HTTP {}: {}",
                self.sandbox_url,
                status,
                text.trim()
            );
        }

        response
            .json::<ExecutionResult>()
            .await
            .with_context(|| {
                format!(
                    "sandbox endpoint '{}' returned an invalid result",
                    self.sandbox_url
                )
            })
    }
}

impl SandboxExecutor for SandboxClient {
    fn execute<'a>(
        &'a self,
        fragment: &'a Fragment,
        user_id: &'a str,
    ) -> BoxFuture<'a, Result<ExecutionResult>> {
        Box::pin(self.run(fragment, user_id))
    }
}
