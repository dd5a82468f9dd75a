use super::client::map_api_request_error;
use crate::config::Config;
use anyhow::Result;
use serde::Serialize;

/// Identity sent with sandbox executions when nobody is signed in.
pub const ANONYMOUS_USER_ID: &str = "anonymous";

/// Supplies the signed-in identity, if any.
pub trait SessionGate: Send + Sync {
    fn user_id(&self) -> Option<String>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticSession {
    user_id: Option<String>,
}

impl StaticSession {
    pub fn new(user_id: Option<String>) -> Self {
        Self { user_id }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }
}

impl SessionGate for StaticSession {
    fn user_id(&self) -> Option<String> {
        self.user_id.clone()
    }
}

pub fn execution_user_id(session: &dyn SessionGate) -> String {
    session
        .user_id()
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| ANONYMOUS_USER_ID.to_string())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthExchange<'a> {
    access_token: &'a str,
}

#[derive(Clone)]
pub struct AuthClient {
    http: reqwest::Client,
    auth_url: String,
}

impl AuthClient {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self::with_url(config.auth_url.clone()))
    }

    pub fn with_url(auth_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            auth_url: auth_url.into(),
        }
    }

    /// Posts the access token; `Ok(false)` means the endpoint refused it.
    pub async fn exchange(&self, access_token: &str) -> Result<bool> {
        let response = self
            .http
            .post(&self.auth_url)
            .json(&AuthExchange { access_token })
            .send()
            .await
            .map_err(|error| map_api_request_error(error, &self.auth_url))?;
        Ok(response.status().is_success())
    }
}
