use anyhow::{bail, Context, Result};
use std::str::FromStr;

use crate::types::{LlmModelConfig, TemplateSelection, UserTier};
use crate::util::{is_http_url, is_local_endpoint_url, non_empty_env};

pub const DEFAULT_CHAT_URL: &str = "http://localhost:3000/api/chat";
pub const DEFAULT_SANDBOX_URL: &str = "http://localhost:3000/api/sandbox";
pub const DEFAULT_AUTH_URL: &str = "http://localhost:3000/api/auth";
pub const DEFAULT_MODEL: &str = "models/gemini-2.5-flash-preview-05-20";

#[derive(Debug, Clone)]
pub struct Config {
    pub chat_url: String,
    pub sandbox_url: String,
    pub auth_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub temperature: Option<f32>,
    pub template: TemplateSelection,
    pub user_id: Option<String>,
    pub tier: UserTier,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chat_url: DEFAULT_CHAT_URL.to_string(),
            sandbox_url: DEFAULT_SANDBOX_URL.to_string(),
            auth_url: DEFAULT_AUTH_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            base_url: None,
            temperature: None,
            template: TemplateSelection::Auto,
            user_id: None,
            tier: UserTier::Free,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let defaults = Self::default();
        let temperature = match non_empty_env("FRAGMENTS_TEMPERATURE") {
            Some(raw) => Some(
                raw.parse::<f32>()
                    .with_context(|| format!("Invalid FRAGMENTS_TEMPERATURE '{raw}'"))?,
            ),
            None => None,
        };
        let tier = match non_empty_env("FRAGMENTS_TIER") {
            Some(raw) => match UserTier::parse(&raw) {
                Some(tier) => tier,
                None => bail!("Invalid FRAGMENTS_TIER '{raw}': expected 'free' or 'pro'"),
            },
            None => defaults.tier,
        };
        let template = match non_empty_env("FRAGMENTS_TEMPLATE") {
            Some(raw) => TemplateSelection::from_str(&raw)?,
            None => defaults.template,
        };

        Ok(Self {
            chat_url: non_empty_env("FRAGMENTS_CHAT_URL").unwrap_or(defaults.chat_url),
            sandbox_url: non_empty_env("FRAGMENTS_SANDBOX_URL").unwrap_or(defaults.sandbox_url),
            auth_url: non_empty_env("FRAGMENTS_AUTH_URL").unwrap_or(defaults.auth_url),
            model: non_empty_env("FRAGMENTS_MODEL").unwrap_or(defaults.model),
            api_key: non_empty_env("FRAGMENTS_API_KEY"),
            base_url: non_empty_env("FRAGMENTS_BASE_URL"),
            temperature,
            template,
            user_id: non_empty_env("FRAGMENTS_USER_ID"),
            tier,
        })
    }

    pub fn validate(&self) -> Result<()> {
        for (name, url) in [
            ("FRAGMENTS_CHAT_URL", &self.chat_url),
            ("FRAGMENTS_SANDBOX_URL", &self.sandbox_url),
            ("FRAGMENTS_AUTH_URL", &self.auth_url),
        ] {
            if !is_http_url(url) {
                bail!("Invalid {name} '{url}': expected http:// or https:// URL");
            }
        }

        if let Some(base_url) = &self.base_url {
            if !is_http_url(base_url) {
                bail!("Invalid FRAGMENTS_BASE_URL '{base_url}': expected http:// or https:// URL");
            }
        }

        if self.model.trim().is_empty() {
            bail!("FRAGMENTS_MODEL must not be empty");
        }

        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                bail!("Invalid FRAGMENTS_TEMPERATURE {temperature}: expected a value in 0.0..=2.0");
            }
        }

        Ok(())
    }

    pub fn is_local_endpoint(&self) -> bool {
        is_local_endpoint_url(&self.chat_url)
    }

    /// Settings forwarded whole as the completion request `config`.
    pub fn model_config(&self) -> LlmModelConfig {
        LlmModelConfig {
            api_key: self.api_key.clone(),
            base_url: self.base_url.clone(),
            temperature: self.temperature,
            ..LlmModelConfig::for_model(self.model.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VARS: &[&str] = &[
        "FRAGMENTS_CHAT_URL",
        "FRAGMENTS_SANDBOX_URL",
        "FRAGMENTS_AUTH_URL",
        "FRAGMENTS_MODEL",
        "FRAGMENTS_API_KEY",
        "FRAGMENTS_BASE_URL",
        "FRAGMENTS_TEMPERATURE",
        "FRAGMENTS_TEMPLATE",
        "FRAGMENTS_USER_ID",
        "FRAGMENTS_TIER",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_load_uses_defaults_when_env_is_blank() {
        let _env_lock = crate::test_support::ENV_LOCK.blocking_lock();
        clear_env();
        std::env::set_var("FRAGMENTS_MODEL", "   ");

        let config = Config::load().expect("load");
        assert_eq!(config.chat_url, DEFAULT_CHAT_URL);
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.template, TemplateSelection::Auto);
        assert!(config.is_local_endpoint());
        clear_env();
    }

    #[test]
    fn test_load_reads_overrides() {
        let _env_lock = crate::test_support::ENV_LOCK.blocking_lock();
        clear_env();
        std::env::set_var("FRAGMENTS_CHAT_URL", "https://fragments.example.dev/api/chat");
        std::env::set_var("FRAGMENTS_TEMPERATURE", "0.5");
        std::env::set_var("FRAGMENTS_TEMPLATE", "nextjs-developer");
        std::env::set_var("FRAGMENTS_TIER", "pro");
        std::env::set_var("FRAGMENTS_USER_ID", "user-42");

        let config = Config::load().expect("load");
        assert_eq!(config.temperature, Some(0.5));
        assert_eq!(
            config.template,
            TemplateSelection::Specific("nextjs-developer".to_string())
        );
        assert_eq!(config.tier, UserTier::Pro);
        assert_eq!(config.user_id.as_deref(), Some("user-42"));
        assert!(!config.is_local_endpoint());
        clear_env();
    }

    #[test]
    fn test_load_rejects_bad_temperature() {
        let _env_lock = crate::test_support::ENV_LOCK.blocking_lock();
        clear_env();
        std::env::set_var("FRAGMENTS_TEMPERATURE", "warm");
        assert!(Config::load().is_err());
        clear_env();
    }

    #[test]
    fn test_model_config_carries_overrides() {
        let config = Config {
            api_key: Some("sk-test".to_string()),
            temperature: Some(0.7),
            ..Config::default()
        };
        let model_config = config.model_config();
        assert_eq!(model_config.model, DEFAULT_MODEL);
        assert_eq!(model_config.api_key.as_deref(), Some("sk-test"));
        assert_eq!(model_config.temperature, Some(0.7));
    }
}
