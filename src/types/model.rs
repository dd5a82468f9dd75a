use serde::{Deserialize, Serialize};

/// Catalog entry describing a selectable language model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LlmModel {
    pub id: String,
    pub provider: String,
    pub provider_id: String,
    pub name: String,
    pub multi_modal: bool,
}

/// Per-user model settings sent whole as the request `config`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LlmModelConfig {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, rename = "baseURL", skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl LlmModelConfig {
    pub fn for_model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UserTier {
    #[default]
    Free,
    Pro,
}

impl UserTier {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "free" => Some(UserTier::Free),
            "pro" => Some(UserTier::Pro),
            _ => None,
        }
    }
}

const FREE_TIER_MODELS: &[&str] = &[
    "claude-3-5-sonnet-latest",
    "claude-3-5-haiku-latest",
    "gpt-4o",
    "gpt-4o-mini",
    "models/gemini-2.5-flash-preview-05-20",
    "models/gemini-2.5-pro-preview-05-06",
    "models/gemini-2.0-flash",
    "models/gemini-1.5-pro",
    "models/gemini-1.5-flash",
    "mistral-large-latest",
    "mistral-small-latest",
];

/// Pro users see every model; free users see the fixed popular list.
pub fn filter_models(models: &[LlmModel], tier: UserTier) -> Vec<LlmModel> {
    models
        .iter()
        .filter(|model| tier == UserTier::Pro || FREE_TIER_MODELS.contains(&model.id.as_str()))
        .cloned()
        .collect()
}

pub fn find_model<'a>(models: &'a [LlmModel], id: &str) -> Option<&'a LlmModel> {
    models.iter().find(|model| model.id == id)
}

fn model(id: &str, provider: &str, provider_id: &str, name: &str, multi_modal: bool) -> LlmModel {
    LlmModel {
        id: id.to_string(),
        provider: provider.to_string(),
        provider_id: provider_id.to_string(),
        name: name.to_string(),
        multi_modal,
    }
}

pub fn builtin_models() -> Vec<LlmModel> {
    vec![
        model("claude-3-5-sonnet-latest", "Anthropic", "anthropic", "Claude 3.5 Sonnet", true),
        model("claude-3-5-haiku-latest", "Anthropic", "anthropic", "Claude 3.5 Haiku", false),
        model("gpt-4o", "OpenAI", "openai", "GPT-4o", true),
        model("gpt-4o-mini", "OpenAI", "openai", "GPT-4o Mini", true),
        model("o3-mini", "OpenAI", "openai", "o3 Mini", false),
        model(
            "models/gemini-2.5-flash-preview-05-20",
            "Google",
            "google",
            "Gemini 2.5 Flash",
            true,
        ),
        model(
            "models/gemini-2.5-pro-preview-05-06",
            "Google",
            "google",
            "Gemini 2.5 Pro",
            true,
        ),
        model("models/gemini-2.0-flash", "Google", "google", "Gemini 2.0 Flash", true),
        model("models/gemini-1.5-pro", "Google", "google", "Gemini 1.5 Pro", true),
        model("models/gemini-1.5-flash", "Google", "google", "Gemini 1.5 Flash", true),
        model("mistral-large-latest", "Mistral", "mistral", "Mistral Large", false),
        model("mistral-small-latest", "Mistral", "mistral", "Mistral Small", false),
        model("pixtral-large-latest", "Mistral", "mistral", "Pixtral Large", true),
        model(
            "accounts/fireworks/models/llama-v3p1-405b-instruct",
            "Fireworks",
            "fireworks",
            "Llama 3.1 405B",
            false,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_tier_hides_pro_models() {
        let models = builtin_models();
        let free = filter_models(&models, UserTier::Free);
        assert!(find_model(&free, "gpt-4o").is_some());
        assert!(find_model(&free, "o3-mini").is_none());
        assert_eq!(filter_models(&models, UserTier::Pro).len(), models.len());
    }

    #[test]
    fn test_config_uses_base_url_wire_name() {
        let config = LlmModelConfig {
            base_url: Some("http://localhost:11434/v1".to_string()),
            temperature: Some(0.2),
            ..LlmModelConfig::for_model("gpt-4o")
        };
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["model"], "gpt-4o");
        assert_eq!(value["baseURL"], "http://localhost:11434/v1");
        assert!(value.get("apiKey").is_none());
    }

    #[test]
    fn test_tier_parse() {
        assert_eq!(UserTier::parse(" PRO "), Some(UserTier::Pro));
        assert_eq!(UserTier::parse("free"), Some(UserTier::Free));
        assert_eq!(UserTier::parse("team"), None);
    }
}
