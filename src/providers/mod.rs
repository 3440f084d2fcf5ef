pub mod anthropic;
pub mod gemini;
mod http;
pub mod openai;
pub mod prompt;
pub mod response;

use crate::entity::Entity;
use crate::error::ClassifyError;
use crate::settings::ExtractionConfiguration;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    #[default]
    Gemini,
    OpenAI,
    Anthropic,
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ProviderId {
    pub const ALL: [ProviderId; 3] = [ProviderId::Gemini, ProviderId::OpenAI, ProviderId::Anthropic];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Gemini => "gemini",
            ProviderId::OpenAI => "openai",
            ProviderId::Anthropic => "anthropic",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "gemini" => Some(ProviderId::Gemini),
            "openai" => Some(ProviderId::OpenAI),
            "anthropic" | "claude" => Some(ProviderId::Anthropic),
            _ => None,
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderId::Gemini => gemini::DEFAULT_MODEL,
            ProviderId::OpenAI => openai::DEFAULT_MODEL,
            ProviderId::Anthropic => anthropic::DEFAULT_MODEL,
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderId::Gemini => gemini::BASE_URL,
            ProviderId::OpenAI => openai::BASE_URL,
            ProviderId::Anthropic => anthropic::BASE_URL,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub id: ProviderId,
    pub label: String,
    pub description: String,
    pub base_url: String,
    pub models: Vec<ProviderModel>,
    pub default_model: String,
    pub api_key_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderModel {
    pub id: String,
    pub name: String,
    pub description: String,
}

pub fn get_available_providers() -> Vec<ProviderInfo> {
    vec![
        ProviderInfo {
            id: ProviderId::Gemini,
            label: "Google Gemini".to_string(),
            description: "Fast and affordable".to_string(),
            base_url: gemini::BASE_URL.to_string(),
            models: gemini::get_available_models(),
            default_model: gemini::DEFAULT_MODEL.to_string(),
            api_key_url: "https://aistudio.google.com/apikey".to_string(),
        },
        ProviderInfo {
            id: ProviderId::OpenAI,
            label: "OpenAI".to_string(),
            description: "Chat completions with JSON output".to_string(),
            base_url: openai::BASE_URL.to_string(),
            models: openai::get_available_models(),
            default_model: openai::DEFAULT_MODEL.to_string(),
            api_key_url: "https://platform.openai.com/api-keys".to_string(),
        },
        ProviderInfo {
            id: ProviderId::Anthropic,
            label: "Anthropic Claude".to_string(),
            description: "Messages API".to_string(),
            base_url: anthropic::BASE_URL.to_string(),
            models: anthropic::get_available_models(),
            default_model: anthropic::DEFAULT_MODEL.to_string(),
            api_key_url: "https://console.anthropic.com/settings/keys".to_string(),
        },
    ]
}

pub fn provider_label(id: ProviderId) -> String {
    get_available_providers()
        .into_iter()
        .find(|p| p.id == id)
        .map(|p| p.label)
        .unwrap_or_else(|| id.to_string())
}

/// API key for one provider. Debug output never contains the key.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
        }
    }

    pub fn is_missing(&self) -> bool {
        self.api_key.trim().is_empty()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &if self.is_missing() { "<empty>" } else { "<redacted>" })
            .finish()
    }
}

/// Remote "text in, entity list out" capability. One attempt per call; no
/// retries happen below this boundary.
#[async_trait]
pub trait EntityRequestClient: Send + Sync {
    fn provider(&self) -> ProviderId;

    async fn classify(
        &self,
        text: &str,
        max_entities: u32,
        credentials: &Credentials,
    ) -> Result<Vec<Entity>, ClassifyError>;
}

/// Picks the client that serves the next request for a configuration.
pub trait ClientResolver: Send + Sync {
    fn resolve(&self, config: &ExtractionConfiguration) -> Arc<dyn EntityRequestClient>;
}

/// Per-client settings shared by all HTTP providers.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

/// Builds HTTP clients for the configured provider. Base URLs can be
/// overridden, e.g. to go through a proxy.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    base_urls: HashMap<ProviderId, String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_url(mut self, provider: ProviderId, base_url: impl Into<String>) -> Self {
        self.base_urls.insert(provider, base_url.into());
        self
    }

    pub fn base_url(&self, provider: ProviderId) -> String {
        self.base_urls
            .get(&provider)
            .cloned()
            .unwrap_or_else(|| provider.default_base_url().to_string())
    }

    pub fn client(
        &self,
        provider: ProviderId,
        model: &str,
        timeout: Duration,
    ) -> Arc<dyn EntityRequestClient> {
        let options = ClientOptions {
            base_url: self.base_url(provider),
            model: model.to_string(),
            timeout,
        };

        match provider {
            ProviderId::Gemini => Arc::new(gemini::GeminiClient::new(options)),
            ProviderId::OpenAI => Arc::new(openai::OpenAIClient::new(options)),
            ProviderId::Anthropic => Arc::new(anthropic::AnthropicClient::new(options)),
        }
    }

    /// Checks that `api_key` is accepted by `provider`. Failures carry the
    /// same classification as a failed extraction.
    pub async fn test_connection(
        &self,
        provider: ProviderId,
        api_key: &str,
        timeout: Duration,
    ) -> Result<(), ClassifyError> {
        let api_key = http::require_api_key(provider, &Credentials::new(api_key))?;
        let base_url = self.base_url(provider);
        match provider {
            ProviderId::Gemini => gemini::test_connection(&base_url, &api_key, timeout).await,
            ProviderId::OpenAI => openai::test_connection(&base_url, &api_key, timeout).await,
            ProviderId::Anthropic => {
                anthropic::test_connection(&base_url, &api_key, timeout).await
            }
        }
    }
}

impl ClientResolver for ProviderRegistry {
    fn resolve(&self, config: &ExtractionConfiguration) -> Arc<dyn EntityRequestClient> {
        self.client(
            config.provider,
            config.model(config.provider),
            config.request_timeout(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_provider_ids_case_insensitively() {
        assert_eq!(ProviderId::parse("OpenAI"), Some(ProviderId::OpenAI));
        assert_eq!(ProviderId::parse(" gemini "), Some(ProviderId::Gemini));
        assert_eq!(ProviderId::parse("claude"), Some(ProviderId::Anthropic));
        assert_eq!(ProviderId::parse("mistral"), None);
    }

    #[test]
    fn catalogue_default_models_are_listed() {
        for provider in get_available_providers() {
            assert!(
                provider.models.iter().any(|m| m.id == provider.default_model),
                "{} default model missing from its model list",
                provider.id
            );
            assert_eq!(provider.default_model, provider.id.default_model());
        }
    }

    #[test]
    fn registry_resolves_configured_provider() {
        let registry = ProviderRegistry::new();
        let mut config = ExtractionConfiguration::default();

        for provider in ProviderId::ALL {
            config.provider = provider;
            assert_eq!(registry.resolve(&config).provider(), provider);
        }
    }

    #[test]
    fn base_url_override_applies_to_one_provider() {
        let registry = ProviderRegistry::new().with_base_url(ProviderId::OpenAI, "http://127.0.0.1:1");
        assert_eq!(registry.base_url(ProviderId::OpenAI), "http://127.0.0.1:1");
        assert_eq!(registry.base_url(ProviderId::Gemini), gemini::BASE_URL);
    }

    #[test]
    fn credentials_debug_is_redacted() {
        let creds = Credentials::new("sk-secret");
        assert!(!format!("{:?}", creds).contains("sk-secret"));
        assert!(Credentials::new("   ").is_missing());
    }
}
