use super::http::{build_client, failure_for_status, require_api_key, send};
use super::prompt::build_system_prompt;
use super::response::parse_entities;
use super::{ClientOptions, Credentials, EntityRequestClient, ProviderId, ProviderModel};
use crate::entity::Entity;
use crate::error::{ClassifyError, ProviderFailure};
use async_trait::async_trait;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";
const API_VERSION: &str = "2023-06-01";
const MAX_OUTPUT_TOKENS: u32 = 4096;

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: String,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorResponse {
    error: AnthropicError,
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}

pub fn get_available_models() -> Vec<ProviderModel> {
    vec![
        ProviderModel {
            id: "claude-3-5-haiku-latest".to_string(),
            name: "Claude 3.5 Haiku".to_string(),
            description: "Fast and affordable - Recommended".to_string(),
        },
        ProviderModel {
            id: "claude-sonnet-4-0".to_string(),
            name: "Claude Sonnet 4".to_string(),
            description: "Higher quality summaries".to_string(),
        },
    ]
}

fn map_error(status: u16, error: AnthropicError) -> ClassifyError {
    let kind = match error.error_type.as_str() {
        "authentication_error" | "permission_error" => ProviderFailure::Authentication,
        "rate_limit_error" => ProviderFailure::RateLimited,
        "overloaded_error" | "api_error" => ProviderFailure::Server,
        _ => failure_for_status(status),
    };
    ClassifyError::provider(kind, Some(status), Some(error.message))
}

fn error_from_body(status: u16, body: &str) -> ClassifyError {
    match serde_json::from_str::<AnthropicErrorResponse>(body) {
        Ok(error_response) => map_error(status, error_response.error),
        Err(_) => ClassifyError::provider(failure_for_status(status), Some(status), None),
    }
}

pub struct AnthropicClient {
    options: ClientOptions,
}

impl AnthropicClient {
    pub fn new(options: ClientOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl EntityRequestClient for AnthropicClient {
    fn provider(&self) -> ProviderId {
        ProviderId::Anthropic
    }

    async fn classify(
        &self,
        text: &str,
        max_entities: u32,
        credentials: &Credentials,
    ) -> Result<Vec<Entity>, ClassifyError> {
        let api_key = require_api_key(ProviderId::Anthropic, credentials)?;

        info!(
            "Anthropic classify: model={}, text_chars={}, max_entities={}",
            self.options.model,
            text.chars().count(),
            max_entities
        );

        let body = MessagesRequest {
            model: &self.options.model,
            max_tokens: MAX_OUTPUT_TOKENS,
            system: build_system_prompt(max_entities),
            messages: vec![Message {
                role: "user",
                content: text,
            }],
        };

        let client = build_client(self.options.timeout)?;
        let request = client
            .post(format!(
                "{}/v1/messages",
                self.options.base_url.trim_end_matches('/')
            ))
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body);

        let (status, response_text) = send(ProviderId::Anthropic, request).await?;

        if !status.is_success() {
            error!(
                "Anthropic API error: status={}, body={}",
                status, response_text
            );

            return Err(error_from_body(status.as_u16(), &response_text));
        }

        let message: MessagesResponse = serde_json::from_str(&response_text)
            .map_err(|e| ClassifyError::response_format(format!("invalid envelope: {}", e), &response_text))?;

        let payload: String = message
            .content
            .into_iter()
            .filter(|block| block.block_type == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        debug!("Anthropic entity payload: {} chars", payload.len());

        let entities = parse_entities(&payload)?;
        info!("Anthropic returned {} entities", entities.len());
        Ok(entities)
    }
}

pub async fn test_connection(
    base_url: &str,
    api_key: &str,
    timeout: Duration,
) -> Result<(), ClassifyError> {
    info!("Testing Anthropic API connection");

    let client = build_client(timeout)?;
    let request = client
        .get(format!("{}/v1/models", base_url.trim_end_matches('/')))
        .header("x-api-key", api_key)
        .header("anthropic-version", API_VERSION);

    let (status, response_text) = send(ProviderId::Anthropic, request).await?;
    if status.is_success() {
        info!("Anthropic API connection test successful");
        return Ok(());
    }

    error!(
        "Anthropic API connection test failed: status={}, body={}",
        status, response_text
    );
    Err(error_from_body(status.as_u16(), &response_text))
}
