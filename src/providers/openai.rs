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

pub const BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorResponse {
    error: OpenAIError,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    message: String,
    code: Option<String>,
}

pub fn get_available_models() -> Vec<ProviderModel> {
    vec![
        ProviderModel {
            id: "gpt-4o-mini".to_string(),
            name: "GPT-4o Mini".to_string(),
            description: "Fast and affordable - Recommended".to_string(),
        },
        ProviderModel {
            id: "gpt-4.1-mini".to_string(),
            name: "GPT-4.1 Mini".to_string(),
            description: "Longer context".to_string(),
        },
        ProviderModel {
            id: "gpt-4o".to_string(),
            name: "GPT-4o".to_string(),
            description: "Most capable, higher latency".to_string(),
        },
    ]
}

fn map_error(status: u16, error: OpenAIError) -> ClassifyError {
    let kind = match error.code.as_deref() {
        Some("invalid_api_key") => ProviderFailure::Authentication,
        Some("insufficient_quota") => ProviderFailure::QuotaExceeded,
        Some("rate_limit_exceeded") => ProviderFailure::RateLimited,
        _ => failure_for_status(status),
    };
    ClassifyError::provider(kind, Some(status), Some(error.message))
}

fn error_from_body(status: u16, body: &str) -> ClassifyError {
    match serde_json::from_str::<OpenAIErrorResponse>(body) {
        Ok(error_response) => map_error(status, error_response.error),
        Err(_) => ClassifyError::provider(failure_for_status(status), Some(status), None),
    }
}

pub struct OpenAIClient {
    options: ClientOptions,
}

impl OpenAIClient {
    pub fn new(options: ClientOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl EntityRequestClient for OpenAIClient {
    fn provider(&self) -> ProviderId {
        ProviderId::OpenAI
    }

    async fn classify(
        &self,
        text: &str,
        max_entities: u32,
        credentials: &Credentials,
    ) -> Result<Vec<Entity>, ClassifyError> {
        let api_key = require_api_key(ProviderId::OpenAI, credentials)?;

        info!(
            "OpenAI classify: model={}, text_chars={}, max_entities={}",
            self.options.model,
            text.chars().count(),
            max_entities
        );

        let system_prompt = build_system_prompt(max_entities);
        let body = ChatCompletionRequest {
            model: &self.options.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: text,
                },
            ],
            // json_object mode requires an object, hence the {"entities": [...]} shape in the prompt.
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        let client = build_client(self.options.timeout)?;
        let request = client
            .post(format!(
                "{}/v1/chat/completions",
                self.options.base_url.trim_end_matches('/')
            ))
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&body);

        let (status, response_text) = send(ProviderId::OpenAI, request).await?;

        if !status.is_success() {
            error!("OpenAI API error: status={}, body={}", status, response_text);

            return Err(error_from_body(status.as_u16(), &response_text));
        }

        let completion: ChatCompletionResponse = serde_json::from_str(&response_text)
            .map_err(|e| ClassifyError::response_format(format!("invalid envelope: {}", e), &response_text))?;

        let payload = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        debug!("OpenAI entity payload: {} chars", payload.len());

        let entities = parse_entities(&payload)?;
        info!("OpenAI returned {} entities", entities.len());
        Ok(entities)
    }
}

pub async fn test_connection(
    base_url: &str,
    api_key: &str,
    timeout: Duration,
) -> Result<(), ClassifyError> {
    info!("Testing OpenAI API connection");

    let client = build_client(timeout)?;
    let request = client
        .get(format!("{}/v1/models", base_url.trim_end_matches('/')))
        .header("Authorization", format!("Bearer {}", api_key));

    let (status, response_text) = send(ProviderId::OpenAI, request).await?;
    if status.is_success() {
        info!("OpenAI API connection test successful");
        return Ok(());
    }

    error!(
        "OpenAI API connection test failed: status={}, body={}",
        status, response_text
    );
    Err(error_from_body(status.as_u16(), &response_text))
}
