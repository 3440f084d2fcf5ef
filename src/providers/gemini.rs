use super::http::{build_client, failure_for_status, require_api_key, send};
use super::prompt::{build_system_prompt, entity_list_schema};
use super::response::parse_entities;
use super::{ClientOptions, Credentials, EntityRequestClient, ProviderId, ProviderModel};
use crate::entity::Entity;
use crate::error::{ClassifyError, ProviderFailure};
use async_trait::async_trait;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

pub const BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-lite";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    system_instruction: GeminiContent,
    contents: Vec<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
    response_schema: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_config: Option<ThinkingConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_budget: u32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
    status: Option<String>,
}

pub fn get_available_models() -> Vec<ProviderModel> {
    vec![
        ProviderModel {
            id: "gemini-2.5-flash-lite".to_string(),
            name: "Gemini 2.5 Flash Lite".to_string(),
            description: "Fastest and cheapest - Recommended".to_string(),
        },
        ProviderModel {
            id: "gemini-2.5-flash".to_string(),
            name: "Gemini 2.5 Flash".to_string(),
            description: "Better entity summaries".to_string(),
        },
        ProviderModel {
            id: "gemini-2.0-flash".to_string(),
            name: "Gemini 2.0 Flash".to_string(),
            description: "Stable version".to_string(),
        },
    ]
}

fn map_error(status: u16, error: GeminiError) -> ClassifyError {
    let kind = match error.status.as_deref() {
        Some("INVALID_ARGUMENT") if error.message.contains("API key") => {
            ProviderFailure::Authentication
        }
        Some("PERMISSION_DENIED") | Some("UNAUTHENTICATED") => ProviderFailure::Authentication,
        Some("RESOURCE_EXHAUSTED") if error.message.to_lowercase().contains("quota") => {
            ProviderFailure::QuotaExceeded
        }
        Some("RESOURCE_EXHAUSTED") => ProviderFailure::RateLimited,
        _ => failure_for_status(status),
    };
    ClassifyError::provider(kind, Some(status), Some(error.message))
}

fn error_from_body(status: u16, body: &str) -> ClassifyError {
    match serde_json::from_str::<GeminiResponse>(body) {
        Ok(GeminiResponse {
            error: Some(error), ..
        }) => map_error(status, error),
        _ => ClassifyError::provider(failure_for_status(status), Some(status), None),
    }
}

pub struct GeminiClient {
    options: ClientOptions,
}

impl GeminiClient {
    pub fn new(options: ClientOptions) -> Self {
        Self { options }
    }

    fn request_body(&self, text: &str, max_entities: u32) -> GeminiRequest {
        // Only the 2.5 family accepts a thinking budget.
        let thinking_config = self
            .options
            .model
            .starts_with("gemini-2.5")
            .then_some(ThinkingConfig { thinking_budget: 0 });

        GeminiRequest {
            system_instruction: GeminiContent {
                parts: vec![GeminiPart {
                    text: build_system_prompt(max_entities),
                }],
            },
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: text.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema: entity_list_schema(),
                thinking_config,
            },
        }
    }
}

#[async_trait]
impl EntityRequestClient for GeminiClient {
    fn provider(&self) -> ProviderId {
        ProviderId::Gemini
    }

    async fn classify(
        &self,
        text: &str,
        max_entities: u32,
        credentials: &Credentials,
    ) -> Result<Vec<Entity>, ClassifyError> {
        let api_key = require_api_key(ProviderId::Gemini, credentials)?;

        info!(
            "Gemini classify: model={}, text_chars={}, max_entities={}",
            self.options.model,
            text.chars().count(),
            max_entities
        );

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.options.base_url.trim_end_matches('/'),
            self.options.model
        );

        let client = build_client(self.options.timeout)?;
        let request = client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&self.request_body(text, max_entities));

        let (status, response_text) = send(ProviderId::Gemini, request).await?;

        if !status.is_success() {
            error!(
                "Gemini API error: status={}, body={}",
                status, response_text
            );

            return Err(error_from_body(status.as_u16(), &response_text));
        }

        let gemini_response: GeminiResponse = serde_json::from_str(&response_text)
            .map_err(|e| ClassifyError::response_format(format!("invalid envelope: {}", e), &response_text))?;

        if let Some(error) = gemini_response.error {
            return Err(map_error(status.as_u16(), error));
        }

        let payload: String = gemini_response
            .candidates
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        debug!("Gemini entity payload: {} chars", payload.len());

        let entities = parse_entities(&payload)?;
        info!("Gemini returned {} entities", entities.len());
        Ok(entities)
    }
}

/// Lists the models visible to `api_key`. Any non-success status is
/// classified the same way a failed extraction would be.
pub async fn test_connection(
    base_url: &str,
    api_key: &str,
    timeout: Duration,
) -> Result<(), ClassifyError> {
    info!("Testing Gemini API connection");

    let client = build_client(timeout)?;
    let request = client
        .get(format!("{}/v1beta/models", base_url.trim_end_matches('/')))
        .header("x-goog-api-key", api_key);

    let (status, response_text) = send(ProviderId::Gemini, request).await?;
    if status.is_success() {
        info!("Gemini API connection test successful");
        return Ok(());
    }

    error!(
        "Gemini API connection test failed: status={}, body={}",
        status, response_text
    );
    Err(error_from_body(status.as_u16(), &response_text))
}
