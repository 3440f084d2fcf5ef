use super::{Credentials, ProviderId};
use crate::error::{ClassifyError, ProviderFailure};
use log::{debug, error};
use std::time::Duration;

pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client, ClassifyError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ClassifyError::Network(format!("Failed to create HTTP client: {}", e)))
}

pub(crate) fn require_api_key(
    provider: ProviderId,
    credentials: &Credentials,
) -> Result<String, ClassifyError> {
    if credentials.is_missing() {
        return Err(ClassifyError::Configuration(format!(
            "Please set your {} API key in the extension options page.",
            super::provider_label(provider)
        )));
    }
    Ok(credentials.api_key.trim().to_string())
}

pub(crate) fn transport_error(provider: ProviderId, e: reqwest::Error) -> ClassifyError {
    error!("{} API request failed: {}", provider, e);
    if e.is_timeout() {
        ClassifyError::Network("Request timeout - please try again".to_string())
    } else if e.is_connect() {
        ClassifyError::Network("Network error - please check your connection".to_string())
    } else {
        ClassifyError::Network(format!("Request failed: {}", e))
    }
}

/// Sends a prepared request and returns the status with the full body text.
pub(crate) async fn send(
    provider: ProviderId,
    request: reqwest::RequestBuilder,
) -> Result<(reqwest::StatusCode, String), ClassifyError> {
    let response = request
        .send()
        .await
        .map_err(|e| transport_error(provider, e))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ClassifyError::Network(format!("Failed to read response: {}", e)))?;

    debug!("{} API response status: {}", provider, status);
    Ok((status, body))
}

/// Fallback classification when the error body cannot be decoded.
pub(crate) fn failure_for_status(status: u16) -> ProviderFailure {
    match status {
        401 | 403 => ProviderFailure::Authentication,
        429 => ProviderFailure::RateLimited,
        500..=599 => ProviderFailure::Server,
        _ => ProviderFailure::Other,
    }
}
