use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What the provider reported when it refused a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderFailure {
    Authentication,
    RateLimited,
    QuotaExceeded,
    Server,
    Other,
}

/// Failure of a single classification attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClassifyError {
    /// Missing or unusable credentials detected before any request was sent.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("provider error ({kind:?}, status {status:?}): {}", .message.as_deref().unwrap_or("no message"))]
    Provider {
        kind: ProviderFailure,
        status: Option<u16>,
        message: Option<String>,
    },

    /// The body could not be turned into an entity list. `raw` keeps the body
    /// for diagnosis; it is never shown to the user.
    #[error("response format error: {reason}")]
    ResponseFormat { reason: String, raw: String },

    #[error("network error: {0}")]
    Network(String),
}

/// The `{title, message}` record shown in the error toast and sent over the
/// host messaging boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorNotice {
    pub title: String,
    pub message: String,
}

impl ErrorNotice {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
        }
    }
}

impl ClassifyError {
    pub fn provider(kind: ProviderFailure, status: Option<u16>, message: Option<String>) -> Self {
        ClassifyError::Provider {
            kind,
            status,
            message: message.filter(|m| !m.trim().is_empty()),
        }
    }

    pub fn response_format(reason: impl Into<String>, raw: impl Into<String>) -> Self {
        ClassifyError::ResponseFormat {
            reason: reason.into(),
            raw: raw.into(),
        }
    }

    pub fn notice(&self) -> ErrorNotice {
        match self {
            ClassifyError::Configuration(message) => ErrorNotice::new("API Key Missing", message),
            ClassifyError::Provider { kind, message, .. } => {
                let (title, fallback) = match kind {
                    ProviderFailure::Authentication => (
                        "Invalid API Key",
                        "The provider rejected the API key. Check it in the extension options.",
                    ),
                    ProviderFailure::RateLimited => (
                        "Rate Limit Exceeded",
                        "Rate limit exceeded - please wait and try again.",
                    ),
                    ProviderFailure::QuotaExceeded => (
                        "Quota Exceeded",
                        "API quota exceeded - please check your account.",
                    ),
                    ProviderFailure::Server | ProviderFailure::Other => (
                        "Provider Error",
                        "The entity provider returned an error.",
                    ),
                };
                ErrorNotice::new(title, message.clone().unwrap_or_else(|| fallback.to_string()))
            }
            ClassifyError::ResponseFormat { .. } => ErrorNotice::new(
                "Unexpected Response",
                "Could not read the entities returned by the provider.",
            ),
            ClassifyError::Network(_) => ErrorNotice::new(
                "Network Error",
                "Could not reach the entity provider - please check your connection.",
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authentication_failure_mentions_api_key() {
        let err = ClassifyError::provider(ProviderFailure::Authentication, Some(401), None);
        let notice = err.notice();
        assert_eq!(notice.title, "Invalid API Key");
        assert!(notice.message.contains("API key"));
    }

    #[test]
    fn provider_message_wins_over_generic_text() {
        let err = ClassifyError::provider(
            ProviderFailure::Server,
            Some(500),
            Some("backend exploded".to_string()),
        );
        assert_eq!(err.notice().message, "backend exploded");
    }

    #[test]
    fn blank_provider_message_is_dropped() {
        let err = ClassifyError::provider(ProviderFailure::RateLimited, Some(429), Some("  ".into()));
        assert_eq!(
            err.notice().message,
            "Rate limit exceeded - please wait and try again."
        );
    }

    #[test]
    fn format_errors_hide_raw_body_from_user() {
        let err = ClassifyError::response_format("not json", "<html>oops</html>");
        let notice = err.notice();
        assert!(!notice.message.contains("oops"));
        assert!(err.to_string().contains("not json"));
    }
}
