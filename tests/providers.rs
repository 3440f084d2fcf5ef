use bubblener_lib::entity::EntityCategory;
use bubblener_lib::error::{ClassifyError, ProviderFailure};
use bubblener_lib::providers::{Credentials, EntityRequestClient, ProviderId, ProviderRegistry};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(5);

fn client_for(server: &MockServer, provider: ProviderId, model: &str) -> Arc<dyn EntityRequestClient> {
    ProviderRegistry::new()
        .with_base_url(provider, server.uri())
        .client(provider, model, TIMEOUT)
}

fn acme_entities() -> serde_json::Value {
    json!({
        "entities": [{
            "entity_name": "Acme Corp",
            "entity_type": "Organization",
            "description": "A manufacturer.",
            "summary_from_text": "Acme is mentioned in the article.",
            "contextual_enrichment": null
        }]
    })
}

#[tokio::test]
async fn gemini_fenced_payload_is_parsed() {
    let mock_server = MockServer::start().await;
    let payload = format!("```json\n{}\n```", acme_entities());

    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.5-flash-lite:generateContent"))
        .and(header("x-goog-api-key", "g-key"))
        .and(body_string_contains("Acme Corp announced results."))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"parts": [{"text": payload}]}}]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let entities = client_for(&mock_server, ProviderId::Gemini, "gemini-2.5-flash-lite")
        .classify("Acme Corp announced results.", 8, &Credentials::new("g-key"))
        .await
        .unwrap();

    assert_eq!(entities.len(), 1);
    assert_eq!(entities[0].name, "Acme Corp");
    assert_eq!(entities[0].category, EntityCategory::Organization);
    assert!(entities[0].enrichment.is_none());
}

#[tokio::test]
async fn openai_bare_list_is_accepted() {
    let mock_server = MockServer::start().await;
    let content = json!([acme_entities()["entities"][0]]).to_string();

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"choices": [{"message": {"content": content}}]})),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let entities = client_for(&mock_server, ProviderId::OpenAI, "gpt-4o-mini")
        .classify("text", 4, &Credentials::new("sk-test"))
        .await
        .unwrap();

    assert_eq!(entities[0].name, "Acme Corp");
}

#[tokio::test]
async fn openai_invalid_key_is_authentication_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"message": "Incorrect API key provided", "code": "invalid_api_key"}
        })))
        .mount(&mock_server)
        .await;

    let err = client_for(&mock_server, ProviderId::OpenAI, "gpt-4o-mini")
        .classify("text", 4, &Credentials::new("sk-bad"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ClassifyError::Provider {
            kind: ProviderFailure::Authentication,
            status: Some(401),
            ..
        }
    ));
    assert_eq!(err.notice().title, "Invalid API Key");
}

#[tokio::test]
async fn anthropic_rate_limit_keeps_provider_message() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "sk-ant"))
        .and(header("anthropic-version", "2023-06-01"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "type": "error",
            "error": {"type": "rate_limit_error", "message": "Number of requests has exceeded your rate limit"}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let err = client_for(&mock_server, ProviderId::Anthropic, "claude-3-5-haiku-latest")
        .classify("text", 4, &Credentials::new("sk-ant"))
        .await
        .unwrap_err();

    let notice = err.notice();
    assert_eq!(notice.title, "Rate Limit Exceeded");
    assert_eq!(notice.message, "Number of requests has exceeded your rate limit");
}

#[tokio::test]
async fn non_json_payload_is_format_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{"type": "text", "text": "Sorry, I cannot help with that."}]
        })))
        .mount(&mock_server)
        .await;

    let err = client_for(&mock_server, ProviderId::Anthropic, "claude-3-5-haiku-latest")
        .classify("text", 4, &Credentials::new("sk-ant"))
        .await
        .unwrap_err();

    match err {
        ClassifyError::ResponseFormat { raw, .. } => assert!(raw.contains("Sorry")),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn refused_connection_is_network_error() {
    // Bind then drop to get a port nothing listens on.
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let client = ProviderRegistry::new()
        .with_base_url(ProviderId::Gemini, format!("http://{}", addr))
        .client(ProviderId::Gemini, "gemini-2.5-flash-lite", TIMEOUT);
    let err = client
        .classify("text", 4, &Credentials::new("g-key"))
        .await
        .unwrap_err();

    assert!(matches!(err, ClassifyError::Network(_)));
    assert_eq!(err.notice().title, "Network Error");
}

#[tokio::test]
async fn missing_key_never_reaches_the_network() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let err = client_for(&mock_server, ProviderId::OpenAI, "gpt-4o-mini")
        .classify("text", 4, &Credentials::default())
        .await
        .unwrap_err();

    assert!(matches!(err, ClassifyError::Configuration(_)));
    assert_eq!(err.notice().title, "API Key Missing");
}

#[tokio::test]
async fn connection_test_accepts_listed_models() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .and(header("x-api-key", "sk-ant"))
        .and(header("anthropic-version", "2023-06-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let registry = ProviderRegistry::new().with_base_url(ProviderId::Anthropic, mock_server.uri());
    registry
        .test_connection(ProviderId::Anthropic, "sk-ant", TIMEOUT)
        .await
        .unwrap();
}

#[tokio::test]
async fn connection_test_rejected_key_is_authentication_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1beta/models"))
        .and(header("x-goog-api-key", "g-bad"))
        .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let registry = ProviderRegistry::new().with_base_url(ProviderId::Gemini, mock_server.uri());
    let err = registry
        .test_connection(ProviderId::Gemini, "g-bad", TIMEOUT)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ClassifyError::Provider {
            kind: ProviderFailure::Authentication,
            status: Some(401),
            ..
        }
    ));
    assert_eq!(err.notice().title, "Invalid API Key");
}

#[tokio::test]
async fn connection_test_is_bounded_by_the_timeout() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&mock_server)
        .await;

    let registry = ProviderRegistry::new().with_base_url(ProviderId::OpenAI, mock_server.uri());
    let err = registry
        .test_connection(ProviderId::OpenAI, "sk-test", Duration::from_millis(200))
        .await
        .unwrap_err();

    assert!(matches!(err, ClassifyError::Network(_)));
}
