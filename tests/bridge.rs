use async_trait::async_trait;
use bubblener_lib::bridge::{HostBridge, HostReply};
use bubblener_lib::entity::{Entity, EntityCategory};
use bubblener_lib::error::ClassifyError;
use bubblener_lib::providers::{
    ClientResolver, Credentials, EntityRequestClient, ProviderId, ProviderRegistry,
};
use bubblener_lib::settings::{ExtractionConfiguration, JsonSettingsStore};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Names one entity after the text it was given. "first" answers slowly.
struct SlowFirstClient;

#[async_trait]
impl EntityRequestClient for SlowFirstClient {
    fn provider(&self) -> ProviderId {
        ProviderId::Gemini
    }

    async fn classify(
        &self,
        text: &str,
        _max_entities: u32,
        _credentials: &Credentials,
    ) -> Result<Vec<Entity>, ClassifyError> {
        if text == "first" {
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
        Ok(vec![Entity {
            name: text.to_string(),
            category: EntityCategory::Concept,
            short_description: String::new(),
            summary: String::new(),
            enrichment: None,
        }])
    }
}

struct SlowFirst;

impl ClientResolver for SlowFirst {
    fn resolve(&self, _config: &ExtractionConfiguration) -> Arc<dyn EntityRequestClient> {
        Arc::new(SlowFirstClient)
    }
}

async fn start_bridge() -> (HostBridge, Socket) {
    // Unroutable base URL: no test here may reach a real provider.
    let registry = ProviderRegistry::new().with_base_url(ProviderId::Gemini, "http://127.0.0.1:9");
    start_bridge_with(Arc::new(registry)).await
}

async fn start_bridge_with(resolver: Arc<dyn ClientResolver>) -> (HostBridge, Socket) {
    let store = Arc::new(JsonSettingsStore::in_memory());
    let bridge = HostBridge::new(0, store, resolver);
    let addr = bridge.start().await.unwrap();

    let (socket, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
    (bridge, socket)
}

async fn send(socket: &mut Socket, message: serde_json::Value) {
    socket.send(Message::text(message.to_string())).await.unwrap();
}

async fn next_reply(socket: &mut Socket) -> HostReply {
    loop {
        let msg = timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for a reply")
            .expect("connection closed")
            .unwrap();
        if let Ok(text) = msg.to_text() {
            if !text.is_empty() {
                return serde_json::from_str(text).unwrap();
            }
        }
    }
}

#[tokio::test]
async fn activation_is_acknowledged_and_tracked() {
    let (bridge, mut socket) = start_bridge().await;

    send(&mut socket, json!({"type": "activate", "tab_id": 12})).await;
    assert_eq!(next_reply(&mut socket).await, HostReply::Activated { tab_id: 12 });

    let tabs = bridge.activated_tabs().await;
    assert_eq!(tabs.len(), 1);
    assert_eq!(tabs[0].tab_id, 12);
}

#[tokio::test]
async fn extract_without_api_key_reports_missing_key() {
    let (_bridge, mut socket) = start_bridge().await;

    send(&mut socket, json!({"type": "activate", "tab_id": 1})).await;
    next_reply(&mut socket).await;

    send(&mut socket, json!({"type": "extract", "tab_id": 1, "text": "Acme Corp"})).await;
    match next_reply(&mut socket).await {
        HostReply::Error(notice) => assert_eq!(notice.title, "API Key Missing"),
        other => panic!("unexpected reply: {:?}", other),
    }
}

#[tokio::test]
async fn inactive_tabs_are_ignored() {
    let (bridge, mut socket) = start_bridge().await;

    send(&mut socket, json!({"type": "activate", "tab_id": 1})).await;
    next_reply(&mut socket).await;
    send(&mut socket, json!({"type": "navigation_started", "tab_id": 1})).await;

    // Neither the navigated tab nor an unknown one gets a reply; the next
    // message on the wire is the acknowledgement below.
    send(&mut socket, json!({"type": "extract", "tab_id": 1, "text": "old page"})).await;
    send(&mut socket, json!({"type": "extract", "tab_id": 2, "text": "other tab"})).await;
    send(&mut socket, json!({"type": "activate", "tab_id": 3})).await;

    assert_eq!(next_reply(&mut socket).await, HostReply::Activated { tab_id: 3 });
    let ids: Vec<i64> = bridge
        .activated_tabs()
        .await
        .into_iter()
        .map(|t| t.tab_id)
        .collect();
    assert_eq!(ids, vec![3]);
}

#[tokio::test]
async fn only_the_newest_extract_is_answered() {
    let (_bridge, mut socket) = start_bridge_with(Arc::new(SlowFirst)).await;

    send(&mut socket, json!({"type": "activate", "tab_id": 5})).await;
    next_reply(&mut socket).await;

    send(&mut socket, json!({"type": "extract", "tab_id": 5, "text": "first"})).await;
    send(&mut socket, json!({"type": "extract", "tab_id": 5, "text": "second"})).await;

    match next_reply(&mut socket).await {
        HostReply::Entities(graph) => assert_eq!(graph.nodes[0].name, "second"),
        other => panic!("unexpected reply: {:?}", other),
    }

    // The slow "first" reply finishes after "second" and must be dropped.
    let late = timeout(Duration::from_secs(1), socket.next()).await;
    assert!(late.is_err(), "stale reply delivered: {:?}", late);
}

#[tokio::test]
async fn navigating_away_drops_the_pending_reply() {
    let (_bridge, mut socket) = start_bridge_with(Arc::new(SlowFirst)).await;

    send(&mut socket, json!({"type": "activate", "tab_id": 6})).await;
    next_reply(&mut socket).await;

    send(&mut socket, json!({"type": "extract", "tab_id": 6, "text": "first"})).await;
    send(&mut socket, json!({"type": "navigation_started", "tab_id": 6})).await;

    let late = timeout(Duration::from_secs(1), socket.next()).await;
    assert!(late.is_err(), "reply delivered after navigation: {:?}", late);
}
