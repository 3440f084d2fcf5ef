//! WebSocket endpoint the browser extension talks to. It tracks which tabs
//! are activated and answers their extraction requests.

pub mod protocol;
pub mod tabs;

pub use protocol::{EntityGraph, HostReply, HostRequest};
pub use tabs::{ActivatedTabs, TabActivation, TabId};

use crate::providers::ClientResolver;
use crate::session::truncate_chars;
use crate::settings::{ExtractionConfiguration, SettingsStore};
use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

pub const DEFAULT_PORT: u16 = 9876;

/// Runs one classification for an extension request and wraps the outcome
/// in the reply shape the content script expects.
pub async fn process_extract(
    config: &ExtractionConfiguration,
    resolver: &dyn ClientResolver,
    text: &str,
) -> HostReply {
    let client = resolver.resolve(config);
    let text = truncate_chars(text, config.max_characters);

    match client
        .classify(&text, config.max_entities, &config.credentials())
        .await
    {
        Ok(entities) => {
            info!("Sending {} entities to the extension", entities.len());
            HostReply::Entities(EntityGraph::new(entities))
        }
        Err(e) => {
            error!("Entity extraction for the extension failed: {}", e);
            HostReply::Error(e.notice())
        }
    }
}

#[derive(Clone)]
struct BridgeContext {
    store: Arc<dyn SettingsStore>,
    resolver: Arc<dyn ClientResolver>,
    tabs: Arc<RwLock<ActivatedTabs>>,
}

pub struct HostBridge {
    port: u16,
    context: BridgeContext,
}

impl HostBridge {
    pub fn new(
        port: u16,
        store: Arc<dyn SettingsStore>,
        resolver: Arc<dyn ClientResolver>,
    ) -> Self {
        Self {
            port,
            context: BridgeContext {
                store,
                resolver,
                tabs: Arc::new(RwLock::new(ActivatedTabs::new())),
            },
        }
    }

    /// Binds the listener and serves connections in the background. Port 0
    /// picks a free port; the bound address is returned.
    pub async fn start(&self) -> anyhow::Result<SocketAddr> {
        let addr = format!("127.0.0.1:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind WebSocket server on {}", addr))?;
        let local_addr = listener.local_addr()?;

        info!("Host bridge listening on ws://{}", local_addr);

        let context = self.context.clone();
        tokio::spawn(async move {
            while let Ok((stream, peer)) = listener.accept().await {
                debug!("Browser extension connected from: {}", peer);
                tokio::spawn(handle_connection(stream, context.clone()));
            }
        });

        Ok(local_addr)
    }

    pub async fn activated_tabs(&self) -> Vec<TabActivation> {
        self.context.tabs.read().await.list()
    }
}

async fn handle_connection(stream: TcpStream, context: BridgeContext) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws_stream) => ws_stream,
        Err(e) => {
            error!("WebSocket handshake failed: {}", e);
            return;
        }
    };
    let (mut write, mut read) = ws_stream.split();

    let (replies, mut outgoing) = mpsc::unbounded_channel::<HostReply>();
    let writer = tokio::spawn(async move {
        while let Some(reply) = outgoing.recv().await {
            let payload = match serde_json::to_string(&reply) {
                Ok(payload) => payload,
                Err(e) => {
                    error!("Failed to serialize reply: {}", e);
                    continue;
                }
            };
            if let Err(e) = write.send(Message::text(payload)).await {
                debug!("Failed to send reply: {}", e);
                break;
            }
        }
    });

    while let Some(msg_result) = read.next().await {
        let msg = match msg_result {
            Ok(msg) => msg,
            Err(e) => {
                debug!("WebSocket error: {}", e);
                break;
            }
        };
        if !msg.is_text() {
            continue;
        }
        let Ok(text) = msg.to_text() else {
            continue;
        };
        match serde_json::from_str::<HostRequest>(text) {
            Ok(request) => handle_request(request, &context, &replies).await,
            Err(e) => warn!("Ignoring malformed extension message: {}", e),
        }
    }

    debug!("Browser extension disconnected");
    drop(replies);
    // In-flight extractions keep their own sender; the writer exits once
    // they have replied.
    if let Err(e) = writer.await {
        debug!("Reply writer ended abnormally: {}", e);
    }
}

async fn handle_request(
    request: HostRequest,
    context: &BridgeContext,
    replies: &mpsc::UnboundedSender<HostReply>,
) {
    match request {
        HostRequest::Activate { tab_id } => {
            if context.tabs.write().await.activate(tab_id) {
                info!("Overlay activated for tab {}", tab_id);
            }
            let _ = replies.send(HostReply::Activated { tab_id });
        }
        HostRequest::NavigationStarted { tab_id } | HostRequest::TabClosed { tab_id } => {
            if context.tabs.write().await.deactivate(tab_id) {
                info!("Overlay deactivated for tab {}", tab_id);
            }
        }
        HostRequest::Extract { tab_id, text } => {
            if text.trim().is_empty() {
                debug!("Ignoring extract with no text from tab {}", tab_id);
                return;
            }
            let Some(generation) = context.tabs.write().await.begin_extract(tab_id) else {
                debug!("Ignoring extract from inactive tab {}", tab_id);
                return;
            };

            debug!("Received {} chars from tab {}", text.chars().count(), tab_id);
            let config = ExtractionConfiguration::load(context.store.as_ref());
            let resolver = context.resolver.clone();
            let tabs = context.tabs.clone();
            let replies = replies.clone();
            tokio::spawn(async move {
                let reply = process_extract(&config, resolver.as_ref(), &text).await;
                // Only the newest request of a still-active tab is answered.
                if !tabs.read().await.is_current(tab_id, generation) {
                    debug!("Dropping stale reply for tab {}", tab_id);
                    return;
                }
                let _ = replies.send(reply);
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Entity, EntityCategory};
    use crate::error::{ClassifyError, ProviderFailure};
    use crate::providers::{Credentials, EntityRequestClient, ProviderId, ProviderRegistry};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct EchoClient {
        seen: Mutex<Vec<(String, u32)>>,
        fail: Option<ClassifyError>,
    }

    #[async_trait]
    impl EntityRequestClient for EchoClient {
        fn provider(&self) -> ProviderId {
            ProviderId::OpenAI
        }

        async fn classify(
            &self,
            text: &str,
            max_entities: u32,
            _credentials: &Credentials,
        ) -> Result<Vec<Entity>, ClassifyError> {
            self.seen.lock().unwrap().push((text.to_string(), max_entities));
            if let Some(err) = &self.fail {
                return Err(err.clone());
            }
            Ok(vec![Entity {
                name: "Echo".to_string(),
                category: EntityCategory::Concept,
                short_description: text.to_string(),
                summary: String::new(),
                enrichment: None,
            }])
        }
    }

    struct Always(Arc<EchoClient>);

    impl ClientResolver for Always {
        fn resolve(&self, _config: &ExtractionConfiguration) -> Arc<dyn EntityRequestClient> {
            self.0.clone()
        }
    }

    fn echo(fail: Option<ClassifyError>) -> Arc<EchoClient> {
        Arc::new(EchoClient {
            seen: Mutex::new(Vec::new()),
            fail,
        })
    }

    #[tokio::test]
    async fn success_is_wrapped_as_entity_graph() {
        let client = echo(None);
        let mut config = ExtractionConfiguration::default();
        config.max_characters = 5;
        config.max_entities = 3;

        let reply = process_extract(&config, &Always(client.clone()), "abcdefgh").await;
        match reply {
            HostReply::Entities(graph) => {
                assert_eq!(graph.nodes.len(), 1);
                assert!(graph.links.is_empty());
            }
            other => panic!("unexpected reply: {:?}", other),
        }
        assert_eq!(
            client.seen.lock().unwrap().as_slice(),
            &[("abcde".to_string(), 3)]
        );
    }

    #[tokio::test]
    async fn failure_becomes_error_notice() {
        let client = echo(Some(ClassifyError::provider(
            ProviderFailure::QuotaExceeded,
            Some(429),
            Some("You exceeded your current quota".to_string()),
        )));
        let reply =
            process_extract(&ExtractionConfiguration::default(), &Always(client), "text").await;
        match reply {
            HostReply::Error(notice) => {
                assert_eq!(notice.title, "Quota Exceeded");
                assert_eq!(notice.message, "You exceeded your current quota");
            }
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_key_is_reported_before_any_request() {
        let registry = ProviderRegistry::new().with_base_url(ProviderId::Gemini, "http://127.0.0.1:9");
        let reply =
            process_extract(&ExtractionConfiguration::default(), &registry, "some page text").await;
        match reply {
            HostReply::Error(notice) => {
                assert_eq!(notice.title, "API Key Missing");
                assert!(notice.message.contains("Google Gemini"));
            }
            other => panic!("unexpected reply: {:?}", other),
        }
    }
}
