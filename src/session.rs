use crate::entity::Entity;
use crate::error::{ClassifyError, ErrorNotice};
use crate::extraction::TextSource;
use crate::providers::ClientResolver;
use crate::settings::ExtractionConfiguration;
use crate::trigger::TriggerEvent;
use log::{debug, error, info, warn};
use serde::Serialize;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

/// How long a failure stays on screen before it is cleared.
pub const ERROR_DISPLAY_DURATION: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Idle,
    Loading,
    Ready,
    Failed,
}

/// Read-only view of the session handed to presentation code.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub entities: Vec<Entity>,
    pub error: Option<ErrorNotice>,
    pub visible: bool,
    /// Identifier of the most recent request. Results from older requests
    /// are never applied.
    pub generation: u64,
}

#[derive(Debug)]
struct SessionState {
    phase: Phase,
    entities: Vec<Entity>,
    error: Option<ErrorNotice>,
    visible: bool,
    generation: u64,
}

impl SessionState {
    fn new() -> Self {
        Self {
            phase: Phase::Idle,
            entities: Vec::new(),
            error: None,
            visible: true,
            generation: 0,
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            entities: self.entities.clone(),
            error: self.error.clone(),
            visible: self.visible,
            generation: self.generation,
        }
    }
}

struct Core {
    state: SessionState,
    config: ExtractionConfiguration,
    error_timer: Option<JoinHandle<()>>,
}

impl Core {
    fn cancel_error_timer(&mut self) {
        if let Some(timer) = self.error_timer.take() {
            timer.abort();
        }
    }
}

struct Inner {
    core: Mutex<Core>,
    resolver: Arc<dyn ClientResolver>,
    source: Arc<dyn TextSource>,
    updates: watch::Sender<SessionSnapshot>,
}

/// Owns the session state machine. All mutation goes through this type;
/// everyone else reads [`SessionSnapshot`]s.
#[derive(Clone)]
pub struct OverlaySessionController {
    inner: Arc<Inner>,
}

impl OverlaySessionController {
    pub fn new(
        config: ExtractionConfiguration,
        resolver: Arc<dyn ClientResolver>,
        source: Arc<dyn TextSource>,
    ) -> Self {
        let state = SessionState::new();
        let (updates, _) = watch::channel(state.snapshot());

        Self {
            inner: Arc::new(Inner {
                core: Mutex::new(Core {
                    state,
                    config,
                    error_timer: None,
                }),
                resolver,
                source,
                updates,
            }),
        }
    }

    /// Starts a new request for `text`. Returns the request generation, or
    /// `None` when the overlay is hidden or there is no text to send.
    pub async fn trigger(&self, text: &str) -> Option<u64> {
        let mut core = self.inner.core.lock().await;
        if !core.state.visible {
            debug!("Overlay hidden, ignoring extraction trigger");
            return None;
        }
        if text.trim().is_empty() {
            debug!("No visible text, ignoring extraction trigger");
            return None;
        }

        let text = truncate_chars(text, core.config.max_characters);

        core.state.generation += 1;
        let generation = core.state.generation;
        core.state.phase = Phase::Loading;
        core.state.entities.clear();
        core.state.error = None;
        core.cancel_error_timer();

        let client = self.inner.resolver.resolve(&core.config);
        let credentials = core.config.credentials();
        let max_entities = core.config.max_entities;
        self.publish(&core);
        drop(core);

        info!(
            "Starting extraction request {} via {} ({} chars)",
            generation,
            client.provider(),
            text.chars().count()
        );

        let controller = self.clone();
        tokio::spawn(async move {
            let result = client.classify(&text, max_entities, &credentials).await;
            controller.complete(generation, result).await;
        });

        Some(generation)
    }

    /// Captures fresh text from the page and triggers on it.
    pub async fn reload(&self) -> Option<u64> {
        let text = self.inner.source.capture();
        self.trigger(&text).await
    }

    /// Hiding discards the current result and invalidates any request in
    /// flight. Showing again re-extracts only when `reextract_on_show` is set.
    pub async fn set_visible(&self, visible: bool) -> Option<u64> {
        let reextract = {
            let mut core = self.inner.core.lock().await;
            if core.state.visible == visible {
                return None;
            }
            core.state.visible = visible;

            if !visible {
                core.state.generation += 1;
                core.state.phase = Phase::Idle;
                core.state.entities.clear();
                core.state.error = None;
                core.cancel_error_timer();
            }
            debug!("Overlay visibility set to {}", visible);
            self.publish(&core);

            visible && core.config.reextract_on_show
        };

        if reextract {
            self.reload().await
        } else {
            None
        }
    }

    /// Replaces the configuration. A change to `max_characters` re-extracts
    /// right away; everything else applies to the next trigger.
    pub async fn reconfigure(&self, config: ExtractionConfiguration) -> Option<u64> {
        let rerun = {
            let mut core = self.inner.core.lock().await;
            let rerun = core.config.max_characters != config.max_characters;
            core.config = config;
            rerun
        };

        if rerun {
            info!("Character budget changed, re-extracting");
            self.reload().await
        } else {
            None
        }
    }

    /// Closes the error toast early.
    pub async fn dismiss_error(&self) {
        let mut core = self.inner.core.lock().await;
        if core.state.error.is_none() {
            return;
        }
        core.cancel_error_timer();
        core.state.error = None;
        if core.state.phase == Phase::Failed {
            core.state.phase = Phase::Idle;
        }
        self.publish(&core);
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.updates.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.updates.subscribe()
    }

    pub async fn config(&self) -> ExtractionConfiguration {
        self.inner.core.lock().await.config.clone()
    }

    /// Runs a fresh extraction for every trigger event until the sender
    /// side goes away.
    pub async fn run_triggers(self, mut events: mpsc::UnboundedReceiver<TriggerEvent>) {
        while let Some(event) = events.recv().await {
            debug!("Trigger event: {:?}", event);
            self.reload().await;
        }
        debug!("Trigger channel closed");
    }

    async fn complete(&self, generation: u64, result: Result<Vec<Entity>, ClassifyError>) {
        let mut core = self.inner.core.lock().await;
        if core.state.generation != generation {
            debug!(
                "Discarding stale response for request {} (current is {})",
                generation, core.state.generation
            );
            return;
        }

        match result {
            Ok(entities) => {
                info!("Request {} returned {} entities", generation, entities.len());
                core.cancel_error_timer();
                core.state.phase = Phase::Ready;
                core.state.entities = entities;
                core.state.error = None;
            }
            Err(err) => {
                match &err {
                    ClassifyError::ResponseFormat { reason, raw } => {
                        error!("Unreadable provider response ({}): {}", reason, raw)
                    }
                    other => warn!("Request {} failed: {}", generation, other),
                }
                core.state.phase = Phase::Failed;
                core.state.error = Some(err.notice());
                self.schedule_error_clear(&mut core, generation);
            }
        }

        self.publish(&core);
    }

    fn schedule_error_clear(&self, core: &mut Core, generation: u64) {
        core.cancel_error_timer();
        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        core.error_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(ERROR_DISPLAY_DURATION).await;
            if let Some(inner) = inner.upgrade() {
                OverlaySessionController { inner }.clear_error(generation).await;
            }
        }));
    }

    async fn clear_error(&self, generation: u64) {
        let mut core = self.inner.core.lock().await;
        // Dropping our own handle detaches it; aborting would be a no-op.
        core.error_timer = None;
        if core.state.generation != generation || core.state.phase != Phase::Failed {
            return;
        }
        debug!("Clearing error for request {}", generation);
        core.state.error = None;
        core.state.phase = Phase::Idle;
        self.publish(&core);
    }

    fn publish(&self, core: &Core) {
        self.inner.updates.send_replace(core.state.snapshot());
    }
}

/// Hard cut at `max_chars` Unicode scalar values.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}
