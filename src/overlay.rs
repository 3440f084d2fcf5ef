use crate::extraction::TextSource;
use crate::providers::ClientResolver;
use crate::session::{OverlaySessionController, SessionSnapshot};
use crate::settings::{ExtractionConfiguration, SettingKey, SettingsStore};
use crate::trigger::{ExtractionTrigger, TriggerHandle};
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

/// One mounted overlay: the session controller, its extraction trigger and
/// the settings subscription that keeps both in sync with the store.
/// Dropping it stops every timer and background task it started.
pub struct Overlay {
    controller: OverlaySessionController,
    trigger: ExtractionTrigger,
    driver: JoinHandle<()>,
    settings_watch: JoinHandle<()>,
}

impl Overlay {
    /// Loads the configuration, starts the background tasks and fires the
    /// mount trigger. Must be called inside a tokio runtime.
    pub fn mount(
        store: Arc<dyn SettingsStore>,
        resolver: Arc<dyn ClientResolver>,
        source: Arc<dyn TextSource>,
        initial_scroll: f64,
    ) -> Self {
        let config = ExtractionConfiguration::load(store.as_ref());
        let changes = store.subscribe();

        let (trigger, events) =
            ExtractionTrigger::new(initial_scroll, config.scroll_threshold_pixels);
        let controller = OverlaySessionController::new(config, resolver, source);

        let driver = tokio::spawn(controller.clone().run_triggers(events));
        let settings_watch = tokio::spawn(watch_settings(
            store,
            changes,
            controller.clone(),
            trigger.handle(),
        ));

        trigger.mount();
        info!("Overlay mounted at scroll offset {:.0}", initial_scroll);

        Self {
            controller,
            trigger,
            driver,
            settings_watch,
        }
    }

    pub fn on_scroll(&self, offset: f64) {
        self.trigger.on_scroll(offset);
    }

    /// Scroll tracking pauses while the overlay is collapsed.
    pub async fn set_visible(&self, visible: bool) -> Option<u64> {
        self.trigger.set_enabled(visible);
        self.controller.set_visible(visible).await
    }

    pub async fn reload(&self) -> Option<u64> {
        self.controller.reload().await
    }

    pub async fn dismiss_error(&self) {
        self.controller.dismiss_error().await;
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.controller.snapshot()
    }

    pub fn controller(&self) -> &OverlaySessionController {
        &self.controller
    }

    pub fn teardown(self) {
        debug!("Overlay torn down");
    }
}

impl Drop for Overlay {
    fn drop(&mut self) {
        self.driver.abort();
        self.settings_watch.abort();
    }
}

async fn watch_settings(
    store: Arc<dyn SettingsStore>,
    mut changes: broadcast::Receiver<Vec<SettingKey>>,
    controller: OverlaySessionController,
    trigger: TriggerHandle,
) {
    loop {
        let changed = match changes.recv().await {
            Ok(keys) => keys,
            Err(RecvError::Lagged(skipped)) => {
                warn!("Missed {} settings notifications, reloading everything", skipped);
                SettingKey::ALL.to_vec()
            }
            Err(RecvError::Closed) => break,
        };

        let config = ExtractionConfiguration::load(store.as_ref());
        if changed.contains(&SettingKey::ScrollThresholdPixels) {
            trigger.set_threshold(config.scroll_threshold_pixels);
        }
        controller.reconfigure(config).await;
    }
}
