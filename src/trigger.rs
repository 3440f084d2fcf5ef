use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

/// Quiet window after the last scroll event before the offset is checked.
pub const SCROLL_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TriggerEvent {
    Mount,
    Scroll { offset: f64 },
    Reload,
}

#[derive(Debug)]
enum ScrollInput {
    Scrolled(f64),
    Threshold(u32),
    Enabled(bool),
}

/// Cloneable sender side of an [`ExtractionTrigger`].
#[derive(Debug, Clone)]
pub struct TriggerHandle {
    inputs: mpsc::UnboundedSender<ScrollInput>,
    events: mpsc::UnboundedSender<TriggerEvent>,
}

impl TriggerHandle {
    pub fn on_scroll(&self, offset: f64) {
        let _ = self.inputs.send(ScrollInput::Scrolled(offset));
    }

    pub fn set_threshold(&self, pixels: u32) {
        let _ = self.inputs.send(ScrollInput::Threshold(pixels));
    }

    /// While disabled, scrolling only records the offset. Re-enabling makes
    /// the latest offset the new reference point.
    pub fn set_enabled(&self, enabled: bool) {
        let _ = self.inputs.send(ScrollInput::Enabled(enabled));
    }

    pub fn request_reload(&self) {
        let _ = self.events.send(TriggerEvent::Reload);
    }
}

/// Decides when extraction runs: once on mount, and after scrolling settles
/// at least `threshold` pixels away from the last triggering offset.
/// Dropping it cancels any pending debounce.
pub struct ExtractionTrigger {
    handle: TriggerHandle,
    mounted: AtomicBool,
    worker: JoinHandle<()>,
}

impl ExtractionTrigger {
    /// Must be called inside a tokio runtime.
    pub fn new(initial_offset: f64, threshold: u32) -> (Self, mpsc::UnboundedReceiver<TriggerEvent>) {
        let (inputs_tx, inputs_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let debouncer = ScrollDebouncer {
            anchor: initial_offset,
            latest: initial_offset,
            threshold,
            enabled: true,
            deadline: None,
        };
        let worker = tokio::spawn(run_debouncer(inputs_rx, events_tx.clone(), debouncer));

        let trigger = Self {
            handle: TriggerHandle {
                inputs: inputs_tx,
                events: events_tx,
            },
            mounted: AtomicBool::new(false),
            worker,
        };
        (trigger, events_rx)
    }

    pub fn handle(&self) -> TriggerHandle {
        self.handle.clone()
    }

    /// Fires [`TriggerEvent::Mount`] the first time only.
    pub fn mount(&self) -> bool {
        if self.mounted.swap(true, Ordering::SeqCst) {
            return false;
        }
        let _ = self.handle.events.send(TriggerEvent::Mount);
        true
    }

    pub fn on_scroll(&self, offset: f64) {
        self.handle.on_scroll(offset);
    }

    pub fn set_threshold(&self, pixels: u32) {
        self.handle.set_threshold(pixels);
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.handle.set_enabled(enabled);
    }

    pub fn teardown(self) {
        debug!("Extraction trigger torn down");
    }
}

impl Drop for ExtractionTrigger {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

struct ScrollDebouncer {
    anchor: f64,
    latest: f64,
    threshold: u32,
    enabled: bool,
    deadline: Option<Instant>,
}

impl ScrollDebouncer {
    fn handle(&mut self, input: ScrollInput) {
        match input {
            ScrollInput::Scrolled(offset) => {
                self.latest = offset;
                if self.enabled {
                    self.deadline = Some(Instant::now() + SCROLL_DEBOUNCE);
                }
            }
            ScrollInput::Threshold(pixels) => self.threshold = pixels,
            ScrollInput::Enabled(enabled) => {
                self.enabled = enabled;
                self.deadline = None;
                if enabled {
                    self.anchor = self.latest;
                }
            }
        }
    }

    /// Compares against the last triggering offset, never the last raw one.
    fn settle(&mut self) -> Option<f64> {
        if !self.enabled {
            return None;
        }
        let delta = (self.latest - self.anchor).abs();
        if delta >= f64::from(self.threshold) {
            self.anchor = self.latest;
            Some(self.latest)
        } else {
            debug!(
                "Scroll of {:.0}px is below the {}px threshold",
                delta, self.threshold
            );
            None
        }
    }
}

async fn run_debouncer(
    mut inputs: mpsc::UnboundedReceiver<ScrollInput>,
    events: mpsc::UnboundedSender<TriggerEvent>,
    mut state: ScrollDebouncer,
) {
    loop {
        let input = match state.deadline {
            Some(deadline) => tokio::select! {
                input = inputs.recv() => input,
                _ = sleep_until(deadline) => {
                    state.deadline = None;
                    if let Some(offset) = state.settle() {
                        info!("Significant scroll detected at {:.0}px", offset);
                        if events.send(TriggerEvent::Scroll { offset }).is_err() {
                            break;
                        }
                    }
                    continue;
                }
            },
            None => inputs.recv().await,
        };

        match input {
            Some(input) => state.handle(input),
            None => break,
        }
    }
}
