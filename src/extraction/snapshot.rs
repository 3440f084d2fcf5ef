use super::{PageDocument, TextCandidate, Viewport};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerText {
    pub selector: String,
    pub text: String,
}

/// Serialized page state posted by the content script: the text of any
/// main-content containers it found plus the candidate elements with their
/// layout.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PageSnapshot {
    #[serde(default)]
    pub url: Option<String>,
    pub viewport: Viewport,
    #[serde(default)]
    pub scroll_y: f64,
    #[serde(default)]
    pub containers: Vec<ContainerText>,
    #[serde(default)]
    pub candidates: Vec<TextCandidate>,
}

impl PageSnapshot {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            viewport,
            ..Self::default()
        }
    }

    pub fn add_container(&mut self, selector: impl Into<String>, text: impl Into<String>) {
        self.containers.push(ContainerText {
            selector: selector.into(),
            text: text.into(),
        });
    }
}

impl PageDocument for PageSnapshot {
    fn select_text(&self, selector: &str) -> Option<String> {
        self.containers
            .iter()
            .find(|c| c.selector == selector)
            .map(|c| c.text.clone())
    }

    fn text_candidates(&self) -> Vec<TextCandidate> {
        self.candidates.clone()
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }
}

/// A snapshot that the content script keeps replacing as the page changes.
#[derive(Debug, Clone, Default)]
pub struct SharedPage {
    inner: Arc<RwLock<PageSnapshot>>,
}

impl SharedPage {
    pub fn new(snapshot: PageSnapshot) -> Self {
        Self {
            inner: Arc::new(RwLock::new(snapshot)),
        }
    }

    pub fn replace(&self, snapshot: PageSnapshot) {
        *self.inner.write().unwrap_or_else(|p| p.into_inner()) = snapshot;
    }

    pub fn snapshot(&self) -> PageSnapshot {
        self.inner.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn scroll_y(&self) -> f64 {
        self.inner.read().unwrap_or_else(|p| p.into_inner()).scroll_y
    }
}

impl PageDocument for SharedPage {
    fn select_text(&self, selector: &str) -> Option<String> {
        self.inner
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .select_text(selector)
    }

    fn text_candidates(&self) -> Vec<TextCandidate> {
        self.inner
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .text_candidates()
    }

    fn viewport(&self) -> Viewport {
        self.inner.read().unwrap_or_else(|p| p.into_inner()).viewport
    }
}
