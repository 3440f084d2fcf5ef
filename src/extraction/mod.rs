//! Best-effort capture of the text a user can currently see.
//!
//! The page itself is reached through [`PageDocument`], so the same heuristic
//! runs against a live DOM binding or against a [`PageSnapshot`] shipped by
//! the content script.

pub mod snapshot;

pub use snapshot::{PageSnapshot, SharedPage};

use log::debug;
use serde::{Deserialize, Serialize};

/// Main-content containers, in precedence order. The first one present wins.
pub const PRIORITY_SELECTORS: [&str; 7] = [
    "article",
    "main",
    "[role=\"main\"]",
    "#content",
    "#main",
    ".post-content",
    ".entry-content",
];

/// Elements scanned when no main-content container exists.
pub const CANDIDATE_TAGS: [&str; 11] = [
    "p", "h1", "h2", "h3", "h4", "h5", "h6", "li", "a", "span", "td",
];

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub top: f64,
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

/// The two computed-style properties the visibility test looks at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputedStyle {
    #[serde(default = "default_visibility")]
    pub visibility: String,
    #[serde(default = "default_display")]
    pub display: String,
}

fn default_visibility() -> String {
    "visible".to_string()
}

fn default_display() -> String {
    "block".to_string()
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Self {
            visibility: default_visibility(),
            display: default_display(),
        }
    }
}

/// A text-bearing element in document order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextCandidate {
    pub tag: String,
    pub text: String,
    pub rect: Rect,
    #[serde(default)]
    pub style: ComputedStyle,
}

impl TextCandidate {
    pub fn is_visible(&self, viewport: &Viewport) -> bool {
        let rect = &self.rect;
        self.style.visibility != "hidden"
            && self.style.display != "none"
            && rect.width > 0.0
            && rect.height > 0.0
            && rect.top < viewport.height
            && rect.bottom >= 0.0
            && rect.left < viewport.width
            && rect.right >= 0.0
    }

    fn is_candidate_tag(&self) -> bool {
        CANDIDATE_TAGS
            .iter()
            .any(|tag| tag.eq_ignore_ascii_case(&self.tag))
    }
}

/// Read-only view of the current document.
pub trait PageDocument: Send + Sync {
    /// Rendered text of the first element matching `selector`, if any.
    fn select_text(&self, selector: &str) -> Option<String>;

    /// Text-bearing elements in document order.
    fn text_candidates(&self) -> Vec<TextCandidate>;

    fn viewport(&self) -> Viewport;
}

/// Anything that can produce a fresh text capture on demand.
pub trait TextSource: Send + Sync {
    fn capture(&self) -> String;
}

pub struct VisibleTextExtractor<D> {
    document: D,
}

impl<D: PageDocument> VisibleTextExtractor<D> {
    pub fn new(document: D) -> Self {
        Self { document }
    }

    pub fn document(&self) -> &D {
        &self.document
    }

    /// Returns the main-content text if a priority container exists,
    /// otherwise the visible candidates joined one per line. Nested
    /// candidates can repeat text; that is accepted.
    pub fn extract(&self) -> String {
        for selector in PRIORITY_SELECTORS {
            if let Some(text) = self.document.select_text(selector) {
                debug!("Content extracted using priority selector: {}", selector);
                return text;
            }
        }

        debug!("No priority selector found, falling back to visible elements");
        let viewport = self.document.viewport();
        let mut visible_text = String::new();
        for candidate in self.document.text_candidates() {
            if candidate.is_candidate_tag() && candidate.is_visible(&viewport) {
                visible_text.push_str(&candidate.text);
                visible_text.push('\n');
            }
        }
        visible_text
    }
}

impl<D: PageDocument> TextSource for VisibleTextExtractor<D> {
    fn capture(&self) -> String {
        self.extract()
    }
}
