use super::tabs::TabId;
use crate::entity::Entity;
use crate::error::ErrorNotice;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Messages sent by the browser extension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostRequest {
    Activate {
        tab_id: TabId,
    },
    NavigationStarted {
        tab_id: TabId,
    },
    TabClosed {
        tab_id: TabId,
    },
    Extract {
        tab_id: TabId,
        #[serde(default)]
        text: String,
    },
}

/// Entities as the content script renders them. `links` is always empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityGraph {
    pub nodes: Vec<Entity>,
    #[serde(default)]
    pub links: Vec<Value>,
}

impl EntityGraph {
    pub fn new(nodes: Vec<Entity>) -> Self {
        Self {
            nodes,
            links: Vec::new(),
        }
    }
}

/// Replies to the extension: `{"entities": {...}}`, `{"error": {...}}` or
/// `{"activated": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostReply {
    Entities(EntityGraph),
    Error(ErrorNotice),
    Activated { tab_id: TabId },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_extension_messages() {
        let request: HostRequest =
            serde_json::from_value(json!({"type": "extract", "tab_id": 4, "text": "hi"})).unwrap();
        assert_eq!(
            request,
            HostRequest::Extract {
                tab_id: 4,
                text: "hi".to_string()
            }
        );

        let request: HostRequest =
            serde_json::from_value(json!({"type": "navigation_started", "tab_id": 4})).unwrap();
        assert_eq!(request, HostRequest::NavigationStarted { tab_id: 4 });
    }

    #[test]
    fn replies_use_extension_shapes() {
        let reply = HostReply::Entities(EntityGraph::new(Vec::new()));
        assert_eq!(
            serde_json::to_value(&reply).unwrap(),
            json!({"entities": {"nodes": [], "links": []}})
        );

        let reply = HostReply::Error(ErrorNotice::new("Network Error", "offline"));
        assert_eq!(
            serde_json::to_value(&reply).unwrap(),
            json!({"error": {"title": "Network Error", "message": "offline"}})
        );

        let reply = HostReply::Activated { tab_id: 1 };
        assert_eq!(
            serde_json::to_value(&reply).unwrap(),
            json!({"activated": {"tab_id": 1}})
        );
    }
}
