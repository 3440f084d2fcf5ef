use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

pub type TabId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TabActivation {
    pub tab_id: TabId,
    pub activated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct TabState {
    activated_at: DateTime<Utc>,
    /// Generation of the newest extract request; zero until the first one.
    generation: u64,
}

/// Tabs the user switched the overlay on for. Entries are added on
/// activation and dropped when the tab starts navigating or is closed;
/// extraction requests from any other tab are ignored.
///
/// Generations come from one counter shared by all tabs, so a number is
/// never reused after a tab is deactivated and activated again.
#[derive(Debug, Default)]
pub struct ActivatedTabs {
    tabs: HashMap<TabId, TabState>,
    last_generation: u64,
}

impl ActivatedTabs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the tab was already active. Re-activating keeps the
    /// original timestamp.
    pub fn activate(&mut self, tab_id: TabId) -> bool {
        if self.tabs.contains_key(&tab_id) {
            return false;
        }
        self.tabs.insert(
            tab_id,
            TabState {
                activated_at: Utc::now(),
                generation: 0,
            },
        );
        true
    }

    /// Records a new extract request for an active tab and returns its
    /// generation. Any reply still pending for the tab becomes stale.
    pub fn begin_extract(&mut self, tab_id: TabId) -> Option<u64> {
        let state = self.tabs.get_mut(&tab_id)?;
        self.last_generation += 1;
        state.generation = self.last_generation;
        Some(state.generation)
    }

    /// True while the tab is active and `generation` is its newest request.
    pub fn is_current(&self, tab_id: TabId, generation: u64) -> bool {
        self.tabs
            .get(&tab_id)
            .is_some_and(|state| state.generation == generation)
    }

    pub fn deactivate(&mut self, tab_id: TabId) -> bool {
        self.tabs.remove(&tab_id).is_some()
    }

    pub fn is_active(&self, tab_id: TabId) -> bool {
        self.tabs.contains_key(&tab_id)
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    pub fn list(&self) -> Vec<TabActivation> {
        let mut list: Vec<TabActivation> = self
            .tabs
            .iter()
            .map(|(tab_id, state)| TabActivation {
                tab_id: *tab_id,
                activated_at: state.activated_at,
            })
            .collect();
        list.sort_by_key(|activation| activation.tab_id);
        list
    }
}
