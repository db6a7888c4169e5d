// Edge-triggered live status tracking

use std::collections::HashMap;

/// A change in a source's live status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusTransition {
    pub key: String,
    /// `None` on the first observation of a key
    pub previous: Option<bool>,
    pub is_live: bool,
}

#[derive(Debug, Default)]
pub struct StatusTracker {
    last: HashMap<String, bool>,
}

impl StatusTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observation, returning a transition on first sight or on change
    pub fn observe(&mut self, key: &str, is_live: bool) -> Option<StatusTransition> {
        let previous = self.last.insert(key.to_string(), is_live);
        if previous == Some(is_live) {
            return None;
        }
        Some(StatusTransition {
            key: key.to_string(),
            previous,
            is_live,
        })
    }

    #[must_use]
    pub fn last_status(&self, key: &str) -> Option<bool> {
        self.last.get(key).copied()
    }
}
