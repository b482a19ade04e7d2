use pagepilot_core_types::{LocatorSet, Snapshot};
use serde::{Deserialize, Serialize};

/// Result of one capture pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Capture {
    pub snapshot: Snapshot,
    /// Locators for every element in `snapshot`, keyed by uid and in the same order.
    pub locators: Vec<(String, LocatorSet)>,
}

impl Capture {
    pub fn locator(&self, uid: &str) -> Option<&LocatorSet> {
        self.locators
            .iter()
            .find(|(id, _)| id == uid)
            .map(|(_, set)| set)
    }
}
