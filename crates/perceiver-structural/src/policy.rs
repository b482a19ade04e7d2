use serde::{Deserialize, Serialize};

/// Tuning for one capture pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureOptions {
    /// How many shadow-root / frame boundaries traversal may cross.
    pub max_depth: usize,
    /// Records kept per snapshot.
    pub max_elements: usize,
    /// Listener registrations remembered between captures.
    pub listener_cap: usize,
    /// Registrations between two compactions of the listener registry.
    pub compact_every: usize,
    /// Descendants inspected when an element itself has no rendered size.
    pub descendant_limit: usize,
    /// Ancestors inspected for hidden or clipping containers.
    pub ancestor_limit: usize,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_elements: 1500,
            listener_cap: 5000,
            compact_every: 200,
            descendant_limit: 24,
            ancestor_limit: 32,
        }
    }
}

impl CaptureOptions {
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_max_elements(mut self, max: usize) -> Self {
        self.max_elements = max.max(1);
        self
    }

    pub fn with_listener_cap(mut self, cap: usize, compact_every: usize) -> Self {
        self.listener_cap = cap;
        self.compact_every = compact_every.max(1);
        self
    }

    /// Top document only; no shadow roots or frames.
    pub fn shallow() -> Self {
        Self::default().with_max_depth(0)
    }
}
