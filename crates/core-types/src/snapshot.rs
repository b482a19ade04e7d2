use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::element::ElementRecord;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    pub scroll_x: f64,
    pub scroll_y: f64,
}

/// Bookkeeping reported alongside a snapshot.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureStats {
    pub candidates: usize,
    pub kept: usize,
    pub frames: usize,
    pub inaccessible_frames: usize,
    pub shadow_roots: usize,
    pub duration_ms: u64,
}

impl CaptureStats {
    /// Sum counters from another scope's capture into this one.
    pub fn absorb(&mut self, other: &CaptureStats) {
        self.candidates += other.candidates;
        self.kept += other.kept;
        self.frames += other.frames;
        self.inaccessible_frames += other.inaccessible_frames;
        self.shadow_roots += other.shadow_roots;
        self.duration_ms = self.duration_ms.max(other.duration_ms);
    }
}

/// Serialized set of actionable elements from all reachable scopes at one instant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub url: String,
    pub title: String,
    pub timestamp: DateTime<Utc>,
    pub viewport: Viewport,
    pub elements: Vec<ElementRecord>,
    #[serde(default)]
    pub stats: CaptureStats,
}

impl Snapshot {
    pub fn empty(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            timestamp: Utc::now(),
            viewport: Viewport::default(),
            elements: Vec::new(),
            stats: CaptureStats::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn element(&self, uid: &str) -> Option<&ElementRecord> {
        self.elements.iter().find(|e| e.uid == uid)
    }

    /// Whether every uid in the snapshot is distinct.
    pub fn uids_unique(&self) -> bool {
        let mut seen = HashSet::with_capacity(self.elements.len());
        self.elements.iter().all(|e| seen.insert(e.uid.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absorb_sums_counters() {
        let mut a = CaptureStats {
            candidates: 3,
            kept: 2,
            duration_ms: 5,
            ..Default::default()
        };
        a.absorb(&CaptureStats {
            candidates: 1,
            kept: 1,
            frames: 1,
            duration_ms: 9,
            ..Default::default()
        });
        assert_eq!(a.candidates, 4);
        assert_eq!(a.kept, 3);
        assert_eq!(a.frames, 1);
        assert_eq!(a.duration_ms, 9);
    }

    #[test]
    fn empty_snapshot_has_unique_uids() {
        let snap = Snapshot::empty("https://example.com", "Example");
        assert!(snap.is_empty());
        assert!(snap.uids_unique());
    }
}
