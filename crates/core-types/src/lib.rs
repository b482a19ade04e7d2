//! Shared data model for the PagePilot automation kernel.
//!
//! Every layer (extractor, locator, executor, orchestrator) speaks in these
//! types, and all of them serialize to the JSON shapes the planner service
//! expects.

pub mod action;
pub mod element;
pub mod locator;
pub mod result;
pub mod snapshot;
pub mod text;

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use action::{ActionDescriptor, ActionKind};
pub use element::{ElementRecord, FrameDescriptor, Rect, WidgetState};
pub use locator::LocatorSet;
pub use result::{ActionFailure, ActionResult, FailureKind};
pub use snapshot::{CaptureStats, Snapshot, Viewport};

/// Upper bounds applied to serialized snapshot fields.
pub mod limits {
    /// Visible text kept per element.
    pub const TEXT_CHARS: usize = 100;
    /// Characters kept per attribute value.
    pub const ATTRIBUTE_CHARS: usize = 200;
    /// Associated label texts kept per element.
    pub const LABELS: usize = 3;
    /// Length of the shadow-aware path.
    pub const SCOPED_PATH_CHARS: usize = 400;
    /// Error / success banners reported per scan.
    pub const BANNERS: usize = 5;
}

/// Identifier of one automation session, handed out by the planner service.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of one reachable document scope (top page or an out-of-process frame).
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ScopeId(pub String);

impl ScopeId {
    pub const MAIN: &'static str = "main";

    pub fn main() -> Self {
        Self(Self::MAIN.to_string())
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn is_main(&self) -> bool {
        self.0 == Self::MAIN
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_unique() {
        assert_ne!(SessionId::new(), SessionId::new());
    }

    #[test]
    fn main_scope_is_recognised() {
        assert!(ScopeId::main().is_main());
        assert!(!ScopeId::new("frame-1").is_main());
    }
}
