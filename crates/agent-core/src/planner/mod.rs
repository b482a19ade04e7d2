//! Planner boundary.
//!
//! The planner decides what to do next from a snapshot; the loop only carries
//! snapshots and results across. Two implementations ship with the crate:
//! [`HttpPlanner`] for the planner service and [`ScriptedPlanner`] for replays.

mod http;
mod scripted;

pub use http::{HttpPlanner, PlannerConfig};
pub use scripted::{ScriptStep, ScriptedPlanner};

use async_trait::async_trait;
use pagepilot_core_types::{ActionDescriptor, ActionResult, SessionId, Snapshot};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::PlannerError;

/// One planning decision.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionPlan {
    /// The goal is reached; `next_action` is ignored.
    pub complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_action: Option<ActionDescriptor>,
}

impl ActionPlan {
    pub fn act(action: ActionDescriptor) -> Self {
        Self {
            next_action: Some(action),
            ..Self::default()
        }
    }

    pub fn done(reason: impl Into<String>) -> Self {
        Self {
            complete: true,
            reason: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

#[async_trait]
pub trait Planner: Send + Sync {
    /// Open a session for `goal`, starting from `url`.
    async fn start_session(&self, goal: &str, url: &str) -> Result<SessionId, PlannerError>;

    /// Hand over the first snapshot; returns the planner's initial analysis.
    async fn submit_snapshot(
        &self,
        session: &SessionId,
        snapshot: &Snapshot,
    ) -> Result<Value, PlannerError>;

    async fn next_action(
        &self,
        session: &SessionId,
        snapshot: &Snapshot,
        previous: Option<&ActionResult>,
    ) -> Result<ActionPlan, PlannerError>;

    async fn complete(
        &self,
        session: &SessionId,
        success: bool,
        message: &str,
    ) -> Result<(), PlannerError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagepilot_core_types::ActionKind;
    use serde_json::json;

    #[test]
    fn plan_tolerates_missing_fields() {
        let plan: ActionPlan = serde_json::from_value(json!({
            "complete": false,
            "next_action": {"type": "go_to_url", "url": "https://example.com"}
        }))
        .unwrap();
        assert!(!plan.complete);
        assert!(plan.reason.is_none());
        let action = plan.next_action.unwrap();
        assert_eq!(action.kind, ActionKind::Navigate);
        assert_eq!(action.navigation_target(), Some("https://example.com"));

        let empty: ActionPlan = serde_json::from_value(json!({})).unwrap();
        assert_eq!(empty, ActionPlan::default());
    }
}
