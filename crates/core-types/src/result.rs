use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::action::ActionKind;
use crate::snapshot::Snapshot;

/// Classification of an interaction failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NotFound,
    NotInteractable,
    UnsupportedAction,
    InvalidAction,
    Timeout,
    Stale,
    Intercepted,
    Network,
    Internal,
}

impl FailureKind {
    /// Failures the orchestrator answers with a recapture instead of aborting.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FailureKind::NotFound
                | FailureKind::NotInteractable
                | FailureKind::Timeout
                | FailureKind::Stale
                | FailureKind::Intercepted
                | FailureKind::Network
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::NotFound => "not_found",
            FailureKind::NotInteractable => "not_interactable",
            FailureKind::UnsupportedAction => "unsupported_action",
            FailureKind::InvalidAction => "invalid_action",
            FailureKind::Timeout => "timeout",
            FailureKind::Stale => "stale",
            FailureKind::Intercepted => "intercepted",
            FailureKind::Network => "network",
            FailureKind::Internal => "internal",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed failure carried inside an [`ActionResult`].
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct ActionFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl ActionFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(FailureKind::NotFound, message)
    }

    pub fn not_interactable(message: impl Into<String>) -> Self {
        Self::new(FailureKind::NotInteractable, message)
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(FailureKind::InvalidAction, message)
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

/// Outcome of executing one [`crate::ActionDescriptor`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    pub action: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ActionFailure>,
    #[serde(default)]
    pub navigated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Error banners visible after the action.
    #[serde(default)]
    pub errors: Vec<String>,
    /// Success banners visible after the action.
    #[serde(default)]
    pub successes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Snapshot>,
    #[serde(default)]
    pub duration_ms: u64,
}

impl ActionResult {
    pub fn ok(action: ActionKind, message: impl Into<String>) -> Self {
        Self {
            success: true,
            action,
            target_uid: None,
            message: Some(message.into()),
            error: None,
            navigated: false,
            url: None,
            errors: Vec::new(),
            successes: Vec::new(),
            snapshot: None,
            duration_ms: 0,
        }
    }

    pub fn failed(action: ActionKind, failure: ActionFailure) -> Self {
        Self {
            success: false,
            message: Some(failure.message.clone()),
            error: Some(failure),
            ..Self::ok(action, String::new())
        }
    }

    pub fn with_target(mut self, uid: Option<String>) -> Self {
        self.target_uid = uid;
        self
    }

    /// Mark the result as having scheduled a navigation to `url`.
    pub fn navigation_pending(mut self, url: impl Into<String>) -> Self {
        self.navigated = true;
        self.url = Some(url.into());
        self
    }

    pub fn with_banners(mut self, errors: Vec<String>, successes: Vec<String>) -> Self {
        self.errors = errors;
        self.successes = successes;
        self
    }

    pub fn with_snapshot(mut self, snapshot: Snapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    /// Human-readable summary used in logs and loop history.
    pub fn summary(&self) -> String {
        match (&self.error, &self.message) {
            (Some(err), _) => err.to_string(),
            (None, Some(msg)) if !msg.is_empty() => msg.clone(),
            _ => format!("{} {}", self.action, if self.success { "ok" } else { "failed" }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(FailureKind::NotFound.is_transient());
        assert!(FailureKind::Stale.is_transient());
        assert!(!FailureKind::UnsupportedAction.is_transient());
        assert!(!FailureKind::InvalidAction.is_transient());
    }

    #[test]
    fn failed_result_carries_message() {
        let result = ActionResult::failed(
            ActionKind::Click,
            ActionFailure::not_found("uid btn-9 not resolvable"),
        );
        assert!(!result.success);
        assert_eq!(result.failure_kind(), Some(FailureKind::NotFound));
        assert_eq!(result.summary(), "not_found: uid btn-9 not resolvable");
    }

    #[test]
    fn navigation_pending_sets_flag() {
        let result = ActionResult::ok(ActionKind::Navigate, "navigation pending")
            .navigation_pending("https://example.com/");
        assert!(result.navigated);
        assert_eq!(result.url.as_deref(), Some("https://example.com/"));
    }
}
