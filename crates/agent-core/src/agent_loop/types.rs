//! Loop states, step history and the final session outcome.

use std::fmt;

use chrono::{DateTime, Utc};
use pagepilot_core_types::{ActionDescriptor, ActionResult, FailureKind, SessionId};
use serde::{Deserialize, Serialize};

/// Where the loop currently is. Published on the loop's watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Idle,
    SessionStarting,
    Capturing,
    Planning,
    Executing,
    Recovering,
    NavigationSettling,
    Completed,
    Stopped,
    Failed,
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Stopped | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::SessionStarting => "session_starting",
            Self::Capturing => "capturing",
            Self::Planning => "planning",
            Self::Executing => "executing",
            Self::Recovering => "recovering",
            Self::NavigationSettling => "navigation_settling",
            Self::Completed => "completed",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// The planner declared the goal reached.
    Completed,
    /// Cancelled from outside.
    Stopped,
    Failed,
}

/// Why a session failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopFailure {
    /// The planner failed transiently twice in a row.
    TransientPlannerFailure,
    /// The planner refused or answered nonsense.
    Planner,
    /// Navigations kept leaving the page without content.
    NavigationTimeout,
    IterationLimitExceeded,
    SurfaceUnavailable,
    /// The plan was neither complete nor carried an action.
    NoAction,
    /// Too many transient action failures in a row.
    TransientBudgetExhausted,
    /// An action failed in a way a retry will not fix.
    Action(FailureKind),
}

impl fmt::Display for LoopFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransientPlannerFailure => f.write_str("transient_planner_failure"),
            Self::Planner => f.write_str("planner"),
            Self::NavigationTimeout => f.write_str("navigation_timeout"),
            Self::IterationLimitExceeded => f.write_str("iteration_limit_exceeded"),
            Self::SurfaceUnavailable => f.write_str("surface_unavailable"),
            Self::NoAction => f.write_str("no_action"),
            Self::TransientBudgetExhausted => f.write_str("transient_budget_exhausted"),
            Self::Action(kind) => write!(f, "action:{kind}"),
        }
    }
}

/// One executed action as remembered by the loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: u32,
    pub action: ActionDescriptor,
    pub success: bool,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    #[serde(default)]
    pub navigated: bool,
    pub duration_ms: u64,
}

impl StepRecord {
    pub fn from_result(step: u32, action: &ActionDescriptor, result: &ActionResult) -> Self {
        Self {
            step,
            action: action.clone(),
            success: result.success,
            summary: result.summary(),
            failure: result.failure_kind(),
            navigated: result.navigated,
            duration_ms: result.duration_ms,
        }
    }
}

/// Result of [`SessionLoop::run`](super::SessionLoop::run).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOutcome {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    pub status: SessionStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<LoopFailure>,
    /// Actions performed.
    pub steps: u32,
    pub history: Vec<StepRecord>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl SessionOutcome {
    pub fn is_success(&self) -> bool {
        self.status == SessionStatus::Completed
    }
}
