//! Configuration for the session loop.

use serde::{Deserialize, Serialize};

use crate::errors::AgentError;

/// Bounds and timings for one capture-plan-act session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Actions performed before the session is declared runaway.
    /// Default: 20
    pub max_steps: u32,

    /// Pause after an action schedules a navigation, before the first recapture.
    /// Default: 1500
    pub settle_ms: u64,

    /// Delay before each post-navigation capture attempt; one attempt per entry.
    /// Default: [500, 1000, 1500]
    pub recapture_backoff_ms: Vec<u64>,

    /// Deadline for capturing a single scope when several are merged.
    /// Default: 5000
    pub scope_timeout_ms: u64,

    /// Consecutive transient failures tolerated before the session fails.
    /// Default: 5
    pub transient_budget: u32,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_steps: 20,
            settle_ms: 1_500,
            recapture_backoff_ms: vec![500, 1_000, 1_500],
            scope_timeout_ms: 5_000,
            transient_budget: 5,
        }
    }
}

impl LoopConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Short timings for tests and dry runs.
    pub fn fast() -> Self {
        Self {
            max_steps: 10,
            settle_ms: 50,
            recapture_backoff_ms: vec![20, 40, 60],
            scope_timeout_ms: 500,
            transient_budget: 3,
        }
    }

    pub fn with_max_steps(mut self, steps: u32) -> Self {
        self.max_steps = steps;
        self
    }

    pub fn with_settle_ms(mut self, ms: u64) -> Self {
        self.settle_ms = ms;
        self
    }

    pub fn with_recapture_backoff(mut self, backoff_ms: Vec<u64>) -> Self {
        self.recapture_backoff_ms = backoff_ms;
        self
    }

    pub fn with_scope_timeout_ms(mut self, ms: u64) -> Self {
        self.scope_timeout_ms = ms;
        self
    }

    pub fn with_transient_budget(mut self, budget: u32) -> Self {
        self.transient_budget = budget;
        self
    }

    pub fn validate(&self) -> Result<(), AgentError> {
        if self.max_steps == 0 {
            return Err(AgentError::config("max_steps must be positive"));
        }
        if self.recapture_backoff_ms.is_empty() {
            return Err(AgentError::config(
                "recapture_backoff_ms needs at least one attempt",
            ));
        }
        if self.scope_timeout_ms == 0 {
            return Err(AgentError::config("scope_timeout_ms must be positive"));
        }
        Ok(())
    }
}
