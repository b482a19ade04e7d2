//! Core types for the locator

use std::fmt;
use std::time::Duration;

use cdp_adapter::NodeHandle;
use pagepilot_core_types::LocatorSet;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Resolution strategies, in fallback order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocatorStrategy {
    Css,
    /// Structural path recorded at capture time.
    Xpath,
    /// Identifying attributes, most stable first.
    Fingerprint,
    /// Visible text, scoped to the recorded tag.
    Text,
}

impl LocatorStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            LocatorStrategy::Css => "css",
            LocatorStrategy::Xpath => "xpath",
            LocatorStrategy::Fingerprint => "fingerprint",
            LocatorStrategy::Text => "text",
        }
    }

    pub fn fallback_chain() -> [LocatorStrategy; 4] {
        [
            LocatorStrategy::Css,
            LocatorStrategy::Xpath,
            LocatorStrategy::Fingerprint,
            LocatorStrategy::Text,
        ]
    }
}

impl fmt::Display for LocatorStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A live element found for a uid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub node: NodeHandle,
    /// Document or shadow root the element was found in.
    pub root: NodeHandle,
    pub strategy: LocatorStrategy,
}

/// Outcome of resolving one uid. Not finding the element is a normal outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolveOutcome {
    pub uid: String,
    pub resolved: Option<Resolution>,
    /// Strategies attempted, in order, on the last attempt.
    pub tried: Vec<LocatorStrategy>,
    pub attempts: u32,
}

impl ResolveOutcome {
    pub(crate) fn unknown(uid: &str) -> Self {
        Self {
            uid: uid.to_string(),
            resolved: None,
            tried: Vec::new(),
            attempts: 1,
        }
    }

    pub fn node(&self) -> Option<NodeHandle> {
        self.resolved.map(|r| r.node)
    }

    pub fn is_found(&self) -> bool {
        self.resolved.is_some()
    }
}

/// Stored locators for one uid.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub locators: LocatorSet,
    pub created_at: Instant,
    pub access_count: u64,
}

impl RegistryEntry {
    pub fn new(locators: LocatorSet) -> Self {
        Self {
            locators,
            created_at: Instant::now(),
            access_count: 0,
        }
    }

    pub fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        self.access_count == 0 && now.saturating_duration_since(self.created_at) >= ttl
    }
}

/// Linearly growing delay between resolution attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySchedule {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub step_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySchedule {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay_ms: 50,
            step_ms: 50,
            max_delay_ms: 500,
        }
    }
}

impl RetrySchedule {
    /// Delay before retry number `retry` (1-based).
    pub fn delay(&self, retry: u32) -> Duration {
        let grown = self
            .initial_delay_ms
            .saturating_add(self.step_ms.saturating_mul(retry.saturating_sub(1) as u64));
        Duration::from_millis(grown.min(self.max_delay_ms))
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// One attempt, no waiting.
    pub fn immediate() -> Self {
        Self::default().with_max_attempts(1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    /// Entries never accessed are dropped after this long.
    pub ttl_ms: u64,
    pub sweep_interval_ms: u64,
    pub retry: RetrySchedule,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 10 * 60 * 1000,
            sweep_interval_ms: 60 * 1000,
            retry: RetrySchedule::default(),
        }
    }
}

impl LocatorConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(1))
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_ms = ttl.as_millis() as u64;
        self
    }

    pub fn with_retry(mut self, retry: RetrySchedule) -> Self {
        self.retry = retry;
        self
    }
}
