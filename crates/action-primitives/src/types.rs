//! Typed actions and executor configuration

use std::time::Duration;

use pagepilot_core_types::{ActionDescriptor, ActionKind};
use serde::{Deserialize, Serialize};

use crate::errors::ActionError;

/// Window scroll requested without a target element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrollTarget {
    Up,
    /// One viewport.
    Down,
    Top,
    Bottom,
    /// Signed pixel offset.
    By(f64),
}

impl ScrollTarget {
    pub fn parse(value: Option<&str>) -> Result<Self, ActionError> {
        let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) else {
            return Ok(ScrollTarget::Down);
        };
        match raw.to_ascii_lowercase().as_str() {
            "up" => Ok(ScrollTarget::Up),
            "down" => Ok(ScrollTarget::Down),
            "top" => Ok(ScrollTarget::Top),
            "bottom" => Ok(ScrollTarget::Bottom),
            other => other
                .trim_end_matches("px")
                .parse::<f64>()
                .map(ScrollTarget::By)
                .map_err(|_| ActionError::InvalidAction(format!("unknown scroll value '{raw}'"))),
        }
    }
}

/// How `wait_for_url_change` compares the page URL.
#[derive(Debug, Clone, PartialEq)]
pub enum UrlMatch {
    /// Anything different from the URL at the start of the wait.
    Change,
    Equals(String),
    Contains(String),
    Regex(String),
}

impl UrlMatch {
    fn parse(mode: Option<&str>, value: Option<&str>) -> Result<Self, ActionError> {
        let mode = mode
            .map(|m| m.trim().to_ascii_lowercase())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| "change".into());
        let needs_value = |kind: &str| {
            value
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or_else(|| ActionError::InvalidAction(format!("match '{kind}' needs a value")))
        };
        match mode.as_str() {
            "change" | "changed" => Ok(UrlMatch::Change),
            "equals" | "exact" => Ok(UrlMatch::Equals(needs_value("equals")?)),
            "contains" => Ok(UrlMatch::Contains(needs_value("contains")?)),
            "regex" => Ok(UrlMatch::Regex(needs_value("regex")?)),
            _ => Ok(UrlMatch::Change),
        }
    }
}

/// The closed set of executable actions, with parameters validated.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Click,
    Type { text: String },
    Select { choice: String },
    SelectAutocomplete { choice: String },
    Hover,
    Press { key: String },
    Check,
    Uncheck,
    Submit,
    Scroll(Option<ScrollTarget>),
    Wait(Duration),
    Navigate { url: String },
    WaitForSelector { selector: String, timeout: Duration },
    WaitForUrlChange { mode: UrlMatch, timeout: Duration },
    WaitNetworkIdle { idle: Duration, timeout: Duration },
}

impl Action {
    /// Validate a planner descriptor. Unknown literals become `Unsupported`.
    pub fn from_descriptor(
        descriptor: &ActionDescriptor,
        config: &ExecutorConfig,
    ) -> Result<Self, ActionError> {
        let value = descriptor.value.as_deref();
        let required = |what: &str| {
            value
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or_else(|| {
                    ActionError::InvalidAction(format!("{} requires a {what}", descriptor.kind))
                })
        };
        Ok(match &descriptor.kind {
            ActionKind::Click => Action::Click,
            ActionKind::Type => Action::Type {
                text: required("value")?,
            },
            ActionKind::Select => Action::Select {
                choice: required("value")?,
            },
            ActionKind::SelectAutocomplete => Action::SelectAutocomplete {
                choice: required("value")?,
            },
            ActionKind::Hover => Action::Hover,
            ActionKind::Press => Action::Press {
                key: descriptor
                    .key
                    .clone()
                    .filter(|k| !k.is_empty())
                    .or_else(|| value.filter(|v| !v.is_empty()).map(str::to_string))
                    .unwrap_or_else(|| "Enter".into()),
            },
            ActionKind::Check => Action::Check,
            ActionKind::Uncheck => Action::Uncheck,
            ActionKind::Submit => Action::Submit,
            ActionKind::Scroll => {
                if descriptor.target_uid.is_some() || descriptor.target_selector.is_some() {
                    Action::Scroll(None)
                } else {
                    Action::Scroll(Some(ScrollTarget::parse(value)?))
                }
            }
            ActionKind::Wait => Action::Wait(config.clamp(descriptor.duration, config.wait_ms)),
            ActionKind::Navigate => {
                let raw = descriptor.navigation_target().ok_or_else(|| {
                    ActionError::InvalidAction("navigate requires a url".into())
                })?;
                Action::Navigate {
                    url: raw.to_string(),
                }
            }
            ActionKind::WaitForSelector => Action::WaitForSelector {
                selector: descriptor
                    .target_selector
                    .clone()
                    .filter(|s| !s.trim().is_empty())
                    .or_else(|| value.map(str::to_string).filter(|s| !s.trim().is_empty()))
                    .ok_or_else(|| {
                        ActionError::InvalidAction("wait_for_selector requires a selector".into())
                    })?,
                timeout: config.clamp(descriptor.duration, config.selector_timeout_ms),
            },
            ActionKind::WaitForUrlChange => {
                let requested = descriptor.duration.unwrap_or(config.url_change_timeout_ms);
                let requested = if requested < config.url_change_floor_ms {
                    config.url_change_raised_ms
                } else {
                    requested
                };
                Action::WaitForUrlChange {
                    mode: UrlMatch::parse(descriptor.match_mode.as_deref(), value)?,
                    timeout: config.clamp(Some(requested), requested),
                }
            }
            ActionKind::WaitNetworkIdle => Action::WaitNetworkIdle {
                idle: Duration::from_millis(descriptor.idle_ms.unwrap_or(config.idle_ms)),
                timeout: config.clamp(descriptor.duration, config.idle_timeout_ms),
            },
            ActionKind::Unsupported(name) => return Err(ActionError::Unsupported(name.clone())),
        })
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Click => ActionKind::Click,
            Action::Type { .. } => ActionKind::Type,
            Action::Select { .. } => ActionKind::Select,
            Action::SelectAutocomplete { .. } => ActionKind::SelectAutocomplete,
            Action::Hover => ActionKind::Hover,
            Action::Press { .. } => ActionKind::Press,
            Action::Check => ActionKind::Check,
            Action::Uncheck => ActionKind::Uncheck,
            Action::Submit => ActionKind::Submit,
            Action::Scroll(_) => ActionKind::Scroll,
            Action::Wait(_) => ActionKind::Wait,
            Action::Navigate { .. } => ActionKind::Navigate,
            Action::WaitForSelector { .. } => ActionKind::WaitForSelector,
            Action::WaitForUrlChange { .. } => ActionKind::WaitForUrlChange,
            Action::WaitNetworkIdle { .. } => ActionKind::WaitNetworkIdle,
        }
    }

    /// Needs a resolved element; fails with not-found without one.
    pub fn requires_target(&self) -> bool {
        matches!(
            self,
            Action::Click
                | Action::Select { .. }
                | Action::Hover
                | Action::Check
                | Action::Uncheck
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub min_wait_ms: u64,
    pub max_wait_ms: u64,
    /// Default for `wait`.
    pub wait_ms: u64,
    pub selector_timeout_ms: u64,
    pub url_change_timeout_ms: u64,
    /// `wait_for_url_change` durations below this are raised to `url_change_raised_ms`.
    pub url_change_floor_ms: u64,
    pub url_change_raised_ms: u64,
    pub idle_ms: u64,
    pub idle_timeout_ms: u64,
    pub poll_interval_ms: u64,
    /// Pause after opening a custom dropdown before searching its options.
    pub dropdown_settle_ms: u64,
    /// Capture a snapshot after every action that does not navigate.
    pub capture_after_action: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            min_wait_ms: 100,
            max_wait_ms: 60_000,
            wait_ms: 1_000,
            selector_timeout_ms: 2_000,
            url_change_timeout_ms: 5_000,
            url_change_floor_ms: 1_500,
            url_change_raised_ms: 4_000,
            idle_ms: 800,
            idle_timeout_ms: 4_000,
            poll_interval_ms: 100,
            dropdown_settle_ms: 150,
            capture_after_action: true,
        }
    }
}

impl ExecutorConfig {
    /// Requested duration (or the default) clamped to the wait bounds.
    pub fn clamp(&self, requested: Option<u64>, default_ms: u64) -> Duration {
        let ms = requested
            .unwrap_or(default_ms)
            .clamp(self.min_wait_ms, self.max_wait_ms.max(self.min_wait_ms));
        Duration::from_millis(ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(10))
    }

    pub fn with_capture_after_action(mut self, enabled: bool) -> Self {
        self.capture_after_action = enabled;
        self
    }

    pub fn with_poll_interval(mut self, millis: u64) -> Self {
        self.poll_interval_ms = millis;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(descriptor: ActionDescriptor) -> Result<Action, ActionError> {
        Action::from_descriptor(&descriptor, &ExecutorConfig::default())
    }

    #[test]
    fn waits_are_clamped() {
        let action = parse(ActionDescriptor::new(ActionKind::Wait).with_duration(5)).unwrap();
        assert_eq!(action, Action::Wait(Duration::from_millis(100)));
        let action = parse(ActionDescriptor::new(ActionKind::Wait).with_duration(600_000)).unwrap();
        assert_eq!(action, Action::Wait(Duration::from_millis(60_000)));
        let action = parse(ActionDescriptor::new(ActionKind::Wait)).unwrap();
        assert_eq!(action, Action::Wait(Duration::from_millis(1_000)));
    }

    #[test]
    fn short_url_waits_are_raised() {
        let action = parse(
            ActionDescriptor::new(ActionKind::WaitForUrlChange)
                .with_duration(1_000)
                .with_match_mode("contains")
                .with_value("/done"),
        )
        .unwrap();
        assert_eq!(
            action,
            Action::WaitForUrlChange {
                mode: UrlMatch::Contains("/done".into()),
                timeout: Duration::from_millis(4_000),
            }
        );
    }

    #[test]
    fn unrecognised_url_match_waits_for_any_change() {
        let action = parse(
            ActionDescriptor::new(ActionKind::WaitForUrlChange)
                .with_duration(5_000)
                .with_match_mode("startswith")
                .with_value("/done"),
        )
        .unwrap();
        assert_eq!(
            action,
            Action::WaitForUrlChange {
                mode: UrlMatch::Change,
                timeout: Duration::from_millis(5_000),
            }
        );
    }

    #[test]
    fn camel_case_wait_fields_are_read() {
        let descriptor: ActionDescriptor = serde_json::from_value(serde_json::json!({
            "type": "wait_for_url_change",
            "mode": "regex",
            "value": "/orders/\\d+$",
            "duration": 5000
        }))
        .unwrap();
        assert_eq!(
            parse(descriptor).unwrap(),
            Action::WaitForUrlChange {
                mode: UrlMatch::Regex(r"/orders/\d+$".into()),
                timeout: Duration::from_millis(5_000),
            }
        );

        let descriptor: ActionDescriptor = serde_json::from_value(serde_json::json!({
            "type": "wait_network_idle",
            "idleMs": 750
        }))
        .unwrap();
        let Action::WaitNetworkIdle { idle, .. } = parse(descriptor).unwrap() else {
            panic!("expected a network idle wait");
        };
        assert_eq!(idle, Duration::from_millis(750));
    }

    #[test]
    fn empty_type_value_is_invalid() {
        let err = parse(ActionDescriptor::new(ActionKind::Type).with_value("")).unwrap_err();
        assert!(matches!(err, ActionError::InvalidAction(_)));
    }

    #[test]
    fn unknown_kind_is_unsupported() {
        let err = parse(ActionDescriptor::new(ActionKind::parse("teleport"))).unwrap_err();
        assert!(matches!(err, ActionError::Unsupported(name) if name == "teleport"));
    }

    #[test]
    fn scroll_values() {
        assert_eq!(ScrollTarget::parse(None).unwrap(), ScrollTarget::Down);
        assert_eq!(ScrollTarget::parse(Some("Top")).unwrap(), ScrollTarget::Top);
        assert_eq!(ScrollTarget::parse(Some("-250px")).unwrap(), ScrollTarget::By(-250.0));
        assert!(ScrollTarget::parse(Some("sideways")).is_err());
    }
}
