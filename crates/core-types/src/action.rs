use std::fmt;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

/// Wire-level action literal.
///
/// The set is closed; anything the planner sends outside of it lands in
/// [`ActionKind::Unsupported`] so the executor can answer with a typed failure
/// instead of a parse error.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Click,
    Type,
    Scroll,
    Wait,
    Navigate,
    Select,
    SelectAutocomplete,
    Hover,
    Press,
    Check,
    Uncheck,
    Submit,
    WaitForSelector,
    WaitForUrlChange,
    WaitNetworkIdle,
    Unsupported(String),
}

impl ActionKind {
    /// Parse a wire literal, folding the navigation aliases into `Navigate`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "click" => Self::Click,
            "type" => Self::Type,
            "scroll" => Self::Scroll,
            "wait" => Self::Wait,
            "navigate" | "go_to_url" | "open_url" | "m_go_to_url" | "go_to" | "open" => {
                Self::Navigate
            }
            "select" => Self::Select,
            "select_autocomplete" => Self::SelectAutocomplete,
            "hover" => Self::Hover,
            "press" => Self::Press,
            "check" => Self::Check,
            "uncheck" => Self::Uncheck,
            "submit" => Self::Submit,
            "wait_for_selector" => Self::WaitForSelector,
            "wait_for_url_change" => Self::WaitForUrlChange,
            "wait_network_idle" => Self::WaitNetworkIdle,
            _ => Self::Unsupported(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Click => "click",
            Self::Type => "type",
            Self::Scroll => "scroll",
            Self::Wait => "wait",
            Self::Navigate => "navigate",
            Self::Select => "select",
            Self::SelectAutocomplete => "select_autocomplete",
            Self::Hover => "hover",
            Self::Press => "press",
            Self::Check => "check",
            Self::Uncheck => "uncheck",
            Self::Submit => "submit",
            Self::WaitForSelector => "wait_for_selector",
            Self::WaitForUrlChange => "wait_for_url_change",
            Self::WaitNetworkIdle => "wait_network_idle",
            Self::Unsupported(raw) => raw.as_str(),
        }
    }

    /// Actions that operate on a page element rather than the page as a whole.
    pub fn targets_element(&self) -> bool {
        matches!(
            self,
            Self::Click
                | Self::Type
                | Self::Select
                | Self::SelectAutocomplete
                | Self::Hover
                | Self::Check
                | Self::Uncheck
        )
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ActionKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ActionKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(ActionKind::parse(&raw))
    }
}

/// Instruction for the next interaction, as produced by the planner.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    #[serde(default, alias = "target", skip_serializing_if = "Option::is_none")]
    pub target_uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_selector: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
    #[serde(
        default,
        rename = "match",
        alias = "mode",
        skip_serializing_if = "Option::is_none"
    )]
    pub match_mode: Option<String>,
    #[serde(
        default,
        alias = "idleMs",
        deserialize_with = "lenient_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub idle_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl ActionDescriptor {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            target_uid: None,
            target_selector: None,
            value: None,
            key: None,
            duration: None,
            url: None,
            target_url: None,
            match_mode: None,
            idle_ms: None,
            reasoning: None,
        }
    }

    pub fn with_target(mut self, uid: impl Into<String>) -> Self {
        self.target_uid = Some(uid.into());
        self
    }

    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.target_selector = Some(selector.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_duration(mut self, millis: u64) -> Self {
        self.duration = Some(millis);
        self
    }

    pub fn with_match_mode(mut self, mode: impl Into<String>) -> Self {
        self.match_mode = Some(mode.into());
        self
    }

    /// The navigation target, whichever of the accepted fields carries it.
    pub fn navigation_target(&self) -> Option<&str> {
        [&self.value, &self.url, &self.target_url]
            .into_iter()
            .flatten()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        Some(serde_json::Value::Bool(b)) => Some(b.to_string()),
        Some(other) => return Err(de::Error::custom(format!("unexpected value: {other}"))),
    })
}

fn lenient_millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Some(serde_json::Value::String(s)) => s.trim().parse::<u64>().ok(),
        Some(other) => return Err(de::Error::custom(format!("unexpected duration: {other}"))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn navigation_aliases_fold_into_navigate() {
        for alias in ["navigate", "go_to_url", "open_url", "m_go_to_url", "go_to", "open"] {
            assert_eq!(ActionKind::parse(alias), ActionKind::Navigate, "{alias}");
        }
    }

    #[test]
    fn unknown_literal_is_preserved() {
        let kind = ActionKind::parse("teleport");
        assert_eq!(kind, ActionKind::Unsupported("teleport".into()));
        assert_eq!(kind.as_str(), "teleport");
    }

    #[test]
    fn descriptor_accepts_planner_shapes() {
        let descriptor: ActionDescriptor = serde_json::from_value(json!({
            "type": "wait",
            "target": "btn-1",
            "value": 42,
            "duration": "1500",
            "reasoning": "let the page settle"
        }))
        .unwrap();
        assert_eq!(descriptor.kind, ActionKind::Wait);
        assert_eq!(descriptor.target_uid.as_deref(), Some("btn-1"));
        assert_eq!(descriptor.value.as_deref(), Some("42"));
        assert_eq!(descriptor.duration, Some(1500));
    }

    #[test]
    fn wait_fields_accept_camel_case_names() {
        let descriptor: ActionDescriptor = serde_json::from_value(json!({
            "type": "wait_network_idle",
            "mode": "contains",
            "idleMs": "800"
        }))
        .unwrap();
        assert_eq!(descriptor.match_mode.as_deref(), Some("contains"));
        assert_eq!(descriptor.idle_ms, Some(800));
        let wire = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(wire["match"], "contains");
        assert_eq!(wire["idle_ms"], 800);
    }

    #[test]
    fn navigation_target_prefers_value_then_url() {
        let mut descriptor = ActionDescriptor::new(ActionKind::Navigate);
        descriptor.url = Some("example.org".into());
        assert_eq!(descriptor.navigation_target(), Some("example.org"));
        descriptor.value = Some("  ".into());
        assert_eq!(descriptor.navigation_target(), Some("example.org"));
        descriptor.value = Some("example.com".into());
        assert_eq!(descriptor.navigation_target(), Some("example.com"));
    }
}
