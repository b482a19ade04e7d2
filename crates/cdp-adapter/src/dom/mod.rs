//! The DOM port: the narrow set of page operations the automation layers need.
//!
//! Nodes are addressed through opaque [`NodeHandle`]s. A handle names a
//! document, a shadow root or an element; it is only meaningful to the port
//! that issued it. Every algorithm above this layer (traversal, locator
//! strategies, typing chains) is written against [`DomPort`] so it runs the
//! same against a live page and against the in-memory page behind the
//! `testing` feature.

mod cdp;
#[cfg(any(test, feature = "testing"))]
mod memory;
pub mod selector;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use pagepilot_core_types::{Rect, Viewport};
use serde::{Deserialize, Serialize};

use crate::error::AdapterError;

pub use cdp::CdpDomPort;
#[cfg(any(test, feature = "testing"))]
pub use memory::{El, EventRecord, MemoryDom, Reaction};

/// Opaque reference to a node owned by a [`DomPort`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeHandle(pub u64);

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PageInfo {
    pub url: String,
    pub title: String,
    pub viewport: Viewport,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputedStyle {
    pub display: String,
    pub visibility: String,
    pub opacity: f64,
    pub pointer_events: String,
    pub overflow_x: String,
    pub overflow_y: String,
    pub cursor: String,
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Self {
            display: "block".into(),
            visibility: "visible".into(),
            opacity: 1.0,
            pointer_events: "auto".into(),
            overflow_x: "visible".into(),
            overflow_y: "visible".into(),
            cursor: "auto".into(),
        }
    }
}

impl ComputedStyle {
    /// Hidden by display, visibility or full transparency.
    pub fn is_hidden(&self) -> bool {
        self.display == "none"
            || self.visibility == "hidden"
            || self.visibility == "collapse"
            || self.opacity <= 0.0
    }

    /// Clips its content (and therefore acts as a scroll container).
    pub fn clips_content(&self) -> bool {
        let clips = |v: &str| matches!(v, "auto" | "scroll" | "hidden" | "clip");
        clips(&self.overflow_x) || clips(&self.overflow_y)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OptionFacts {
    pub value: String,
    pub text: String,
    pub selected: bool,
    pub disabled: bool,
}

/// Live form-control state (properties, not attributes).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlState {
    pub value: Option<String>,
    pub checked: Option<bool>,
    pub selected: Option<bool>,
    pub disabled: bool,
    pub read_only: bool,
    pub content_editable: bool,
    pub options: Vec<OptionFacts>,
    pub selected_index: Option<i64>,
}

/// Everything the upper layers read about one element, fetched in one round trip.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeFacts {
    /// Lower-case tag name.
    pub tag: String,
    /// Attributes in document order.
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub connected: bool,
    pub style: ComputedStyle,
    pub rect: Rect,
    pub control: ControlState,
}

impl NodeFacts {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or("").split_whitespace()
    }

    pub fn input_type(&self) -> Option<String> {
        (self.tag == "input").then(|| {
            self.attr("type")
                .map(|t| t.trim().to_ascii_lowercase())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "text".into())
        })
    }

    /// Accepts free text through its `value`.
    pub fn is_text_field(&self) -> bool {
        match self.tag.as_str() {
            "textarea" => true,
            "input" => matches!(
                self.input_type().as_deref(),
                Some(
                    "text" | "search" | "email" | "url" | "tel" | "password" | "number" | "date"
                        | "datetime-local" | "month" | "time" | "week"
                )
            ),
            _ => false,
        }
    }

    pub fn is_checkable(&self) -> bool {
        matches!(self.input_type().as_deref(), Some("checkbox" | "radio"))
            || matches!(
                self.attr("role"),
                Some("checkbox" | "switch" | "radio" | "menuitemcheckbox" | "menuitemradio")
            )
    }

    pub fn is_editable_surface(&self) -> bool {
        self.control.content_editable || matches!(self.attr("role"), Some("textbox"))
    }
}

/// One step of an element's structural path, from the top of its tree down.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathStep {
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// 1-based position among same-tag element siblings.
    pub index: usize,
    /// Number of same-tag element siblings (including this one).
    pub same_tag: usize,
}

/// Content reachable through a frame element.
#[derive(Clone, Debug, PartialEq)]
pub enum FrameContent {
    NotFrame,
    SameOrigin {
        document: NodeHandle,
        src: Option<String>,
        name: Option<String>,
    },
    CrossOrigin {
        src: Option<String>,
        name: Option<String>,
    },
}

/// DOM event interface used to construct a synthetic event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventClass {
    Pointer,
    Mouse,
    Keyboard,
    Input,
    Focus,
    Basic,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventInit {
    pub bubbles: bool,
    pub cancelable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_code: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_type: Option<String>,
}

/// A page event to be constructed and dispatched on a node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyntheticEvent {
    pub name: String,
    pub class: EventClass,
    pub init: EventInit,
}

impl SyntheticEvent {
    fn new(name: &str, class: EventClass, init: EventInit) -> Self {
        Self {
            name: name.to_string(),
            class,
            init,
        }
    }

    pub fn pointer(name: &str, x: f64, y: f64) -> Self {
        let bubbles = !matches!(name, "pointerenter" | "pointerleave");
        Self::new(
            name,
            EventClass::Pointer,
            EventInit {
                bubbles,
                cancelable: bubbles,
                client_x: Some(x),
                client_y: Some(y),
                ..Default::default()
            },
        )
    }

    pub fn mouse(name: &str, x: f64, y: f64) -> Self {
        let bubbles = !matches!(name, "mouseenter" | "mouseleave");
        Self::new(
            name,
            EventClass::Mouse,
            EventInit {
                bubbles,
                cancelable: bubbles,
                client_x: Some(x),
                client_y: Some(y),
                ..Default::default()
            },
        )
    }

    pub fn key(name: &str, key: &str, code: &str, key_code: u32) -> Self {
        Self::new(
            name,
            EventClass::Keyboard,
            EventInit {
                bubbles: true,
                cancelable: true,
                key: Some(key.to_string()),
                code: Some(code.to_string()),
                key_code: Some(key_code),
                ..Default::default()
            },
        )
    }

    /// `beforeinput` / `input` carrying inserted text.
    pub fn input(name: &str, data: Option<&str>, input_type: &str) -> Self {
        Self::new(
            name,
            EventClass::Input,
            EventInit {
                bubbles: true,
                cancelable: name == "beforeinput",
                data: data.map(str::to_string),
                input_type: Some(input_type.to_string()),
                ..Default::default()
            },
        )
    }

    pub fn basic(name: &str, cancelable: bool) -> Self {
        Self::new(
            name,
            EventClass::Basic,
            EventInit {
                bubbles: true,
                cancelable,
                ..Default::default()
            },
        )
    }

    pub fn focus(name: &str) -> Self {
        Self::new(
            name,
            EventClass::Focus,
            EventInit {
                bubbles: matches!(name, "focusin" | "focusout"),
                ..Default::default()
            },
        )
    }
}

/// How text is pushed into an editable surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertMode {
    /// The browser's text-insertion command at the caret.
    Command,
    /// Append a text node directly to the element.
    Append,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ScrollRequest {
    IntoView(NodeHandle),
    By { dx: f64, dy: f64 },
    To { x: f64, y: f64 },
}

/// Page operations the automation layers are written against.
#[async_trait]
pub trait DomPort: Send + Sync {
    // --- reading -------------------------------------------------------------

    async fn page_info(&self) -> Result<PageInfo, AdapterError>;

    /// Top-level document node.
    async fn document(&self) -> Result<NodeHandle, AdapterError>;

    /// `querySelectorAll` evaluated within `root` (document, shadow root or element).
    /// Does not descend into shadow roots or frames.
    async fn query_all(&self, root: NodeHandle, css: &str) -> Result<Vec<NodeHandle>, AdapterError>;

    /// Whether `node` matches `css`.
    async fn matches(&self, node: NodeHandle, css: &str) -> Result<bool, AdapterError>;

    /// Element children (for a document: its root element).
    async fn children(&self, node: NodeHandle) -> Result<Vec<NodeHandle>, AdapterError>;

    /// Open shadow root attached to `node`, if any.
    async fn shadow_root(&self, node: NodeHandle) -> Result<Option<NodeHandle>, AdapterError>;

    async fn frame_content(&self, node: NodeHandle) -> Result<FrameContent, AdapterError>;

    /// Elements under `root` (not crossing shadow or frame boundaries) hosting an open shadow root.
    async fn shadow_hosts(&self, root: NodeHandle) -> Result<Vec<NodeHandle>, AdapterError>;

    /// Document or shadow root that contains `node`.
    async fn root_of(&self, node: NodeHandle) -> Result<NodeHandle, AdapterError>;

    /// Path from the top of `node`'s tree (document element or shadow-root child) to `node`.
    async fn path(&self, node: NodeHandle) -> Result<Vec<PathStep>, AdapterError>;

    /// Composed parent element: crosses from a shadow root to its host, stops at the document.
    async fn parent(&self, node: NodeHandle) -> Result<Option<NodeHandle>, AdapterError>;

    async fn facts(&self, node: NodeHandle) -> Result<NodeFacts, AdapterError>;

    /// Evaluate an XPath expression with `root` as context node.
    async fn xpath(&self, root: NodeHandle, expr: &str) -> Result<Vec<NodeHandle>, AdapterError>;

    /// Focused element, looking through shadow roots and same-origin frames.
    async fn active_element(&self) -> Result<Option<NodeHandle>, AdapterError>;

    /// Elements that registered an event listener since the last drain.
    async fn drain_listener_registrations(&self) -> Result<Vec<NodeHandle>, AdapterError>;

    /// Number of network resources the page has requested so far.
    async fn resource_count(&self) -> Result<u64, AdapterError>;

    // --- acting --------------------------------------------------------------

    /// Dispatch; returns `false` when a listener cancelled the event.
    async fn dispatch(&self, node: NodeHandle, event: &SyntheticEvent) -> Result<bool, AdapterError>;

    async fn focus(&self, node: NodeHandle) -> Result<(), AdapterError>;

    /// The element's own `click()` method.
    async fn native_click(&self, node: NodeHandle) -> Result<(), AdapterError>;

    /// Assign `value` through the prototype's property setter. Returns `false`
    /// when the element has no value property to set.
    async fn set_value(&self, node: NodeHandle, value: &str) -> Result<bool, AdapterError>;

    async fn place_caret_at_end(&self, node: NodeHandle) -> Result<(), AdapterError>;

    /// Returns whether the page accepted the insertion.
    async fn insert_text(
        &self,
        node: NodeHandle,
        text: &str,
        mode: InsertMode,
    ) -> Result<bool, AdapterError>;

    async fn set_selected_index(&self, node: NodeHandle, index: usize) -> Result<(), AdapterError>;

    async fn request_submit(&self, form: NodeHandle) -> Result<(), AdapterError>;

    /// Schedule a navigation and return immediately.
    async fn schedule_navigation(&self, url: &str) -> Result<(), AdapterError>;

    async fn scroll(&self, request: ScrollRequest) -> Result<(), AdapterError>;

    /// Resolve once `css` matches in the top document or `timeout` elapses.
    async fn wait_for_selector(&self, css: &str, timeout: Duration) -> Result<bool, AdapterError>;

    // --- connection ----------------------------------------------------------

    async fn ping(&self) -> Result<(), AdapterError>;

    /// Re-establish the in-page capability after it became unreachable.
    async fn reconnect(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    /// Drop page-side state pinned for handles issued so far. Handles stay
    /// valid and are looked up again on next use.
    async fn release_objects(&self) -> Result<(), AdapterError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn style_visibility_rules() {
        let mut style = ComputedStyle::default();
        assert!(!style.is_hidden());
        style.opacity = 0.0;
        assert!(style.is_hidden());
        style.opacity = 1.0;
        style.visibility = "collapse".into();
        assert!(style.is_hidden());
    }

    #[test]
    fn input_type_defaults_to_text() {
        let facts = NodeFacts {
            tag: "input".into(),
            ..Default::default()
        };
        assert_eq!(facts.input_type().as_deref(), Some("text"));
        assert!(facts.is_text_field());
        assert!(!facts.is_checkable());
    }

    #[test]
    fn enter_and_leave_do_not_bubble() {
        assert!(!SyntheticEvent::pointer("pointerenter", 0.0, 0.0).init.bubbles);
        assert!(SyntheticEvent::mouse("mousedown", 0.0, 0.0).init.cancelable);
        assert!(SyntheticEvent::input("beforeinput", Some("a"), "insertText").init.cancelable);
        assert!(!SyntheticEvent::input("input", Some("a"), "insertText").init.cancelable);
    }
}
