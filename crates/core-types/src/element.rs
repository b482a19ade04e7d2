use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in CSS pixels, relative to the owning viewport.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    pub fn center(&self) -> (f64, f64) {
        (self.left + self.width / 2.0, self.top + self.height / 2.0)
    }

    pub fn has_area(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }

    /// True when the two rectangles share at least one point.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.left <= other.right()
            && other.left <= self.right()
            && self.top <= other.bottom()
            && other.top <= self.bottom()
    }

    pub fn translate(&self, dx: f64, dy: f64) -> Rect {
        Rect::new(self.left + dx, self.top + dy, self.width, self.height)
    }
}

/// Interactive state of a form control or ARIA widget.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetState {
    pub disabled: bool,
    pub read_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expanded: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_popup: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub option_count: Option<usize>,
}

/// Describes the embedded document an element lives in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameDescriptor {
    /// Ordinal of the frame element among the frames seen during traversal.
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// CSS selector of the frame element inside its parent document.
    pub locator: String,
    pub cross_origin: bool,
}

/// One actionable element as seen by a single capture.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementRecord {
    pub uid: String,
    pub tag: String,
    /// Coarse semantic classification (`button`, `link`, `text-input`, ...).
    #[serde(rename = "type")]
    pub element_type: String,
    pub text: String,
    pub attributes: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accessible_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    pub state: WidgetState,
    pub bounds: Rect,
    pub is_in_viewport: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tab_index: Option<i32>,
    pub selector: String,
    pub xpath: String,
    /// Path that names every shadow root and frame crossed on the way down.
    pub scoped_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame: Option<FrameDescriptor>,
    /// Source scope when the record was merged from a multi-scope capture.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl ElementRecord {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn role(&self) -> Option<&str> {
        self.attribute("role")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_intersection_includes_edges() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(a.intersects(&Rect::new(10.0, 10.0, 5.0, 5.0)));
        assert!(!a.intersects(&Rect::new(11.0, 0.0, 5.0, 5.0)));
    }

    #[test]
    fn record_serializes_with_wire_names() {
        let record = ElementRecord {
            uid: "login".into(),
            tag: "button".into(),
            element_type: "button".into(),
            text: "Log in".into(),
            attributes: BTreeMap::new(),
            accessible_name: None,
            labels: vec![],
            state: WidgetState::default(),
            bounds: Rect::new(1.0, 2.0, 3.0, 4.0),
            is_in_viewport: true,
            tab_index: None,
            selector: "#login".into(),
            xpath: "/html[1]/body[1]/button[1]".into(),
            scoped_path: "button#login".into(),
            frame: None,
            scope: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "button");
        assert_eq!(json["isInViewport"], true);
        assert_eq!(json["bounds"]["top"], 2.0);
        assert!(json.get("scope").is_none());
    }
}
