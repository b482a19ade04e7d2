//! In-memory [`DomPort`] backend.
//!
//! Models just enough of a browser document for the automation layers to be
//! exercised without Chromium: element tree, attributes, text, computed style
//! and layout boxes, open shadow roots, same- and cross-origin frames, form
//! control state, default click activation, an event log and mutation
//! notifications for selector observation.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use pagepilot_core_types::{Rect, Viewport};
use tokio::sync::Notify;
use tokio::time::Instant;

use super::selector::{ElementTree, SelectorList};
use super::{
    ComputedStyle, ControlState, DomPort, FrameContent, InsertMode, NodeFacts, NodeHandle,
    OptionFacts, PageInfo, PathStep, ScrollRequest, SyntheticEvent,
};
use crate::error::{AdapterError, AdapterErrorKind};

/// Element description used to build a [`MemoryDom`] tree.
#[derive(Clone, Debug)]
pub struct El {
    tag: String,
    attrs: Vec<(String, String)>,
    text: String,
    style: ComputedStyle,
    rect: Option<Rect>,
    value: Option<String>,
    checked: bool,
    children: Vec<El>,
}

impl El {
    pub fn new(tag: &str) -> Self {
        let display = match tag {
            "a" | "span" | "label" | "strong" | "em" => "inline",
            "input" | "select" | "button" | "textarea" => "inline-block",
            _ => "block",
        };
        Self {
            tag: tag.to_ascii_lowercase(),
            attrs: Vec::new(),
            text: String::new(),
            style: ComputedStyle {
                display: display.into(),
                ..Default::default()
            },
            rect: None,
            value: None,
            checked: false,
            children: Vec::new(),
        }
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.retain(|(k, _)| k != name);
        self.attrs.push((name.to_ascii_lowercase(), value.to_string()));
        self
    }

    pub fn id(self, id: &str) -> Self {
        self.attr("id", id)
    }

    pub fn class(self, class: &str) -> Self {
        self.attr("class", class)
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn rect(mut self, left: f64, top: f64, width: f64, height: f64) -> Self {
        self.rect = Some(Rect::new(left, top, width, height));
        self
    }

    pub fn style(mut self, edit: impl FnOnce(&mut ComputedStyle)) -> Self {
        edit(&mut self.style);
        self
    }

    pub fn hidden(self) -> Self {
        self.style(|s| s.display = "none".into())
    }

    pub fn value(mut self, value: &str) -> Self {
        self.value = Some(value.to_string());
        self
    }

    pub fn checked(mut self, checked: bool) -> Self {
        self.checked = checked;
        self
    }

    pub fn child(mut self, child: El) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = El>) -> Self {
        self.children.extend(children);
        self
    }
}

/// Scripted page behaviour attached to `(node, event)` pairs.
#[derive(Clone, Debug, PartialEq)]
pub enum Reaction {
    /// Cancel the event.
    PreventDefault,
    /// Make the node displayed and visible.
    Show(NodeHandle),
    Hide(NodeHandle),
    /// Editor behaviour: insert the event's `data` and cancel the default.
    InsertData,
    Navigate(String),
    /// Simulate network activity.
    Requests(u64),
}

/// One dispatched event, as recorded by [`MemoryDom`].
#[derive(Clone, Debug, PartialEq)]
pub struct EventRecord {
    pub target: NodeHandle,
    pub name: String,
    pub data: Option<String>,
    pub key: Option<String>,
    /// Raised by `native_click` / default activation rather than synthesized.
    pub native: bool,
}

#[derive(Clone, Debug)]
struct FrameSlot {
    document: Option<usize>,
    cross_origin: bool,
}

#[derive(Clone, Debug)]
struct Element {
    tag: String,
    attrs: Vec<(String, String)>,
    text: String,
    style: ComputedStyle,
    rect: Rect,
    value: Option<String>,
    checked: bool,
    selected_index: Option<usize>,
    shadow: Option<usize>,
    frame: Option<FrameSlot>,
}

impl Element {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn input_type(&self) -> String {
        self.attr("type")
            .map(|t| t.to_ascii_lowercase())
            .unwrap_or_else(|| "text".into())
    }

    fn content_editable(&self) -> bool {
        matches!(
            self.attr("contenteditable").map(|v| v.to_ascii_lowercase()),
            Some(ref v) if v.is_empty() || v == "true" || v == "plaintext-only"
        )
    }

    fn has_value_property(&self) -> bool {
        match self.tag.as_str() {
            "textarea" | "select" => true,
            "input" => !matches!(self.input_type().as_str(), "checkbox" | "radio" | "file"),
            _ => false,
        }
    }
}

#[derive(Clone, Debug)]
enum Kind {
    Document,
    ShadowRoot { host: usize },
    Element(Box<Element>),
}

#[derive(Clone, Debug)]
struct Node {
    kind: Kind,
    parent: Option<usize>,
    children: Vec<usize>,
    attached: bool,
}

struct Tree {
    nodes: Vec<Node>,
    url: String,
    title: String,
    viewport: Viewport,
    events: Vec<EventRecord>,
    reactions: Vec<(usize, String, Reaction)>,
    listener_queue: Vec<NodeHandle>,
    resources: u64,
    navigations: Vec<String>,
    submissions: Vec<NodeHandle>,
    active: Option<usize>,
    exec_command: bool,
    reachable: bool,
    heal_on_reconnect: bool,
    next_top: f64,
}

/// In-memory document implementing [`DomPort`].
pub struct MemoryDom {
    tree: Mutex<Tree>,
    changed: Notify,
}

impl MemoryDom {
    /// New page with `<html><head></head><body></body></html>`.
    pub fn new(url: &str, title: &str) -> Self {
        let viewport = Viewport {
            width: 1280.0,
            height: 800.0,
            scroll_x: 0.0,
            scroll_y: 0.0,
        };
        let mut tree = Tree {
            nodes: Vec::new(),
            url: url.to_string(),
            title: title.to_string(),
            viewport,
            events: Vec::new(),
            reactions: Vec::new(),
            listener_queue: Vec::new(),
            resources: 0,
            navigations: Vec::new(),
            submissions: Vec::new(),
            active: None,
            exec_command: true,
            reachable: true,
            heal_on_reconnect: true,
            next_top: 8.0,
        };
        tree.new_document(viewport);
        Self {
            tree: Mutex::new(tree),
            changed: Notify::new(),
        }
    }

    pub fn document_handle(&self) -> NodeHandle {
        NodeHandle(0)
    }

    /// `<body>` of the top document.
    pub fn body(&self) -> NodeHandle {
        NodeHandle(2)
    }

    pub fn append(&self, parent: NodeHandle, el: El) -> NodeHandle {
        let handle = {
            let mut tree = self.tree.lock();
            let idx = tree.build(parent.0 as usize, el);
            NodeHandle(idx as u64)
        };
        self.changed.notify_waiters();
        handle
    }

    /// Attach an open shadow root to `host` and return it.
    pub fn attach_shadow(&self, host: NodeHandle) -> NodeHandle {
        let mut tree = self.tree.lock();
        let idx = tree.push(Node {
            kind: Kind::ShadowRoot {
                host: host.0 as usize,
            },
            parent: None,
            children: Vec::new(),
            attached: true,
        });
        if let Some(el) = tree.element_mut(host.0 as usize) {
            el.shadow = Some(idx);
        }
        NodeHandle(idx as u64)
    }

    /// Give a frame element a document. Returns the frame's `<body>` when same-origin.
    pub fn attach_frame(&self, frame: NodeHandle, same_origin: bool) -> Option<NodeHandle> {
        let mut tree = self.tree.lock();
        let (document, body) = if same_origin {
            let viewport = Viewport {
                width: tree.rect_of(frame.0 as usize).width,
                height: tree.rect_of(frame.0 as usize).height,
                ..Default::default()
            };
            let doc = tree.new_document(viewport);
            (Some(doc), Some(NodeHandle(doc as u64 + 2)))
        } else {
            (None, None)
        };
        if let Some(el) = tree.element_mut(frame.0 as usize) {
            el.frame = Some(FrameSlot {
                document,
                cross_origin: !same_origin,
            });
        }
        body
    }

    pub fn set_style(&self, node: NodeHandle, edit: impl FnOnce(&mut ComputedStyle)) {
        if let Some(el) = self.tree.lock().element_mut(node.0 as usize) {
            edit(&mut el.style);
        }
        self.changed.notify_waiters();
    }

    pub fn set_rect(&self, node: NodeHandle, rect: Rect) {
        if let Some(el) = self.tree.lock().element_mut(node.0 as usize) {
            el.rect = rect;
        }
    }

    pub fn set_attr(&self, node: NodeHandle, name: &str, value: &str) {
        if let Some(el) = self.tree.lock().element_mut(node.0 as usize) {
            el.attrs.retain(|(k, _)| k != name);
            el.attrs.push((name.to_string(), value.to_string()));
        }
        self.changed.notify_waiters();
    }

    pub fn remove_attr(&self, node: NodeHandle, name: &str) {
        if let Some(el) = self.tree.lock().element_mut(node.0 as usize) {
            el.attrs.retain(|(k, _)| k != name);
        }
        self.changed.notify_waiters();
    }

    pub fn set_text(&self, node: NodeHandle, text: &str) {
        if let Some(el) = self.tree.lock().element_mut(node.0 as usize) {
            el.text = text.to_string();
        }
        self.changed.notify_waiters();
    }

    /// Detach `node` (and its subtree) from the document.
    pub fn remove(&self, node: NodeHandle) {
        {
            let mut tree = self.tree.lock();
            let idx = node.0 as usize;
            if let Some(parent) = tree.nodes.get(idx).and_then(|n| n.parent) {
                tree.nodes[parent].children.retain(|c| *c != idx);
            }
            if let Some(n) = tree.nodes.get_mut(idx) {
                n.attached = false;
                n.parent = None;
            }
            if tree.active == Some(idx) {
                tree.active = None;
            }
        }
        self.changed.notify_waiters();
    }

    pub fn on(&self, node: NodeHandle, event: &str, reaction: Reaction) {
        self.tree
            .lock()
            .reactions
            .push((node.0 as usize, event.to_string(), reaction));
    }

    /// Simulate page script calling `addEventListener` on `node`.
    pub fn add_listener(&self, node: NodeHandle) {
        self.tree.lock().listener_queue.push(node);
    }

    pub fn add_resources(&self, count: u64) {
        self.tree.lock().resources += count;
    }

    pub fn disable_exec_command(&self) {
        self.tree.lock().exec_command = false;
    }

    /// Make every operation fail as unreachable until `reconnect` (if `heals`).
    pub fn break_connection(&self, heals: bool) {
        let mut tree = self.tree.lock();
        tree.reachable = false;
        tree.heal_on_reconnect = heals;
    }

    pub fn set_url(&self, url: &str) {
        self.tree.lock().url = url.to_string();
        self.changed.notify_waiters();
    }

    pub fn events(&self) -> Vec<EventRecord> {
        self.tree.lock().events.clone()
    }

    pub fn event_names(&self, node: NodeHandle) -> Vec<String> {
        self.tree
            .lock()
            .events
            .iter()
            .filter(|e| e.target == node)
            .map(|e| e.name.clone())
            .collect()
    }

    pub fn count_events(&self, node: NodeHandle, name: &str) -> usize {
        self.tree
            .lock()
            .events
            .iter()
            .filter(|e| e.target == node && e.name == name)
            .count()
    }

    pub fn clear_events(&self) {
        self.tree.lock().events.clear();
    }

    pub fn value_of(&self, node: NodeHandle) -> Option<String> {
        let tree = self.tree.lock();
        tree.element(node.0 as usize).and_then(|el| tree.current_value(el))
    }

    pub fn is_checked(&self, node: NodeHandle) -> bool {
        self.tree
            .lock()
            .element(node.0 as usize)
            .map(|el| el.checked)
            .unwrap_or(false)
    }

    pub fn selected_index(&self, node: NodeHandle) -> Option<usize> {
        self.tree
            .lock()
            .element(node.0 as usize)
            .and_then(|el| el.selected_index)
    }

    pub fn text_of(&self, node: NodeHandle) -> String {
        self.tree.lock().text_content(node.0 as usize)
    }

    pub fn url(&self) -> String {
        self.tree.lock().url.clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.tree.lock().navigations.clone()
    }

    pub fn submissions(&self) -> Vec<NodeHandle> {
        self.tree.lock().submissions.clone()
    }

    pub fn active(&self) -> Option<NodeHandle> {
        self.tree.lock().active.map(|i| NodeHandle(i as u64))
    }

    fn read<R>(&self, f: impl FnOnce(&Tree) -> Result<R, AdapterError>) -> Result<R, AdapterError> {
        let tree = self.tree.lock();
        tree.ensure_reachable()?;
        f(&tree)
    }

    fn write<R>(
        &self,
        f: impl FnOnce(&mut Tree) -> Result<R, AdapterError>,
    ) -> Result<R, AdapterError> {
        let result = {
            let mut tree = self.tree.lock();
            tree.ensure_reachable()?;
            f(&mut tree)
        };
        self.changed.notify_waiters();
        result
    }
}

impl Tree {
    fn push(&mut self, node: Node) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Document with html/head/body at indexes doc, doc+1, doc+2, doc+3.
    fn new_document(&mut self, viewport: Viewport) -> usize {
        let doc = self.push(Node {
            kind: Kind::Document,
            parent: None,
            children: Vec::new(),
            attached: true,
        });
        let html = self.build(
            doc,
            El::new("html").rect(0.0, 0.0, viewport.width, viewport.height),
        );
        let body = self.build(
            html,
            El::new("body").rect(0.0, 0.0, viewport.width, viewport.height),
        );
        let head = self.build(html, El::new("head").hidden().rect(0.0, 0.0, 0.0, 0.0));
        // keep head before body in document order
        self.nodes[html].children = vec![head, body];
        debug_assert_eq!(body, doc + 2);
        doc
    }

    fn build(&mut self, parent: usize, el: El) -> usize {
        let rect = el.rect.unwrap_or_else(|| {
            let rect = Rect::new(8.0, self.next_top, 120.0, 20.0);
            self.next_top += 24.0;
            rect
        });
        let value = el.value.or_else(|| {
            (el.tag == "input")
                .then(|| el.attrs.iter().find(|(k, _)| k == "value").map(|(_, v)| v.clone()))
                .flatten()
        });
        let idx = self.push(Node {
            kind: Kind::Element(Box::new(Element {
                tag: el.tag,
                attrs: el.attrs,
                text: el.text,
                style: el.style,
                rect,
                value,
                checked: el.checked,
                selected_index: None,
                shadow: None,
                frame: None,
            })),
            parent: Some(parent),
            children: Vec::new(),
            attached: true,
        });
        self.nodes[parent].children.push(idx);
        for child in el.children {
            self.build(idx, child);
        }
        if self.element(idx).map(|e| e.tag == "select").unwrap_or(false) {
            let options = self.option_children(idx);
            let preselected = options.iter().position(|o| {
                self.element(*o)
                    .map(|e| e.attr("selected").is_some())
                    .unwrap_or(false)
            });
            let initial = preselected.or((!options.is_empty()).then_some(0));
            if let Some(el) = self.element_mut(idx) {
                el.selected_index = initial;
            }
        }
        idx
    }

    fn ensure_reachable(&self) -> Result<(), AdapterError> {
        if self.reachable {
            Ok(())
        } else {
            Err(AdapterError::new(AdapterErrorKind::CdpIo).with_hint("page is unreachable"))
        }
    }

    fn node(&self, idx: usize) -> Result<&Node, AdapterError> {
        self.nodes
            .get(idx)
            .ok_or_else(|| AdapterError::stale(format!("unknown node#{idx}")))
    }

    fn element(&self, idx: usize) -> Option<&Element> {
        match self.nodes.get(idx).map(|n| &n.kind) {
            Some(Kind::Element(el)) => Some(el),
            _ => None,
        }
    }

    fn element_mut(&mut self, idx: usize) -> Option<&mut Element> {
        match self.nodes.get_mut(idx).map(|n| &mut n.kind) {
            Some(Kind::Element(el)) => Some(el),
            _ => None,
        }
    }

    fn require_element(&self, idx: usize) -> Result<&Element, AdapterError> {
        self.node(idx)?;
        self.element(idx).ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::Internal)
                .with_hint(format!("node#{idx} is not an element"))
        })
    }

    fn rect_of(&self, idx: usize) -> Rect {
        self.element(idx).map(|e| e.rect).unwrap_or_default()
    }

    fn is_connected(&self, idx: usize) -> bool {
        let mut cursor = Some(idx);
        while let Some(i) = cursor {
            let Some(node) = self.nodes.get(i) else {
                return false;
            };
            if !node.attached {
                return false;
            }
            cursor = match node.kind {
                Kind::Document => return true,
                Kind::ShadowRoot { host } => Some(host),
                Kind::Element(_) => node.parent,
            };
            if cursor.is_none() {
                return false;
            }
        }
        false
    }

    fn text_content(&self, idx: usize) -> String {
        let mut parts = Vec::new();
        self.collect_text(idx, &mut parts);
        parts.join(" ")
    }

    fn collect_text(&self, idx: usize, out: &mut Vec<String>) {
        if let Some(el) = self.element(idx) {
            if !el.text.is_empty() {
                out.push(el.text.clone());
            }
        }
        if let Some(node) = self.nodes.get(idx) {
            for child in &node.children {
                self.collect_text(*child, out);
            }
        }
    }

    fn option_children(&self, idx: usize) -> Vec<usize> {
        let mut out = Vec::new();
        self.walk(idx, &mut |i| {
            if self.element(i).map(|e| e.tag == "option").unwrap_or(false) {
                out.push(i);
            }
        });
        out
    }

    /// Pre-order walk over the light-tree descendants of `idx` (excluding it).
    fn walk(&self, idx: usize, visit: &mut dyn FnMut(usize)) {
        if let Some(node) = self.nodes.get(idx) {
            for child in &node.children {
                visit(*child);
                self.walk(*child, visit);
            }
        }
    }

    fn options(&self, idx: usize) -> Vec<OptionFacts> {
        let selected = self.element(idx).and_then(|e| e.selected_index);
        self.option_children(idx)
            .into_iter()
            .enumerate()
            .filter_map(|(i, o)| {
                let el = self.element(o)?;
                let text = self.text_content(o);
                Some(OptionFacts {
                    value: el.attr("value").map(str::to_string).unwrap_or_else(|| text.clone()),
                    text,
                    selected: selected == Some(i),
                    disabled: el.attr("disabled").is_some(),
                })
            })
            .collect()
    }

    fn current_value(&self, el: &Element) -> Option<String> {
        if el.tag == "select" {
            return None;
        }
        if el.has_value_property() {
            Some(el.value.clone().unwrap_or_default())
        } else {
            None
        }
    }

    fn facts(&self, idx: usize) -> Result<NodeFacts, AdapterError> {
        let el = self.require_element(idx)?;
        let connected = self.is_connected(idx);
        let options = if el.tag == "select" || el.tag == "datalist" {
            self.options(idx)
        } else {
            Vec::new()
        };
        let value = if el.tag == "select" {
            el.selected_index
                .and_then(|i| options.get(i))
                .map(|o| o.value.clone())
                .or_else(|| Some(String::new()))
        } else {
            self.current_value(el)
        };
        let input_type = el.input_type();
        let checked = (el.tag == "input" && matches!(input_type.as_str(), "checkbox" | "radio"))
            .then_some(el.checked);
        let selected = (el.tag == "option").then(|| {
            self.nodes[idx]
                .parent
                .and_then(|p| {
                    let select = self.closest_tag(p, "select")?;
                    let pos = self.option_children(select).iter().position(|o| *o == idx)?;
                    Some(self.element(select)?.selected_index == Some(pos))
                })
                .unwrap_or(false)
        });
        let disabled = el.attr("disabled").is_some()
            && matches!(
                el.tag.as_str(),
                "button" | "input" | "select" | "textarea" | "option" | "fieldset"
            );
        Ok(NodeFacts {
            tag: el.tag.clone(),
            attributes: el.attrs.clone(),
            text: self.text_content(idx),
            connected,
            style: el.style.clone(),
            rect: if connected { el.rect } else { Rect::default() },
            control: ControlState {
                value,
                checked,
                selected,
                disabled,
                read_only: el.attr("readonly").is_some(),
                content_editable: el.content_editable() || self.inherits_editable(idx),
                selected_index: if el.tag == "select" {
                    Some(el.selected_index.map(|i| i as i64).unwrap_or(-1))
                } else {
                    None
                },
                options,
            },
        })
    }

    fn inherits_editable(&self, idx: usize) -> bool {
        let mut cursor = self.nodes.get(idx).and_then(|n| n.parent);
        while let Some(i) = cursor {
            match self.element(i) {
                Some(el) if el.attr("contenteditable").is_some() => return el.content_editable(),
                Some(_) => cursor = self.nodes[i].parent,
                None => return false,
            }
        }
        false
    }

    fn closest_tag(&self, idx: usize, tag: &str) -> Option<usize> {
        let mut cursor = Some(idx);
        while let Some(i) = cursor {
            let el = self.element(i)?;
            if el.tag == tag {
                return Some(i);
            }
            cursor = self.nodes[i].parent;
        }
        None
    }

    fn composed_parent(&self, idx: usize) -> Option<usize> {
        let parent = self.nodes.get(idx)?.parent?;
        match self.nodes[parent].kind {
            Kind::Element(_) => Some(parent),
            Kind::ShadowRoot { host } => Some(host),
            Kind::Document => None,
        }
    }

    fn root_of(&self, idx: usize) -> usize {
        let mut cursor = idx;
        while let Some(parent) = self.nodes.get(cursor).and_then(|n| n.parent) {
            cursor = parent;
        }
        cursor
    }

    fn path(&self, idx: usize) -> Vec<PathStep> {
        let mut steps = Vec::new();
        let mut cursor = Some(idx);
        while let Some(i) = cursor {
            let Some(el) = self.element(i) else {
                break;
            };
            let same: Vec<usize> = self
                .siblings(i)
                .into_iter()
                .filter(|s| self.element(*s).map(|e| e.tag == el.tag).unwrap_or(false))
                .collect();
            steps.push(PathStep {
                tag: el.tag.clone(),
                id: el.attr("id").filter(|v| !v.is_empty()).map(str::to_string),
                index: same.iter().position(|s| *s == i).map(|p| p + 1).unwrap_or(1),
                same_tag: same.len().max(1),
            });
            cursor = self.nodes[i].parent;
        }
        steps.reverse();
        steps
    }

    fn query_all(&self, root: usize, css: &str) -> Result<Vec<usize>, AdapterError> {
        self.node(root)?;
        let list = SelectorList::parse(css).map_err(|err| {
            AdapterError::new(AdapterErrorKind::InvalidSelector).with_hint(err.to_string())
        })?;
        let mut out = Vec::new();
        self.walk(root, &mut |i| {
            if self.element(i).is_some() && list.matches(self, i) {
                out.push(i);
            }
        });
        Ok(out)
    }

    fn xpath(&self, root: usize, expr: &str) -> Result<Vec<usize>, AdapterError> {
        let invalid = || {
            AdapterError::new(AdapterErrorKind::InvalidSelector)
                .with_hint(format!("unsupported xpath `{expr}`"))
        };
        let body = expr.strip_prefix('/').ok_or_else(invalid)?;
        let mut current = vec![root];
        for step in body.split('/') {
            let (name, index) = match step.split_once('[') {
                Some((name, rest)) => {
                    let n = rest
                        .strip_suffix(']')
                        .and_then(|n| n.parse::<usize>().ok())
                        .ok_or_else(invalid)?;
                    (name, Some(n))
                }
                None => (step, None),
            };
            if name.is_empty() {
                return Err(invalid());
            }
            let mut next = Vec::new();
            for parent in &current {
                let same: Vec<usize> = self.nodes[*parent]
                    .children
                    .iter()
                    .copied()
                    .filter(|c| {
                        self.element(*c)
                            .map(|e| name == "*" || e.tag.eq_ignore_ascii_case(name))
                            .unwrap_or(false)
                    })
                    .collect();
                match index {
                    Some(n) => next.extend(same.get(n.wrapping_sub(1)).copied()),
                    None => next.extend(same),
                }
            }
            current = next;
        }
        Ok(current)
    }

    fn record(&mut self, target: usize, event: &SyntheticEvent, native: bool) {
        self.events.push(EventRecord {
            target: NodeHandle(target as u64),
            name: event.name.clone(),
            data: event.init.data.clone(),
            key: event.init.key.clone(),
            native,
        });
    }

    /// Dispatch with bubbling reactions and default click activation.
    fn dispatch(&mut self, target: usize, event: &SyntheticEvent, native: bool) -> bool {
        self.record(target, event, native);
        let mut path = vec![target];
        if event.init.bubbles {
            let mut cursor = self.composed_parent(target);
            while let Some(i) = cursor {
                path.push(i);
                cursor = self.composed_parent(i);
            }
        }
        let matching: Vec<Reaction> = path
            .iter()
            .flat_map(|node| {
                self.reactions
                    .iter()
                    .filter(move |(n, e, _)| n == node && *e == event.name)
                    .map(|(_, _, r)| r.clone())
            })
            .collect();

        let mut proceed = true;
        for reaction in matching {
            match reaction {
                Reaction::PreventDefault => {
                    if event.init.cancelable {
                        proceed = false;
                    }
                }
                Reaction::Show(node) => {
                    if let Some(el) = self.element_mut(node.0 as usize) {
                        if el.style.display == "none" {
                            el.style.display = "block".into();
                        }
                        el.style.visibility = "visible".into();
                    }
                }
                Reaction::Hide(node) => {
                    if let Some(el) = self.element_mut(node.0 as usize) {
                        el.style.display = "none".into();
                    }
                }
                Reaction::InsertData => {
                    if let Some(data) = event.init.data.clone() {
                        self.append_text(target, &data);
                    }
                    proceed = false;
                }
                Reaction::Navigate(url) => self.navigate(&url),
                Reaction::Requests(n) => self.resources += n,
            }
        }

        if proceed && event.name == "click" {
            self.activate(target);
        }
        proceed
    }

    fn activate(&mut self, target: usize) {
        let Some(el) = self.element(target).cloned() else {
            return;
        };
        if el.attr("disabled").is_some() {
            return;
        }
        match (el.tag.as_str(), el.input_type().as_str()) {
            ("input", "checkbox") => {
                if let Some(e) = self.element_mut(target) {
                    e.checked = !e.checked;
                }
                self.fire_change(target);
            }
            ("input", "radio") => {
                if !el.checked {
                    let group = el.attr("name").map(str::to_string);
                    let peers: Vec<usize> = (0..self.nodes.len())
                        .filter(|i| {
                            self.element(*i)
                                .map(|e| {
                                    e.tag == "input"
                                        && e.input_type() == "radio"
                                        && e.attr("name").map(str::to_string) == group
                                })
                                .unwrap_or(false)
                        })
                        .collect();
                    for peer in peers {
                        if let Some(e) = self.element_mut(peer) {
                            e.checked = peer == target;
                        }
                    }
                    self.fire_change(target);
                }
            }
            ("input", "submit") | ("button", _)
                if el.tag == "input"
                    || el.attr("type").map(|t| t.eq_ignore_ascii_case("submit")).unwrap_or(true) =>
            {
                if let Some(form) = self.closest_tag(target, "form") {
                    self.submit(form);
                }
            }
            _ => {
                if let Some(anchor) = self.closest_tag(target, "a") {
                    if let Some(href) = self.element(anchor).and_then(|a| a.attr("href")) {
                        let href = href.to_string();
                        if !href.starts_with('#') && !href.starts_with("javascript:") {
                            self.navigate(&href);
                        }
                    }
                }
            }
        }
    }

    fn fire_change(&mut self, target: usize) {
        let input = SyntheticEvent::input("input", None, "insertReplacementText");
        self.dispatch(target, &input, true);
        self.dispatch(target, &SyntheticEvent::basic("change", false), true);
    }

    fn submit(&mut self, form: usize) {
        if self.dispatch(form, &SyntheticEvent::basic("submit", true), true) {
            self.submissions.push(NodeHandle(form as u64));
        }
    }

    fn navigate(&mut self, href: &str) {
        let resolved = url::Url::parse(&self.url)
            .and_then(|base| base.join(href))
            .map(|u| u.to_string())
            .unwrap_or_else(|_| href.to_string());
        self.navigations.push(resolved.clone());
        self.url = resolved;
    }

    fn append_text(&mut self, target: usize, text: &str) {
        let Some(el) = self.element_mut(target) else {
            return;
        };
        if el.has_value_property() && el.tag != "select" {
            el.value.get_or_insert_with(String::new).push_str(text);
        } else {
            el.text.push_str(text);
        }
    }
}

impl ElementTree for Tree {
    type Node = usize;

    fn tag(&self, node: usize) -> &str {
        self.element(node).map(|e| e.tag.as_str()).unwrap_or("")
    }

    fn attr(&self, node: usize, name: &str) -> Option<&str> {
        self.element(node).and_then(|e| e.attr(name))
    }

    fn parent_element(&self, node: usize) -> Option<usize> {
        let parent = self.nodes.get(node)?.parent?;
        self.element(parent).map(|_| parent)
    }

    fn siblings(&self, node: usize) -> Vec<usize> {
        match self.nodes.get(node).and_then(|n| n.parent) {
            Some(parent) => self.nodes[parent]
                .children
                .iter()
                .copied()
                .filter(|c| self.element(*c).is_some())
                .collect(),
            None => vec![node],
        }
    }
}

fn handles(indexes: Vec<usize>) -> Vec<NodeHandle> {
    indexes.into_iter().map(|i| NodeHandle(i as u64)).collect()
}

#[async_trait]
impl DomPort for MemoryDom {
    async fn page_info(&self) -> Result<PageInfo, AdapterError> {
        self.read(|tree| {
            Ok(PageInfo {
                url: tree.url.clone(),
                title: tree.title.clone(),
                viewport: tree.viewport,
            })
        })
    }

    async fn document(&self) -> Result<NodeHandle, AdapterError> {
        self.read(|_| Ok(NodeHandle(0)))
    }

    async fn query_all(&self, root: NodeHandle, css: &str) -> Result<Vec<NodeHandle>, AdapterError> {
        self.read(|tree| tree.query_all(root.0 as usize, css).map(handles))
    }

    async fn matches(&self, node: NodeHandle, css: &str) -> Result<bool, AdapterError> {
        self.read(|tree| {
            tree.require_element(node.0 as usize)?;
            let list = SelectorList::parse(css).map_err(|err| {
                AdapterError::new(AdapterErrorKind::InvalidSelector).with_hint(err.to_string())
            })?;
            Ok(list.matches(tree, node.0 as usize))
        })
    }

    async fn children(&self, node: NodeHandle) -> Result<Vec<NodeHandle>, AdapterError> {
        self.read(|tree| {
            let n = tree.node(node.0 as usize)?;
            Ok(handles(
                n.children
                    .iter()
                    .copied()
                    .filter(|c| tree.element(*c).is_some())
                    .collect(),
            ))
        })
    }

    async fn shadow_root(&self, node: NodeHandle) -> Result<Option<NodeHandle>, AdapterError> {
        self.read(|tree| {
            tree.node(node.0 as usize)?;
            Ok(tree
                .element(node.0 as usize)
                .and_then(|e| e.shadow)
                .map(|s| NodeHandle(s as u64)))
        })
    }

    async fn frame_content(&self, node: NodeHandle) -> Result<FrameContent, AdapterError> {
        self.read(|tree| {
            let el = tree.require_element(node.0 as usize)?;
            if !matches!(el.tag.as_str(), "iframe" | "frame") {
                return Ok(FrameContent::NotFrame);
            }
            let src = el.attr("src").map(str::to_string);
            let name = el.attr("name").map(str::to_string);
            Ok(match &el.frame {
                Some(FrameSlot {
                    document: Some(doc),
                    cross_origin: false,
                }) => FrameContent::SameOrigin {
                    document: NodeHandle(*doc as u64),
                    src,
                    name,
                },
                Some(FrameSlot {
                    cross_origin: true, ..
                }) => FrameContent::CrossOrigin { src, name },
                _ => FrameContent::NotFrame,
            })
        })
    }

    async fn shadow_hosts(&self, root: NodeHandle) -> Result<Vec<NodeHandle>, AdapterError> {
        self.read(|tree| {
            tree.node(root.0 as usize)?;
            let mut hosts = Vec::new();
            tree.walk(root.0 as usize, &mut |i| {
                if tree.element(i).and_then(|e| e.shadow).is_some() {
                    hosts.push(i);
                }
            });
            Ok(handles(hosts))
        })
    }

    async fn root_of(&self, node: NodeHandle) -> Result<NodeHandle, AdapterError> {
        self.read(|tree| {
            tree.node(node.0 as usize)?;
            Ok(NodeHandle(tree.root_of(node.0 as usize) as u64))
        })
    }

    async fn path(&self, node: NodeHandle) -> Result<Vec<PathStep>, AdapterError> {
        self.read(|tree| {
            tree.require_element(node.0 as usize)?;
            Ok(tree.path(node.0 as usize))
        })
    }

    async fn parent(&self, node: NodeHandle) -> Result<Option<NodeHandle>, AdapterError> {
        self.read(|tree| {
            tree.node(node.0 as usize)?;
            Ok(tree
                .composed_parent(node.0 as usize)
                .map(|p| NodeHandle(p as u64)))
        })
    }

    async fn facts(&self, node: NodeHandle) -> Result<NodeFacts, AdapterError> {
        self.read(|tree| tree.facts(node.0 as usize))
    }

    async fn xpath(&self, root: NodeHandle, expr: &str) -> Result<Vec<NodeHandle>, AdapterError> {
        self.read(|tree| tree.xpath(root.0 as usize, expr).map(handles))
    }

    async fn active_element(&self) -> Result<Option<NodeHandle>, AdapterError> {
        self.read(|tree| Ok(tree.active.map(|i| NodeHandle(i as u64))))
    }

    async fn drain_listener_registrations(&self) -> Result<Vec<NodeHandle>, AdapterError> {
        self.write(|tree| Ok(std::mem::take(&mut tree.listener_queue)))
    }

    async fn resource_count(&self) -> Result<u64, AdapterError> {
        self.read(|tree| Ok(tree.resources))
    }

    async fn dispatch(&self, node: NodeHandle, event: &SyntheticEvent) -> Result<bool, AdapterError> {
        self.write(|tree| {
            let idx = node.0 as usize;
            tree.require_element(idx)?;
            if !tree.is_connected(idx) {
                return Err(AdapterError::stale(format!("{node} is detached")));
            }
            Ok(tree.dispatch(idx, event, false))
        })
    }

    async fn focus(&self, node: NodeHandle) -> Result<(), AdapterError> {
        self.write(|tree| {
            let idx = node.0 as usize;
            tree.require_element(idx)?;
            if tree.active != Some(idx) {
                if let Some(prev) = tree.active {
                    tree.record(prev, &SyntheticEvent::focus("blur"), true);
                }
                tree.active = Some(idx);
                tree.record(idx, &SyntheticEvent::focus("focus"), true);
            }
            Ok(())
        })
    }

    async fn native_click(&self, node: NodeHandle) -> Result<(), AdapterError> {
        self.write(|tree| {
            let idx = node.0 as usize;
            tree.require_element(idx)?;
            if !tree.is_connected(idx) {
                return Err(AdapterError::stale(format!("{node} is detached")));
            }
            let (x, y) = tree.rect_of(idx).center();
            tree.dispatch(idx, &SyntheticEvent::mouse("click", x, y), true);
            Ok(())
        })
    }

    async fn set_value(&self, node: NodeHandle, value: &str) -> Result<bool, AdapterError> {
        self.write(|tree| {
            let idx = node.0 as usize;
            let el = tree.require_element(idx)?;
            if !el.has_value_property() {
                return Ok(false);
            }
            if el.tag == "select" {
                let pos = tree.options(idx).iter().position(|o| o.value == value);
                return Ok(match (pos, tree.element_mut(idx)) {
                    (Some(pos), Some(el)) => {
                        el.selected_index = Some(pos);
                        true
                    }
                    _ => false,
                });
            }
            if let Some(el) = tree.element_mut(idx) {
                el.value = Some(value.to_string());
            }
            Ok(true)
        })
    }

    async fn place_caret_at_end(&self, node: NodeHandle) -> Result<(), AdapterError> {
        self.write(|tree| {
            tree.require_element(node.0 as usize)?;
            tree.active = Some(node.0 as usize);
            Ok(())
        })
    }

    async fn insert_text(
        &self,
        node: NodeHandle,
        text: &str,
        mode: InsertMode,
    ) -> Result<bool, AdapterError> {
        self.write(|tree| {
            let idx = node.0 as usize;
            let el = tree.require_element(idx)?.clone();
            let editable = el.content_editable() || tree.inherits_editable(idx);
            let text_field = el.has_value_property() && el.tag != "select";
            match mode {
                InsertMode::Command => {
                    if !tree.exec_command || !(editable || text_field) {
                        return Ok(false);
                    }
                    let before = SyntheticEvent::input("beforeinput", Some(text), "insertText");
                    tree.record(idx, &before, true);
                    tree.append_text(idx, text);
                    tree.record(
                        idx,
                        &SyntheticEvent::input("input", Some(text), "insertText"),
                        true,
                    );
                    Ok(true)
                }
                InsertMode::Append => {
                    if text_field || !editable {
                        return Ok(false);
                    }
                    tree.append_text(idx, text);
                    Ok(true)
                }
            }
        })
    }

    async fn set_selected_index(&self, node: NodeHandle, index: usize) -> Result<(), AdapterError> {
        self.write(|tree| {
            let idx = node.0 as usize;
            let count = tree.options(idx).len();
            match tree.element_mut(idx) {
                Some(el) if el.tag == "select" && index < count => {
                    el.selected_index = Some(index);
                    Ok(())
                }
                _ => Err(AdapterError::new(AdapterErrorKind::Internal)
                    .with_hint(format!("{node} has no option {index}"))),
            }
        })
    }

    async fn request_submit(&self, form: NodeHandle) -> Result<(), AdapterError> {
        self.write(|tree| {
            tree.require_element(form.0 as usize)?;
            tree.submit(form.0 as usize);
            Ok(())
        })
    }

    async fn schedule_navigation(&self, url: &str) -> Result<(), AdapterError> {
        self.write(|tree| {
            tree.navigate(url);
            Ok(())
        })
    }

    async fn scroll(&self, request: ScrollRequest) -> Result<(), AdapterError> {
        self.write(|tree| {
            match request {
                ScrollRequest::IntoView(node) => {
                    let rect = tree.require_element(node.0 as usize)?.rect;
                    tree.viewport.scroll_y = (tree.viewport.scroll_y + rect.top).max(0.0);
                }
                ScrollRequest::By { dx, dy } => {
                    tree.viewport.scroll_x = (tree.viewport.scroll_x + dx).max(0.0);
                    tree.viewport.scroll_y = (tree.viewport.scroll_y + dy).max(0.0);
                }
                ScrollRequest::To { x, y } => {
                    tree.viewport.scroll_x = x.max(0.0);
                    tree.viewport.scroll_y = y.max(0.0);
                }
            }
            Ok(())
        })
    }

    async fn wait_for_selector(&self, css: &str, timeout: Duration) -> Result<bool, AdapterError> {
        SelectorList::parse(css).map_err(|err| {
            AdapterError::new(AdapterErrorKind::InvalidSelector).with_hint(err.to_string())
        })?;
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.changed.notified();
            let found = self.read(|tree| Ok(!tree.query_all(0, css)?.is_empty()))?;
            if found {
                return Ok(true);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || tokio::time::timeout(remaining, notified).await.is_err() {
                return Ok(false);
            }
        }
    }

    async fn ping(&self) -> Result<(), AdapterError> {
        self.read(|_| Ok(()))
    }

    async fn reconnect(&self) -> Result<(), AdapterError> {
        let mut tree = self.tree.lock();
        if tree.heal_on_reconnect {
            tree.reachable = true;
            Ok(())
        } else {
            Err(AdapterError::new(AdapterErrorKind::CdpIo).with_hint("page stays unreachable"))
        }
    }
}
