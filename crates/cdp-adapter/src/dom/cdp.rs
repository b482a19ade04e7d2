//! [`DomPort`] over a live Chromium page session.
//!
//! Every operation is a `Runtime.evaluate` or `Runtime.callFunctionOn` on the
//! page session. Nodes travel as remote object ids; a handle is the node's
//! `backendNodeId`, so the same DOM node always maps to the same handle.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{
    DomPort, FrameContent, InsertMode, NodeFacts, NodeHandle, PageInfo, PathStep, ScrollRequest,
    SyntheticEvent,
};
use crate::error::{AdapterError, AdapterErrorKind};
use crate::transport::{CdpTransport, CommandTarget};

const OBJECT_GROUP: &str = "pagepilot";
const WAIT_CHUNK: Duration = Duration::from_secs(5);

/// Records elements that register interaction listeners into a page-global queue.
pub(crate) const LISTENER_HOOK: &str = r#"(() => {
  if (window.__pagepilotHooked) return;
  window.__pagepilotHooked = true;
  window.__pagepilotListenerQueue = [];
  const tracked = new Set(['click', 'mousedown', 'mouseup', 'pointerdown', 'pointerup',
    'touchstart', 'keydown', 'keyup', 'input', 'change', 'submit']);
  const original = EventTarget.prototype.addEventListener;
  EventTarget.prototype.addEventListener = function (type, listener, options) {
    try {
      if (this && this.nodeType === 1 && tracked.has(type)) {
        const queue = window.__pagepilotListenerQueue;
        if (queue.length < 5000) queue.push(this);
      }
    } catch (_) {}
    return original.call(this, type, listener, options);
  };
})();"#;

const FACTS_FN: &str = r#"function () {
  const el = this;
  const tag = el.tagName.toLowerCase();
  const cs = getComputedStyle(el);
  const r = el.getBoundingClientRect();
  const opacity = parseFloat(cs.opacity);
  const listOptions = (opts) => Array.from(opts || []).map((o) => ({
    value: String(o.value), text: String(o.text || o.label || ''),
    selected: !!o.selected, disabled: !!o.disabled,
  }));
  const control = {
    disabled: !!el.disabled,
    readOnly: !!el.readOnly,
    contentEditable: !!el.isContentEditable,
    options: [],
  };
  if (tag === 'input' || tag === 'textarea' || tag === 'select') control.value = String(el.value ?? '');
  if (tag === 'input' && (el.type === 'checkbox' || el.type === 'radio')) control.checked = !!el.checked;
  if (tag === 'option') control.selected = !!el.selected;
  if (tag === 'select') {
    control.selectedIndex = el.selectedIndex;
    control.options = listOptions(el.options);
  }
  if (tag === 'datalist') control.options = listOptions(el.options);
  return {
    tag,
    attributes: Array.from(el.attributes).map((a) => [a.name, a.value]),
    text: String((el.innerText ?? el.textContent) || ''),
    connected: el.isConnected,
    style: {
      display: cs.display, visibility: cs.visibility,
      opacity: Number.isNaN(opacity) ? 1 : opacity,
      pointerEvents: cs.pointerEvents, overflowX: cs.overflowX, overflowY: cs.overflowY,
      cursor: cs.cursor,
    },
    rect: { left: r.left, top: r.top, width: r.width, height: r.height },
    control,
  };
}"#;

const DISPATCH_FN: &str = r#"function (name, cls, init) {
  const ctor = {
    pointer: window.PointerEvent || MouseEvent, mouse: MouseEvent, keyboard: KeyboardEvent,
    input: window.InputEvent || Event, focus: FocusEvent, basic: Event,
  }[cls] || Event;
  const opts = Object.assign({ composed: true }, init);
  if (cls !== 'basic') opts.view = window;
  let ev;
  try { ev = new ctor(name, opts); } catch (_) { ev = new Event(name, opts); }
  if (init.keyCode) {
    try {
      Object.defineProperty(ev, 'keyCode', { get: () => init.keyCode });
      Object.defineProperty(ev, 'which', { get: () => init.keyCode });
    } catch (_) {}
  }
  return this.dispatchEvent(ev);
}"#;

const SET_VALUE_FN: &str = r#"function (v) {
  const tag = this.tagName.toLowerCase();
  const proto = { input: HTMLInputElement, textarea: HTMLTextAreaElement, select: HTMLSelectElement }[tag];
  if (!proto) return false;
  if (tag === 'input' && ['checkbox', 'radio', 'file'].includes(this.type)) return false;
  const desc = Object.getOwnPropertyDescriptor(proto.prototype, 'value');
  if (!desc || !desc.set) return false;
  desc.set.call(this, v);
  return tag === 'select' ? this.value === v : true;
}"#;

const CARET_FN: &str = r#"function () {
  this.focus();
  if (typeof this.setSelectionRange === 'function' && typeof this.value === 'string') {
    try { this.setSelectionRange(this.value.length, this.value.length); } catch (_) {}
    return;
  }
  const sel = window.getSelection();
  if (!sel) return;
  const range = document.createRange();
  range.selectNodeContents(this);
  range.collapse(false);
  sel.removeAllRanges();
  sel.addRange(range);
}"#;

const ACTIVE_ELEMENT: &str = r#"(() => {
  let a = document.activeElement;
  while (a) {
    if (a.shadowRoot && a.shadowRoot.activeElement) { a = a.shadowRoot.activeElement; continue; }
    if (a.tagName === 'IFRAME' || a.tagName === 'FRAME') {
      let inner = null;
      try { inner = a.contentDocument && a.contentDocument.activeElement; } catch (_) {}
      if (inner && inner !== a.contentDocument.body) { a = inner; continue; }
    }
    break;
  }
  return a && a !== document.body ? a : null;
})()"#;

/// DOM port bound to one CDP page (or out-of-process frame) session.
pub struct CdpDomPort {
    transport: Arc<dyn CdpTransport>,
    session: RwLock<String>,
    target_id: Option<String>,
    objects: DashMap<u64, String>,
}

impl CdpDomPort {
    pub fn new(
        transport: Arc<dyn CdpTransport>,
        session_id: impl Into<String>,
        target_id: Option<String>,
    ) -> Self {
        Self {
            transport,
            session: RwLock::new(session_id.into()),
            target_id,
            objects: DashMap::new(),
        }
    }

    pub fn session_id(&self) -> String {
        self.session.read().clone()
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, AdapterError> {
        let session = self.session_id();
        self.transport
            .send_command(CommandTarget::Session(session), method, params)
            .await
    }

    /// Enable the runtime and make listener registrations observable.
    pub async fn install_hooks(&self) -> Result<(), AdapterError> {
        self.call("Runtime.enable", json!({})).await?;
        self.call(
            "Page.addScriptToEvaluateOnNewDocument",
            json!({ "source": LISTENER_HOOK }),
        )
        .await?;
        self.evaluate_value(LISTENER_HOOK).await?;
        Ok(())
    }

    async fn evaluate(&self, expression: &str, by_value: bool) -> Result<Value, AdapterError> {
        let reply = self
            .call(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": by_value,
                    "awaitPromise": true,
                    "objectGroup": OBJECT_GROUP,
                }),
            )
            .await?;
        unwrap_remote(reply)
    }

    async fn evaluate_value(&self, expression: &str) -> Result<Value, AdapterError> {
        let remote = self.evaluate(expression, true).await?;
        Ok(remote.get("value").cloned().unwrap_or(Value::Null))
    }

    async fn call_on(
        &self,
        node: NodeHandle,
        function: &str,
        args: Vec<Value>,
        by_value: bool,
    ) -> Result<Value, AdapterError> {
        let object_id = self.object_id(node).await?;
        let arguments: Vec<Value> = args.into_iter().map(|v| json!({ "value": v })).collect();
        let reply = self
            .call(
                "Runtime.callFunctionOn",
                json!({
                    "functionDeclaration": function,
                    "objectId": object_id,
                    "arguments": arguments,
                    "returnByValue": by_value,
                    "awaitPromise": true,
                    "objectGroup": OBJECT_GROUP,
                }),
            )
            .await?;
        unwrap_remote(reply)
    }

    async fn call_value(
        &self,
        node: NodeHandle,
        function: &str,
        args: Vec<Value>,
    ) -> Result<Value, AdapterError> {
        let remote = self.call_on(node, function, args, true).await?;
        Ok(remote.get("value").cloned().unwrap_or(Value::Null))
    }

    async fn call_node(
        &self,
        node: NodeHandle,
        function: &str,
    ) -> Result<Option<NodeHandle>, AdapterError> {
        let remote = self.call_on(node, function, Vec::new(), false).await?;
        self.adopt(&remote).await
    }

    async fn call_nodes(
        &self,
        node: NodeHandle,
        function: &str,
        args: Vec<Value>,
    ) -> Result<Vec<NodeHandle>, AdapterError> {
        let remote = self.call_on(node, function, args, false).await?;
        self.adopt_array(&remote).await
    }

    /// Remote object for a handle, resolved again from its backend id once the
    /// object group has been released.
    async fn object_id(&self, node: NodeHandle) -> Result<String, AdapterError> {
        if let Some(entry) = self.objects.get(&node.0) {
            return Ok(entry.value().clone());
        }
        let resolved = self
            .call(
                "DOM.resolveNode",
                json!({ "backendNodeId": node.0, "objectGroup": OBJECT_GROUP }),
            )
            .await
            .ok()
            .and_then(|reply| {
                reply
                    .pointer("/object/objectId")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .ok_or_else(|| AdapterError::stale(format!("{node} is no longer in the page")))?;
        self.objects.insert(node.0, resolved.clone());
        Ok(resolved)
    }

    /// Register a remote node object and return its handle.
    async fn adopt(&self, remote: &Value) -> Result<Option<NodeHandle>, AdapterError> {
        let Some(object_id) = remote.get("objectId").and_then(Value::as_str) else {
            return Ok(None);
        };
        if remote.get("subtype").and_then(Value::as_str) == Some("null") {
            return Ok(None);
        }
        let described = self
            .call("DOM.describeNode", json!({ "objectId": object_id }))
            .await?;
        let backend = described
            .pointer("/node/backendNodeId")
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                AdapterError::new(AdapterErrorKind::Internal).with_hint("node without backendNodeId")
            })?;
        self.objects
            .entry(backend)
            .or_insert_with(|| object_id.to_string());
        Ok(Some(NodeHandle(backend)))
    }

    async fn adopt_array(&self, remote: &Value) -> Result<Vec<NodeHandle>, AdapterError> {
        let Some(array_id) = remote.get("objectId").and_then(Value::as_str) else {
            return Ok(Vec::new());
        };
        let props = self
            .call(
                "Runtime.getProperties",
                json!({ "objectId": array_id, "ownProperties": true }),
            )
            .await?;
        let mut indexed: Vec<(usize, Value)> = props
            .get("result")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| {
                        let index = entry.get("name")?.as_str()?.parse::<usize>().ok()?;
                        Some((index, entry.get("value")?.clone()))
                    })
                    .collect()
            })
            .unwrap_or_default();
        indexed.sort_by_key(|(index, _)| *index);

        let mut handles = Vec::with_capacity(indexed.len());
        for (_, value) in indexed {
            if let Some(handle) = self.adopt(&value).await? {
                handles.push(handle);
            }
        }
        Ok(handles)
    }

    async fn evaluate_nodes(&self, expression: &str) -> Result<Vec<NodeHandle>, AdapterError> {
        let remote = self.evaluate(expression, false).await?;
        self.adopt_array(&remote).await
    }

    async fn reattach(&self) -> Result<(), AdapterError> {
        let Some(target_id) = &self.target_id else {
            return Err(AdapterError::new(AdapterErrorKind::CdpIo).with_hint("no target to reattach"));
        };
        let reply = self
            .transport
            .send_command(
                CommandTarget::Browser,
                "Target.attachToTarget",
                json!({ "targetId": target_id, "flatten": true }),
            )
            .await?;
        let session = reply
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                AdapterError::new(AdapterErrorKind::CdpIo).with_hint("attachToTarget returned no session")
            })?;
        *self.session.write() = session.to_string();
        debug!(target: "cdp-dom", %target_id, session, "reattached page session");
        Ok(())
    }
}

/// Pull the `result` remote object out of an evaluate reply, mapping page exceptions.
fn unwrap_remote(reply: Value) -> Result<Value, AdapterError> {
    if let Some(details) = reply.get("exceptionDetails") {
        let description = details
            .pointer("/exception/description")
            .and_then(Value::as_str)
            .or_else(|| details.get("text").and_then(Value::as_str))
            .unwrap_or("script exception")
            .to_string();
        let kind = if description.contains("is not a valid selector")
            || description.contains("is not a valid XPath")
        {
            AdapterErrorKind::InvalidSelector
        } else {
            AdapterErrorKind::ScriptException
        };
        return Err(AdapterError::new(kind).with_hint(description));
    }
    Ok(reply.get("result").cloned().unwrap_or(Value::Null))
}

fn as_bool(value: &Value) -> bool {
    value.as_bool().unwrap_or(false)
}

#[async_trait]
impl DomPort for CdpDomPort {
    async fn page_info(&self) -> Result<PageInfo, AdapterError> {
        let value = self
            .evaluate_value(
                "({ url: location.href, title: document.title, viewport: { width: innerWidth, \
                 height: innerHeight, scrollX: scrollX, scrollY: scrollY } })",
            )
            .await?;
        serde_json::from_value(value).map_err(|err| {
            AdapterError::new(AdapterErrorKind::Internal).with_hint(format!("page info: {err}"))
        })
    }

    async fn document(&self) -> Result<NodeHandle, AdapterError> {
        let remote = self.evaluate("document", false).await?;
        self.adopt(&remote)
            .await?
            .ok_or_else(|| AdapterError::new(AdapterErrorKind::Internal).with_hint("no document"))
    }

    async fn query_all(&self, root: NodeHandle, css: &str) -> Result<Vec<NodeHandle>, AdapterError> {
        self.call_nodes(
            root,
            "function (sel) { return Array.from(this.querySelectorAll(sel)); }",
            vec![json!(css)],
        )
        .await
    }

    async fn matches(&self, node: NodeHandle, css: &str) -> Result<bool, AdapterError> {
        let value = self
            .call_value(
                node,
                "function (sel) { return this.matches(sel); }",
                vec![json!(css)],
            )
            .await?;
        Ok(as_bool(&value))
    }

    async fn children(&self, node: NodeHandle) -> Result<Vec<NodeHandle>, AdapterError> {
        self.call_nodes(
            node,
            "function () { if (this.nodeType === 9) return this.documentElement ? [this.documentElement] : []; \
             return Array.from(this.children); }",
            Vec::new(),
        )
        .await
    }

    async fn shadow_root(&self, node: NodeHandle) -> Result<Option<NodeHandle>, AdapterError> {
        self.call_node(node, "function () { return this.shadowRoot || null; }")
            .await
    }

    async fn frame_content(&self, node: NodeHandle) -> Result<FrameContent, AdapterError> {
        let classified = self
            .call_value(
                node,
                "function () { const t = (this.tagName || '').toLowerCase(); \
                 if (t !== 'iframe' && t !== 'frame') return { kind: 'none' }; \
                 let doc = null; try { doc = this.contentDocument; } catch (_) {} \
                 return { kind: doc ? 'same' : 'cross', src: this.getAttribute('src'), name: this.getAttribute('name') }; }",
                Vec::new(),
            )
            .await?;
        let text = |key: &str| classified.get(key).and_then(Value::as_str).map(str::to_string);
        match classified.get("kind").and_then(Value::as_str) {
            Some("same") => {
                let document = self
                    .call_node(node, "function () { return this.contentDocument; }")
                    .await?;
                Ok(match document {
                    Some(document) => FrameContent::SameOrigin {
                        document,
                        src: text("src"),
                        name: text("name"),
                    },
                    None => FrameContent::CrossOrigin {
                        src: text("src"),
                        name: text("name"),
                    },
                })
            }
            Some("cross") => Ok(FrameContent::CrossOrigin {
                src: text("src"),
                name: text("name"),
            }),
            _ => Ok(FrameContent::NotFrame),
        }
    }

    async fn shadow_hosts(&self, root: NodeHandle) -> Result<Vec<NodeHandle>, AdapterError> {
        self.call_nodes(
            root,
            "function () { return Array.from(this.querySelectorAll('*')).filter((e) => e.shadowRoot); }",
            Vec::new(),
        )
        .await
    }

    async fn root_of(&self, node: NodeHandle) -> Result<NodeHandle, AdapterError> {
        self.call_node(node, "function () { return this.getRootNode(); }")
            .await?
            .ok_or_else(|| AdapterError::stale(format!("{node} has no root")))
    }

    async fn path(&self, node: NodeHandle) -> Result<Vec<PathStep>, AdapterError> {
        let value = self
            .call_value(
                node,
                "function () { const steps = []; let el = this; \
                 while (el && el.nodeType === 1) { const p = el.parentNode; \
                 const same = p ? Array.from(p.children).filter((c) => c.tagName === el.tagName) : [el]; \
                 steps.unshift({ tag: el.tagName.toLowerCase(), id: el.id || undefined, \
                 index: same.indexOf(el) + 1, sameTag: same.length }); el = p; } return steps; }",
                Vec::new(),
            )
            .await?;
        serde_json::from_value(value).map_err(|err| {
            AdapterError::new(AdapterErrorKind::Internal).with_hint(format!("{node} path: {err}"))
        })
    }

    async fn parent(&self, node: NodeHandle) -> Result<Option<NodeHandle>, AdapterError> {
        self.call_node(
            node,
            "function () { const p = this.parentNode; if (!p) return null; \
             if (p.nodeType === 11 && p.host) return p.host; return p.nodeType === 1 ? p : null; }",
        )
        .await
    }

    async fn facts(&self, node: NodeHandle) -> Result<NodeFacts, AdapterError> {
        let value = self.call_value(node, FACTS_FN, Vec::new()).await?;
        serde_json::from_value(value).map_err(|err| {
            AdapterError::new(AdapterErrorKind::Internal).with_hint(format!("{node} facts: {err}"))
        })
    }

    async fn xpath(&self, root: NodeHandle, expr: &str) -> Result<Vec<NodeHandle>, AdapterError> {
        self.call_nodes(
            root,
            "function (expr) { const doc = this.ownerDocument || this; \
             const snap = doc.evaluate(expr, this, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null); \
             const out = []; for (let i = 0; i < snap.snapshotLength; i++) { \
             const n = snap.snapshotItem(i); if (n.nodeType === 1) out.push(n); } return out; }",
            vec![json!(expr)],
        )
        .await
    }

    async fn active_element(&self) -> Result<Option<NodeHandle>, AdapterError> {
        let remote = self.evaluate(ACTIVE_ELEMENT, false).await?;
        self.adopt(&remote).await
    }

    async fn drain_listener_registrations(&self) -> Result<Vec<NodeHandle>, AdapterError> {
        self.evaluate_nodes(
            "(() => { const q = window.__pagepilotListenerQueue || []; \
             window.__pagepilotListenerQueue = []; return q.filter((n) => n && n.isConnected); })()",
        )
        .await
    }

    async fn resource_count(&self) -> Result<u64, AdapterError> {
        let value = self
            .evaluate_value("performance.getEntriesByType('resource').length")
            .await?;
        Ok(value.as_u64().unwrap_or(0))
    }

    async fn dispatch(&self, node: NodeHandle, event: &SyntheticEvent) -> Result<bool, AdapterError> {
        let class = serde_json::to_value(event.class).unwrap_or(Value::Null);
        let init = serde_json::to_value(&event.init).unwrap_or_else(|_| json!({}));
        let value = self
            .call_value(node, DISPATCH_FN, vec![json!(event.name), class, init])
            .await?;
        Ok(value.as_bool().unwrap_or(true))
    }

    async fn focus(&self, node: NodeHandle) -> Result<(), AdapterError> {
        self.call_value(node, "function () { this.focus(); }", Vec::new())
            .await
            .map(|_| ())
    }

    async fn native_click(&self, node: NodeHandle) -> Result<(), AdapterError> {
        self.call_value(node, "function () { this.click(); }", Vec::new())
            .await
            .map(|_| ())
    }

    async fn set_value(&self, node: NodeHandle, value: &str) -> Result<bool, AdapterError> {
        let accepted = self
            .call_value(node, SET_VALUE_FN, vec![json!(value)])
            .await?;
        Ok(as_bool(&accepted))
    }

    async fn place_caret_at_end(&self, node: NodeHandle) -> Result<(), AdapterError> {
        self.call_value(node, CARET_FN, Vec::new()).await.map(|_| ())
    }

    async fn insert_text(
        &self,
        node: NodeHandle,
        text: &str,
        mode: InsertMode,
    ) -> Result<bool, AdapterError> {
        let function = match mode {
            InsertMode::Command => {
                "function (t) { try { return document.execCommand('insertText', false, t); } \
                 catch (_) { return false; } }"
            }
            InsertMode::Append => {
                "function (t) { if (this.tagName === 'INPUT' || this.tagName === 'TEXTAREA') return false; \
                 if (!this.isContentEditable) return false; \
                 this.appendChild(document.createTextNode(t)); return true; }"
            }
        };
        let accepted = self.call_value(node, function, vec![json!(text)]).await?;
        Ok(as_bool(&accepted))
    }

    async fn set_selected_index(&self, node: NodeHandle, index: usize) -> Result<(), AdapterError> {
        let applied = self
            .call_value(
                node,
                "function (i) { if (!this.options || i >= this.options.length) return false; \
                 this.selectedIndex = i; return true; }",
                vec![json!(index)],
            )
            .await?;
        if as_bool(&applied) {
            Ok(())
        } else {
            Err(AdapterError::new(AdapterErrorKind::Internal)
                .with_hint(format!("{node} has no option {index}")))
        }
    }

    async fn request_submit(&self, form: NodeHandle) -> Result<(), AdapterError> {
        self.call_value(
            form,
            "function () { if (typeof this.requestSubmit === 'function') this.requestSubmit(); \
             else this.submit(); }",
            Vec::new(),
        )
        .await
        .map(|_| ())
    }

    async fn schedule_navigation(&self, url: &str) -> Result<(), AdapterError> {
        let literal = serde_json::to_string(url).map_err(|err| {
            AdapterError::new(AdapterErrorKind::Internal).with_hint(err.to_string())
        })?;
        self.evaluate_value(&format!(
            "setTimeout(() => {{ window.location.href = {literal}; }}, 0); true"
        ))
        .await?;
        // objects die with the document
        self.objects.clear();
        Ok(())
    }

    async fn scroll(&self, request: ScrollRequest) -> Result<(), AdapterError> {
        match request {
            ScrollRequest::IntoView(node) => self
                .call_value(
                    node,
                    "function () { this.scrollIntoView({ block: 'center', inline: 'center', behavior: 'instant' }); }",
                    Vec::new(),
                )
                .await
                .map(|_| ()),
            ScrollRequest::By { dx, dy } => self
                .evaluate_value(&format!("window.scrollBy({dx}, {dy})"))
                .await
                .map(|_| ()),
            ScrollRequest::To { x, y } => self
                .evaluate_value(&format!("window.scrollTo({x}, {y})"))
                .await
                .map(|_| ()),
        }
    }

    async fn wait_for_selector(&self, css: &str, timeout: Duration) -> Result<bool, AdapterError> {
        let literal = serde_json::to_string(css).map_err(|err| {
            AdapterError::new(AdapterErrorKind::Internal).with_hint(err.to_string())
        })?;
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let chunk = remaining.min(WAIT_CHUNK);
            let found = self
                .evaluate_value(&format!(
                    "new Promise((resolve) => {{ const sel = {literal}; \
                     if (document.querySelector(sel)) return resolve(true); \
                     const obs = new MutationObserver(() => {{ if (document.querySelector(sel)) {{ obs.disconnect(); resolve(true); }} }}); \
                     obs.observe(document.documentElement || document, {{ childList: true, subtree: true, attributes: true }}); \
                     setTimeout(() => {{ obs.disconnect(); resolve(!!document.querySelector(sel)); }}, {}); }})",
                    chunk.as_millis()
                ))
                .await?;
            if as_bool(&found) {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
        }
    }

    async fn ping(&self) -> Result<(), AdapterError> {
        self.evaluate_value("1").await.map(|_| ())
    }

    async fn release_objects(&self) -> Result<(), AdapterError> {
        let released = self.objects.len();
        self.objects.clear();
        self.call("Runtime.releaseObjectGroup", json!({ "objectGroup": OBJECT_GROUP }))
            .await?;
        debug!(target: "cdp-dom", released, "released object group");
        Ok(())
    }

    async fn reconnect(&self) -> Result<(), AdapterError> {
        self.objects.clear();
        if let Err(err) = self
            .call("Runtime.releaseObjectGroup", json!({ "objectGroup": OBJECT_GROUP }))
            .await
        {
            warn!(target: "cdp-dom", %err, "session unusable, reattaching");
            self.reattach().await?;
        }
        self.install_hooks().await?;
        self.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Transport that answers from a script and records the methods it saw.
    struct ScriptedTransport {
        seen: Mutex<Vec<String>>,
        reply: Box<dyn Fn(&str, &Value) -> Result<Value, AdapterError> + Send + Sync>,
    }

    #[async_trait]
    impl CdpTransport for ScriptedTransport {
        async fn start(&self) -> Result<(), AdapterError> {
            Ok(())
        }

        async fn send_command(
            &self,
            _target: CommandTarget,
            method: &str,
            params: Value,
        ) -> Result<Value, AdapterError> {
            self.seen.lock().push(method.to_string());
            (self.reply)(method, &params)
        }
    }

    fn port(
        reply: impl Fn(&str, &Value) -> Result<Value, AdapterError> + Send + Sync + 'static,
    ) -> (CdpDomPort, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport {
            seen: Mutex::new(Vec::new()),
            reply: Box::new(reply),
        });
        (
            CdpDomPort::new(transport.clone(), "S1", Some("T1".into())),
            transport,
        )
    }

    #[tokio::test]
    async fn handles_are_backend_node_ids() {
        let (port, _) = port(|method, _| match method {
            "Runtime.evaluate" => Ok(json!({ "result": { "type": "object", "objectId": "obj-1" } })),
            "DOM.describeNode" => Ok(json!({ "node": { "backendNodeId": 41 } })),
            other => panic!("unexpected {other}"),
        });
        assert_eq!(port.document().await.unwrap(), NodeHandle(41));
        assert_eq!(port.document().await.unwrap(), NodeHandle(41));
    }

    #[tokio::test]
    async fn unknown_handles_are_stale() {
        let (port, transport) = port(|_, _| Ok(json!({})));
        let err = port.focus(NodeHandle(9)).await.unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::StaleNode);
        assert_eq!(*transport.seen.lock(), vec!["DOM.resolveNode".to_string()]);
    }

    #[tokio::test]
    async fn released_handles_are_resolved_again() {
        let (port, transport) = port(|method, params| match method {
            "Runtime.evaluate" => Ok(json!({ "result": { "type": "object", "objectId": "obj-1" } })),
            "DOM.describeNode" => Ok(json!({ "node": { "backendNodeId": 41 } })),
            "Runtime.releaseObjectGroup" => {
                assert_eq!(params["objectGroup"], OBJECT_GROUP);
                Ok(json!({}))
            }
            "DOM.resolveNode" => {
                assert_eq!(params["backendNodeId"], 41);
                Ok(json!({ "object": { "objectId": "obj-2" } }))
            }
            "Runtime.callFunctionOn" => {
                assert_eq!(params["objectId"], "obj-2");
                Ok(json!({ "result": { "type": "undefined" } }))
            }
            other => panic!("unexpected {other}"),
        });

        let doc = port.document().await.unwrap();
        assert_eq!(port.objects.len(), 1);
        port.release_objects().await.unwrap();
        assert!(port.objects.is_empty());
        port.focus(doc).await.unwrap();

        let seen = transport.seen.lock().clone();
        assert_eq!(
            seen,
            vec![
                "Runtime.evaluate",
                "DOM.describeNode",
                "Runtime.releaseObjectGroup",
                "DOM.resolveNode",
                "Runtime.callFunctionOn",
            ]
        );
    }

    #[tokio::test]
    async fn selector_syntax_errors_are_classified() {
        let (port, _) = port(|method, _| match method {
            "Runtime.evaluate" => Ok(json!({
                "result": { "type": "object" },
                "exceptionDetails": { "exception": {
                    "description": "SyntaxError: '##' is not a valid selector" } }
            })),
            other => panic!("unexpected {other}"),
        });
        let err = port.wait_for_selector("##", Duration::from_millis(10)).await.unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::InvalidSelector);
    }

    #[tokio::test]
    async fn reconnect_reattaches_dead_session() {
        let (port, transport) = port(|method, params| match method {
            "Runtime.releaseObjectGroup" => Err(AdapterError::new(AdapterErrorKind::CdpIo)),
            "Target.attachToTarget" => {
                assert_eq!(params["targetId"], "T1");
                Ok(json!({ "sessionId": "S2" }))
            }
            _ => Ok(json!({ "result": { "type": "number", "value": 1 } })),
        });
        port.reconnect().await.unwrap();
        assert_eq!(port.session_id(), "S2");
        assert!(transport
            .seen
            .lock()
            .iter()
            .any(|m| m == "Page.addScriptToEvaluateOnNewDocument"));
    }
}
