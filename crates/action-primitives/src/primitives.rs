//! Action executor
//!
//! One `execute_*` function per action family:
//! 1. click - synthesized pointer sequence, hover, check/uncheck
//! 2. type_text - insertion chain and key presses
//! 3. select - native selects, custom dropdowns, autocomplete lists
//! 4. scroll - element into view or window movement
//! 5. navigate - scheduled navigation and form submission
//! 6. wait - timed waits and page-state conditions

mod click;
mod navigate;
mod scroll;
mod select;
mod type_text;
mod wait;

pub use click::*;
pub use navigate::*;
pub use scroll::*;
pub use select::*;
pub use type_text::*;
pub use wait::*;

use std::sync::Arc;

use action_locator::{is_live, ElementRegistry, LocatorError, RefreshHook};
use async_trait::async_trait;
use cdp_adapter::dom::NodeFacts;
use cdp_adapter::{DomPort, NodeHandle};
use pagepilot_core_types::{ActionDescriptor, ActionResult};
use perceiver_structural::{Capture, PerceiverError, SnapshotExtractor};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::banners;
use crate::errors::ActionError;
use crate::insertion::{self, TextInsertion};
use crate::types::{Action, ExecutorConfig};

/// Runs validated actions against one page scope and reports typed results.
pub struct Executor {
    config: ExecutorConfig,
    extractor: Arc<dyn SnapshotExtractor>,
    registry: Arc<ElementRegistry>,
    insertion: Vec<Box<dyn TextInsertion>>,
}

impl Executor {
    pub fn new(
        config: ExecutorConfig,
        extractor: Arc<dyn SnapshotExtractor>,
        registry: Arc<ElementRegistry>,
    ) -> Self {
        Self {
            config,
            extractor,
            registry,
            insertion: insertion::default_chain(),
        }
    }

    /// Replace the `type` strategy chain.
    pub fn with_insertion(mut self, chain: Vec<Box<dyn TextInsertion>>) -> Self {
        self.insertion = chain;
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ElementRegistry> {
        &self.registry
    }

    pub(crate) fn insertion_chain(&self) -> &[Box<dyn TextInsertion>] {
        &self.insertion
    }

    /// Capture the page and register every element's locators.
    pub async fn capture(&self, port: &dyn DomPort) -> Result<Capture, PerceiverError> {
        let capture = self.extractor.capture(port).await?;
        self.registry.register_all(capture.locators.clone());
        Ok(capture)
    }

    /// Resolve, act, observe.
    ///
    /// Interaction failures come back as a failed [`ActionResult`]; `Err` means
    /// the page itself is unreachable.
    pub async fn perform(
        &self,
        port: &dyn DomPort,
        descriptor: &ActionDescriptor,
    ) -> Result<ActionResult, ActionError> {
        let started = Instant::now();
        info!(
            action = %descriptor.kind,
            uid = ?descriptor.target_uid,
            "performing action"
        );

        let before = current_url(port).await;
        let result = match self.attempt(port, descriptor).await {
            Ok(result) => result,
            Err(err) if err.is_unreachable() => {
                warn!(action = %descriptor.kind, %err, "page unreachable");
                return Err(err);
            }
            Err(err) => {
                info!(action = %descriptor.kind, kind = err.failure_kind().as_str(), %err, "action failed");
                ActionResult::failed(descriptor.kind.clone(), err.to_failure())
                    .with_target(descriptor.target_uid.clone())
            }
        };

        let result = match before {
            Some(before) if !result.navigated => detect_navigation(port, &before, result).await,
            _ => result,
        };

        // Navigation-pending results skip observation; the page is about to go away.
        let result = if result.navigated {
            result
        } else {
            self.observe(port, result).await
        };
        let duration_ms = started.elapsed().as_millis() as u64;
        debug!(action = %descriptor.kind, success = result.success, duration_ms, "action finished");
        Ok(result.with_duration(duration_ms))
    }

    async fn attempt(
        &self,
        port: &dyn DomPort,
        descriptor: &ActionDescriptor,
    ) -> Result<ActionResult, ActionError> {
        let action = Action::from_descriptor(descriptor, &self.config)?;
        let target = self.locate(port, descriptor, &action).await?;
        let result = self.execute(port, &action, target).await?;
        Ok(result.with_target(descriptor.target_uid.clone()))
    }

    /// Find the element a descriptor points at, by uid first, then by raw selector.
    async fn locate(
        &self,
        port: &dyn DomPort,
        descriptor: &ActionDescriptor,
        action: &Action,
    ) -> Result<Option<NodeHandle>, ActionError> {
        let may_fall_back = matches!(action, Action::Type { .. } | Action::Press { .. });

        if let Some(uid) = descriptor.target_uid.as_deref().filter(|u| !u.is_empty()) {
            let hook = CaptureRefresh {
                executor: self,
                port,
            };
            let outcome = self.registry.resolve_with_retry(port, uid, &hook).await?;
            if let Some(node) = outcome.node() {
                return Ok(Some(node));
            }
            if may_fall_back {
                debug!(uid, "target not resolved; using focused element");
                return Ok(None);
            }
            let tried: Vec<&str> = outcome.tried.iter().map(|s| s.name()).collect();
            return Err(ActionError::NotFound(format!(
                "no element for uid '{uid}' after {} attempts (tried: {})",
                outcome.attempts,
                if tried.is_empty() { "none".to_string() } else { tried.join(", ") }
            )));
        }

        if let Some(selector) = descriptor
            .target_selector
            .as_deref()
            .filter(|s| !s.trim().is_empty())
        {
            // wait_for_selector consumes the selector itself.
            if matches!(action, Action::WaitForSelector { .. }) {
                return Ok(None);
            }
            if let Some(node) = self.query_live(port, selector).await? {
                return Ok(Some(node));
            }
            if may_fall_back {
                return Ok(None);
            }
            return Err(ActionError::NotFound(format!(
                "no visible element matches '{selector}'"
            )));
        }

        if action.requires_target() || matches!(action, Action::Scroll(None)) {
            return Err(ActionError::NotFound(format!(
                "{} needs a target element",
                action.kind()
            )));
        }
        Ok(None)
    }

    /// First connected, visible match across every reachable root.
    pub(crate) async fn query_live(
        &self,
        port: &dyn DomPort,
        selector: &str,
    ) -> Result<Option<NodeHandle>, ActionError> {
        for root in self.registry.resolver().roots(port).await? {
            for node in port.query_all(root, selector).await? {
                if is_live(port, node).await {
                    return Ok(Some(node));
                }
            }
        }
        Ok(None)
    }

    /// Run `action` against an already resolved element (or none).
    pub async fn execute(
        &self,
        port: &dyn DomPort,
        action: &Action,
        target: Option<NodeHandle>,
    ) -> Result<ActionResult, ActionError> {
        if let Some(node) = target {
            let facts = port.facts(node).await?;
            if !facts.connected {
                return Err(ActionError::Stale(format!("{node} left the document")));
            }
        }
        let require = || {
            target.ok_or_else(|| {
                ActionError::NotFound(format!("{} needs a target element", action.kind()))
            })
        };

        match action {
            Action::Click => execute_click(self, port, require()?).await,
            Action::Hover => execute_hover(self, port, require()?).await,
            Action::Check => execute_set_checked(self, port, require()?, true).await,
            Action::Uncheck => execute_set_checked(self, port, require()?, false).await,
            Action::Type { text } => execute_type(self, port, target, text).await,
            Action::Press { key } => execute_press(self, port, target, key).await,
            Action::Select { choice } => execute_select(self, port, require()?, choice).await,
            Action::SelectAutocomplete { choice } => {
                execute_select_autocomplete(self, port, target, choice).await
            }
            Action::Scroll(window) => execute_scroll(self, port, target, *window).await,
            Action::Submit => execute_submit(self, port, target).await,
            Action::Navigate { url } => execute_navigate(self, port, url).await,
            Action::Wait(duration) => execute_wait(self, *duration).await,
            Action::WaitForSelector { selector, timeout } => {
                execute_wait_for_selector(self, port, selector, *timeout).await
            }
            Action::WaitForUrlChange { mode, timeout } => {
                execute_wait_for_url_change(self, port, mode, *timeout).await
            }
            Action::WaitNetworkIdle { idle, timeout } => {
                execute_wait_network_idle(self, port, *idle, *timeout).await
            }
        }
    }

    /// Banner scan plus a fresh capture. Failures here never fail the action.
    async fn observe(&self, port: &dyn DomPort, result: ActionResult) -> ActionResult {
        let roots = match self.registry.resolver().roots(port).await {
            Ok(roots) => roots,
            Err(err) => {
                warn!(%err, "cannot enumerate roots for banner scan");
                Vec::new()
            }
        };
        let found = banners::scan(port, &roots).await;
        if !found.errors.is_empty() {
            debug!(errors = ?found.errors, "error banners visible");
        }
        let mut result = result.with_banners(found.errors, found.successes);

        if self.config.capture_after_action {
            match self.capture(port).await {
                Ok(capture) => result = result.with_snapshot(capture.snapshot),
                Err(err) => warn!(%err, "post-action capture failed"),
            }
        }
        result
    }
}

/// Re-captures the page so the registry holds current locators before a retry.
struct CaptureRefresh<'a> {
    executor: &'a Executor,
    port: &'a dyn DomPort,
}

#[async_trait]
impl RefreshHook for CaptureRefresh<'_> {
    async fn refresh(&self) -> Result<(), LocatorError> {
        match self.executor.capture(self.port).await {
            Ok(_) => Ok(()),
            Err(PerceiverError::Adapter(err)) => Err(LocatorError::Adapter(err)),
            Err(other) => Err(LocatorError::Refresh(other.to_string())),
        }
    }
}

/// Disabled or invisible elements cannot take pointer or keyboard input.
pub(crate) fn ensure_interactable(node: NodeHandle, facts: &NodeFacts) -> Result<(), ActionError> {
    if facts.control.disabled || facts.attr("aria-disabled") == Some("true") {
        return Err(ActionError::NotInteractable(format!(
            "<{}> {node} is disabled",
            facts.tag
        )));
    }
    if facts.style.is_hidden() {
        return Err(ActionError::NotInteractable(format!(
            "<{}> {node} is hidden",
            facts.tag
        )));
    }
    Ok(())
}

/// Closest ancestor (or self) matching `css`, crossing shadow boundaries.
pub(crate) async fn closest(
    port: &dyn DomPort,
    node: NodeHandle,
    css: &str,
) -> Result<Option<NodeHandle>, ActionError> {
    let mut cursor = Some(node);
    while let Some(current) = cursor {
        if port.matches(current, css).await? {
            return Ok(Some(current));
        }
        cursor = port.parent(current).await?;
    }
    Ok(None)
}

async fn current_url(port: &dyn DomPort) -> Option<String> {
    port.page_info().await.ok().map(|info| info.url)
}

/// Flag results whose action moved the page, e.g. a link click or an Enter
/// that submitted a form. Fragment-only changes stay on the same document.
async fn detect_navigation(port: &dyn DomPort, before: &str, result: ActionResult) -> ActionResult {
    let Some(after) = current_url(port).await else {
        return result;
    };
    if strip_fragment(&after) == strip_fragment(before) {
        return result;
    }
    info!(action = %result.action, from = before, to = %after, "action navigated the page");
    result.navigation_pending(after)
}

fn strip_fragment(url: &str) -> &str {
    url.split_once('#').map_or(url, |(base, _)| base)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use action_locator::{LocatorConfig, RetrySchedule};
    use cdp_adapter::dom::El;
    use cdp_adapter::MemoryDom;
    use pagepilot_core_types::{ActionKind, FailureKind};
    use perceiver_structural::StructuralExtractor;

    pub(crate) fn executor() -> Executor {
        let registry = ElementRegistry::new(
            LocatorConfig::default().with_retry(RetrySchedule::default().with_max_attempts(2)),
        );
        Executor::new(
            ExecutorConfig::default(),
            Arc::new(StructuralExtractor::default()),
            Arc::new(registry),
        )
    }

    fn login_page() -> MemoryDom {
        let dom = MemoryDom::new("https://app.test/login", "Login");
        dom.append(
            dom.body(),
            El::new("form").id("login").children([
                El::new("input").id("email").attr("type", "email"),
                El::new("button").id("go").attr("type", "submit").text("Sign in"),
            ]),
        );
        dom
    }

    #[tokio::test]
    async fn uid_from_capture_resolves_and_acts() {
        let dom = login_page();
        let exec = executor();
        let capture = exec.capture(&dom).await.unwrap();
        assert!(capture.snapshot.element("email").is_some());

        let result = exec
            .perform(
                &dom,
                &ActionDescriptor::new(ActionKind::Type)
                    .with_target("email")
                    .with_value("ada@example.com"),
            )
            .await
            .unwrap();
        assert!(result.success, "{}", result.summary());
        assert_eq!(result.target_uid.as_deref(), Some("email"));
        assert!(result.snapshot.is_some());
        let email = dom.query_all(dom.document_handle(), "#email").await.unwrap()[0];
        assert_eq!(dom.value_of(email).as_deref(), Some("ada@example.com"));
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_uid_is_a_typed_not_found() {
        let dom = login_page();
        let exec = executor();
        let result = exec
            .perform(&dom, &ActionDescriptor::new(ActionKind::Click).with_target("ghost"))
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.failure_kind(), Some(FailureKind::NotFound));
        assert!(result.snapshot.is_some());
    }

    #[tokio::test]
    async fn navigation_skips_observation() {
        let dom = login_page();
        let result = executor()
            .perform(
                &dom,
                &ActionDescriptor::new(ActionKind::parse("go_to_url")).with_value("example.org"),
            )
            .await
            .unwrap();
        assert!(result.success && result.navigated);
        assert!(result.snapshot.is_none());
        assert_eq!(result.url.as_deref(), Some("https://example.org/"));
    }

    #[tokio::test]
    async fn unsupported_action_is_reported() {
        let dom = login_page();
        let result = executor()
            .perform(&dom, &ActionDescriptor::new(ActionKind::parse("drag")))
            .await
            .unwrap();
        assert_eq!(result.failure_kind(), Some(FailureKind::UnsupportedAction));
    }

    #[tokio::test]
    async fn detached_target_is_stale() {
        let dom = login_page();
        let exec = executor();
        let go = dom.query_all(dom.document_handle(), "#go").await.unwrap()[0];
        dom.remove(go);
        let err = exec.execute(&dom, &Action::Click, Some(go)).await.unwrap_err();
        assert!(matches!(err, ActionError::Stale(_)));
    }

    #[tokio::test]
    async fn banners_are_attached() {
        let dom = login_page();
        let go = dom.query_all(dom.document_handle(), "#go").await.unwrap()[0];
        let alert = dom.append(
            dom.body(),
            El::new("div").attr("role", "alert").text("Wrong password").hidden(),
        );
        dom.on(go, "click", cdp_adapter::dom::Reaction::Show(alert));
        let result = executor()
            .perform(
                &dom,
                &ActionDescriptor::new(ActionKind::Click).with_selector("#go"),
            )
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.errors, vec!["Wrong password".to_string()]);
    }

    #[tokio::test]
    async fn unreachable_page_is_an_error() {
        let dom = login_page();
        dom.break_connection(false);
        let err = executor()
            .perform(&dom, &ActionDescriptor::new(ActionKind::Click).with_selector("#go"))
            .await
            .unwrap_err();
        assert!(err.is_unreachable());
    }
}
