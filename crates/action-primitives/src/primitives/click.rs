//! Click primitive - pointer sequence, hover, check/uncheck

use cdp_adapter::dom::{NodeFacts, ScrollRequest, SyntheticEvent};
use cdp_adapter::{DomPort, NodeHandle};
use pagepilot_core_types::{ActionKind, ActionResult};
use tracing::{debug, info};

use crate::errors::ActionError;
use crate::primitives::{ensure_interactable, Executor};

/// Execute click primitive
///
/// Steps:
/// 1. Scroll the element into view
/// 2. Check it can take input (enabled, visible)
/// 3. Synthesize the pointer and mouse sequence at its center
/// 4. Fall back to a native click when the synthesized one was cancelled
pub async fn execute_click(
    _executor: &Executor,
    port: &dyn DomPort,
    node: NodeHandle,
) -> Result<ActionResult, ActionError> {
    info!(%node, "Executing click primitive");
    let facts = prepare(port, node).await?;
    let delivered = click_sequence(port, node, &facts).await?;
    if delivered {
        return Ok(ActionResult::ok(
            ActionKind::Click,
            format!("clicked <{}>", facts.tag),
        ));
    }
    debug!(%node, "synthesized click cancelled; using native click");
    port.native_click(node).await?;
    Ok(ActionResult::ok(
        ActionKind::Click,
        format!("clicked <{}> (native fallback)", facts.tag),
    ))
}

pub(crate) async fn prepare(port: &dyn DomPort, node: NodeHandle) -> Result<NodeFacts, ActionError> {
    port.scroll(ScrollRequest::IntoView(node)).await?;
    let facts = port.facts(node).await?;
    ensure_interactable(node, &facts)?;
    Ok(facts)
}

/// Full pointer sequence ending in `click`. Returns whether the click was left uncancelled.
pub(crate) async fn click_sequence(
    port: &dyn DomPort,
    node: NodeHandle,
    facts: &NodeFacts,
) -> Result<bool, ActionError> {
    let (x, y) = facts.rect.center();
    port.dispatch(node, &SyntheticEvent::pointer("pointerenter", x, y))
        .await?;
    port.dispatch(node, &SyntheticEvent::pointer("pointerdown", x, y))
        .await?;
    port.dispatch(node, &SyntheticEvent::mouse("mouseover", x, y))
        .await?;
    port.dispatch(node, &SyntheticEvent::mouse("mousedown", x, y))
        .await?;
    port.focus(node).await?;
    port.dispatch(node, &SyntheticEvent::pointer("pointerup", x, y))
        .await?;
    port.dispatch(node, &SyntheticEvent::mouse("mouseup", x, y))
        .await?;
    Ok(port
        .dispatch(node, &SyntheticEvent::mouse("click", x, y))
        .await?)
}

pub(crate) async fn hover_sequence(
    port: &dyn DomPort,
    node: NodeHandle,
    facts: &NodeFacts,
) -> Result<(), ActionError> {
    let (x, y) = facts.rect.center();
    port.dispatch(node, &SyntheticEvent::pointer("pointerover", x, y))
        .await?;
    port.dispatch(node, &SyntheticEvent::mouse("mouseover", x, y))
        .await?;
    port.dispatch(node, &SyntheticEvent::mouse("mousemove", x, y))
        .await?;
    port.dispatch(node, &SyntheticEvent::mouse("mouseenter", x, y))
        .await?;
    Ok(())
}

pub async fn execute_hover(
    _executor: &Executor,
    port: &dyn DomPort,
    node: NodeHandle,
) -> Result<ActionResult, ActionError> {
    info!(%node, "Executing hover primitive");
    port.scroll(ScrollRequest::IntoView(node)).await?;
    let facts = port.facts(node).await?;
    if facts.style.is_hidden() {
        return Err(ActionError::NotInteractable(format!("<{}> {node} is hidden", facts.tag)));
    }
    hover_sequence(port, node, &facts).await?;
    Ok(ActionResult::ok(
        ActionKind::Hover,
        format!("hovered <{}>", facts.tag),
    ))
}

fn checked_state(facts: &NodeFacts) -> bool {
    facts
        .control
        .checked
        .unwrap_or_else(|| facts.attr("aria-checked") == Some("true"))
}

/// Toggle a checkbox, radio or switch only when its state differs from `want`.
pub async fn execute_set_checked(
    _executor: &Executor,
    port: &dyn DomPort,
    node: NodeHandle,
    want: bool,
) -> Result<ActionResult, ActionError> {
    let kind = if want {
        ActionKind::Check
    } else {
        ActionKind::Uncheck
    };
    info!(%node, action = %kind, "Executing check primitive");
    let facts = prepare(port, node).await?;
    if !facts.is_checkable() {
        return Err(ActionError::NotInteractable(format!(
            "<{}> {node} is not a checkbox, radio or switch",
            facts.tag
        )));
    }
    let label = if want { "checked" } else { "unchecked" };
    if checked_state(&facts) == want {
        return Ok(ActionResult::ok(kind, format!("already {label}")));
    }
    port.native_click(node).await?;
    let after = port.facts(node).await?;
    if checked_state(&after) != want {
        return Err(ActionError::Intercepted(format!(
            "{node} did not become {label}"
        )));
    }
    Ok(ActionResult::ok(kind, label))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::tests::executor;
    use cdp_adapter::dom::{El, Reaction};
    use cdp_adapter::MemoryDom;

    #[tokio::test]
    async fn click_fires_the_full_sequence() {
        let dom = MemoryDom::new("https://app.test/", "App");
        let button = dom.append(dom.body(), El::new("button").text("Save"));
        let result = execute_click(&executor(), &dom, button).await.unwrap();
        assert!(result.success);
        assert_eq!(
            dom.event_names(button),
            vec![
                "pointerenter",
                "pointerdown",
                "mouseover",
                "mousedown",
                "focus",
                "pointerup",
                "mouseup",
                "click"
            ]
        );
    }

    #[tokio::test]
    async fn cancelled_click_falls_back_to_native() {
        let dom = MemoryDom::new("https://app.test/", "App");
        let button = dom.append(dom.body(), El::new("button").text("Save"));
        dom.on(button, "mousedown", Reaction::PreventDefault);
        dom.on(button, "click", Reaction::PreventDefault);
        let result = execute_click(&executor(), &dom, button).await.unwrap();
        assert!(result.message.unwrap().contains("native"));
        assert!(dom.events().iter().any(|e| e.name == "click" && e.native));
    }

    #[tokio::test]
    async fn disabled_button_is_not_interactable() {
        let dom = MemoryDom::new("https://app.test/", "App");
        let button = dom.append(dom.body(), El::new("button").attr("disabled", "").text("Pay"));
        let err = execute_click(&executor(), &dom, button).await.unwrap_err();
        assert!(matches!(err, ActionError::NotInteractable(_)));
        assert_eq!(dom.count_events(button, "click"), 0);
    }

    #[tokio::test]
    async fn check_toggles_only_when_needed() {
        let dom = MemoryDom::new("https://app.test/", "App");
        let terms = dom.append(dom.body(), El::new("input").attr("type", "checkbox").id("terms"));
        let exec = executor();

        let first = execute_set_checked(&exec, &dom, terms, true).await.unwrap();
        assert_eq!(first.message.as_deref(), Some("checked"));
        assert!(dom.is_checked(terms));

        let second = execute_set_checked(&exec, &dom, terms, true).await.unwrap();
        assert_eq!(second.message.as_deref(), Some("already checked"));
        assert!(dom.is_checked(terms));

        execute_set_checked(&exec, &dom, terms, false).await.unwrap();
        assert!(!dom.is_checked(terms));
    }

    #[tokio::test]
    async fn hover_events_in_order() {
        let dom = MemoryDom::new("https://app.test/", "App");
        let menu = dom.append(dom.body(), El::new("div").class("menu").text("Account"));
        execute_hover(&executor(), &dom, menu).await.unwrap();
        assert_eq!(
            dom.event_names(menu),
            vec!["pointerover", "mouseover", "mousemove", "mouseenter"]
        );
    }
}
