//! Type and press primitives

use cdp_adapter::dom::SyntheticEvent;
use cdp_adapter::{DomPort, NodeHandle};
use pagepilot_core_types::{ActionKind, ActionResult};
use tracing::{debug, info};

use crate::errors::ActionError;
use crate::keys;
use crate::primitives::{closest, ensure_interactable, Executor};

/// Execute type primitive
///
/// Steps:
/// 1. Use the target, or the focused editable element when there is none
/// 2. Reject disabled and read-only fields
/// 3. Walk the insertion chain until one strategy lands the text
pub async fn execute_type(
    executor: &Executor,
    port: &dyn DomPort,
    target: Option<NodeHandle>,
    text: &str,
) -> Result<ActionResult, ActionError> {
    let node = match target {
        Some(node) => node,
        None => focused_editable(port).await?.ok_or_else(|| {
            ActionError::NotFound("no target and no focused editable element".into())
        })?,
    };
    info!(%node, chars = text.chars().count(), "Executing type primitive");

    let facts = port.facts(node).await?;
    ensure_interactable(node, &facts)?;
    if facts.control.read_only {
        return Err(ActionError::NotInteractable(format!(
            "<{}> {node} is read-only",
            facts.tag
        )));
    }

    for strategy in executor.insertion_chain() {
        if strategy.insert(port, node, &facts, text).await? {
            debug!(%node, strategy = strategy.name(), "text inserted");
            return Ok(ActionResult::ok(
                ActionKind::Type,
                format!("typed {} chars via {}", text.chars().count(), strategy.name()),
            ));
        }
    }
    Err(ActionError::NotInteractable(format!(
        "<{}> {node} accepted no text input",
        facts.tag
    )))
}

async fn focused_editable(port: &dyn DomPort) -> Result<Option<NodeHandle>, ActionError> {
    let Some(active) = port.active_element().await? else {
        return Ok(None);
    };
    let facts = port.facts(active).await?;
    Ok((facts.connected && (facts.is_text_field() || facts.is_editable_surface()))
        .then_some(active))
}

/// Execute press primitive
///
/// keydown, keypress for printable keys and Enter, keyup. Enter inside a form
/// also announces a cancelable submit.
pub async fn execute_press(
    _executor: &Executor,
    port: &dyn DomPort,
    target: Option<NodeHandle>,
    key_name: &str,
) -> Result<ActionResult, ActionError> {
    let key = keys::describe(key_name)
        .ok_or_else(|| ActionError::InvalidAction(format!("unknown key '{key_name}'")))?;
    let node = match target {
        Some(node) => node,
        None => match port.active_element().await? {
            Some(active) => active,
            None => body(port).await?,
        },
    };
    info!(%node, key = %key.key, "Executing press primitive");

    let down = SyntheticEvent::key("keydown", &key.key, &key.code, key.key_code);
    let proceed = port.dispatch(node, &down).await?;
    if proceed && (key.is_printable() || key.is_enter()) {
        let press = SyntheticEvent::key("keypress", &key.key, &key.code, key.key_code);
        port.dispatch(node, &press).await?;
    }
    let up = SyntheticEvent::key("keyup", &key.key, &key.code, key.key_code);
    port.dispatch(node, &up).await?;

    if proceed && key.is_enter() {
        if let Some(form) = closest(port, node, "form").await? {
            debug!(%form, "enter inside form");
            port.dispatch(form, &SyntheticEvent::basic("submit", true))
                .await?;
        }
    }
    Ok(ActionResult::ok(
        ActionKind::Press,
        format!("pressed {}", key_name.trim()),
    ))
}

async fn body(port: &dyn DomPort) -> Result<NodeHandle, ActionError> {
    let document = port.document().await?;
    port.query_all(document, "body")
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ActionError::NotFound("document has no body".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::tests::executor;
    use cdp_adapter::dom::El;
    use cdp_adapter::MemoryDom;

    #[tokio::test]
    async fn typing_without_target_uses_focused_field() {
        let dom = MemoryDom::new("https://app.test/", "App");
        let search = dom.append(dom.body(), El::new("input").attr("type", "search"));
        dom.focus(search).await.unwrap();
        let result = execute_type(&executor(), &dom, None, "rust").await.unwrap();
        assert!(result.success);
        assert_eq!(dom.value_of(search).as_deref(), Some("rust"));
    }

    #[tokio::test]
    async fn typing_with_nothing_focused_is_not_found() {
        let dom = MemoryDom::new("https://app.test/", "App");
        let err = execute_type(&executor(), &dom, None, "rust").await.unwrap_err();
        assert!(matches!(err, ActionError::NotFound(_)));
    }

    #[tokio::test]
    async fn read_only_field_is_refused() {
        let dom = MemoryDom::new("https://app.test/", "App");
        let field = dom.append(dom.body(), El::new("input").attr("readonly", "").value("fixed"));
        let err = execute_type(&executor(), &dom, Some(field), "x").await.unwrap_err();
        assert!(matches!(err, ActionError::NotInteractable(_)));
        assert_eq!(dom.value_of(field).as_deref(), Some("fixed"));
    }

    #[tokio::test]
    async fn enter_in_form_announces_submit() {
        let dom = MemoryDom::new("https://app.test/", "App");
        let form = dom.append(dom.body(), El::new("form").child(El::new("input").id("q")));
        let input = dom.query_all(form, "#q").await.unwrap()[0];
        execute_press(&executor(), &dom, Some(input), "Enter")
            .await
            .unwrap();
        assert_eq!(
            dom.event_names(input),
            vec!["keydown", "keypress", "keyup"]
        );
        assert_eq!(dom.count_events(form, "submit"), 1);
    }

    #[tokio::test]
    async fn keys_go_to_body_without_focus() {
        let dom = MemoryDom::new("https://app.test/", "App");
        execute_press(&executor(), &dom, None, "Escape").await.unwrap();
        assert_eq!(dom.event_names(dom.body()), vec!["keydown", "keyup"]);
    }

    #[tokio::test]
    async fn unknown_key_is_invalid() {
        let dom = MemoryDom::new("https://app.test/", "App");
        let err = execute_press(&executor(), &dom, None, "Hyper").await.unwrap_err();
        assert!(matches!(err, ActionError::InvalidAction(_)));
    }
}
