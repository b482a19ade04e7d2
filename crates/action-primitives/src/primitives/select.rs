//! Select primitive - native selects, custom dropdowns, autocomplete lists

use std::time::Duration;

use action_locator::is_live;
use cdp_adapter::dom::selector::{attr_selector, id_selector};
use cdp_adapter::dom::{NodeFacts, SyntheticEvent};
use cdp_adapter::{DomPort, NodeHandle};
use pagepilot_core_types::{ActionKind, ActionResult};
use tracing::{debug, info};

use crate::choose::{best_match, Choice, MatchTier};
use crate::errors::ActionError;
use crate::primitives::click::{click_sequence, hover_sequence, prepare};
use crate::primitives::Executor;

const POPUP_OPTION_SELECTOR: &str =
    "[role=\"option\"], [role=\"menuitem\"], li, [data-value]";

const SUGGESTION_SELECTOR: &str = "[role=\"listbox\"] [role=\"option\"], \
     .autocomplete-suggestion, .autocomplete-item, .ui-menu-item, .pac-item, \
     .suggestion, .suggestions li, .typeahead li, [role=\"listbox\"] li";

/// Execute select primitive
///
/// Native `<select>` elements pick the best matching option directly. Anything
/// else is treated as a custom dropdown trigger:
/// 1. Open it (click plus hover)
/// 2. Wait for the popup to render
/// 3. Search the popup it controls, or every root when it names none
/// 4. Click the best matching entry
pub async fn execute_select(
    executor: &Executor,
    port: &dyn DomPort,
    node: NodeHandle,
    choice: &str,
) -> Result<ActionResult, ActionError> {
    info!(%node, choice, "Executing select primitive");
    let facts = port.facts(node).await?;
    if facts.tag == "select" {
        return select_native(port, node, &facts, choice).await;
    }

    let facts = prepare(port, node).await?;
    if !click_sequence(port, node, &facts).await? {
        port.native_click(node).await?;
    }
    hover_sequence(port, node, &facts).await?;
    tokio::time::sleep(Duration::from_millis(executor.config().dropdown_settle_ms)).await;

    let scopes = popup_scopes(executor, port, &facts).await?;
    let Some((entry, entry_facts, tier)) =
        pick_visible(port, &scopes, POPUP_OPTION_SELECTOR, choice).await?
    else {
        return Err(ActionError::OptionNotFound(format!(
            "no dropdown entry matching '{choice}'"
        )));
    };
    debug!(%entry, ?tier, "dropdown entry chosen");
    if !click_sequence(port, entry, &entry_facts).await? {
        port.native_click(entry).await?;
    }
    Ok(ActionResult::ok(
        ActionKind::Select,
        format!("selected '{}'", entry_facts.text.trim()),
    ))
}

async fn select_native(
    port: &dyn DomPort,
    node: NodeHandle,
    facts: &NodeFacts,
    choice: &str,
) -> Result<ActionResult, ActionError> {
    if facts.control.disabled {
        return Err(ActionError::NotInteractable(format!("{node} is disabled")));
    }
    let enabled: Vec<(usize, Choice)> = facts
        .control
        .options
        .iter()
        .enumerate()
        .filter(|(_, o)| !o.disabled)
        .map(|(i, o)| {
            (
                i,
                Choice {
                    value: o.value.clone(),
                    text: o.text.clone(),
                },
            )
        })
        .collect();
    let choices: Vec<Choice> = enabled.iter().map(|(_, c)| c.clone()).collect();
    let Some((pos, tier)) = best_match(&choices, choice) else {
        return Err(ActionError::OptionNotFound(format!(
            "no option matching '{choice}' among {} options",
            choices.len()
        )));
    };
    let (index, picked) = &enabled[pos];
    debug!(%node, index, ?tier, "native option chosen");
    port.focus(node).await?;
    port.set_selected_index(node, *index).await?;
    port.dispatch(node, &SyntheticEvent::input("input", None, "insertReplacementText"))
        .await?;
    port.dispatch(node, &SyntheticEvent::basic("change", false))
        .await?;
    Ok(ActionResult::ok(
        ActionKind::Select,
        format!("selected '{}'", picked.text.trim()),
    ))
}

/// The popup a trigger names through `aria-controls` / `aria-owns`, else every root.
async fn popup_scopes(
    executor: &Executor,
    port: &dyn DomPort,
    trigger: &NodeFacts,
) -> Result<Vec<NodeHandle>, ActionError> {
    let roots = executor.registry().resolver().roots(port).await?;
    let ids: Vec<&str> = ["aria-controls", "aria-owns"]
        .iter()
        .filter_map(|name| trigger.attr(name))
        .flat_map(str::split_whitespace)
        .collect();
    let mut scopes = Vec::new();
    for id in ids {
        let selector = id_selector(id);
        for root in &roots {
            scopes.extend(port.query_all(*root, &selector).await?);
        }
    }
    if scopes.is_empty() {
        Ok(roots)
    } else {
        Ok(scopes)
    }
}

/// Best visible entry under `scopes`. `data-value` counts as the entry's value.
async fn pick_visible(
    port: &dyn DomPort,
    scopes: &[NodeHandle],
    selector: &str,
    wanted: &str,
) -> Result<Option<(NodeHandle, NodeFacts, MatchTier)>, ActionError> {
    let mut entries: Vec<(NodeHandle, NodeFacts)> = Vec::new();
    for scope in scopes {
        for node in port.query_all(*scope, selector).await? {
            if entries.iter().any(|(seen, _)| *seen == node) || !is_live(port, node).await {
                continue;
            }
            let facts = port.facts(node).await?;
            if facts.text.trim().is_empty() && !facts.has_attr("data-value") {
                continue;
            }
            entries.push((node, facts));
        }
    }
    let choices: Vec<Choice> = entries
        .iter()
        .map(|(_, facts)| Choice {
            value: facts
                .attr("data-value")
                .or_else(|| facts.attr("value"))
                .unwrap_or_default()
                .to_string(),
            text: facts.text.clone(),
        })
        .collect();
    Ok(best_match(&choices, wanted).map(|(i, tier)| {
        let (node, facts) = entries.swap_remove(i);
        (node, facts, tier)
    }))
}

/// Execute select_autocomplete primitive
///
/// Inputs bound to a `<datalist>` take the matching option's value directly;
/// otherwise the visible suggestion lists are searched and the match clicked.
pub async fn execute_select_autocomplete(
    executor: &Executor,
    port: &dyn DomPort,
    target: Option<NodeHandle>,
    choice: &str,
) -> Result<ActionResult, ActionError> {
    info!(target = ?target, choice, "Executing select_autocomplete primitive");
    if let Some(node) = target {
        if let Some(result) = choose_from_datalist(port, node, choice).await? {
            return Ok(result);
        }
    }

    let roots = executor.registry().resolver().roots(port).await?;
    let Some((entry, facts, tier)) = pick_visible(port, &roots, SUGGESTION_SELECTOR, choice).await?
    else {
        return Err(ActionError::OptionNotFound(format!(
            "no suggestion matching '{choice}'"
        )));
    };
    debug!(%entry, ?tier, "suggestion chosen");
    if !click_sequence(port, entry, &facts).await? {
        port.native_click(entry).await?;
    }
    Ok(ActionResult::ok(
        ActionKind::SelectAutocomplete,
        format!("selected suggestion '{}'", facts.text.trim()),
    ))
}

async fn choose_from_datalist(
    port: &dyn DomPort,
    input: NodeHandle,
    choice: &str,
) -> Result<Option<ActionResult>, ActionError> {
    let facts = port.facts(input).await?;
    let Some(list_id) = facts.attr("list").filter(|l| !l.is_empty()) else {
        return Ok(None);
    };
    let root = port.root_of(input).await?;
    let Some(list) = port
        .query_all(root, &attr_selector("datalist", "id", list_id))
        .await?
        .into_iter()
        .next()
    else {
        return Ok(None);
    };
    let options = port.facts(list).await?.control.options;
    let choices: Vec<Choice> = options
        .iter()
        .map(|o| Choice {
            value: o.value.clone(),
            text: o.text.clone(),
        })
        .collect();
    let Some((pos, _)) = best_match(&choices, choice) else {
        return Ok(None);
    };
    let value = choices[pos].value.clone();
    port.focus(input).await?;
    if !port.set_value(input, &value).await? {
        return Ok(None);
    }
    port.dispatch(input, &SyntheticEvent::input("input", Some(&value), "insertReplacementText"))
        .await?;
    port.dispatch(input, &SyntheticEvent::basic("change", false))
        .await?;
    Ok(Some(ActionResult::ok(
        ActionKind::SelectAutocomplete,
        format!("selected '{value}'"),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::tests::executor;
    use cdp_adapter::dom::{El, Reaction};
    use cdp_adapter::MemoryDom;

    fn option(value: &str, text: &str) -> El {
        El::new("option").attr("value", value).text(text)
    }

    #[tokio::test]
    async fn native_select_prefers_exact_text() {
        let dom = MemoryDom::new("https://app.test/", "App");
        let select = dom.append(
            dom.body(),
            El::new("select").children([option("ny", "New York"), option("ny2", "NY")]),
        );
        let result = execute_select(&executor(), &dom, select, "NY").await.unwrap();
        assert!(result.success);
        assert_eq!(dom.selected_index(select), Some(1));
        assert_eq!(dom.count_events(select, "change"), 1);
    }

    #[tokio::test]
    async fn missing_option_is_reported() {
        let dom = MemoryDom::new("https://app.test/", "App");
        let select = dom.append(dom.body(), El::new("select").child(option("de", "Germany")));
        let err = execute_select(&executor(), &dom, select, "Mars").await.unwrap_err();
        assert!(matches!(err, ActionError::OptionNotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn custom_dropdown_opens_and_clicks_entry() {
        let dom = MemoryDom::new("https://app.test/", "App");
        let trigger = dom.append(
            dom.body(),
            El::new("div")
                .attr("role", "combobox")
                .attr("aria-controls", "sizes")
                .text("Pick a size"),
        );
        let popup = dom.append(
            dom.body(),
            El::new("ul").id("sizes").attr("role", "listbox").hidden().children([
                El::new("li").attr("role", "option").attr("data-value", "s").text("Small"),
                El::new("li").attr("role", "option").attr("data-value", "m").text("Medium"),
            ]),
        );
        // A decoy list outside the controlled popup.
        dom.append(dom.body(), El::new("ul").child(El::new("li").text("Medium rare")));
        dom.on(trigger, "click", Reaction::Show(popup));

        let result = execute_select(&executor(), &dom, trigger, "medium").await.unwrap();
        assert_eq!(result.message.as_deref(), Some("selected 'Medium'"));
        let medium = dom.query_all(popup, "[data-value=\"m\"]").await.unwrap()[0];
        assert_eq!(dom.count_events(medium, "click"), 1);
    }

    #[tokio::test]
    async fn datalist_input_takes_option_value() {
        let dom = MemoryDom::new("https://app.test/", "App");
        let input = dom.append(dom.body(), El::new("input").attr("list", "cities"));
        dom.append(
            dom.body(),
            El::new("datalist")
                .id("cities")
                .children([option("BER", "Berlin"), option("BRN", "Bern")]),
        );
        execute_select_autocomplete(&executor(), &dom, Some(input), "bern")
            .await
            .unwrap();
        assert_eq!(dom.value_of(input).as_deref(), Some("BRN"));
    }

    #[tokio::test]
    async fn suggestion_list_is_searched_without_target() {
        let dom = MemoryDom::new("https://app.test/", "App");
        let list = dom.append(
            dom.body(),
            El::new("div").children([
                El::new("div").class("pac-item").text("Paris, France"),
                El::new("div").class("pac-item").text("Paris, Texas"),
            ]),
        );
        let result = execute_select_autocomplete(&executor(), &dom, None, "Texas")
            .await
            .unwrap();
        assert!(result.success);
        let texas = dom.query_all(list, ".pac-item").await.unwrap()[1];
        assert_eq!(dom.count_events(texas, "click"), 1);
    }
}
