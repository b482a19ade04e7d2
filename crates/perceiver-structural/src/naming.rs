//! Accessible name and associated label text.

use cdp_adapter::dom::selector::{attr_selector, id_selector};
use cdp_adapter::dom::NodeFacts;
use cdp_adapter::{AdapterError, DomPort, NodeHandle};
use pagepilot_core_types::limits;
use pagepilot_core_types::text::clip;

use crate::cache::FactsCache;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Naming {
    pub accessible_name: Option<String>,
    pub labels: Vec<String>,
}

/// Name in priority order: `aria-label`, `aria-labelledby`, `label[for]`, enclosing `<label>`.
pub async fn resolve(
    port: &dyn DomPort,
    cache: &FactsCache,
    scope_root: NodeHandle,
    node: NodeHandle,
    facts: &NodeFacts,
) -> Result<Naming, AdapterError> {
    let aria_label = facts
        .attr("aria-label")
        .map(|v| clip(v, limits::TEXT_CHARS))
        .filter(|v| !v.is_empty());

    let mut labelled_by = Vec::new();
    if let Some(ids) = facts.attr("aria-labelledby") {
        for id in ids.split_whitespace() {
            if let Some(text) = first_text(port, cache, scope_root, &id_selector(id)).await? {
                labelled_by.push(text);
            }
        }
    }

    let mut for_labels = Vec::new();
    if let Some(id) = facts.attr("id").filter(|id| !id.is_empty()) {
        for label in port
            .query_all(scope_root, &attr_selector("label", "for", id))
            .await?
        {
            let text = clip(&cache.facts(port, label).await?.text, limits::TEXT_CHARS);
            if !text.is_empty() {
                for_labels.push(text);
            }
        }
    }

    let enclosing = enclosing_label(port, cache, node).await?;

    let labelled_by_joined =
        (!labelled_by.is_empty()).then(|| clip(&labelled_by.join(" "), limits::TEXT_CHARS));
    let accessible_name = aria_label
        .or(labelled_by_joined)
        .or_else(|| for_labels.first().cloned())
        .or_else(|| enclosing.clone());

    let mut labels: Vec<String> = Vec::new();
    for text in labelled_by.into_iter().chain(for_labels).chain(enclosing) {
        if labels.len() >= limits::LABELS {
            break;
        }
        if !labels.contains(&text) {
            labels.push(text);
        }
    }

    Ok(Naming {
        accessible_name,
        labels,
    })
}

async fn first_text(
    port: &dyn DomPort,
    cache: &FactsCache,
    root: NodeHandle,
    selector: &str,
) -> Result<Option<String>, AdapterError> {
    let Some(found) = port.query_all(root, selector).await?.into_iter().next() else {
        return Ok(None);
    };
    let text = clip(&cache.facts(port, found).await?.text, limits::TEXT_CHARS);
    Ok((!text.is_empty()).then_some(text))
}

async fn enclosing_label(
    port: &dyn DomPort,
    cache: &FactsCache,
    node: NodeHandle,
) -> Result<Option<String>, AdapterError> {
    let mut cursor = cache.parent(port, node).await?;
    while let Some(ancestor) = cursor {
        let facts = cache.facts(port, ancestor).await?;
        if facts.tag == "label" {
            let text = clip(&facts.text, limits::TEXT_CHARS);
            return Ok((!text.is_empty()).then_some(text));
        }
        if facts.tag == "form" || facts.tag == "body" {
            break;
        }
        cursor = cache.parent(port, ancestor).await?;
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdp_adapter::dom::El;
    use cdp_adapter::MemoryDom;

    async fn naming(dom: &MemoryDom, node: NodeHandle) -> Naming {
        let cache = FactsCache::default();
        let facts = cache.facts(dom, node).await.unwrap();
        resolve(dom, &cache, dom.document_handle(), node, &facts)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn aria_label_wins_over_labels() {
        let dom = MemoryDom::new("https://app.test/", "App");
        dom.append(dom.body(), El::new("label").attr("for", "email").text("E-mail"));
        let input = dom.append(
            dom.body(),
            El::new("input").id("email").attr("aria-label", "Work address"),
        );
        let named = naming(&dom, input).await;
        assert_eq!(named.accessible_name.as_deref(), Some("Work address"));
        assert_eq!(named.labels, vec!["E-mail".to_string()]);
    }

    #[tokio::test]
    async fn labelledby_joins_referenced_texts() {
        let dom = MemoryDom::new("https://app.test/", "App");
        dom.append(dom.body(), El::new("span").id("first").text("Billing"));
        dom.append(dom.body(), El::new("span").id("second").text("  zip  "));
        let input = dom.append(
            dom.body(),
            El::new("input").attr("aria-labelledby", "first second"),
        );
        let named = naming(&dom, input).await;
        assert_eq!(named.accessible_name.as_deref(), Some("Billing zip"));
        assert_eq!(named.labels, vec!["Billing".to_string(), "zip".to_string()]);
    }

    #[tokio::test]
    async fn enclosing_label_is_last_resort() {
        let dom = MemoryDom::new("https://app.test/", "App");
        let label = dom.append(dom.body(), El::new("label").text("Remember me"));
        let checkbox = dom.append(label, El::new("input").attr("type", "checkbox"));
        let named = naming(&dom, checkbox).await;
        assert_eq!(named.accessible_name.as_deref(), Some("Remember me"));
    }
}
