//! Actionability judgement for a candidate element.

use cdp_adapter::dom::NodeFacts;
use cdp_adapter::{AdapterError, DomPort, NodeHandle};
use pagepilot_core_types::Rect;

use crate::cache::FactsCache;
use crate::catalog::{self, INTERACTIVE_ROLES};
use crate::policy::CaptureOptions;

#[derive(Clone, Debug, PartialEq)]
pub enum Verdict {
    /// Keep; carries the box used for geometry (a descendant's when the element has none).
    Actionable(Rect),
    Rejected(&'static str),
}

impl Verdict {
    pub fn is_actionable(&self) -> bool {
        matches!(self, Verdict::Actionable(_))
    }
}

/// Decide whether `node` is something a user could act on right now.
pub async fn actionable(
    port: &dyn DomPort,
    cache: &FactsCache,
    options: &CaptureOptions,
    node: NodeHandle,
    facts: &NodeFacts,
    has_listener: bool,
) -> Result<Verdict, AdapterError> {
    if !facts.connected {
        return Ok(Verdict::Rejected("detached"));
    }
    if facts.style.is_hidden() {
        return Ok(Verdict::Rejected("hidden"));
    }
    if facts.style.pointer_events == "none" {
        return Ok(Verdict::Rejected("pointer-events"));
    }
    if facts.control.disabled || attr_true(facts, "aria-disabled") {
        return Ok(Verdict::Rejected("disabled"));
    }
    if attr_true(facts, "aria-hidden") && !exempt_from_aria_hidden(facts, has_listener) {
        return Ok(Verdict::Rejected("aria-hidden"));
    }

    let rect = if facts.rect.has_area() {
        facts.rect
    } else {
        match sized_descendant(port, cache, options, node).await? {
            Some(rect) => rect,
            None => return Ok(Verdict::Rejected("zero-size")),
        }
    };

    let mut clip_checked = false;
    let mut cursor = cache.parent(port, node).await?;
    let mut steps = 0;
    while let Some(ancestor) = cursor {
        if steps >= options.ancestor_limit {
            break;
        }
        steps += 1;
        let outer = cache.facts(port, ancestor).await?;
        if outer.style.display == "none" || outer.style.opacity <= 0.0 {
            return Ok(Verdict::Rejected("hidden-ancestor"));
        }
        if !clip_checked && outer.style.clips_content() {
            clip_checked = true;
            if !rect.intersects(&outer.rect) {
                return Ok(Verdict::Rejected("clipped"));
            }
        }
        cursor = cache.parent(port, ancestor).await?;
    }
    Ok(Verdict::Actionable(rect))
}

fn attr_true(facts: &NodeFacts, name: &str) -> bool {
    facts
        .attr(name)
        .map(|v| v.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn exempt_from_aria_hidden(facts: &NodeFacts, has_listener: bool) -> bool {
    catalog::focusable(facts)
        || has_listener
        || facts.has_attr("onclick")
        || facts
            .attr("role")
            .map(|role| INTERACTIVE_ROLES.contains(&role.trim()))
            .unwrap_or(false)
}

async fn sized_descendant(
    port: &dyn DomPort,
    cache: &FactsCache,
    options: &CaptureOptions,
    node: NodeHandle,
) -> Result<Option<Rect>, AdapterError> {
    let descendants = port.query_all(node, "*").await?;
    for child in descendants.into_iter().take(options.descendant_limit) {
        let facts = cache.facts(port, child).await?;
        if facts.rect.has_area() && !facts.style.is_hidden() {
            return Ok(Some(facts.rect));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdp_adapter::dom::El;
    use cdp_adapter::MemoryDom;

    async fn judge(dom: &MemoryDom, node: NodeHandle) -> Verdict {
        let cache = FactsCache::default();
        let facts = cache.facts(dom, node).await.unwrap();
        actionable(dom, &cache, &CaptureOptions::default(), node, &facts, false)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn display_none_is_rejected() {
        let dom = MemoryDom::new("https://app.test/", "App");
        let hidden = dom.append(dom.body(), El::new("button").hidden());
        assert_eq!(judge(&dom, hidden).await, Verdict::Rejected("hidden"));
    }

    #[tokio::test]
    async fn zero_size_wrapper_with_sized_child_is_kept() {
        let dom = MemoryDom::new("https://app.test/", "App");
        let wrapper = dom.append(
            dom.body(),
            El::new("a")
                .attr("href", "/next")
                .rect(0.0, 0.0, 0.0, 0.0)
                .child(El::new("span").text("Next").rect(10.0, 10.0, 40.0, 16.0)),
        );
        assert_eq!(
            judge(&dom, wrapper).await,
            Verdict::Actionable(Rect::new(10.0, 10.0, 40.0, 16.0))
        );
    }

    #[tokio::test]
    async fn scrolled_out_of_container_is_clipped() {
        let dom = MemoryDom::new("https://app.test/", "App");
        let list = dom.append(
            dom.body(),
            El::new("div")
                .rect(0.0, 0.0, 200.0, 100.0)
                .style(|s| s.overflow_y = "auto".into()),
        );
        let inside = dom.append(list, El::new("button").rect(0.0, 20.0, 80.0, 20.0));
        let outside = dom.append(list, El::new("button").rect(0.0, 400.0, 80.0, 20.0));
        assert!(judge(&dom, inside).await.is_actionable());
        assert_eq!(judge(&dom, outside).await, Verdict::Rejected("clipped"));
    }

    #[tokio::test]
    async fn aria_hidden_spares_focusable_controls() {
        let dom = MemoryDom::new("https://app.test/", "App");
        let icon = dom.append(dom.body(), El::new("span").attr("aria-hidden", "true"));
        let button = dom.append(dom.body(), El::new("button").attr("aria-hidden", "true"));
        assert_eq!(judge(&dom, icon).await, Verdict::Rejected("aria-hidden"));
        assert!(judge(&dom, button).await.is_actionable());
    }

    #[tokio::test]
    async fn hidden_ancestor_hides_descendants() {
        let dom = MemoryDom::new("https://app.test/", "App");
        let panel = dom.append(dom.body(), El::new("div").hidden());
        let button = dom.append(panel, El::new("button"));
        assert_eq!(judge(&dom, button).await, Verdict::Rejected("hidden-ancestor"));
    }
}
