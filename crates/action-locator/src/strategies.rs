//! Element resolution strategies
//!
//! Four strategies in fallback order:
//! 1. CSS - the selector recorded at capture time, accepted only when unique
//! 2. XPath - the structural path within the element's own tree
//! 3. Fingerprint - identifying attributes, most stable first
//! 4. Text - visible text within the recorded tag

use std::collections::HashSet;

use async_trait::async_trait;
use cdp_adapter::dom::selector::attr_selector;
use cdp_adapter::{AdapterError, DomPort, NodeHandle};
use pagepilot_core_types::limits;
use pagepilot_core_types::text::clip;
use pagepilot_core_types::LocatorSet;
use tracing::trace;

use crate::types::LocatorStrategy;

/// A match: the element and the root it lives under.
pub type Found = (NodeHandle, NodeHandle);

#[async_trait]
pub trait Strategy: Send + Sync {
    /// Find a live element for `set` under any of `roots`.
    async fn locate(
        &self,
        port: &dyn DomPort,
        roots: &[NodeHandle],
        set: &LocatorSet,
    ) -> Result<Option<Found>, AdapterError>;

    fn strategy_type(&self) -> LocatorStrategy;

    fn name(&self) -> &'static str {
        self.strategy_type().name()
    }
}

/// Still attached and not hidden.
pub async fn is_live(port: &dyn DomPort, node: NodeHandle) -> bool {
    match port.facts(node).await {
        Ok(facts) => facts.connected && !facts.style.is_hidden(),
        Err(_) => false,
    }
}

/// Live matches of `css` across all roots, without duplicates.
async fn live_matches(
    port: &dyn DomPort,
    roots: &[NodeHandle],
    css: &str,
) -> Result<Vec<Found>, AdapterError> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for root in roots {
        for node in port.query_all(*root, css).await? {
            if seen.insert(node) && is_live(port, node).await {
                out.push((node, *root));
            }
        }
    }
    Ok(out)
}

fn only(found: Vec<Found>) -> Option<Found> {
    match found.as_slice() {
        [single] => Some(*single),
        _ => None,
    }
}

pub struct CssStrategy;

#[async_trait]
impl Strategy for CssStrategy {
    async fn locate(
        &self,
        port: &dyn DomPort,
        roots: &[NodeHandle],
        set: &LocatorSet,
    ) -> Result<Option<Found>, AdapterError> {
        if set.css.trim().is_empty() {
            return Ok(None);
        }
        let found = live_matches(port, roots, &set.css).await?;
        if found.len() > 1 {
            trace!(selector = %set.css, matches = found.len(), "css selector is ambiguous");
        }
        Ok(only(found))
    }

    fn strategy_type(&self) -> LocatorStrategy {
        LocatorStrategy::Css
    }
}

pub struct XpathStrategy;

#[async_trait]
impl Strategy for XpathStrategy {
    async fn locate(
        &self,
        port: &dyn DomPort,
        roots: &[NodeHandle],
        set: &LocatorSet,
    ) -> Result<Option<Found>, AdapterError> {
        if set.xpath.is_empty() {
            return Ok(None);
        }
        for root in roots {
            for node in port.xpath(*root, &set.xpath).await? {
                if !set.tag.is_empty() {
                    let tag_ok = port
                        .facts(node)
                        .await
                        .map(|f| f.tag == set.tag)
                        .unwrap_or(false);
                    if !tag_ok {
                        continue;
                    }
                }
                if is_live(port, node).await {
                    return Ok(Some((node, *root)));
                }
            }
        }
        Ok(None)
    }

    fn strategy_type(&self) -> LocatorStrategy {
        LocatorStrategy::Xpath
    }
}

pub struct FingerprintStrategy;

#[async_trait]
impl Strategy for FingerprintStrategy {
    async fn locate(
        &self,
        port: &dyn DomPort,
        roots: &[NodeHandle],
        set: &LocatorSet,
    ) -> Result<Option<Found>, AdapterError> {
        for (name, value) in set.ranked_attributes() {
            let selector = attr_selector(&set.tag, name, value);
            if let Some(found) = only(live_matches(port, roots, &selector).await?) {
                trace!(attribute = name, "fingerprint attribute is unique");
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    fn strategy_type(&self) -> LocatorStrategy {
        LocatorStrategy::Fingerprint
    }
}

pub struct TextStrategy;

#[async_trait]
impl Strategy for TextStrategy {
    async fn locate(
        &self,
        port: &dyn DomPort,
        roots: &[NodeHandle],
        set: &LocatorSet,
    ) -> Result<Option<Found>, AdapterError> {
        let wanted = clip(&set.text, limits::TEXT_CHARS);
        if wanted.is_empty() {
            return Ok(None);
        }
        let scope = if set.tag.is_empty() { "*" } else { set.tag.as_str() };

        let mut partial = None;
        for root in roots {
            for node in port.query_all(*root, scope).await? {
                let Ok(facts) = port.facts(node).await else {
                    continue;
                };
                if !facts.connected || facts.style.is_hidden() {
                    continue;
                }
                let text = clip(&facts.text, limits::TEXT_CHARS);
                if text.is_empty() {
                    continue;
                }
                if text == wanted {
                    return Ok(Some((node, *root)));
                }
                if partial.is_none() && (text.contains(&wanted) || wanted.contains(&text)) {
                    partial = Some((node, *root));
                }
            }
        }
        Ok(partial)
    }

    fn strategy_type(&self) -> LocatorStrategy {
        LocatorStrategy::Text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdp_adapter::dom::El;
    use cdp_adapter::MemoryDom;
    use std::collections::BTreeMap;

    fn set(css: &str, tag: &str, text: &str) -> LocatorSet {
        LocatorSet {
            css: css.into(),
            xpath: String::new(),
            fingerprint: BTreeMap::new(),
            text: text.into(),
            tag: tag.into(),
        }
    }

    #[tokio::test]
    async fn css_rejects_ambiguous_selectors() {
        let dom = MemoryDom::new("https://app.test/", "App");
        dom.append(dom.body(), El::new("button").class("primary"));
        dom.append(dom.body(), El::new("button").class("primary"));
        let roots = [dom.document_handle()];
        let found = CssStrategy
            .locate(&dom, &roots, &set("button.primary", "button", ""))
            .await
            .unwrap();
        assert_eq!(found, None);
    }

    #[tokio::test]
    async fn css_skips_hidden_duplicates() {
        let dom = MemoryDom::new("https://app.test/", "App");
        dom.append(dom.body(), El::new("button").id("go").hidden());
        let visible = dom.append(dom.body(), El::new("button").id("go"));
        let roots = [dom.document_handle()];
        let found = CssStrategy
            .locate(&dom, &roots, &set("#go", "button", ""))
            .await
            .unwrap();
        assert_eq!(found, Some((visible, dom.document_handle())));
    }

    #[tokio::test]
    async fn fingerprint_falls_through_to_unique_attribute() {
        let dom = MemoryDom::new("https://app.test/", "App");
        dom.append(dom.body(), El::new("input").attr("name", "q").attr("placeholder", "Search"));
        let target = dom.append(
            dom.body(),
            El::new("input").attr("name", "q").attr("placeholder", "Search docs"),
        );
        let mut wanted = set("", "input", "");
        wanted.fingerprint.insert("name".into(), "q".into());
        wanted.fingerprint.insert("placeholder".into(), "Search docs".into());
        let found = FingerprintStrategy
            .locate(&dom, &[dom.document_handle()], &wanted)
            .await
            .unwrap();
        assert_eq!(found.map(|f| f.0), Some(target));
    }

    #[tokio::test]
    async fn text_prefers_exact_over_substring() {
        let dom = MemoryDom::new("https://app.test/", "App");
        dom.append(dom.body(), El::new("a").attr("href", "/x").text("Sign in with SSO"));
        let exact = dom.append(dom.body(), El::new("a").attr("href", "/y").text("Sign  in"));
        let found = TextStrategy
            .locate(&dom, &[dom.document_handle()], &set("", "a", "Sign in"))
            .await
            .unwrap();
        assert_eq!(found.map(|f| f.0), Some(exact));

        let found = TextStrategy
            .locate(&dom, &[dom.document_handle()], &set("", "a", "Sign in with SSO now"))
            .await
            .unwrap();
        assert!(found.is_some());
    }
}
