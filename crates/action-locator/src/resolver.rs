//! Fallback chain over every reachable root

use std::collections::{HashSet, VecDeque};

use cdp_adapter::dom::FrameContent;
use cdp_adapter::{AdapterError, AdapterErrorKind, DomPort, NodeHandle};
use pagepilot_core_types::LocatorSet;
use tracing::{debug, warn};

use crate::strategies::{CssStrategy, FingerprintStrategy, Strategy, TextStrategy, XpathStrategy};
use crate::types::{LocatorStrategy, Resolution};

/// Shadow and frame nesting followed when collecting roots.
const MAX_ROOT_DEPTH: usize = 8;

pub struct Resolver {
    strategies: Vec<Box<dyn Strategy>>,
}

impl Default for Resolver {
    fn default() -> Self {
        Self {
            strategies: vec![
                Box::new(CssStrategy),
                Box::new(XpathStrategy),
                Box::new(FingerprintStrategy),
                Box::new(TextStrategy),
            ],
        }
    }
}

impl Resolver {
    pub fn with_strategies(strategies: Vec<Box<dyn Strategy>>) -> Self {
        Self { strategies }
    }

    /// Top document, then open shadow roots and same-origin frame documents, breadth first.
    pub async fn roots(&self, port: &dyn DomPort) -> Result<Vec<NodeHandle>, AdapterError> {
        let document = port.document().await?;
        let mut roots = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([(document, 0usize)]);
        while let Some((root, depth)) = queue.pop_front() {
            if !visited.insert(root) {
                continue;
            }
            roots.push(root);
            if depth >= MAX_ROOT_DEPTH {
                continue;
            }
            if let Err(err) = nested_roots(port, root, depth, &mut queue).await {
                if err.is_unreachable() {
                    return Err(err);
                }
                debug!(%err, %root, "skipping nested roots");
            }
        }
        Ok(roots)
    }

    /// Run the chain. Returns the first accepted match and the strategies tried.
    pub async fn resolve(
        &self,
        port: &dyn DomPort,
        set: &LocatorSet,
    ) -> Result<(Option<Resolution>, Vec<LocatorStrategy>), AdapterError> {
        let roots = self.roots(port).await?;
        let mut tried = Vec::with_capacity(self.strategies.len());
        for strategy in &self.strategies {
            tried.push(strategy.strategy_type());
            match strategy.locate(port, &roots, set).await {
                Ok(Some((node, root))) => {
                    debug!(strategy = strategy.name(), %node, "resolved");
                    return Ok((
                        Some(Resolution {
                            node,
                            root,
                            strategy: strategy.strategy_type(),
                        }),
                        tried,
                    ));
                }
                Ok(None) => {}
                Err(err) if err.is_unreachable() => return Err(err),
                Err(err) if matches!(err.kind, AdapterErrorKind::InvalidSelector | AdapterErrorKind::StaleNode) => {
                    debug!(strategy = strategy.name(), %err, "strategy skipped");
                }
                Err(err) => warn!(strategy = strategy.name(), %err, "strategy failed"),
            }
        }
        Ok((None, tried))
    }
}

async fn nested_roots(
    port: &dyn DomPort,
    root: NodeHandle,
    depth: usize,
    queue: &mut VecDeque<(NodeHandle, usize)>,
) -> Result<(), AdapterError> {
    for host in port.shadow_hosts(root).await? {
        if let Some(shadow) = port.shadow_root(host).await? {
            queue.push_back((shadow, depth + 1));
        }
    }
    for frame in port.query_all(root, "iframe, frame").await? {
        if let FrameContent::SameOrigin { document, .. } = port.frame_content(frame).await? {
            queue.push_back((document, depth + 1));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdp_adapter::dom::El;
    use cdp_adapter::MemoryDom;
    use std::collections::BTreeMap;

    fn set(css: &str, xpath: &str, tag: &str, text: &str) -> LocatorSet {
        LocatorSet {
            css: css.into(),
            xpath: xpath.into(),
            fingerprint: BTreeMap::new(),
            text: text.into(),
            tag: tag.into(),
        }
    }

    #[tokio::test]
    async fn roots_include_shadow_and_same_origin_frames() {
        let dom = MemoryDom::new("https://app.test/", "App");
        let host = dom.append(dom.body(), El::new("x-card"));
        let shadow = dom.attach_shadow(host);
        let same = dom.append(dom.body(), El::new("iframe"));
        dom.attach_frame(same, true);
        let cross = dom.append(dom.body(), El::new("iframe"));
        dom.attach_frame(cross, false);

        let roots = Resolver::default().roots(&dom).await.unwrap();
        assert_eq!(roots.len(), 3);
        assert_eq!(roots[0], dom.document_handle());
        assert!(roots.contains(&shadow));
    }

    #[tokio::test]
    async fn falls_back_to_xpath_when_css_is_gone() {
        let dom = MemoryDom::new("https://app.test/", "App");
        dom.append(dom.body(), El::new("div"));
        let target = dom.append(dom.body(), El::new("button").text("Save"));
        let wanted = set("#save", "/html[1]/body[1]/button[1]", "button", "Save");

        let (found, tried) = Resolver::default().resolve(&dom, &wanted).await.unwrap();
        let found = found.unwrap();
        assert_eq!(found.node, target);
        assert_eq!(found.strategy, LocatorStrategy::Xpath);
        assert_eq!(tried, vec![LocatorStrategy::Css, LocatorStrategy::Xpath]);
    }

    #[tokio::test]
    async fn reports_every_strategy_when_nothing_matches() {
        let dom = MemoryDom::new("https://app.test/", "App");
        let wanted = set("#missing", "/html[1]/body[1]/button[4]", "button", "Pay now");
        let (found, tried) = Resolver::default().resolve(&dom, &wanted).await.unwrap();
        assert!(found.is_none());
        assert_eq!(tried.len(), 4);
    }

    #[tokio::test]
    async fn finds_elements_inside_shadow_roots() {
        let dom = MemoryDom::new("https://app.test/", "App");
        let host = dom.append(dom.body(), El::new("x-login"));
        let shadow = dom.attach_shadow(host);
        let inner = dom.append(shadow, El::new("button").id("login"));
        let (found, _) = Resolver::default()
            .resolve(&dom, &set("#login", "", "button", ""))
            .await
            .unwrap();
        assert_eq!(found.map(|r| (r.node, r.root)), Some((inner, shadow)));
    }
}
