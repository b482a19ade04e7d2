use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cdp_adapter::dom::{NodeFacts, PathStep};
use cdp_adapter::{AdapterError, DomPort, NodeHandle};
use dashmap::DashMap;

/// Per-capture memo of node facts, paths and parents.
///
/// Lives for exactly one capture pass; nothing here is ever invalidated.
#[derive(Default)]
pub struct FactsCache {
    facts: DashMap<NodeHandle, Arc<NodeFacts>>,
    paths: DashMap<NodeHandle, Arc<Vec<PathStep>>>,
    parents: DashMap<NodeHandle, Option<NodeHandle>>,
    hits: AtomicU64,
}

impl FactsCache {
    pub async fn facts(
        &self,
        port: &dyn DomPort,
        node: NodeHandle,
    ) -> Result<Arc<NodeFacts>, AdapterError> {
        if let Some(found) = self.facts.get(&node) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(found.clone());
        }
        let facts = Arc::new(port.facts(node).await?);
        self.facts.insert(node, facts.clone());
        Ok(facts)
    }

    pub async fn path(
        &self,
        port: &dyn DomPort,
        node: NodeHandle,
    ) -> Result<Arc<Vec<PathStep>>, AdapterError> {
        if let Some(found) = self.paths.get(&node) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(found.clone());
        }
        let path = Arc::new(port.path(node).await?);
        self.paths.insert(node, path.clone());
        Ok(path)
    }

    pub async fn parent(
        &self,
        port: &dyn DomPort,
        node: NodeHandle,
    ) -> Result<Option<NodeHandle>, AdapterError> {
        if let Some(found) = self.parents.get(&node) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(*found);
        }
        let parent = port.parent(node).await?;
        self.parents.insert(node, parent);
        Ok(parent)
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdp_adapter::dom::El;
    use cdp_adapter::MemoryDom;

    #[tokio::test]
    async fn second_lookup_is_served_from_memory() {
        let dom = MemoryDom::new("https://app.test/", "App");
        let button = dom.append(dom.body(), El::new("button").text("Go"));
        let cache = FactsCache::default();
        cache.facts(&dom, button).await.unwrap();
        dom.set_text(button, "Changed");
        let facts = cache.facts(&dom, button).await.unwrap();
        assert_eq!(facts.text, "Go");
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.len(), 1);
    }
}
