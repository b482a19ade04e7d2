use std::collections::{HashSet, VecDeque};

use cdp_adapter::{DomPort, NodeHandle};
use parking_lot::Mutex;
use tracing::debug;

#[derive(Default)]
struct State {
    order: VecDeque<NodeHandle>,
    members: HashSet<NodeHandle>,
    since_compaction: usize,
}

/// Bounded set of elements seen registering an event listener.
///
/// Insertion-ordered; compaction drops detached nodes and then the oldest
/// entries beyond the cap.
pub struct ListenerRegistry {
    state: Mutex<State>,
    cap: usize,
    compact_every: usize,
}

impl ListenerRegistry {
    pub fn new(cap: usize, compact_every: usize) -> Self {
        Self {
            state: Mutex::new(State::default()),
            cap,
            compact_every: compact_every.max(1),
        }
    }

    /// Returns how many of `nodes` were new.
    pub fn record(&self, nodes: impl IntoIterator<Item = NodeHandle>) -> usize {
        let mut state = self.state.lock();
        let mut added = 0;
        for node in nodes {
            if state.members.insert(node) {
                state.order.push_back(node);
                added += 1;
            }
        }
        state.since_compaction += added;
        added
    }

    pub fn contains(&self, node: NodeHandle) -> bool {
        self.state.lock().members.contains(&node)
    }

    pub fn nodes(&self) -> Vec<NodeHandle> {
        self.state.lock().order.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn needs_compaction(&self) -> bool {
        let state = self.state.lock();
        state.since_compaction >= self.compact_every || state.order.len() > self.cap
    }

    /// Pull new registrations from the page, compacting when due.
    pub async fn refresh(&self, port: &dyn DomPort) {
        match port.drain_listener_registrations().await {
            Ok(nodes) => {
                self.record(nodes);
            }
            Err(err) => debug!(%err, "listener registrations unavailable"),
        }
        if self.needs_compaction() {
            self.compact(port).await;
        }
    }

    pub async fn compact(&self, port: &dyn DomPort) {
        let tracked = self.nodes();
        let mut live = Vec::with_capacity(tracked.len());
        for node in &tracked {
            if matches!(port.facts(*node).await, Ok(facts) if facts.connected) {
                live.push(*node);
            }
        }
        let tracked: HashSet<NodeHandle> = tracked.into_iter().collect();

        let mut state = self.state.lock();
        let before = state.order.len();
        // registrations recorded during the check are kept as-is
        let recent: Vec<NodeHandle> = state
            .order
            .iter()
            .copied()
            .filter(|n| !tracked.contains(n))
            .collect();
        state.order = live.into_iter().chain(recent).collect();
        while state.order.len() > self.cap {
            state.order.pop_front();
        }
        state.members = state.order.iter().copied().collect();
        state.since_compaction = 0;
        debug!(before, after = state.order.len(), "compacted listener registry");
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new(5000, 200)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdp_adapter::dom::El;
    use cdp_adapter::MemoryDom;

    #[test]
    fn duplicates_are_ignored() {
        let registry = ListenerRegistry::new(10, 5);
        assert_eq!(registry.record([NodeHandle(1), NodeHandle(2), NodeHandle(1)]), 2);
        assert_eq!(registry.record([NodeHandle(2)]), 0);
        assert_eq!(registry.len(), 2);
        assert!(!registry.needs_compaction());
    }

    #[tokio::test]
    async fn compaction_drops_detached_and_oldest() {
        let dom = MemoryDom::new("https://app.test/", "App");
        let nodes: Vec<NodeHandle> = (0..4)
            .map(|i| dom.append(dom.body(), El::new("div").id(&format!("n{i}"))))
            .collect();
        for node in &nodes {
            dom.add_listener(*node);
        }
        dom.remove(nodes[1]);

        let registry = ListenerRegistry::new(2, 3);
        registry.refresh(&dom).await;
        assert_eq!(registry.nodes(), vec![nodes[2], nodes[3]]);
        assert!(!registry.contains(nodes[0]));
        assert!(!registry.needs_compaction());
    }
}
