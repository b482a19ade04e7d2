//! uid → locator registry shared by capture and resolution.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cdp_adapter::DomPort;
use dashmap::DashMap;
use pagepilot_core_types::LocatorSet;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::errors::LocatorError;
use crate::resolver::Resolver;
use crate::types::{LocatorConfig, RegistryEntry, ResolveOutcome};

/// Re-captures the page and re-registers its elements between resolution attempts.
#[async_trait]
pub trait RefreshHook: Send + Sync {
    async fn refresh(&self) -> Result<(), LocatorError>;
}

/// Hook for callers that have nothing to refresh.
pub struct NoRefresh;

#[async_trait]
impl RefreshHook for NoRefresh {
    async fn refresh(&self) -> Result<(), LocatorError> {
        Ok(())
    }
}

pub struct ElementRegistry {
    entries: DashMap<String, RegistryEntry>,
    resolver: Resolver,
    config: LocatorConfig,
}

impl Default for ElementRegistry {
    fn default() -> Self {
        Self::new(LocatorConfig::default())
    }
}

impl ElementRegistry {
    pub fn new(config: LocatorConfig) -> Self {
        Self::with_resolver(config, Resolver::default())
    }

    pub fn with_resolver(config: LocatorConfig, resolver: Resolver) -> Self {
        Self {
            entries: DashMap::new(),
            resolver,
            config,
        }
    }

    pub fn config(&self) -> &LocatorConfig {
        &self.config
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Store locators for `uid`, replacing any previous entry.
    pub fn register(&self, uid: impl Into<String>, locators: LocatorSet) {
        self.entries.insert(uid.into(), RegistryEntry::new(locators));
    }

    pub fn register_all<I>(&self, entries: I) -> usize
    where
        I: IntoIterator<Item = (String, LocatorSet)>,
    {
        let mut count = 0;
        for (uid, locators) in entries {
            self.register(uid, locators);
            count += 1;
        }
        debug!(count, total = self.entries.len(), "registered locators");
        count
    }

    pub fn locators(&self, uid: &str) -> Option<LocatorSet> {
        self.entries.get(uid).map(|entry| entry.locators.clone())
    }

    pub fn access_count(&self, uid: &str) -> Option<u64> {
        self.entries.get(uid).map(|entry| entry.access_count)
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.entries.contains_key(uid)
    }

    pub fn remove(&self, uid: &str) -> bool {
        self.entries.remove(uid).is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// One pass over the fallback chain.
    pub async fn resolve(
        &self,
        port: &dyn DomPort,
        uid: &str,
    ) -> Result<ResolveOutcome, LocatorError> {
        let locators = match self.entries.get_mut(uid) {
            Some(mut entry) => {
                entry.access_count += 1;
                entry.locators.clone()
            }
            None => {
                debug!(uid, "uid not registered");
                return Ok(ResolveOutcome::unknown(uid));
            }
        };
        let (resolved, tried) = self.resolver.resolve(port, &locators).await?;
        if resolved.is_none() {
            debug!(uid, tried = ?tried, "no strategy matched");
        }
        Ok(ResolveOutcome {
            uid: uid.to_string(),
            resolved,
            tried,
            attempts: 1,
        })
    }

    /// Resolve, refreshing and retrying on the configured schedule until found or exhausted.
    pub async fn resolve_with_retry(
        &self,
        port: &dyn DomPort,
        uid: &str,
        refresh: &dyn RefreshHook,
    ) -> Result<ResolveOutcome, LocatorError> {
        let schedule = &self.config.retry;
        let mut outcome = self.resolve(port, uid).await?;
        let mut attempts = 1;
        while !outcome.is_found() && attempts < schedule.max_attempts {
            tokio::time::sleep(schedule.delay(attempts)).await;
            if let Err(err) = refresh.refresh().await {
                if err.is_unreachable() {
                    return Err(err);
                }
                debug!(uid, %err, "refresh failed; retrying with current locators");
            }
            attempts += 1;
            outcome = self.resolve(port, uid).await?;
        }
        outcome.attempts = attempts;
        if !outcome.is_found() {
            info!(uid, attempts, "element not found after retries");
        }
        Ok(outcome)
    }

    /// Drop entries past their TTL that were never accessed. Returns how many went.
    pub fn sweep(&self) -> usize {
        let ttl = self.config.ttl();
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(ttl, now));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed, remaining = self.entries.len(), "swept registry");
        }
        removed
    }

    /// Run [`sweep`](Self::sweep) every `interval` until `cancel` fires.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        registry.sweep();
                    }
                }
            }
            debug!("registry sweeper stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LocatorStrategy, RetrySchedule};
    use cdp_adapter::dom::El;
    use cdp_adapter::{MemoryDom, NodeHandle};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn by_id(id: &str) -> LocatorSet {
        LocatorSet {
            css: format!("#{id}"),
            xpath: String::new(),
            fingerprint: BTreeMap::new(),
            text: String::new(),
            tag: "button".into(),
        }
    }

    struct CountingRefresh(AtomicUsize);

    #[async_trait]
    impl RefreshHook for CountingRefresh {
        async fn refresh(&self) -> Result<(), LocatorError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn last_registration_wins() {
        let registry = ElementRegistry::default();
        registry.register("save", by_id("old"));
        registry.register("save", by_id("new"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.locators("save").unwrap().css, "#new");
    }

    #[tokio::test]
    async fn resolving_twice_returns_the_same_node() {
        let dom = MemoryDom::new("https://app.test/", "App");
        let button = dom.append(dom.body(), El::new("button").id("save"));
        let registry = ElementRegistry::default();
        registry.register("save", by_id("save"));

        let first = registry.resolve(&dom, "save").await.unwrap();
        let second = registry.resolve(&dom, "save").await.unwrap();
        assert_eq!(first.node(), Some(button));
        assert_eq!(first.node(), second.node());
        assert_eq!(first.resolved.map(|r| r.strategy), Some(LocatorStrategy::Css));
        assert_eq!(registry.access_count("save"), Some(2));
    }

    #[tokio::test]
    async fn unknown_uid_is_not_an_error() {
        let dom = MemoryDom::new("https://app.test/", "App");
        let registry = ElementRegistry::default();
        let outcome = registry.resolve(&dom, "ghost").await.unwrap();
        assert!(!outcome.is_found());
        assert!(outcome.tried.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn retry_gives_up_after_max_attempts() {
        let dom = MemoryDom::new("https://app.test/", "App");
        let registry = ElementRegistry::default();
        registry.register("gone", by_id("gone"));
        let refresh = CountingRefresh(AtomicUsize::new(0));

        let started = Instant::now();
        let outcome = registry
            .resolve_with_retry(&dom, "gone", &refresh)
            .await
            .unwrap();
        assert!(!outcome.is_found());
        assert_eq!(outcome.attempts, 10);
        assert_eq!(refresh.0.load(Ordering::SeqCst), 9);
        // 50 + 100 + ... + 450
        assert_eq!(started.elapsed(), Duration::from_millis(2250));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_picks_up_late_elements() {
        let dom = Arc::new(MemoryDom::new("https://app.test/", "App"));
        let registry = ElementRegistry::new(
            LocatorConfig::default().with_retry(RetrySchedule::default().with_max_attempts(5)),
        );
        registry.register("late", by_id("late"));

        let writer = Arc::clone(&dom);
        let appended = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(120)).await;
            writer.append(writer.body(), El::new("button").id("late"))
        });

        let outcome = registry
            .resolve_with_retry(dom.as_ref(), "late", &NoRefresh)
            .await
            .unwrap();
        let node: NodeHandle = appended.await.unwrap();
        assert_eq!(outcome.node(), Some(node));
        assert_eq!(outcome.attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_drops_only_stale_unused_entries() {
        let dom = MemoryDom::new("https://app.test/", "App");
        let registry = ElementRegistry::new(LocatorConfig::default().with_ttl(Duration::from_secs(60)));
        registry.register("used", by_id("used"));
        registry.register("idle", by_id("idle"));
        registry.resolve(&dom, "used").await.unwrap();

        assert_eq!(registry.sweep(), 0);
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(registry.sweep(), 1);
        assert!(registry.contains("used"));
        assert!(!registry.contains("idle"));
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_stops_on_cancel() {
        let registry = Arc::new(ElementRegistry::new(
            LocatorConfig::default().with_ttl(Duration::from_secs(1)),
        ));
        registry.register("idle", by_id("idle"));
        let cancel = CancellationToken::new();
        let handle = registry.spawn_sweeper(Duration::from_secs(5), cancel.clone());

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(registry.is_empty());

        cancel.cancel();
        tokio_test::assert_ok!(handle.await);
    }
}
