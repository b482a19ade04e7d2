use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use cdp_adapter::dom::selector::{attr_selector, id_selector};
use cdp_adapter::dom::{FrameContent, NodeFacts, PageInfo};
use cdp_adapter::{AdapterError, DomPort, NodeHandle};
use pagepilot_core_types::text::{clip, truncate_chars};
use pagepilot_core_types::{
    limits, CaptureStats, ElementRecord, FrameDescriptor, LocatorSet, Rect, Snapshot, WidgetState,
};
use tracing::{debug, trace, warn};

use crate::api::SnapshotExtractor;
use crate::cache::FactsCache;
use crate::catalog::{self, CANDIDATE_SELECTOR, POPUP_ITEM_SELECTOR, RECORDED_ATTRIBUTES};
use crate::errors::PerceiverError;
use crate::identity::{self, UidAllocator};
use crate::judges::{self, Verdict};
use crate::listeners::ListenerRegistry;
use crate::model::Capture;
use crate::naming;
use crate::policy::CaptureOptions;

/// A document or shadow root waiting to be visited.
#[derive(Clone, Debug)]
struct Scope {
    root: NodeHandle,
    depth: usize,
    /// Offset of this scope's viewport inside the top-level viewport.
    offset: (f64, f64),
    frame: Option<FrameDescriptor>,
    /// Boundary-aware path of the host or frame element, with its separator.
    prefix: String,
}

/// The default extractor: catalog query per scope, actionability filter, serialization.
pub struct StructuralExtractor {
    options: CaptureOptions,
    listeners: ListenerRegistry,
}

impl StructuralExtractor {
    pub fn new(options: CaptureOptions) -> Self {
        let listeners = ListenerRegistry::new(options.listener_cap, options.compact_every);
        Self { options, listeners }
    }

    pub fn options(&self) -> &CaptureOptions {
        &self.options
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }
}

impl Default for StructuralExtractor {
    fn default() -> Self {
        Self::new(CaptureOptions::default())
    }
}

#[async_trait]
impl SnapshotExtractor for StructuralExtractor {
    async fn capture(&self, port: &dyn DomPort) -> Result<Capture, PerceiverError> {
        let started = Instant::now();
        port.release_objects().await?;
        self.listeners.refresh(port).await;
        let page = port.page_info().await?;
        let document = port.document().await?;

        let mut run = CaptureRun {
            port,
            options: &self.options,
            listeners: &self.listeners,
            page: &page,
            cache: FactsCache::default(),
            uids: UidAllocator::default(),
            records: Vec::new(),
            locators: Vec::new(),
            stats: CaptureStats::default(),
            seen: HashSet::new(),
            frame_ordinal: 0,
        };
        let mut listener_roots = run.group_listeners_by_root().await;

        let mut worklist = VecDeque::from([Scope {
            root: document,
            depth: 0,
            offset: (0.0, 0.0),
            frame: None,
            prefix: String::new(),
        }]);
        let mut visited = HashSet::new();
        while let Some(scope) = worklist.pop_front() {
            if !visited.insert(scope.root) {
                continue;
            }
            let extra = listener_roots.remove(&scope.root).unwrap_or_default();
            match run.visit(&scope, extra, &mut worklist).await {
                Ok(()) => {}
                Err(err) if scope.depth == 0 => return Err(err.into()),
                Err(err) => warn!(%err, prefix = %scope.prefix, "nested scope skipped"),
            }
            if run.records.len() >= self.options.max_elements {
                debug!(max = self.options.max_elements, "element cap reached");
                break;
            }
        }

        let mut stats = run.stats;
        stats.kept = run.records.len();
        stats.duration_ms = started.elapsed().as_millis() as u64;
        debug!(
            url = %page.url,
            candidates = stats.candidates,
            kept = stats.kept,
            frames = stats.frames,
            shadow_roots = stats.shadow_roots,
            cache_hits = run.cache.hits(),
            duration_ms = stats.duration_ms,
            "capture complete"
        );
        Ok(Capture {
            snapshot: Snapshot {
                url: page.url.clone(),
                title: page.title.clone(),
                timestamp: Utc::now(),
                viewport: page.viewport,
                elements: run.records,
                stats,
            },
            locators: run.locators,
        })
    }
}

struct CaptureRun<'a> {
    port: &'a dyn DomPort,
    options: &'a CaptureOptions,
    listeners: &'a ListenerRegistry,
    page: &'a PageInfo,
    cache: FactsCache,
    uids: UidAllocator,
    records: Vec<ElementRecord>,
    locators: Vec<(String, LocatorSet)>,
    stats: CaptureStats,
    seen: HashSet<NodeHandle>,
    frame_ordinal: usize,
}

impl CaptureRun<'_> {
    /// Listener-registered nodes are not found by the catalog query; bucket them by tree root.
    async fn group_listeners_by_root(&self) -> HashMap<NodeHandle, Vec<NodeHandle>> {
        let mut grouped: HashMap<NodeHandle, Vec<NodeHandle>> = HashMap::new();
        for node in self.listeners.nodes() {
            if let Ok(root) = self.port.root_of(node).await {
                grouped.entry(root).or_default().push(node);
            }
        }
        grouped
    }

    async fn visit(
        &mut self,
        scope: &Scope,
        extra: Vec<NodeHandle>,
        worklist: &mut VecDeque<Scope>,
    ) -> Result<(), AdapterError> {
        let mut queue: VecDeque<NodeHandle> = self
            .port
            .query_all(scope.root, CANDIDATE_SELECTOR.as_str())
            .await?
            .into();
        queue.extend(extra);

        if scope.depth < self.options.max_depth {
            self.discover_scopes(scope, worklist).await?;
        }

        while let Some(node) = queue.pop_front() {
            if self.records.len() >= self.options.max_elements {
                break;
            }
            if !self.seen.insert(node) {
                continue;
            }
            self.stats.candidates += 1;
            match self.consider(scope, node, &mut queue).await {
                Ok(()) => {}
                Err(err) if err.kind == cdp_adapter::AdapterErrorKind::StaleNode => {
                    trace!(%node, "candidate vanished during capture");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    async fn discover_scopes(
        &mut self,
        scope: &Scope,
        worklist: &mut VecDeque<Scope>,
    ) -> Result<(), AdapterError> {
        for host in self.port.shadow_hosts(scope.root).await? {
            let Some(shadow) = self.port.shadow_root(host).await? else {
                continue;
            };
            self.stats.shadow_roots += 1;
            let host_path = self.short_path(host).await?;
            worklist.push_back(Scope {
                root: shadow,
                depth: scope.depth + 1,
                offset: scope.offset,
                frame: scope.frame.clone(),
                prefix: format!("{}{} >>> ", scope.prefix, host_path),
            });
        }

        for frame in self.port.query_all(scope.root, "iframe, frame").await? {
            self.stats.frames += 1;
            let facts = self.cache.facts(self.port, frame).await?;
            let steps = self.cache.path(self.port, frame).await?;
            let index = self.frame_ordinal;
            self.frame_ordinal += 1;
            let locator = identity::css_selector(&facts, &steps);
            match self.port.frame_content(frame).await? {
                FrameContent::SameOrigin {
                    document,
                    src,
                    name,
                } => {
                    if facts.style.is_hidden() || !facts.rect.has_area() {
                        continue;
                    }
                    worklist.push_back(Scope {
                        root: document,
                        depth: scope.depth + 1,
                        offset: (
                            scope.offset.0 + facts.rect.left,
                            scope.offset.1 + facts.rect.top,
                        ),
                        frame: Some(FrameDescriptor {
                            index,
                            src,
                            name,
                            locator,
                            cross_origin: false,
                        }),
                        prefix: format!(
                            "{}{} >> ",
                            scope.prefix,
                            identity::short_step(&facts, &steps)
                        ),
                    });
                }
                FrameContent::CrossOrigin { src, name } => {
                    self.stats.inaccessible_frames += 1;
                    let descriptor = FrameDescriptor {
                        index,
                        src,
                        name,
                        locator,
                        cross_origin: true,
                    };
                    if self.seen.insert(frame) {
                        self.record_cross_origin(scope, frame, &facts, descriptor)
                            .await?;
                    }
                }
                FrameContent::NotFrame => {}
            }
        }
        Ok(())
    }

    async fn consider(
        &mut self,
        scope: &Scope,
        node: NodeHandle,
        queue: &mut VecDeque<NodeHandle>,
    ) -> Result<(), AdapterError> {
        let facts = self.cache.facts(self.port, node).await?;
        let has_listener = self.listeners.contains(node);
        if !catalog::qualifies(&facts, has_listener) {
            return Ok(());
        }
        let verdict = judges::actionable(
            self.port,
            &self.cache,
            self.options,
            node,
            &facts,
            has_listener,
        )
        .await?;
        let rect = match verdict {
            Verdict::Actionable(rect) => rect,
            Verdict::Rejected(reason) => {
                trace!(%node, tag = %facts.tag, reason, "not actionable");
                return Ok(());
            }
        };

        self.pull_in_popups(scope, &facts, queue).await?;
        let option_count = self.datalist_options(scope, &facts, queue).await?;
        self.push_record(scope, node, &facts, rect, option_count, None)
            .await
    }

    /// Queue items of popups this element controls.
    async fn pull_in_popups(
        &mut self,
        scope: &Scope,
        facts: &NodeFacts,
        queue: &mut VecDeque<NodeHandle>,
    ) -> Result<(), AdapterError> {
        let Some(ids) = facts.attr("aria-controls") else {
            return Ok(());
        };
        for id in ids.split_whitespace() {
            for popup in self.port.query_all(scope.root, &id_selector(id)).await? {
                queue.push_back(popup);
                let selector = format!("{}, {}", CANDIDATE_SELECTOR.as_str(), POPUP_ITEM_SELECTOR);
                queue.extend(self.port.query_all(popup, &selector).await?);
            }
        }
        Ok(())
    }

    /// Queue options of the datalist bound through `list`; returns how many there are.
    async fn datalist_options(
        &mut self,
        scope: &Scope,
        facts: &NodeFacts,
        queue: &mut VecDeque<NodeHandle>,
    ) -> Result<Option<usize>, AdapterError> {
        let Some(list) = facts.attr("list").filter(|v| !v.trim().is_empty()) else {
            return Ok(None);
        };
        let options = self
            .port
            .query_all(scope.root, &format!("{} option", attr_selector("datalist", "id", list)))
            .await?;
        let count = options.len();
        queue.extend(options);
        Ok(Some(count))
    }

    async fn record_cross_origin(
        &mut self,
        scope: &Scope,
        frame: NodeHandle,
        facts: &NodeFacts,
        descriptor: FrameDescriptor,
    ) -> Result<(), AdapterError> {
        if facts.style.is_hidden() || !facts.rect.has_area() {
            return Ok(());
        }
        self.push_record(scope, frame, facts, facts.rect, None, Some(descriptor))
            .await
    }

    async fn short_path(&self, node: NodeHandle) -> Result<String, AdapterError> {
        let facts = self.cache.facts(self.port, node).await?;
        let steps = self.cache.path(self.port, node).await?;
        Ok(identity::short_step(&facts, &steps))
    }

    async fn push_record(
        &mut self,
        scope: &Scope,
        node: NodeHandle,
        facts: &NodeFacts,
        rect: Rect,
        option_count: Option<usize>,
        own_frame: Option<FrameDescriptor>,
    ) -> Result<(), AdapterError> {
        let steps = self.cache.path(self.port, node).await?;
        let named = naming::resolve(self.port, &self.cache, scope.root, node, facts).await?;
        let xpath = identity::xpath(&steps);
        let css = identity::css_selector(facts, &steps);
        let scoped_path = truncate_chars(
            &format!("{}{}", scope.prefix, identity::short_step(facts, &steps)),
            limits::SCOPED_PATH_CHARS,
        );

        let label = named
            .accessible_name
            .as_deref()
            .or_else(|| named.labels.first().map(String::as_str));
        let base = identity::stable_uid(facts)
            .unwrap_or_else(|| identity::fingerprint_uid(facts, label, &xpath));
        let uid = self.uids.allocate(base);

        let bounds = rect.translate(scope.offset.0, scope.offset.1);
        let viewport = Rect::new(0.0, 0.0, self.page.viewport.width, self.page.viewport.height);
        let text = clip(&facts.text, limits::TEXT_CHARS);

        self.records.push(ElementRecord {
            uid: uid.clone(),
            tag: facts.tag.clone(),
            element_type: catalog::element_type(facts),
            text: text.clone(),
            attributes: recorded_attributes(facts),
            accessible_name: named.accessible_name,
            labels: named.labels,
            state: widget_state(facts, option_count),
            bounds,
            is_in_viewport: bounds.has_area() && bounds.intersects(&viewport),
            tab_index: catalog::tab_index(facts),
            selector: css.clone(),
            xpath: xpath.clone(),
            scoped_path,
            frame: own_frame.or_else(|| scope.frame.clone()),
            scope: None,
        });
        self.locators.push((
            uid,
            LocatorSet {
                css,
                xpath,
                fingerprint: identity::fingerprint_attributes(facts),
                text,
                tag: facts.tag.clone(),
            },
        ));
        Ok(())
    }
}

fn recorded_attributes(facts: &NodeFacts) -> BTreeMap<String, String> {
    RECORDED_ATTRIBUTES
        .iter()
        .filter_map(|name| {
            facts
                .attr(name)
                .map(|value| (name.to_string(), clip(value, limits::ATTRIBUTE_CHARS)))
        })
        .collect()
}

fn aria_bool(facts: &NodeFacts, name: &str) -> Option<bool> {
    match facts.attr(name)?.trim().to_ascii_lowercase().as_str() {
        "true" | "mixed" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn widget_state(facts: &NodeFacts, datalist_options: Option<usize>) -> WidgetState {
    let control = &facts.control;
    let value = if facts.input_type().as_deref() == Some("password") {
        None
    } else {
        control
            .value
            .as_deref()
            .map(|v| clip(v, limits::ATTRIBUTE_CHARS))
    };
    let option_count = if facts.tag == "select" {
        Some(control.options.len())
    } else {
        datalist_options
    };
    WidgetState {
        disabled: control.disabled || aria_bool(facts, "aria-disabled") == Some(true),
        read_only: control.read_only || aria_bool(facts, "aria-readonly") == Some(true),
        checked: control.checked.or_else(|| aria_bool(facts, "aria-checked")),
        selected: control.selected.or_else(|| aria_bool(facts, "aria-selected")),
        value,
        expanded: aria_bool(facts, "aria-expanded"),
        has_popup: facts
            .attr("aria-haspopup")
            .map(str::to_string)
            .filter(|v| !v.is_empty() && v != "false"),
        option_count,
    }
}
