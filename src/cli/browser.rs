//! Opening a Chromium page and wrapping it as an automation surface.

use std::sync::Arc;

use action_locator::ElementRegistry;
use action_primitives::Executor;
use agent_core::DomSurface;
use anyhow::{Context, Result};
use cdp_adapter::{CdpPage, CdpTransport, ChromiumTransport};
use pagepilot_core_types::ScopeId;
use perceiver_structural::StructuralExtractor;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::AppConfig;

/// Launch (or attach to) Chromium and open `url` in a fresh tab.
pub async fn open_page(config: &AppConfig, url: Option<&str>) -> Result<CdpPage> {
    let transport: Arc<dyn CdpTransport> = Arc::new(ChromiumTransport::new(config.browser.clone()));
    CdpPage::open(transport, &config.browser, url)
        .await
        .with_context(|| format!("Failed to open {}", url.unwrap_or("a browser tab")))
}

/// Executor wired to the configured extractor and a swept registry.
pub fn build_executor(config: &AppConfig, cancel: &CancellationToken) -> Executor {
    let registry = Arc::new(ElementRegistry::new(config.locator.clone()));
    registry.spawn_sweeper(config.locator.sweep_interval(), cancel.child_token());
    Executor::new(
        config.executor.clone(),
        Arc::new(StructuralExtractor::new(config.extractor.clone())),
        registry,
    )
}

/// The page's main document plus every out-of-process frame it currently has.
pub async fn build_surface(
    page: &CdpPage,
    config: &AppConfig,
    cancel: &CancellationToken,
) -> DomSurface {
    let mut surface = DomSurface::single(page.port(), build_executor(config, cancel));
    match page.frame_targets().await {
        Ok(frames) => {
            for (index, frame) in frames.into_iter().enumerate() {
                let scope = ScopeId::new(format!("frame{}", index + 1));
                info!(%scope, url = %frame.url, "attached frame scope");
                surface = surface.with_scope(scope, frame.port, build_executor(config, cancel));
            }
        }
        Err(err) => warn!(%err, "frame targets unavailable; main scope only"),
    }
    surface
}

pub async fn close_page(page: &CdpPage) {
    if let Err(err) = page.close().await {
        warn!(%err, "failed to close tab");
    }
}
