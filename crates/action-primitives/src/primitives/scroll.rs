//! Scroll primitive

use cdp_adapter::dom::ScrollRequest;
use cdp_adapter::{DomPort, NodeHandle};
use pagepilot_core_types::{ActionKind, ActionResult};
use tracing::info;

use crate::errors::ActionError;
use crate::primitives::Executor;
use crate::types::ScrollTarget;

/// Far enough to reach the end of any page; the browser clamps it.
const PAGE_END: f64 = 1.0e7;

/// Execute scroll primitive
///
/// With a target the element is brought into view; without one the window
/// moves by direction or pixel amount, one viewport down by default.
pub async fn execute_scroll(
    _executor: &Executor,
    port: &dyn DomPort,
    target: Option<NodeHandle>,
    window: Option<ScrollTarget>,
) -> Result<ActionResult, ActionError> {
    if let Some(node) = target {
        info!(%node, "Executing scroll primitive (into view)");
        port.scroll(ScrollRequest::IntoView(node)).await?;
        return Ok(ActionResult::ok(ActionKind::Scroll, "scrolled element into view"));
    }

    let window = window.unwrap_or(ScrollTarget::Down);
    let viewport = port.page_info().await?.viewport;
    info!(?window, "Executing scroll primitive (window)");
    let (request, message) = match window {
        ScrollTarget::Up => (
            ScrollRequest::By {
                dx: 0.0,
                dy: -viewport.height,
            },
            "scrolled up one viewport".to_string(),
        ),
        ScrollTarget::Down => (
            ScrollRequest::By {
                dx: 0.0,
                dy: viewport.height,
            },
            "scrolled down one viewport".to_string(),
        ),
        ScrollTarget::Top => (
            ScrollRequest::To {
                x: viewport.scroll_x,
                y: 0.0,
            },
            "scrolled to top".to_string(),
        ),
        ScrollTarget::Bottom => (
            ScrollRequest::To {
                x: viewport.scroll_x,
                y: PAGE_END,
            },
            "scrolled to bottom".to_string(),
        ),
        ScrollTarget::By(dy) => (
            ScrollRequest::By { dx: 0.0, dy },
            format!("scrolled by {dy}px"),
        ),
    };
    port.scroll(request).await?;
    Ok(ActionResult::ok(ActionKind::Scroll, message))
}
