//! Navigate and submit primitives

use cdp_adapter::{DomPort, NodeHandle};
use pagepilot_core_types::{ActionKind, ActionResult};
use tracing::{debug, info};
use url::Url;

use crate::errors::ActionError;
use crate::primitives::{closest, Executor};

/// Absolute URL for a planner-supplied target.
///
/// Paths resolve against `current`; bare hosts get `https://`.
pub fn normalize_url(raw: &str, current: &str) -> Result<String, ActionError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ActionError::InvalidAction("empty url".into()));
    }
    let invalid = |err: url::ParseError| ActionError::InvalidAction(format!("bad url '{raw}': {err}"));

    if raw.starts_with('/') || raw.starts_with("./") || raw.starts_with("../") || raw.starts_with('?') {
        let base = Url::parse(current).map_err(invalid)?;
        return Ok(base.join(raw).map_err(invalid)?.to_string());
    }
    let has_scheme = raw.contains("://")
        || ["about:", "data:", "file:", "mailto:"]
            .iter()
            .any(|scheme| raw.starts_with(scheme));
    let absolute = if has_scheme {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };
    Ok(Url::parse(&absolute).map_err(invalid)?.to_string())
}

/// Execute navigate primitive
///
/// Schedules the navigation and returns at once with `navigated` set.
/// The caller is responsible for letting the new page settle.
pub async fn execute_navigate(
    _executor: &Executor,
    port: &dyn DomPort,
    raw: &str,
) -> Result<ActionResult, ActionError> {
    let current = port.page_info().await?.url;
    let url = normalize_url(raw, &current)?;
    info!(%url, "Executing navigate primitive");
    port.schedule_navigation(&url).await?;
    Ok(ActionResult::ok(ActionKind::Navigate, "navigation pending").navigation_pending(url))
}

/// Execute submit primitive
///
/// Submits the target form, the target's enclosing form, or the first form on the page.
pub async fn execute_submit(
    _executor: &Executor,
    port: &dyn DomPort,
    target: Option<NodeHandle>,
) -> Result<ActionResult, ActionError> {
    let form = match target {
        Some(node) => closest(port, node, "form").await?,
        None => None,
    };
    let form = match form {
        Some(form) => form,
        None => {
            let document = port.document().await?;
            port.query_all(document, "form")
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| ActionError::NotFound("no form on the page".into()))?
        }
    };
    info!(%form, "Executing submit primitive");
    port.request_submit(form).await?;
    debug!(%form, "submit requested");
    Ok(ActionResult::ok(ActionKind::Submit, "form submitted"))
}
