//! Wait primitives - timed waits and page-state conditions

use std::time::Duration;

use cdp_adapter::DomPort;
use pagepilot_core_types::{ActionKind, ActionResult};
use tracing::info;

use crate::errors::ActionError;
use crate::primitives::Executor;
use crate::types::UrlMatch;
use crate::waiting;

pub async fn execute_wait(
    _executor: &Executor,
    duration: Duration,
) -> Result<ActionResult, ActionError> {
    info!(ms = duration.as_millis() as u64, "Executing wait primitive");
    tokio::time::sleep(duration).await;
    Ok(ActionResult::ok(
        ActionKind::Wait,
        format!("waited {}ms", duration.as_millis()),
    ))
}

/// Observes DOM mutations until `selector` matches; no busy polling.
pub async fn execute_wait_for_selector(
    _executor: &Executor,
    port: &dyn DomPort,
    selector: &str,
    timeout: Duration,
) -> Result<ActionResult, ActionError> {
    info!(selector, ms = timeout.as_millis() as u64, "Executing wait_for_selector primitive");
    if port.wait_for_selector(selector, timeout).await? {
        Ok(ActionResult::ok(
            ActionKind::WaitForSelector,
            format!("'{selector}' appeared"),
        ))
    } else {
        Err(ActionError::WaitTimeout(format!(
            "'{selector}' did not appear within {}ms",
            timeout.as_millis()
        )))
    }
}

pub async fn execute_wait_for_url_change(
    executor: &Executor,
    port: &dyn DomPort,
    mode: &UrlMatch,
    timeout: Duration,
) -> Result<ActionResult, ActionError> {
    info!(?mode, ms = timeout.as_millis() as u64, "Executing wait_for_url_change primitive");
    let url =
        waiting::wait_for_url(port, mode, timeout, executor.config().poll_interval()).await?;
    let mut result = ActionResult::ok(ActionKind::WaitForUrlChange, format!("url is now {url}"));
    result.url = Some(url);
    Ok(result)
}

/// Succeeds either way; a page that never settles is reported in the message.
pub async fn execute_wait_network_idle(
    executor: &Executor,
    port: &dyn DomPort,
    idle: Duration,
    timeout: Duration,
) -> Result<ActionResult, ActionError> {
    info!(
        idle_ms = idle.as_millis() as u64,
        ms = timeout.as_millis() as u64,
        "Executing wait_network_idle primitive"
    );
    let settled =
        waiting::wait_network_idle(port, idle, timeout, executor.config().poll_interval()).await?;
    let message = if settled {
        "network idle".to_string()
    } else {
        format!("network still busy after {}ms", timeout.as_millis())
    };
    Ok(ActionResult::ok(ActionKind::WaitNetworkIdle, message))
}
