use anyhow::{bail, Context, Result};
use pagepilot_core_types::{ActionDescriptor, ActionResult};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::browser::{build_executor, close_page, open_page};
use super::commands::PerformArgs;
use super::context::CliContext;

pub async fn cmd_perform(args: PerformArgs, ctx: &CliContext) -> Result<()> {
    let descriptor: ActionDescriptor =
        serde_json::from_str(&args.action).context("Invalid action JSON")?;

    let config = ctx.config();
    let page = open_page(config, Some(&args.url)).await?;
    let cancel = CancellationToken::new();
    let executor = build_executor(config, &cancel);
    let port = page.port();

    // Register uids first so `target_uid` resolves.
    let performed = match executor.capture(port.as_ref()).await {
        Ok(capture) => {
            info!(elements = capture.snapshot.len(), "page captured");
            executor.perform(port.as_ref(), &descriptor).await.map_err(anyhow::Error::from)
        }
        Err(err) => Err(anyhow::Error::from(err).context("Failed to capture page")),
    };
    cancel.cancel();
    close_page(&page).await;

    let result = performed?;
    ctx.output().emit(&result, render_result)?;
    if !result.success {
        bail!("{} failed: {}", result.action, result.summary());
    }
    Ok(())
}

fn render_result(result: &ActionResult) -> String {
    let mut lines = vec![format!(
        "{} {}: {}",
        result.action,
        if result.success { "ok" } else { "failed" },
        result.summary()
    )];
    if result.navigated {
        lines.push(format!("navigating to {}", result.url.as_deref().unwrap_or("?")));
    }
    for banner in &result.errors {
        lines.push(format!("error banner: {banner}"));
    }
    for banner in &result.successes {
        lines.push(format!("success banner: {banner}"));
    }
    if let Some(snapshot) = &result.snapshot {
        lines.push(format!("{} actionable elements after the action", snapshot.len()));
    }
    lines.join("\n")
}
