use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use super::browser::{build_executor, close_page, open_page};
use super::commands::CaptureArgs;
use super::context::CliContext;

pub async fn cmd_capture(args: CaptureArgs, ctx: &CliContext) -> Result<()> {
    let mut config = ctx.config().clone();
    if let Some(depth) = args.max_depth {
        config.extractor.max_depth = depth;
    }

    let page = open_page(&config, Some(&args.url)).await?;
    let cancel = CancellationToken::new();
    let executor = build_executor(&config, &cancel);
    let captured = executor.capture(page.port().as_ref()).await;
    cancel.cancel();
    close_page(&page).await;

    let capture = captured.with_context(|| format!("Failed to capture {}", args.url))?;
    println!("{}", serde_json::to_string_pretty(&capture.snapshot)?);
    Ok(())
}
