use std::sync::Arc;

use agent_core::HttpPlanner;
use anyhow::{bail, Result};
use cdp_adapter::{CdpPage, CdpTransport, ChromiumTransport, DomPort};
use serde::Serialize;

use super::commands::PingArgs;
use super::context::CliContext;

#[derive(Serialize)]
struct PingReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    browser: Option<Check>,
    planner: Check,
}

#[derive(Serialize)]
struct Check {
    ok: bool,
    detail: String,
}

impl Check {
    fn from_result<E: std::fmt::Display>(result: Result<String, E>) -> Self {
        match result {
            Ok(detail) => Self { ok: true, detail },
            Err(err) => Self {
                ok: false,
                detail: err.to_string(),
            },
        }
    }
}

pub async fn cmd_ping(args: PingArgs, ctx: &CliContext) -> Result<()> {
    let config = ctx.config();

    let browser = if args.planner_only {
        None
    } else {
        let transport: Arc<dyn CdpTransport> =
            Arc::new(ChromiumTransport::new(config.browser.clone()));
        let check = async {
            let page = CdpPage::open(transport, &config.browser, None).await?;
            let pinged = page.port().ping().await;
            let _ = page.close().await;
            pinged.map(|_| "page responds".to_string())
        };
        Some(Check::from_result(check.await))
    };

    let mut planner_config = config.planner.clone();
    if let Some(url) = &args.planner_url {
        planner_config.base_url = url.clone();
    }
    let planner = match HttpPlanner::new(planner_config) {
        Ok(planner) => Check::from_result(planner.health().await),
        Err(err) => Check {
            ok: false,
            detail: err.to_string(),
        },
    };

    let report = PingReport { browser, planner };
    let healthy = report.planner.ok && report.browser.as_ref().map_or(true, |b| b.ok);
    ctx.output().emit(&report, |report| {
        let mut lines = Vec::new();
        if let Some(browser) = &report.browser {
            lines.push(format!("browser: {} ({})", status(browser.ok), browser.detail));
        }
        lines.push(format!(
            "planner: {} ({})",
            status(report.planner.ok),
            report.planner.detail
        ));
        lines.join("\n")
    })?;
    if !healthy {
        bail!("ping failed");
    }
    Ok(())
}

fn status(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "unreachable"
    }
}
