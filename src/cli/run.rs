use std::sync::Arc;

use agent_core::{
    HttpPlanner, Planner, ScriptedPlanner, SessionLoop, SessionOutcome, SessionStatus,
};
use anyhow::{bail, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::browser::{build_surface, close_page, open_page};
use super::commands::RunArgs;
use super::context::CliContext;

pub async fn cmd_run(args: RunArgs, ctx: &CliContext) -> Result<()> {
    let config = ctx.config();
    let mut loop_config = config.orchestrator.clone();
    if let Some(steps) = args.max_steps {
        loop_config.max_steps = steps;
    }

    let planner: Arc<dyn Planner> = match (&args.script, &args.planner_url) {
        (Some(script), _) => {
            info!(script = %script.display(), "replaying scripted plans");
            Arc::new(ScriptedPlanner::from_path(script)?)
        }
        (None, url) => {
            let mut planner_config = config.planner.clone();
            if let Some(url) = url {
                planner_config.base_url = url.clone();
            }
            info!(planner = %planner_config.base_url, "using planner service");
            Arc::new(HttpPlanner::new(planner_config)?)
        }
    };

    let page = open_page(config, Some(&args.url)).await?;
    let cancel = CancellationToken::new();
    let surface = Arc::new(build_surface(&page, config, &cancel).await);
    let session = SessionLoop::new(loop_config, planner, surface)?;

    let token = session.cancellation();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping after the current step");
            token.cancel();
        }
    });
    let mut states = session.subscribe();
    let watcher = tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow();
            debug!(%state, "session state");
            if state.is_terminal() {
                break;
            }
        }
    });

    let outcome = session.run(&args.goal, &args.url).await;
    interrupt.abort();
    watcher.abort();
    cancel.cancel();
    close_page(&page).await;

    ctx.output().emit(&outcome, render_outcome)?;
    if outcome.status == SessionStatus::Failed {
        bail!("session failed: {}", outcome.message);
    }
    Ok(())
}

fn render_outcome(outcome: &SessionOutcome) -> String {
    let mut lines = vec![format!(
        "{:?} after {} step(s) in {} ms: {}",
        outcome.status, outcome.steps, outcome.duration_ms, outcome.message
    )];
    if let Some(failure) = &outcome.failure {
        lines.push(format!("failure: {failure}"));
    }
    for step in &outcome.history {
        lines.push(format!(
            "  {:>3}. {:<20} {} {}",
            step.step,
            step.action.kind.to_string(),
            if step.success { "ok  " } else { "FAIL" },
            step.summary
        ));
    }
    lines.join("\n")
}
