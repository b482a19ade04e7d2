//! Session loop: capture, ask the planner, act, repeat.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pagepilot_core_types::{
    ActionDescriptor, ActionFailure, ActionResult, FailureKind, ScopeId, SessionId, Snapshot,
};
use tokio::sync::watch;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::LoopConfig;
use super::types::{LoopFailure, LoopState, SessionOutcome, SessionStatus, StepRecord};
use crate::errors::{AgentError, PlannerError};
use crate::planner::{ActionPlan, Planner};
use crate::surface::{scoped_uid, AutomationSurface};

/// Bookkeeping for one `run`.
struct Run {
    started_at: DateTime<Utc>,
    clock: Instant,
    session: Option<SessionId>,
    steps: u32,
    history: Vec<StepRecord>,
    /// Consecutive transient action failures and unsettled navigations.
    transient: u32,
    /// Consecutive capture/perform calls that found the page unreachable.
    surface_failures: u32,
}

enum Ending {
    Completed(String),
    Stopped(String),
    Failed(LoopFailure, String),
}

/// Drives one session at a time against an [`AutomationSurface`].
pub struct SessionLoop {
    config: LoopConfig,
    planner: Arc<dyn Planner>,
    surface: Arc<dyn AutomationSurface>,
    state: watch::Sender<LoopState>,
    cancel: CancellationToken,
}

impl SessionLoop {
    pub fn new(
        config: LoopConfig,
        planner: Arc<dyn Planner>,
        surface: Arc<dyn AutomationSurface>,
    ) -> Result<Self, AgentError> {
        config.validate()?;
        let (state, _) = watch::channel(LoopState::Idle);
        Ok(Self {
            config,
            planner,
            surface,
            state,
            cancel: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Every state transition, latest value first.
    pub fn subscribe(&self) -> watch::Receiver<LoopState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> LoopState {
        *self.state.borrow()
    }

    /// Token that stops the loop at the next iteration boundary.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Run a session for `goal` until the planner completes it, it fails, or it is cancelled.
    pub async fn run(&self, goal: &str, url: &str) -> SessionOutcome {
        let mut run = Run {
            started_at: Utc::now(),
            clock: Instant::now(),
            session: None,
            steps: 0,
            history: Vec::new(),
            transient: 0,
            surface_failures: 0,
        };
        let ending = self.drive(&mut run, goal, url).await;
        self.finish(run, ending).await
    }

    async fn drive(&self, run: &mut Run, goal: &str, url: &str) -> Ending {
        self.transition(LoopState::SessionStarting);
        let session = match self.start(goal, url).await {
            Ok(session) => session,
            Err(err) => return planner_failure(err),
        };
        info!(%session, goal, url, "session started");
        run.session = Some(session.clone());

        let budget = self.config.transient_budget;
        let mut snapshot: Option<Snapshot> = None;
        let mut previous: Option<ActionResult> = None;
        let mut submitted = false;

        loop {
            if self.cancel.is_cancelled() {
                return Ending::Stopped(format!("cancelled after {} steps", run.steps));
            }

            let current = match snapshot.take() {
                Some(current) => current,
                None => {
                    self.transition(LoopState::Capturing);
                    match self.capture(&session).await {
                        Ok(current) => current,
                        Err(err) => {
                            run.surface_failures += 1;
                            warn!(%session, %err, failures = run.surface_failures, "capture failed");
                            if run.surface_failures > budget {
                                return surface_failure(err);
                            }
                            continue;
                        }
                    }
                }
            };
            run.surface_failures = 0;

            if !submitted {
                submitted = true;
                match self.planner.submit_snapshot(&session, &current).await {
                    Ok(analysis) => debug!(%session, %analysis, "initial analysis"),
                    Err(err) => warn!(%session, %err, "initial snapshot not accepted"),
                }
            }

            self.transition(LoopState::Planning);
            let plan = match self.plan(&session, &current, previous.as_ref()).await {
                Ok(plan) => plan,
                Err(err) => return planner_failure(err),
            };
            if plan.complete {
                return Ending::Completed(
                    plan.reason.unwrap_or_else(|| "goal reached".to_string()),
                );
            }
            let ActionPlan {
                next_action,
                reason,
                confidence,
                ..
            } = plan;
            let Some(action) = next_action else {
                return Ending::Failed(
                    LoopFailure::NoAction,
                    reason.unwrap_or_else(|| "planner returned no action".to_string()),
                );
            };
            if run.steps >= self.config.max_steps {
                return Ending::Failed(
                    LoopFailure::IterationLimitExceeded,
                    format!("iteration limit of {} steps reached", self.config.max_steps),
                );
            }

            self.transition(LoopState::Executing);
            run.steps += 1;
            info!(
                %session,
                step = run.steps,
                action = %action.kind,
                uid = ?action.target_uid,
                confidence = ?confidence,
                reason = ?reason,
                "executing planned action"
            );
            let mut result = match self.perform(&session, &action).await {
                Ok(result) => result,
                Err(err @ AgentError::SurfaceUnavailable(_)) => {
                    run.surface_failures += 1;
                    let failed = ActionResult::failed(
                        action.kind.clone(),
                        ActionFailure::new(FailureKind::Network, err.to_string()),
                    )
                    .with_target(action.target_uid.clone());
                    run.history
                        .push(StepRecord::from_result(run.steps, &action, &failed));
                    warn!(%session, %err, failures = run.surface_failures, "step lost to unreachable page");
                    if run.surface_failures > budget {
                        return surface_failure(err);
                    }
                    previous = Some(failed);
                    continue;
                }
                Err(err) => {
                    return Ending::Failed(
                        LoopFailure::Action(FailureKind::Internal),
                        err.to_string(),
                    )
                }
            };
            run.surface_failures = 0;
            run.history
                .push(StepRecord::from_result(run.steps, &action, &result));

            if result.navigated {
                self.transition(LoopState::NavigationSettling);
                snapshot = self.settle(&session).await;
                if snapshot.is_none() {
                    run.transient += 1;
                    if run.transient > budget {
                        return Ending::Failed(
                            LoopFailure::NavigationTimeout,
                            format!(
                                "page still empty after navigating to {}",
                                result.url.as_deref().unwrap_or("?")
                            ),
                        );
                    }
                } else {
                    run.transient = 0;
                }
                previous = Some(result);
                continue;
            }

            if result.success {
                run.transient = 0;
                snapshot = self.reusable(&mut result);
                previous = Some(result);
                continue;
            }

            match result.failure_kind() {
                Some(kind) if kind.is_transient() => {
                    run.transient += 1;
                    info!(%session, kind = kind.as_str(), attempt = run.transient, "transient action failure");
                    if run.transient > budget {
                        return Ending::Failed(
                            LoopFailure::TransientBudgetExhausted,
                            format!(
                                "{} consecutive transient failures, last: {}",
                                run.transient,
                                result.summary()
                            ),
                        );
                    }
                    self.transition(LoopState::Recovering);
                    snapshot = self.reusable(&mut result);
                    previous = Some(result);
                }
                kind => {
                    return Ending::Failed(
                        LoopFailure::Action(kind.unwrap_or(FailureKind::Internal)),
                        result.summary(),
                    )
                }
            }
        }
    }

    async fn finish(&self, run: Run, ending: Ending) -> SessionOutcome {
        let (status, failure, message) = match ending {
            Ending::Completed(message) => (SessionStatus::Completed, None, message),
            Ending::Stopped(message) => (SessionStatus::Stopped, None, message),
            Ending::Failed(failure, message) => (SessionStatus::Failed, Some(failure), message),
        };
        if let Some(session) = &run.session {
            let success = status == SessionStatus::Completed;
            if let Err(err) = self.planner.complete(session, success, &message).await {
                warn!(%session, %err, "planner not told about completion");
            }
        }

        let duration_ms = run.clock.elapsed().as_millis() as u64;
        match &failure {
            None => info!(
                session = ?run.session,
                status = ?status,
                steps = run.steps,
                duration_ms,
                %message,
                "session finished"
            ),
            Some(failure) => warn!(
                session = ?run.session,
                %failure,
                steps = run.steps,
                duration_ms,
                %message,
                "session failed"
            ),
        }
        self.transition(match status {
            SessionStatus::Completed => LoopState::Completed,
            SessionStatus::Stopped => LoopState::Stopped,
            SessionStatus::Failed => LoopState::Failed,
        });

        SessionOutcome {
            session_id: run.session,
            status,
            message,
            failure,
            steps: run.steps,
            history: run.history,
            started_at: run.started_at,
            duration_ms,
        }
    }

    fn transition(&self, next: LoopState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = %previous, to = %next, "loop state");
        }
    }

    async fn start(&self, goal: &str, url: &str) -> Result<SessionId, PlannerError> {
        match self.planner.start_session(goal, url).await {
            Err(err) if err.is_transient() => {
                warn!(%err, "session start failed; retrying once");
                self.planner.start_session(goal, url).await
            }
            other => other,
        }
    }

    /// Ask for the next action; a transient failure gets one retry with a fresh snapshot.
    async fn plan(
        &self,
        session: &SessionId,
        snapshot: &Snapshot,
        previous: Option<&ActionResult>,
    ) -> Result<ActionPlan, PlannerError> {
        match self.planner.next_action(session, snapshot, previous).await {
            Err(err) if err.is_transient() => {
                warn!(%session, %err, "planner failed; retrying once with a fresh snapshot");
                let fresh = match self.capture(session).await {
                    Ok(fresh) => Some(fresh),
                    Err(capture_err) => {
                        debug!(%session, %capture_err, "recapture for planner retry failed");
                        None
                    }
                };
                self.planner
                    .next_action(session, fresh.as_ref().unwrap_or(snapshot), previous)
                    .await
            }
            other => other,
        }
    }

    async fn perform(
        &self,
        session: &SessionId,
        action: &ActionDescriptor,
    ) -> Result<ActionResult, AgentError> {
        match self.surface.perform(session, action).await {
            Err(AgentError::SurfaceUnavailable(reason)) => {
                warn!(%session, %reason, "surface unavailable; re-establishing");
                self.surface.reestablish().await?;
                self.surface.perform(session, action).await
            }
            other => other,
        }
    }

    /// Capture every reachable scope, falling back to the main scope alone.
    async fn capture(&self, session: &SessionId) -> Result<Snapshot, AgentError> {
        let scopes = self.surface.scopes();
        if scopes.len() > 1 {
            if let Some(merged) = self.capture_merged(session, &scopes).await {
                return Ok(merged);
            }
            debug!(%session, "multi-scope capture came back empty; using main scope");
        }
        let multi = scopes.len() > 1;
        let main = scopes.into_iter().next().unwrap_or_else(ScopeId::main);
        let mut snapshot = self.capture_scope(session, &main).await?;
        if multi {
            tag_scope(&mut snapshot, &main);
        }
        Ok(snapshot)
    }

    async fn capture_scope(&self, session: &SessionId, scope: &ScopeId) -> Result<Snapshot, AgentError> {
        match self.surface.capture(session, scope).await {
            Err(AgentError::SurfaceUnavailable(reason)) => {
                warn!(%session, %scope, %reason, "surface unavailable; re-establishing");
                self.surface.reestablish().await?;
                self.surface.capture(session, scope).await
            }
            other => other,
        }
    }

    async fn capture_merged(&self, session: &SessionId, scopes: &[ScopeId]) -> Option<Snapshot> {
        let deadline = Duration::from_millis(self.config.scope_timeout_ms);
        let mut merged: Option<Snapshot> = None;
        for scope in scopes {
            let mut snapshot = match timeout(deadline, self.surface.capture(session, scope)).await
            {
                Ok(Ok(snapshot)) => snapshot,
                Ok(Err(err)) => {
                    warn!(%session, %scope, %err, "scope capture failed");
                    continue;
                }
                Err(_) => {
                    warn!(%session, %scope, timeout_ms = self.config.scope_timeout_ms, "scope capture timed out");
                    continue;
                }
            };
            tag_scope(&mut snapshot, scope);
            match merged.as_mut() {
                None => merged = Some(snapshot),
                Some(base) => {
                    base.stats.absorb(&snapshot.stats);
                    base.elements.append(&mut snapshot.elements);
                }
            }
        }
        merged.filter(|snapshot| !snapshot.is_empty())
    }

    /// Wait out a navigation, then capture until the new page shows content.
    async fn settle(&self, session: &SessionId) -> Option<Snapshot> {
        sleep(Duration::from_millis(self.config.settle_ms)).await;
        for (attempt, delay) in self.config.recapture_backoff_ms.iter().enumerate() {
            sleep(Duration::from_millis(*delay)).await;
            match self.capture(session).await {
                Ok(snapshot) if !snapshot.is_empty() => {
                    debug!(%session, attempt = attempt + 1, elements = snapshot.len(), "navigation settled");
                    return Some(snapshot);
                }
                Ok(_) => debug!(%session, attempt = attempt + 1, "page still empty after navigation"),
                Err(err) => debug!(%session, attempt = attempt + 1, %err, "capture after navigation failed"),
            }
        }
        warn!(%session, "navigation did not settle; recapturing next iteration");
        None
    }

    /// The snapshot embedded in a result, when it describes the whole surface.
    fn reusable(&self, result: &mut ActionResult) -> Option<Snapshot> {
        if self.surface.scopes().len() > 1 {
            return None;
        }
        result.snapshot.take()
    }
}

fn planner_failure(err: PlannerError) -> Ending {
    let failure = if err.is_transient() {
        LoopFailure::TransientPlannerFailure
    } else {
        LoopFailure::Planner
    };
    Ending::Failed(failure, err.to_string())
}

fn surface_failure(err: AgentError) -> Ending {
    let failure = match err {
        AgentError::SurfaceUnavailable(_) => LoopFailure::SurfaceUnavailable,
        _ => LoopFailure::Action(FailureKind::Internal),
    };
    Ending::Failed(failure, err.to_string())
}

/// Rewrite uids into the merged-snapshot namespace and record their scope.
fn tag_scope(snapshot: &mut Snapshot, scope: &ScopeId) {
    for record in &mut snapshot.elements {
        record.uid = scoped_uid(scope, &record.uid);
        record.scope = Some(scope.to_string());
    }
}
