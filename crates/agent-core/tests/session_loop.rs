use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use action_primitives::ExecutorConfig;
use agent_core::{
    ActionPlan, AgentError, AutomationSurface, DomSurface, LoopConfig, LoopFailure, LoopState,
    PlannerError, ScriptStep, ScriptedPlanner, SessionLoop, SessionStatus,
};
use async_trait::async_trait;
use cdp_adapter::dom::El;
use cdp_adapter::{DomPort, MemoryDom};
use pagepilot_core_types::{
    ActionDescriptor, ActionKind, ActionResult, FailureKind, ScopeId, SessionId, Snapshot,
};
use tokio::time::Instant;

fn login_page() -> Arc<MemoryDom> {
    let dom = MemoryDom::new("https://shop.test/login", "Log in");
    dom.append(
        dom.body(),
        El::new("form").id("login").children([
            El::new("input").id("user").attr("type", "text").attr("name", "user"),
            El::new("button").id("go").attr("type", "button").text("Continue"),
        ]),
    );
    Arc::new(dom)
}

/// DomSurface that logs when each capture happened and can blank some of them.
struct RecordingSurface {
    inner: DomSurface,
    origin: Instant,
    captures: Mutex<Vec<u64>>,
    blank: HashSet<usize>,
}

impl RecordingSurface {
    fn new(dom: Arc<MemoryDom>, blank: impl IntoIterator<Item = usize>) -> Arc<Self> {
        Arc::new(Self {
            inner: DomSurface::standard(dom, ExecutorConfig::default()),
            origin: Instant::now(),
            captures: Mutex::new(Vec::new()),
            blank: blank.into_iter().collect(),
        })
    }

    fn capture_times(&self) -> Vec<u64> {
        self.captures.lock().unwrap().clone()
    }
}

#[async_trait]
impl AutomationSurface for RecordingSurface {
    fn scopes(&self) -> Vec<ScopeId> {
        self.inner.scopes()
    }

    async fn capture(&self, session: &SessionId, scope: &ScopeId) -> Result<Snapshot, AgentError> {
        let index = {
            let mut captures = self.captures.lock().unwrap();
            captures.push(self.origin.elapsed().as_millis() as u64);
            captures.len() - 1
        };
        let snapshot = self.inner.capture(session, scope).await?;
        if self.blank.contains(&index) {
            return Ok(Snapshot::empty(snapshot.url, snapshot.title));
        }
        Ok(snapshot)
    }

    async fn perform(
        &self,
        session: &SessionId,
        action: &ActionDescriptor,
    ) -> Result<ActionResult, AgentError> {
        self.inner.perform(session, action).await
    }

    async fn ping(&self) -> Result<(), AgentError> {
        self.inner.ping().await
    }

    async fn reestablish(&self) -> Result<(), AgentError> {
        self.inner.reestablish().await
    }
}

fn session(
    config: LoopConfig,
    planner: &Arc<ScriptedPlanner>,
    surface: Arc<dyn AutomationSurface>,
) -> SessionLoop {
    SessionLoop::new(config, planner.clone(), surface).unwrap()
}

#[tokio::test]
async fn scripted_session_completes() {
    let dom = login_page();
    let surface = RecordingSurface::new(dom.clone(), []);
    let planner = Arc::new(ScriptedPlanner::new(vec![
        ActionPlan::act(
            ActionDescriptor::new(ActionKind::Type)
                .with_target("user")
                .with_value("ada"),
        )
        .with_confidence(0.9),
        ActionPlan::act(ActionDescriptor::new(ActionKind::Click).with_target("go")),
        ActionPlan::done("logged in"),
    ]));
    let looper = session(LoopConfig::fast(), &planner, surface.clone());
    let states = looper.subscribe();

    let outcome = looper.run("log in as ada", "https://shop.test/login").await;

    assert_eq!(outcome.status, SessionStatus::Completed, "{}", outcome.message);
    assert_eq!(outcome.message, "logged in");
    assert_eq!(outcome.steps, 2);
    assert!(outcome.history.iter().all(|step| step.success));
    assert_eq!(*states.borrow(), LoopState::Completed);

    let user = dom.query_all(dom.document_handle(), "#user").await.unwrap()[0];
    assert_eq!(dom.value_of(user).as_deref(), Some("ada"));

    // Results carry a fresh snapshot, so only the first capture goes through the surface.
    assert_eq!(surface.capture_times().len(), 1);
    assert_eq!(planner.snapshots_submitted(), 1);
    assert_eq!(planner.goal().as_deref(), Some("log in as ada"));
    assert_eq!(planner.completion(), Some((true, "logged in".to_string())));

    let previous = planner.previous_results();
    assert_eq!(previous.len(), 3);
    assert!(previous[0].is_none());
    assert_eq!(previous[1].as_ref().unwrap().action, ActionKind::Type);
    assert_eq!(previous[2].as_ref().unwrap().target_uid.as_deref(), Some("go"));
}

#[tokio::test(start_paused = true)]
async fn never_completing_planner_stops_at_step_cap() {
    let planner = Arc::new(
        ScriptedPlanner::new(vec![ActionPlan::act(
            ActionDescriptor::new(ActionKind::Wait).with_duration(100),
        )])
        .cycling(),
    );
    let looper = session(
        LoopConfig::fast().with_max_steps(3),
        &planner,
        RecordingSurface::new(login_page(), []),
    );

    let outcome = looper.run("wait forever", "https://shop.test/login").await;

    assert_eq!(outcome.status, SessionStatus::Failed);
    assert_eq!(outcome.failure, Some(LoopFailure::IterationLimitExceeded));
    assert_eq!(outcome.steps, 3);
    assert_eq!(outcome.history.len(), 3);
    assert_eq!(planner.calls(), 4);
    assert_eq!(planner.completion().map(|(ok, _)| ok), Some(false));
}

#[tokio::test(start_paused = true)]
async fn navigation_settles_before_recapture() {
    let dom = login_page();
    let surface = RecordingSurface::new(dom.clone(), [1]);
    let planner = Arc::new(ScriptedPlanner::new(vec![
        ActionPlan::act(ActionDescriptor::new(ActionKind::parse("go_to_url")).with_value("/account")),
        ActionPlan::done("arrived"),
    ]));
    let looper = session(LoopConfig::default(), &planner, surface.clone());

    let outcome = looper.run("open account", "https://shop.test/login").await;

    assert!(outcome.is_success(), "{}", outcome.message);
    assert!(outcome.history[0].navigated);
    assert_eq!(dom.navigations(), vec!["https://shop.test/account".to_string()]);
    // settle 1500 + 500, blank; +1000, accepted.
    assert_eq!(surface.capture_times(), vec![0, 2_000, 3_000]);
}

#[tokio::test(start_paused = true)]
async fn link_click_navigation_settles_before_recapture() {
    let dom = login_page();
    dom.append(dom.body(), El::new("a").id("help").attr("href", "/help").text("Help"));
    let surface = RecordingSurface::new(dom.clone(), []);
    let planner = Arc::new(ScriptedPlanner::new(vec![
        ActionPlan::act(ActionDescriptor::new(ActionKind::Click).with_target("help")),
        ActionPlan::done("on the help page"),
    ]));
    let looper = session(LoopConfig::default(), &planner, surface.clone());

    let outcome = looper.run("find help", "https://shop.test/login").await;

    assert!(outcome.is_success(), "{}", outcome.message);
    assert!(outcome.history[0].navigated);
    assert_eq!(dom.navigations(), vec!["https://shop.test/help".to_string()]);
    // No capture straight after the click: settle 1500 + first backoff 500.
    assert_eq!(surface.capture_times(), vec![0, 2_000]);
    let previous = planner.previous_results();
    assert_eq!(
        previous[1].as_ref().and_then(|r| r.url.as_deref()),
        Some("https://shop.test/help")
    );
}

#[tokio::test(start_paused = true)]
async fn unsettled_navigation_forces_recapture_next_iteration() {
    let surface = RecordingSurface::new(login_page(), [1, 2, 3]);
    let planner = Arc::new(ScriptedPlanner::new(vec![
        ActionPlan::act(ActionDescriptor::new(ActionKind::Navigate).with_value("/account")),
        ActionPlan::done("arrived"),
    ]));
    let looper = session(LoopConfig::default(), &planner, surface.clone());

    let outcome = looper.run("open account", "https://shop.test/login").await;

    assert!(outcome.is_success(), "{}", outcome.message);
    assert_eq!(surface.capture_times(), vec![0, 2_000, 3_000, 4_500, 4_500]);
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_bounded() {
    let planner = Arc::new(
        ScriptedPlanner::new(vec![ActionPlan::act(
            ActionDescriptor::new(ActionKind::Click).with_target("ghost"),
        )])
        .cycling(),
    );
    let config = LoopConfig::fast().with_transient_budget(2);
    let looper = session(config, &planner, RecordingSurface::new(login_page(), []));

    let outcome = looper.run("click a ghost", "https://shop.test/login").await;

    assert_eq!(outcome.failure, Some(LoopFailure::TransientBudgetExhausted));
    assert_eq!(outcome.steps, 3);
    assert!(outcome
        .history
        .iter()
        .all(|step| step.failure == Some(FailureKind::NotFound)));
    let previous = planner.previous_results();
    assert_eq!(
        previous[1].as_ref().and_then(|r| r.failure_kind()),
        Some(FailureKind::NotFound)
    );
}

#[tokio::test]
async fn unsupported_action_fails_the_session() {
    let planner = Arc::new(ScriptedPlanner::new(vec![ActionPlan::act(
        ActionDescriptor::new(ActionKind::parse("teleport")),
    )]));
    let looper = session(LoopConfig::fast(), &planner, RecordingSurface::new(login_page(), []));

    let outcome = looper.run("teleport", "https://shop.test/login").await;

    assert_eq!(
        outcome.failure,
        Some(LoopFailure::Action(FailureKind::UnsupportedAction))
    );
    assert!(outcome.message.contains("teleport"), "{}", outcome.message);
    assert_eq!(outcome.steps, 1);
}

#[tokio::test]
async fn empty_plan_fails_with_reason() {
    let planner = Arc::new(ScriptedPlanner::new(vec![
        ActionPlan::default().with_reason("nothing actionable")
    ]));
    let looper = session(LoopConfig::fast(), &planner, RecordingSurface::new(login_page(), []));

    let outcome = looper.run("anything", "https://shop.test/login").await;

    assert_eq!(outcome.failure, Some(LoopFailure::NoAction));
    assert_eq!(outcome.message, "nothing actionable");
    assert_eq!(outcome.steps, 0);
}

#[tokio::test]
async fn transient_planner_error_is_retried_once() {
    let planner = Arc::new(ScriptedPlanner::from_steps(vec![
        ScriptStep::Fail(PlannerError::Timeout("30s".into())),
        ScriptStep::Plan(ActionPlan::done("done after retry")),
    ]));
    let surface = RecordingSurface::new(login_page(), []);
    let looper = session(LoopConfig::fast(), &planner, surface.clone());

    let outcome = looper.run("retry", "https://shop.test/login").await;

    assert!(outcome.is_success());
    assert_eq!(planner.calls(), 2);
    // The retry plans against a fresh capture.
    assert_eq!(surface.capture_times().len(), 2);

    let planner = Arc::new(ScriptedPlanner::from_steps(vec![
        ScriptStep::Fail(PlannerError::Service {
            status: 502,
            message: "overloaded".into(),
            transient: true,
        }),
        ScriptStep::Fail(PlannerError::Transport("connection reset".into())),
    ]));
    let looper = session(LoopConfig::fast(), &planner, RecordingSurface::new(login_page(), []));
    let outcome = looper.run("retry", "https://shop.test/login").await;
    assert_eq!(outcome.failure, Some(LoopFailure::TransientPlannerFailure));
    assert_eq!(planner.calls(), 2);
}

#[tokio::test]
async fn rejected_plan_request_is_not_retried() {
    let planner = Arc::new(ScriptedPlanner::from_steps(vec![ScriptStep::Fail(
        PlannerError::Rejected("404: Session not found".into()),
    )]));
    let looper = session(LoopConfig::fast(), &planner, RecordingSurface::new(login_page(), []));

    let outcome = looper.run("anything", "https://shop.test/login").await;

    assert_eq!(outcome.failure, Some(LoopFailure::Planner));
    assert_eq!(planner.calls(), 1);
}

#[tokio::test]
async fn unreachable_page_is_reestablished_once() {
    let dom = login_page();
    dom.break_connection(true);
    let planner = Arc::new(ScriptedPlanner::new(vec![ActionPlan::done("fine")]));
    let looper = session(LoopConfig::fast(), &planner, RecordingSurface::new(dom, []));

    let outcome = looper.run("recover", "https://shop.test/login").await;
    assert!(outcome.is_success(), "{}", outcome.message);
}

#[tokio::test]
async fn permanently_unreachable_page_fails_after_budget() {
    let dom = login_page();
    dom.break_connection(false);
    let planner = Arc::new(ScriptedPlanner::new(vec![ActionPlan::done("never")]));
    let looper = session(
        LoopConfig::fast().with_transient_budget(2),
        &planner,
        RecordingSurface::new(dom, []),
    );

    let outcome = looper.run("recover", "https://shop.test/login").await;

    assert_eq!(outcome.failure, Some(LoopFailure::SurfaceUnavailable));
    assert_eq!(planner.calls(), 0);
    assert_eq!(looper.state(), LoopState::Failed);
}

#[tokio::test(start_paused = true)]
async fn cancellation_lets_the_step_finish() {
    let planner = Arc::new(
        ScriptedPlanner::new(vec![ActionPlan::act(
            ActionDescriptor::new(ActionKind::Wait).with_duration(1_000),
        )])
        .cycling(),
    );
    let looper = Arc::new(session(
        LoopConfig::default(),
        &planner,
        RecordingSurface::new(login_page(), []),
    ));
    let token = looper.cancellation();
    let runner = looper.clone();
    let handle = tokio::spawn(async move { runner.run("wait", "https://shop.test/login").await });

    let started = Instant::now();
    // The second one-second wait is in flight at 1.5s.
    tokio::time::sleep(std::time::Duration::from_millis(1_500)).await;
    token.cancel();
    assert_eq!(looper.state(), LoopState::Executing);
    let outcome = handle.await.unwrap();

    assert_eq!(outcome.status, SessionStatus::Stopped);
    assert_eq!(outcome.steps, 2);
    assert_eq!(outcome.history.len(), 2);
    assert!(outcome.history.iter().all(|step| step.success));
    assert!(outcome.history[1].duration_ms >= 1_000);
    assert!(started.elapsed() >= std::time::Duration::from_millis(2_000));
    assert_eq!(planner.calls(), 2);
    assert_eq!(looper.state(), LoopState::Stopped);
}

#[tokio::test]
async fn merged_scopes_keep_uids_unique() {
    let main = MemoryDom::new("https://shop.test/checkout", "Checkout");
    main.append(main.body(), El::new("button").id("frame1:pay").text("Pay here"));
    let main = Arc::new(main);
    let frame = MemoryDom::new("https://pay.test/widget", "Widget");
    frame.append(frame.body(), El::new("button").id("pay").text("Pay"));
    let frame = Arc::new(frame);

    let surface = DomSurface::standard(main.clone(), ExecutorConfig::default()).with_scope(
        ScopeId::new("frame1"),
        frame.clone(),
        agent_core::standard_executor(ExecutorConfig::default()),
    );
    let planner = Arc::new(ScriptedPlanner::new(vec![
        ActionPlan::act(ActionDescriptor::new(ActionKind::Click).with_target("main:frame1:pay")),
        ActionPlan::act(ActionDescriptor::new(ActionKind::Click).with_target("frame1:pay")),
        ActionPlan::done("paid"),
    ]));
    let looper = session(LoopConfig::fast(), &planner, Arc::new(surface));

    let outcome = looper.run("pay", "https://shop.test/checkout").await;
    assert!(outcome.is_success(), "{}", outcome.message);

    let first = &planner.planned_on()[0];
    let unique: HashSet<&String> = first.iter().collect();
    assert_eq!(unique.len(), first.len(), "{first:?}");
    assert!(first.contains(&"main:frame1:pay".to_string()));
    assert!(first.contains(&"frame1:pay".to_string()));

    let on_main = main.query_all(main.document_handle(), "button").await.unwrap()[0];
    let on_frame = frame.query_all(frame.document_handle(), "button").await.unwrap()[0];
    assert_eq!(main.count_events(on_main, "click"), 1);
    assert_eq!(frame.count_events(on_frame, "click"), 1);
}
