use std::sync::{Arc, Mutex};

use action_primitives::ExecutorConfig;
use agent_core::{
    DomSurface, HttpPlanner, LoopConfig, Planner, PlannerConfig, PlannerError, SessionLoop,
    SessionStatus,
};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use cdp_adapter::dom::El;
use cdp_adapter::{DomPort, MemoryDom};
use pagepilot_core_types::{SessionId, Snapshot};
use serde_json::{json, Value};

#[derive(Default)]
struct Backend {
    /// next-action calls answered with a transient 502 before planning resumes.
    flaky: usize,
    iterations: usize,
    dom_payloads: Vec<Value>,
    previous: Vec<Value>,
    completed: Option<Value>,
}

type Shared = Arc<Mutex<Backend>>;

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

async fn start(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if body["goal"].as_str().unwrap_or_default().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "success": false, "error": "Goal is required" })),
        );
    }
    (StatusCode::OK, Json(json!({ "success": true, "session_id": "s-1" })))
}

async fn dom(
    State(state): State<Shared>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if id != "s-1" {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "error": "Session not found" })),
        );
    }
    let count = body["dom_data"]["elementCount"].clone();
    state.lock().unwrap().dom_payloads.push(body["dom_data"].clone());
    (
        StatusCode::OK,
        Json(json!({ "success": true, "analysis": { "elements": count } })),
    )
}

async fn next_action(
    State(state): State<Shared>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let mut backend = state.lock().unwrap();
    if backend.flaky > 0 {
        backend.flaky -= 1;
        return (
            StatusCode::BAD_GATEWAY,
            Json(json!({ "success": false, "error": "Planner error: overloaded", "transient": true })),
        );
    }
    backend.iterations += 1;
    backend.previous.push(body["previous_result"].clone());
    let plan = match backend.iterations {
        1 => json!({
            "complete": false,
            "reason": "fill the search box",
            "confidence": 0.8,
            "next_action": { "type": "type", "target_uid": "q", "value": "rust" }
        }),
        _ => json!({ "complete": true, "reason": "query entered" }),
    };
    (
        StatusCode::OK,
        Json(json!({ "success": true, "action_plan": plan, "iteration": backend.iterations })),
    )
}

async fn complete(State(state): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    state.lock().unwrap().completed = Some(body);
    Json(json!({ "success": true }))
}

async fn serve(backend: Backend) -> (String, Shared) {
    let state: Shared = Arc::new(Mutex::new(backend));
    let app = Router::new()
        .route("/health", get(health))
        .route("/session/start", post(start))
        .route("/session/:id/dom", post(dom))
        .route("/session/:id/next-action", post(next_action))
        .route("/session/:id/complete", post(complete))
        .with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), state)
}

fn search_page() -> Arc<MemoryDom> {
    let dom = MemoryDom::new("https://search.test/", "Search");
    dom.append(
        dom.body(),
        El::new("input").id("q").attr("type", "search").attr("name", "q"),
    );
    Arc::new(dom)
}

#[tokio::test]
async fn session_runs_against_planner_service() {
    let (base_url, state) = serve(Backend {
        flaky: 1,
        ..Backend::default()
    })
    .await;
    let planner = HttpPlanner::new(PlannerConfig::default().with_base_url(base_url)).unwrap();
    assert_eq!(planner.health().await.unwrap(), "healthy");

    let dom = search_page();
    let surface = DomSurface::standard(dom.clone(), ExecutorConfig::default());
    let looper = SessionLoop::new(LoopConfig::fast(), Arc::new(planner), Arc::new(surface)).unwrap();

    let outcome = looper.run("search for rust", "https://search.test/").await;

    assert_eq!(outcome.status, SessionStatus::Completed, "{}", outcome.message);
    assert_eq!(outcome.session_id, Some(SessionId("s-1".into())));
    assert_eq!(outcome.steps, 1);
    let q = dom.query_all(dom.document_handle(), "#q").await.unwrap()[0];
    assert_eq!(dom.value_of(q).as_deref(), Some("rust"));

    let backend = state.lock().unwrap();
    assert_eq!(backend.dom_payloads.len(), 1);
    assert_eq!(backend.dom_payloads[0]["elementCount"], 1);
    assert_eq!(backend.previous[0], Value::Null);
    assert_eq!(backend.previous[1]["action"], "type");
    assert!(backend.previous[1].get("snapshot").is_none());
    let completed = backend.completed.clone().unwrap();
    assert_eq!(completed["success"], true);
    assert_eq!(completed["message"], "query entered");
}

#[tokio::test]
async fn service_errors_map_to_planner_errors() {
    let (base_url, _state) = serve(Backend {
        flaky: 1,
        ..Backend::default()
    })
    .await;
    let planner = HttpPlanner::new(PlannerConfig::default().with_base_url(base_url)).unwrap();

    let err = planner.start_session("", "https://search.test/").await.unwrap_err();
    assert!(matches!(err, PlannerError::Rejected(ref m) if m.contains("Goal is required")));

    let unknown = SessionId("nope".into());
    let snapshot = Snapshot::empty("https://search.test/", "Search");
    let err = planner.submit_snapshot(&unknown, &snapshot).await.unwrap_err();
    assert!(!err.is_transient());

    let session = planner.start_session("search", "https://search.test/").await.unwrap();
    let err = planner.next_action(&session, &snapshot, None).await.unwrap_err();
    assert!(matches!(err, PlannerError::Service { status: 502, transient: true, .. }));
    assert!(err.is_transient());
    let plan = planner.next_action(&session, &snapshot, None).await.unwrap();
    assert_eq!(plan.confidence, Some(0.8));
}

#[tokio::test]
async fn unreachable_service_is_transient() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let planner = HttpPlanner::new(
        PlannerConfig::default()
            .with_base_url(format!("http://{addr}"))
            .with_timeout_ms(2_000),
    )
    .unwrap();
    let err = planner.start_session("goal", "https://search.test/").await.unwrap_err();
    assert!(err.is_transient(), "{err}");
}
