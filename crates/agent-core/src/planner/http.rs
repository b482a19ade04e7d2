use std::time::Duration;

use async_trait::async_trait;
use pagepilot_core_types::{ActionResult, SessionId, Snapshot};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{ActionPlan, Planner};
use crate::errors::PlannerError;

/// Where the planner service lives and how long to wait for it.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Default: http://127.0.0.1:5000
    pub base_url: String,
    /// Per-request deadline. Planning calls can be slow.
    /// Default: 30000
    pub timeout_ms: u64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            timeout_ms: 30_000,
        }
    }
}

impl PlannerConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

/// Client for the planner service's JSON protocol.
pub struct HttpPlanner {
    client: Client,
    config: PlannerConfig,
}

impl HttpPlanner {
    pub fn new(config: PlannerConfig) -> Result<Self, PlannerError> {
        url::Url::parse(&config.base_url)
            .map_err(|err| PlannerError::Rejected(format!("bad planner url {}: {err}", config.base_url)))?;
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|err| PlannerError::Transport(format!("failed to build HTTP client: {err}")))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// `GET /health`; returns the reported status string.
    pub async fn health(&self) -> Result<String, PlannerError> {
        let response = self.client.get(self.endpoint("health")).send().await?;
        let body = read_body(response).await?;
        Ok(body
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string())
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, PlannerError> {
        debug!(target: "planner", path, "planner request");
        let response = self
            .client
            .post(self.endpoint(path))
            .json(body)
            .send()
            .await?;
        read_body(response).await
    }
}

#[async_trait]
impl Planner for HttpPlanner {
    async fn start_session(&self, goal: &str, url: &str) -> Result<SessionId, PlannerError> {
        let body = self
            .post("session/start", &json!({ "goal": goal, "url": url }))
            .await?;
        let id = body
            .get("session_id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| PlannerError::Decode("start response without session_id".into()))?;
        Ok(SessionId(id.to_string()))
    }

    async fn submit_snapshot(
        &self,
        session: &SessionId,
        snapshot: &Snapshot,
    ) -> Result<Value, PlannerError> {
        let body = self
            .post(
                &format!("session/{session}/dom"),
                &json!({ "dom_data": dom_data(snapshot)? }),
            )
            .await?;
        Ok(body.get("analysis").cloned().unwrap_or(Value::Null))
    }

    async fn next_action(
        &self,
        session: &SessionId,
        snapshot: &Snapshot,
        previous: Option<&ActionResult>,
    ) -> Result<ActionPlan, PlannerError> {
        let previous = previous.map(previous_result).transpose()?;
        let mut body = self
            .post(
                &format!("session/{session}/next-action"),
                &json!({ "dom_data": dom_data(snapshot)?, "previous_result": previous }),
            )
            .await?;
        if let Some(iteration) = body.get("iteration").and_then(Value::as_u64) {
            debug!(target: "planner", %session, iteration, "plan received");
        }
        match body.get_mut("action_plan").map(Value::take) {
            None | Some(Value::Null) => Ok(ActionPlan::default()),
            Some(plan) => serde_json::from_value(plan)
                .map_err(|err| PlannerError::Decode(format!("action_plan: {err}"))),
        }
    }

    async fn complete(
        &self,
        session: &SessionId,
        success: bool,
        message: &str,
    ) -> Result<(), PlannerError> {
        self.post(
            &format!("session/{session}/complete"),
            &json!({ "success": success, "message": message }),
        )
        .await?;
        Ok(())
    }
}

/// Snapshot JSON as the service expects it, with the element count alongside.
fn dom_data(snapshot: &Snapshot) -> Result<Value, PlannerError> {
    let mut value =
        serde_json::to_value(snapshot).map_err(|err| PlannerError::Decode(err.to_string()))?;
    if let Value::Object(map) = &mut value {
        map.insert("elementCount".into(), json!(snapshot.len()));
    }
    Ok(value)
}

/// The previous result without its embedded snapshot; the fresh one travels as `dom_data`.
fn previous_result(result: &ActionResult) -> Result<Value, PlannerError> {
    let mut stripped = result.clone();
    stripped.snapshot = None;
    serde_json::to_value(stripped).map_err(|err| PlannerError::Decode(err.to_string()))
}

async fn read_body(response: reqwest::Response) -> Result<Value, PlannerError> {
    let status = response.status();
    let text = response.text().await?;
    let body: Option<Value> = serde_json::from_str(&text).ok();
    let message = body
        .as_ref()
        .and_then(|b| b.get("error"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| text.clone());
    let transient = body
        .as_ref()
        .and_then(|b| b.get("transient"))
        .and_then(Value::as_bool)
        .unwrap_or(false);

    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        warn!(target: "planner", status = status.as_u16(), %message, transient, "planner service error");
        return Err(PlannerError::Service {
            status: status.as_u16(),
            message,
            transient: transient || status == StatusCode::TOO_MANY_REQUESTS,
        });
    }
    if status.is_client_error() {
        return Err(PlannerError::Rejected(format!("{status}: {message}")));
    }

    let body = body.ok_or_else(|| PlannerError::Decode(format!("not JSON: {text}")))?;
    if body.get("success").and_then(Value::as_bool) == Some(false) {
        warn!(target: "planner", %message, transient, "planner reported failure");
        return Err(PlannerError::Service {
            status: status.as_u16(),
            message,
            transient,
        });
    }
    Ok(body)
}
