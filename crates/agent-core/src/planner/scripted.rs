use std::collections::VecDeque;
use std::path::Path;

use async_trait::async_trait;
use pagepilot_core_types::{ActionResult, SessionId, Snapshot};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ActionPlan, Planner};
use crate::errors::PlannerError;

/// One entry of a replay script.
#[derive(Clone, Debug)]
pub enum ScriptStep {
    Plan(ActionPlan),
    /// Answer the call with this error instead of a plan.
    Fail(PlannerError),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ScriptFile {
    Wrapped { plans: Vec<ActionPlan> },
    Bare(Vec<ActionPlan>),
}

#[derive(Default)]
struct Recorded {
    goal: Option<String>,
    snapshots_submitted: usize,
    previous: Vec<Option<ActionResult>>,
    planned_on: Vec<Vec<String>>,
    completion: Option<(bool, String)>,
}

/// Replays a fixed list of plans.
///
/// When the script runs out the planner reports completion, unless it was
/// built with [`ScriptedPlanner::cycling`], in which case it starts over.
pub struct ScriptedPlanner {
    script: Vec<ScriptStep>,
    queue: Mutex<VecDeque<ScriptStep>>,
    cycle: bool,
    recorded: Mutex<Recorded>,
}

impl ScriptedPlanner {
    pub fn new(plans: Vec<ActionPlan>) -> Self {
        Self::from_steps(plans.into_iter().map(ScriptStep::Plan).collect())
    }

    pub fn from_steps(steps: Vec<ScriptStep>) -> Self {
        Self {
            queue: Mutex::new(steps.iter().cloned().collect()),
            script: steps,
            cycle: false,
            recorded: Mutex::new(Recorded::default()),
        }
    }

    /// Parse a YAML script: either a bare list of plans or `plans: [...]`.
    pub fn from_yaml(source: &str) -> Result<Self, PlannerError> {
        let file: ScriptFile = serde_yaml::from_str(source)
            .map_err(|err| PlannerError::Script(format!("invalid plan script: {err}")))?;
        let plans = match file {
            ScriptFile::Wrapped { plans } | ScriptFile::Bare(plans) => plans,
        };
        Ok(Self::new(plans))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, PlannerError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|err| PlannerError::Script(format!("{}: {err}", path.display())))?;
        Self::from_yaml(&source)
    }

    /// Restart the script instead of completing when it runs out.
    pub fn cycling(mut self) -> Self {
        self.cycle = true;
        self
    }

    /// Previous results handed to each `next_action` call, in order.
    pub fn previous_results(&self) -> Vec<Option<ActionResult>> {
        self.recorded.lock().previous.clone()
    }

    /// uids of the snapshot handed to each `next_action` call.
    pub fn planned_on(&self) -> Vec<Vec<String>> {
        self.recorded.lock().planned_on.clone()
    }

    pub fn calls(&self) -> usize {
        self.recorded.lock().previous.len()
    }

    pub fn snapshots_submitted(&self) -> usize {
        self.recorded.lock().snapshots_submitted
    }

    pub fn goal(&self) -> Option<String> {
        self.recorded.lock().goal.clone()
    }

    pub fn completion(&self) -> Option<(bool, String)> {
        self.recorded.lock().completion.clone()
    }

    fn next_step(&self) -> Option<ScriptStep> {
        let mut queue = self.queue.lock();
        if queue.is_empty() && self.cycle {
            queue.extend(self.script.iter().cloned());
        }
        queue.pop_front()
    }
}

#[async_trait]
impl Planner for ScriptedPlanner {
    async fn start_session(&self, goal: &str, _url: &str) -> Result<SessionId, PlannerError> {
        self.recorded.lock().goal = Some(goal.to_string());
        Ok(SessionId::new())
    }

    async fn submit_snapshot(
        &self,
        _session: &SessionId,
        snapshot: &Snapshot,
    ) -> Result<Value, PlannerError> {
        self.recorded.lock().snapshots_submitted += 1;
        Ok(json!({ "elementCount": snapshot.len(), "scripted": true }))
    }

    async fn next_action(
        &self,
        _session: &SessionId,
        snapshot: &Snapshot,
        previous: Option<&ActionResult>,
    ) -> Result<ActionPlan, PlannerError> {
        {
            let mut recorded = self.recorded.lock();
            recorded.previous.push(previous.cloned());
            recorded
                .planned_on
                .push(snapshot.elements.iter().map(|e| e.uid.clone()).collect());
        }
        match self.next_step() {
            Some(ScriptStep::Plan(plan)) => Ok(plan),
            Some(ScriptStep::Fail(err)) => Err(err),
            None => Ok(ActionPlan::done("script finished")),
        }
    }

    async fn complete(
        &self,
        _session: &SessionId,
        success: bool,
        message: &str,
    ) -> Result<(), PlannerError> {
        self.recorded.lock().completion = Some((success, message.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagepilot_core_types::ActionKind;

    #[tokio::test]
    async fn yaml_script_replays_then_completes() {
        let planner = ScriptedPlanner::from_yaml(
            r#"
plans:
  - next_action: { type: click, target_uid: login }
    reason: open the form
  - next_action: { type: type, target_uid: user, value: ada }
"#,
        )
        .unwrap();
        let session = planner.start_session("log in", "https://example.com").await.unwrap();
        let snapshot = Snapshot::empty("https://example.com", "");

        let first = planner.next_action(&session, &snapshot, None).await.unwrap();
        assert_eq!(first.next_action.unwrap().kind, ActionKind::Click);
        let second = planner.next_action(&session, &snapshot, None).await.unwrap();
        assert_eq!(second.next_action.unwrap().value.as_deref(), Some("ada"));
        assert!(planner.next_action(&session, &snapshot, None).await.unwrap().complete);
        assert_eq!(planner.goal().as_deref(), Some("log in"));
    }

    #[test]
    fn bare_list_is_accepted() {
        let planner = ScriptedPlanner::from_yaml("- complete: true\n  reason: nothing to do\n").unwrap();
        assert_eq!(planner.script.len(), 1);
        assert!(ScriptedPlanner::from_yaml("plans: 3").is_err());
    }

    #[test]
    fn script_loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.yaml");
        std::fs::write(&path, "- next_action: { type: scroll, value: down }\n").unwrap();
        let planner = ScriptedPlanner::from_path(&path).unwrap();
        assert_eq!(planner.script.len(), 1);

        let err = ScriptedPlanner::from_path(dir.path().join("missing.yaml")).err().unwrap();
        assert!(matches!(err, PlannerError::Script(ref m) if m.contains("missing.yaml")));
    }

    #[tokio::test]
    async fn cycling_never_completes() {
        let planner = ScriptedPlanner::new(vec![ActionPlan::act(
            pagepilot_core_types::ActionDescriptor::new(ActionKind::Wait),
        )])
        .cycling();
        let session = SessionId::new();
        let snapshot = Snapshot::empty("about:blank", "");
        for _ in 0..5 {
            let plan = planner.next_action(&session, &snapshot, None).await.unwrap();
            assert!(!plan.complete);
        }
        assert_eq!(planner.calls(), 5);
    }
}
