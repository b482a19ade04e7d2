//! Session orchestration for PagePilot.
//!
//! Ties the snapshot extractor, element registry and action executor into a
//! bounded capture-plan-act loop, with the planner behind the [`Planner`]
//! trait and the page behind [`AutomationSurface`].

pub mod agent_loop;
pub mod errors;
pub mod planner;
pub mod surface;

pub use agent_loop::{
    LoopConfig, LoopFailure, LoopState, SessionLoop, SessionOutcome, SessionStatus, StepRecord,
};
pub use errors::{AgentError, PlannerError};
pub use planner::{ActionPlan, HttpPlanner, Planner, PlannerConfig, ScriptStep, ScriptedPlanner};
pub use surface::{scoped_uid, split_scoped_uid, standard_executor, AutomationSurface, DomSurface};
