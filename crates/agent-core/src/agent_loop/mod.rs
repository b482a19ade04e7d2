//! Session loop (capture, plan, act).
//!
//! ```text
//! start session
//! while !cancelled:
//!     snapshot = capture()            // every scope, merged
//!     plan = planner.next_action()    // one retry when transient
//!     if plan.complete: Completed
//!     result = surface.perform()      // one reestablish when unreachable
//!     navigated?  settle, recapture with backoff
//!     transient?  recapture, replan (bounded)
//!     otherwise   Failed
//! ```
//!
//! - [`LoopConfig`]: step cap, settle timings, transient budget
//! - [`SessionLoop`]: the state machine, publishing [`LoopState`] on a watch channel
//! - [`SessionOutcome`]: final status plus step history

pub mod config;
pub mod controller;
pub mod types;

pub use config::LoopConfig;
pub use controller::SessionLoop;
pub use types::{LoopFailure, LoopState, SessionOutcome, SessionStatus, StepRecord};
