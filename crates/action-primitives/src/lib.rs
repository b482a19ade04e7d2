//! Action execution for PagePilot
//!
//! Turns planner [`ActionDescriptor`]s into synthesized page interactions:
//! - a closed [`Action`] catalog validated from the wire form
//! - target resolution through the element registry, with retry
//! - typed failures returned inside [`ActionResult`], never thrown
//! - a fresh snapshot and banner scan after every non-navigating action
//!
//! [`ActionDescriptor`]: pagepilot_core_types::ActionDescriptor
//! [`ActionResult`]: pagepilot_core_types::ActionResult

pub mod banners;
pub mod choose;
pub mod errors;
pub mod insertion;
pub mod keys;
mod primitives;
pub mod types;
pub mod waiting;

pub use banners::Banners;
pub use errors::ActionError;
pub use insertion::TextInsertion;
pub use primitives::*;
pub use types::{Action, ExecutorConfig, ScrollTarget, UrlMatch};
