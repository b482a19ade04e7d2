//! Element registry and resolution.
//!
//! Snapshot uids are bound to a [`LocatorSet`](pagepilot_core_types::LocatorSet)
//! rather than to a live node. Resolution re-finds the element through a
//! fallback chain:
//! - CSS selector (must match exactly one live element)
//! - structural XPath
//! - attribute fingerprint
//! - text within the recorded tag

pub mod errors;
pub mod registry;
pub mod resolver;
pub mod strategies;
pub mod types;

pub use errors::LocatorError;
pub use registry::{ElementRegistry, NoRefresh, RefreshHook};
pub use resolver::Resolver;
pub use strategies::{is_live, Strategy};
pub use types::{
    LocatorConfig, LocatorStrategy, RegistryEntry, Resolution, ResolveOutcome, RetrySchedule,
};
