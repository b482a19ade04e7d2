//! Structural perception: turns the reachable DOM into a [`Snapshot`] of
//! actionable elements plus the locators needed to find each one again.
//!
//! [`Snapshot`]: pagepilot_core_types::Snapshot

pub mod api;
pub mod cache;
pub mod catalog;
pub mod errors;
pub mod identity;
pub mod judges;
pub mod listeners;
pub mod model;
pub mod naming;
pub mod policy;
pub mod structural;

pub use api::SnapshotExtractor;
pub use errors::PerceiverError;
pub use listeners::ListenerRegistry;
pub use model::Capture;
pub use policy::CaptureOptions;
pub use structural::StructuralExtractor;
