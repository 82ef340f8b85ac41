//! Phase controller for Roost instances
//!
//! Owns the instance's top-level lifecycle phase, reconciles all
//! declarative sub-resources in dependency order, and delegates to the
//! update engine and the backup/restore flows.

pub mod controller;
pub mod subresources;
pub mod templates;

pub use controller::{error_policy, reconcile, InstanceContext};
pub use subresources::DiscoveredCrds;
