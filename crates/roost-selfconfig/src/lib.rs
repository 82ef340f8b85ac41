//! Self-configuration pipeline for Roost instances
//!
//! Reconciles RoostConfigRequest objects: classifies the requested
//! mutations into action categories, gates them against the parent
//! instance's allow-list (all-or-nothing), applies them under optimistic
//! concurrency, and self-deletes terminal requests after a retention
//! window.

pub mod actions;
pub mod controller;
pub mod mutate;

pub use controller::{error_policy, reconcile, ConfigContext};
