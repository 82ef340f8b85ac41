//! Desired-state builders for instance sub-resources
//!
//! Pure functions of the instance spec: no I/O, no defaulting beyond what
//! the CRD defaults already provide. The controller applies their output
//! with server-side apply, so re-running a builder is always safe.

mod config;
mod ingress;
mod network;
mod rbac;
mod storage;
mod workload;

pub use config::{build_config_map, build_workspace_map};
pub use ingress::build_ingress;
pub use network::{build_disruption_budget, build_network_policy, build_service};
pub use rbac::{build_role, build_role_binding, build_service_account};
pub use storage::build_pvc;
pub use workload::{build_workload, RUNTIME_PORT};

use std::collections::BTreeMap;

use roost_common::{INSTANCE_LABEL, LABEL_MANAGED_BY, LABEL_MANAGED_BY_ROOST};

/// Standard labels for every managed sub-resource of an instance.
pub fn instance_labels(instance: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(LABEL_MANAGED_BY.to_string(), LABEL_MANAGED_BY_ROOST.to_string());
    labels.insert(INSTANCE_LABEL.to_string(), instance.to_string());
    labels
}

/// The label selector matching an instance's pods.
pub fn selector_labels(instance: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(INSTANCE_LABEL.to_string(), instance.to_string());
    labels
}
