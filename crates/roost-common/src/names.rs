//! Canonical names for managed sub-resources
//!
//! Every crate that touches a sub-resource derives its name from here, so
//! the status resource index, the template builders, and the data-mover
//! jobs always agree.

/// Deployment running the instance
pub fn workload(instance: &str) -> String {
    format!("{}-runtime", instance)
}

/// ClusterIP Service in front of the workload
pub fn service(instance: &str) -> String {
    format!("{}-svc", instance)
}

/// Ingress exposing the Service
pub fn ingress(instance: &str) -> String {
    format!("{}-ingress", instance)
}

/// PVC holding the instance's durable data
pub fn pvc(instance: &str) -> String {
    format!("{}-data", instance)
}

/// ConfigMap carrying the configuration document and skill list
pub fn config_map(instance: &str) -> String {
    format!("{}-config", instance)
}

/// ConfigMap carrying seed workspace files
pub fn workspace_map(instance: &str) -> String {
    format!("{}-workspace", instance)
}

/// ServiceAccount the workload runs as
pub fn service_account(instance: &str) -> String {
    format!("{}-sa", instance)
}

/// Role granting the runtime its namespace-local permissions
pub fn role(instance: &str) -> String {
    format!("{}-role", instance)
}

/// RoleBinding attaching the Role to the ServiceAccount
pub fn role_binding(instance: &str) -> String {
    format!("{}-rolebinding", instance)
}

/// NetworkPolicy restricting instance traffic
pub fn network_policy(instance: &str) -> String {
    format!("{}-netpol", instance)
}

/// PodDisruptionBudget for the workload
pub fn disruption_budget(instance: &str) -> String {
    format!("{}-pdb", instance)
}

/// ServiceMonitor for metrics scraping
pub fn service_monitor(instance: &str) -> String {
    format!("{}-metrics", instance)
}
