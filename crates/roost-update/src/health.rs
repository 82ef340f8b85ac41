//! Workload health evaluation for the post-update window
//!
//! An update is confirmed only when the Deployment has at least one ready
//! replica *and* at least one replica on the new revision. Ready-but-stale
//! pods (the old ReplicaSet still serving) must not confirm an update.

use k8s_openapi::api::apps::v1::Deployment;

/// True when the Deployment is ready on its current revision.
///
/// Requires:
/// - `status.observedGeneration == metadata.generation` (the controller
///   has seen the patched spec)
/// - `status.updatedReplicas >= 1` (a pod from the new ReplicaSet exists)
/// - `status.readyReplicas >= 1` (at least one of them is ready)
pub fn deployment_ready_on_revision(deployment: &Deployment) -> bool {
    let generation = deployment.metadata.generation;
    let Some(status) = deployment.status.as_ref() else {
        return false;
    };

    if status.observed_generation != generation {
        return false;
    }

    status.updated_replicas.unwrap_or(0) >= 1 && status.ready_replicas.unwrap_or(0) >= 1
}
