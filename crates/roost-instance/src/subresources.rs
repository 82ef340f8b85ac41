//! Fixed-order sub-resource reconciliation
//!
//! Later steps read identifiers produced by earlier ones, and storage must
//! exist before the workload can mount it, so the order is fixed:
//! permissions → network policy → configuration → workspace seed →
//! storage claim → restore → disruption budget → legacy migration →
//! workload → service → ingress → metrics integration.
//!
//! Everything is applied with server-side apply under one field manager,
//! so re-running the whole pipeline is free of side effects beyond the
//! first successful attempt.

use std::collections::BTreeMap;
use std::fmt::Debug;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, DynamicObject, Patch, PatchParams};
use kube::discovery::ApiResource;
use kube::runtime::events::EventType;
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use roost_backup::{JobOutcome, TransferPurpose};
use roost_common::crd::{InstancePhase, RoostInstance};
use roost_common::events::{actions, reasons};
use roost_common::{names, Error, Result, StepOutcome, LABEL_MANAGED_BY, LABEL_MANAGED_BY_ROOST};

use crate::controller::InstanceContext;
use crate::templates;

/// Field manager for the phase controller's applies
const FIELD_MANAGER: &str = "roost-instance-controller";

/// Cache of discovered API versions for third-party CRDs.
///
/// At operator startup we check which optional CRDs are installed. A
/// missing CRD is `None`, and resources of that type are skipped with a
/// debug log rather than failing the instance.
pub struct DiscoveredCrds {
    /// monitoring.coreos.com ServiceMonitor, when the CRD is installed
    pub service_monitor: Option<ApiResource>,
}

impl DiscoveredCrds {
    /// Discover installed CRD versions from the API server.
    pub async fn discover(client: &Client) -> Self {
        use kube::discovery::Discovery;

        let discovery = match Discovery::new(client.clone()).run().await {
            Ok(d) => d,
            Err(e) => {
                warn!(error = %e, "API discovery failed, optional integrations disabled");
                return Self::none();
            }
        };

        let mut service_monitor = None;
        for api_group in discovery.groups() {
            if api_group.name() != "monitoring.coreos.com" {
                continue;
            }
            for (ar, _caps) in api_group.recommended_resources() {
                if ar.kind == "ServiceMonitor" {
                    service_monitor = Some(ar.clone());
                }
            }
        }
        Self { service_monitor }
    }

    /// No optional CRDs available (also the test default).
    pub fn none() -> Self {
        Self {
            service_monitor: None,
        }
    }
}

/// Apply one namespaced object with server-side apply.
async fn apply<K>(client: &Client, namespace: &str, name: &str, obj: &K) -> Result<()>
where
    K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Serialize + Debug,
    K::DynamicType: Default,
{
    let api: Api<K> = Api::namespaced(client.clone(), namespace);
    api.patch(
        name,
        &PatchParams::apply(FIELD_MANAGER).force(),
        &Patch::Apply(obj),
    )
    .await?;
    Ok(())
}

/// Run the fixed-order pipeline. Returns `RetryAfter` while a multi-tick
/// step (the create-time restore) is still in flight.
pub async fn reconcile_subresources(
    ctx: &InstanceContext,
    instance: &RoostInstance,
    name: &str,
    namespace: &str,
    replicas: i32,
) -> Result<StepOutcome> {
    let client = &ctx.client;
    let mut index: BTreeMap<String, String> = BTreeMap::new();

    // 1. Permissions
    apply(client, namespace, &names::service_account(name), &templates::build_service_account(name, namespace)).await?;
    apply(client, namespace, &names::role(name), &templates::build_role(name, namespace)).await?;
    apply(client, namespace, &names::role_binding(name), &templates::build_role_binding(name, namespace)).await?;
    index.insert("ServiceAccount".to_string(), names::service_account(name));

    // 2. Network policy
    apply(client, namespace, &names::network_policy(name), &templates::build_network_policy(name, namespace)).await?;
    index.insert("NetworkPolicy".to_string(), names::network_policy(name));

    // 3. Configuration
    apply(client, namespace, &names::config_map(name), &templates::build_config_map(instance, name, namespace)).await?;
    index.insert("ConfigMap".to_string(), names::config_map(name));

    // 4. Workspace seed
    apply(client, namespace, &names::workspace_map(name), &templates::build_workspace_map(instance, name, namespace)).await?;
    index.insert("WorkspaceConfigMap".to_string(), names::workspace_map(name));

    // 5. Storage claim
    if let Some(persistence) = instance.spec.persistence.as_ref().filter(|p| p.enabled) {
        apply(client, namespace, &names::pvc(name), &templates::build_pvc(persistence, name, namespace)).await?;
        index.insert("PersistentVolumeClaim".to_string(), names::pvc(name));
    }

    // 6. Create-time restore: an expected multi-tick wait, not an error
    if let StepOutcome::RetryAfter(d) = step_seed_restore(ctx, instance, name, namespace).await? {
        return Ok(StepOutcome::RetryAfter(d));
    }

    // 7. Disruption budget
    apply(client, namespace, &names::disruption_budget(name), &templates::build_disruption_budget(name, namespace)).await?;
    index.insert("PodDisruptionBudget".to_string(), names::disruption_budget(name));

    // 8. Legacy-resource migration
    migrate_legacy_workload(client, name, namespace).await?;

    // 9. The workload itself
    apply(client, namespace, &names::workload(name), &templates::build_workload(instance, name, namespace, replicas)).await?;
    index.insert("Deployment".to_string(), names::workload(name));

    // 10. Network service
    apply(client, namespace, &names::service(name), &templates::build_service(name, namespace)).await?;
    index.insert("Service".to_string(), names::service(name));

    // 11. Ingress
    if let Some(ingress) = &instance.spec.ingress {
        apply(client, namespace, &names::ingress(name), &templates::build_ingress(ingress, name, namespace)).await?;
        index.insert("Ingress".to_string(), names::ingress(name));
    }

    // 12. Metrics integration
    if apply_service_monitor(ctx, name, namespace).await? {
        index.insert("ServiceMonitor".to_string(), names::service_monitor(name));
    }

    // Record the managed-resource index so clients can find what we own.
    // Merge patch merges map keys, so optional kinds that are gone this
    // pass are deleted with explicit nulls rather than left stale.
    let mut index_patch = serde_json::Map::new();
    for kind in [
        "ServiceAccount",
        "NetworkPolicy",
        "ConfigMap",
        "WorkspaceConfigMap",
        "PersistentVolumeClaim",
        "PodDisruptionBudget",
        "Deployment",
        "Service",
        "Ingress",
        "ServiceMonitor",
    ] {
        index_patch.insert(
            kind.to_string(),
            index
                .get(kind)
                .map(|n| serde_json::Value::String(n.clone()))
                .unwrap_or(serde_json::Value::Null),
        );
    }
    let patch = serde_json::json!({ "status": { "resources": index_patch } });
    let api: Api<RoostInstance> = Api::namespaced(client.clone(), namespace);
    api.patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
        .await?;

    Ok(StepOutcome::Continue)
}

/// Create-time restore from a declared snapshot.
///
/// Runs once per instance: `status.restoredFrom` records completion. While
/// the job is in flight the instance short-circuits in Phase=Restoring.
async fn step_seed_restore(
    ctx: &InstanceContext,
    instance: &RoostInstance,
    name: &str,
    namespace: &str,
) -> Result<StepOutcome> {
    let Some(path) = instance.spec.restore_from.clone() else {
        return Ok(StepOutcome::Continue);
    };
    let status = instance.status_or_default();
    if status.restored_from.is_some() {
        return Ok(StepOutcome::Continue);
    }
    if !instance.spec.persistence_enabled() {
        debug!("restoreFrom declared without persistence, nothing to seed");
        return Ok(StepOutcome::Continue);
    }

    let job_name = TransferPurpose::SeedRestore.job_name(name);
    if instance.phase() != InstancePhase::Restoring {
        let patch = serde_json::json!({ "status": {
            "phase": InstancePhase::Restoring,
            "message": format!("restoring volume from {}", path),
            "restoreJob": job_name,
        }});
        let api: Api<RoostInstance> = Api::namespaced(ctx.client.clone(), namespace);
        api.patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await?;
        ctx.events
            .publish(
                &instance.object_ref(&()),
                EventType::Normal,
                reasons::RESTORE_STARTED,
                actions::TRANSFER,
                Some(format!("seeding volume from {}", path)),
            )
            .await;
    }

    // Single-writer storage: quiesce any existing workload first.
    if let StepOutcome::RetryAfter(d) = quiesce_workload(ctx, name, namespace).await? {
        return Ok(StepOutcome::RetryAfter(d));
    }

    match ctx
        .transfers
        .ensure(instance, TransferPurpose::SeedRestore, &path)
        .await?
    {
        JobOutcome::InProgress => Ok(StepOutcome::retry_secs(15)),
        JobOutcome::Failed(msg) => {
            ctx.events
                .publish(
                    &instance.object_ref(&()),
                    EventType::Warning,
                    reasons::RESTORE_FAILED,
                    actions::TRANSFER,
                    Some(msg.clone()),
                )
                .await;
            // Drop the failed job so the retry after backoff starts fresh.
            if let Err(e) = ctx.transfers.remove(instance, TransferPurpose::SeedRestore).await {
                warn!(error = %e, "failed to delete failed restore job");
            }
            Err(Error::job(name, job_name, msg))
        }
        JobOutcome::Succeeded => {
            info!(path = %path, "seed restore complete");
            let patch = serde_json::json!({ "status": {
                "restoredFrom": path,
                "restoreJob": null,
            }});
            let api: Api<RoostInstance> = Api::namespaced(ctx.client.clone(), namespace);
            api.patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
                .await?;
            ctx.events
                .publish(
                    &instance.object_ref(&()),
                    EventType::Normal,
                    reasons::RESTORE_COMPLETE,
                    actions::TRANSFER,
                    Some(format!("volume seeded from {}", path)),
                )
                .await;
            if let Err(e) = ctx.transfers.remove(instance, TransferPurpose::SeedRestore).await {
                warn!(error = %e, "failed to clean up completed restore job");
            }
            Ok(StepOutcome::Continue)
        }
    }
}

/// Scale the workload to zero and wait for its pods to drain. A missing
/// Deployment counts as drained (first provisioning).
pub async fn quiesce_workload(
    ctx: &InstanceContext,
    name: &str,
    namespace: &str,
) -> Result<StepOutcome> {
    match ctx.workloads.scale(name, namespace, 0).await {
        Ok(()) => {}
        Err(e) if e.is_not_found() => return Ok(StepOutcome::Continue),
        Err(e) => return Err(e),
    }
    let running = ctx.workloads.running_pods(name, namespace).await?;
    if running > 0 {
        debug!(running, "waiting for workload to drain");
        return Ok(StepOutcome::retry_secs(10));
    }
    Ok(StepOutcome::Continue)
}

/// The pre-workspace releases named the Deployment after the instance
/// itself. Delete such a Deployment (when it carries our managed-by
/// label) before applying the current one, so two Deployments never mount
/// one volume.
async fn migrate_legacy_workload(client: &Client, name: &str, namespace: &str) -> Result<()> {
    let api: Api<Deployment> = Api::namespaced(client.clone(), namespace);
    let Some(legacy) = api.get_opt(name).await? else {
        return Ok(());
    };
    let ours = legacy
        .metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(LABEL_MANAGED_BY))
        .map(|v| v == LABEL_MANAGED_BY_ROOST)
        .unwrap_or(false);
    if !ours {
        debug!(deployment = %name, "legacy-named deployment not managed by us, leaving it");
        return Ok(());
    }

    info!(deployment = %name, "deleting legacy workload naming");
    match api.delete(name, &Default::default()).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Apply the ServiceMonitor when the CRD is installed. Returns whether one
/// was applied.
async fn apply_service_monitor(
    ctx: &InstanceContext,
    name: &str,
    namespace: &str,
) -> Result<bool> {
    let Some(ar) = &ctx.discovered.service_monitor else {
        debug!("ServiceMonitor CRD not installed, skipping metrics integration");
        return Ok(false);
    };

    let monitor_name = names::service_monitor(name);
    let obj: DynamicObject = serde_json::from_value(serde_json::json!({
        "apiVersion": format!("{}/{}", ar.group, ar.version),
        "kind": "ServiceMonitor",
        "metadata": {
            "name": monitor_name,
            "namespace": namespace,
            "labels": templates::instance_labels(name),
        },
        "spec": {
            "selector": { "matchLabels": templates::selector_labels(name) },
            "endpoints": [{ "port": "http", "path": "/metrics" }],
        }
    }))
    .map_err(|e| Error::serialization_for_kind("ServiceMonitor", e.to_string()))?;

    let api: Api<DynamicObject> = Api::namespaced_with(ctx.client.clone(), namespace, ar);
    api.patch(
        &monitor_name,
        &PatchParams::apply(FIELD_MANAGER).force(),
        &Patch::Apply(&obj),
    )
    .await?;
    Ok(true)
}
