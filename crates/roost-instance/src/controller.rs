//! RoostInstance controller implementation
//!
//! The top-level phase state machine:
//! Pending → Provisioning → Running ⇄ Updating ⇄ Failed, with Terminating,
//! BackingUp, and Restoring excursions. Reconciliation is level-triggered
//! and every step is safe to re-run; all state lives in the status
//! subresource.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Client, Resource, ResourceExt};
use opentelemetry::KeyValue;
use tracing::{debug, error, info, instrument, warn};

use roost_backup::{paths, JobOutcome, TransferPurpose};
use roost_common::credentials::BackupCredentials;
use roost_common::crd::{
    condition_types, Condition, ConditionStatus, InstancePhase, RoostInstance, UpdatePhase,
};
use roost_common::events::{actions, reasons, EventPublisher, KubeEventPublisher};
use roost_common::metrics::{RECONCILE_DURATION, RECONCILE_TOTAL, TRANSFERS_TOTAL};
use roost_common::{Error, Result, StepOutcome, INSTANCE_FINALIZER, SKIP_FINAL_BACKUP_ANNOTATION};
use roost_update::context::{
    TransferRunner, TransferRunnerImpl, UpdateContext, WorkloadClient, WorkloadClientImpl,
};
use roost_update::{run_update, EngineVerdict};

use crate::subresources::{self, DiscoveredCrds};

/// Field manager for the phase controller's writes
const FIELD_MANAGER: &str = "roost-instance-controller";

/// Requeue for a healthy instance: the steady-state drift check
const STEADY_STATE_REQUEUE: Duration = Duration::from_secs(300);
/// Requeue after a first failure
const FAILURE_REQUEUE: Duration = Duration::from_secs(30);
/// Requeue while already Failed, to avoid hot-looping a broken instance
const REPEAT_FAILURE_REQUEUE: Duration = Duration::from_secs(120);

/// Controller context containing shared state and clients
pub struct InstanceContext {
    /// Kubernetes client for API operations
    pub client: Client,
    /// Kubernetes Event publisher
    pub events: Arc<dyn EventPublisher>,
    /// Workload scale and readiness operations
    pub workloads: Arc<dyn WorkloadClient>,
    /// Data-mover protocol
    pub transfers: Arc<dyn TransferRunner>,
    /// Update engine collaborators
    pub update: Arc<UpdateContext>,
    /// Optional third-party CRDs discovered at startup
    pub discovered: Arc<DiscoveredCrds>,
}

impl InstanceContext {
    /// Create a production context, running CRD discovery once.
    pub async fn new(client: Client, data_mover_image: String) -> Self {
        let discovered = Arc::new(DiscoveredCrds::discover(&client).await);
        let update = Arc::new(
            UpdateContext::builder(client.clone())
                .data_mover_image(data_mover_image.clone())
                .build(),
        );
        Self {
            events: Arc::new(KubeEventPublisher::new(
                client.clone(),
                "roost-instance-controller",
            )),
            workloads: Arc::new(WorkloadClientImpl::new(client.clone())),
            transfers: Arc::new(TransferRunnerImpl::new(client.clone(), data_mover_image)),
            update,
            discovered,
            client,
        }
    }
}

/// Error policy for the controller: log and requeue.
pub fn error_policy(instance: Arc<RoostInstance>, error: &Error, _ctx: Arc<InstanceContext>) -> Action {
    error!(
        ?error,
        instance = %instance.name_any(),
        "instance reconciliation failed"
    );
    Action::requeue(FAILURE_REQUEUE)
}

/// Reconcile a RoostInstance.
#[instrument(skip(instance, ctx), fields(instance = %instance.name_any()))]
pub async fn reconcile(instance: Arc<RoostInstance>, ctx: Arc<InstanceContext>) -> Result<Action> {
    let start = std::time::Instant::now();
    let result = reconcile_inner(&instance, &ctx).await;
    let outcome = if result.is_ok() { "success" } else { "error" };
    RECONCILE_DURATION.record(
        start.elapsed().as_secs_f64(),
        &[KeyValue::new("result", outcome)],
    );
    RECONCILE_TOTAL.add(
        1,
        &[
            KeyValue::new("controller", "instance"),
            KeyValue::new("result", outcome),
        ],
    );

    match result {
        Ok(action) => Ok(action),
        Err(e) => {
            // Deletion errors keep the finalizer and retry without phase
            // gymnastics; everything else surfaces as Failed.
            if instance.metadata.deletion_timestamp.is_some() {
                warn!(error = %e, "deletion step failed, retrying");
                return Ok(Action::requeue(FAILURE_REQUEUE));
            }
            mark_failed(&instance, &ctx, &e).await
        }
    }
}

async fn reconcile_inner(instance: &RoostInstance, ctx: &InstanceContext) -> Result<Action> {
    let name = instance.name_any();
    let namespace = instance
        .namespace()
        .ok_or_else(|| Error::validation("RoostInstance must be namespaced"))?;

    // Deletion runs the delete-with-backup protocol before anything else.
    if instance.metadata.deletion_timestamp.is_some() {
        return handle_deletion(instance, ctx, &name, &namespace).await;
    }

    // The deletion guard is attached before any other processing.
    if !has_finalizer(instance) {
        debug!("attaching deletion guard");
        add_finalizer(&ctx.client, &name, &namespace).await?;
        return Ok(Action::requeue(Duration::from_secs(1)));
    }

    // First sight: initialize the phase, one pass, then re-trigger.
    if instance.status.is_none() {
        patch_status(
            &ctx.client,
            &name,
            &namespace,
            serde_json::json!({ "status": { "phase": InstancePhase::Pending } }),
        )
        .await?;
        return Ok(Action::requeue(Duration::from_secs(1)));
    }

    if let Err(e) = instance.spec.validate() {
        warn!(error = %e, "instance validation failed");
        patch_status(
            &ctx.client,
            &name,
            &namespace,
            serde_json::json!({ "status": {
                "phase": InstancePhase::Failed,
                "message": e.to_string(),
            }}),
        )
        .await?;
        // Validation errors require a spec change; don't requeue.
        return Ok(Action::await_change());
    }

    if instance.phase() == InstancePhase::Pending {
        patch_status(
            &ctx.client,
            &name,
            &namespace,
            serde_json::json!({ "status": {
                "phase": InstancePhase::Provisioning,
                "message": "creating instance sub-resources",
            }}),
        )
        .await?;
        return Ok(Action::requeue(Duration::from_secs(1)));
    }

    // Converge declarative sub-resources in dependency order. A transfer
    // in flight needs the single-writer volume quiesced, so the desired
    // replica count follows the open flows.
    let replicas = desired_replicas(instance);
    if let StepOutcome::RetryAfter(d) =
        subresources::reconcile_subresources(ctx, instance, &name, &namespace, replicas).await?
    {
        return Ok(Action::requeue(d));
    }

    // Delegate to the update engine; while a cycle is open it owns the
    // phase for this and following reconciles.
    match run_update(instance, &ctx.update).await? {
        EngineVerdict::InProgress(d) => return Ok(Action::requeue(d)),
        EngineVerdict::Idle => {}
    }

    // Scheduled periodic backup, in steady state only.
    if let StepOutcome::RetryAfter(d) = step_periodic_backup(instance, ctx, &name, &namespace).await? {
        return Ok(Action::requeue(d));
    }

    mark_running(instance, ctx, &name, &namespace).await?;
    Ok(Action::requeue(STEADY_STATE_REQUEUE))
}

/// The single-writer volume must be quiesced while any data-mover flow is
/// open; the workload template takes its replica count from here.
fn desired_replicas(instance: &RoostInstance) -> i32 {
    let status = instance.status_or_default();
    let update_quiesced = matches!(
        status.update.phase,
        Some(UpdatePhase::BackingUp) | Some(UpdatePhase::RollingBack)
    );
    let periodic_in_flight = status.last_backup_job.is_some();
    let restoring = instance.spec.restore_from.is_some()
        && status.restored_from.is_none()
        && instance.spec.persistence_enabled();

    if update_quiesced || periodic_in_flight || restoring {
        0
    } else {
        1
    }
}

async fn mark_running(
    instance: &RoostInstance,
    ctx: &InstanceContext,
    name: &str,
    namespace: &str,
) -> Result<()> {
    let mut status = instance.status_or_default();
    let was_ready = status
        .get_condition(condition_types::READY)
        .map(|c| c.status == ConditionStatus::True)
        .unwrap_or(false);
    if status.phase == InstancePhase::Running && was_ready {
        return Ok(());
    }

    status.set_condition(Condition::new(
        condition_types::READY,
        ConditionStatus::True,
        "Converged",
        "all sub-resources applied",
    ));
    patch_status(
        &ctx.client,
        name,
        namespace,
        serde_json::json!({ "status": {
            "phase": InstancePhase::Running,
            "message": null,
            "conditions": status.conditions,
        }}),
    )
    .await?;
    info!("instance is Running");
    Ok(())
}

async fn mark_failed(
    instance: &RoostInstance,
    ctx: &InstanceContext,
    error: &Error,
) -> Result<Action> {
    let name = instance.name_any();
    let Some(namespace) = instance.namespace() else {
        return Ok(Action::requeue(FAILURE_REQUEUE));
    };
    let already_failed = instance.phase() == InstancePhase::Failed;

    let mut status = instance.status_or_default();
    status.set_condition(Condition::new(
        condition_types::READY,
        ConditionStatus::False,
        "ReconcileError",
        error.to_string(),
    ));
    patch_status(
        &ctx.client,
        &name,
        &namespace,
        serde_json::json!({ "status": {
            "phase": InstancePhase::Failed,
            "message": error.to_string(),
            "conditions": status.conditions,
        }}),
    )
    .await?;

    warn!(error = %error, already_failed, "instance marked Failed");
    // Back off harder once an instance is persistently broken.
    Ok(Action::requeue(if already_failed {
        REPEAT_FAILURE_REQUEUE
    } else {
        FAILURE_REQUEUE
    }))
}

// =============================================================================
// Deletion: the delete-with-backup protocol
// =============================================================================

/// Deletion holds the finalizer until the final backup completes or is
/// explicitly skipped. A failed final backup keeps the guard attached —
/// deliberately, pending operator action.
async fn handle_deletion(
    instance: &RoostInstance,
    ctx: &InstanceContext,
    name: &str,
    namespace: &str,
) -> Result<Action> {
    if !has_finalizer(instance) {
        return Ok(Action::await_change());
    }

    if instance.phase() != InstancePhase::Terminating {
        patch_status(
            &ctx.client,
            name,
            namespace,
            serde_json::json!({ "status": {
                "phase": InstancePhase::Terminating,
                "message": "deprovisioning",
            }}),
        )
        .await?;
    }

    let has_credentials = BackupCredentials::load(&ctx.client).await?.is_some();
    if !final_backup_required(instance, has_credentials) {
        info!("no final backup needed, releasing deletion guard");
        remove_finalizer(&ctx.client, name, namespace).await?;
        return Ok(Action::await_change());
    }

    // Reserve the path before the job exists; the delete flow keeps its
    // own slot so it never races the periodic flow's bookkeeping.
    let status = instance.status_or_default();
    let path = match status.delete_backup_path.clone() {
        Some(p) => p,
        None => {
            let p = paths::backup_path(&instance.tenant(), name, Utc::now());
            patch_status(
                &ctx.client,
                name,
                namespace,
                serde_json::json!({ "status": { "deleteBackupPath": p } }),
            )
            .await?;
            ctx.events
                .publish(
                    &instance.object_ref(&()),
                    EventType::Normal,
                    reasons::BACKUP_STARTED,
                    actions::TRANSFER,
                    Some(format!("final backup to {}", p)),
                )
                .await;
            p
        }
    };

    if let StepOutcome::RetryAfter(d) = subresources::quiesce_workload(ctx, name, namespace).await? {
        return Ok(Action::requeue(d));
    }

    match ctx
        .transfers
        .ensure(instance, TransferPurpose::FinalBackup, &path)
        .await?
    {
        JobOutcome::InProgress => Ok(Action::requeue(Duration::from_secs(15))),
        JobOutcome::Failed(msg) => {
            warn!(
                error = %msg,
                "final backup failed; deletion blocked pending operator action"
            );
            TRANSFERS_TOTAL.add(
                1,
                &[
                    KeyValue::new("direction", "backup"),
                    KeyValue::new("result", "failed"),
                ],
            );
            ctx.events
                .publish(
                    &instance.object_ref(&()),
                    EventType::Warning,
                    reasons::BACKUP_FAILED,
                    actions::TRANSFER,
                    Some(format!("final backup failed, deletion blocked: {}", msg)),
                )
                .await;
            Ok(Action::requeue(Duration::from_secs(60)))
        }
        JobOutcome::Succeeded => {
            info!(path = %path, "final backup complete, releasing deletion guard");
            TRANSFERS_TOTAL.add(
                1,
                &[
                    KeyValue::new("direction", "backup"),
                    KeyValue::new("result", "succeeded"),
                ],
            );
            patch_status(
                &ctx.client,
                name,
                namespace,
                serde_json::json!({ "status": {
                    "lastBackupPath": path,
                    "lastBackupTime": Utc::now(),
                }}),
            )
            .await?;
            ctx.events
                .publish(
                    &instance.object_ref(&()),
                    EventType::Normal,
                    reasons::BACKUP_COMPLETE,
                    actions::TRANSFER,
                    Some(format!("final backup stored at {}", path)),
                )
                .await;
            remove_finalizer(&ctx.client, name, namespace).await?;
            Ok(Action::await_change())
        }
    }
}

/// Whether deletion must wait for a final backup.
///
/// Skipped gracefully (not an error) when persistence is disabled, the
/// skip-backup annotation is present, or no credentials are configured —
/// deletion then proceeds to completion.
fn final_backup_required(instance: &RoostInstance, has_credentials: bool) -> bool {
    let skip_marker = instance
        .metadata
        .annotations
        .as_ref()
        .map(|a| a.contains_key(SKIP_FINAL_BACKUP_ANNOTATION))
        .unwrap_or(false);
    instance.spec.persistence_enabled() && !skip_marker && has_credentials
}

// =============================================================================
// Periodic backup
// =============================================================================

/// Scheduled periodic backup through the same transfer primitive. The
/// in-flight marker is `status.lastBackupJob`; failure is contained (the
/// next interval retries), never an instance failure.
async fn step_periodic_backup(
    instance: &RoostInstance,
    ctx: &InstanceContext,
    name: &str,
    namespace: &str,
) -> Result<StepOutcome> {
    let Some(policy) = &instance.spec.backup else {
        return Ok(StepOutcome::Continue);
    };
    if !instance.spec.persistence_enabled() {
        return Ok(StepOutcome::Continue);
    }

    let status = instance.status_or_default();
    let job_name = TransferPurpose::PeriodicBackup.job_name(name);
    let in_flight = status.last_backup_job.as_deref() == Some(job_name.as_str());

    let path = if in_flight {
        match status.last_backup_path.clone() {
            Some(p) => p,
            None => {
                // The in-flight marker survived a lost path write; restart
                // the flow cleanly at the next interval.
                patch_status(
                    &ctx.client,
                    name,
                    namespace,
                    serde_json::json!({ "status": { "lastBackupJob": null } }),
                )
                .await?;
                return Ok(StepOutcome::Continue);
            }
        }
    } else {
        let interval = chrono::Duration::from_std(policy.interval())
            .unwrap_or_else(|_| chrono::Duration::hours(24));
        let due = status
            .last_backup_time
            .map(|t| Utc::now() - t >= interval)
            .unwrap_or(true);
        if !due {
            return Ok(StepOutcome::Continue);
        }
        if BackupCredentials::load(&ctx.client).await?.is_none() {
            debug!("backup credentials not configured, skipping periodic backup");
            return Ok(StepOutcome::Continue);
        }

        let p = paths::backup_path(&instance.tenant(), name, Utc::now());
        patch_status(
            &ctx.client,
            name,
            namespace,
            serde_json::json!({ "status": {
                "phase": InstancePhase::BackingUp,
                "message": format!("periodic backup to {}", p),
                "lastBackupPath": p,
                "lastBackupJob": job_name,
            }}),
        )
        .await?;
        ctx.events
            .publish(
                &instance.object_ref(&()),
                EventType::Normal,
                reasons::BACKUP_STARTED,
                actions::TRANSFER,
                Some(format!("periodic backup to {}", p)),
            )
            .await;
        p
    };

    if let StepOutcome::RetryAfter(d) = subresources::quiesce_workload(ctx, name, namespace).await? {
        return Ok(StepOutcome::RetryAfter(d));
    }

    match ctx
        .transfers
        .ensure(instance, TransferPurpose::PeriodicBackup, &path)
        .await?
    {
        JobOutcome::InProgress => Ok(StepOutcome::retry_secs(15)),
        JobOutcome::Failed(msg) => {
            warn!(error = %msg, "periodic backup failed, retrying at the next interval");
            TRANSFERS_TOTAL.add(
                1,
                &[
                    KeyValue::new("direction", "backup"),
                    KeyValue::new("result", "failed"),
                ],
            );
            // Record the attempt time so the failure doesn't hot-loop.
            patch_status(
                &ctx.client,
                name,
                namespace,
                serde_json::json!({ "status": {
                    "lastBackupJob": null,
                    "lastBackupTime": Utc::now(),
                    "message": format!("periodic backup failed: {}", msg),
                }}),
            )
            .await?;
            ctx.events
                .publish(
                    &instance.object_ref(&()),
                    EventType::Warning,
                    reasons::BACKUP_FAILED,
                    actions::TRANSFER,
                    Some(msg),
                )
                .await;
            if let Err(e) = ctx
                .transfers
                .remove(instance, TransferPurpose::PeriodicBackup)
                .await
            {
                warn!(error = %e, "failed to delete failed periodic backup job");
            }
            Ok(StepOutcome::Continue)
        }
        JobOutcome::Succeeded => {
            info!(path = %path, "periodic backup complete");
            TRANSFERS_TOTAL.add(
                1,
                &[
                    KeyValue::new("direction", "backup"),
                    KeyValue::new("result", "succeeded"),
                ],
            );
            patch_status(
                &ctx.client,
                name,
                namespace,
                serde_json::json!({ "status": {
                    "lastBackupTime": Utc::now(),
                    "lastBackupJob": null,
                }}),
            )
            .await?;
            ctx.events
                .publish(
                    &instance.object_ref(&()),
                    EventType::Normal,
                    reasons::BACKUP_COMPLETE,
                    actions::TRANSFER,
                    Some(format!("periodic backup stored at {}", path)),
                )
                .await;
            if let Err(e) = ctx
                .transfers
                .remove(instance, TransferPurpose::PeriodicBackup)
                .await
            {
                warn!(error = %e, "failed to clean up completed periodic backup job");
            }
            Ok(StepOutcome::Continue)
        }
    }
}

// =============================================================================
// Finalizer and status helpers
// =============================================================================

fn has_finalizer(instance: &RoostInstance) -> bool {
    instance
        .metadata
        .finalizers
        .as_ref()
        .map(|f| f.iter().any(|s| s == INSTANCE_FINALIZER))
        .unwrap_or(false)
}

async fn add_finalizer(client: &Client, name: &str, namespace: &str) -> Result<()> {
    let api: Api<RoostInstance> = Api::namespaced(client.clone(), namespace);
    let instance = api.get(name).await?;
    let mut finalizers = instance.metadata.finalizers.unwrap_or_default();
    if finalizers.iter().any(|s| s == INSTANCE_FINALIZER) {
        return Ok(());
    }
    finalizers.push(INSTANCE_FINALIZER.to_string());
    let patch = serde_json::json!({ "metadata": { "finalizers": finalizers } });
    api.patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

async fn remove_finalizer(client: &Client, name: &str, namespace: &str) -> Result<()> {
    let api: Api<RoostInstance> = Api::namespaced(client.clone(), namespace);
    let instance = match api.get_opt(name).await? {
        Some(i) => i,
        None => return Ok(()),
    };
    let finalizers: Vec<String> = instance
        .metadata
        .finalizers
        .map(|f| f.into_iter().filter(|s| s != INSTANCE_FINALIZER).collect())
        .unwrap_or_default();
    let patch = serde_json::json!({ "metadata": { "finalizers": finalizers } });
    api.patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

async fn patch_status(
    client: &Client,
    name: &str,
    namespace: &str,
    patch: serde_json::Value,
) -> Result<()> {
    let api: Api<RoostInstance> = Api::namespaced(client.clone(), namespace);
    api.patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use roost_common::crd::{
        BackupPolicy, ImageSpec, PersistenceSpec, RoostInstanceSpec, RoostInstanceStatus,
        UpdateStatus,
    };

    fn sample_instance() -> RoostInstance {
        let mut instance = RoostInstance::new(
            "alpha",
            RoostInstanceSpec {
                image: ImageSpec {
                    repository: "ghcr.io/roost-run/runtime".to_string(),
                    tag: "1.0.0".to_string(),
                    digest: None,
                },
                update: None,
                persistence: Some(PersistenceSpec {
                    enabled: true,
                    size: "10Gi".to_string(),
                    storage_class: None,
                }),
                restore_from: None,
                self_config: None,
                backup: Some(BackupPolicy {
                    interval_seconds: 86_400,
                }),
                skills: vec![],
                configuration: None,
                workspace_files: Default::default(),
                env: vec![],
                ingress: None,
            },
        );
        instance.metadata.namespace = Some("tenant-a".to_string());
        instance
    }

    /// Delete requested with no backup credentials configured and no
    /// skip-backup marker: the backup is skipped gracefully and deletion
    /// proceeds.
    #[test]
    fn final_backup_skipped_without_credentials() {
        let instance = sample_instance();
        assert!(!final_backup_required(&instance, false));
        assert!(final_backup_required(&instance, true));
    }

    #[test]
    fn final_backup_skipped_with_marker_or_no_persistence() {
        let mut instance = sample_instance();
        instance.metadata.annotations = Some(
            [(SKIP_FINAL_BACKUP_ANNOTATION.to_string(), "true".to_string())]
                .into_iter()
                .collect(),
        );
        assert!(!final_backup_required(&instance, true));

        let mut instance = sample_instance();
        instance.spec.persistence = None;
        assert!(!final_backup_required(&instance, true));
    }

    #[test]
    fn finalizer_detection() {
        let mut instance = sample_instance();
        assert!(!has_finalizer(&instance));
        instance.metadata.finalizers = Some(vec![INSTANCE_FINALIZER.to_string()]);
        assert!(has_finalizer(&instance));
    }

    #[test]
    fn replicas_default_to_one() {
        let mut instance = sample_instance();
        instance.status = Some(RoostInstanceStatus::default());
        assert_eq!(desired_replicas(&instance), 1);
    }

    #[test]
    fn replicas_zero_while_update_backup_or_rollback() {
        let mut instance = sample_instance();
        let mut status = RoostInstanceStatus::default();
        status.update = UpdateStatus {
            pending_version: Some("1.1.0".to_string()),
            phase: Some(UpdatePhase::BackingUp),
            ..Default::default()
        };
        instance.status = Some(status.clone());
        assert_eq!(desired_replicas(&instance), 0);

        status.update.phase = Some(UpdatePhase::RollingBack);
        instance.status = Some(status.clone());
        assert_eq!(desired_replicas(&instance), 0);

        // HealthCheck runs with the workload up
        status.update.phase = Some(UpdatePhase::HealthCheck);
        instance.status = Some(status);
        assert_eq!(desired_replicas(&instance), 1);
    }

    #[test]
    fn replicas_zero_while_periodic_backup_in_flight() {
        let mut instance = sample_instance();
        let mut status = RoostInstanceStatus::default();
        status.last_backup_job = Some("alpha-backup-periodic".to_string());
        instance.status = Some(status);
        assert_eq!(desired_replicas(&instance), 0);
    }

    #[test]
    fn replicas_zero_while_seed_restore_outstanding() {
        let mut instance = sample_instance();
        instance.spec.restore_from = Some("acme/alpha/20260101-000000".to_string());
        instance.status = Some(RoostInstanceStatus::default());
        assert_eq!(desired_replicas(&instance), 0);

        // Once recorded, the workload comes back.
        let mut status = RoostInstanceStatus::default();
        status.restored_from = Some("acme/alpha/20260101-000000".to_string());
        instance.status = Some(status);
        assert_eq!(desired_replicas(&instance), 1);
    }
}
