//! The version-rollout state machine
//!
//! One non-blocking step per reconcile tick:
//!
//! ```text
//! Idle ──check──▶ accepted (PendingVersion set, phase cleared)
//!                    │
//!                    ├─▶ BackingUp ──▶ ApplyingUpdate ──▶ HealthCheck ──▶ confirm
//!                    │        │                               │
//!                    │        ▼ (job failed)                  ▼ (timeout)
//!                    │      abort                        RollingBack ──▶ revert
//!                    └────────────────────────────────────────┘
//! ```
//!
//! PendingVersion is set exactly while a cycle is open; it is the
//! "unconfirmed" marker a restarted operator resumes from. RollbackCount
//! grows by one per rollback and resets only on a confirmed update; at
//! three consecutive rollbacks the circuit breaker blocks new checks until
//! a candidate strictly newer than FailedVersion appears.

use std::time::Duration;

use chrono::Utc;
use kube::runtime::events::EventType;
use kube::{Resource, ResourceExt};
use opentelemetry::KeyValue;
use semver::Version;
use tracing::{debug, info, instrument, warn};

use roost_backup::{paths, JobOutcome, TransferPurpose};
use roost_common::crd::{
    condition_types, Condition, ConditionStatus, InstancePhase, RoostInstance, UpdatePhase,
    UpdatePolicy, UpdateStatus, MAX_CONSECUTIVE_ROLLBACKS,
};
use roost_common::events::{actions, reasons};
use roost_common::metrics::{UPDATE_APPLIES, UPDATE_CHECKS, UPDATE_ROLLBACKS};
use roost_common::{Error, Result};

use crate::context::UpdateContext;

/// What the phase controller should do after an engine tick
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineVerdict {
    /// No update cycle is open; the phase controller owns the phase
    Idle,
    /// A cycle is open (or a requeue hint is pending); the engine owns the
    /// phase and the controller should requeue after the delay
    InProgress(Duration),
}

/// Run one tick of the update engine for an instance.
#[instrument(skip(instance, ctx), fields(instance = %instance.name_any()))]
pub async fn run_update(instance: &RoostInstance, ctx: &UpdateContext) -> Result<EngineVerdict> {
    let policy = instance.spec.update_policy();
    let update = instance.status_or_default().update;

    if !update.cycle_open() {
        return check_for_update(instance, ctx, &policy, update).await;
    }

    match update.phase.clone() {
        None => begin_cycle(instance, ctx, &policy, update).await,
        Some(UpdatePhase::BackingUp) => step_backing_up(instance, ctx, update).await,
        Some(UpdatePhase::ApplyingUpdate) => step_apply(instance, ctx, &policy, update).await,
        Some(UpdatePhase::HealthCheck) => step_health_check(instance, ctx, &policy, update).await,
        Some(UpdatePhase::RollingBack) => step_rolling_back(instance, ctx, update).await,
        Some(_) => unreachable!("unknown non-exhaustive UpdatePhase variant"),
    }
}

fn meta(instance: &RoostInstance) -> Result<(&str, &str)> {
    let name = instance
        .metadata
        .name
        .as_deref()
        .ok_or_else(|| Error::internal_with_context("engine", "instance has no name"))?;
    let namespace = instance
        .metadata
        .namespace
        .as_deref()
        .ok_or_else(|| Error::internal_with_context("engine", "instance has no namespace"))?;
    Ok((name, namespace))
}

// =============================================================================
// Idle: the update check
// =============================================================================

/// The idle-exit gate. Every condition must hold before a cycle opens:
/// policy enabled, no digest pin, circuit breaker closed, interval elapsed,
/// strictly newer semver candidate, candidate not the recorded failed
/// version (unless strictly newer, which clears it first).
async fn check_for_update(
    instance: &RoostInstance,
    ctx: &UpdateContext,
    policy: &UpdatePolicy,
    mut update: UpdateStatus,
) -> Result<EngineVerdict> {
    let (name, namespace) = meta(instance)?;

    if !policy.enabled {
        return Ok(EngineVerdict::Idle);
    }
    if instance.spec.image.is_pinned() {
        debug!("image is digest-pinned, automatic updates disabled");
        return Ok(EngineVerdict::Idle);
    }
    if update.rollback_count >= MAX_CONSECUTIVE_ROLLBACKS {
        debug!(
            rollback_count = update.rollback_count,
            "circuit breaker open, awaiting a version newer than the failed one"
        );
        UPDATE_CHECKS.add(1, &[KeyValue::new("outcome", "blocked")]);
        // The breaker is examined again below only when a check runs; with
        // the breaker open no check runs, so clearing requires the interval
        // path: fall through only when a strictly newer candidate could
        // supersede FailedVersion. That supersession itself needs a resolver
        // call, so the breaker gates on FailedVersion instead: resolve, and
        // accept only a candidate strictly newer than it.
        return check_superseding_candidate(instance, ctx, policy, update).await;
    }

    let now = Utc::now();
    if let Some(last) = update.last_check_time {
        let interval = chrono::Duration::from_std(policy.check_interval())
            .unwrap_or_else(|_| chrono::Duration::hours(24));
        if now - last < interval {
            return Ok(EngineVerdict::Idle);
        }
    }

    // A current tag that is not semver makes the whole check a silent
    // no-op: the update path never mutates the tag of such an instance.
    let current = match Version::parse(&instance.spec.image.tag) {
        Ok(v) => v,
        Err(_) => {
            debug!(tag = %instance.spec.image.tag, "current tag is not semver, skipping update check");
            UPDATE_CHECKS.add(1, &[KeyValue::new("outcome", "skipped")]);
            return Ok(EngineVerdict::Idle);
        }
    };

    let candidate = ctx
        .resolver
        .latest_semver(&instance.spec.image.repository, None)
        .await?;

    // Check bookkeeping is recorded regardless of outcome.
    update.last_check_time = Some(now);
    if let Some(c) = &candidate {
        update.latest_version = Some(c.to_string());
    }

    let Some(candidate) = candidate else {
        ctx.instances
            .apply_update_status(name, namespace, &update)
            .await?;
        UPDATE_CHECKS.add(1, &[KeyValue::new("outcome", "no_newer")]);
        return Ok(EngineVerdict::Idle);
    };

    if candidate <= current {
        ctx.instances
            .apply_update_status(name, namespace, &update)
            .await?;
        UPDATE_CHECKS.add(1, &[KeyValue::new("outcome", "no_newer")]);
        return Ok(EngineVerdict::Idle);
    }

    if let Some(failed_raw) = update.failed_version.clone() {
        match Version::parse(&failed_raw) {
            Ok(failed) if candidate == failed => {
                debug!(%candidate, "candidate previously rolled back, not retrying");
                ctx.instances
                    .apply_update_status(name, namespace, &update)
                    .await?;
                UPDATE_CHECKS.add(1, &[KeyValue::new("outcome", "blocked")]);
                return Ok(EngineVerdict::Idle);
            }
            Ok(failed) if candidate > failed => {
                info!(%candidate, failed = %failed_raw, "candidate supersedes failed version");
                update.failed_version = None;
            }
            _ => {}
        }
    }

    accept_candidate(instance, ctx, name, namespace, update, &current, &candidate).await
}

/// Circuit-breaker path: a check runs only to look for a candidate that
/// strictly supersedes the failed version. Nothing else reopens updates.
async fn check_superseding_candidate(
    instance: &RoostInstance,
    ctx: &UpdateContext,
    policy: &UpdatePolicy,
    mut update: UpdateStatus,
) -> Result<EngineVerdict> {
    let (name, namespace) = meta(instance)?;

    let now = Utc::now();
    if let Some(last) = update.last_check_time {
        let interval = chrono::Duration::from_std(policy.check_interval())
            .unwrap_or_else(|_| chrono::Duration::hours(24));
        if now - last < interval {
            return Ok(EngineVerdict::Idle);
        }
    }

    let Some(failed) = update
        .failed_version
        .as_deref()
        .and_then(|f| Version::parse(f).ok())
    else {
        return Ok(EngineVerdict::Idle);
    };
    let Ok(current) = Version::parse(&instance.spec.image.tag) else {
        return Ok(EngineVerdict::Idle);
    };

    let candidate = ctx
        .resolver
        .latest_semver(&instance.spec.image.repository, None)
        .await?;

    update.last_check_time = Some(now);
    if let Some(c) = &candidate {
        update.latest_version = Some(c.to_string());
    }

    match candidate {
        Some(candidate) if candidate > failed && candidate > current => {
            info!(%candidate, %failed, "superseding candidate reopens paused updates");
            update.failed_version = None;
            accept_candidate(instance, ctx, name, namespace, update, &current, &candidate).await
        }
        _ => {
            ctx.instances
                .apply_update_status(name, namespace, &update)
                .await?;
            Ok(EngineVerdict::Idle)
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn accept_candidate(
    instance: &RoostInstance,
    ctx: &UpdateContext,
    name: &str,
    namespace: &str,
    mut update: UpdateStatus,
    current: &Version,
    candidate: &Version,
) -> Result<EngineVerdict> {
    info!(%current, %candidate, "accepting update candidate");
    update.pending_version = Some(candidate.to_string());
    update.phase = None;
    update.last_update_error = None;
    ctx.instances
        .apply_update_status(name, namespace, &update)
        .await?;
    ctx.instances
        .set_condition(
            name,
            namespace,
            Condition::new(
                condition_types::UPDATE_AVAILABLE,
                ConditionStatus::True,
                "NewerVersionResolved",
                format!("version {} is available (running {})", candidate, current),
            ),
        )
        .await?;
    ctx.events
        .publish(
            &instance.object_ref(&()),
            EventType::Normal,
            reasons::UPDATE_AVAILABLE,
            actions::UPDATE,
            Some(format!("update to {} accepted", candidate)),
        )
        .await;
    UPDATE_CHECKS.add(1, &[KeyValue::new("outcome", "accepted")]);
    Ok(EngineVerdict::InProgress(Duration::from_secs(1)))
}

// =============================================================================
// Open cycle: dispatch steps
// =============================================================================

/// Acceptance clears the update phase; the first open-cycle tick decides
/// whether a pre-update backup is required.
async fn begin_cycle(
    instance: &RoostInstance,
    ctx: &UpdateContext,
    policy: &UpdatePolicy,
    mut update: UpdateStatus,
) -> Result<EngineVerdict> {
    let (name, namespace) = meta(instance)?;

    if policy.backup_before_update && instance.spec.persistence_enabled() {
        update.phase = Some(UpdatePhase::BackingUp);
        ctx.instances
            .apply_update_status(name, namespace, &update)
            .await?;
        ctx.instances
            .set_phase(
                name,
                namespace,
                InstancePhase::BackingUp,
                Some("taking pre-update backup".to_string()),
            )
            .await?;
    } else {
        update.phase = Some(UpdatePhase::ApplyingUpdate);
        ctx.instances
            .apply_update_status(name, namespace, &update)
            .await?;
    }
    Ok(EngineVerdict::InProgress(Duration::from_secs(1)))
}

/// Pre-update backup. The storage is single-writer, so the workload is
/// scaled to zero and confirmed drained before the data-mover runs. Any
/// failure here aborts the whole cycle rather than proceeding with an
/// unbacked update.
async fn step_backing_up(
    instance: &RoostInstance,
    ctx: &UpdateContext,
    mut update: UpdateStatus,
) -> Result<EngineVerdict> {
    let (name, namespace) = meta(instance)?;

    ctx.workloads.scale(name, namespace, 0).await?;
    let running = ctx.workloads.running_pods(name, namespace).await?;
    if running > 0 {
        debug!(running, "waiting for workload to drain before backup");
        return Ok(EngineVerdict::InProgress(Duration::from_secs(10)));
    }

    // Persist the path before the job exists so retries and the eventual
    // rollback find it without recomputing a timestamp.
    let path = match update.pre_update_backup_path.clone() {
        Some(p) => p,
        None => {
            let p = paths::backup_path(&instance.tenant(), name, Utc::now());
            update.pre_update_backup_path = Some(p.clone());
            ctx.instances
                .apply_update_status(name, namespace, &update)
                .await?;
            ctx.events
                .publish(
                    &instance.object_ref(&()),
                    EventType::Normal,
                    reasons::BACKUP_STARTED,
                    actions::TRANSFER,
                    Some(format!("pre-update backup to {}", p)),
                )
                .await;
            p
        }
    };

    match ctx
        .transfers
        .ensure(instance, TransferPurpose::PreUpdateBackup, &path)
        .await?
    {
        JobOutcome::InProgress => Ok(EngineVerdict::InProgress(Duration::from_secs(15))),
        JobOutcome::Failed(msg) => abort_cycle(instance, ctx, update, msg).await,
        JobOutcome::Succeeded => {
            update.phase = Some(UpdatePhase::ApplyingUpdate);
            ctx.instances
                .apply_update_status(name, namespace, &update)
                .await?;
            ctx.events
                .publish(
                    &instance.object_ref(&()),
                    EventType::Normal,
                    reasons::BACKUP_COMPLETE,
                    actions::TRANSFER,
                    Some(format!("pre-update backup stored at {}", path)),
                )
                .await;
            if let Err(e) = ctx
                .transfers
                .remove(instance, TransferPurpose::PreUpdateBackup)
                .await
            {
                warn!(error = %e, "failed to clean up completed backup job");
            }
            Ok(EngineVerdict::InProgress(Duration::from_secs(1)))
        }
    }
}

/// Abort: invoked only from a BackingUp failure, before any version patch
/// has been applied. The cycle closes, the workload comes back, and the
/// instance returns to Running.
async fn abort_cycle(
    instance: &RoostInstance,
    ctx: &UpdateContext,
    mut update: UpdateStatus,
    message: String,
) -> Result<EngineVerdict> {
    let (name, namespace) = meta(instance)?;
    warn!(error = %message, "aborting update cycle after backup failure");

    update.close_cycle();
    update.last_update_error = Some(message.clone());
    ctx.instances
        .apply_update_status(name, namespace, &update)
        .await?;
    ctx.instances
        .set_phase(
            name,
            namespace,
            InstancePhase::Running,
            Some(format!("update aborted: {}", message)),
        )
        .await?;
    if let Err(e) = ctx.workloads.scale(name, namespace, 1).await {
        warn!(error = %e, "failed to scale workload back up after abort");
    }
    ctx.events
        .publish(
            &instance.object_ref(&()),
            EventType::Warning,
            reasons::UPDATE_ABORTED,
            actions::UPDATE,
            Some(message),
        )
        .await;
    Ok(EngineVerdict::InProgress(Duration::from_secs(30)))
}

/// Write the new tag. With rollback disabled this is fire-and-forget:
/// confirm immediately and hand the instance back to provisioning.
/// Otherwise PendingVersion stays set as the unconfirmed marker and the
/// health-check clock starts.
async fn step_apply(
    instance: &RoostInstance,
    ctx: &UpdateContext,
    policy: &UpdatePolicy,
    mut update: UpdateStatus,
) -> Result<EngineVerdict> {
    let (name, namespace) = meta(instance)?;
    let pending = update
        .pending_version
        .clone()
        .ok_or_else(|| Error::internal_with_context("engine", "apply step without pending version"))?;

    // Guard against a redelivery that already patched the tag: the spec
    // tag is only a valid "previous" while it still differs from pending.
    if instance.spec.image.tag != pending {
        if update.previous_version.is_none() {
            update.previous_version = Some(instance.spec.image.tag.clone());
        }
        ctx.instances
            .patch_image_tag(name, namespace, &pending)
            .await?;
        UPDATE_APPLIES.add(1, &[]);
        ctx.events
            .publish(
                &instance.object_ref(&()),
                EventType::Normal,
                reasons::UPDATE_APPLIED,
                actions::UPDATE,
                Some(format!("image tag set to {}", pending)),
            )
            .await;
    }

    let now = Utc::now();
    if !policy.rollback_on_failure {
        info!(%pending, "rollback disabled, confirming update unmonitored");
        update.current_version = Some(pending);
        update.close_cycle();
        update.rollback_count = 0;
        update.last_update_time = Some(now);
        ctx.instances
            .apply_update_status(name, namespace, &update)
            .await?;
        ctx.instances
            .set_condition(
                name,
                namespace,
                Condition::new(
                    condition_types::UPDATE_AVAILABLE,
                    ConditionStatus::False,
                    "UpdateApplied",
                    "update applied without health monitoring",
                ),
            )
            .await?;
        ctx.instances
            .set_phase(
                name,
                namespace,
                InstancePhase::Provisioning,
                Some("re-converging on the updated version".to_string()),
            )
            .await?;
        return Ok(EngineVerdict::Idle);
    }

    update.phase = Some(UpdatePhase::HealthCheck);
    update.last_update_time = Some(now);
    ctx.instances
        .apply_update_status(name, namespace, &update)
        .await?;
    ctx.instances
        .set_phase(
            name,
            namespace,
            InstancePhase::Updating,
            Some("waiting for workload health on the new version".to_string()),
        )
        .await?;
    Ok(EngineVerdict::InProgress(Duration::from_secs(15)))
}

/// Poll workload readiness. Success confirms; a timeout moves to rollback.
async fn step_health_check(
    instance: &RoostInstance,
    ctx: &UpdateContext,
    policy: &UpdatePolicy,
    mut update: UpdateStatus,
) -> Result<EngineVerdict> {
    let (name, namespace) = meta(instance)?;
    let pending = update
        .pending_version
        .clone()
        .ok_or_else(|| Error::internal_with_context("engine", "health check without pending version"))?;

    if ctx.workloads.is_ready_on_revision(name, namespace).await? {
        info!(%pending, "workload healthy on new version, confirming update");
        update.current_version = Some(pending.clone());
        update.close_cycle();
        update.rollback_count = 0;
        update.last_update_error = None;
        ctx.instances
            .apply_update_status(name, namespace, &update)
            .await?;
        ctx.instances
            .set_condition(
                name,
                namespace,
                Condition::new(
                    condition_types::UPDATE_AVAILABLE,
                    ConditionStatus::False,
                    "UpdateConfirmed",
                    format!("running version {}", pending),
                ),
            )
            .await?;
        ctx.instances
            .set_phase(name, namespace, InstancePhase::Running, None)
            .await?;
        ctx.events
            .publish(
                &instance.object_ref(&()),
                EventType::Normal,
                reasons::UPDATE_CONFIRMED,
                actions::UPDATE,
                Some(format!("version {} confirmed healthy", pending)),
            )
            .await;
        return Ok(EngineVerdict::Idle);
    }

    let now = Utc::now();
    let started = match update.last_update_time {
        Some(t) => t,
        None => {
            // Clock never started (status write raced a restart); start it
            // now rather than rolling back on a zero-length window.
            update.last_update_time = Some(now);
            ctx.instances
                .apply_update_status(name, namespace, &update)
                .await?;
            return Ok(EngineVerdict::InProgress(Duration::from_secs(15)));
        }
    };

    let timeout = chrono::Duration::from_std(policy.health_check_timeout())
        .unwrap_or_else(|_| chrono::Duration::minutes(10));
    if now - started >= timeout {
        warn!(%pending, "health check timed out, rolling back");
        update.phase = Some(UpdatePhase::RollingBack);
        ctx.instances
            .apply_update_status(name, namespace, &update)
            .await?;
        ctx.instances
            .set_phase(
                name,
                namespace,
                InstancePhase::Updating,
                Some(format!("rolling back failed update to {}", pending)),
            )
            .await?;
        return Ok(EngineVerdict::InProgress(Duration::from_secs(1)));
    }

    Ok(EngineVerdict::InProgress(Duration::from_secs(15)))
}

/// Revert to the previous version, restoring the pre-update backup first
/// when one exists. A failed restore is logged and skipped — a stale but
/// running instance beats a stuck one.
async fn step_rolling_back(
    instance: &RoostInstance,
    ctx: &UpdateContext,
    mut update: UpdateStatus,
) -> Result<EngineVerdict> {
    let (name, namespace) = meta(instance)?;
    let pending = update
        .pending_version
        .clone()
        .ok_or_else(|| Error::internal_with_context("engine", "rollback without pending version"))?;

    if let Some(path) = update.pre_update_backup_path.clone() {
        if instance.spec.persistence_enabled() {
            // Same single-writer rule as the backup: drain first.
            ctx.workloads.scale(name, namespace, 0).await?;
            let running = ctx.workloads.running_pods(name, namespace).await?;
            if running > 0 {
                return Ok(EngineVerdict::InProgress(Duration::from_secs(10)));
            }

            match ctx
                .transfers
                .ensure(instance, TransferPurpose::RollbackRestore, &path)
                .await?
            {
                JobOutcome::InProgress => {
                    return Ok(EngineVerdict::InProgress(Duration::from_secs(15)))
                }
                JobOutcome::Failed(msg) => {
                    warn!(error = %msg, "rollback restore failed, reverting version anyway");
                    ctx.events
                        .publish(
                            &instance.object_ref(&()),
                            EventType::Warning,
                            reasons::RESTORE_FAILED,
                            actions::TRANSFER,
                            Some(msg),
                        )
                        .await;
                }
                JobOutcome::Succeeded => {
                    ctx.events
                        .publish(
                            &instance.object_ref(&()),
                            EventType::Normal,
                            reasons::RESTORE_COMPLETE,
                            actions::TRANSFER,
                            Some(format!("restored pre-update backup {}", path)),
                        )
                        .await;
                }
            }
            if let Err(e) = ctx
                .transfers
                .remove(instance, TransferPurpose::RollbackRestore)
                .await
            {
                warn!(error = %e, "failed to clean up rollback restore job");
            }
        }
    }

    if let Some(previous) = update.previous_version.clone() {
        if instance.spec.image.tag != previous {
            ctx.instances
                .patch_image_tag(name, namespace, &previous)
                .await?;
        }
    }

    update.failed_version = Some(pending.clone());
    update.rollback_count += 1;
    let rollback_count = update.rollback_count;
    update.close_cycle();
    update.last_update_error = Some(format!("health check failed for {}", pending));
    ctx.instances
        .apply_update_status(name, namespace, &update)
        .await?;
    ctx.instances
        .set_condition(
            name,
            namespace,
            Condition::new(
                condition_types::UPDATE_AVAILABLE,
                ConditionStatus::False,
                "RolledBack",
                format!("version {} rolled back", pending),
            ),
        )
        .await?;
    ctx.instances
        .set_phase(
            name,
            namespace,
            InstancePhase::Provisioning,
            Some("re-converging on the reverted version".to_string()),
        )
        .await?;

    UPDATE_ROLLBACKS.add(1, &[]);
    ctx.events
        .publish(
            &instance.object_ref(&()),
            EventType::Warning,
            reasons::UPDATE_ROLLED_BACK,
            actions::UPDATE,
            Some(format!(
                "rolled back {} (rollback {} of {})",
                pending, rollback_count, MAX_CONSECUTIVE_ROLLBACKS
            )),
        )
        .await;
    if rollback_count >= MAX_CONSECUTIVE_ROLLBACKS {
        warn!(
            rollback_count,
            "consecutive rollback limit reached, pausing automatic updates"
        );
        ctx.events
            .publish(
                &instance.object_ref(&()),
                EventType::Warning,
                reasons::UPDATES_PAUSED,
                actions::UPDATE,
                Some(format!(
                    "automatic updates paused after {} consecutive rollbacks; \
                     waiting for a version newer than {}",
                    rollback_count, pending
                )),
            )
            .await;
    }

    Ok(EngineVerdict::Idle)
}
