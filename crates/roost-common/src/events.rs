//! Kubernetes Event recording for Roost controllers.
//!
//! Provides a trait-based abstraction over `kube::runtime::events::Recorder`
//! so that controllers can emit standard Kubernetes Events visible via
//! `kubectl describe` and `kubectl get events`.
//!
//! Events are **fire-and-forget**: failures are logged as warnings and never
//! propagate errors. A failed event must never break reconciliation.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// Trait for publishing Kubernetes Events.
///
/// Implementations are expected to be fire-and-forget: `publish()` logs a
/// warning on failure but never returns an error.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a Kubernetes Event on the given resource.
    ///
    /// # Arguments
    ///
    /// * `resource_ref` - The Kubernetes object this event is about
    /// * `type_` - Normal or Warning
    /// * `reason` - Machine-readable reason string (e.g. "UpdateConfirmed")
    /// * `action` - What action was taken (e.g. "Update")
    /// * `note` - Optional human-readable message
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Production implementation wrapping `kube::runtime::events::Recorder`.
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Create a new publisher for the given controller name.
    ///
    /// The controller name appears as the "reportingComponent" on Events
    /// (e.g. "roost-instance-controller").
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: None,
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = kube::runtime::events::Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(
                reason,
                action,
                error = %e,
                "failed to publish Kubernetes event"
            );
        }
    }
}

/// No-op implementation for tests.
///
/// All calls are silently ignored — no Kubernetes API interaction.
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
        // intentionally empty
    }
}

/// Well-known event reason strings.
///
/// These appear in `kubectl get events` under the REASON column.
pub mod reasons {
    // Update lifecycle
    /// A strictly newer version was resolved from the registry
    pub const UPDATE_AVAILABLE: &str = "UpdateAvailable";
    /// The new image tag was written to the instance spec
    pub const UPDATE_APPLIED: &str = "UpdateApplied";
    /// The workload passed its post-update health check
    pub const UPDATE_CONFIRMED: &str = "UpdateConfirmed";
    /// The health check timed out and the version was reverted
    pub const UPDATE_ROLLED_BACK: &str = "UpdateRolledBack";
    /// The circuit breaker opened after repeated rollbacks
    pub const UPDATES_PAUSED: &str = "UpdatesPaused";
    /// A pre-update backup failed and the cycle was abandoned
    pub const UPDATE_ABORTED: &str = "UpdateAborted";

    // Backup / restore
    /// A data-mover backup job was created
    pub const BACKUP_STARTED: &str = "BackupStarted";
    /// The backup job reached its Complete condition
    pub const BACKUP_COMPLETE: &str = "BackupComplete";
    /// The backup job reached its Failed condition
    pub const BACKUP_FAILED: &str = "BackupFailed";
    /// A data-mover restore job was created
    pub const RESTORE_STARTED: &str = "RestoreStarted";
    /// The restore job reached its Complete condition
    pub const RESTORE_COMPLETE: &str = "RestoreComplete";
    /// The restore job reached its Failed condition
    pub const RESTORE_FAILED: &str = "RestoreFailed";

    // Self-configuration
    /// A configuration change request was applied to the parent
    pub const CONFIG_APPLIED: &str = "ConfigApplied";
    /// A configuration change request was denied by policy
    pub const CONFIG_DENIED: &str = "ConfigDenied";
}

/// Well-known event action strings.
pub mod actions {
    /// Ordinary reconciliation
    pub const RECONCILE: &str = "Reconcile";
    /// The version-rollout state machine
    pub const UPDATE: &str = "Update";
    /// Data movement between storage and the blob store
    pub const TRANSFER: &str = "Transfer";
    /// Self-service configuration change
    pub const SELF_CONFIGURE: &str = "SelfConfigure";
}
