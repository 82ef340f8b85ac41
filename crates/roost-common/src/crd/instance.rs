//! RoostInstance Custom Resource Definition
//!
//! A RoostInstance represents one tenant's managed, stateful runtime
//! instance. The spec is the tenant-visible desired state; everything the
//! operator learns or decides lives in the status subresource, so the
//! controller is fully re-derivable from the object store after a restart.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{
    BackupPolicy, Condition, EnvVarSpec, ImageSpec, IngressSpec, InstancePhase, PersistenceSpec,
    SelfConfigPolicy, UpdatePhase, UpdatePolicy,
};

/// Specification for a RoostInstance
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "roost.dev",
    version = "v1alpha1",
    kind = "RoostInstance",
    plural = "roostinstances",
    shortname = "ri",
    status = "RoostInstanceStatus",
    namespaced,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".status.update.currentVersion"}"#,
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type=='Ready')].status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RoostInstanceSpec {
    /// Runtime container image
    pub image: ImageSpec,

    /// Automatic update policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<UpdatePolicy>,

    /// Persistent storage configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistence: Option<PersistenceSpec>,

    /// Blob-store path to seed the volume from on first provisioning
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restore_from: Option<String>,

    /// Self-service configuration policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_config: Option<SelfConfigPolicy>,

    /// Periodic backup policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup: Option<BackupPolicy>,

    /// Skills installed into the instance, in load order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skills: Vec<String>,

    /// Instance configuration document (JSON object)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<serde_json::Value>,

    /// Seed workspace files, name to content
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub workspace_files: BTreeMap<String, String>,

    /// Environment variables for the runtime container
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVarSpec>,

    /// Ingress exposure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress: Option<IngressSpec>,
}

impl RoostInstanceSpec {
    /// True when the instance mounts persistent storage
    pub fn persistence_enabled(&self) -> bool {
        self.persistence.as_ref().is_some_and(|p| p.enabled)
    }

    /// True when the instance has opted into self-configuration
    pub fn self_config_enabled(&self) -> bool {
        self.self_config.as_ref().is_some_and(|p| p.enabled)
    }

    /// The update policy, defaulted when absent
    pub fn update_policy(&self) -> UpdatePolicy {
        self.update.clone().unwrap_or_default()
    }

    /// Validate the instance specification
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.image.repository.is_empty() {
            return Err(crate::Error::validation("image repository must not be empty"));
        }
        if self.image.tag.is_empty() && self.image.digest.is_none() {
            return Err(crate::Error::validation(
                "image must carry a tag or a digest pin",
            ));
        }
        if self.restore_from.as_deref() == Some("") {
            return Err(crate::Error::validation(
                "restoreFrom must name a blob-store path when set",
            ));
        }
        if let Some(backup) = &self.backup {
            if backup.interval_seconds == 0 {
                return Err(crate::Error::validation(
                    "backup.intervalSeconds must be positive",
                ));
            }
        }
        Ok(())
    }
}

/// Version-rollout bookkeeping for an instance
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatus {
    /// The version currently confirmed as running
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_version: Option<String>,

    /// Set exactly while an update cycle is open (acceptance to
    /// confirm-or-rollback); doubles as the "unconfirmed" marker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_version: Option<String>,

    /// The version to revert to if the health check fails
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_version: Option<String>,

    /// A version that rolled back; blocked until superseded by a
    /// strictly newer candidate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_version: Option<String>,

    /// The newest version the registry has reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_version: Option<String>,

    /// Which step of the open cycle we are in; None while idle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<UpdatePhase>,

    /// Consecutive rollbacks; reset to 0 only on a confirmed update
    #[serde(default)]
    pub rollback_count: u32,

    /// When the registry was last queried
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_check_time: Option<DateTime<Utc>>,

    /// When the tag was last patched (health-check clock starts here)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<DateTime<Utc>>,

    /// Last error recorded by the update engine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_error: Option<String>,

    /// Blob-store path of the pre-update backup, for rollback restore
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_update_backup_path: Option<String>,
}

impl UpdateStatus {
    /// True while an update cycle is open
    pub fn cycle_open(&self) -> bool {
        self.pending_version.is_some()
    }

    /// Clear all per-cycle state, leaving counters and history intact
    pub fn close_cycle(&mut self) {
        self.pending_version = None;
        self.previous_version = None;
        self.phase = None;
        self.pre_update_backup_path = None;
    }
}

/// Status for a RoostInstance
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoostInstanceStatus {
    /// Current lifecycle phase
    #[serde(default)]
    pub phase: InstancePhase,

    /// Human-readable message about current state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Conditions representing the instance state
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Name index of managed sub-resources, kind to name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resources: BTreeMap<String, String>,

    /// Version-rollout bookkeeping
    #[serde(default)]
    pub update: UpdateStatus,

    /// Blob-store path of the most recent completed backup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_backup_path: Option<String>,

    /// Completion time of the most recent backup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_backup_time: Option<DateTime<Utc>>,

    /// Name of the most recent backup job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_backup_job: Option<String>,

    /// Blob-store path reserved for the delete-time backup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_backup_path: Option<String>,

    /// Blob-store path this instance's volume was seeded from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restored_from: Option<String>,

    /// Name of the restore job, while one is running
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restore_job: Option<String>,
}

impl RoostInstanceStatus {
    /// Create a new status with the given phase
    pub fn with_phase(phase: InstancePhase) -> Self {
        Self {
            phase,
            ..Default::default()
        }
    }

    /// Set the message and return self for chaining
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Add a condition and return self for chaining
    ///
    /// Replaces any existing condition of the same type.
    pub fn condition(mut self, condition: Condition) -> Self {
        self.set_condition(condition);
        self
    }

    /// Replace or insert a condition of the same type
    pub fn set_condition(&mut self, condition: Condition) {
        self.conditions.retain(|c| c.type_ != condition.type_);
        self.conditions.push(condition);
    }

    /// Look up a condition by type
    pub fn get_condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }
}

impl RoostInstance {
    /// The instance's status, defaulted when unset
    pub fn status_or_default(&self) -> RoostInstanceStatus {
        self.status.clone().unwrap_or_default()
    }

    /// The instance's current phase
    pub fn phase(&self) -> InstancePhase {
        self.status
            .as_ref()
            .map(|s| s.phase.clone())
            .unwrap_or_default()
    }

    /// The tenant identifier: the tenant label, falling back to the namespace
    pub fn tenant(&self) -> String {
        self.metadata
            .labels
            .as_ref()
            .and_then(|l| l.get(crate::TENANT_LABEL))
            .cloned()
            .or_else(|| self.metadata.namespace.clone())
            .unwrap_or_else(|| "default".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::types::ConditionStatus;

    fn sample_spec() -> RoostInstanceSpec {
        RoostInstanceSpec {
            image: ImageSpec {
                repository: "ghcr.io/roost-run/runtime".to_string(),
                tag: "1.0.0".to_string(),
                digest: None,
            },
            update: None,
            persistence: None,
            restore_from: None,
            self_config: None,
            backup: None,
            skills: vec![],
            configuration: None,
            workspace_files: BTreeMap::new(),
            env: vec![],
            ingress: None,
        }
    }

    #[test]
    fn validate_accepts_minimal_spec() {
        assert!(sample_spec().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_repository() {
        let mut spec = sample_spec();
        spec.image.repository = String::new();
        assert!(spec.validate().is_err());
    }

    #[test]
    fn validate_rejects_tagless_unpinned_image() {
        let mut spec = sample_spec();
        spec.image.tag = String::new();
        let err = spec.validate().unwrap_err();
        assert!(err.to_string().contains("tag or a digest"));

        spec.image.digest = Some("sha256:abcd".to_string());
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_restore_path() {
        let mut spec = sample_spec();
        spec.restore_from = Some(String::new());
        assert!(spec.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_backup_interval() {
        let mut spec = sample_spec();
        spec.backup = Some(BackupPolicy {
            interval_seconds: 0,
        });
        assert!(spec.validate().is_err());
    }

    #[test]
    fn persistence_enabled_requires_flag() {
        let mut spec = sample_spec();
        assert!(!spec.persistence_enabled());
        spec.persistence = Some(PersistenceSpec {
            enabled: false,
            size: "10Gi".to_string(),
            storage_class: None,
        });
        assert!(!spec.persistence_enabled());
        spec.persistence.as_mut().unwrap().enabled = true;
        assert!(spec.persistence_enabled());
    }

    /// PendingVersion is empty if and only if no update cycle is open.
    #[test]
    fn cycle_open_tracks_pending_version() {
        let mut update = UpdateStatus::default();
        assert!(!update.cycle_open());

        update.pending_version = Some("1.1.0".to_string());
        update.previous_version = Some("1.0.0".to_string());
        update.phase = Some(UpdatePhase::HealthCheck);
        assert!(update.cycle_open());

        update.close_cycle();
        assert!(!update.cycle_open());
        assert!(update.previous_version.is_none());
        assert!(update.phase.is_none());
        assert!(update.pre_update_backup_path.is_none());
    }

    #[test]
    fn close_cycle_preserves_counters_and_history() {
        let mut update = UpdateStatus {
            pending_version: Some("1.1.0".to_string()),
            failed_version: Some("1.0.5".to_string()),
            rollback_count: 2,
            current_version: Some("1.0.0".to_string()),
            ..Default::default()
        };
        update.close_cycle();
        assert_eq!(update.rollback_count, 2);
        assert_eq!(update.failed_version.as_deref(), Some("1.0.5"));
        assert_eq!(update.current_version.as_deref(), Some("1.0.0"));
    }

    #[test]
    fn set_condition_replaces_same_type() {
        let mut status = RoostInstanceStatus::default();
        status.set_condition(Condition::new(
            "Ready",
            ConditionStatus::False,
            "Provisioning",
            "not yet",
        ));
        status.set_condition(Condition::new(
            "Ready",
            ConditionStatus::True,
            "Converged",
            "ok",
        ));
        assert_eq!(status.conditions.len(), 1);
        assert_eq!(status.get_condition("Ready").unwrap().status, ConditionStatus::True);
    }

    #[test]
    fn tenant_prefers_label_over_namespace() {
        let mut instance = RoostInstance::new("alpha", sample_spec());
        instance.metadata.namespace = Some("tenant-ns".to_string());
        assert_eq!(instance.tenant(), "tenant-ns");

        instance.metadata.labels = Some(
            [(crate::TENANT_LABEL.to_string(), "acme".to_string())]
                .into_iter()
                .collect(),
        );
        assert_eq!(instance.tenant(), "acme");
    }

    #[test]
    fn status_serializes_camel_case() {
        let status = RoostInstanceStatus {
            update: UpdateStatus {
                pending_version: Some("1.1.0".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("pendingVersion"));
        assert!(json.contains("rollbackCount"));
    }
}
