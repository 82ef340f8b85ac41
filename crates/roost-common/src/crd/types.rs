//! Supporting types for the Roost CRDs

use std::time::Duration;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Lower clamp for the update check interval (1 hour)
pub const CHECK_INTERVAL_MIN_SECS: u32 = 3_600;
/// Upper clamp for the update check interval (7 days)
pub const CHECK_INTERVAL_MAX_SECS: u32 = 604_800;
/// Default update check interval (24 hours)
pub const CHECK_INTERVAL_DEFAULT_SECS: u32 = 86_400;

/// Lower clamp for the post-update health check window (2 minutes)
pub const HEALTH_TIMEOUT_MIN_SECS: u32 = 120;
/// Upper clamp for the post-update health check window (30 minutes)
pub const HEALTH_TIMEOUT_MAX_SECS: u32 = 1_800;
/// Default post-update health check window (10 minutes)
pub const HEALTH_TIMEOUT_DEFAULT_SECS: u32 = 600;

/// Consecutive rollbacks after which automatic updates pause
pub const MAX_CONSECUTIVE_ROLLBACKS: u32 = 3;

/// Container image reference for the instance runtime
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImageSpec {
    /// Image repository (e.g. "ghcr.io/roost-run/runtime")
    pub repository: String,

    /// Mutable tag tracked by the update engine (e.g. "2.4.1")
    pub tag: String,

    /// Immutable digest pin; when set, automatic updates are disabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

impl ImageSpec {
    /// Full image reference: digest pin wins over the tag
    pub fn reference(&self) -> String {
        match &self.digest {
            Some(digest) => format!("{}@{}", self.repository, digest),
            None => format!("{}:{}", self.repository, self.tag),
        }
    }

    /// True when the image is pinned to a digest
    pub fn is_pinned(&self) -> bool {
        self.digest.is_some()
    }
}

/// Automatic update policy for an instance
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePolicy {
    /// Whether automatic updates are enabled
    #[serde(default)]
    pub enabled: bool,

    /// Seconds between registry checks; clamped to [1h, 168h], default 24h
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_interval_seconds: Option<u32>,

    /// Seconds to wait for post-update readiness; clamped to [2m, 30m], default 10m
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check_timeout_seconds: Option<u32>,

    /// Take a backup before applying an update (requires persistence)
    #[serde(default)]
    pub backup_before_update: bool,

    /// Revert the version automatically when the health check times out
    #[serde(default = "default_true")]
    pub rollback_on_failure: bool,
}

fn default_true() -> bool {
    true
}

impl UpdatePolicy {
    /// The effective check interval, clamped into its allowed range
    pub fn check_interval(&self) -> Duration {
        let secs = self
            .check_interval_seconds
            .unwrap_or(CHECK_INTERVAL_DEFAULT_SECS)
            .clamp(CHECK_INTERVAL_MIN_SECS, CHECK_INTERVAL_MAX_SECS);
        Duration::from_secs(u64::from(secs))
    }

    /// The effective health check window, clamped into its allowed range
    pub fn health_check_timeout(&self) -> Duration {
        let secs = self
            .health_check_timeout_seconds
            .unwrap_or(HEALTH_TIMEOUT_DEFAULT_SECS)
            .clamp(HEALTH_TIMEOUT_MIN_SECS, HEALTH_TIMEOUT_MAX_SECS);
        Duration::from_secs(u64::from(secs))
    }
}

/// Persistent storage configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PersistenceSpec {
    /// Whether the instance mounts persistent storage
    #[serde(default)]
    pub enabled: bool,

    /// Requested volume size (e.g. "10Gi")
    #[serde(default = "default_volume_size")]
    pub size: String,

    /// Storage class; omitted means the cluster default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
}

fn default_volume_size() -> String {
    "10Gi".to_string()
}

/// Periodic backup policy
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BackupPolicy {
    /// Seconds between periodic backups
    pub interval_seconds: u32,
}

impl BackupPolicy {
    /// The periodic backup interval
    pub fn interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.interval_seconds))
    }
}

/// Self-service configuration policy
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SelfConfigPolicy {
    /// Whether the instance accepts RoostConfigRequest mutations
    #[serde(default)]
    pub enabled: bool,

    /// Action categories the instance allows
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed: Vec<ActionCategory>,
}

/// Ingress exposure configuration
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IngressSpec {
    /// Hostname the instance is served under
    pub host: String,

    /// TLS secret name; omitted means plain HTTP
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_secret: Option<String>,
}

/// A named environment variable on the instance runtime
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct EnvVarSpec {
    /// Variable name
    pub name: String,
    /// Variable value
    pub value: String,
}

/// Categories a configuration change request can act in
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ActionCategory {
    /// Skill list additions/removals
    Skills,
    /// Configuration document patches
    Configuration,
    /// Workspace file upserts/deletes
    WorkspaceFiles,
    /// Environment variable upserts/deletes
    EnvironmentVars,
}

impl std::fmt::Display for ActionCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Skills => write!(f, "skills"),
            Self::Configuration => write!(f, "configuration"),
            Self::WorkspaceFiles => write!(f, "workspaceFiles"),
            Self::EnvironmentVars => write!(f, "environmentVars"),
        }
    }
}

/// Instance lifecycle phase
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[non_exhaustive]
pub enum InstancePhase {
    /// Instance has been seen but not yet processed
    #[default]
    Pending,
    /// Declarative sub-resources are being created or converged
    Provisioning,
    /// Instance is fully converged and serving
    Running,
    /// An update cycle owns the instance
    Updating,
    /// A sub-resource failed to converge; backing off
    Failed,
    /// Deletion in progress (finalizer held)
    Terminating,
    /// A backup job is moving data out
    BackingUp,
    /// A restore job is moving data in
    Restoring,
}

impl InstancePhase {
    /// Metric label value for this phase
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Provisioning => "provisioning",
            Self::Running => "running",
            Self::Updating => "updating",
            Self::Failed => "failed",
            Self::Terminating => "terminating",
            Self::BackingUp => "backing_up",
            Self::Restoring => "restoring",
        }
    }
}

impl std::fmt::Display for InstancePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Provisioning => write!(f, "Provisioning"),
            Self::Running => write!(f, "Running"),
            Self::Updating => write!(f, "Updating"),
            Self::Failed => write!(f, "Failed"),
            Self::Terminating => write!(f, "Terminating"),
            Self::BackingUp => write!(f, "BackingUp"),
            Self::Restoring => write!(f, "Restoring"),
        }
    }
}

/// State of an open update cycle
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[non_exhaustive]
pub enum UpdatePhase {
    /// Taking a pre-update backup (workload scaled to zero)
    BackingUp,
    /// The new tag has been written; waiting to enter health check
    ApplyingUpdate,
    /// Polling workload readiness on the new revision
    HealthCheck,
    /// Reverting to the previous version
    RollingBack,
}

impl std::fmt::Display for UpdatePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BackingUp => write!(f, "BackingUp"),
            Self::ApplyingUpdate => write!(f, "ApplyingUpdate"),
            Self::HealthCheck => write!(f, "HealthCheck"),
            Self::RollingBack => write!(f, "RollingBack"),
        }
    }
}

/// Terminal and non-terminal phases of a configuration change request
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[non_exhaustive]
pub enum RequestPhase {
    /// Not yet processed
    #[default]
    Pending,
    /// All requested mutations were written to the parent
    Applied,
    /// Processing failed terminally
    Failed,
    /// The parent's policy rejected the request
    Denied,
}

impl RequestPhase {
    /// True for phases a request never leaves
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Applied | Self::Failed | Self::Denied)
    }
}

impl std::fmt::Display for RequestPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Applied => write!(f, "Applied"),
            Self::Failed => write!(f, "Failed"),
            Self::Denied => write!(f, "Denied"),
        }
    }
}

/// Condition status following Kubernetes conventions
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Kubernetes-style condition for status reporting
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Condition {
    /// Type of condition (e.g. Ready, UpdateAvailable)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    pub reason: String,

    /// Human-readable message
    pub message: String,

    /// Last time the condition transitioned
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Create a new condition with the current timestamp
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }
}

/// Well-known condition types
pub mod condition_types {
    /// The instance is fully converged and serving
    pub const READY: &str = "Ready";
    /// A strictly newer version is available in the registry
    pub const UPDATE_AVAILABLE: &str = "UpdateAvailable";
}

#[cfg(test)]
mod tests {
    use super::*;

    mod image_spec {
        use super::*;

        #[test]
        fn reference_uses_tag() {
            let image = ImageSpec {
                repository: "ghcr.io/roost-run/runtime".to_string(),
                tag: "2.4.1".to_string(),
                digest: None,
            };
            assert_eq!(image.reference(), "ghcr.io/roost-run/runtime:2.4.1");
            assert!(!image.is_pinned());
        }

        #[test]
        fn digest_pin_wins_over_tag() {
            let image = ImageSpec {
                repository: "ghcr.io/roost-run/runtime".to_string(),
                tag: "2.4.1".to_string(),
                digest: Some("sha256:abcd".to_string()),
            };
            assert_eq!(image.reference(), "ghcr.io/roost-run/runtime@sha256:abcd");
            assert!(image.is_pinned());
        }
    }

    mod update_policy {
        use super::*;

        #[test]
        fn check_interval_defaults_to_24h() {
            let policy = UpdatePolicy::default();
            assert_eq!(policy.check_interval(), Duration::from_secs(86_400));
        }

        #[test]
        fn check_interval_clamps_low_and_high() {
            let mut policy = UpdatePolicy {
                check_interval_seconds: Some(60),
                ..Default::default()
            };
            assert_eq!(policy.check_interval(), Duration::from_secs(3_600));

            policy.check_interval_seconds = Some(10_000_000);
            assert_eq!(policy.check_interval(), Duration::from_secs(604_800));
        }

        /// A requested "30s" yields 2m; a requested "2h" yields 30m.
        #[test]
        fn health_timeout_clamps_into_range() {
            let mut policy = UpdatePolicy {
                health_check_timeout_seconds: Some(30),
                ..Default::default()
            };
            assert_eq!(policy.health_check_timeout(), Duration::from_secs(120));

            policy.health_check_timeout_seconds = Some(7_200);
            assert_eq!(policy.health_check_timeout(), Duration::from_secs(1_800));

            policy.health_check_timeout_seconds = None;
            assert_eq!(policy.health_check_timeout(), Duration::from_secs(600));
        }

        #[test]
        fn rollback_on_failure_defaults_true() {
            let json = r#"{"enabled":true}"#;
            let policy: UpdatePolicy = serde_json::from_str(json).unwrap();
            assert!(policy.rollback_on_failure);
        }
    }

    // ==========================================================================
    // Story Tests: Instance State Machine
    // ==========================================================================
    //
    // Instances transition through phases during their lifecycle:
    // Pending -> Provisioning -> Running, with excursions into Updating,
    // BackingUp, Restoring, Failed, and finally Terminating.

    mod instance_lifecycle {
        use super::*;

        /// Story: a new instance starts in Pending phase
        #[test]
        fn story_new_instance_starts_pending() {
            let phase = InstancePhase::default();
            assert_eq!(phase, InstancePhase::Pending);
            assert_eq!(phase.to_string(), "Pending");
        }

        /// Story: phases serialize round-trip for the status subresource
        #[test]
        fn story_phase_serialization_for_kubernetes() {
            let phases = [
                InstancePhase::Pending,
                InstancePhase::Provisioning,
                InstancePhase::Running,
                InstancePhase::Updating,
                InstancePhase::Failed,
                InstancePhase::Terminating,
                InstancePhase::BackingUp,
                InstancePhase::Restoring,
            ];
            for phase in phases {
                let json = serde_json::to_string(&phase).unwrap();
                let parsed: InstancePhase = serde_json::from_str(&json).unwrap();
                assert_eq!(phase, parsed);
            }
        }
    }

    mod request_phase {
        use super::*;

        #[test]
        fn terminal_phases() {
            assert!(!RequestPhase::Pending.is_terminal());
            assert!(RequestPhase::Applied.is_terminal());
            assert!(RequestPhase::Failed.is_terminal());
            assert!(RequestPhase::Denied.is_terminal());
        }
    }

    mod conditions {
        use super::*;

        #[test]
        fn new_sets_timestamp() {
            let before = Utc::now();
            let condition = Condition::new(
                condition_types::READY,
                ConditionStatus::True,
                "Converged",
                "All sub-resources applied",
            );
            let after = Utc::now();

            assert_eq!(condition.type_, "Ready");
            assert_eq!(condition.status, ConditionStatus::True);
            assert!(condition.last_transition_time >= before);
            assert!(condition.last_transition_time <= after);
        }

        #[test]
        fn default_condition_status_is_unknown() {
            assert_eq!(ConditionStatus::default(), ConditionStatus::Unknown);
        }
    }

    mod action_category {
        use super::*;

        #[test]
        fn display_matches_serde_casing() {
            assert_eq!(ActionCategory::Skills.to_string(), "skills");
            assert_eq!(ActionCategory::WorkspaceFiles.to_string(), "workspaceFiles");
            assert_eq!(
                serde_json::to_string(&ActionCategory::EnvironmentVars).unwrap(),
                "\"environmentVars\""
            );
        }
    }
}
