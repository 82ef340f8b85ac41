//! RoostConfigRequest Custom Resource Definition
//!
//! A one-shot request, created by an agent or operator, proposing
//! mutations to a RoostInstance's spec. Processed to exactly one terminal
//! phase, retained for a fixed window, then deleted by its own reconciler.
//!
//! The parent reference is a plain name in the same namespace — not an
//! owner reference. An ownership link is attached only after a successful
//! apply, so the two lifecycles stay decoupled until the request lands.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{EnvVarSpec, RequestPhase};

/// Specification for a RoostConfigRequest
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "roost.dev",
    version = "v1alpha1",
    kind = "RoostConfigRequest",
    plural = "roostconfigrequests",
    shortname = "rcr",
    status = "RoostConfigRequestStatus",
    namespaced,
    printcolumn = r#"{"name":"Instance","type":"string","jsonPath":".spec.instance"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RoostConfigRequestSpec {
    /// Name of the parent RoostInstance in the same namespace
    pub instance: String,

    /// Skills to append (order-preserving, de-duplicating)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add_skills: Vec<String>,

    /// Skills to remove (set subtraction)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove_skills: Vec<String>,

    /// Configuration patch, merged key-wise into the instance configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_patch: Option<serde_json::Value>,

    /// Workspace files to upsert, name to content
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub add_files: BTreeMap<String, String>,

    /// Workspace files to delete by name
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove_files: Vec<String>,

    /// Environment variables to upsert by name
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub set_env: Vec<EnvVarSpec>,

    /// Environment variables to delete by name
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove_env: Vec<String>,
}

/// Status for a RoostConfigRequest
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoostConfigRequestStatus {
    /// Current phase; transitions one-way into a terminal state
    #[serde(default)]
    pub phase: RequestPhase,

    /// Human-readable outcome message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// When the request reached its terminal phase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<DateTime<Utc>>,
}

impl RoostConfigRequestStatus {
    /// Build a terminal status stamped with the current time
    pub fn terminal(phase: RequestPhase, message: impl Into<String>) -> Self {
        Self {
            phase,
            message: Some(message.into()),
            completion_time: Some(Utc::now()),
        }
    }
}

impl RoostConfigRequest {
    /// The request's current phase
    pub fn phase(&self) -> RequestPhase {
        self.status
            .as_ref()
            .map(|s| s.phase.clone())
            .unwrap_or_default()
    }

    /// True once the request has reached a terminal phase
    pub fn is_terminal(&self) -> bool {
        self.phase().is_terminal()
    }
}
