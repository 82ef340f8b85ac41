//! Custom Resource Definitions for the Roost operator

mod config_request;
mod instance;
mod types;

pub use config_request::{RoostConfigRequest, RoostConfigRequestSpec, RoostConfigRequestStatus};
pub use instance::{RoostInstance, RoostInstanceSpec, RoostInstanceStatus, UpdateStatus};
pub use types::{
    condition_types, ActionCategory, BackupPolicy, Condition, ConditionStatus, EnvVarSpec,
    ImageSpec, IngressSpec, InstancePhase, PersistenceSpec, RequestPhase, SelfConfigPolicy,
    UpdatePhase, UpdatePolicy, CHECK_INTERVAL_DEFAULT_SECS, CHECK_INTERVAL_MAX_SECS,
    CHECK_INTERVAL_MIN_SECS, HEALTH_TIMEOUT_DEFAULT_SECS, HEALTH_TIMEOUT_MAX_SECS,
    HEALTH_TIMEOUT_MIN_SECS, MAX_CONSECUTIVE_ROLLBACKS,
};
