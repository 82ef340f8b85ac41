//! Common types for the Roost operator: CRDs, errors, and utilities

#![deny(missing_docs)]

pub mod credentials;
pub mod crd;
pub mod error;
pub mod events;
pub mod metrics;
pub mod names;
pub mod retry;
pub mod step;

pub use error::Error;
pub use step::StepOutcome;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Namespace for Roost system resources (operator, credentials)
pub const ROOST_SYSTEM_NAMESPACE: &str = "roost-system";

/// Name of the Secret in [`ROOST_SYSTEM_NAMESPACE`] holding blob-store credentials
pub const BACKUP_CREDENTIALS_SECRET: &str = "roost-backup-credentials";

/// Label key identifying the tenant an instance belongs to
pub const TENANT_LABEL: &str = "roost.dev/tenant";

/// Label key for the managing component
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Value of [`LABEL_MANAGED_BY`] for resources this operator owns
pub const LABEL_MANAGED_BY_ROOST: &str = "roost-operator";

/// Label key naming the owning instance on managed sub-resources
pub const INSTANCE_LABEL: &str = "roost.dev/instance";

/// Finalizer preventing garbage collection until deprovisioning completes
pub const INSTANCE_FINALIZER: &str = "roost.dev/deprovision";

/// Annotation that skips the delete-time backup when present
pub const SKIP_FINAL_BACKUP_ANNOTATION: &str = "roost.dev/skip-final-backup";
