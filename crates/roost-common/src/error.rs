//! Error types for the Roost operator
//!
//! Errors are structured with fields to aid debugging in production.
//! Each variant carries contextual information like instance names,
//! job names, and underlying causes.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for Roost operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Validation error for CRD specs
    #[error("validation error for {instance}: {message}")]
    Validation {
        /// Name of the instance with invalid configuration
        instance: String,
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "spec.update.checkIntervalSeconds")
        field: Option<String>,
    },

    /// Policy violation (denied self-config category, protected key)
    #[error("policy violation for {instance}: {message}")]
    Policy {
        /// Name of the instance whose policy rejected the request
        instance: String,
        /// Description of what was denied
        message: String,
    },

    /// Data-mover job failure
    #[error("transfer job error [{job}] for {instance}: {message}")]
    Job {
        /// Name of the instance the job was moving data for
        instance: String,
        /// Name of the batch job
        job: String,
        /// Description of what failed
        message: String,
    },

    /// Version registry error
    #[error("registry error [{repository}]: {message}")]
    Registry {
        /// Repository that was being queried
        repository: String,
        /// Description of what failed
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "reconciler", "engine")
        context: String,
    },
}

impl Error {
    /// Create a validation error with the given message
    ///
    /// For simple validation errors without instance context.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            instance: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with instance context
    pub fn validation_for(instance: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            instance: instance.into(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with instance context and field path
    pub fn validation_for_field(
        instance: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            instance: instance.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a policy violation error
    pub fn policy(instance: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Policy {
            instance: instance.into(),
            message: msg.into(),
        }
    }

    /// Create a transfer job error
    pub fn job(
        instance: impl Into<String>,
        job: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Job {
            instance: instance.into(),
            job: job.into(),
            message: msg.into(),
        }
    }

    /// Create a registry error
    pub fn registry(repository: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Registry {
            repository: repository.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Validation, policy, and serialization errors are not retryable
    /// (they require a spec or request change). Registry, job, and internal
    /// errors may succeed on redelivery. Kubernetes errors depend on the
    /// status code.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => {
                // Retry conflicts and transient K8s errors, not other 4xx.
                matches!(source, kube::Error::Api(ae) if ae.code == 409)
                    || !matches!(
                        source,
                        kube::Error::Api(ae) if (400..500).contains(&ae.code)
                    )
            }
            Error::Validation { .. } => false,
            Error::Policy { .. } => false,
            Error::Job { .. } => true,
            Error::Registry { .. } => true,
            Error::Serialization { .. } => false,
            Error::Internal { .. } => true,
        }
    }

    /// Get the instance name if this error is associated with one
    pub fn instance(&self) -> Option<&str> {
        match self {
            Error::Validation { instance, .. } => Some(instance),
            Error::Policy { instance, .. } => Some(instance),
            Error::Job { instance, .. } => Some(instance),
            _ => None,
        }
    }

    /// True when the underlying cause is a Kubernetes 404
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Kube { source: kube::Error::Api(ae) } if ae.code == 404)
    }

    /// True when the underlying cause is a Kubernetes 409 conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Kube { source: kube::Error::Api(ae) } if ae.code == 409)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Story: spec validation catches misconfigurations before provisioning
    ///
    /// When a tenant creates an instance with an invalid spec, the
    /// validation layer rejects it immediately with a clear message.
    #[test]
    fn story_validation_prevents_invalid_instance() {
        let err = Error::validation("persistence size '10potatoes' is not a quantity");
        assert!(err.to_string().contains("validation error"));
        assert!(!err.is_retryable());

        let err = Error::validation_for_field(
            "alpha",
            "spec.update.checkIntervalSeconds",
            "must be a positive integer",
        );
        match &err {
            Error::Validation { field, .. } => {
                assert_eq!(field.as_deref(), Some("spec.update.checkIntervalSeconds"));
            }
            _ => panic!("expected Validation variant"),
        }
        assert_eq!(err.instance(), Some("alpha"));
    }

    /// Story: policy violations are terminal and carry the instance name
    #[test]
    fn story_policy_violations_are_terminal() {
        let err = Error::policy("alpha", "category 'configuration' not in allow-list");
        assert!(!err.is_retryable());
        assert_eq!(err.instance(), Some("alpha"));
        assert!(err.to_string().contains("policy violation"));
    }

    /// Story: data-mover job failures name both the instance and the job
    ///
    /// The caller decides severity: a failed delete-time backup blocks
    /// deletion, a failed pre-update backup merely aborts the update.
    #[test]
    fn story_job_errors_carry_job_context() {
        let err = Error::job("alpha", "backup-alpha-pre-update", "BackoffLimitExceeded");
        assert!(err.to_string().contains("backup-alpha-pre-update"));
        assert!(err.is_retryable());
    }

    #[test]
    fn registry_errors_are_retryable() {
        let err = Error::registry("roost-run/runtime", "tag list timed out");
        assert!(err.is_retryable());
        assert!(err.to_string().contains("roost-run/runtime"));
    }

    #[test]
    fn serialization_errors_are_not_retryable() {
        let err = Error::serialization_for_kind("RoostInstance", "missing field 'spec'");
        assert!(!err.is_retryable());
        match &err {
            Error::Serialization { kind, .. } => {
                assert_eq!(kind.as_deref(), Some("RoostInstance"));
            }
            _ => panic!("expected Serialization variant"),
        }
    }

    #[test]
    fn internal_errors_default_context() {
        let err = Error::internal("unexpected state");
        assert!(err.to_string().contains("[unknown]"));
        assert!(err.is_retryable());

        let err = Error::internal_with_context("engine", "unexpected state");
        assert!(err.to_string().contains("[engine]"));
    }
}
