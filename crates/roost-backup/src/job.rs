//! Data-mover Job construction
//!
//! Builds the Kubernetes batch Job that copies bytes between an instance's
//! volume and the blob store. Each Job runs a single `data-mover` container
//! with the instance PVC mounted and credentials passed through env vars.
//! The underlying storage is single-writer: callers scale the workload to
//! zero and confirm zero running pods before creating a Job.

use std::collections::BTreeMap;

use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, PersistentVolumeClaimVolumeSource, PodSpec, PodTemplateSpec, Volume,
    VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;

use roost_common::credentials::BackupCredentials;
use roost_common::{INSTANCE_LABEL, LABEL_MANAGED_BY, LABEL_MANAGED_BY_ROOST};

/// Mount point of the instance volume inside the data-mover container
const DATA_MOUNT_PATH: &str = "/data";

/// Annotation recording which blob-store path a Job moves data for.
///
/// Job names are deterministic and reused across cycles; the annotation is
/// how the protocol tells a leftover terminal Job from the current one.
pub const REMOTE_PATH_ANNOTATION: &str = "roost.dev/remote-path";

/// Direction of a data transfer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferDirection {
    /// Volume to blob store
    Backup,
    /// Blob store to volume
    Restore,
}

impl TransferDirection {
    /// The data-mover's `--mode` argument value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Backup => "backup",
            Self::Restore => "restore",
        }
    }
}

/// The five flows that reuse the transfer primitive.
///
/// Each purpose has a deterministic job name, which is what makes the
/// create-or-poll protocol idempotent across redeliveries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferPurpose {
    /// Backup taken before applying a version update
    PreUpdateBackup,
    /// Backup taken while the deletion finalizer is held
    FinalBackup,
    /// Scheduled periodic backup
    PeriodicBackup,
    /// Restore of the pre-update backup during rollback
    RollbackRestore,
    /// Restore from a declared snapshot on first provisioning
    SeedRestore,
}

impl TransferPurpose {
    /// Direction of data movement for this purpose
    pub fn direction(&self) -> TransferDirection {
        match self {
            Self::PreUpdateBackup | Self::FinalBackup | Self::PeriodicBackup => {
                TransferDirection::Backup
            }
            Self::RollbackRestore | Self::SeedRestore => TransferDirection::Restore,
        }
    }

    /// Deterministic Job name for this purpose on the given instance
    pub fn job_name(&self, instance: &str) -> String {
        let suffix = match self {
            Self::PreUpdateBackup => "backup-pre-update",
            Self::FinalBackup => "backup-final",
            Self::PeriodicBackup => "backup-periodic",
            Self::RollbackRestore => "restore-rollback",
            Self::SeedRestore => "restore-seed",
        };
        format!("{}-{}", instance, suffix)
    }
}

/// Everything needed to build one data-mover Job
#[derive(Clone, Debug)]
pub struct TransferSpec {
    /// What this transfer is for (fixes direction and job name)
    pub purpose: TransferPurpose,
    /// Owning instance name
    pub instance: String,
    /// Owning instance UID (for the owner reference)
    pub instance_uid: String,
    /// Namespace the Job runs in
    pub namespace: String,
    /// PVC holding the instance's data
    pub pvc_name: String,
    /// Blob-store path relative to the bucket
    pub remote_path: String,
    /// Data-mover container image
    pub image: String,
}

impl TransferSpec {
    /// The Job name this spec resolves to
    pub fn job_name(&self) -> String {
        self.purpose.job_name(&self.instance)
    }
}

/// Build the data-mover Job for a transfer.
///
/// The Job:
/// - runs a single `data-mover` container
/// - mounts the instance PVC at `/data`
/// - passes `--mode`, `--local`, `--remote` args
/// - receives blob-store credentials through env vars
/// - sets `ownerReferences` to the RoostInstance (garbage collection)
/// - uses `backoffLimit: 3`; completed Jobs linger for an hour so the
///   poll loop can read their terminal condition before GC
pub fn build_transfer_job(spec: &TransferSpec, credentials: &BackupCredentials) -> Job {
    let job_name = spec.job_name();

    let mut labels = BTreeMap::new();
    labels.insert(LABEL_MANAGED_BY.to_string(), LABEL_MANAGED_BY_ROOST.to_string());
    labels.insert(INSTANCE_LABEL.to_string(), spec.instance.clone());

    let mut env = vec![
        EnvVar {
            name: "ROOST_BLOB_KEY_ID".to_string(),
            value: Some(credentials.key_id.clone()),
            ..Default::default()
        },
        EnvVar {
            name: "ROOST_BLOB_APP_KEY".to_string(),
            value: Some(credentials.app_key.clone()),
            ..Default::default()
        },
        EnvVar {
            name: "ROOST_BLOB_ENDPOINT".to_string(),
            value: Some(credentials.endpoint.clone()),
            ..Default::default()
        },
    ];
    if let Some(region) = &credentials.region {
        env.push(EnvVar {
            name: "ROOST_BLOB_REGION".to_string(),
            value: Some(region.clone()),
            ..Default::default()
        });
    }

    let container = Container {
        name: "data-mover".to_string(),
        image: Some(spec.image.clone()),
        command: Some(vec!["data-mover".to_string()]),
        args: Some(vec![
            format!("--mode={}", spec.purpose.direction().as_str()),
            format!("--local={}", DATA_MOUNT_PATH),
            format!("--remote={}/{}", credentials.bucket, spec.remote_path),
        ]),
        env: Some(env),
        volume_mounts: Some(vec![VolumeMount {
            name: "instance-data".to_string(),
            mount_path: DATA_MOUNT_PATH.to_string(),
            ..Default::default()
        }]),
        ..Default::default()
    };

    let volume = Volume {
        name: "instance-data".to_string(),
        persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
            claim_name: spec.pvc_name.clone(),
            read_only: Some(false),
        }),
        ..Default::default()
    };

    let mut annotations = BTreeMap::new();
    annotations.insert(REMOTE_PATH_ANNOTATION.to_string(), spec.remote_path.clone());

    Job {
        metadata: ObjectMeta {
            name: Some(job_name),
            namespace: Some(spec.namespace.clone()),
            labels: Some(labels.clone()),
            annotations: Some(annotations),
            owner_references: Some(vec![OwnerReference {
                api_version: "roost.dev/v1alpha1".to_string(),
                kind: "RoostInstance".to_string(),
                name: spec.instance.clone(),
                uid: spec.instance_uid.clone(),
                controller: Some(true),
                block_owner_deletion: Some(true),
            }]),
            ..Default::default()
        },
        spec: Some(JobSpec {
            backoff_limit: Some(3),
            ttl_seconds_after_finished: Some(3600),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    volumes: Some(vec![volume]),
                    restart_policy: Some("OnFailure".to_string()),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Check if a Job has completed successfully
pub fn is_job_complete(job: &Job) -> bool {
    job.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Complete" && c.status == "True")
        })
        .unwrap_or(false)
}

/// Check if a Job has failed
pub fn is_job_failed(job: &Job) -> bool {
    job.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Failed" && c.status == "True")
        })
        .unwrap_or(false)
}

/// Extract the failure message from a failed Job
pub fn job_failure_message(job: &Job) -> Option<String> {
    job.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .and_then(|conditions| {
            conditions
                .iter()
                .find(|c| c.type_ == "Failed" && c.status == "True")
                .and_then(|c| c.message.clone())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::batch::v1::{JobCondition, JobStatus};

    fn sample_credentials() -> BackupCredentials {
        BackupCredentials {
            bucket: "roost-backups".to_string(),
            key_id: "K001".to_string(),
            app_key: "s3cret".to_string(),
            endpoint: "https://blob.example.com".to_string(),
            region: None,
        }
    }

    fn sample_spec(purpose: TransferPurpose) -> TransferSpec {
        TransferSpec {
            purpose,
            instance: "alpha".to_string(),
            instance_uid: "uid-123".to_string(),
            namespace: "tenant-a".to_string(),
            pvc_name: "alpha-data".to_string(),
            remote_path: "acme/alpha/20260807-143000".to_string(),
            image: "ghcr.io/roost-run/data-mover:v2".to_string(),
        }
    }

    #[test]
    fn job_names_are_deterministic_per_purpose() {
        assert_eq!(
            TransferPurpose::PreUpdateBackup.job_name("alpha"),
            "alpha-backup-pre-update"
        );
        assert_eq!(
            TransferPurpose::FinalBackup.job_name("alpha"),
            "alpha-backup-final"
        );
        assert_eq!(
            TransferPurpose::RollbackRestore.job_name("alpha"),
            "alpha-restore-rollback"
        );
        assert_eq!(
            TransferPurpose::SeedRestore.job_name("alpha"),
            "alpha-restore-seed"
        );
        assert_eq!(
            TransferPurpose::PeriodicBackup.job_name("alpha"),
            "alpha-backup-periodic"
        );
    }

    #[test]
    fn purposes_map_to_directions() {
        assert_eq!(
            TransferPurpose::PreUpdateBackup.direction(),
            TransferDirection::Backup
        );
        assert_eq!(
            TransferPurpose::SeedRestore.direction(),
            TransferDirection::Restore
        );
        assert_eq!(
            TransferPurpose::RollbackRestore.direction(),
            TransferDirection::Restore
        );
    }

    #[test]
    fn job_mounts_pvc_and_sets_owner() {
        let job = build_transfer_job(
            &sample_spec(TransferPurpose::PreUpdateBackup),
            &sample_credentials(),
        );
        assert_eq!(job.metadata.name.as_deref(), Some("alpha-backup-pre-update"));
        assert_eq!(job.metadata.namespace.as_deref(), Some("tenant-a"));

        let refs = job.metadata.owner_references.as_ref().unwrap();
        assert_eq!(refs[0].kind, "RoostInstance");
        assert_eq!(refs[0].uid, "uid-123");

        let pod_spec = job.spec.as_ref().unwrap().template.spec.as_ref().unwrap();
        let volumes = pod_spec.volumes.as_ref().unwrap();
        assert_eq!(
            volumes[0].persistent_volume_claim.as_ref().unwrap().claim_name,
            "alpha-data"
        );
    }

    #[test]
    fn backup_job_args_point_at_bucket_path() {
        let job = build_transfer_job(
            &sample_spec(TransferPurpose::PeriodicBackup),
            &sample_credentials(),
        );
        let args = job.spec.as_ref().unwrap().template.spec.as_ref().unwrap().containers[0]
            .args
            .as_ref()
            .unwrap()
            .clone();
        assert!(args.contains(&"--mode=backup".to_string()));
        assert!(args.contains(&"--local=/data".to_string()));
        assert!(args
            .contains(&"--remote=roost-backups/acme/alpha/20260807-143000".to_string()));
    }

    #[test]
    fn restore_job_uses_restore_mode() {
        let job = build_transfer_job(
            &sample_spec(TransferPurpose::SeedRestore),
            &sample_credentials(),
        );
        let args = job.spec.as_ref().unwrap().template.spec.as_ref().unwrap().containers[0]
            .args
            .as_ref()
            .unwrap()
            .clone();
        assert!(args.contains(&"--mode=restore".to_string()));
    }

    #[test]
    fn region_env_only_when_present() {
        let mut creds = sample_credentials();
        let job = build_transfer_job(&sample_spec(TransferPurpose::FinalBackup), &creds);
        let env_names: Vec<String> = job.spec.as_ref().unwrap().template.spec.as_ref().unwrap().containers[0]
            .env
            .as_ref()
            .unwrap()
            .iter()
            .map(|e| e.name.clone())
            .collect();
        assert!(!env_names.contains(&"ROOST_BLOB_REGION".to_string()));

        creds.region = Some("eu-central-003".to_string());
        let job = build_transfer_job(&sample_spec(TransferPurpose::FinalBackup), &creds);
        let env_names: Vec<String> = job.spec.as_ref().unwrap().template.spec.as_ref().unwrap().containers[0]
            .env
            .as_ref()
            .unwrap()
            .iter()
            .map(|e| e.name.clone())
            .collect();
        assert!(env_names.contains(&"ROOST_BLOB_REGION".to_string()));
    }

    #[test]
    fn job_has_backoff_and_lingering_ttl() {
        let job = build_transfer_job(
            &sample_spec(TransferPurpose::PreUpdateBackup),
            &sample_credentials(),
        );
        let job_spec = job.spec.as_ref().unwrap();
        assert_eq!(job_spec.backoff_limit, Some(3));
        assert_eq!(job_spec.ttl_seconds_after_finished, Some(3600));
    }

    // =========================================================================
    // Job status helper tests
    // =========================================================================

    fn job_with_condition(type_: &str, status: &str) -> Job {
        Job {
            status: Some(JobStatus {
                conditions: Some(vec![JobCondition {
                    type_: type_.to_string(),
                    status: status.to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn complete_condition_detected() {
        assert!(is_job_complete(&job_with_condition("Complete", "True")));
        assert!(!is_job_complete(&job_with_condition("Failed", "True")));
        assert!(!is_job_complete(&Job::default()));
    }

    #[test]
    fn failed_condition_detected() {
        assert!(is_job_failed(&job_with_condition("Failed", "True")));
        assert!(!is_job_failed(&job_with_condition("Complete", "True")));
        assert!(!is_job_failed(&Job::default()));
    }

    #[test]
    fn failure_message_extracted() {
        let job = Job {
            status: Some(JobStatus {
                conditions: Some(vec![JobCondition {
                    type_: "Failed".to_string(),
                    status: "True".to_string(),
                    message: Some("BackoffLimitExceeded".to_string()),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(job_failure_message(&job), Some("BackoffLimitExceeded".to_string()));
        assert_eq!(job_failure_message(&job_with_condition("Complete", "True")), None);
    }
}
