//! Create-or-poll protocol over data-mover Jobs
//!
//! Every call either creates the Job (tolerating a duplicate-create race
//! as "in progress", not an error) or inspects an existing Job's terminal
//! condition. The call never blocks; callers translate `InProgress` into
//! a requeue.
//!
//! Job names are deterministic per (instance, purpose), which is what makes
//! redelivery idempotent. A leftover Job from an earlier cycle is detected
//! by its remote-path annotation and replaced; callers additionally call
//! [`remove_transfer`] once they have recorded a terminal outcome.

use k8s_openapi::api::batch::v1::Job;
use kube::api::{Api, DeleteParams, PostParams, PropagationPolicy};
use kube::Client;
use tracing::{debug, info};

use roost_common::credentials::BackupCredentials;
use roost_common::Result;

use crate::job::{
    build_transfer_job, is_job_complete, is_job_failed, job_failure_message, TransferPurpose,
    TransferSpec, REMOTE_PATH_ANNOTATION,
};

/// Observed state of one transfer
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobOutcome {
    /// The Job reached its Complete condition
    Succeeded,
    /// The Job reached its Failed condition; the caller decides severity
    Failed(String),
    /// The Job exists but has no terminal condition yet, or was just created
    InProgress,
}

/// Drive one transfer forward by a single non-blocking step.
///
/// Idempotent: safe to call on every reconcile of the owning instance.
/// A 409 on create means a concurrent reconcile won the race — that is
/// `InProgress`, not an error.
pub async fn ensure_transfer(
    client: &Client,
    spec: &TransferSpec,
    credentials: &BackupCredentials,
) -> Result<JobOutcome> {
    let jobs: Api<Job> = Api::namespaced(client.clone(), &spec.namespace);
    let job_name = spec.job_name();

    match jobs.get_opt(&job_name).await? {
        Some(existing) if remote_path_of(&existing) != Some(spec.remote_path.as_str()) => {
            // A terminal Job from an earlier cycle still holds the name.
            info!(
                job = %job_name,
                stale_path = ?remote_path_of(&existing),
                "replacing stale data-mover job"
            );
            delete_job(&jobs, &job_name).await?;
            Ok(JobOutcome::InProgress)
        }
        Some(existing) => Ok(inspect(&job_name, &existing)),
        None => {
            let job = build_transfer_job(spec, credentials);
            info!(
                job = %job_name,
                instance = %spec.instance,
                mode = %spec.purpose.direction().as_str(),
                remote = %spec.remote_path,
                "creating data-mover job"
            );
            match jobs.create(&PostParams::default(), &job).await {
                Ok(_) => Ok(JobOutcome::InProgress),
                Err(kube::Error::Api(ae)) if ae.code == 409 => {
                    debug!(job = %job_name, "job already created by a concurrent reconcile");
                    Ok(JobOutcome::InProgress)
                }
                Err(e) => Err(e.into()),
            }
        }
    }
}

/// Delete a transfer's Job once its terminal outcome has been recorded.
///
/// Best called after the status patch that consumes the outcome, so a crash
/// between the two leaves the Job (harmless: the annotation check replaces
/// it) rather than losing the result.
pub async fn remove_transfer(
    client: &Client,
    namespace: &str,
    instance: &str,
    purpose: TransferPurpose,
) -> Result<()> {
    let jobs: Api<Job> = Api::namespaced(client.clone(), namespace);
    delete_job(&jobs, &purpose.job_name(instance)).await
}

async fn delete_job(jobs: &Api<Job>, name: &str) -> Result<()> {
    let dp = DeleteParams {
        propagation_policy: Some(PropagationPolicy::Background),
        ..Default::default()
    };
    match jobs.delete(name, &dp).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn remote_path_of(job: &Job) -> Option<&str> {
    job.metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(REMOTE_PATH_ANNOTATION))
        .map(String::as_str)
}

/// Read a Job's terminal condition into a [`JobOutcome`].
pub fn inspect(job_name: &str, job: &Job) -> JobOutcome {
    if is_job_complete(job) {
        JobOutcome::Succeeded
    } else if is_job_failed(job) {
        let msg = job_failure_message(job).unwrap_or_else(|| "unknown failure".to_string());
        JobOutcome::Failed(msg)
    } else {
        debug!(job = %job_name, "data-mover job still running");
        JobOutcome::InProgress
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::batch::v1::{JobCondition, JobStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn job_with_condition(type_: &str, status: &str, message: Option<&str>) -> Job {
        Job {
            status: Some(JobStatus {
                conditions: Some(vec![JobCondition {
                    type_: type_.to_string(),
                    status: status.to_string(),
                    message: message.map(|m| m.to_string()),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn inspect_complete_job() {
        let job = job_with_condition("Complete", "True", None);
        assert_eq!(inspect("j", &job), JobOutcome::Succeeded);
    }

    #[test]
    fn inspect_failed_job_carries_message() {
        let job = job_with_condition("Failed", "True", Some("BackoffLimitExceeded"));
        assert_eq!(
            inspect("j", &job),
            JobOutcome::Failed("BackoffLimitExceeded".to_string())
        );
    }

    #[test]
    fn inspect_failed_job_without_message() {
        let job = job_with_condition("Failed", "True", None);
        assert_eq!(
            inspect("j", &job),
            JobOutcome::Failed("unknown failure".to_string())
        );
    }

    #[test]
    fn inspect_running_job() {
        assert_eq!(inspect("j", &Job::default()), JobOutcome::InProgress);
        // A False terminal condition is not terminal
        let job = job_with_condition("Complete", "False", None);
        assert_eq!(inspect("j", &job), JobOutcome::InProgress);
    }

    #[test]
    fn remote_path_read_from_annotation() {
        let job = Job {
            metadata: ObjectMeta {
                annotations: Some(
                    [(REMOTE_PATH_ANNOTATION.to_string(), "t/i/x".to_string())]
                        .into_iter()
                        .collect(),
                ),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(remote_path_of(&job), Some("t/i/x"));
        assert_eq!(remote_path_of(&Job::default()), None);
    }
}
