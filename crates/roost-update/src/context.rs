//! Update engine collaborators
//!
//! The engine talks to the outside world through trait objects held in an
//! [`UpdateContext`], so tests can substitute mocks for the Kubernetes
//! API, the registry, and the data-mover protocol. Production code builds
//! the context once per process from a `kube::Client`.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::Client;

#[cfg(test)]
use mockall::automock;

use roost_common::crd::{Condition, InstancePhase, RoostInstance, UpdateStatus};
use roost_common::credentials::BackupCredentials;
use roost_common::events::{EventPublisher, KubeEventPublisher};
#[cfg(test)]
use roost_common::events::NoopEventPublisher;
use roost_common::{names, Error, Result, INSTANCE_LABEL};
use roost_backup::{ensure_transfer, remove_transfer, JobOutcome, TransferPurpose, TransferSpec};

use crate::resolver::{RegistryResolver, VersionResolver};
use crate::health;

/// Field manager name used for the engine's patches
const FIELD_MANAGER: &str = "roost-update-engine";

/// Default data-mover container image
pub const DEFAULT_DATA_MOVER_IMAGE: &str = "ghcr.io/roost-run/data-mover:v2";

/// Status and spec writes on the instance object
#[cfg_attr(test, automock)]
#[async_trait]
pub trait InstanceClient: Send + Sync {
    /// Merge-patch the update sub-status
    async fn apply_update_status(
        &self,
        name: &str,
        namespace: &str,
        update: &UpdateStatus,
    ) -> Result<()>;

    /// Merge-patch the top-level phase and message
    async fn set_phase(
        &self,
        name: &str,
        namespace: &str,
        phase: InstancePhase,
        message: Option<String>,
    ) -> Result<()>;

    /// Replace-or-insert a condition of the same type
    async fn set_condition(&self, name: &str, namespace: &str, condition: Condition)
        -> Result<()>;

    /// Patch the desired image tag in the instance spec
    async fn patch_image_tag(&self, name: &str, namespace: &str, tag: &str) -> Result<()>;
}

/// Scale and readiness operations on the instance workload
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WorkloadClient: Send + Sync {
    /// Set the Deployment's replica count
    async fn scale(&self, instance: &str, namespace: &str, replicas: i32) -> Result<()>;

    /// Count pods of the instance that are still running or starting
    async fn running_pods(&self, instance: &str, namespace: &str) -> Result<u32>;

    /// True when at least one replica is ready *and* at least one replica
    /// reports the current (post-patch) revision
    async fn is_ready_on_revision(&self, instance: &str, namespace: &str) -> Result<bool>;
}

/// Data-mover protocol, narrowed to what the engine needs
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TransferRunner: Send + Sync {
    /// Drive one transfer forward by one non-blocking step
    async fn ensure(
        &self,
        instance: &RoostInstance,
        purpose: TransferPurpose,
        remote_path: &str,
    ) -> Result<JobOutcome>;

    /// Delete a transfer's Job once its outcome has been recorded
    async fn remove(&self, instance: &RoostInstance, purpose: TransferPurpose) -> Result<()>;
}

/// Shared context for the update engine
pub struct UpdateContext {
    /// Instance status/spec writes
    pub instances: Arc<dyn InstanceClient>,
    /// Workload scale and readiness
    pub workloads: Arc<dyn WorkloadClient>,
    /// Data-mover protocol
    pub transfers: Arc<dyn TransferRunner>,
    /// Registry version resolution
    pub resolver: Arc<dyn VersionResolver>,
    /// Kubernetes Event emission
    pub events: Arc<dyn EventPublisher>,
}

impl UpdateContext {
    /// Create a builder for constructing an UpdateContext
    pub fn builder(client: Client) -> UpdateContextBuilder {
        UpdateContextBuilder::new(client)
    }
}

/// Builder for [`UpdateContext`], defaulting each collaborator to its
/// kube-backed implementation
pub struct UpdateContextBuilder {
    client: Client,
    instances: Option<Arc<dyn InstanceClient>>,
    workloads: Option<Arc<dyn WorkloadClient>>,
    transfers: Option<Arc<dyn TransferRunner>>,
    resolver: Option<Arc<dyn VersionResolver>>,
    events: Option<Arc<dyn EventPublisher>>,
    data_mover_image: String,
}

impl UpdateContextBuilder {
    fn new(client: Client) -> Self {
        Self {
            client,
            instances: None,
            workloads: None,
            transfers: None,
            resolver: None,
            events: None,
            data_mover_image: DEFAULT_DATA_MOVER_IMAGE.to_string(),
        }
    }

    /// Override the data-mover image
    pub fn data_mover_image(mut self, image: impl Into<String>) -> Self {
        self.data_mover_image = image.into();
        self
    }

    /// Override the instance client (primarily for testing)
    pub fn instance_client(mut self, instances: Arc<dyn InstanceClient>) -> Self {
        self.instances = Some(instances);
        self
    }

    /// Override the workload client (primarily for testing)
    pub fn workload_client(mut self, workloads: Arc<dyn WorkloadClient>) -> Self {
        self.workloads = Some(workloads);
        self
    }

    /// Override the transfer runner (primarily for testing)
    pub fn transfer_runner(mut self, transfers: Arc<dyn TransferRunner>) -> Self {
        self.transfers = Some(transfers);
        self
    }

    /// Override the version resolver (primarily for testing)
    pub fn version_resolver(mut self, resolver: Arc<dyn VersionResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Override the event publisher
    pub fn event_publisher(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    /// Build the UpdateContext
    pub fn build(self) -> UpdateContext {
        UpdateContext {
            instances: self
                .instances
                .unwrap_or_else(|| Arc::new(InstanceClientImpl::new(self.client.clone()))),
            workloads: self
                .workloads
                .unwrap_or_else(|| Arc::new(WorkloadClientImpl::new(self.client.clone()))),
            transfers: self.transfers.unwrap_or_else(|| {
                Arc::new(TransferRunnerImpl::new(
                    self.client.clone(),
                    self.data_mover_image.clone(),
                ))
            }),
            resolver: self
                .resolver
                .unwrap_or_else(|| Arc::new(RegistryResolver::new())),
            events: self.events.unwrap_or_else(|| {
                Arc::new(KubeEventPublisher::new(
                    self.client.clone(),
                    "roost-update-engine",
                ))
            }),
        }
    }
}

impl UpdateContext {
    /// Create a context for testing with custom mock collaborators
    #[cfg(test)]
    pub fn for_testing(
        instances: Arc<dyn InstanceClient>,
        workloads: Arc<dyn WorkloadClient>,
        transfers: Arc<dyn TransferRunner>,
        resolver: Arc<dyn VersionResolver>,
    ) -> Self {
        Self {
            instances,
            workloads,
            transfers,
            resolver,
            events: Arc::new(NoopEventPublisher),
        }
    }
}

// =============================================================================
// Kube-backed implementations
// =============================================================================

/// Real instance client implementation
pub struct InstanceClientImpl {
    client: Client,
}

impl InstanceClientImpl {
    /// Create a new InstanceClientImpl wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<RoostInstance> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl InstanceClient for InstanceClientImpl {
    async fn apply_update_status(
        &self,
        name: &str,
        namespace: &str,
        update: &UpdateStatus,
    ) -> Result<()> {
        // Merge patch deletes keys via explicit null. The status type skips
        // None fields on ordinary serialization, which would leave cleared
        // fields (PendingVersion after a confirm, say) stale on the server,
        // so every key is spelled out here.
        let patch = serde_json::json!({ "status": { "update": {
            "currentVersion": update.current_version,
            "pendingVersion": update.pending_version,
            "previousVersion": update.previous_version,
            "failedVersion": update.failed_version,
            "latestVersion": update.latest_version,
            "phase": update.phase,
            "rollbackCount": update.rollback_count,
            "lastCheckTime": update.last_check_time,
            "lastUpdateTime": update.last_update_time,
            "lastUpdateError": update.last_update_error,
            "preUpdateBackupPath": update.pre_update_backup_path,
        }}});
        self.api(namespace)
            .patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn set_phase(
        &self,
        name: &str,
        namespace: &str,
        phase: InstancePhase,
        message: Option<String>,
    ) -> Result<()> {
        let patch = serde_json::json!({ "status": { "phase": phase, "message": message } });
        self.api(namespace)
            .patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn set_condition(
        &self,
        name: &str,
        namespace: &str,
        condition: Condition,
    ) -> Result<()> {
        // Conditions are a keyed list, so merge patch can't replace one in
        // place: read-modify-write instead.
        let api = self.api(namespace);
        let current = api.get_status(name).await?;
        let mut status = current.status.unwrap_or_default();
        status.set_condition(condition);
        let patch = serde_json::json!({ "status": { "conditions": status.conditions } });
        api.patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn patch_image_tag(&self, name: &str, namespace: &str, tag: &str) -> Result<()> {
        let patch = serde_json::json!({ "spec": { "image": { "tag": tag } } });
        self.api(namespace)
            .patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}

/// Real workload client implementation
pub struct WorkloadClientImpl {
    client: Client,
}

impl WorkloadClientImpl {
    /// Create a new WorkloadClientImpl wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WorkloadClient for WorkloadClientImpl {
    async fn scale(&self, instance: &str, namespace: &str, replicas: i32) -> Result<()> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let patch = serde_json::json!({ "spec": { "replicas": replicas } });
        api.patch(
            &names::workload(instance),
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await?;
        Ok(())
    }

    async fn running_pods(&self, instance: &str, namespace: &str) -> Result<u32> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let lp = ListParams::default().labels(&format!("{}={}", INSTANCE_LABEL, instance));
        let pods = api.list(&lp).await?;
        let active = pods
            .items
            .iter()
            .filter(|p| {
                let phase = p
                    .status
                    .as_ref()
                    .and_then(|s| s.phase.as_deref())
                    .unwrap_or("Unknown");
                phase == "Running" || phase == "Pending"
            })
            .count();
        Ok(active as u32)
    }

    async fn is_ready_on_revision(&self, instance: &str, namespace: &str) -> Result<bool> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        match api.get_opt(&names::workload(instance)).await? {
            Some(deployment) => Ok(health::deployment_ready_on_revision(&deployment)),
            None => Ok(false),
        }
    }
}

/// Real transfer runner wrapping the data-mover protocol
pub struct TransferRunnerImpl {
    client: Client,
    data_mover_image: String,
}

impl TransferRunnerImpl {
    /// Create a new TransferRunnerImpl
    pub fn new(client: Client, data_mover_image: String) -> Self {
        Self {
            client,
            data_mover_image,
        }
    }
}

#[async_trait]
impl TransferRunner for TransferRunnerImpl {
    async fn ensure(
        &self,
        instance: &RoostInstance,
        purpose: TransferPurpose,
        remote_path: &str,
    ) -> Result<JobOutcome> {
        let name = instance
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| Error::internal_with_context("transfer", "instance has no name"))?;
        let namespace = instance
            .metadata
            .namespace
            .as_deref()
            .ok_or_else(|| Error::internal_with_context("transfer", "instance has no namespace"))?;
        let uid = instance
            .metadata
            .uid
            .as_deref()
            .ok_or_else(|| Error::internal_with_context("transfer", "instance has no UID"))?;

        let credentials = match BackupCredentials::load(&self.client).await? {
            Some(c) => c,
            None => {
                return Ok(JobOutcome::Failed(
                    "backup credentials not configured".to_string(),
                ))
            }
        };

        let spec = TransferSpec {
            purpose,
            instance: name.to_string(),
            instance_uid: uid.to_string(),
            namespace: namespace.to_string(),
            pvc_name: names::pvc(name),
            remote_path: remote_path.to_string(),
            image: self.data_mover_image.clone(),
        };
        ensure_transfer(&self.client, &spec, &credentials).await
    }

    async fn remove(&self, instance: &RoostInstance, purpose: TransferPurpose) -> Result<()> {
        let name = instance
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| Error::internal_with_context("transfer", "instance has no name"))?;
        let namespace = instance
            .metadata
            .namespace
            .as_deref()
            .ok_or_else(|| Error::internal_with_context("transfer", "instance has no namespace"))?;
        remove_transfer(&self.client, namespace, name, purpose).await
    }
}
