//! Deployment builder for the instance runtime

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, ContainerPort, EnvVar, HTTPGetAction,
    PersistentVolumeClaimVolumeSource, PodSpec, PodTemplateSpec, Probe, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use roost_common::crd::RoostInstance;
use roost_common::names;

use super::{instance_labels, selector_labels};

/// Port the runtime serves on
pub const RUNTIME_PORT: i32 = 8080;

/// Mount point of the instance's durable data
const DATA_PATH: &str = "/var/lib/roost/data";
/// Mount point of the rendered configuration document
const CONFIG_PATH: &str = "/etc/roost/config";
/// Mount point of the seed workspace files
const WORKSPACE_SEED_PATH: &str = "/var/lib/roost/workspace-seed";

/// Build the runtime Deployment.
///
/// `replicas` is owned by the caller: the phase controller passes 0 while
/// a data-mover job needs the single-writer volume quiesced.
pub fn build_workload(instance: &RoostInstance, name: &str, namespace: &str, replicas: i32) -> Deployment {
    let spec = &instance.spec;

    let mut env = vec![EnvVar {
        name: "ROOST_INSTANCE_ID".to_string(),
        value: Some(name.to_string()),
        ..Default::default()
    }];
    env.extend(spec.env.iter().map(|e| EnvVar {
        name: e.name.clone(),
        value: Some(e.value.clone()),
        ..Default::default()
    }));

    let mut volume_mounts = vec![
        VolumeMount {
            name: "config".to_string(),
            mount_path: CONFIG_PATH.to_string(),
            read_only: Some(true),
            ..Default::default()
        },
        VolumeMount {
            name: "workspace-seed".to_string(),
            mount_path: WORKSPACE_SEED_PATH.to_string(),
            read_only: Some(true),
            ..Default::default()
        },
    ];
    let mut volumes = vec![
        Volume {
            name: "config".to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: names::config_map(name),
                optional: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        },
        Volume {
            name: "workspace-seed".to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: names::workspace_map(name),
                optional: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        },
    ];

    if spec.persistence_enabled() {
        volume_mounts.push(VolumeMount {
            name: "data".to_string(),
            mount_path: DATA_PATH.to_string(),
            ..Default::default()
        });
        volumes.push(Volume {
            name: "data".to_string(),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: names::pvc(name),
                read_only: Some(false),
            }),
            ..Default::default()
        });
    }

    let container = Container {
        name: "runtime".to_string(),
        image: Some(spec.image.reference()),
        env: Some(env),
        ports: Some(vec![ContainerPort {
            container_port: RUNTIME_PORT,
            name: Some("http".to_string()),
            ..Default::default()
        }]),
        readiness_probe: Some(Probe {
            http_get: Some(HTTPGetAction {
                path: Some("/healthz".to_string()),
                port: IntOrString::Int(RUNTIME_PORT),
                ..Default::default()
            }),
            initial_delay_seconds: Some(5),
            period_seconds: Some(10),
            ..Default::default()
        }),
        volume_mounts: Some(volume_mounts),
        ..Default::default()
    };

    // Single-writer storage: never run two revisions against one volume.
    let strategy = spec.persistence_enabled().then(|| DeploymentStrategy {
        type_: Some("Recreate".to_string()),
        ..Default::default()
    });

    Deployment {
        metadata: ObjectMeta {
            name: Some(names::workload(name)),
            namespace: Some(namespace.to_string()),
            labels: Some(instance_labels(name)),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(replicas),
            selector: LabelSelector {
                match_labels: Some(selector_labels(name)),
                ..Default::default()
            },
            strategy,
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(instance_labels(name)),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: Some(names::service_account(name)),
                    containers: vec![container],
                    volumes: Some(volumes),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roost_common::crd::{EnvVarSpec, ImageSpec, PersistenceSpec, RoostInstanceSpec};

    fn sample_instance(persistence: bool) -> RoostInstance {
        RoostInstance::new(
            "alpha",
            RoostInstanceSpec {
                image: ImageSpec {
                    repository: "ghcr.io/roost-run/runtime".to_string(),
                    tag: "1.0.0".to_string(),
                    digest: None,
                },
                persistence: persistence.then(|| PersistenceSpec {
                    enabled: true,
                    size: "10Gi".to_string(),
                    storage_class: None,
                }),
                env: vec![EnvVarSpec {
                    name: "LOG_LEVEL".to_string(),
                    value: "info".to_string(),
                }],
                update: None,
                restore_from: None,
                self_config: None,
                backup: None,
                skills: vec![],
                configuration: None,
                workspace_files: Default::default(),
                ingress: None,
            },
        )
    }

    #[test]
    fn workload_name_and_replicas() {
        let d = build_workload(&sample_instance(false), "alpha", "tenant-a", 1);
        assert_eq!(d.metadata.name.as_deref(), Some("alpha-runtime"));
        assert_eq!(d.spec.as_ref().unwrap().replicas, Some(1));
    }

    #[test]
    fn caller_owns_replicas() {
        let d = build_workload(&sample_instance(true), "alpha", "tenant-a", 0);
        assert_eq!(d.spec.as_ref().unwrap().replicas, Some(0));
    }

    #[test]
    fn instance_id_env_comes_first() {
        let d = build_workload(&sample_instance(false), "alpha", "tenant-a", 1);
        let env = d.spec.unwrap().template.spec.unwrap().containers[0]
            .env
            .clone()
            .unwrap();
        assert_eq!(env[0].name, "ROOST_INSTANCE_ID");
        assert_eq!(env[0].value.as_deref(), Some("alpha"));
        assert_eq!(env[1].name, "LOG_LEVEL");
    }

    #[test]
    fn persistence_adds_volume_and_recreate_strategy() {
        let d = build_workload(&sample_instance(true), "alpha", "tenant-a", 1);
        let spec = d.spec.unwrap();
        assert_eq!(
            spec.strategy.as_ref().and_then(|s| s.type_.as_deref()),
            Some("Recreate")
        );
        let volumes = spec.template.spec.unwrap().volumes.unwrap();
        assert!(volumes
            .iter()
            .any(|v| v.persistent_volume_claim.as_ref().map(|p| p.claim_name.as_str())
                == Some("alpha-data")));
    }

    #[test]
    fn no_persistence_no_data_volume() {
        let d = build_workload(&sample_instance(false), "alpha", "tenant-a", 1);
        let volumes = d.spec.unwrap().template.spec.unwrap().volumes.unwrap();
        assert!(volumes.iter().all(|v| v.persistent_volume_claim.is_none()));
        assert_eq!(volumes.len(), 2);
    }

    #[test]
    fn digest_pin_flows_into_image_reference() {
        let mut instance = sample_instance(false);
        instance.spec.image.digest = Some("sha256:abcd".to_string());
        let d = build_workload(&instance, "alpha", "tenant-a", 1);
        let image = d.spec.unwrap().template.spec.unwrap().containers[0]
            .image
            .clone()
            .unwrap();
        assert_eq!(image, "ghcr.io/roost-run/runtime@sha256:abcd");
    }
}
