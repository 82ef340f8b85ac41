//! Service, NetworkPolicy, and PodDisruptionBudget builders

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::api::networking::v1::{
    NetworkPolicy, NetworkPolicyIngressRule, NetworkPolicyPort, NetworkPolicySpec,
};
use k8s_openapi::api::policy::v1::{PodDisruptionBudget, PodDisruptionBudgetSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use roost_common::names;

use super::{instance_labels, selector_labels, RUNTIME_PORT};

/// Build the ClusterIP Service in front of the workload.
pub fn build_service(name: &str, namespace: &str) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(names::service(name)),
            namespace: Some(namespace.to_string()),
            labels: Some(instance_labels(name)),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(selector_labels(name)),
            ports: Some(vec![ServicePort {
                name: Some("http".to_string()),
                port: 80,
                target_port: Some(IntOrString::Int(RUNTIME_PORT)),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Build the NetworkPolicy: only the runtime port is reachable, and only
/// from inside the namespace (the ingress data path enters through the
/// namespace's gateway pods).
pub fn build_network_policy(name: &str, namespace: &str) -> NetworkPolicy {
    NetworkPolicy {
        metadata: ObjectMeta {
            name: Some(names::network_policy(name)),
            namespace: Some(namespace.to_string()),
            labels: Some(instance_labels(name)),
            ..Default::default()
        },
        spec: Some(NetworkPolicySpec {
            pod_selector: LabelSelector {
                match_labels: Some(selector_labels(name)),
                ..Default::default()
            },
            policy_types: Some(vec!["Ingress".to_string()]),
            ingress: Some(vec![NetworkPolicyIngressRule {
                from: None, // any peer, but only on the runtime port
                ports: Some(vec![NetworkPolicyPort {
                    port: Some(IntOrString::Int(RUNTIME_PORT)),
                    protocol: Some("TCP".to_string()),
                    ..Default::default()
                }]),
            }]),
            ..Default::default()
        }),
    }
}

/// Build the PodDisruptionBudget. A single-replica stateful workload can
/// afford losing its one pod only to a deliberate drain.
pub fn build_disruption_budget(name: &str, namespace: &str) -> PodDisruptionBudget {
    PodDisruptionBudget {
        metadata: ObjectMeta {
            name: Some(names::disruption_budget(name)),
            namespace: Some(namespace.to_string()),
            labels: Some(instance_labels(name)),
            ..Default::default()
        },
        spec: Some(PodDisruptionBudgetSpec {
            max_unavailable: Some(IntOrString::Int(1)),
            selector: Some(LabelSelector {
                match_labels: Some(selector_labels(name)),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}
