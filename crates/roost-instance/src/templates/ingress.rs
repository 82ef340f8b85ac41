//! Ingress builder

use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, IngressTLS, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use roost_common::crd::IngressSpec as RoostIngressSpec;
use roost_common::names;

use super::instance_labels;

/// Build the Ingress exposing the instance Service under its host.
pub fn build_ingress(ingress: &RoostIngressSpec, name: &str, namespace: &str) -> Ingress {
    let backend = IngressBackend {
        service: Some(IngressServiceBackend {
            name: names::service(name),
            port: Some(ServiceBackendPort {
                name: Some("http".to_string()),
                ..Default::default()
            }),
        }),
        ..Default::default()
    };

    let tls = ingress.tls_secret.as_ref().map(|secret| {
        vec![IngressTLS {
            hosts: Some(vec![ingress.host.clone()]),
            secret_name: Some(secret.clone()),
        }]
    });

    Ingress {
        metadata: ObjectMeta {
            name: Some(names::ingress(name)),
            namespace: Some(namespace.to_string()),
            labels: Some(instance_labels(name)),
            ..Default::default()
        },
        spec: Some(IngressSpec {
            rules: Some(vec![IngressRule {
                host: Some(ingress.host.clone()),
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: Some("/".to_string()),
                        path_type: "Prefix".to_string(),
                        backend,
                    }],
                }),
            }]),
            tls,
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingress_routes_host_to_service() {
        let spec = RoostIngressSpec {
            host: "alpha.roost.example.com".to_string(),
            tls_secret: None,
        };
        let ingress = build_ingress(&spec, "alpha", "tenant-a");
        let rules = ingress.spec.as_ref().unwrap().rules.clone().unwrap();
        assert_eq!(rules[0].host.as_deref(), Some("alpha.roost.example.com"));
        let backend = &rules[0].http.as_ref().unwrap().paths[0].backend;
        assert_eq!(backend.service.as_ref().unwrap().name, "alpha-svc");
        assert!(ingress.spec.unwrap().tls.is_none());
    }

    #[test]
    fn tls_block_only_with_secret() {
        let spec = RoostIngressSpec {
            host: "alpha.roost.example.com".to_string(),
            tls_secret: Some("alpha-cert".to_string()),
        };
        let ingress = build_ingress(&spec, "alpha", "tenant-a");
        let tls = ingress.spec.unwrap().tls.unwrap();
        assert_eq!(tls[0].secret_name.as_deref(), Some("alpha-cert"));
        assert_eq!(tls[0].hosts.as_ref().unwrap()[0], "alpha.roost.example.com");
    }
}
