//! PVC builder for the instance's durable data

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    PersistentVolumeClaim, PersistentVolumeClaimSpec, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use roost_common::crd::PersistenceSpec;
use roost_common::names;

use super::instance_labels;

/// Build the instance's PVC.
///
/// The storage class is set only when explicitly specified; omitting it
/// lets the cluster default apply, while null would mean "no class".
pub fn build_pvc(persistence: &PersistenceSpec, name: &str, namespace: &str) -> PersistentVolumeClaim {
    let mut requests = BTreeMap::new();
    requests.insert("storage".to_string(), Quantity(persistence.size.clone()));

    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(names::pvc(name)),
            namespace: Some(namespace.to_string()),
            labels: Some(instance_labels(name)),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            resources: Some(VolumeResourceRequirements {
                requests: Some(requests),
                ..Default::default()
            }),
            storage_class_name: persistence.storage_class.clone(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pvc_requests_the_configured_size() {
        let p = PersistenceSpec {
            enabled: true,
            size: "25Gi".to_string(),
            storage_class: None,
        };
        let pvc = build_pvc(&p, "alpha", "tenant-a");
        assert_eq!(pvc.metadata.name.as_deref(), Some("alpha-data"));
        let spec = pvc.spec.unwrap();
        assert_eq!(
            spec.resources.unwrap().requests.unwrap()["storage"],
            Quantity("25Gi".to_string())
        );
        assert!(spec.storage_class_name.is_none());
    }

    #[test]
    fn storage_class_set_only_when_specified() {
        let p = PersistenceSpec {
            enabled: true,
            size: "10Gi".to_string(),
            storage_class: Some("fast-ssd".to_string()),
        };
        let pvc = build_pvc(&p, "alpha", "tenant-a");
        assert_eq!(
            pvc.spec.unwrap().storage_class_name.as_deref(),
            Some("fast-ssd")
        );
    }

    #[test]
    fn single_writer_access_mode() {
        let p = PersistenceSpec {
            enabled: true,
            size: "10Gi".to_string(),
            storage_class: None,
        };
        let pvc = build_pvc(&p, "alpha", "tenant-a");
        assert_eq!(
            pvc.spec.unwrap().access_modes.unwrap(),
            vec!["ReadWriteOnce".to_string()]
        );
    }
}
