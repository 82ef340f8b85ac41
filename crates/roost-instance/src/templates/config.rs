//! Configuration and workspace-seed ConfigMap builders

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use roost_common::crd::RoostInstance;
use roost_common::names;

use super::instance_labels;

/// Build the configuration ConfigMap: the rendered configuration document
/// plus the skill list, one key per file the runtime reads at boot.
pub fn build_config_map(instance: &RoostInstance, name: &str, namespace: &str) -> ConfigMap {
    let mut data = BTreeMap::new();

    let configuration = instance
        .spec
        .configuration
        .clone()
        .unwrap_or_else(|| serde_json::json!({}));
    data.insert(
        "config.json".to_string(),
        serde_json::to_string_pretty(&configuration).unwrap_or_else(|_| "{}".to_string()),
    );
    data.insert("skills.txt".to_string(), instance.spec.skills.join("\n"));

    ConfigMap {
        metadata: ObjectMeta {
            name: Some(names::config_map(name)),
            namespace: Some(namespace.to_string()),
            labels: Some(instance_labels(name)),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    }
}

/// Build the workspace-seed ConfigMap from the spec's name→content map.
pub fn build_workspace_map(instance: &RoostInstance, name: &str, namespace: &str) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(names::workspace_map(name)),
            namespace: Some(namespace.to_string()),
            labels: Some(instance_labels(name)),
            ..Default::default()
        },
        data: Some(instance.spec.workspace_files.clone()),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roost_common::crd::{ImageSpec, RoostInstanceSpec};

    fn instance() -> RoostInstance {
        RoostInstance::new(
            "alpha",
            RoostInstanceSpec {
                image: ImageSpec {
                    repository: "r".to_string(),
                    tag: "1.0.0".to_string(),
                    digest: None,
                },
                skills: vec!["summarize".to_string(), "translate".to_string()],
                configuration: Some(serde_json::json!({"theme": "dark"})),
                workspace_files: [("notes.md".to_string(), "hello".to_string())]
                    .into_iter()
                    .collect(),
                update: None,
                persistence: None,
                restore_from: None,
                self_config: None,
                backup: None,
                env: vec![],
                ingress: None,
            },
        )
    }

    #[test]
    fn config_map_renders_configuration_and_skills() {
        let cm = build_config_map(&instance(), "alpha", "tenant-a");
        assert_eq!(cm.metadata.name.as_deref(), Some("alpha-config"));
        let data = cm.data.unwrap();
        assert!(data["config.json"].contains("dark"));
        assert_eq!(data["skills.txt"], "summarize\ntranslate");
    }

    #[test]
    fn missing_configuration_renders_empty_object() {
        let mut inst = instance();
        inst.spec.configuration = None;
        let cm = build_config_map(&inst, "alpha", "tenant-a");
        assert_eq!(cm.data.unwrap()["config.json"], "{}");
    }

    #[test]
    fn workspace_map_carries_files() {
        let cm = build_workspace_map(&instance(), "alpha", "tenant-a");
        assert_eq!(cm.metadata.name.as_deref(), Some("alpha-workspace"));
        assert_eq!(cm.data.unwrap()["notes.md"], "hello");
    }
}
