//! ServiceAccount, Role, and RoleBinding builders
//!
//! The runtime gets the minimum it needs: reading its own ConfigMaps (to
//! hot-reload configuration) and creating RoostConfigRequests (the
//! self-configuration entry point). Everything else goes through the
//! operator.

use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use roost_common::names;

use super::instance_labels;

/// Build the workload's ServiceAccount.
pub fn build_service_account(name: &str, namespace: &str) -> ServiceAccount {
    ServiceAccount {
        metadata: ObjectMeta {
            name: Some(names::service_account(name)),
            namespace: Some(namespace.to_string()),
            labels: Some(instance_labels(name)),
            ..Default::default()
        },
        automount_service_account_token: Some(true),
        ..Default::default()
    }
}

/// Build the namespace-local Role.
pub fn build_role(name: &str, namespace: &str) -> Role {
    Role {
        metadata: ObjectMeta {
            name: Some(names::role(name)),
            namespace: Some(namespace.to_string()),
            labels: Some(instance_labels(name)),
            ..Default::default()
        },
        rules: Some(vec![
            PolicyRule {
                api_groups: Some(vec!["".to_string()]),
                resources: Some(vec!["configmaps".to_string()]),
                verbs: vec!["get".to_string(), "list".to_string(), "watch".to_string()],
                resource_names: Some(vec![
                    names::config_map(name),
                    names::workspace_map(name),
                ]),
                ..Default::default()
            },
            PolicyRule {
                api_groups: Some(vec!["roost.dev".to_string()]),
                resources: Some(vec!["roostconfigrequests".to_string()]),
                verbs: vec!["create".to_string(), "get".to_string()],
                ..Default::default()
            },
        ]),
    }
}

/// Build the RoleBinding attaching the Role to the ServiceAccount.
pub fn build_role_binding(name: &str, namespace: &str) -> RoleBinding {
    RoleBinding {
        metadata: ObjectMeta {
            name: Some(names::role_binding(name)),
            namespace: Some(namespace.to_string()),
            labels: Some(instance_labels(name)),
            ..Default::default()
        },
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "Role".to_string(),
            name: names::role(name),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: names::service_account(name),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        }]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_restricts_configmaps_to_own_names() {
        let role = build_role("alpha", "tenant-a");
        let rules = role.rules.unwrap();
        let cm_rule = &rules[0];
        assert_eq!(
            cm_rule.resource_names.as_ref().unwrap(),
            &vec!["alpha-config".to_string(), "alpha-workspace".to_string()]
        );
        assert!(!cm_rule.verbs.contains(&"create".to_string()));
    }

    #[test]
    fn role_allows_creating_config_requests() {
        let role = build_role("alpha", "tenant-a");
        let rules = role.rules.unwrap();
        assert_eq!(
            rules[1].resources.as_ref().unwrap(),
            &vec!["roostconfigrequests".to_string()]
        );
        assert!(rules[1].verbs.contains(&"create".to_string()));
    }

    #[test]
    fn binding_links_role_to_service_account() {
        let binding = build_role_binding("alpha", "tenant-a");
        assert_eq!(binding.role_ref.name, "alpha-role");
        assert_eq!(binding.subjects.unwrap()[0].name, "alpha-sa");
    }
}
