//! Mutation semantics for self-configuration
//!
//! - Skill add: order-preserving, de-duplicating append
//! - Skill remove: set subtraction
//! - Configuration patch: recursive key-wise merge; nested maps merge
//!   recursively, every other value type (including arrays) is replaced
//!   wholesale. Patches touching a protected top-level key are rejected
//!   before any merge happens.
//! - Workspace files: key upsert/delete on the name→content map
//! - Environment variables: name-keyed upsert-or-append / delete, with a
//!   fixed protected set the request may never touch

use serde_json::Value;

use roost_common::crd::{RoostConfigRequestSpec, RoostInstanceSpec};
use roost_common::{Error, Result};

/// Top-level configuration keys no request may patch.
///
/// `gateway` holds the instance's authentication wiring; letting an agent
/// rewrite it would let it mint its own credentials.
pub const PROTECTED_CONFIG_KEYS: &[&str] = &["gateway"];

/// Environment variables owned by the operator: identity, auth token,
/// network, path, and cache wiring.
pub const PROTECTED_ENV_VARS: &[&str] = &[
    "ROOST_INSTANCE_ID",
    "ROOST_GATEWAY_TOKEN",
    "ROOST_GATEWAY_PORT",
    "PATH",
    "HOME",
    "XDG_CACHE_HOME",
];

/// Apply every requested mutation to a fresh copy of the instance spec.
///
/// All-or-nothing: protected-key and protected-variable checks run before
/// any field is touched, so a rejected request leaves the spec unchanged.
pub fn apply_mutations(
    spec: &mut RoostInstanceSpec,
    instance_name: &str,
    request: &RoostConfigRequestSpec,
) -> Result<()> {
    if let Some(patch) = &request.config_patch {
        check_config_patch(instance_name, patch)?;
    }
    check_env_vars(instance_name, request)?;

    // Skills
    for skill in &request.add_skills {
        if !spec.skills.contains(skill) {
            spec.skills.push(skill.clone());
        }
    }
    spec.skills.retain(|s| !request.remove_skills.contains(s));

    // Configuration
    if let Some(patch) = &request.config_patch {
        let base = spec
            .configuration
            .get_or_insert_with(|| Value::Object(Default::default()));
        deep_merge(base, patch);
    }

    // Workspace files
    for (name, content) in &request.add_files {
        spec.workspace_files.insert(name.clone(), content.clone());
    }
    for name in &request.remove_files {
        spec.workspace_files.remove(name);
    }

    // Environment variables
    for var in &request.set_env {
        match spec.env.iter_mut().find(|e| e.name == var.name) {
            Some(existing) => existing.value = var.value.clone(),
            None => spec.env.push(var.clone()),
        }
    }
    spec.env.retain(|e| !request.remove_env.contains(&e.name));

    Ok(())
}

/// Reject a patch that touches any protected top-level key, or that is not
/// a JSON object at all.
fn check_config_patch(instance_name: &str, patch: &Value) -> Result<()> {
    let Some(map) = patch.as_object() else {
        return Err(Error::policy(
            instance_name,
            "configuration patch must be a JSON object",
        ));
    };
    for key in map.keys() {
        if PROTECTED_CONFIG_KEYS.contains(&key.as_str()) {
            return Err(Error::policy(
                instance_name,
                format!("configuration key '{}' is protected", key),
            ));
        }
    }
    Ok(())
}

/// Reject any request naming a protected environment variable.
fn check_env_vars(instance_name: &str, request: &RoostConfigRequestSpec) -> Result<()> {
    let touched = request
        .set_env
        .iter()
        .map(|e| e.name.as_str())
        .chain(request.remove_env.iter().map(String::as_str));
    for name in touched {
        if PROTECTED_ENV_VARS.contains(&name) {
            return Err(Error::policy(
                instance_name,
                format!("environment variable '{}' is protected", name),
            ));
        }
    }
    Ok(())
}

/// Recursive key-wise merge.
///
/// Nested objects merge recursively; every other value type, including
/// arrays, is replaced wholesale.
pub fn deep_merge(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                match base_map.get_mut(key) {
                    Some(base_value) if base_value.is_object() && patch_value.is_object() => {
                        deep_merge(base_value, patch_value);
                    }
                    _ => {
                        base_map.insert(key.clone(), patch_value.clone());
                    }
                }
            }
        }
        (base, patch) => *base = patch.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roost_common::crd::{EnvVarSpec, ImageSpec};
    use serde_json::json;

    fn sample_spec() -> RoostInstanceSpec {
        RoostInstanceSpec {
            image: ImageSpec {
                repository: "ghcr.io/roost-run/runtime".to_string(),
                tag: "1.0.0".to_string(),
                digest: None,
            },
            update: None,
            persistence: None,
            restore_from: None,
            self_config: None,
            backup: None,
            skills: vec!["summarize".to_string()],
            configuration: Some(json!({"a": {"x": 1}})),
            workspace_files: Default::default(),
            env: vec![EnvVarSpec {
                name: "LOG_LEVEL".to_string(),
                value: "info".to_string(),
            }],
            ingress: None,
        }
    }

    fn request() -> RoostConfigRequestSpec {
        RoostConfigRequestSpec {
            instance: "alpha".to_string(),
            ..Default::default()
        }
    }

    // =========================================================================
    // Deep merge
    // =========================================================================

    /// Deep-merging {"a":{"y":2}} into {"a":{"x":1}} yields {"a":{"x":1,"y":2}}.
    #[test]
    fn deep_merge_merges_nested_maps() {
        let mut base = json!({"a": {"x": 1}});
        deep_merge(&mut base, &json!({"a": {"y": 2}}));
        assert_eq!(base, json!({"a": {"x": 1, "y": 2}}));
    }

    #[test]
    fn deep_merge_replaces_scalars_and_arrays_wholesale() {
        let mut base = json!({"list": [1, 2, 3], "n": 1});
        deep_merge(&mut base, &json!({"list": [9], "n": 2}));
        assert_eq!(base, json!({"list": [9], "n": 2}));
    }

    #[test]
    fn deep_merge_replaces_object_with_scalar() {
        let mut base = json!({"a": {"x": 1}});
        deep_merge(&mut base, &json!({"a": 5}));
        assert_eq!(base, json!({"a": 5}));
    }

    #[test]
    fn deep_merge_inserts_new_keys() {
        let mut base = json!({});
        deep_merge(&mut base, &json!({"b": {"deep": true}}));
        assert_eq!(base, json!({"b": {"deep": true}}));
    }

    // =========================================================================
    // Protected keys
    // =========================================================================

    /// A patch containing top-level key "gateway" always fails, regardless
    /// of any other content.
    #[test]
    fn gateway_key_is_always_rejected() {
        let mut spec = sample_spec();
        let mut req = request();
        req.config_patch = Some(json!({"gateway": {"port": 9999}, "theme": "dark"}));

        let err = apply_mutations(&mut spec, "alpha", &req).unwrap_err();
        assert!(err.to_string().contains("gateway"));
        // Nothing was merged
        assert_eq!(spec.configuration, Some(json!({"a": {"x": 1}})));
    }

    #[test]
    fn non_object_patch_is_rejected() {
        let mut spec = sample_spec();
        let mut req = request();
        req.config_patch = Some(json!([1, 2, 3]));
        assert!(apply_mutations(&mut spec, "alpha", &req).is_err());
    }

    #[test]
    fn protected_env_var_rejects_whole_request() {
        let mut spec = sample_spec();
        let mut req = request();
        req.add_skills = vec!["new-skill".to_string()];
        req.set_env = vec![EnvVarSpec {
            name: "ROOST_GATEWAY_TOKEN".to_string(),
            value: "stolen".to_string(),
        }];

        let err = apply_mutations(&mut spec, "alpha", &req).unwrap_err();
        assert!(err.to_string().contains("ROOST_GATEWAY_TOKEN"));
        // All-or-nothing: the skill was not added either
        assert_eq!(spec.skills, vec!["summarize".to_string()]);
    }

    #[test]
    fn protected_env_var_removal_is_rejected_too() {
        let mut spec = sample_spec();
        let mut req = request();
        req.remove_env = vec!["PATH".to_string()];
        assert!(apply_mutations(&mut spec, "alpha", &req).is_err());
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    #[test]
    fn skill_add_preserves_order_and_dedupes() {
        let mut spec = sample_spec();
        let mut req = request();
        req.add_skills = vec![
            "summarize".to_string(), // duplicate
            "translate".to_string(),
            "search".to_string(),
            "translate".to_string(), // duplicate within the request
        ];
        apply_mutations(&mut spec, "alpha", &req).unwrap();
        assert_eq!(spec.skills, vec!["summarize", "translate", "search"]);
    }

    #[test]
    fn skill_remove_is_set_subtraction() {
        let mut spec = sample_spec();
        spec.skills = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let mut req = request();
        req.remove_skills = vec!["b".to_string(), "missing".to_string()];
        apply_mutations(&mut spec, "alpha", &req).unwrap();
        assert_eq!(spec.skills, vec!["a", "c"]);
    }

    #[test]
    fn workspace_files_upsert_and_delete() {
        let mut spec = sample_spec();
        spec.workspace_files
            .insert("notes.md".to_string(), "old".to_string());
        let mut req = request();
        req.add_files
            .insert("notes.md".to_string(), "new".to_string());
        req.add_files
            .insert("todo.md".to_string(), "todo".to_string());
        req.remove_files = vec!["gone.md".to_string()];
        apply_mutations(&mut spec, "alpha", &req).unwrap();
        assert_eq!(spec.workspace_files.get("notes.md").unwrap(), "new");
        assert_eq!(spec.workspace_files.get("todo.md").unwrap(), "todo");
    }

    #[test]
    fn env_upsert_by_name_or_append() {
        let mut spec = sample_spec();
        let mut req = request();
        req.set_env = vec![
            EnvVarSpec {
                name: "LOG_LEVEL".to_string(),
                value: "debug".to_string(),
            },
            EnvVarSpec {
                name: "FEATURE_X".to_string(),
                value: "on".to_string(),
            },
        ];
        apply_mutations(&mut spec, "alpha", &req).unwrap();
        assert_eq!(spec.env.len(), 2);
        assert_eq!(spec.env[0].name, "LOG_LEVEL");
        assert_eq!(spec.env[0].value, "debug");
        assert_eq!(spec.env[1].name, "FEATURE_X");
    }

    #[test]
    fn env_remove_by_name() {
        let mut spec = sample_spec();
        let mut req = request();
        req.remove_env = vec!["LOG_LEVEL".to_string()];
        apply_mutations(&mut spec, "alpha", &req).unwrap();
        assert!(spec.env.is_empty());
    }

    #[test]
    fn config_patch_merges_into_missing_configuration() {
        let mut spec = sample_spec();
        spec.configuration = None;
        let mut req = request();
        req.config_patch = Some(json!({"theme": "dark"}));
        apply_mutations(&mut spec, "alpha", &req).unwrap();
        assert_eq!(spec.configuration, Some(json!({"theme": "dark"})));
    }
}
