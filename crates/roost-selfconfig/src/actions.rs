//! Action classification and allow-list gating
//!
//! A request is classified by which field groups are populated. The denied
//! set is the difference between the requested categories and the parent's
//! allow-list; any non-empty denied set denies the entire request —
//! application is all-or-nothing, never partial.

use std::collections::BTreeSet;

use roost_common::crd::{ActionCategory, RoostConfigRequestSpec, SelfConfigPolicy};

/// Classify a request into the categories it acts in.
pub fn classify(spec: &RoostConfigRequestSpec) -> BTreeSet<ActionCategory> {
    let mut categories = BTreeSet::new();
    if !spec.add_skills.is_empty() || !spec.remove_skills.is_empty() {
        categories.insert(ActionCategory::Skills);
    }
    if spec.config_patch.is_some() {
        categories.insert(ActionCategory::Configuration);
    }
    if !spec.add_files.is_empty() || !spec.remove_files.is_empty() {
        categories.insert(ActionCategory::WorkspaceFiles);
    }
    if !spec.set_env.is_empty() || !spec.remove_env.is_empty() {
        categories.insert(ActionCategory::EnvironmentVars);
    }
    categories
}

/// Requested minus allowed. Non-empty means the whole request is denied.
pub fn denied_categories(
    requested: &BTreeSet<ActionCategory>,
    policy: &SelfConfigPolicy,
) -> Vec<ActionCategory> {
    let allowed: BTreeSet<ActionCategory> = policy.allowed.iter().copied().collect();
    requested.difference(&allowed).copied().collect()
}

/// Render a category list for a denial message.
pub fn format_categories(categories: &[ActionCategory]) -> String {
    categories
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A request with only AddSkills populated classifies as exactly {skills}.
    #[test]
    fn add_skills_alone_is_exactly_skills() {
        let spec = RoostConfigRequestSpec {
            instance: "alpha".to_string(),
            add_skills: vec!["x".to_string()],
            ..Default::default()
        };
        let categories = classify(&spec);
        assert_eq!(categories.len(), 1);
        assert!(categories.contains(&ActionCategory::Skills));
    }

    #[test]
    fn nothing_populated_classifies_empty() {
        let spec = RoostConfigRequestSpec {
            instance: "alpha".to_string(),
            ..Default::default()
        };
        assert!(classify(&spec).is_empty());
    }

    #[test]
    fn each_field_group_maps_to_its_category() {
        let spec = RoostConfigRequestSpec {
            instance: "alpha".to_string(),
            remove_skills: vec!["a".to_string()],
            config_patch: Some(serde_json::json!({"theme": "dark"})),
            remove_files: vec!["notes.md".to_string()],
            remove_env: vec!["DEBUG".to_string()],
            ..Default::default()
        };
        let categories = classify(&spec);
        assert_eq!(categories.len(), 4);
    }

    #[test]
    fn denied_is_requested_minus_allowed() {
        let mut requested = BTreeSet::new();
        requested.insert(ActionCategory::Skills);
        requested.insert(ActionCategory::Configuration);

        let policy = SelfConfigPolicy {
            enabled: true,
            allowed: vec![ActionCategory::Skills],
        };
        let denied = denied_categories(&requested, &policy);
        assert_eq!(denied, vec![ActionCategory::Configuration]);
    }

    #[test]
    fn empty_denied_when_all_allowed() {
        let mut requested = BTreeSet::new();
        requested.insert(ActionCategory::WorkspaceFiles);

        let policy = SelfConfigPolicy {
            enabled: true,
            allowed: vec![
                ActionCategory::Skills,
                ActionCategory::WorkspaceFiles,
                ActionCategory::EnvironmentVars,
            ],
        };
        assert!(denied_categories(&requested, &policy).is_empty());
    }

    #[test]
    fn format_lists_categories() {
        let denied = vec![ActionCategory::Skills, ActionCategory::Configuration];
        assert_eq!(format_categories(&denied), "skills, configuration");
    }
}
