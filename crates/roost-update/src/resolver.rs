//! Version resolution against a container registry
//!
//! Resolves a mutable repository to the newest semantic version it carries.
//! Tags that do not parse as semver (e.g. "latest", "edge") are skipped,
//! never errors — the registry is full of them.

use async_trait::async_trait;
use semver::{Version, VersionReq};
use serde::Deserialize;
use tracing::{debug, warn};

#[cfg(test)]
use mockall::automock;

use roost_common::{Error, Result};

/// Resolves a repository's newest semantic version.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait VersionResolver: Send + Sync {
    /// Return the highest semver tag in `repository` that satisfies
    /// `constraint` (all versions when `None`), or `None` when the
    /// repository carries no parseable version at all.
    async fn latest_semver(
        &self,
        repository: &str,
        constraint: Option<VersionReq>,
    ) -> Result<Option<Version>>;
}

/// OCI registry tag-list response
#[derive(Debug, Deserialize)]
struct TagList {
    #[serde(default)]
    tags: Option<Vec<String>>,
}

/// Resolver backed by the OCI registry HTTP API (`/v2/<repo>/tags/list`).
pub struct RegistryResolver {
    http: reqwest::Client,
}

impl RegistryResolver {
    /// Create a resolver with its own HTTP client.
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for RegistryResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VersionResolver for RegistryResolver {
    async fn latest_semver(
        &self,
        repository: &str,
        constraint: Option<VersionReq>,
    ) -> Result<Option<Version>> {
        let (host, path) = split_repository(repository);
        let url = format!("https://{}/v2/{}/tags/list", host, path);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::registry(repository, format!("tag list request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::registry(
                repository,
                format!("tag list returned {}", response.status()),
            ));
        }

        let tag_list: TagList = response
            .json()
            .await
            .map_err(|e| Error::registry(repository, format!("malformed tag list: {e}")))?;

        let tags = tag_list.tags.unwrap_or_default();
        debug!(repository, tag_count = tags.len(), "fetched registry tags");
        Ok(pick_latest(&tags, constraint.as_ref()))
    }
}

/// Pick the highest parseable, constraint-satisfying version from raw tags.
pub fn pick_latest(tags: &[String], constraint: Option<&VersionReq>) -> Option<Version> {
    tags.iter()
        .filter_map(|t| {
            let candidate = t.strip_prefix('v').unwrap_or(t);
            Version::parse(candidate).ok()
        })
        .filter(|v| v.pre.is_empty())
        .filter(|v| constraint.map(|c| c.matches(v)).unwrap_or(true))
        .max()
}

/// Split `ghcr.io/roost-run/runtime` into registry host and repository path.
///
/// A first segment containing a dot or a colon is a host; otherwise the
/// reference is assumed to live on Docker Hub.
pub fn split_repository(repository: &str) -> (&str, &str) {
    match repository.split_once('/') {
        Some((first, rest)) if first.contains('.') || first.contains(':') => (first, rest),
        _ => {
            warn!(repository, "repository has no registry host, assuming docker.io");
            ("registry-1.docker.io", repository)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn picks_highest_semver() {
        let t = tags(&["1.0.0", "1.2.0", "1.1.9"]);
        assert_eq!(pick_latest(&t, None), Some(Version::new(1, 2, 0)));
    }

    #[test]
    fn skips_non_semver_tags() {
        let t = tags(&["latest", "edge", "1.0.0", "sha-deadbeef"]);
        assert_eq!(pick_latest(&t, None), Some(Version::new(1, 0, 0)));
    }

    #[test]
    fn tolerates_v_prefix() {
        let t = tags(&["v2.1.0", "2.0.0"]);
        assert_eq!(pick_latest(&t, None), Some(Version::new(2, 1, 0)));
    }

    #[test]
    fn skips_prereleases() {
        let t = tags(&["1.0.0", "2.0.0-rc.1"]);
        assert_eq!(pick_latest(&t, None), Some(Version::new(1, 0, 0)));
    }

    #[test]
    fn no_parseable_tags_is_none() {
        let t = tags(&["latest", "stable"]);
        assert_eq!(pick_latest(&t, None), None);
        assert_eq!(pick_latest(&[], None), None);
    }

    #[test]
    fn constraint_filters_candidates() {
        let t = tags(&["1.4.0", "2.0.0"]);
        let req = VersionReq::parse("<2.0.0").unwrap();
        assert_eq!(pick_latest(&t, Some(&req)), Some(Version::new(1, 4, 0)));
    }

    #[test]
    fn split_repository_with_host() {
        assert_eq!(
            split_repository("ghcr.io/roost-run/runtime"),
            ("ghcr.io", "roost-run/runtime")
        );
        assert_eq!(
            split_repository("localhost:5000/runtime"),
            ("localhost:5000", "runtime")
        );
    }

    #[test]
    fn split_repository_without_host_assumes_docker_hub() {
        assert_eq!(
            split_repository("library/nginx"),
            ("registry-1.docker.io", "library/nginx")
        );
    }
}
