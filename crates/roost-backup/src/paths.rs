//! Blob-store path derivation for backups
//!
//! Paths are namespaced by tenant identifier + instance name + timestamp:
//! `acme/alpha/20260807-143000`. The caller persists the derived path in
//! status *before* creating the Job, so retries and a later rollback find
//! it deterministically instead of recomputing a timestamp.

use chrono::{DateTime, Utc};

/// Derive a new backup path for the given tenant and instance.
///
/// The timestamp is second-granular UTC; one backup flow per instance is
/// in flight at a time, so collisions cannot occur.
pub fn backup_path(tenant: &str, instance: &str, now: DateTime<Utc>) -> String {
    format!(
        "{}/{}/{}",
        sanitize(tenant),
        sanitize(instance),
        now.format("%Y%m%d-%H%M%S")
    )
}

/// Replace path-hostile characters so tenant labels can't escape their prefix.
fn sanitize(segment: &str) -> String {
    segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn path_is_tenant_instance_timestamp() {
        let now = Utc.with_ymd_and_hms(2026, 8, 7, 14, 30, 0).unwrap();
        assert_eq!(
            backup_path("acme", "alpha", now),
            "acme/alpha/20260807-143000"
        );
    }

    #[test]
    fn hostile_segments_are_sanitized() {
        let now = Utc.with_ymd_and_hms(2026, 8, 7, 0, 0, 0).unwrap();
        let path = backup_path("../etc", "a/b", now);
        assert_eq!(path, "---etc/a-b/20260807-000000");
        assert_eq!(path.matches('/').count(), 2);
    }

    #[test]
    fn same_inputs_same_path() {
        let now = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(
            backup_path("t", "i", now),
            backup_path("t", "i", now)
        );
    }
}
