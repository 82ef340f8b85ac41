//! Blob-store credentials for data-mover jobs
//!
//! Credentials are read from a fixed Secret in the operator's own
//! namespace. Their absence is not an error: callers treat a missing
//! Secret as "backups not configured" and skip gracefully.

use std::collections::HashMap;

use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube::Client;

use crate::{Error, Result, BACKUP_CREDENTIALS_SECRET, ROOST_SYSTEM_NAMESPACE};

/// Credentials for the blob store backing backups and restores
#[derive(Debug, Clone)]
pub struct BackupCredentials {
    /// Target bucket name
    pub bucket: String,
    /// Access key identifier
    pub key_id: String,
    /// Application key (secret part)
    pub app_key: String,
    /// Service endpoint URL
    pub endpoint: String,
    /// Optional region
    pub region: Option<String>,
}

impl BackupCredentials {
    /// Build credentials from a Secret's decoded key/value pairs.
    ///
    /// Returns `None` when any required key is missing.
    pub fn from_map(data: &HashMap<String, String>) -> Option<Self> {
        Some(Self {
            bucket: data.get("bucket")?.clone(),
            key_id: data.get("keyId")?.clone(),
            app_key: data.get("appKey")?.clone(),
            endpoint: data.get("endpoint")?.clone(),
            region: data.get("region").cloned(),
        })
    }

    /// Build credentials from a Kubernetes Secret object.
    ///
    /// Reads `stringData` first (useful in tests), then falls back to the
    /// base64-decoded `data` map. Non-UTF-8 values are skipped.
    pub fn from_secret(secret: &Secret) -> Option<Self> {
        let mut map = HashMap::new();
        if let Some(string_data) = &secret.string_data {
            for (k, v) in string_data {
                map.insert(k.clone(), v.clone());
            }
        }
        if let Some(data) = &secret.data {
            for (k, v) in data {
                if let Ok(s) = String::from_utf8(v.0.clone()) {
                    map.entry(k.clone()).or_insert(s);
                }
            }
        }
        Self::from_map(&map)
    }

    /// Fetch credentials from the operator's credential Secret.
    ///
    /// Returns `Ok(None)` when the Secret does not exist or is incomplete —
    /// that is the "backups not configured" state, not a failure.
    pub async fn load(client: &Client) -> Result<Option<Self>> {
        let api: Api<Secret> = Api::namespaced(client.clone(), ROOST_SYSTEM_NAMESPACE);
        match api.get_opt(BACKUP_CREDENTIALS_SECRET).await {
            Ok(Some(secret)) => Ok(Self::from_secret(&secret)),
            Ok(None) => Ok(None),
            Err(e) => Err(Error::from(e)),
        }
    }
}
