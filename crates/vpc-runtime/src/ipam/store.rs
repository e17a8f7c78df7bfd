use super::cidr::encode_cidr_key;
use crate::cluster_client::ClusterClient;
use crate::error::{Result, RuntimeError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Persisted state for a single CIDR within the shared IPAM document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Prefix {
    pub cidr: String,
    /// IP address -> owning NetworkInterface name
    #[serde(default)]
    pub allocated: BTreeMap<String, String>,
}

/// Client for the IPAM document held in the cluster object store. Mirrors the
/// original `ConfigMapIPAM`: a single document, keyed by the configured
/// `(namespace, name)` for the whole system rather than per-PrivateNetwork,
/// holding one entry per CIDR prefix.
pub struct IpamStore {
    client: Arc<dyn ClusterClient>,
    document_key: String,
}

impl IpamStore {
    pub fn new(client: Arc<dyn ClusterClient>, document_key: impl Into<String>) -> Self {
        Self {
            client,
            document_key: document_key.into(),
        }
    }

    /// Idempotently ensure a prefix exists in the document, returning the
    /// existing prefix if one is already present.
    pub async fn create_prefix(&self, cidr: &str) -> Result<Prefix> {
        if let Ok(existing) = self.read_prefix(cidr).await {
            return Ok(existing);
        }

        let key = encode_cidr_key(cidr);
        let patch = serde_json::json!({ key: { "cidr": cidr, "allocated": {} } });
        let doc = self
            .client
            .merge_patch_ipam_document(&self.document_key, patch)
            .await?;

        self.decode_prefix(&doc, cidr)
    }

    pub async fn read_prefix(&self, cidr: &str) -> Result<Prefix> {
        let doc = self
            .client
            .get_ipam_document(&self.document_key)
            .await?
            .ok_or_else(|| RuntimeError::prefix_not_found(cidr))?;
        self.decode_prefix(&doc, cidr)
    }

    pub async fn read_all_prefixes(&self) -> Result<Vec<Prefix>> {
        let doc = match self.client.get_ipam_document(&self.document_key).await? {
            Some(doc) => doc,
            None => return Ok(vec![]),
        };

        let object = doc.as_object().ok_or_else(|| {
            RuntimeError::prefix_decode_error(&self.document_key, "IPAM document is not a JSON object")
        })?;

        object
            .values()
            .map(|v| {
                serde_json::from_value(v.clone())
                    .map_err(|e| RuntimeError::prefix_decode_error(&self.document_key, e.to_string()))
            })
            .collect()
    }

    /// Record that `address` has been handed out to `owner` within `cidr`.
    pub async fn mark_allocated(&self, cidr: &str, address: &str, owner: &str) -> Result<()> {
        let key = encode_cidr_key(cidr);
        let patch = serde_json::json!({
            key: { "cidr": cidr, "allocated": { address: owner } }
        });
        self.client
            .merge_patch_ipam_document(&self.document_key, patch)
            .await?;
        Ok(())
    }

    /// Release a previously allocated address. No-op (not an error) if the
    /// address was not marked as allocated — matches delete-path semantics
    /// where double-release is expected.
    pub async fn mark_released(&self, cidr: &str, address: &str) -> Result<()> {
        let key = encode_cidr_key(cidr);
        let patch = serde_json::json!({
            key: { "allocated": { address: null } }
        });
        self.client
            .merge_patch_ipam_document(&self.document_key, patch)
            .await?;
        Ok(())
    }

    /// Remove the prefix entry for `cidr` entirely, via a merge-patch `null`.
    /// Absence of the key beforehand is not an error.
    pub async fn delete_prefix(&self, cidr: &str) -> Result<()> {
        let key = encode_cidr_key(cidr);
        let patch = serde_json::json!({ key: null });
        self.client
            .merge_patch_ipam_document(&self.document_key, patch)
            .await?;
        Ok(())
    }

    fn decode_prefix(&self, doc: &serde_json::Value, cidr: &str) -> Result<Prefix> {
        let key = encode_cidr_key(cidr);
        let value = doc
            .get(&key)
            .ok_or_else(|| RuntimeError::prefix_not_found(cidr))?;
        serde_json::from_value(value.clone())
            .map_err(|e| RuntimeError::prefix_decode_error(cidr, e.to_string()))
    }
}
