use crate::error::{Result, RuntimeError};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use std::collections::HashMap;
use std::sync::Mutex;
use vpc_core::{NetworkInterface, PrivateNetwork};

/// Client for the external cluster object store that holds PrivateNetwork,
/// NetworkInterface, and Node objects.
///
/// The store itself — its storage engine, watch/cache machinery, and RBAC —
/// is an external collaborator and out of scope here; this trait is the seam
/// the reconcilers are written against.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn get_private_network(&self, name: &str) -> Result<Option<PrivateNetwork>>;
    async fn list_private_networks(&self) -> Result<Vec<PrivateNetwork>>;
    /// Full update of a PrivateNetwork (used for finalizer add/remove).
    async fn update_private_network(&self, pn: &PrivateNetwork) -> Result<PrivateNetwork>;

    async fn get_network_interface(&self, name: &str) -> Result<Option<NetworkInterface>>;
    /// List NICs carrying the given label value under `private-network`.
    async fn list_network_interfaces_for_pn(&self, pn_name: &str) -> Result<Vec<NetworkInterface>>;
    /// List NICs carrying the given label value under `node`.
    async fn list_network_interfaces_for_node(
        &self,
        node_name: &str,
    ) -> Result<Vec<NetworkInterface>>;
    async fn list_network_interfaces(&self) -> Result<Vec<NetworkInterface>>;
    async fn create_network_interface(&self, nic: &NetworkInterface) -> Result<NetworkInterface>;
    /// Full update of a NetworkInterface (spec, metadata/finalizers, and status).
    async fn update_network_interface(&self, nic: &NetworkInterface) -> Result<NetworkInterface>;
    async fn delete_network_interface(&self, name: &str) -> Result<()>;

    async fn get_node(&self, name: &str) -> Result<Option<Node>>;
    async fn list_nodes(&self) -> Result<Vec<Node>>;

    /// Fetch the opaque IPAM document backing a single PrivateNetwork's prefixes.
    async fn get_ipam_document(&self, key: &str) -> Result<Option<serde_json::Value>>;
    /// Create the IPAM document if absent; errors with [`RuntimeError::ClusterStoreError`]
    /// wrapping a conflict if it already exists.
    async fn create_ipam_document(&self, key: &str, body: serde_json::Value) -> Result<()>;
    /// Apply an RFC 7386 JSON merge patch to the IPAM document, creating it first
    /// if absent. The patch is applied atomically from the caller's point of view.
    async fn merge_patch_ipam_document(
        &self,
        key: &str,
        patch: serde_json::Value,
    ) -> Result<serde_json::Value>;
}

fn label_matches(metadata: &k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta, key: &str, value: &str) -> bool {
    metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(key))
        .map(|v| v == value)
        .unwrap_or(false)
}

/// HTTP-backed [`ClusterClient`] talking to the external cluster object store.
///
/// Every method follows the same shape as the teacher's per-kind API client:
/// build a URL, issue the request, map transport errors, check the status
/// code, and parse the JSON body.
pub struct HttpClusterClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpClusterClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn get_json(&self, path: &str) -> Result<Option<serde_json::Value>> {
        let resp = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| RuntimeError::cluster_store_error(e.to_string(), Some(Box::new(e))))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(RuntimeError::cluster_store_error(
                format!("GET {} failed with {}: {}", path, status, body),
                None,
            ));
        }

        resp.json()
            .await
            .map(Some)
            .map_err(|e| RuntimeError::cluster_store_error(e.to_string(), Some(Box::new(e))))
    }
}

#[async_trait]
impl ClusterClient for HttpClusterClient {
    async fn get_private_network(&self, name: &str) -> Result<Option<PrivateNetwork>> {
        let path = format!("/apis/vpc.scaleway.com/v1alpha1/privatenetworks/{}", name);
        match self.get_json(&path).await? {
            Some(v) => Ok(Some(serde_json::from_value(v).map_err(|e| {
                RuntimeError::cluster_store_error(e.to_string(), Some(Box::new(e)))
            })?)),
            None => Ok(None),
        }
    }

    async fn list_private_networks(&self) -> Result<Vec<PrivateNetwork>> {
        let body = self
            .get_json("/apis/vpc.scaleway.com/v1alpha1/privatenetworks")
            .await?
            .unwrap_or(serde_json::json!({"items": []}));
        let items = body["items"].as_array().cloned().unwrap_or_default();
        items
            .into_iter()
            .map(|v| {
                serde_json::from_value(v)
                    .map_err(|e| RuntimeError::cluster_store_error(e.to_string(), Some(Box::new(e))))
            })
            .collect()
    }

    async fn update_private_network(&self, pn: &PrivateNetwork) -> Result<PrivateNetwork> {
        let name = pn.metadata.name.as_deref().unwrap_or_default();
        let path = format!("/apis/vpc.scaleway.com/v1alpha1/privatenetworks/{}", name);
        let resp = self
            .client
            .put(self.url(&path))
            .json(pn)
            .send()
            .await
            .map_err(|e| RuntimeError::cluster_store_error(e.to_string(), Some(Box::new(e))))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(RuntimeError::cluster_store_error(
                format!("PUT {} failed with {}: {}", path, status, body),
                None,
            ));
        }

        resp.json()
            .await
            .map_err(|e| RuntimeError::cluster_store_error(e.to_string(), Some(Box::new(e))))
    }

    async fn get_network_interface(&self, name: &str) -> Result<Option<NetworkInterface>> {
        let path = format!("/apis/vpc.scaleway.com/v1alpha1/networkinterfaces/{}", name);
        match self.get_json(&path).await? {
            Some(v) => Ok(Some(serde_json::from_value(v).map_err(|e| {
                RuntimeError::cluster_store_error(e.to_string(), Some(Box::new(e)))
            })?)),
            None => Ok(None),
        }
    }

    async fn list_network_interfaces_for_pn(&self, pn_name: &str) -> Result<Vec<NetworkInterface>> {
        Ok(self
            .list_network_interfaces()
            .await?
            .into_iter()
            .filter(|nic| label_matches(&nic.metadata, "private-network", pn_name))
            .collect())
    }

    async fn list_network_interfaces_for_node(
        &self,
        node_name: &str,
    ) -> Result<Vec<NetworkInterface>> {
        Ok(self
            .list_network_interfaces()
            .await?
            .into_iter()
            .filter(|nic| label_matches(&nic.metadata, "node", node_name))
            .collect())
    }

    async fn list_network_interfaces(&self) -> Result<Vec<NetworkInterface>> {
        let body = self
            .get_json("/apis/vpc.scaleway.com/v1alpha1/networkinterfaces")
            .await?
            .unwrap_or(serde_json::json!({"items": []}));
        let items = body["items"].as_array().cloned().unwrap_or_default();
        items
            .into_iter()
            .map(|v| {
                serde_json::from_value(v)
                    .map_err(|e| RuntimeError::cluster_store_error(e.to_string(), Some(Box::new(e))))
            })
            .collect()
    }

    async fn create_network_interface(&self, nic: &NetworkInterface) -> Result<NetworkInterface> {
        let resp = self
            .client
            .post(self.url("/apis/vpc.scaleway.com/v1alpha1/networkinterfaces"))
            .json(nic)
            .send()
            .await
            .map_err(|e| RuntimeError::cluster_store_error(e.to_string(), Some(Box::new(e))))?;

        if resp.status() == reqwest::StatusCode::CONFLICT {
            let name = nic.metadata.name.clone().unwrap_or_default();
            return Err(RuntimeError::cluster_store_error(
                format!("NetworkInterface {} already exists", name),
                None,
            ));
        }

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(RuntimeError::cluster_store_error(
                format!("create NetworkInterface failed with {}: {}", status, body),
                None,
            ));
        }

        resp.json()
            .await
            .map_err(|e| RuntimeError::cluster_store_error(e.to_string(), Some(Box::new(e))))
    }

    async fn update_network_interface(&self, nic: &NetworkInterface) -> Result<NetworkInterface> {
        let name = nic.metadata.name.as_deref().unwrap_or_default();
        let path = format!("/apis/vpc.scaleway.com/v1alpha1/networkinterfaces/{}", name);
        let resp = self
            .client
            .put(self.url(&path))
            .json(nic)
            .send()
            .await
            .map_err(|e| RuntimeError::cluster_store_error(e.to_string(), Some(Box::new(e))))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(RuntimeError::cluster_store_error(
                format!("PUT {} failed with {}: {}", path, status, body),
                None,
            ));
        }

        resp.json()
            .await
            .map_err(|e| RuntimeError::cluster_store_error(e.to_string(), Some(Box::new(e))))
    }

    async fn delete_network_interface(&self, name: &str) -> Result<()> {
        let path = format!("/apis/vpc.scaleway.com/v1alpha1/networkinterfaces/{}", name);
        let resp = self
            .client
            .delete(self.url(&path))
            .send()
            .await
            .map_err(|e| RuntimeError::cluster_store_error(e.to_string(), Some(Box::new(e))))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(RuntimeError::cluster_store_error(
                format!("DELETE {} failed with {}: {}", path, status, body),
                None,
            ));
        }

        Ok(())
    }

    async fn get_node(&self, name: &str) -> Result<Option<Node>> {
        let path = format!("/api/v1/nodes/{}", name);
        match self.get_json(&path).await? {
            Some(v) => Ok(Some(serde_json::from_value(v).map_err(|e| {
                RuntimeError::cluster_store_error(e.to_string(), Some(Box::new(e)))
            })?)),
            None => Ok(None),
        }
    }

    async fn list_nodes(&self) -> Result<Vec<Node>> {
        let body = self
            .get_json("/api/v1/nodes")
            .await?
            .unwrap_or(serde_json::json!({"items": []}));
        let items = body["items"].as_array().cloned().unwrap_or_default();
        items
            .into_iter()
            .map(|v| {
                serde_json::from_value(v)
                    .map_err(|e| RuntimeError::cluster_store_error(e.to_string(), Some(Box::new(e))))
            })
            .collect()
    }

    async fn get_ipam_document(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let path = format!("/apis/vpc.scaleway.com/v1alpha1/ipam/{}", key);
        self.get_json(&path).await
    }

    async fn create_ipam_document(&self, key: &str, body: serde_json::Value) -> Result<()> {
        let resp = self
            .client
            .post(self.url(&format!("/apis/vpc.scaleway.com/v1alpha1/ipam/{}", key)))
            .json(&body)
            .send()
            .await
            .map_err(|e| RuntimeError::cluster_store_error(e.to_string(), Some(Box::new(e))))?;

        if resp.status() == reqwest::StatusCode::CONFLICT {
            return Err(RuntimeError::cluster_store_error(
                format!("IPAM document {} already exists", key),
                None,
            ));
        }

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(RuntimeError::cluster_store_error(
                format!("create IPAM document {} failed with {}: {}", key, status, text),
                None,
            ));
        }

        Ok(())
    }

    async fn merge_patch_ipam_document(
        &self,
        key: &str,
        patch: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let path = format!("/apis/vpc.scaleway.com/v1alpha1/ipam/{}", key);
        let resp = self
            .client
            .patch(self.url(&path))
            .header("Content-Type", "application/merge-patch+json")
            .json(&patch)
            .send()
            .await
            .map_err(|e| RuntimeError::cluster_store_error(e.to_string(), Some(Box::new(e))))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(RuntimeError::cluster_store_error(
                format!("PATCH {} failed with {}: {}", path, status, body),
                None,
            ));
        }

        resp.json()
            .await
            .map_err(|e| RuntimeError::cluster_store_error(e.to_string(), Some(Box::new(e))))
    }
}

/// In-memory [`ClusterClient`] test double. Applies merge patches the same
/// way the real cluster store is expected to: via RFC 7386 semantics, so
/// reconciler tests exercise the exact same merge behavior production sees.
#[derive(Default)]
pub struct MockClusterClient {
    private_networks: Mutex<HashMap<String, PrivateNetwork>>,
    network_interfaces: Mutex<HashMap<String, NetworkInterface>>,
    nodes: Mutex<HashMap<String, Node>>,
    ipam_documents: Mutex<HashMap<String, serde_json::Value>>,
}

impl MockClusterClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_private_network(&self, pn: PrivateNetwork) {
        let name = pn.metadata.name.clone().unwrap_or_default();
        self.private_networks.lock().unwrap().insert(name, pn);
    }

    pub fn seed_node(&self, node: Node) {
        let name = node.metadata.name.clone().unwrap_or_default();
        self.nodes.lock().unwrap().insert(name, node);
    }

    pub fn remove_node(&self, name: &str) {
        self.nodes.lock().unwrap().remove(name);
    }
}

#[async_trait]
impl ClusterClient for MockClusterClient {
    async fn get_private_network(&self, name: &str) -> Result<Option<PrivateNetwork>> {
        Ok(self.private_networks.lock().unwrap().get(name).cloned())
    }

    async fn list_private_networks(&self) -> Result<Vec<PrivateNetwork>> {
        Ok(self.private_networks.lock().unwrap().values().cloned().collect())
    }

    async fn update_private_network(&self, pn: &PrivateNetwork) -> Result<PrivateNetwork> {
        let name = pn.metadata.name.clone().unwrap_or_default();
        self.private_networks
            .lock()
            .unwrap()
            .insert(name, pn.clone());
        Ok(pn.clone())
    }

    async fn get_network_interface(&self, name: &str) -> Result<Option<NetworkInterface>> {
        Ok(self.network_interfaces.lock().unwrap().get(name).cloned())
    }

    async fn list_network_interfaces_for_pn(&self, pn_name: &str) -> Result<Vec<NetworkInterface>> {
        Ok(self
            .network_interfaces
            .lock()
            .unwrap()
            .values()
            .filter(|nic| label_matches(&nic.metadata, "private-network", pn_name))
            .cloned()
            .collect())
    }

    async fn list_network_interfaces_for_node(
        &self,
        node_name: &str,
    ) -> Result<Vec<NetworkInterface>> {
        Ok(self
            .network_interfaces
            .lock()
            .unwrap()
            .values()
            .filter(|nic| label_matches(&nic.metadata, "node", node_name))
            .cloned()
            .collect())
    }

    async fn list_network_interfaces(&self) -> Result<Vec<NetworkInterface>> {
        Ok(self.network_interfaces.lock().unwrap().values().cloned().collect())
    }

    async fn create_network_interface(&self, nic: &NetworkInterface) -> Result<NetworkInterface> {
        let name = nic.metadata.name.clone().unwrap_or_default();
        let mut store = self.network_interfaces.lock().unwrap();
        if store.contains_key(&name) {
            return Err(RuntimeError::cluster_store_error(
                format!("NetworkInterface {} already exists", name),
                None,
            ));
        }
        store.insert(name, nic.clone());
        Ok(nic.clone())
    }

    async fn update_network_interface(&self, nic: &NetworkInterface) -> Result<NetworkInterface> {
        let name = nic.metadata.name.clone().unwrap_or_default();
        let mut store = self.network_interfaces.lock().unwrap();

        let finalizers_empty = nic.metadata.finalizers.as_ref().is_none_or(|f| f.is_empty());
        if nic.metadata.deletion_timestamp.is_some() && finalizers_empty {
            store.remove(&name);
        } else {
            store.insert(name, nic.clone());
        }
        Ok(nic.clone())
    }

    async fn delete_network_interface(&self, name: &str) -> Result<()> {
        let mut store = self.network_interfaces.lock().unwrap();
        let Some(nic) = store.get_mut(name) else {
            return Ok(());
        };

        // Mirror real cluster-store GC semantics: an object with finalizers is
        // marked for deletion rather than removed outright; it disappears once
        // the last finalizer is cleared via update_network_interface.
        if nic.metadata.finalizers.as_ref().is_some_and(|f| !f.is_empty()) {
            if nic.metadata.deletion_timestamp.is_none() {
                nic.metadata.deletion_timestamp =
                    Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(
                        chrono::Utc::now(),
                    ));
            }
        } else {
            store.remove(name);
        }
        Ok(())
    }

    async fn get_node(&self, name: &str) -> Result<Option<Node>> {
        Ok(self.nodes.lock().unwrap().get(name).cloned())
    }

    async fn list_nodes(&self) -> Result<Vec<Node>> {
        Ok(self.nodes.lock().unwrap().values().cloned().collect())
    }

    async fn get_ipam_document(&self, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.ipam_documents.lock().unwrap().get(key).cloned())
    }

    async fn create_ipam_document(&self, key: &str, body: serde_json::Value) -> Result<()> {
        let mut docs = self.ipam_documents.lock().unwrap();
        if docs.contains_key(key) {
            return Err(RuntimeError::cluster_store_error(
                format!("IPAM document {} already exists", key),
                None,
            ));
        }
        docs.insert(key.to_string(), body);
        Ok(())
    }

    async fn merge_patch_ipam_document(
        &self,
        key: &str,
        patch: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let mut docs = self.ipam_documents.lock().unwrap();
        let mut doc = docs.get(key).cloned().unwrap_or(serde_json::json!({}));
        json_patch::merge(&mut doc, &patch);
        docs.insert(key.to_string(), doc.clone());
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn labeled_nic(name: &str, pn: &str, node: &str) -> NetworkInterface {
        let mut meta = ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        };
        meta.labels = Some(
            [
                ("private-network".to_string(), pn.to_string()),
                ("node".to_string(), node.to_string()),
            ]
            .into_iter()
            .collect(),
        );
        NetworkInterface {
            api_version: None,
            kind: None,
            metadata: meta,
            spec: vpc_core::NetworkInterfaceSpec {
                id: None,
                node_name: node.to_string(),
                address: None,
            },
            status: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_mock_create_and_get_network_interface() {
        let client = MockClusterClient::new();
        let nic = labeled_nic("node-1-my-pn", "my-pn", "node-1");
        client.create_network_interface(&nic).await.unwrap();

        let fetched = client.get_network_interface("node-1-my-pn").await.unwrap();
        assert!(fetched.is_some());
    }

    #[tokio::test]
    async fn test_mock_create_duplicate_network_interface_errors() {
        let client = MockClusterClient::new();
        let nic = labeled_nic("node-1-my-pn", "my-pn", "node-1");
        client.create_network_interface(&nic).await.unwrap();
        let result = client.create_network_interface(&nic).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_mock_list_network_interfaces_for_pn() {
        let client = MockClusterClient::new();
        client
            .create_network_interface(&labeled_nic("node-1-my-pn", "my-pn", "node-1"))
            .await
            .unwrap();
        client
            .create_network_interface(&labeled_nic("node-2-my-pn", "my-pn", "node-2"))
            .await
            .unwrap();
        client
            .create_network_interface(&labeled_nic("node-1-other-pn", "other-pn", "node-1"))
            .await
            .unwrap();

        let for_pn = client.list_network_interfaces_for_pn("my-pn").await.unwrap();
        assert_eq!(for_pn.len(), 2);

        let for_node = client
            .list_network_interfaces_for_node("node-1")
            .await
            .unwrap();
        assert_eq!(for_node.len(), 2);
    }

    #[tokio::test]
    async fn test_mock_merge_patch_ipam_document_creates_and_merges() {
        let client = MockClusterClient::new();
        let patch = serde_json::json!({"10.0.0.5": "node-1-my-pn"});
        let doc = client
            .merge_patch_ipam_document("my-pn", patch)
            .await
            .unwrap();
        assert_eq!(doc["10.0.0.5"], "node-1-my-pn");

        let patch2 = serde_json::json!({"10.0.0.6": "node-2-my-pn"});
        let doc2 = client
            .merge_patch_ipam_document("my-pn", patch2)
            .await
            .unwrap();
        assert_eq!(doc2["10.0.0.5"], "node-1-my-pn");
        assert_eq!(doc2["10.0.0.6"], "node-2-my-pn");
    }

    #[tokio::test]
    async fn test_mock_merge_patch_null_removes_key() {
        let client = MockClusterClient::new();
        client
            .merge_patch_ipam_document("my-pn", serde_json::json!({"10.0.0.5": "node-1-my-pn"}))
            .await
            .unwrap();

        let doc = client
            .merge_patch_ipam_document("my-pn", serde_json::json!({"10.0.0.5": null}))
            .await
            .unwrap();
        assert!(doc.get("10.0.0.5").is_none());
    }

    #[tokio::test]
    async fn test_mock_delete_network_interface_is_idempotent() {
        let client = MockClusterClient::new();
        client.delete_network_interface("missing").await.unwrap();
    }
}
