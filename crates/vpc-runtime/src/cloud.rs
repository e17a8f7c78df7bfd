use crate::error::{Result, RuntimeError};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

/// A cloud compute instance as seen by the cloud inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Server {
    pub id: String,
    pub name: String,
    pub zone: String,
    pub private_nics: Vec<PrivateNic>,
}

/// A private NIC already attached to a [`Server`], as reported by the cloud inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateNic {
    pub id: String,
    pub private_network_id: String,
    pub mac_address: String,
}

fn provider_id_regexp() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^scaleway://(?:(?P<product>[^/]*)/(?P<zone>[^/]*)/(?P<uuid>[^/]*)|(?P<uuid_only>.*))$")
            .expect("provider ID regex is valid")
    })
}

/// Resolve a node's `spec.providerID` into a (server ID, zone) pair, matching
/// the `scaleway://<product>/<zone>/<uuid>` and bare `scaleway://<uuid>` forms.
/// Returns `None` if the provider ID is absent, empty, or doesn't match either form.
fn parse_provider_id(provider_id: &str) -> Option<(String, String)> {
    let captures = provider_id_regexp().captures(provider_id)?;

    if let Some(uuid) = captures.name("uuid") {
        let zone = captures.name("zone").map(|m| m.as_str()).unwrap_or("");
        if !uuid.as_str().is_empty() {
            return Some((uuid.as_str().to_string(), zone.to_string()));
        }
    }

    captures
        .name("uuid_only")
        .map(|m| m.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| (s.to_string(), String::new()))
}

/// The external cloud provider's server/NIC/network inventory: attaches and
/// detaches secondary NICs on compute instances and resolves cluster Nodes to
/// cloud servers. The concrete provider SDK call is out of scope; this trait
/// is the seam reconcilers are written against.
#[async_trait]
pub trait CloudInventory: Send + Sync {
    /// Resolve a server by ID within a zone.
    async fn get_server(&self, zone: &str, server_id: &str) -> Result<Server>;

    /// List servers by exact name within a zone (used as a providerID fallback).
    async fn list_servers_by_name(&self, zone: &str, name: &str) -> Result<Vec<Server>>;

    /// Resolve the cloud server backing a cluster Node: first via its
    /// providerID, falling back to an exact name match. Errors unless exactly
    /// one server is found.
    async fn get_server_from_node(&self, node: &Node) -> Result<Server> {
        let node_name = node.metadata.name.clone().unwrap_or_default();

        if let Some(provider_id) = node.spec.as_ref().and_then(|s| s.provider_id.as_deref()) {
            if let Some((server_id, zone)) = parse_provider_id(provider_id) {
                if let Ok(server) = self.get_server(&zone, &server_id).await {
                    return Ok(server);
                }
            }
        }

        let zone = "";
        let mut servers = self.list_servers_by_name(zone, &node_name).await?;
        if servers.len() != 1 {
            return Err(RuntimeError::server_resolution_failed(
                &node_name,
                format!("found {} servers with name {} instead of 1", servers.len(), node_name),
            ));
        }
        Ok(servers.remove(0))
    }

    /// Attach a new private NIC to `server_id` on the given PrivateNetwork,
    /// or return the existing one if already attached.
    async fn create_private_nic(
        &self,
        zone: &str,
        server_id: &str,
        private_network_id: &str,
    ) -> Result<PrivateNic>;

    /// Detach a private NIC. Not-found is treated as already-converged by callers.
    async fn delete_private_nic(&self, zone: &str, server_id: &str, private_nic_id: &str) -> Result<()>;
}

/// In-memory [`CloudInventory`] test double.
#[derive(Default)]
pub struct MockCloudInventory {
    servers: Mutex<HashMap<String, Server>>,
}

impl MockCloudInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_server(&self, server: Server) {
        self.servers.lock().unwrap().insert(server.id.clone(), server);
    }
}

#[async_trait]
impl CloudInventory for MockCloudInventory {
    async fn get_server(&self, _zone: &str, server_id: &str) -> Result<Server> {
        self.servers
            .lock()
            .unwrap()
            .get(server_id)
            .cloned()
            .ok_or_else(|| RuntimeError::cloud_not_found(format!("server {}", server_id)))
    }

    async fn list_servers_by_name(&self, _zone: &str, name: &str) -> Result<Vec<Server>> {
        Ok(self
            .servers
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.name == name)
            .cloned()
            .collect())
    }

    async fn create_private_nic(
        &self,
        _zone: &str,
        server_id: &str,
        private_network_id: &str,
    ) -> Result<PrivateNic> {
        let mut servers = self.servers.lock().unwrap();
        let server = servers
            .get_mut(server_id)
            .ok_or_else(|| RuntimeError::cloud_not_found(format!("server {}", server_id)))?;

        if let Some(existing) = server
            .private_nics
            .iter()
            .find(|n| n.private_network_id == private_network_id)
        {
            return Ok(existing.clone());
        }

        let nic = PrivateNic {
            id: format!("pnic-{}-{}", server_id, private_network_id),
            private_network_id: private_network_id.to_string(),
            mac_address: format!("02:00:00:00:{:02x}:{:02x}", server.private_nics.len(), 1),
        };
        server.private_nics.push(nic.clone());
        Ok(nic)
    }

    async fn delete_private_nic(&self, _zone: &str, server_id: &str, private_nic_id: &str) -> Result<()> {
        if let Some(server) = self.servers.lock().unwrap().get_mut(server_id) {
            server.private_nics.retain(|n| n.id != private_nic_id);
        }
        Ok(())
    }
}

/// HTTP-backed [`CloudInventory`] talking to the cloud provider's server/NIC
/// API. The actual provider SDK and its auth/retry machinery are out of
/// scope; this issues plain REST calls against a configured base URL so the
/// binary has something concrete to run against besides the in-memory mock.
pub struct HttpCloudInventory {
    base_url: String,
    client: reqwest::Client,
}

impl HttpCloudInventory {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[derive(serde::Deserialize)]
struct ServerResponse {
    id: String,
    name: String,
    zone: String,
    #[serde(default)]
    private_nics: Vec<PrivateNicResponse>,
}

#[derive(serde::Deserialize)]
struct PrivateNicResponse {
    id: String,
    private_network_id: String,
    mac_address: String,
}

impl From<ServerResponse> for Server {
    fn from(s: ServerResponse) -> Self {
        Server {
            id: s.id,
            name: s.name,
            zone: s.zone,
            private_nics: s
                .private_nics
                .into_iter()
                .map(|n| PrivateNic {
                    id: n.id,
                    private_network_id: n.private_network_id,
                    mac_address: n.mac_address,
                })
                .collect(),
        }
    }
}

#[async_trait]
impl CloudInventory for HttpCloudInventory {
    async fn get_server(&self, zone: &str, server_id: &str) -> Result<Server> {
        let path = format!("/servers/{}?zone={}", server_id, zone);
        let resp = self
            .client
            .get(self.url(&path))
            .send()
            .await
            .map_err(|e| RuntimeError::cloud_error(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(RuntimeError::cloud_not_found(format!("server {}", server_id)));
        }
        if !resp.status().is_success() {
            return Err(RuntimeError::cloud_error(format!(
                "GET {} failed with {}",
                path,
                resp.status()
            )));
        }

        resp.json::<ServerResponse>()
            .await
            .map(Server::from)
            .map_err(|e| RuntimeError::cloud_error(e.to_string()))
    }

    async fn list_servers_by_name(&self, zone: &str, name: &str) -> Result<Vec<Server>> {
        let path = format!("/servers?zone={}&name={}", zone, name);
        let resp = self
            .client
            .get(self.url(&path))
            .send()
            .await
            .map_err(|e| RuntimeError::cloud_error(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(RuntimeError::cloud_error(format!(
                "GET {} failed with {}",
                path,
                resp.status()
            )));
        }

        #[derive(serde::Deserialize)]
        struct ListResponse {
            #[serde(default)]
            servers: Vec<ServerResponse>,
        }
        let body: ListResponse = resp
            .json()
            .await
            .map_err(|e| RuntimeError::cloud_error(e.to_string()))?;
        Ok(body.servers.into_iter().map(Server::from).collect())
    }

    async fn create_private_nic(
        &self,
        zone: &str,
        server_id: &str,
        private_network_id: &str,
    ) -> Result<PrivateNic> {
        let path = format!("/servers/{}/private_nics?zone={}", server_id, zone);
        let resp = self
            .client
            .post(self.url(&path))
            .json(&serde_json::json!({ "private_network_id": private_network_id }))
            .send()
            .await
            .map_err(|e| RuntimeError::cloud_error(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(RuntimeError::cloud_error(format!(
                "POST {} failed with {}",
                path,
                resp.status()
            )));
        }

        let nic: PrivateNicResponse = resp
            .json()
            .await
            .map_err(|e| RuntimeError::cloud_error(e.to_string()))?;
        Ok(PrivateNic {
            id: nic.id,
            private_network_id: nic.private_network_id,
            mac_address: nic.mac_address,
        })
    }

    async fn delete_private_nic(&self, zone: &str, server_id: &str, private_nic_id: &str) -> Result<()> {
        let path = format!(
            "/servers/{}/private_nics/{}?zone={}",
            server_id, private_nic_id, zone
        );
        let resp = self
            .client
            .delete(self.url(&path))
            .send()
            .await
            .map_err(|e| RuntimeError::cloud_error(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        if !resp.status().is_success() {
            return Err(RuntimeError::cloud_error(format!(
                "DELETE {} failed with {}",
                path,
                resp.status()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{Node, NodeSpec};

    fn node_with_provider_id(name: &str, provider_id: &str) -> Node {
        Node {
            metadata: k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: Some(NodeSpec {
                provider_id: Some(provider_id.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_provider_id_full_form() {
        let (id, zone) = parse_provider_id("scaleway://instance/fr-par-1/11111111-1111-1111-1111-111111111111").unwrap();
        assert_eq!(id, "11111111-1111-1111-1111-111111111111");
        assert_eq!(zone, "fr-par-1");
    }

    #[test]
    fn test_parse_provider_id_bare_uuid() {
        let (id, zone) = parse_provider_id("scaleway://11111111-1111-1111-1111-111111111111").unwrap();
        assert_eq!(id, "11111111-1111-1111-1111-111111111111");
        assert_eq!(zone, "");
    }

    #[test]
    fn test_parse_provider_id_no_match() {
        assert!(parse_provider_id("").is_none());
        assert!(parse_provider_id("aws://foo").is_none());
    }

    #[tokio::test]
    async fn test_get_server_from_node_via_provider_id() {
        let inventory = MockCloudInventory::new();
        inventory.seed_server(Server {
            id: "srv-1".to_string(),
            name: "node-1".to_string(),
            zone: "fr-par-1".to_string(),
            private_nics: vec![],
        });
        let node = node_with_provider_id("node-1", "scaleway://instance/fr-par-1/srv-1");
        let server = inventory.get_server_from_node(&node).await.unwrap();
        assert_eq!(server.id, "srv-1");
    }

    #[tokio::test]
    async fn test_get_server_from_node_falls_back_to_name() {
        let inventory = MockCloudInventory::new();
        inventory.seed_server(Server {
            id: "srv-1".to_string(),
            name: "node-1".to_string(),
            zone: "fr-par-1".to_string(),
            private_nics: vec![],
        });
        let node = Node {
            metadata: k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
                name: Some("node-1".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let server = inventory.get_server_from_node(&node).await.unwrap();
        assert_eq!(server.id, "srv-1");
    }

    #[tokio::test]
    async fn test_get_server_from_node_ambiguous_name_errors() {
        let inventory = MockCloudInventory::new();
        inventory.seed_server(Server {
            id: "srv-1".to_string(),
            name: "node-1".to_string(),
            zone: "fr-par-1".to_string(),
            private_nics: vec![],
        });
        inventory.seed_server(Server {
            id: "srv-2".to_string(),
            name: "node-1".to_string(),
            zone: "fr-par-1".to_string(),
            private_nics: vec![],
        });
        let node = Node {
            metadata: k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
                name: Some("node-1".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let result = inventory.get_server_from_node(&node).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_create_private_nic_idempotent() {
        let inventory = MockCloudInventory::new();
        inventory.seed_server(Server {
            id: "srv-1".to_string(),
            name: "node-1".to_string(),
            zone: "fr-par-1".to_string(),
            private_nics: vec![],
        });
        let a = inventory.create_private_nic("fr-par-1", "srv-1", "pn-1").await.unwrap();
        let b = inventory.create_private_nic("fr-par-1", "srv-1", "pn-1").await.unwrap();
        assert_eq!(a.id, b.id);
    }
}
