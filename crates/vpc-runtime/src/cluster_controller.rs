use crate::cloud::CloudInventory;
use crate::cluster_client::ClusterClient;
use crate::constants::{IP_FINALIZER, NODE_FINALIZER, NODE_LABEL, PN_FINALIZER, PRIVATE_NETWORK_LABEL};
use crate::error::{Result, RuntimeError};
use crate::ipam::allocator::Allocator;
use k8s_openapi::api::core::v1::Node;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use vpc_core::{NetworkInterface, NetworkInterfaceSpec, PrivateNetwork};

/// Reconciles PrivateNetwork objects against the cloud inventory: creates one
/// NetworkInterface per cluster node for each PrivateNetwork, attaches the
/// corresponding cloud-side private NIC, and tears both down when the
/// PrivateNetwork or a node is removed.
///
/// Runs cluster-wide (one instance active at a time — see [`crate::leader`]),
/// as opposed to [`crate::node_controller::NodeReconciler`] which runs on
/// every node.
pub struct ClusterReconciler {
    cluster: Arc<dyn ClusterClient>,
    cloud: Arc<dyn CloudInventory>,
    allocator: Arc<Allocator>,
    reconcile_interval: Duration,
}

impl ClusterReconciler {
    pub fn new(
        cluster: Arc<dyn ClusterClient>,
        cloud: Arc<dyn CloudInventory>,
        allocator: Arc<Allocator>,
        reconcile_interval: Duration,
    ) -> Self {
        Self {
            cluster,
            cloud,
            allocator,
            reconcile_interval,
        }
    }

    /// Run the controller's periodic full-resync loop until cancelled.
    pub async fn run(&self, token: CancellationToken) -> Result<()> {
        info!("Starting cluster reconciler");

        if let Err(e) = self.reconcile_all().await {
            error!("Initial cluster reconcile failed: {}", e);
        }

        let mut tick = tokio::time::interval(self.reconcile_interval);
        tick.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("Cluster reconciler shutting down");
                    return Ok(());
                }
                _ = tick.tick() => {
                    debug!("Periodic cluster reconcile tick");
                    if let Err(e) = self.reconcile_all().await {
                        error!("Cluster reconcile cycle failed: {}", e);
                    }
                }
            }
        }
    }

    async fn reconcile_all(&self) -> Result<()> {
        let pns = self.cluster.list_private_networks().await?;
        for pn in pns {
            let name = pn.metadata.name.clone().unwrap_or_default();
            if let Err(e) = self.reconcile_private_network(&pn).await {
                error!("Failed to reconcile PrivateNetwork {}: {}", name, e);
            }
        }

        let nics = self.cluster.list_network_interfaces().await?;
        for nic in nics {
            let name = nic.metadata.name.clone().unwrap_or_default();
            if let Err(e) = self.reconcile_network_interface(&nic).await {
                error!("Failed to reconcile NetworkInterface {} (cluster side): {}", name, e);
            }
        }

        Ok(())
    }

    /// Drive a single PrivateNetwork: finalizer lifecycle, per-node NIC creation.
    pub async fn reconcile_private_network(&self, pn: &PrivateNetwork) -> Result<()> {
        let pn_name = pn.metadata.name.clone().unwrap_or_default();

        if pn.metadata.deletion_timestamp.is_some() {
            return self.teardown_private_network(pn, &pn_name).await;
        }

        let mut pn = pn.clone();
        if !has_finalizer(&pn.metadata, PN_FINALIZER) {
            add_finalizer(&mut pn.metadata, PN_FINALIZER);
            self.cluster.update_private_network(&pn).await?;
        }

        let nodes = self.cluster.list_nodes().await?;
        for node in nodes {
            if let Err(e) = self.reconcile_node_for_private_network(&pn, &node).await {
                warn!(
                    "could not reconcile node {} for private network {}: {}",
                    node.metadata.name.clone().unwrap_or_default(),
                    pn_name,
                    e
                );
                break;
            }
        }

        Ok(())
    }

    async fn teardown_private_network(&self, pn: &PrivateNetwork, pn_name: &str) -> Result<()> {
        if !has_finalizer(&pn.metadata, PN_FINALIZER) {
            return Ok(());
        }

        let nics = self.cluster.list_network_interfaces_for_pn(pn_name).await?;
        for nic in &nics {
            if nic.metadata.deletion_timestamp.is_none() {
                let name = nic.metadata.name.clone().unwrap_or_default();
                self.cluster.delete_network_interface(&name).await?;
            }
        }

        // Re-check after issuing deletes: objects carrying their own finalizers
        // (IP_FINALIZER) stick around until the node-side and cluster-side NIC
        // reconcilers finish tearing them down.
        let remaining = self.cluster.list_network_interfaces_for_pn(pn_name).await?;
        if remaining.is_empty() {
            for cidr in pn.spec.candidate_cidrs() {
                if let Err(e) = self.allocator.delete_prefix(&cidr).await {
                    if !e.is_not_found() {
                        return Err(e);
                    }
                }
            }

            let mut pn = pn.clone();
            remove_finalizer(&mut pn.metadata, PN_FINALIZER);
            self.cluster.update_private_network(&pn).await?;
        }

        Ok(())
    }

    async fn reconcile_node_for_private_network(
        &self,
        pn: &PrivateNetwork,
        node: &Node,
    ) -> Result<()> {
        let pn_name = pn.metadata.name.clone().unwrap_or_default();
        let node_name = node.metadata.name.clone().unwrap_or_default();

        let existing = self
            .cluster
            .list_network_interfaces_for_node(&node_name)
            .await?
            .into_iter()
            .filter(|nic| label_matches(&nic.metadata, PRIVATE_NETWORK_LABEL, &pn_name))
            .collect::<Vec<_>>();

        if existing.len() > 1 {
            return Err(RuntimeError::invariant_violation(format!(
                "node {} has {} NetworkInterfaces for private network {} instead of at most one",
                node_name,
                existing.len(),
                pn_name
            )));
        }

        if !existing.is_empty() {
            return Ok(());
        }

        let zone = pn.spec.zone.clone().unwrap_or_default();
        let server = self.cloud.get_server_from_node(node).await?;
        let private_nic = self
            .cloud
            .create_private_nic(&zone, &server.id, &pn.spec.id)
            .await?;

        let mut nic = self.construct_network_interface(pn, &node_name);
        nic.spec.id = Some(private_nic.id);

        let candidates = pn.spec.candidate_cidrs();
        let address = if (pn.spec.ipam.is_none() || pn.spec.is_static_ipam()) && !candidates.is_empty() {
            let owner_hint = format!("{}-{}", node_name, pn_name);
            Some(self.acquire_from_candidates(&candidates, &owner_hint).await?)
        } else {
            None
        };

        let mut created = self.cluster.create_network_interface(&nic).await?;
        created.status.mac_address = Some(private_nic.mac_address);
        if let Some((ip, cidr)) = &address {
            let prefix_len = cidr.split('/').nth(1).unwrap_or("32");
            created.status.address = Some(format!("{}/{}", ip, prefix_len));
            created.status.parent_cidr = Some(cidr.clone());
        }
        self.cluster.update_network_interface(&created).await?;

        info!(
            "Created NetworkInterface {} on node {} for private network {}",
            created.metadata.name.unwrap_or_default(),
            node_name,
            pn_name
        );

        Ok(())
    }

    /// Try each candidate CIDR in order, acquiring from the first one with a
    /// free address. Returns the acquired address together with the CIDR it
    /// came from, so callers can record `status.parentCIDR`.
    async fn acquire_from_candidates(&self, candidates: &[String], owner: &str) -> Result<(String, String)> {
        let mut last_err = None;
        for cidr in candidates {
            match self.allocator.acquire(cidr, owner).await {
                Ok(address) => return Ok((address, cidr.clone())),
                Err(e) => {
                    warn!("candidate CIDR {} exhausted or failed for {}: {}", cidr, owner, e);
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| RuntimeError::ipam_pool_exhausted(candidates.join(", "))))
    }

    fn construct_network_interface(&self, pn: &PrivateNetwork, node_name: &str) -> NetworkInterface {
        let pn_name = pn.metadata.name.clone().unwrap_or_default();

        let mut labels = pn.metadata.labels.clone().unwrap_or_default();
        labels.insert(PRIVATE_NETWORK_LABEL.to_string(), pn_name.clone());
        labels.insert(NODE_LABEL.to_string(), node_name.to_string());

        let mut metadata = ObjectMeta {
            name: Some(format!("{}-{}", pn_name, node_name)),
            labels: Some(labels),
            annotations: pn.metadata.annotations.clone(),
            owner_references: Some(vec![owner_reference(pn)]),
            ..Default::default()
        };
        add_finalizer(&mut metadata, NODE_FINALIZER);
        add_finalizer(&mut metadata, IP_FINALIZER);

        NetworkInterface {
            api_version: None,
            kind: None,
            metadata,
            spec: NetworkInterfaceSpec {
                id: None,
                node_name: node_name.to_string(),
                address: None,
            },
            status: Default::default(),
        }
    }

    /// Cluster-side half of NetworkInterface reconciliation: detects node
    /// deletion, detaches the cloud NIC, releases its IP, and clears finalizers.
    pub async fn reconcile_network_interface(&self, nic: &NetworkInterface) -> Result<()> {
        let nic_name = nic.metadata.name.clone().unwrap_or_default();
        let node = self.cluster.get_node(&nic.spec.node_name).await?;
        let node_deleted = node.is_none();

        if nic.metadata.deletion_timestamp.is_none() {
            if node_deleted {
                self.cluster.delete_network_interface(&nic_name).await?;
            }
            return Ok(());
        }

        if has_finalizer(&nic.metadata, NODE_FINALIZER) && node_deleted {
            let mut nic = nic.clone();
            remove_finalizer(&mut nic.metadata, NODE_FINALIZER);
            self.cluster.update_network_interface(&nic).await?;
        }

        if !has_finalizer(&nic.metadata, NODE_FINALIZER) && has_finalizer(&nic.metadata, IP_FINALIZER) {
            let owner_name = nic
                .metadata
                .owner_references
                .as_ref()
                .and_then(|refs| refs.first())
                .map(|r| r.name.clone())
                .ok_or_else(|| {
                    RuntimeError::invariant_violation(format!(
                        "NetworkInterface {} has no owner reference",
                        nic_name
                    ))
                })?;

            let pn = self
                .cluster
                .get_private_network(&owner_name)
                .await?
                .ok_or_else(|| RuntimeError::invariant_violation(format!(
                    "owning PrivateNetwork {} not found for NetworkInterface {}",
                    owner_name, nic_name
                )))?;

            let parent_cidr = nic.status.parent_cidr.as_deref().or_else(|| pn.spec.effective_cidr());
            if let (Some(cidr), Some(address)) = (parent_cidr, &nic.status.address) {
                let ip = address.split('/').next().unwrap_or(address);
                if let Err(e) = self.allocator.release(cidr, ip).await {
                    if !e.is_not_found() {
                        return Err(e);
                    }
                }
            }

            if let Some(node) = &node {
                let server = self.cloud.get_server_from_node(node).await?;
                if let Some(private_nic_id) = &nic.spec.id {
                    let zone = pn.spec.zone.clone().unwrap_or_default();
                    if let Err(e) = self
                        .cloud
                        .delete_private_nic(&zone, &server.id, private_nic_id)
                        .await
                    {
                        if !e.is_not_found() {
                            return Err(e);
                        }
                    }
                }
            }

            let mut nic = nic.clone();
            remove_finalizer(&mut nic.metadata, IP_FINALIZER);
            self.cluster.update_network_interface(&nic).await?;
        }

        Ok(())
    }
}

fn owner_reference(pn: &PrivateNetwork) -> k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference {
    k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference {
        api_version: "vpc.scaleway.com/v1alpha1".to_string(),
        kind: "PrivateNetwork".to_string(),
        name: pn.metadata.name.clone().unwrap_or_default(),
        uid: pn.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

fn has_finalizer(metadata: &ObjectMeta, finalizer: &str) -> bool {
    metadata
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|existing| existing == finalizer))
}

fn add_finalizer(metadata: &mut ObjectMeta, finalizer: &str) {
    let finalizers = metadata.finalizers.get_or_insert_with(Vec::new);
    if !finalizers.iter().any(|f| f == finalizer) {
        finalizers.push(finalizer.to_string());
    }
}

fn remove_finalizer(metadata: &mut ObjectMeta, finalizer: &str) {
    if let Some(finalizers) = metadata.finalizers.as_mut() {
        finalizers.retain(|f| f != finalizer);
    }
}

fn label_matches(metadata: &ObjectMeta, key: &str, value: &str) -> bool {
    metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(key))
        .map(|v| v == value)
        .unwrap_or(false)
}

#[allow(dead_code)]
fn deletion_time_now() -> Time {
    Time(chrono::Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::{MockCloudInventory, Server};
    use crate::cluster_client::MockClusterClient;
    use crate::ipam::store::IpamStore;

    fn pn_fixture(name: &str, cidr: &str) -> PrivateNetwork {
        PrivateNetwork {
            api_version: None,
            kind: None,
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: vpc_core::PrivateNetworkSpec {
                id: format!("pn-cloud-{}", name),
                cidr: Some(cidr.to_string()),
                ..Default::default()
            },
            status: Default::default(),
        }
    }

    fn node_fixture(name: &str) -> Node {
        Node {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn reconciler() -> (ClusterReconciler, Arc<MockClusterClient>, Arc<MockCloudInventory>) {
        let cluster = Arc::new(MockClusterClient::new());
        let cloud = Arc::new(MockCloudInventory::new());
        let store = Arc::new(IpamStore::new(cluster.clone(), "test-ipam"));
        let allocator = Arc::new(Allocator::new(store));
        let reconciler = ClusterReconciler::new(
            cluster.clone(),
            cloud.clone(),
            allocator,
            Duration::from_secs(30),
        );
        (reconciler, cluster, cloud)
    }

    #[tokio::test]
    async fn test_reconcile_private_network_adds_finalizer_and_creates_nic() {
        let (reconciler, cluster, cloud) = reconciler();
        cloud.seed_server(Server {
            id: "srv-1".to_string(),
            name: "node-1".to_string(),
            zone: "".to_string(),
            private_nics: vec![],
        });
        cluster.seed_node(node_fixture("node-1"));

        let pn = pn_fixture("my-pn", "10.0.0.0/24");
        reconciler.reconcile_private_network(&pn).await.unwrap();

        let updated = cluster.get_private_network("my-pn").await.unwrap().unwrap();
        assert!(has_finalizer(&updated.metadata, PN_FINALIZER));

        let nics = cluster.list_network_interfaces_for_pn("my-pn").await.unwrap();
        assert_eq!(nics.len(), 1);
        assert!(nics[0].status.address.is_some());
        assert!(nics[0].status.parent_cidr.is_some());
        assert!(nics[0].spec.address.is_none());
    }

    #[tokio::test]
    async fn test_reconcile_private_network_skips_existing_nic() {
        let (reconciler, cluster, cloud) = reconciler();
        cloud.seed_server(Server {
            id: "srv-1".to_string(),
            name: "node-1".to_string(),
            zone: "".to_string(),
            private_nics: vec![],
        });
        cluster.seed_node(node_fixture("node-1"));

        let pn = pn_fixture("my-pn", "10.0.0.0/24");
        reconciler.reconcile_private_network(&pn).await.unwrap();
        reconciler.reconcile_private_network(&pn).await.unwrap();

        let nics = cluster.list_network_interfaces_for_pn("my-pn").await.unwrap();
        assert_eq!(nics.len(), 1);
    }

    #[tokio::test]
    async fn test_teardown_deletes_nics_then_removes_finalizer() {
        let (reconciler, cluster, cloud) = reconciler();
        cloud.seed_server(Server {
            id: "srv-1".to_string(),
            name: "node-1".to_string(),
            zone: "".to_string(),
            private_nics: vec![],
        });
        cluster.seed_node(node_fixture("node-1"));

        let mut pn = pn_fixture("my-pn", "10.0.0.0/24");
        reconciler.reconcile_private_network(&pn).await.unwrap();
        pn = cluster.get_private_network("my-pn").await.unwrap().unwrap();

        pn.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
        reconciler.reconcile_private_network(&pn).await.unwrap();

        // NIC still has its own finalizers so it should be marked for deletion,
        // not removed yet, and the PrivateNetwork finalizer should remain.
        let pn_after = cluster.get_private_network("my-pn").await.unwrap().unwrap();
        assert!(has_finalizer(&pn_after.metadata, PN_FINALIZER));
    }

    #[tokio::test]
    async fn test_reconcile_network_interface_deletes_when_node_gone() {
        let (reconciler, cluster, cloud) = reconciler();
        cloud.seed_server(Server {
            id: "srv-1".to_string(),
            name: "node-1".to_string(),
            zone: "".to_string(),
            private_nics: vec![],
        });
        cluster.seed_node(node_fixture("node-1"));

        let pn = pn_fixture("my-pn", "10.0.0.0/24");
        reconciler.reconcile_private_network(&pn).await.unwrap();
        let nic = cluster
            .list_network_interfaces_for_pn("my-pn")
            .await
            .unwrap()
            .remove(0);

        // Node goes away entirely (not in the mock's node map)
        cluster.remove_node("node-1");
        let nic_name = nic.metadata.name.clone().unwrap();
        reconciler.reconcile_network_interface(&nic).await.unwrap();

        let after = cluster.get_network_interface(&nic_name).await.unwrap().unwrap();
        assert!(after.metadata.deletion_timestamp.is_some());
    }

    #[tokio::test]
    async fn test_reconcile_does_not_repair_crashed_mid_allocation_nic() {
        // Simulates a crash after create_network_interface() but before the
        // mac_address status patch landed: a NIC for (pn, node) already
        // exists with no observed MAC or address. Re-reconciling must not
        // create a second NIC or attempt a second cloud-side attach.
        let (reconciler, cluster, cloud) = reconciler();
        cloud.seed_server(Server {
            id: "srv-1".to_string(),
            name: "node-1".to_string(),
            zone: "".to_string(),
            private_nics: vec![],
        });
        cluster.seed_node(node_fixture("node-1"));

        let pn = pn_fixture("my-pn", "10.0.0.0/24");
        let mut orphan = NetworkInterface {
            api_version: None,
            kind: None,
            metadata: ObjectMeta {
                name: Some("my-pn-node-1".to_string()),
                labels: Some(
                    [
                        (PRIVATE_NETWORK_LABEL.to_string(), "my-pn".to_string()),
                        (NODE_LABEL.to_string(), "node-1".to_string()),
                    ]
                    .into_iter()
                    .collect(),
                ),
                ..Default::default()
            },
            spec: NetworkInterfaceSpec::default(),
            status: Default::default(),
        };
        add_finalizer(&mut orphan.metadata, NODE_FINALIZER);
        add_finalizer(&mut orphan.metadata, IP_FINALIZER);
        cluster.create_network_interface(&orphan).await.unwrap();

        reconciler.reconcile_private_network(&pn).await.unwrap();

        let nics = cluster.list_network_interfaces_for_pn("my-pn").await.unwrap();
        assert_eq!(nics.len(), 1, "crashed allocation must not be duplicated");
        assert!(nics[0].status.mac_address.is_none());
        assert!(cloud.get_server("", "srv-1").await.unwrap().private_nics.is_empty());
    }

    #[tokio::test]
    async fn test_node_deletion_releases_ip_and_detaches_cloud_nic() {
        let (reconciler, cluster, cloud) = reconciler();
        cloud.seed_server(Server {
            id: "srv-1".to_string(),
            name: "node-1".to_string(),
            zone: "".to_string(),
            private_nics: vec![],
        });
        cluster.seed_node(node_fixture("node-1"));

        let pn = pn_fixture("my-pn", "10.0.0.0/24");
        reconciler.reconcile_private_network(&pn).await.unwrap();
        let original_nic = cluster.list_network_interfaces_for_pn("my-pn").await.unwrap().remove(0);
        let nic_name = original_nic.metadata.name.clone().unwrap();
        let original_address = original_nic
            .status
            .address
            .unwrap()
            .split('/')
            .next()
            .unwrap()
            .to_string();
        assert_eq!(
            cloud.get_server("", "srv-1").await.unwrap().private_nics.len(),
            1,
            "cloud NIC should be attached after creation"
        );

        // Node is removed from the cluster entirely.
        cluster.remove_node("node-1");

        // First pass: node_deleted and not yet marked for deletion -> deletes
        // (sets deletion_timestamp, since both finalizers are still present).
        let nic = cluster.get_network_interface(&nic_name).await.unwrap().unwrap();
        reconciler.reconcile_network_interface(&nic).await.unwrap();
        let nic = cluster.get_network_interface(&nic_name).await.unwrap().unwrap();
        assert!(nic.metadata.deletion_timestamp.is_some());
        assert!(has_finalizer(&nic.metadata, NODE_FINALIZER));

        // Second pass: NODE_FINALIZER removed as a fallback since the node is gone.
        reconciler.reconcile_network_interface(&nic).await.unwrap();
        let nic = cluster.get_network_interface(&nic_name).await.unwrap().unwrap();
        assert!(!has_finalizer(&nic.metadata, NODE_FINALIZER));
        assert!(has_finalizer(&nic.metadata, IP_FINALIZER));

        // Third pass: IP is released and the object is fully removed (the
        // node is gone, so cloud detach is skipped per design).
        reconciler.reconcile_network_interface(&nic).await.unwrap();
        assert!(cluster.get_network_interface(&nic_name).await.unwrap().is_none());

        let store = IpamStore::new(cluster.clone(), "test-ipam");
        let allocator = Allocator::new(Arc::new(store));
        let reacquired = allocator.acquire("10.0.0.0/24", "node-2-my-pn").await.unwrap();
        assert_eq!(reacquired, original_address, "released address must be available again");
    }
}
