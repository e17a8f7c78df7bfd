use crate::cluster_client::ClusterClient;
use crate::constants::NODE_FINALIZER;
use crate::error::Result;
use crate::link::{LinkEffector, LinkRoute};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use vpc_core::{IpamType, NetworkInterface, PrivateNetwork};

/// Reconciles the node-local half of a NetworkInterface: kernel link state,
/// routes, and masquerade rule. Runs on every node, filtered to the NICs
/// assigned to it.
///
/// Its counterpart, [`crate::cluster_controller::ClusterReconciler`], owns
/// object creation/deletion and the cloud-side attach/detach.
pub struct NodeReconciler {
    cluster: Arc<dyn ClusterClient>,
    link: Arc<dyn LinkEffector>,
    node_name: String,
    reconcile_interval: Duration,
}

impl NodeReconciler {
    pub fn new(
        cluster: Arc<dyn ClusterClient>,
        link: Arc<dyn LinkEffector>,
        node_name: impl Into<String>,
        reconcile_interval: Duration,
    ) -> Self {
        Self {
            cluster,
            link,
            node_name: node_name.into(),
            reconcile_interval,
        }
    }

    pub async fn run(&self, token: CancellationToken) -> Result<()> {
        info!("Starting node reconciler for node {}", self.node_name);

        if let Err(e) = self.reconcile_all().await {
            error!("Initial node reconcile failed: {}", e);
        }

        let mut tick = tokio::time::interval(self.reconcile_interval);
        tick.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("Node reconciler shutting down");
                    return Ok(());
                }
                _ = tick.tick() => {
                    debug!("Periodic node reconcile tick");
                    if let Err(e) = self.reconcile_all().await {
                        error!("Node reconcile cycle failed: {}", e);
                    }
                }
            }
        }
    }

    async fn reconcile_all(&self) -> Result<()> {
        let nics = self
            .cluster
            .list_network_interfaces_for_node(&self.node_name)
            .await?;

        for nic in nics {
            let name = nic.metadata.name.clone().unwrap_or_default();
            if let Err(e) = self.reconcile_network_interface(&nic).await {
                error!("Failed to reconcile NetworkInterface {} (node side): {}", name, e);
            }
        }

        Ok(())
    }

    /// Drive the node-local state of a single NetworkInterface owned by this node.
    pub async fn reconcile_network_interface(&self, nic: &NetworkInterface) -> Result<()> {
        let nic_name = nic.metadata.name.clone().unwrap_or_default();

        let Some(mac) = nic.status.mac_address.as_deref() else {
            debug!(
                "NetworkInterface {} has no MAC address yet, waiting",
                nic_name
            );
            return Ok(());
        };

        let owner_name = nic
            .metadata
            .owner_references
            .as_ref()
            .and_then(|refs| refs.first())
            .map(|r| r.name.clone());

        let pn = match &owner_name {
            Some(name) => self.cluster.get_private_network(name).await?,
            None => None,
        };

        if nic.metadata.deletion_timestamp.is_some() {
            return self.teardown(nic, mac, pn.as_ref()).await;
        }

        let Some(pn) = pn else {
            warn!(
                "NetworkInterface {} has no resolvable owning PrivateNetwork, skipping",
                nic_name
            );
            return Ok(());
        };

        self.configure(nic, mac, &pn).await
    }

    async fn configure(&self, nic: &NetworkInterface, mac: &str, pn: &PrivateNetwork) -> Result<()> {
        let nic_name = nic.metadata.name.clone().unwrap_or_default();

        let link_name = self.link.get_link_name(mac).await?;
        if nic.status.link_name.as_deref() != Some(link_name.as_str()) {
            let mut updated = nic.clone();
            updated.status.link_name = Some(link_name.clone());
            self.cluster.update_network_interface(&updated).await?;
        }

        let address = if is_static(pn) {
            let Some(cidr) = pn.spec.effective_cidr() else {
                warn!(
                    "NetworkInterface {} is static but owning PrivateNetwork has no CIDR",
                    nic_name
                );
                return Ok(());
            };
            // Status.address is the allocator-assigned IP; spec.address is the
            // deprecated legacy path. Either way the effector call is idempotent,
            // so this reconfigures the link every pass rather than only once.
            let ip = match nic.status.address.as_deref().or(nic.spec.address.as_deref()) {
                Some(addr) => addr.split('/').next().unwrap_or(addr).to_string(),
                None => {
                    warn!(
                        "NetworkInterface {} has no allocated address yet",
                        nic_name
                    );
                    return Ok(());
                }
            };
            let prefix_len = cidr.split('/').nth(1).unwrap_or("32");
            let full = format!("{}/{}", ip, prefix_len);
            self.link.configure_static(mac, &full).await?;

            if nic.status.address.as_deref() != Some(full.as_str()) {
                let mut updated = nic.clone();
                updated.status.address = Some(full.clone());
                updated.status.parent_cidr = Some(cidr.to_string());
                self.cluster.update_network_interface(&updated).await?;
            }
            full
        } else {
            match &nic.status.address {
                Some(addr) => addr.clone(),
                None => {
                    let lease = self.link.configure_dhcp(mac).await?;
                    let mut updated = nic.clone();
                    updated.status.address = Some(lease.clone());
                    self.cluster.update_network_interface(&updated).await?;
                    lease
                }
            }
        };
        debug!(
            "NetworkInterface {} configured with address {}",
            nic_name, address
        );

        self.link.sync_masquerade(mac, pn.spec.masquerade).await?;

        let routes: Vec<LinkRoute> = pn
            .spec
            .routes
            .iter()
            .map(|r| LinkRoute {
                to: r.to.clone(),
                via: r.via.clone(),
            })
            .collect();
        self.link.sync_routes(mac, &routes).await?;

        Ok(())
    }

    async fn teardown(
        &self,
        nic: &NetworkInterface,
        mac: &str,
        pn: Option<&PrivateNetwork>,
    ) -> Result<()> {
        if !has_finalizer(nic, NODE_FINALIZER) {
            return Ok(());
        }

        let static_mode = pn.map(is_static).unwrap_or(true);
        if static_mode {
            if let Some(address) = &nic.status.address {
                self.link.tear_down_static(mac, address).await?;
            }
        } else {
            self.link.tear_down_dhcp(mac).await?;
        }

        let mut updated = nic.clone();
        if let Some(finalizers) = updated.metadata.finalizers.as_mut() {
            finalizers.retain(|f| f != NODE_FINALIZER);
        }
        self.cluster.update_network_interface(&updated).await?;

        Ok(())
    }
}

fn is_static(pn: &PrivateNetwork) -> bool {
    pn.spec
        .ipam
        .as_ref()
        .map(|ipam| ipam.type_ == IpamType::Static)
        .unwrap_or(true)
}

fn has_finalizer(nic: &NetworkInterface, finalizer: &str) -> bool {
    nic.metadata
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|existing| existing == finalizer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster_client::MockClusterClient;
    use crate::link::MockLinkEffector;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference, Time};
    use vpc_core::{
        NetworkInterfaceSpec, NetworkInterfaceStatus, PrivateNetworkIpam, PrivateNetworkIpamStatic,
        PrivateNetworkSpec, PrivateNetworkStatus,
    };

    fn pn_fixture(name: &str, ipam_type: IpamType, cidr: &str) -> PrivateNetwork {
        PrivateNetwork {
            api_version: None,
            kind: None,
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: PrivateNetworkSpec {
                id: format!("pn-cloud-{}", name),
                ipam: Some(PrivateNetworkIpam {
                    type_: ipam_type,
                    static_: Some(PrivateNetworkIpamStatic {
                        cidr: cidr.to_string(),
                        available_ranges: vec![],
                    }),
                }),
                ..Default::default()
            },
            status: PrivateNetworkStatus::default(),
        }
    }

    fn nic_fixture(name: &str, owner: &str, mac: &str) -> NetworkInterface {
        NetworkInterface {
            api_version: None,
            kind: None,
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                owner_references: Some(vec![OwnerReference {
                    api_version: "vpc.scaleway.com/v1alpha1".to_string(),
                    kind: "PrivateNetwork".to_string(),
                    name: owner.to_string(),
                    uid: String::new(),
                    controller: Some(true),
                    block_owner_deletion: Some(true),
                }]),
                finalizers: Some(vec![NODE_FINALIZER.to_string()]),
                ..Default::default()
            },
            spec: NetworkInterfaceSpec {
                id: None,
                node_name: "node-1".to_string(),
                address: Some("10.0.0.2/24".to_string()),
            },
            status: NetworkInterfaceStatus {
                mac_address: Some(mac.to_string()),
                ..Default::default()
            },
        }
    }

    fn reconciler() -> (NodeReconciler, Arc<MockClusterClient>, Arc<MockLinkEffector>) {
        let cluster = Arc::new(MockClusterClient::new());
        let link = Arc::new(MockLinkEffector::new());
        let reconciler = NodeReconciler::new(
            cluster.clone(),
            link.clone(),
            "node-1",
            Duration::from_secs(10),
        );
        (reconciler, cluster, link)
    }

    #[tokio::test]
    async fn test_configure_static_assigns_address_and_link_name() {
        let (reconciler, cluster, link) = reconciler();
        let pn = pn_fixture("my-pn", IpamType::Static, "10.0.0.0/24");
        cluster.seed_private_network(pn);
        link.register("aa:bb:cc:00:00:01", "eth1").await;

        let nic = nic_fixture("my-pn-node-1", "my-pn", "aa:bb:cc:00:00:01");
        cluster.create_network_interface(&nic).await.unwrap();

        reconciler.reconcile_network_interface(&nic).await.unwrap();

        assert!(link.is_up("aa:bb:cc:00:00:01").await);
        let updated = cluster
            .get_network_interface("my-pn-node-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.status.link_name.as_deref(), Some("eth1"));
        assert_eq!(updated.status.address.as_deref(), Some("10.0.0.2/24"));
    }

    #[tokio::test]
    async fn test_configure_dhcp_records_lease() {
        let (reconciler, cluster, link) = reconciler();
        let pn = pn_fixture("my-pn", IpamType::Dhcp, "10.0.0.0/24");
        cluster.seed_private_network(pn);
        link.register("aa:bb:cc:00:00:02", "eth2").await;
        link.queue_dhcp_lease("aa:bb:cc:00:00:02", vec!["10.0.0.50/24".to_string()])
            .await;

        let mut nic = nic_fixture("my-pn-node-1", "my-pn", "aa:bb:cc:00:00:02");
        nic.spec.address = None;
        cluster.create_network_interface(&nic).await.unwrap();

        reconciler.reconcile_network_interface(&nic).await.unwrap();

        let updated = cluster
            .get_network_interface("my-pn-node-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.status.address.as_deref(), Some("10.0.0.50/24"));
    }

    #[tokio::test]
    async fn test_teardown_static_removes_address_and_node_finalizer() {
        let (reconciler, cluster, link) = reconciler();
        let pn = pn_fixture("my-pn", IpamType::Static, "10.0.0.0/24");
        cluster.seed_private_network(pn);
        link.register("aa:bb:cc:00:00:03", "eth3").await;
        link.configure_static("aa:bb:cc:00:00:03", "10.0.0.2/24")
            .await
            .unwrap();

        let mut nic = nic_fixture("my-pn-node-1", "my-pn", "aa:bb:cc:00:00:03");
        nic.status.address = Some("10.0.0.2/24".to_string());
        nic.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
        cluster.create_network_interface(&nic).await.unwrap();

        reconciler.reconcile_network_interface(&nic).await.unwrap();

        assert!(!link.is_up("aa:bb:cc:00:00:03").await);
        let updated = cluster
            .get_network_interface("my-pn-node-1")
            .await
            .unwrap()
            .unwrap();
        assert!(!has_finalizer(&updated, NODE_FINALIZER));
    }

    #[tokio::test]
    async fn test_waits_for_mac_address() {
        let (reconciler, cluster, _link) = reconciler();
        let pn = pn_fixture("my-pn", IpamType::Static, "10.0.0.0/24");
        cluster.seed_private_network(pn);

        let mut nic = nic_fixture("my-pn-node-1", "my-pn", "aa:bb:cc:00:00:04");
        nic.status.mac_address = None;
        cluster.create_network_interface(&nic).await.unwrap();

        reconciler.reconcile_network_interface(&nic).await.unwrap();

        let unchanged = cluster
            .get_network_interface("my-pn-node-1")
            .await
            .unwrap()
            .unwrap();
        assert!(unchanged.status.link_name.is_none());
    }

    #[tokio::test]
    async fn test_syncs_masquerade_and_routes() {
        let (reconciler, cluster, link) = reconciler();
        let mut pn = pn_fixture("my-pn", IpamType::Static, "10.0.0.0/24");
        pn.spec.masquerade = true;
        pn.spec.routes = vec![vpc_core::PrivateNetworkRoute {
            to: "10.1.0.0/24".to_string(),
            via: "10.0.0.1".to_string(),
        }];
        cluster.seed_private_network(pn);
        link.register("aa:bb:cc:00:00:05", "eth5").await;

        let nic = nic_fixture("my-pn-node-1", "my-pn", "aa:bb:cc:00:00:05");
        cluster.create_network_interface(&nic).await.unwrap();

        reconciler.reconcile_network_interface(&nic).await.unwrap();

        assert!(link.masquerade_enabled("aa:bb:cc:00:00:05").await);
        assert_eq!(link.routes("aa:bb:cc:00:00:05").await.len(), 1);
    }
}
