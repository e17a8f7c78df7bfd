use super::{LinkEffector, LinkRoute};
use crate::error::{Result, RuntimeError};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default)]
struct MockLink {
    name: String,
    static_addr: Option<String>,
    dhcp_addr: Option<String>,
    up: bool,
    routes: Vec<LinkRoute>,
    masquerade: bool,
}

/// In-memory [`LinkEffector`] for tests. Maintains a mac-addressed link
/// registry and simulates state transitions instead of touching the kernel.
pub struct MockLinkEffector {
    links: RwLock<HashMap<String, MockLink>>,
    /// Addresses returned by successive `configure_dhcp` calls, consumed in order.
    dhcp_leases: RwLock<HashMap<String, Vec<String>>>,
}

impl MockLinkEffector {
    pub fn new() -> Self {
        Self {
            links: RwLock::new(HashMap::new()),
            dhcp_leases: RwLock::new(HashMap::new()),
        }
    }

    /// Register a link name for a MAC so it resolves in tests.
    pub async fn register(&self, mac: &str, link_name: &str) {
        self.links.write().await.insert(
            mac.to_string(),
            MockLink {
                name: link_name.to_string(),
                ..Default::default()
            },
        );
    }

    /// Queue the address(es) the next `configure_dhcp` call for `mac` will observe.
    pub async fn queue_dhcp_lease(&self, mac: &str, addresses: Vec<String>) {
        self.dhcp_leases
            .write()
            .await
            .insert(mac.to_string(), addresses);
    }

    pub async fn is_up(&self, mac: &str) -> bool {
        self.links
            .read()
            .await
            .get(mac)
            .map(|l| l.up)
            .unwrap_or(false)
    }

    pub async fn masquerade_enabled(&self, mac: &str) -> bool {
        self.links
            .read()
            .await
            .get(mac)
            .map(|l| l.masquerade)
            .unwrap_or(false)
    }

    pub async fn routes(&self, mac: &str) -> Vec<LinkRoute> {
        self.links
            .read()
            .await
            .get(mac)
            .map(|l| l.routes.clone())
            .unwrap_or_default()
    }
}

impl Default for MockLinkEffector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LinkEffector for MockLinkEffector {
    async fn get_link_name(&self, mac: &str) -> Result<String> {
        self.links
            .read()
            .await
            .get(mac)
            .map(|l| l.name.clone())
            .ok_or_else(|| RuntimeError::nic_not_found(mac))
    }

    async fn configure_static(&self, mac: &str, address_cidr: &str) -> Result<()> {
        let mut links = self.links.write().await;
        let link = links
            .get_mut(mac)
            .ok_or_else(|| RuntimeError::nic_not_found(mac))?;
        link.static_addr = Some(address_cidr.to_string());
        link.up = true;
        Ok(())
    }

    async fn configure_dhcp(&self, mac: &str) -> Result<String> {
        if !self.links.read().await.contains_key(mac) {
            return Err(RuntimeError::nic_not_found(mac));
        }

        let addresses = self
            .dhcp_leases
            .write()
            .await
            .remove(mac)
            .unwrap_or_default();

        if addresses.len() != 1 {
            return Err(RuntimeError::dhcp_lease_failed(mac, addresses.len()));
        }

        let mut links = self.links.write().await;
        let link = links.get_mut(mac).unwrap();
        link.dhcp_addr = Some(addresses[0].clone());
        link.up = true;
        Ok(addresses[0].clone())
    }

    async fn tear_down_static(&self, mac: &str, _address_cidr: &str) -> Result<()> {
        let mut links = self.links.write().await;
        if let Some(link) = links.get_mut(mac) {
            link.static_addr = None;
            link.up = false;
        }
        Ok(())
    }

    async fn tear_down_dhcp(&self, mac: &str) -> Result<()> {
        let mut links = self.links.write().await;
        if let Some(link) = links.get_mut(mac) {
            link.dhcp_addr = None;
            link.up = false;
        }
        Ok(())
    }

    async fn sync_routes(&self, mac: &str, routes: &[LinkRoute]) -> Result<()> {
        let mut links = self.links.write().await;
        let link = links
            .get_mut(mac)
            .ok_or_else(|| RuntimeError::nic_not_found(mac))?;
        link.routes = routes.to_vec();
        Ok(())
    }

    async fn sync_masquerade(&self, mac: &str, enabled: bool) -> Result<()> {
        let mut links = self.links.write().await;
        let link = links
            .get_mut(mac)
            .ok_or_else(|| RuntimeError::nic_not_found(mac))?;
        link.masquerade = enabled;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_configure_static_then_teardown() {
        let effector = MockLinkEffector::new();
        effector.register("aa:bb:cc:dd:ee:ff", "eth1").await;

        effector
            .configure_static("aa:bb:cc:dd:ee:ff", "10.0.0.5/24")
            .await
            .unwrap();
        assert!(effector.is_up("aa:bb:cc:dd:ee:ff").await);

        effector
            .tear_down_static("aa:bb:cc:dd:ee:ff", "10.0.0.5/24")
            .await
            .unwrap();
        assert!(!effector.is_up("aa:bb:cc:dd:ee:ff").await);
    }

    #[tokio::test]
    async fn test_configure_dhcp_requires_exactly_one_lease() {
        let effector = MockLinkEffector::new();
        effector.register("aa:bb:cc:dd:ee:ff", "eth1").await;

        effector
            .queue_dhcp_lease("aa:bb:cc:dd:ee:ff", vec![])
            .await;
        let result = effector.configure_dhcp("aa:bb:cc:dd:ee:ff").await;
        assert!(result.is_err());

        effector
            .queue_dhcp_lease(
                "aa:bb:cc:dd:ee:ff",
                vec!["10.0.0.7/24".to_string()],
            )
            .await;
        let result = effector.configure_dhcp("aa:bb:cc:dd:ee:ff").await;
        assert_eq!(result.unwrap(), "10.0.0.7/24");
    }

    #[tokio::test]
    async fn test_teardown_on_unregistered_mac_is_idempotent() {
        let effector = MockLinkEffector::new();
        effector
            .tear_down_static("00:00:00:00:00:00", "10.0.0.5/24")
            .await
            .unwrap();
        effector.tear_down_dhcp("00:00:00:00:00:00").await.unwrap();
    }

    #[tokio::test]
    async fn test_unregistered_mac_is_not_found() {
        let effector = MockLinkEffector::new();
        let result = effector.get_link_name("00:00:00:00:00:00").await;
        assert!(matches!(result, Err(e) if e.is_not_found()));
    }

    #[tokio::test]
    async fn test_sync_masquerade_toggles() {
        let effector = MockLinkEffector::new();
        effector.register("aa:bb:cc:dd:ee:ff", "eth1").await;

        effector
            .sync_masquerade("aa:bb:cc:dd:ee:ff", true)
            .await
            .unwrap();
        assert!(effector.masquerade_enabled("aa:bb:cc:dd:ee:ff").await);

        effector
            .sync_masquerade("aa:bb:cc:dd:ee:ff", false)
            .await
            .unwrap();
        assert!(!effector.masquerade_enabled("aa:bb:cc:dd:ee:ff").await);
    }

    #[tokio::test]
    async fn test_sync_routes_replaces_route_set() {
        let effector = MockLinkEffector::new();
        effector.register("aa:bb:cc:dd:ee:ff", "eth1").await;

        let routes = vec![LinkRoute {
            to: "10.1.0.0/24".to_string(),
            via: "10.0.0.1".to_string(),
        }];
        effector
            .sync_routes("aa:bb:cc:dd:ee:ff", &routes)
            .await
            .unwrap();
        assert_eq!(effector.routes("aa:bb:cc:dd:ee:ff").await, routes);
    }
}
