mod linux;
mod mock;

pub use mock::MockLinkEffector;

#[cfg(target_os = "linux")]
pub use linux::LinuxLinkEffector;

use crate::error::Result;
use async_trait::async_trait;

/// A route to install on a node-local link: destination CIDR via a gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRoute {
    pub to: String,
    pub via: String,
}

/// Drives the node-local kernel state (links, addresses, routes, masquerade
/// rules) that makes a cloud-attached secondary NIC usable by the node.
///
/// Every method is idempotent: callers invoke these on every reconcile and
/// expect a no-op when the desired state is already in place.
#[async_trait]
pub trait LinkEffector: Send + Sync {
    /// Resolve the kernel link name (e.g. `eth1`) carrying the given MAC address.
    async fn get_link_name(&self, mac: &str) -> Result<String>;

    /// Assign a static address to the link carrying `mac`, bring it up.
    async fn configure_static(&self, mac: &str, address_cidr: &str) -> Result<()>;

    /// Run a DHCP client against the link carrying `mac`, returning the single
    /// leased address in CIDR notation. Errors if the lease produced zero or
    /// more than one address.
    async fn configure_dhcp(&self, mac: &str) -> Result<String>;

    /// Remove a previously configured static address and bring the link down.
    async fn tear_down_static(&self, mac: &str, address_cidr: &str) -> Result<()>;

    /// Release a DHCP lease on the link carrying `mac` and bring it down.
    async fn tear_down_dhcp(&self, mac: &str) -> Result<()>;

    /// Reconcile the link's routing table to exactly the given desired routes,
    /// leaving routes with a non-empty source address untouched (those belong
    /// to the kernel/other subsystems, not to this controller).
    async fn sync_routes(&self, mac: &str, routes: &[LinkRoute]) -> Result<()>;

    /// Enable or disable masquerading (SNAT) for traffic leaving this link.
    async fn sync_masquerade(&self, mac: &str, enabled: bool) -> Result<()>;
}
