use super::cidr::{next_ip, parse_cidr, CidrConfig};
use super::store::IpamStore;
use crate::error::Result;
use std::sync::Arc;

/// Hands out and reclaims addresses from a CIDR, backed by the shared
/// cluster-store [`IpamStore`]. Thin façade combining CIDR bit-math with the
/// store's allocation bookkeeping, mirroring the original `Ipam`'s
/// acquire/release shape against a ConfigMap.
pub struct Allocator {
    store: Arc<IpamStore>,
}

impl Allocator {
    pub fn new(store: Arc<IpamStore>) -> Self {
        Self { store }
    }

    /// Allocate the next free address in `cidr`, recording it as owned by
    /// `owner` (typically a NetworkInterface name). Ensures the prefix
    /// exists first. These ranges have no reserved network/broadcast/gateway
    /// address — every address in the CIDR is eligible.
    pub async fn acquire(&self, cidr: &str, owner: &str) -> Result<String> {
        let config = parse_cidr(cidr)?;
        let prefix = self.store.create_prefix(cidr).await?;

        let mut candidate = config.first_host;
        loop {
            if !config.contains(candidate) {
                return Err(crate::error::RuntimeError::ipam_pool_exhausted(cidr));
            }

            if !prefix.allocated.contains_key(&candidate.to_string()) {
                self.store
                    .mark_allocated(cidr, &candidate.to_string(), owner)
                    .await?;
                return Ok(candidate.to_string());
            }

            candidate = next_ip(candidate);
        }
    }

    /// Release a previously acquired address. Idempotent: releasing an
    /// address that isn't currently allocated is not an error.
    pub async fn release(&self, cidr: &str, address: &str) -> Result<()> {
        self.store.mark_released(cidr, address).await
    }

    /// Remove the prefix blob for `cidr` entirely. Idempotent: absence is
    /// not an error.
    pub async fn delete_prefix(&self, cidr: &str) -> Result<()> {
        self.store.delete_prefix(cidr).await
    }

    /// Parse and validate a CIDR without touching the store.
    pub fn parse(&self, cidr: &str) -> Result<CidrConfig> {
        parse_cidr(cidr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster_client::MockClusterClient;

    fn allocator() -> Allocator {
        let store = Arc::new(IpamStore::new(Arc::new(MockClusterClient::new()), "test-ipam"));
        Allocator::new(store)
    }

    #[tokio::test]
    async fn test_acquire_starts_at_network_address() {
        let allocator = allocator();
        let addr = allocator.acquire("10.0.0.0/30", "nic-1").await.unwrap();
        assert_eq!(addr, "10.0.0.0");
    }

    #[tokio::test]
    async fn test_acquire_distinct_addresses() {
        let allocator = allocator();
        let a = allocator.acquire("10.0.0.0/29", "nic-1").await.unwrap();
        let b = allocator.acquire("10.0.0.0/29", "nic-2").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_acquire_exhausted_pool() {
        let allocator = allocator();
        // /30 has exactly 4 allocatable addresses (no reserved network/broadcast).
        for _ in 0..4 {
            allocator.acquire("10.0.0.0/30", "nic").await.unwrap();
        }
        let result = allocator.acquire("10.0.0.0/30", "nic-5").await;
        assert!(result.is_err());
    }

    /// Literal S2: a /28 restriction yields exactly 16 successful acquisitions
    /// before the pool is exhausted.
    #[tokio::test]
    async fn test_acquire_slash28_yields_sixteen_then_fails() {
        let allocator = allocator();
        let mut addresses = Vec::new();
        for i in 0..16 {
            addresses.push(
                allocator
                    .acquire("10.0.0.16/28", &format!("nic-{}", i))
                    .await
                    .unwrap(),
            );
        }
        assert_eq!(addresses.len(), 16);
        assert!(addresses.iter().all(|a| a.starts_with("10.0.0.")));

        let result = allocator.acquire("10.0.0.16/28", "nic-17").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_release_then_reacquire() {
        let allocator = allocator();
        let addr = allocator.acquire("10.0.0.0/30", "nic-1").await.unwrap();
        allocator.release("10.0.0.0/30", &addr).await.unwrap();
        let reacquired = allocator.acquire("10.0.0.0/30", "nic-2").await.unwrap();
        assert_eq!(addr, reacquired);
    }

    #[tokio::test]
    async fn test_release_unallocated_is_ok() {
        let allocator = allocator();
        allocator.release("10.0.0.0/24", "10.0.0.99").await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_prefix_removes_blob() {
        let allocator = allocator();
        allocator.acquire("10.0.0.0/30", "nic-1").await.unwrap();
        allocator.delete_prefix("10.0.0.0/30").await.unwrap();

        // Re-acquiring starts from a fresh prefix, so the same first address comes back.
        let addr = allocator.acquire("10.0.0.0/30", "nic-2").await.unwrap();
        assert_eq!(addr, "10.0.0.0");
    }

    #[tokio::test]
    async fn test_delete_prefix_absent_is_ok() {
        let allocator = allocator();
        allocator.delete_prefix("10.0.0.0/24").await.unwrap();
    }
}
