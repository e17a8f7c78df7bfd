use async_trait::async_trait;

/// Cross-process mutual exclusion for the cluster reconciler.
///
/// A real implementation would coordinate via a lease object in the cluster
/// store; that coordination protocol is out of scope here. [`StandaloneLeader`]
/// always reports leadership, matching a single-controller-replica deployment.
#[async_trait]
pub trait LeaderElector: Send + Sync {
    /// True if this process currently holds the lease.
    async fn is_leader(&self) -> bool;
}

/// Always-leader stub for single-replica deployments and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandaloneLeader;

#[async_trait]
impl LeaderElector for StandaloneLeader {
    async fn is_leader(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_standalone_leader_always_true() {
        let elector = StandaloneLeader;
        assert!(elector.is_leader().await);
    }
}
