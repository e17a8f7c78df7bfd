//! Well-known finalizer tokens and label keys shared by both reconcilers.

/// Finalizer blocking NetworkInterface deletion until the node-side link has
/// been torn down.
pub const NODE_FINALIZER: &str = "vpc.scaleway.com/finalizer-node";

/// Finalizer blocking NetworkInterface deletion until its allocated address
/// has been released back to the IPAM store.
pub const IP_FINALIZER: &str = "vpc.scaleway.com/finalizer-ip";

/// Finalizer blocking PrivateNetwork deletion until all of its NetworkInterfaces
/// have been torn down.
pub const PN_FINALIZER: &str = "vpc.scaleway.com/finalizer";

/// Label carrying the owning PrivateNetwork's name.
pub const PRIVATE_NETWORK_LABEL: &str = "private-network";

/// Label carrying the owning Node's name.
pub const NODE_LABEL: &str = "node";
