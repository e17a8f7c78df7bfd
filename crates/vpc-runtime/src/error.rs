use miette::Diagnostic;
use thiserror::Error;

/// Runtime error type for link, IPAM, cloud-inventory, and reconciler operations
#[derive(Error, Debug, Diagnostic)]
pub enum RuntimeError {
    /// No kernel link carries the given MAC address
    #[error("No link found with MAC address {mac}")]
    #[diagnostic(
        code(vpc::runtime::nic_not_found),
        help("The interface may not have been hot-plugged yet; the link cache is invalidated on every miss")
    )]
    NicNotFound {
        #[allow(unused)]
        mac: String,
    },

    /// A NIC's MAC address was not reported among the node's private NICs
    #[error("MAC address {mac} not found among this node's private NICs")]
    #[diagnostic(
        code(vpc::runtime::mac_not_on_node),
        help("The cloud-side attach may not have settled yet; this condition is treated as transient")
    )]
    MacNotOnNode {
        #[allow(unused)]
        mac: String,
    },

    /// A DHCP client lease attempt produced zero or more than one address
    #[error("DHCP lease on {link_name} produced {address_count} addresses, expected exactly 1")]
    #[diagnostic(
        code(vpc::runtime::dhcp_lease_failed),
        help("Check the DHCP server reachability on this link and retry")
    )]
    DhcpLeaseFailed {
        #[allow(unused)]
        link_name: String,
        #[allow(unused)]
        address_count: usize,
    },

    /// Command execution failed
    #[error("Command '{command}' failed with exit code {exit_code}")]
    #[diagnostic(code(vpc::runtime::command_failed), help("stderr: {stderr}"))]
    CommandFailed {
        #[allow(unused)]
        command: String,
        #[allow(unused)]
        exit_code: i32,
        #[allow(unused)]
        stderr: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    #[diagnostic(code(vpc::runtime::invalid_config), help("{suggestion}"))]
    InvalidConfig {
        #[allow(unused)]
        message: String,
        #[allow(unused)]
        suggestion: String,
    },

    /// Unsupported platform
    #[error("Operation not supported on this platform")]
    #[diagnostic(
        code(vpc::runtime::unsupported_platform),
        help("This operation requires Linux. Use MockLinkEffector for testing on other platforms")
    )]
    UnsupportedPlatform,

    /// Core library error
    #[error(transparent)]
    #[diagnostic(transparent)]
    CoreError(#[from] vpc_core::CoreError),

    /// IPAM prefix not found
    #[error("IPAM prefix not found: {cidr}")]
    #[diagnostic(
        code(vpc::runtime::prefix_not_found),
        help("Call CreatePrefix before reading, updating, or allocating against this CIDR")
    )]
    PrefixNotFound {
        #[allow(unused)]
        cidr: String,
    },

    /// IPAM pool exhausted
    #[error("IPAM pool exhausted: no free addresses in {cidr}")]
    #[diagnostic(
        code(vpc::runtime::ipam_pool_exhausted),
        help("Expand the private network's CIDR or availableRanges, or free unused NICs")
    )]
    IpamPoolExhausted {
        #[allow(unused)]
        cidr: String,
    },

    /// IPAM address not currently marked as taken
    #[error("Address {address} is not allocated in prefix {cidr}")]
    #[diagnostic(
        code(vpc::runtime::ip_not_found),
        help("This is expected on a duplicate release; callers on deletion paths should ignore it")
    )]
    IpNotFound {
        #[allow(unused)]
        cidr: String,
        #[allow(unused)]
        address: String,
    },

    /// The persisted prefix blob failed to decode
    #[error("Failed to decode IPAM prefix state for {cidr}: {message}")]
    #[diagnostic(
        code(vpc::runtime::prefix_decode_error),
        help("The document may have been written by an incompatible version of this controller")
    )]
    PrefixDecodeError {
        #[allow(unused)]
        cidr: String,
        #[allow(unused)]
        message: String,
    },

    /// Cloud inventory call failed
    #[error("Cloud inventory operation failed: {message}")]
    #[diagnostic(
        code(vpc::runtime::cloud_error),
        help("Check provider credentials and that the zone/server/network identifiers are correct")
    )]
    CloudError {
        #[allow(unused)]
        message: String,
    },

    /// Cloud inventory reported the object as absent
    #[error("Cloud inventory object not found: {message}")]
    #[diagnostic(
        code(vpc::runtime::cloud_not_found),
        help("Treated as success on delete paths; surfaced as an error on lookup paths")
    )]
    CloudNotFound {
        #[allow(unused)]
        message: String,
    },

    /// A node's provider ID could not be resolved to exactly one server
    #[error("Could not resolve a single server for node '{node_name}': {reason}")]
    #[diagnostic(
        code(vpc::runtime::server_resolution_failed),
        help("Verify the node's providerID is set, or that exactly one server matches the node name")
    )]
    ServerResolutionFailed {
        #[allow(unused)]
        node_name: String,
        #[allow(unused)]
        reason: String,
    },

    /// Cluster object store call failed
    #[error("Cluster store operation failed: {message}")]
    #[diagnostic(
        code(vpc::runtime::cluster_store_error),
        help("Check connectivity to the cluster object store and that the resource path is correct")
    )]
    ClusterStoreError {
        #[allow(unused)]
        message: String,
        #[source]
        #[allow(unused)]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An invariant the reconciler relies on was violated
    #[error("Invariant violated: {message}")]
    #[diagnostic(
        code(vpc::runtime::invariant_violation),
        help("This reconcile is requeued rather than auto-repaired to avoid destroying conflicting state")
    )]
    InvariantViolation {
        #[allow(unused)]
        message: String,
    },

    /// Internal error
    #[error("Internal runtime error: {message}")]
    #[diagnostic(
        code(vpc::runtime::internal_error),
        help("This is likely a bug in vpc-runtime. Please report it with the full error details")
    )]
    InternalError {
        #[allow(unused)]
        message: String,
    },
}

/// Result type alias for runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;

impl RuntimeError {
    pub fn nic_not_found(mac: impl Into<String>) -> Self {
        Self::NicNotFound { mac: mac.into() }
    }

    pub fn mac_not_on_node(mac: impl Into<String>) -> Self {
        Self::MacNotOnNode { mac: mac.into() }
    }

    pub fn dhcp_lease_failed(link_name: impl Into<String>, address_count: usize) -> Self {
        Self::DhcpLeaseFailed {
            link_name: link_name.into(),
            address_count,
        }
    }

    pub fn command_failed(
        command: impl Into<String>,
        exit_code: i32,
        stderr: impl Into<String>,
    ) -> Self {
        Self::CommandFailed {
            command: command.into(),
            exit_code,
            stderr: stderr.into(),
        }
    }

    pub fn invalid_config(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    pub fn prefix_not_found(cidr: impl Into<String>) -> Self {
        Self::PrefixNotFound { cidr: cidr.into() }
    }

    pub fn ipam_pool_exhausted(cidr: impl Into<String>) -> Self {
        Self::IpamPoolExhausted { cidr: cidr.into() }
    }

    pub fn ip_not_found(cidr: impl Into<String>, address: impl Into<String>) -> Self {
        Self::IpNotFound {
            cidr: cidr.into(),
            address: address.into(),
        }
    }

    pub fn prefix_decode_error(cidr: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PrefixDecodeError {
            cidr: cidr.into(),
            message: message.into(),
        }
    }

    pub fn cloud_error(message: impl Into<String>) -> Self {
        Self::CloudError {
            message: message.into(),
        }
    }

    pub fn cloud_not_found(message: impl Into<String>) -> Self {
        Self::CloudNotFound {
            message: message.into(),
        }
    }

    pub fn server_resolution_failed(
        node_name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::ServerResolutionFailed {
            node_name: node_name.into(),
            reason: reason.into(),
        }
    }

    pub fn cluster_store_error(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::ClusterStoreError {
            message: message.into(),
            source,
        }
    }

    pub fn invariant_violation(message: impl Into<String>) -> Self {
        Self::InvariantViolation {
            message: message.into(),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }

    /// True for error conditions that callers on delete/release paths should treat as
    /// already-converged rather than failures.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NicNotFound { .. }
                | Self::PrefixNotFound { .. }
                | Self::IpNotFound { .. }
                | Self::CloudNotFound { .. }
        )
    }
}
