use crate::{GroupVersionKind, ResourceKey, ResourceVersion};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

/// Base validation for all resources
pub fn validate_base(metadata: &ObjectMeta) -> Result<(), ResourceError> {
    if metadata.name.is_none() {
        return Err(ResourceError::MissingField("metadata.name".to_string()));
    }

    if let Some(name) = &metadata.name {
        if !is_valid_name(name) {
            return Err(ResourceError::InvalidName(name.clone()));
        }
    }

    Ok(())
}

/// Trait for cluster-object-store resources
pub trait Resource: Serialize + for<'de> Deserialize<'de> + Send + Sync {
    /// Get the API version of this resource
    fn api_version(&self) -> String;

    /// Get the kind of this resource
    fn kind(&self) -> String;

    /// Get the metadata of this resource
    fn metadata(&self) -> &ObjectMeta;

    /// Get mutable metadata
    fn metadata_mut(&mut self) -> &mut ObjectMeta;

    /// Get the GroupVersionKind
    fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind::from_api_version_kind(&self.api_version(), &self.kind())
    }

    /// Get the ResourceKey
    fn resource_key(&self) -> Result<ResourceKey, ResourceError> {
        let metadata = self.metadata();
        let name = metadata
            .name
            .as_ref()
            .ok_or_else(|| ResourceError::MissingField("metadata.name".to_string()))?;
        let namespace = metadata.namespace.clone().unwrap_or_default();

        Ok(ResourceKey::new(self.gvk(), namespace, name))
    }

    /// Get the resource version
    fn resource_version(&self) -> Option<ResourceVersion> {
        self.metadata()
            .resource_version
            .as_ref()
            .map(ResourceVersion::new)
    }

    /// Set the resource version
    fn set_resource_version(&mut self, version: ResourceVersion) {
        self.metadata_mut().resource_version = Some(version.0);
    }

    /// Get the UID
    fn uid(&self) -> Option<String> {
        self.metadata().uid.clone()
    }

    /// Set the UID
    fn set_uid(&mut self, uid: String) {
        self.metadata_mut().uid = Some(uid);
    }

    /// Check if this is a namespaced resource
    fn is_namespaced(&self) -> bool {
        self.metadata().namespace.is_some()
    }

    /// Validate the resource
    fn validate(&self) -> Result<(), ResourceError> {
        validate_base(self.metadata())
    }
}

/// Resource-related errors
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid resource name: {0}")]
    InvalidName(String),

    #[error("Invalid namespace: {0}")]
    InvalidNamespace(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

/// Validate a cluster-object name (DNS-1123 subdomain)
pub fn is_valid_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 253 {
        return false;
    }

    // Must contain only lowercase alphanumeric, '-', or '.'
    // Must start and end with alphanumeric
    let chars: Vec<char> = name.chars().collect();

    if !chars[0].is_ascii_lowercase() && !chars[0].is_ascii_digit() {
        return false;
    }

    if !chars[chars.len() - 1].is_ascii_lowercase() && !chars[chars.len() - 1].is_ascii_digit() {
        return false;
    }

    chars
        .iter()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-' || *c == '.')
}

use k8s_openapi::api::core::v1::Node;

impl Resource for Node {
    fn api_version(&self) -> String {
        "v1".to_string()
    }

    fn kind(&self) -> String {
        "Node".to_string()
    }

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn is_namespaced(&self) -> bool {
        false
    }
}

/// Type of IPAM a PrivateNetwork delegates to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IpamType {
    Dhcp,
    Static,
}

/// Restriction of which ranges within `cidr` may be handed out
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateNetworkIpamStatic {
    /// CIDR associated with this private network
    pub cidr: String,
    /// Restricts which sub-ranges of `cidr` are eligible for allocation.
    /// Empty means the whole CIDR is eligible.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub available_ranges: Vec<String>,
}

/// IPAM configuration for a PrivateNetwork
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateNetworkIpam {
    #[serde(rename = "type")]
    pub type_: IpamType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_: Option<PrivateNetworkIpamStatic>,
}

/// A route injected into the cluster for this PrivateNetwork
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateNetworkRoute {
    pub to: String,
    pub via: String,
}

/// Desired state of a PrivateNetwork
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivateNetworkSpec {
    /// ID of the PrivateNetwork in the cloud inventory
    pub id: String,

    /// Zone the PrivateNetwork lives in. Defaults to the controller's configured zone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipam: Option<PrivateNetworkIpam>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<PrivateNetworkRoute>,

    /// Whether traffic leaving this private network should be masqueraded
    #[serde(default = "default_masquerade")]
    pub masquerade: bool,

    /// CIDR of the PrivateNetwork. Deprecated in favor of `ipam.static.cidr`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cidr: Option<String>,
}

fn default_masquerade() -> bool {
    true
}

impl PrivateNetworkSpec {
    /// Resolve the CIDR to use for static allocation, preferring `ipam.static.cidr`
    /// and falling back to the deprecated top-level `cidr` field.
    pub fn effective_cidr(&self) -> Option<&str> {
        self.ipam
            .as_ref()
            .and_then(|ipam| ipam.static_.as_ref())
            .map(|s| s.cidr.as_str())
            .or(self.cidr.as_deref())
    }

    /// Whether this PrivateNetwork expects the controller to manage static
    /// address allocation (as opposed to DHCP or the legacy unmanaged mode).
    pub fn is_static_ipam(&self) -> bool {
        matches!(
            self.ipam.as_ref().map(|i| i.type_),
            Some(IpamType::Static)
        )
    }

    /// Candidate CIDRs to try allocation against, in order: `availableRanges`
    /// when non-empty, else the single static/deprecated CIDR. Empty when
    /// neither is configured.
    pub fn candidate_cidrs(&self) -> Vec<String> {
        let ranges = self
            .ipam
            .as_ref()
            .and_then(|ipam| ipam.static_.as_ref())
            .map(|s| s.available_ranges.as_slice())
            .unwrap_or(&[]);

        if !ranges.is_empty() {
            return ranges.to_vec();
        }

        self.effective_cidr()
            .map(|cidr| vec![cidr.to_string()])
            .unwrap_or_default()
    }
}

/// Observed state of a PrivateNetwork. Currently empty — all state of interest
/// lives on the NetworkInterface objects that reference this PrivateNetwork.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrivateNetworkStatus {}

/// A private L2 network that cluster nodes can be attached to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivateNetwork {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: PrivateNetworkSpec,
    #[serde(default)]
    pub status: PrivateNetworkStatus,
}

impl Default for PrivateNetworkSpec {
    fn default() -> Self {
        Self {
            id: String::new(),
            zone: None,
            ipam: None,
            routes: Vec::new(),
            masquerade: true,
            cidr: None,
        }
    }
}

impl Resource for PrivateNetwork {
    fn api_version(&self) -> String {
        "vpc.scaleway.com/v1alpha1".to_string()
    }

    fn kind(&self) -> String {
        "PrivateNetwork".to_string()
    }

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn is_namespaced(&self) -> bool {
        false
    }

    fn validate(&self) -> Result<(), ResourceError> {
        validate_base(&self.metadata)?;

        if self.spec.id.is_empty() {
            return Err(ResourceError::ValidationFailed(
                "PrivateNetwork.spec.id must not be empty".to_string(),
            ));
        }

        if let Some(ipam) = &self.spec.ipam {
            if matches!(ipam.type_, IpamType::Static) && ipam.static_.is_none() {
                return Err(ResourceError::ValidationFailed(
                    "PrivateNetwork.spec.ipam.static is required when type is Static".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Desired state of a NetworkInterface
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkInterfaceSpec {
    /// ID of the NIC in the cloud inventory, set once the cloud side has attached it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Node this interface is attached to
    pub node_name: String,

    /// Address to assign to the interface. Deprecated — superseded by `status.address`
    /// under the allocator-managed (ipamMode=static) path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Observed state of a NetworkInterface
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkInterfaceStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// CIDR of the PrivateNetwork this address was allocated from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_cidr: Option<String>,
}

/// A secondary NIC attached to a cluster node for a specific PrivateNetwork
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkInterface {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: NetworkInterfaceSpec,
    #[serde(default)]
    pub status: NetworkInterfaceStatus,
}

impl Resource for NetworkInterface {
    fn api_version(&self) -> String {
        "vpc.scaleway.com/v1alpha1".to_string()
    }

    fn kind(&self) -> String {
        "NetworkInterface".to_string()
    }

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn is_namespaced(&self) -> bool {
        false
    }

    fn validate(&self) -> Result<(), ResourceError> {
        validate_base(&self.metadata)?;

        if self.spec.node_name.is_empty() {
            return Err(ResourceError::ValidationFailed(
                "NetworkInterface.spec.nodeName must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}
