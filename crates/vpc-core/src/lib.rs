//! VPC Core - Fundamental types and traits for the private-network control plane
//!
//! This crate provides:
//! - Core cluster-object resource abstractions (`PrivateNetwork`, `NetworkInterface`, `Node`)
//! - Error types with miette diagnostics
//! - Type-safe resource keys and identifiers
//! - Serialization helpers

pub mod error;
pub mod events;
pub mod resources;
pub mod types;

// Re-export commonly used types
pub use error::{CoreError, Result};
pub use events::{ResourceEvent, WatchEventType};
pub use resources::{
    is_valid_name, IpamType, NetworkInterface, NetworkInterfaceSpec, NetworkInterfaceStatus,
    PrivateNetwork, PrivateNetworkIpam, PrivateNetworkIpamStatic, PrivateNetworkRoute,
    PrivateNetworkSpec, PrivateNetworkStatus, Resource, ResourceError,
};
pub use types::{GroupVersionKind, ResourceKey, ResourceVersion};

// Re-export k8s-openapi types for convenience — Node is reused directly as
// cluster node identity since its providerID field already matches what the
// cloud inventory adapter needs.
pub use k8s_openapi;
pub use k8s_openapi::api::core::v1::Node;
pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// Serialize a resource to JSON
pub fn to_json<T: serde::Serialize>(resource: &T) -> Result<String> {
    serde_json::to_string(resource).map_err(|e| {
        CoreError::serialization_error(
            format!("Failed to serialize to JSON: {}", e),
            Some(Box::new(e)),
        )
    })
}

/// Serialize a resource to pretty JSON
pub fn to_json_pretty<T: serde::Serialize>(resource: &T) -> Result<String> {
    serde_json::to_string_pretty(resource).map_err(|e| {
        CoreError::serialization_error(
            format!("Failed to serialize to JSON: {}", e),
            Some(Box::new(e)),
        )
    })
}

/// Deserialize a resource from JSON
pub fn from_json<T: for<'de> serde::Deserialize<'de>>(data: &str) -> Result<T> {
    serde_json::from_str(data).map_err(|e| {
        CoreError::serialization_error(
            format!("Failed to deserialize from JSON: {}", e),
            Some(Box::new(e)),
        )
    })
}

/// Serialize a resource to YAML
pub fn to_yaml<T: serde::Serialize>(resource: &T) -> Result<String> {
    serde_yaml::to_string(resource).map_err(|e| {
        CoreError::serialization_error(
            format!("Failed to serialize to YAML: {}", e),
            Some(Box::new(e)),
        )
    })
}

/// Deserialize a resource from YAML
pub fn from_yaml<T: for<'de> serde::Deserialize<'de>>(data: &str) -> Result<T> {
    serde_yaml::from_str(data).map_err(|e| {
        CoreError::serialization_error(
            format!("Failed to deserialize from YAML: {}", e),
            Some(Box::new(e)),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::Node;

    #[test]
    fn test_json_serialization() {
        let mut node = Node::default();
        node.metadata.name = Some("node-1".to_string());

        let json = to_json(&node).unwrap();
        assert!(json.contains("node-1"));

        let deserialized: Node = from_json(&json).unwrap();
        assert_eq!(deserialized.metadata.name, Some("node-1".to_string()));
    }

    #[test]
    fn test_yaml_serialization() {
        let mut node = Node::default();
        node.metadata.name = Some("node-1".to_string());

        let yaml = to_yaml(&node).unwrap();
        assert!(yaml.contains("node-1"));

        let deserialized: Node = from_yaml(&yaml).unwrap();
        assert_eq!(deserialized.metadata.name, Some("node-1".to_string()));
    }
}
