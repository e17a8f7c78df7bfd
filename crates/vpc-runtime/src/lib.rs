// Allow unused assignments for diagnostic fields - they're used by the thiserror/miette macros
#![allow(unused_assignments)]

pub mod cloud;
pub mod cluster_client;
pub mod cluster_controller;
pub mod command;
pub mod constants;
pub mod error;
pub mod ipam;
pub mod leader;
pub mod link;
pub mod node_controller;

pub use cloud::{CloudInventory, HttpCloudInventory, MockCloudInventory, PrivateNic, Server};
pub use cluster_client::{ClusterClient, HttpClusterClient, MockClusterClient};
pub use cluster_controller::ClusterReconciler;
pub use error::{Result, RuntimeError};
pub use ipam::{Allocator, IpamStore, Prefix};
pub use leader::{LeaderElector, StandaloneLeader};
pub use link::{LinkEffector, LinkRoute, MockLinkEffector};
pub use node_controller::NodeReconciler;

#[cfg(target_os = "linux")]
pub use link::LinuxLinkEffector;
