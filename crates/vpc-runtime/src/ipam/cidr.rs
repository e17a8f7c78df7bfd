use crate::error::{Result, RuntimeError};
use std::net::Ipv4Addr;

/// Parsed CIDR configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CidrConfig {
    /// Base network address
    pub network: Ipv4Addr,
    /// CIDR prefix length
    pub prefix_len: u8,
    /// First allocatable address (the network address itself — these ranges
    /// are plain address pools, not routed subnets, so nothing is reserved)
    pub first_host: Ipv4Addr,
    /// Last allocatable address (last in range)
    pub broadcast: Ipv4Addr,
}

impl CidrConfig {
    /// Whether `ip` falls within this network (inclusive of network/broadcast).
    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        u32::from(ip) >= u32::from(self.network) && u32::from(ip) <= u32::from(self.broadcast)
    }
}

/// Parse a CIDR string like "10.88.0.0/16" into a [`CidrConfig`]
pub fn parse_cidr(cidr_str: &str) -> Result<CidrConfig> {
    let parts: Vec<&str> = cidr_str.split('/').collect();
    if parts.len() != 2 {
        return Err(RuntimeError::invalid_config(
            format!("Invalid CIDR format: '{}'", cidr_str),
            "Use format like '10.88.0.0/16'",
        ));
    }

    let network: Ipv4Addr = parts[0].parse().map_err(|_| {
        RuntimeError::invalid_config(
            format!("Invalid network address: '{}'", parts[0]),
            "Use a valid IPv4 address like '10.88.0.0'",
        )
    })?;

    let prefix_len: u8 = parts[1].parse().map_err(|_| {
        RuntimeError::invalid_config(
            format!("Invalid prefix length: '{}'", parts[1]),
            "Use a number between 0 and 32",
        )
    })?;

    if prefix_len > 32 {
        return Err(RuntimeError::invalid_config(
            format!("Prefix length {} is out of range", prefix_len),
            "Use a number between 0 and 32",
        ));
    }

    let network_u32 = u32::from(network);
    let host_bits = 32 - prefix_len;
    let mask = if prefix_len == 0 {
        0u32
    } else {
        !((1u32 << host_bits) - 1)
    };
    let broadcast_u32 = network_u32 | !mask;

    let first_host = network;
    let broadcast = Ipv4Addr::from(broadcast_u32);

    Ok(CidrConfig {
        network,
        prefix_len,
        first_host,
        broadcast,
    })
}

/// Increment an IPv4 address by one
pub fn next_ip(ip: Ipv4Addr) -> Ipv4Addr {
    Ipv4Addr::from(u32::from(ip) + 1)
}

/// Encode a CIDR string for use as a flat document key, mirroring the
/// original ConfigMap-key encoding (`/` and `:` are not valid key characters).
pub fn encode_cidr_key(cidr: &str) -> String {
    cidr.replace('/', "_").replace(':', "-")
}
