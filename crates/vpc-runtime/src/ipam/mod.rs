pub mod allocator;
pub mod cidr;
pub mod store;

pub use allocator::Allocator;
pub use cidr::{encode_cidr_key, next_ip, parse_cidr, CidrConfig};
pub use store::{IpamStore, Prefix};
