//! Filter implementations.

mod affinity;
mod binpack;
mod cluster;
mod load_balancer;
mod network;
mod spread;
mod storage;
mod volume;

pub use affinity::NamedAffinityFilter;
pub use binpack::BinpackFilter;
pub use cluster::ClusterAntiAffinityFilter;
pub use load_balancer::LoadBalancerAffinityFilter;
pub use network::NetworkFilter;
pub use spread::SpreadFilter;
pub use storage::StorageFilter;
pub use volume::{ClusterLocalAffinityFilter, NamedVolumeAffinityFilter};
