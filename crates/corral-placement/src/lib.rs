//! corral-placement: host selection for workload placement.
//!
//! Given a workload description, a request-scoped [`PlacementContext`] and an
//! initial candidate map, [`FilterChain::select_hosts`] narrows the candidates
//! to the hosts that satisfy every placement rule, or fails the placement
//! with the offending constraints.
//!
//! # Components
//!
//! - **`filter`**: the [`HostFilter`] contract and the closed [`PlacementFilter`] set
//! - **`filters`**: named affinity, volume affinity, cluster local affinity,
//!   cluster anti-affinity, bin-pack, spread, network grouping, storage
//!   capacity and load-balancer affinity
//! - **`chain`**: strict sequencing of the active filters
//! - **`client`**: inventory access with query expirations and paging
//! - **`convert`**: initial candidates from resource pool membership
//! - **`placer`**: per-host instance counts for a selection

pub mod chain;
pub mod client;
pub mod config;
pub mod constraint;
pub mod context;
pub mod convert;
pub mod error;
pub mod filter;
pub mod filters;
pub mod placer;
pub mod selection;
pub mod topology;

#[cfg(test)]
mod testkit;

pub use chain::FilterChain;
pub use client::InventoryClient;
pub use config::PlacementConfig;
pub use constraint::{AffinityConstraint, ConstraintStrength};
pub use context::PlacementContext;
pub use convert::{candidates_from_hosts, candidates_from_pools};
pub use error::{PlacementError, PlacementResult};
pub use filter::{HostFilter, PlacementFilter};
pub use placer::{PlacementPlan, assign_instances};
pub use selection::{CandidateMap, DescName, HostSelection, candidate_map};
