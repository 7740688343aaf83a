//! The host filter contract and the closed set of filters.

use std::collections::BTreeMap;

use async_trait::async_trait;
use corral_inventory::WorkloadDescription;

use crate::constraint::AffinityConstraint;
use crate::context::PlacementContext;
use crate::error::PlacementResult;
use crate::filters::{
    BinpackFilter, ClusterAntiAffinityFilter, ClusterLocalAffinityFilter,
    LoadBalancerAffinityFilter, NamedAffinityFilter, NamedVolumeAffinityFilter, NetworkFilter,
    SpreadFilter, StorageFilter,
};
use crate::selection::CandidateMap;

/// A unit of narrowing logic over a candidate map.
///
/// `filter` must only remove entries from, or annotate entries already in,
/// its input. It never introduces hosts and keeps no state between calls.
#[async_trait]
pub trait HostFilter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Cheap check of whether the filter has any work for this request.
    fn is_active(&self, desc: &WorkloadDescription, ctx: &PlacementContext) -> bool;

    /// Named relationships this filter enforces for `desc`.
    fn affinity_constraints(
        &self,
        desc: &WorkloadDescription,
    ) -> BTreeMap<String, AffinityConstraint>;

    async fn filter(
        &self,
        desc: &WorkloadDescription,
        ctx: &PlacementContext,
        candidates: CandidateMap,
    ) -> PlacementResult<CandidateMap>;
}

pub enum PlacementFilter {
    Network(NetworkFilter),
    Storage(StorageFilter),
    LoadBalancer(LoadBalancerAffinityFilter),
    NamedAffinity(NamedAffinityFilter),
    NamedVolumeAffinity(NamedVolumeAffinityFilter),
    ClusterLocalAffinity(ClusterLocalAffinityFilter),
    ClusterAntiAffinity(ClusterAntiAffinityFilter),
    Binpack(BinpackFilter),
    Spread(SpreadFilter),
}

impl PlacementFilter {
    fn inner(&self) -> &dyn HostFilter {
        match self {
            PlacementFilter::Network(f) => f,
            PlacementFilter::Storage(f) => f,
            PlacementFilter::LoadBalancer(f) => f,
            PlacementFilter::NamedAffinity(f) => f,
            PlacementFilter::NamedVolumeAffinity(f) => f,
            PlacementFilter::ClusterLocalAffinity(f) => f,
            PlacementFilter::ClusterAntiAffinity(f) => f,
            PlacementFilter::Binpack(f) => f,
            PlacementFilter::Spread(f) => f,
        }
    }
}

#[async_trait]
impl HostFilter for PlacementFilter {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn is_active(&self, desc: &WorkloadDescription, ctx: &PlacementContext) -> bool {
        self.inner().is_active(desc, ctx)
    }

    fn affinity_constraints(
        &self,
        desc: &WorkloadDescription,
    ) -> BTreeMap<String, AffinityConstraint> {
        self.inner().affinity_constraints(desc)
    }

    /// Inactive filters pass the candidate map through unchanged.
    async fn filter(
        &self,
        desc: &WorkloadDescription,
        ctx: &PlacementContext,
        candidates: CandidateMap,
    ) -> PlacementResult<CandidateMap> {
        let inner = self.inner();
        if !inner.is_active(desc, ctx) {
            return Ok(candidates);
        }
        inner.filter(desc, ctx, candidates).await
    }
}
