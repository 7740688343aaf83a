//! The ordered filter chain and the `select_hosts` entry point.

use std::collections::BTreeMap;
use std::sync::Arc;

use corral_inventory::{InventoryGateway, WorkloadDescription};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::client::InventoryClient;
use crate::config::PlacementConfig;
use crate::constraint::AffinityConstraint;
use crate::context::PlacementContext;
use crate::error::{PlacementError, PlacementResult};
use crate::filter::{HostFilter, PlacementFilter};
use crate::filters::{
    BinpackFilter, ClusterAntiAffinityFilter, ClusterLocalAffinityFilter,
    LoadBalancerAffinityFilter, NamedAffinityFilter, NamedVolumeAffinityFilter, NetworkFilter,
    SpreadFilter, StorageFilter,
};
use crate::selection::CandidateMap;

/// Filters applied strictly one after another to a threaded candidate map.
pub struct FilterChain {
    filters: Vec<PlacementFilter>,
}

impl FilterChain {
    pub fn new(filters: Vec<PlacementFilter>) -> Self {
        Self { filters }
    }

    /// The full chain: network, storage, load balancer, named affinity,
    /// named volume affinity, cluster local affinity, cluster anti-affinity,
    /// bin-pack, spread.
    pub fn standard(gateway: Arc<dyn InventoryGateway>, config: &PlacementConfig) -> Self {
        let inventory = InventoryClient::new(gateway, config);
        Self::new(vec![
            PlacementFilter::Network(NetworkFilter::new(inventory.clone())),
            PlacementFilter::Storage(StorageFilter::new(inventory.clone(), config)),
            PlacementFilter::LoadBalancer(LoadBalancerAffinityFilter::new(inventory.clone())),
            PlacementFilter::NamedAffinity(NamedAffinityFilter::new(inventory.clone())),
            PlacementFilter::NamedVolumeAffinity(NamedVolumeAffinityFilter::new(
                inventory.clone(),
            )),
            PlacementFilter::ClusterLocalAffinity(ClusterLocalAffinityFilter::new(
                inventory.clone(),
                config,
            )),
            PlacementFilter::ClusterAntiAffinity(ClusterAntiAffinityFilter::new(inventory.clone())),
            PlacementFilter::Binpack(BinpackFilter::new(inventory.clone(), config)),
            PlacementFilter::Spread(SpreadFilter::new(inventory, config)),
        ])
    }

    pub fn filters(&self) -> &[PlacementFilter] {
        &self.filters
    }

    /// Every named relationship the chain enforces for `desc`.
    ///
    /// When two filters declare the same name, the earlier filter wins.
    pub fn affinity_constraints(
        &self,
        desc: &WorkloadDescription,
    ) -> BTreeMap<String, AffinityConstraint> {
        let mut merged = BTreeMap::new();
        for filter in &self.filters {
            for (name, constraint) in filter.affinity_constraints(desc) {
                merged.entry(name).or_insert(constraint);
            }
        }
        merged
    }

    /// Narrow `candidates` to the hosts that satisfy every active filter.
    ///
    /// The first failing filter aborts the placement; no partial selection
    /// is returned.
    pub async fn select_hosts(
        &self,
        desc: &WorkloadDescription,
        ctx: &PlacementContext,
        candidates: CandidateMap,
    ) -> PlacementResult<CandidateMap> {
        if candidates.is_empty() {
            return Err(PlacementError::NoCandidates(ctx.placement_group_id.clone()));
        }
        info!(
            description = %desc.name,
            placement_group = %ctx.placement_group_id,
            candidates = candidates.len(),
            "selecting hosts"
        );

        let mut candidates = candidates;
        for filter in &self.filters {
            if !filter.is_active(desc, ctx) {
                debug!(filter = filter.name(), "filter inactive");
                continue;
            }
            let span = info_span!(
                "placement_filter",
                filter = filter.name(),
                placement_group = %ctx.placement_group_id,
            );
            let before = candidates.len();
            #[cfg(debug_assertions)]
            let input: Vec<_> = candidates.keys().cloned().collect();

            candidates = match filter.filter(desc, ctx, candidates).instrument(span).await {
                Ok(narrowed) => narrowed,
                Err(e) => {
                    warn!(filter = filter.name(), error = %e, "placement failed");
                    return Err(e);
                }
            };

            #[cfg(debug_assertions)]
            debug_assert!(
                candidates.keys().all(|id| input.contains(id)),
                "filter {} introduced a host",
                filter.name()
            );
            debug!(
                filter = filter.name(),
                before,
                after = candidates.len(),
                "filter applied"
            );

            if candidates.is_empty() {
                warn!(filter = filter.name(), "no candidates left");
                return Err(PlacementError::NoCandidates(ctx.placement_group_id.clone()));
            }
        }

        info!(
            description = %desc.name,
            hosts = ?candidates.keys().collect::<Vec<_>>(),
            "hosts selected"
        );
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::candidate_map;
    use crate::testkit::*;
    use corral_inventory::{LoadBalancerSpec, PlacementPolicy};

    fn chain(store: corral_inventory::InventoryStore) -> FilterChain {
        FilterChain::standard(Arc::new(store), &PlacementConfig::default())
    }

    #[test]
    fn standard_order() {
        let names: Vec<&str> = chain(store()).filters().iter().map(|f| f.name()).collect();
        assert_eq!(
            names,
            vec![
                "network",
                "storage",
                "load-balancer-affinity",
                "named-affinity",
                "named-volume-affinity",
                "cluster-local-affinity",
                "cluster-anti-affinity",
                "binpack",
                "spread",
            ]
        );
    }

    #[test]
    fn merges_declared_constraints() {
        let desc = WorkloadDescription {
            affinity: vec!["db".to_string(), "!cache".to_string()],
            load_balancer: Some(LoadBalancerSpec {
                backend_names: vec!["web".to_string()],
                network_names: vec![],
            }),
            ..description("desc-lb", "lb")
        };
        let constraints = chain(store()).affinity_constraints(&desc);
        let names: Vec<&str> = constraints.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["cache", "db", "web"]);
    }

    #[tokio::test]
    async fn empty_input_has_no_candidates() {
        let err = chain(store())
            .select_hosts(&description("d", "web"), &ctx("g1"), CandidateMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PlacementError::NoCandidates(ref g) if g == "g1"));
    }

    #[tokio::test]
    async fn plain_workload_keeps_every_host() {
        let store = store();
        store.put(&description("d", "web")).unwrap();
        let result = chain(store)
            .select_hosts(&description("d", "web"), &ctx("g1"), candidate_map(["h1", "h2"]))
            .await
            .unwrap();
        assert_eq!(result.len(), 2);
    }

    #[tokio::test]
    async fn first_failure_aborts() {
        let store = store();
        store.put_policy("pool-1", PlacementPolicy::Spread).unwrap();
        let desc = WorkloadDescription {
            affinity: vec!["db:hard".to_string()],
            ..description("d", "web")
        };
        let err = chain(store)
            .select_hosts(&desc, &ctx("g1"), candidate_map(["h1", "h2"]))
            .await
            .unwrap_err();
        assert!(err.is_constraint_violation());
    }
}
