//! Spread members of one cluster across hosts.

use std::collections::BTreeMap;

use async_trait::async_trait;
use corral_inventory::{Criteria, PlacedInstance, WorkloadDescription};
use futures_util::future::join_all;
use tracing::{debug, info};

use crate::client::InventoryClient;
use crate::constraint::AffinityConstraint;
use crate::context::PlacementContext;
use crate::error::PlacementResult;
use crate::filter::HostFilter;
use crate::selection::CandidateMap;

pub struct ClusterAntiAffinityFilter {
    inventory: InventoryClient,
}

impl ClusterAntiAffinityFilter {
    pub fn new(inventory: InventoryClient) -> Self {
        Self { inventory }
    }
}

/// Hosts to keep given per-host sibling counts in candidate order.
///
/// Every host at the minimum count is kept, then higher counts are added in
/// ascending order until `requested` hosts are kept.
pub(crate) fn least_loaded(counts: &[(String, u32)], requested: usize) -> Vec<String> {
    let mut sorted: Vec<&(String, u32)> = counts.iter().collect();
    // Stable: equal counts keep candidate order.
    sorted.sort_by_key(|(_, count)| *count);

    let Some(&&(_, min)) = sorted.first() else {
        return Vec::new();
    };
    sorted
        .iter()
        .enumerate()
        .take_while(|(i, (_, count))| *count == min || *i < requested)
        .map(|(_, (id, _))| id.clone())
        .collect()
}

#[async_trait]
impl HostFilter for ClusterAntiAffinityFilter {
    fn name(&self) -> &'static str {
        "cluster-anti-affinity"
    }

    fn is_active(&self, desc: &WorkloadDescription, ctx: &PlacementContext) -> bool {
        desc.cluster_size.is_some_and(|size| size > 1) || ctx.is_clustering
    }

    fn affinity_constraints(
        &self,
        _desc: &WorkloadDescription,
    ) -> BTreeMap<String, AffinityConstraint> {
        BTreeMap::new()
    }

    async fn filter(
        &self,
        desc: &WorkloadDescription,
        ctx: &PlacementContext,
        mut candidates: CandidateMap,
    ) -> PlacementResult<CandidateMap> {
        if candidates.len() <= 1 {
            return Ok(candidates);
        }

        let lookups = candidates.keys().map(|host_id| {
            let criteria = Criteria::new()
                .eq("placement_group_id", ctx.placement_group_id.as_str())
                .eq("description_link", desc.id.as_str())
                .eq("host_id", host_id.as_str());
            async move {
                let members = self.inventory.query::<PlacedInstance>(&criteria).await?;
                PlacementResult::Ok((host_id.clone(), members))
            }
        });
        let members = join_all(lookups)
            .await
            .into_iter()
            .collect::<PlacementResult<Vec<_>>>()?;

        let mut counts = Vec::with_capacity(members.len());
        for (host_id, placed) in members {
            if let Some(selection) = candidates.get_mut(&host_id) {
                for instance in &placed {
                    selection.add_placed_sibling(instance.id.clone());
                }
            }
            debug!(host = %host_id, members = placed.len(), "cluster members on host");
            counts.push((host_id, placed.len() as u32));
        }

        // Least populated first.
        let keep = least_loaded(&counts, ctx.requested_count as usize);
        let mut kept = CandidateMap::with_capacity(keep.len());
        for id in &keep {
            if let Some((id, selection)) = candidates.shift_remove_entry(id) {
                kept.insert(id, selection);
            }
        }
        info!(
            description = %desc.name,
            hosts = ?keep,
            "spread cluster members"
        );
        Ok(kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::candidate_map;
    use crate::testkit::*;

    fn counts(pairs: &[(&str, u32)]) -> Vec<(String, u32)> {
        pairs.iter().map(|(id, c)| (id.to_string(), *c)).collect()
    }

    #[test]
    fn least_loaded_prefers_lowest_counts() {
        let picked = least_loaded(&counts(&[("A", 2), ("B", 1), ("C", 0)]), 2);
        assert_eq!(picked, vec!["C", "B"]);
    }

    #[test]
    fn least_loaded_keeps_every_host_at_minimum() {
        let picked = least_loaded(&counts(&[("A", 0), ("B", 3), ("C", 0), ("D", 0)]), 1);
        assert_eq!(picked, vec!["A", "C", "D"]);
    }

    #[test]
    fn least_loaded_ties_keep_input_order() {
        let picked = least_loaded(&counts(&[("B", 1), ("A", 1), ("C", 2)]), 0);
        assert_eq!(picked, vec!["B", "A"]);
        assert!(least_loaded(&[], 3).is_empty());
    }

    fn clustered(id: &str) -> WorkloadDescription {
        WorkloadDescription {
            cluster_size: Some(3),
            ..description(id, "web")
        }
    }

    #[test]
    fn activation() {
        let filter = ClusterAntiAffinityFilter::new(client(store()));
        assert!(!filter.is_active(&description("d", "web"), &ctx("g1")));
        assert!(filter.is_active(&clustered("d"), &ctx("g1")));
        assert!(filter.is_active(&description("d", "web"), &ctx("g1").clustering()));
    }

    #[tokio::test]
    async fn spreads_across_least_populated_hosts() {
        let store = store();
        let web = clustered("desc-web");
        store.put(&instance("w1", "desc-web", "A", "g1")).unwrap();
        store.put(&instance("w2", "desc-web", "A", "g1")).unwrap();
        store.put(&instance("w3", "desc-web", "B", "g1")).unwrap();
        // Other groups and descriptions do not count.
        store.put(&instance("w4", "desc-web", "C", "g2")).unwrap();
        store.put(&instance("db1", "desc-db", "C", "g1")).unwrap();

        let filter = ClusterAntiAffinityFilter::new(client(store));
        let result = filter
            .filter(
                &web,
                &ctx("g1").with_requested_count(2),
                candidate_map(["A", "B", "C"]),
            )
            .await
            .unwrap();

        let keys: Vec<&str> = result.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["C", "B"]);
        assert_eq!(result["B"].placed_sibling_count(), 1);
        assert_eq!(result["C"].placed_sibling_count(), 0);
    }

    #[tokio::test]
    async fn single_candidate_is_untouched() {
        let filter = ClusterAntiAffinityFilter::new(client(store()));
        let result = filter
            .filter(&clustered("desc-web"), &ctx("g1"), candidate_map(["A"]))
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
    }
}
