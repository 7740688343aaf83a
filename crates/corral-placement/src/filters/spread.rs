//! Spread: place on the host with the fewest resources.

use std::collections::BTreeMap;

use async_trait::async_trait;
use corral_inventory::{Criteria, PlacedInstance, PlacementPolicy, WorkloadDescription};
use futures_util::future::join_all;
use tracing::{debug, info};

use crate::client::InventoryClient;
use crate::config::PlacementConfig;
use crate::constraint::AffinityConstraint;
use crate::context::PlacementContext;
use crate::error::PlacementResult;
use crate::filter::HostFilter;
use crate::selection::CandidateMap;

pub struct SpreadFilter {
    inventory: InventoryClient,
    reservation_prefix: String,
}

impl SpreadFilter {
    pub fn new(inventory: InventoryClient, config: &PlacementConfig) -> Self {
        Self {
            inventory,
            reservation_prefix: config.reservation_task_prefix.clone(),
        }
    }
}

#[async_trait]
impl HostFilter for SpreadFilter {
    fn name(&self) -> &'static str {
        "spread"
    }

    fn is_active(&self, _desc: &WorkloadDescription, _ctx: &PlacementContext) -> bool {
        true
    }

    fn affinity_constraints(
        &self,
        _desc: &WorkloadDescription,
    ) -> BTreeMap<String, AffinityConstraint> {
        BTreeMap::new()
    }

    async fn filter(
        &self,
        _desc: &WorkloadDescription,
        ctx: &PlacementContext,
        mut candidates: CandidateMap,
    ) -> PlacementResult<CandidateMap> {
        if candidates.len() <= 1 || ctx.is_reservation(&self.reservation_prefix) {
            return Ok(candidates);
        }
        let Some(pool) = ctx.primary_pool() else {
            return Ok(candidates);
        };
        if self.inventory.policy(pool).await? != PlacementPolicy::Spread {
            return Ok(candidates);
        }

        // Counts every placed resource on the host, whatever its group.
        let counts = join_all(candidates.keys().map(|host_id| async move {
            let criteria = Criteria::new().eq("host_id", host_id.as_str());
            let count = self.inventory.count::<PlacedInstance>(&criteria).await?;
            PlacementResult::Ok((host_id.clone(), count))
        }))
        .await
        .into_iter()
        .collect::<PlacementResult<Vec<_>>>()?;

        for (host_id, count) in &counts {
            debug!(host = %host_id, resources = count, "host load");
        }

        // min_by_key returns the first minimum, so ties keep candidate order.
        let Some((chosen, count)) = counts.into_iter().min_by_key(|(_, count)| *count) else {
            return Ok(candidates);
        };
        info!(host = %chosen, resources = count, pool = %pool, "spread selected host");
        candidates.retain(|id, _| *id == chosen);
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::candidate_map;
    use crate::testkit::*;
    use corral_inventory::InventoryStore;

    fn placed(store: &InventoryStore, host_id: &str, n: usize) {
        for i in 0..n {
            let group = format!("g{i}");
            store
                .put(&instance(&format!("{host_id}-{i}"), "desc-any", host_id, &group))
                .unwrap();
        }
    }

    fn filter(store: InventoryStore) -> SpreadFilter {
        SpreadFilter::new(client(store), &PlacementConfig::default())
    }

    #[tokio::test]
    async fn selects_least_loaded_host() {
        let store = store();
        store.put_policy("pool-1", PlacementPolicy::Spread).unwrap();
        placed(&store, "A", 4);
        placed(&store, "B", 1);
        placed(&store, "C", 7);

        let result = filter(store)
            .filter(&description("d", "web"), &ctx("g1"), candidate_map(["A", "B", "C"]))
            .await
            .unwrap();
        let keys: Vec<&str> = result.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["B"]);
    }

    #[tokio::test]
    async fn ties_keep_candidate_order() {
        let store = store();
        store.put_policy("pool-1", PlacementPolicy::Spread).unwrap();
        placed(&store, "A", 2);

        let result = filter(store)
            .filter(&description("d", "web"), &ctx("g1"), candidate_map(["A", "C", "B"]))
            .await
            .unwrap();
        let keys: Vec<&str> = result.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["C"]);
    }

    #[tokio::test]
    async fn binpack_policy_passes_through() {
        let store = store();
        store.put_policy("pool-1", PlacementPolicy::Binpack).unwrap();
        placed(&store, "A", 3);

        let result = filter(store)
            .filter(&description("d", "web"), &ctx("g1"), candidate_map(["A", "B"]))
            .await
            .unwrap();
        assert_eq!(result.len(), 2);
    }

    #[tokio::test]
    async fn reservation_time_is_a_no_op() {
        let store = store();
        store.put_policy("pool-1", PlacementPolicy::Spread).unwrap();
        let ctx = ctx("g1").with_callback_ref("/requests/reservation-tasks/r9");

        let result = filter(store)
            .filter(&description("d", "web"), &ctx, candidate_map(["A", "B"]))
            .await
            .unwrap();
        assert_eq!(result.len(), 2);
    }
}
