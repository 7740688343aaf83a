//! Bin-pack: fill the busiest host that still has headroom.

use std::collections::BTreeMap;

use async_trait::async_trait;
use corral_inventory::{HostId, HostState, PlacementPolicy, WorkloadDescription};
use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::client::InventoryClient;
use crate::config::PlacementConfig;
use crate::constraint::AffinityConstraint;
use crate::context::PlacementContext;
use crate::error::{PlacementError, PlacementResult};
use crate::filter::HostFilter;
use crate::selection::CandidateMap;

pub struct BinpackFilter {
    inventory: InventoryClient,
    memory_floor_bytes: u64,
    memory_used_metric: String,
    reservation_prefix: String,
}

impl BinpackFilter {
    pub fn new(inventory: InventoryClient, config: &PlacementConfig) -> Self {
        Self {
            inventory,
            memory_floor_bytes: config.binpack_memory_floor_bytes,
            memory_used_metric: config.memory_used_metric.clone(),
            reservation_prefix: config.reservation_task_prefix.clone(),
        }
    }

    /// Available memory of a host, or `None` when it cannot be measured.
    ///
    /// Failures are tolerated here: the host is left out of the comparison.
    async fn available_memory(&self, host_id: &str) -> Option<u64> {
        let lookup = async {
            tokio::try_join!(
                self.inventory.get::<HostState>(host_id),
                self.inventory.metric(host_id, &self.memory_used_metric),
            )
        };
        match lookup.await {
            Ok((Some(host), Some(used))) => {
                let used = used.value.max(0.0) as u64;
                Some(host.total_memory_bytes.saturating_sub(used))
            }
            Ok(_) => {
                debug!(host = %host_id, "no memory stats for host");
                None
            }
            Err(e) => {
                warn!(host = %host_id, error = %e, "memory stats query failed, excluding host");
                None
            }
        }
    }
}

/// First host, from least to most available memory, that clears `floor`.
pub(crate) fn pick_binpack(mut measured: Vec<(HostId, u64)>, floor: u64) -> Option<HostId> {
    measured.sort_by_key(|(_, available)| *available);
    measured
        .into_iter()
        .find(|(_, available)| *available > floor)
        .map(|(id, _)| id)
}

#[async_trait]
impl HostFilter for BinpackFilter {
    fn name(&self) -> &'static str {
        "binpack"
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
        if self.inventory.policy(pool).await? != PlacementPolicy::Binpack {
            return Ok(candidates);
        }

        let measurements = join_all(candidates.keys().map(|host_id| async move {
            (host_id.clone(), self.available_memory(host_id).await)
        }))
        .await;
        let measured: Vec<(HostId, u64)> = measurements
            .into_iter()
            .filter_map(|(id, available)| available.map(|a| (id, a)))
            .collect();

        if measured.is_empty() {
            info!(pool = %pool, "no host reported memory stats, skipping bin-pack");
            return Ok(candidates);
        }

        let chosen = pick_binpack(measured, self.memory_floor_bytes).ok_or_else(|| {
            PlacementError::violation(
                "all hosts overloaded",
                [format!("binpack floor {} bytes", self.memory_floor_bytes)],
                ctx,
            )
        })?;
        info!(host = %chosen, pool = %pool, "bin-pack selected host");
        candidates.retain(|id, _| *id == chosen);
        Ok(candidates)
    }
}
