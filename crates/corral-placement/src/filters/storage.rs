//! Keep hosts whose datastores can hold every attached disk.
//!
//! Allocation is simulated per host: disks are taken largest first and each
//! one lands on the fullest datastore that still fits it. Endpoints that do
//! not model datastores are not checked.

use std::collections::BTreeMap;

use async_trait::async_trait;
use corral_inventory::{DiskState, EndpointState, HostState, WorkloadDescription};
use futures_util::future::join_all;
use tracing::{debug, info};

use crate::client::InventoryClient;
use crate::config::PlacementConfig;
use crate::constraint::AffinityConstraint;
use crate::context::PlacementContext;
use crate::error::{PlacementError, PlacementResult};
use crate::filter::HostFilter;
use crate::selection::CandidateMap;
use crate::topology;

pub struct StorageFilter {
    inventory: InventoryClient,
    available_metric: String,
}

impl StorageFilter {
    pub fn new(inventory: InventoryClient, config: &PlacementConfig) -> Self {
        Self {
            inventory,
            available_metric: config.storage_available_metric.clone(),
        }
    }

    /// Free bytes per datastore connected to the host; a datastore without
    /// a capacity metric is unlimited.
    async fn datastore_capacity(&self, host: &HostState) -> PlacementResult<Vec<u64>> {
        let datastores = topology::host_datastores(&self.inventory, host).await?;
        let samples = join_all(
            datastores
                .iter()
                .map(|ds| self.inventory.metric(&ds.id, &self.available_metric)),
        )
        .await;

        let mut capacity = Vec::with_capacity(samples.len());
        for sample in samples {
            capacity.push(match sample? {
                Some(s) => s.value.max(0.0) as u64,
                None => u64::MAX,
            });
        }
        Ok(capacity)
    }

    async fn host_fits(&self, host_id: &str, disks: &[u64]) -> PlacementResult<bool> {
        let host = self.inventory.require::<HostState>(host_id).await?;
        let endpoint = self.inventory.require::<EndpointState>(&host.endpoint_id).await?;
        if !endpoint.supports_datastores {
            debug!(host = %host_id, endpoint = %endpoint.id, "endpoint has no datastores, keeping host");
            return Ok(true);
        }
        let capacity = self.datastore_capacity(&host).await?;
        let fits = fits(disks, capacity);
        debug!(host = %host_id, fits, "simulated disk allocation");
        Ok(fits)
    }
}

/// Whether `disks` (sizes, largest first) can all be allocated on
/// `datastores` (free bytes), each disk consuming the tightest datastore
/// that still holds it.
pub(crate) fn fits(disks: &[u64], mut datastores: Vec<u64>) -> bool {
    for &size in disks {
        datastores.sort_unstable();
        let Some(slot) = datastores.iter_mut().find(|available| **available >= size) else {
            return false;
        };
        *slot -= size;
    }
    true
}

#[async_trait]
impl HostFilter for StorageFilter {
    fn name(&self) -> &'static str {
        "storage"
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
        desc: &WorkloadDescription,
        ctx: &PlacementContext,
        mut candidates: CandidateMap,
    ) -> PlacementResult<CandidateMap> {
        if desc.disk_links.is_empty() {
            return Ok(candidates);
        }

        let mut disks = join_all(
            desc.disk_links
                .iter()
                .map(|link| self.inventory.require::<DiskState>(link)),
        )
        .await
        .into_iter()
        .collect::<PlacementResult<Vec<_>>>()?;
        disks.sort_by_key(|d| std::cmp::Reverse(d.capacity_bytes()));
        let sizes: Vec<u64> = disks.iter().map(DiskState::capacity_bytes).collect();

        let verdicts = join_all(candidates.keys().map(|host_id| {
            let sizes = &sizes;
            async move {
                let fits = self.host_fits(host_id, sizes).await?;
                PlacementResult::Ok((host_id.clone(), fits))
            }
        }))
        .await
        .into_iter()
        .collect::<PlacementResult<Vec<_>>>()?;

        let rejected: Vec<String> = verdicts
            .into_iter()
            .filter(|(_, fits)| !fits)
            .map(|(id, _)| id)
            .collect();
        candidates.retain(|id, _| !rejected.contains(id));

        if candidates.is_empty() {
            return Err(PlacementError::violation(
                "no host has datastore capacity for every disk",
                disks.iter().map(|d| d.name.clone()),
                ctx,
            ));
        }
        info!(
            disks = disks.len(),
            rejected = rejected.len(),
            remaining = candidates.len(),
            "storage capacity checked"
        );
        Ok(candidates)
    }
}
