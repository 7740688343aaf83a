//! Place a load balancer near its backends and on its networks.

use std::collections::BTreeMap;

use async_trait::async_trait;
use corral_inventory::{
    Criteria, HostState, LoadBalancerSpec, NetworkState, PlacedInstance, WorkloadDescription,
};
use futures_util::future::join_all;
use tracing::{debug, info};

use crate::client::InventoryClient;
use crate::constraint::{AffinityConstraint, ConstraintStrength};
use crate::context::PlacementContext;
use crate::error::{PlacementError, PlacementResult};
use crate::filter::HostFilter;
use crate::selection::{CandidateMap, DescName};
use crate::topology;

pub struct LoadBalancerAffinityFilter {
    inventory: InventoryClient,
}

impl LoadBalancerAffinityFilter {
    pub fn new(inventory: InventoryClient) -> Self {
        Self { inventory }
    }

    /// Prefer hosts already running a backend of this placement group.
    async fn backend_affinity(
        &self,
        spec: &LoadBalancerSpec,
        ctx: &PlacementContext,
        mut candidates: CandidateMap,
    ) -> PlacementResult<CandidateMap> {
        if spec.backend_names.is_empty() {
            return Ok(candidates);
        }
        let criteria = Criteria::new().one_of("name", spec.backend_names.iter().map(String::as_str));
        let backends: BTreeMap<String, DescName> = self
            .inventory
            .query::<WorkloadDescription>(&criteria)
            .await?
            .iter()
            .map(|d| (d.id.clone(), DescName::from_description(d)))
            .collect();
        if backends.is_empty() {
            return Err(PlacementError::violation(
                "no descriptions found for load balancer backends",
                spec.backend_names.iter().cloned(),
                ctx,
            ));
        }

        let criteria = Criteria::new()
            .eq("placement_group_id", ctx.placement_group_id.as_str())
            .one_of("description_link", backends.keys().map(String::as_str))
            .one_of("host_id", candidates.keys().map(String::as_str));
        let placed = self.inventory.query::<PlacedInstance>(&criteria).await?;
        if placed.is_empty() {
            debug!("no backends placed yet");
            return Ok(candidates);
        }

        for instance in &placed {
            if let (Some(selection), Some(backend)) = (
                candidates.get_mut(&instance.host_id),
                backends.get(&instance.description_link),
            ) {
                let mut found = backend.clone();
                found.add_resource_name(instance.name.clone());
                selection.add_description(found);
            }
        }
        candidates.retain(|id, _| placed.iter().any(|i| i.host_id == *id));
        Ok(candidates)
    }

    /// Keep hosts connected to at least one of the balancer's networks.
    async fn network_affinity(
        &self,
        spec: &LoadBalancerSpec,
        ctx: &PlacementContext,
        mut candidates: CandidateMap,
    ) -> PlacementResult<CandidateMap> {
        if spec.network_names.is_empty() {
            return Ok(candidates);
        }
        let criteria = Criteria::new().one_of("name", spec.network_names.iter().map(String::as_str));
        let networks = self.inventory.query::<NetworkState>(&criteria).await?;
        if networks.is_empty() {
            return Err(PlacementError::violation(
                "load balancer networks not found",
                spec.network_names.iter().cloned(),
                ctx,
            ));
        }

        let connected = join_all(candidates.keys().map(|host_id| {
            let networks = &networks;
            async move {
                let reachable = match self.inventory.get::<HostState>(host_id).await? {
                    Some(host) => topology::host_networks(&self.inventory, &host).await?,
                    None => Default::default(),
                };
                let connected = networks.iter().any(|n| reachable.contains(&n.id));
                PlacementResult::Ok((host_id.clone(), connected))
            }
        }))
        .await
        .into_iter()
        .collect::<PlacementResult<Vec<_>>>()?;

        candidates.retain(|id, _| connected.iter().any(|(h, ok)| *ok && h == id));
        if candidates.is_empty() {
            return Err(PlacementError::violation(
                "no candidate host is connected to the load balancer networks",
                spec.network_names.iter().cloned(),
                ctx,
            ));
        }
        Ok(candidates)
    }
}

#[async_trait]
impl HostFilter for LoadBalancerAffinityFilter {
    fn name(&self) -> &'static str {
        "load-balancer-affinity"
    }

    fn is_active(&self, desc: &WorkloadDescription, _ctx: &PlacementContext) -> bool {
        desc.load_balancer.is_some()
    }

    fn affinity_constraints(
        &self,
        desc: &WorkloadDescription,
    ) -> BTreeMap<String, AffinityConstraint> {
        let Some(spec) = &desc.load_balancer else {
            return BTreeMap::new();
        };
        let backends = spec
            .backend_names
            .iter()
            .map(|name| AffinityConstraint::affinity(name, ConstraintStrength::Soft));
        let networks = spec
            .network_names
            .iter()
            .map(|name| AffinityConstraint::affinity(name, ConstraintStrength::Hard));
        backends
            .chain(networks)
            .map(|c| (c.name.clone(), c))
            .collect()
    }

    async fn filter(
        &self,
        desc: &WorkloadDescription,
        ctx: &PlacementContext,
        candidates: CandidateMap,
    ) -> PlacementResult<CandidateMap> {
        let Some(spec) = &desc.load_balancer else {
            return Ok(candidates);
        };
        let candidates = self.backend_affinity(spec, ctx, candidates).await?;
        let candidates = self.network_affinity(spec, ctx, candidates).await?;
        info!(
            description = %desc.name,
            hosts = ?candidates.keys().collect::<Vec<_>>(),
            "load balancer placement narrowed"
        );
        Ok(candidates)
    }
}
