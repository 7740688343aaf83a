//! Keep the largest group of hosts that share a network.
//!
//! Host → network memberships are inverted into network → hosts. The biggest
//! group wins; ties are broken by the placement group digest over groups
//! sorted by network id, so sibling descriptions of one placement choose the
//! same group.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use corral_inventory::{HostId, HostState, NetworkType, WorkloadDescription};
use futures_util::future::join_all;
use tracing::{debug, info};

use crate::client::InventoryClient;
use crate::constraint::{AffinityConstraint, ConstraintStrength};
use crate::context::PlacementContext;
use crate::error::{PlacementError, PlacementResult};
use crate::filter::HostFilter;
use crate::selection::CandidateMap;
use crate::topology;

pub struct NetworkFilter {
    inventory: InventoryClient,
}

impl NetworkFilter {
    pub fn new(inventory: InventoryClient) -> Self {
        Self { inventory }
    }

    async fn networks_of(&self, host_id: &str) -> PlacementResult<BTreeSet<String>> {
        match self.inventory.get::<HostState>(host_id).await? {
            Some(host) => topology::host_networks(&self.inventory, &host).await,
            None => {
                debug!(host = %host_id, "host record missing, no networks");
                Ok(BTreeSet::new())
            }
        }
    }
}

/// Invert host → networks into network → hosts, keeping candidate order
/// within each group.
pub(crate) fn group_by_network(
    memberships: Vec<(HostId, BTreeSet<String>)>,
) -> BTreeMap<String, Vec<HostId>> {
    let mut groups: BTreeMap<String, Vec<HostId>> = BTreeMap::new();
    for (host_id, networks) in memberships {
        for network in networks {
            groups.entry(network).or_default().push(host_id.clone());
        }
    }
    groups
}

/// The largest group; `tie_break` picks among equally large groups, which
/// are offered in network id order.
pub(crate) fn largest_group(
    groups: &BTreeMap<String, Vec<HostId>>,
    tie_break: impl FnOnce(usize) -> usize,
) -> Option<(&String, &Vec<HostId>)> {
    let largest = groups.values().map(Vec::len).max()?;
    let tied: Vec<(&String, &Vec<HostId>)> =
        groups.iter().filter(|(_, hosts)| hosts.len() == largest).collect();
    let index = tie_break(tied.len()).min(tied.len() - 1);
    tied.get(index).copied()
}

#[async_trait]
impl HostFilter for NetworkFilter {
    fn name(&self) -> &'static str {
        "network"
    }

    fn is_active(&self, desc: &WorkloadDescription, _ctx: &PlacementContext) -> bool {
        !desc.network_interfaces.is_empty()
    }

    fn affinity_constraints(
        &self,
        desc: &WorkloadDescription,
    ) -> BTreeMap<String, AffinityConstraint> {
        desc.network_interfaces
            .iter()
            .map(|nic| {
                let c = AffinityConstraint::affinity(&nic.network_name, ConstraintStrength::Hard);
                (c.name.clone(), c)
            })
            .collect()
    }

    async fn filter(
        &self,
        desc: &WorkloadDescription,
        ctx: &PlacementContext,
        mut candidates: CandidateMap,
    ) -> PlacementResult<CandidateMap> {
        let lookups = candidates.keys().map(|host_id| async move {
            let networks = self.networks_of(host_id).await?;
            PlacementResult::Ok((host_id.clone(), networks))
        });
        let memberships = join_all(lookups)
            .await
            .into_iter()
            .collect::<PlacementResult<Vec<_>>>()?;

        let groups = group_by_network(memberships);
        debug!(groups = groups.len(), "hosts grouped by network");

        let Some((network, hosts)) = largest_group(&groups, |n| ctx.tie_break_index(n)) else {
            let isolated = desc
                .network_interfaces
                .iter()
                .any(|nic| nic.network_type == NetworkType::Isolated);
            if isolated {
                info!(description = %desc.name, "isolated network requested, keeping all hosts");
                return Ok(candidates);
            }
            return Err(PlacementError::violation(
                "no candidate host is connected to a network",
                desc.network_interfaces.iter().map(|nic| nic.network_name.clone()),
                ctx,
            ));
        };

        info!(
            network = %network,
            hosts = hosts.len(),
            placement_group = %ctx.placement_group_id,
            "selected network group"
        );
        candidates.retain(|id, _| hosts.contains(id));
        Ok(candidates)
    }
}
