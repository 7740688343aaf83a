//! Volume affinity: place workloads where the volumes they mount live.
//!
//! [`NamedVolumeAffinityFilter`] pins a workload to the hosts of the
//! external volumes it mounts, requires hosts to support the drivers of the
//! volumes provisioned for the placement group, and keeps every resource
//! sharing a local volume on one host. [`ClusterLocalAffinityFilter`] keeps
//! the members of a cluster with local volumes together on one host.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use corral_inventory::{
    Criteria, HostId, HostState, LOCAL_VOLUME_DRIVER, PlacedInstance, VolumeState,
    WorkloadDescription,
};
use futures_util::future::join_all;
use tracing::{debug, info};

use crate::client::InventoryClient;
use crate::config::PlacementConfig;
use crate::constraint::{AffinityConstraint, ConstraintStrength};
use crate::context::PlacementContext;
use crate::error::{PlacementError, PlacementResult};
use crate::filter::HostFilter;
use crate::selection::CandidateMap;

/// The volume named by a mount, if its source is not a host path.
fn volume_name(mount: &str) -> Option<&str> {
    let source = mount.split_once(":/").map_or(mount, |(source, _)| source);
    if source.is_empty() || source.starts_with(['/', '~', '.']) {
        return None;
    }
    Some(source)
}

/// Named volumes mounted by `desc`, in declaration order.
pub(crate) fn volume_names(desc: &WorkloadDescription) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for name in desc.volumes.iter().filter_map(|mount| volume_name(mount)) {
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

pub struct NamedVolumeAffinityFilter {
    inventory: InventoryClient,
}

impl NamedVolumeAffinityFilter {
    pub fn new(inventory: InventoryClient) -> Self {
        Self { inventory }
    }

    /// Restrict candidates to the hosts of the external volumes among
    /// `names`, choosing one volume per name when several share it. Returns
    /// the names that were resolved as external.
    async fn pin_to_external_volumes(
        &self,
        ctx: &PlacementContext,
        names: &[String],
        candidates: &mut CandidateMap,
    ) -> PlacementResult<BTreeSet<String>> {
        let criteria = Criteria::new()
            .one_of("name", names.iter().map(String::as_str))
            .eq("external", true);
        let external = self.inventory.query::<VolumeState>(&criteria).await?;

        let mut by_name: BTreeMap<String, Vec<VolumeState>> = BTreeMap::new();
        for volume in external {
            by_name.entry(volume.name.clone()).or_default().push(volume);
        }
        if by_name.is_empty() {
            return Ok(BTreeSet::new());
        }

        // Every workload of the placement group picks the same volume.
        let mut hosts: BTreeSet<&str> = BTreeSet::new();
        for volumes in by_name.values() {
            let chosen = &volumes[ctx.tie_break_index(volumes.len())];
            debug!(volume = %chosen.name, id = %chosen.id, "external volume chosen");
            hosts.extend(chosen.host_ids.iter().map(String::as_str));
        }
        candidates.retain(|id, _| hosts.contains(id.as_str()));
        if candidates.is_empty() {
            return Err(PlacementError::violation(
                "no candidate host holds the external volumes",
                by_name.into_keys(),
                ctx,
            ));
        }
        Ok(by_name.into_keys().collect())
    }

    async fn supported_drivers(&self, host_id: &str) -> PlacementResult<Vec<String>> {
        Ok(self
            .inventory
            .get::<HostState>(host_id)
            .await?
            .map(|host| host.volume_drivers)
            .unwrap_or_default())
    }

    /// Hosts of placed resources in the placement group whose descriptions
    /// mount any of the local volumes in `names`.
    async fn local_volume_hosts(
        &self,
        ctx: &PlacementContext,
        names: &BTreeSet<String>,
    ) -> PlacementResult<BTreeSet<HostId>> {
        let queries = names.iter().map(|name| {
            let criteria = Criteria::new().any_item_contains("volumes", name);
            async move { self.inventory.query::<WorkloadDescription>(&criteria).await }
        });
        let mut sharing: BTreeSet<String> = BTreeSet::new();
        for found in join_all(queries).await {
            // The substring query over-matches; keep exact volume names.
            for desc in found? {
                if volume_names(&desc).iter().any(|n| names.contains(n)) {
                    sharing.insert(desc.id);
                }
            }
        }
        if sharing.is_empty() {
            return Ok(BTreeSet::new());
        }

        let criteria = Criteria::new()
            .eq("placement_group_id", ctx.placement_group_id.as_str())
            .one_of("description_link", sharing.iter().map(String::as_str));
        let placed = self.inventory.query::<PlacedInstance>(&criteria).await?;
        Ok(placed.into_iter().map(|instance| instance.host_id).collect())
    }
}

#[async_trait]
impl HostFilter for NamedVolumeAffinityFilter {
    fn name(&self) -> &'static str {
        "named-volume-affinity"
    }

    fn is_active(&self, desc: &WorkloadDescription, _ctx: &PlacementContext) -> bool {
        !volume_names(desc).is_empty()
    }

    fn affinity_constraints(
        &self,
        desc: &WorkloadDescription,
    ) -> BTreeMap<String, AffinityConstraint> {
        volume_names(desc)
            .into_iter()
            .map(|name| {
                let c = AffinityConstraint::affinity(&name, ConstraintStrength::Hard);
                (name, c)
            })
            .collect()
    }

    async fn filter(
        &self,
        desc: &WorkloadDescription,
        ctx: &PlacementContext,
        mut candidates: CandidateMap,
    ) -> PlacementResult<CandidateMap> {
        let mut names = volume_names(desc);
        info!(
            description = %desc.name,
            volumes = ?names,
            placement_group = %ctx.placement_group_id,
            "named volume affinity filter active"
        );

        let external = self
            .pin_to_external_volumes(ctx, &names, &mut candidates)
            .await?;
        names.retain(|name| !external.contains(name));
        if names.is_empty() {
            return Ok(candidates);
        }

        let criteria = Criteria::new()
            .one_of("name", names.iter().map(String::as_str))
            .eq("placement_group_id", ctx.placement_group_id.as_str());
        let provisioned = self.inventory.query::<VolumeState>(&criteria).await?;
        if provisioned.is_empty() {
            debug!("no volumes provisioned for the placement group yet");
            return Ok(candidates);
        }

        let mut required: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for volume in provisioned {
            required.entry(volume.driver).or_default().insert(volume.name);
        }

        let drivers = join_all(candidates.keys().map(|host_id| async move {
            let drivers = self.supported_drivers(host_id).await?;
            PlacementResult::Ok((host_id.clone(), drivers))
        }))
        .await
        .into_iter()
        .collect::<PlacementResult<Vec<_>>>()?;
        let unsupported: Vec<HostId> = drivers
            .into_iter()
            .filter(|(_, supported)| !required.keys().all(|d| supported.contains(d)))
            .map(|(id, _)| id)
            .collect();
        candidates.retain(|id, _| !unsupported.contains(id));
        if candidates.is_empty() {
            return Err(PlacementError::violation(
                "no host supports the volume drivers",
                required.into_keys(),
                ctx,
            ));
        }

        let Some(local) = required.get(LOCAL_VOLUME_DRIVER) else {
            return Ok(candidates);
        };
        let hosts = self.local_volume_hosts(ctx, local).await?;
        let mut hosts = hosts.into_iter();
        match (hosts.next(), hosts.next()) {
            (None, _) => Ok(candidates),
            (Some(_), Some(_)) => Err(PlacementError::violation(
                "resources sharing local volumes are placed on different hosts",
                local.iter().cloned(),
                ctx,
            )),
            (Some(host), None) => {
                if !candidates.contains_key(&host) {
                    return Err(PlacementError::violation(
                        "the host of the resources sharing local volumes is not a candidate",
                        local.iter().cloned(),
                        ctx,
                    ));
                }
                info!(host = %host, "colocating with resources sharing local volumes");
                candidates.retain(|id, _| *id == host);
                Ok(candidates)
            }
        }
    }
}

pub struct ClusterLocalAffinityFilter {
    inventory: InventoryClient,
    reservation_prefix: String,
}

impl ClusterLocalAffinityFilter {
    pub fn new(inventory: InventoryClient, config: &PlacementConfig) -> Self {
        Self {
            inventory,
            reservation_prefix: config.reservation_task_prefix.clone(),
        }
    }
}

#[async_trait]
impl HostFilter for ClusterLocalAffinityFilter {
    fn name(&self) -> &'static str {
        "cluster-local-affinity"
    }

    fn is_active(&self, desc: &WorkloadDescription, _ctx: &PlacementContext) -> bool {
        desc.cluster_size.is_some_and(|size| size > 1) && !volume_names(desc).is_empty()
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
        if candidates.len() <= 1 || ctx.is_reservation(&self.reservation_prefix) {
            return Ok(candidates);
        }

        let names = volume_names(desc);
        let criteria = Criteria::new()
            .one_of("name", names.iter().map(String::as_str))
            .eq("placement_group_id", ctx.placement_group_id.as_str())
            .eq("driver", LOCAL_VOLUME_DRIVER);
        let local = self.inventory.query::<VolumeState>(&criteria).await?;
        if local.is_empty() {
            return Ok(candidates);
        }

        // Prefer a host that already holds one of the volumes.
        let holding = candidates
            .keys()
            .find(|id| local.iter().any(|v| v.host_ids.contains(*id)))
            .cloned();
        let chosen = match holding {
            Some(id) => id,
            None => {
                let index = ctx.tie_break_index(candidates.len());
                match candidates.get_index(index) {
                    Some((id, _)) => id.clone(),
                    None => return Ok(candidates),
                }
            }
        };
        info!(
            description = %desc.name,
            host = %chosen,
            volumes = local.len(),
            "keeping cluster members with local volumes together"
        );
        candidates.retain(|id, _| *id == chosen);
        Ok(candidates)
    }
}
