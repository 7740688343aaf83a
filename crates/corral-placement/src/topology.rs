//! Host connectivity lookups shared by the network, storage, and
//! load-balancer filters.
//!
//! Some adapters precompute a host's networks and datastores as resource
//! group links (`/resources/groups/network-*`, `/resources/groups/datastore-*`)
//! whose target is the subnet or datastore. When a host carries no such
//! links, connectivity falls back to matching its region and zone.

use std::collections::BTreeSet;

use corral_inventory::{
    Criteria, DatastoreState, HostState, ResourceGroupState, SubnetState,
};
use futures_util::future::join_all;
use tracing::debug;

use crate::client::InventoryClient;
use crate::error::PlacementResult;

pub const RESOURCE_GROUPS_PATH: &str = "/resources/groups";
pub const NETWORK_GROUP_PREFIX: &str = "network";
pub const DATASTORE_GROUP_PREFIX: &str = "datastore";

fn group_links<'a>(host: &'a HostState, prefix: &str) -> Vec<&'a str> {
    let marker = format!("{RESOURCE_GROUPS_PATH}/{prefix}");
    host.group_links
        .iter()
        .filter(|link| link.contains(&marker))
        .map(String::as_str)
        .collect()
}

/// Resolve resource group links to their target links, skipping groups
/// without a target.
async fn group_targets(client: &InventoryClient, links: &[&str]) -> PlacementResult<Vec<String>> {
    let groups = join_all(links.iter().map(|link| client.get::<ResourceGroupState>(link))).await;
    let mut targets = Vec::new();
    for group in groups {
        if let Some(target) = group?.and_then(|g| g.target_link) {
            targets.push(target);
        }
    }
    Ok(targets)
}

/// Network identifiers a host is connected to.
///
/// A subnet that belongs to a network contributes the network id; a
/// standalone subnet contributes its own id.
pub async fn host_networks(
    client: &InventoryClient,
    host: &HostState,
) -> PlacementResult<BTreeSet<String>> {
    let links = group_links(host, NETWORK_GROUP_PREFIX);
    let subnets: Vec<SubnetState> = if links.is_empty() {
        let mut criteria = Criteria::new();
        if let Some(region) = &host.region_id {
            criteria = criteria.eq("region_id", region.as_str());
        }
        if let Some(zone) = &host.zone_id {
            criteria = criteria.eq("zone_id", zone.as_str());
        }
        client.query::<SubnetState>(&criteria).await?
    } else {
        let targets = group_targets(client, &links).await?;
        let fetched = join_all(targets.iter().map(|id| client.get::<SubnetState>(id))).await;
        let mut subnets = Vec::new();
        for subnet in fetched {
            subnets.extend(subnet?);
        }
        subnets
    };

    let networks: BTreeSet<String> = subnets
        .into_iter()
        .map(|s| s.network_id.unwrap_or(s.id))
        .collect();
    debug!(host = %host.id, networks = networks.len(), "resolved host networks");
    Ok(networks)
}

/// Datastores a host can allocate disks on.
pub async fn host_datastores(
    client: &InventoryClient,
    host: &HostState,
) -> PlacementResult<Vec<DatastoreState>> {
    let links = group_links(host, DATASTORE_GROUP_PREFIX);
    if links.is_empty() {
        let mut criteria = Criteria::new().eq("endpoint_id", host.endpoint_id.as_str());
        if let Some(region) = &host.region_id {
            criteria = criteria.eq("region_id", region.as_str());
        }
        return client.query::<DatastoreState>(&criteria).await;
    }

    let targets = group_targets(client, &links).await?;
    let fetched = join_all(targets.iter().map(|id| client.get::<DatastoreState>(id))).await;
    let mut datastores = Vec::new();
    for datastore in fetched {
        datastores.extend(datastore?);
    }
    Ok(datastores)
}
