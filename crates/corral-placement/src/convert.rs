//! Building the initial candidate map from inventory records.

use std::collections::BTreeMap;

use corral_inventory::{Criteria, HostState};
use futures_util::future::join_all;
use tracing::debug;

use crate::client::InventoryClient;
use crate::error::PlacementResult;
use crate::selection::{CandidateMap, candidate_map};

/// Candidate map over `hosts`, in the order given.
pub fn candidates_from_hosts(hosts: &[HostState]) -> CandidateMap {
    candidate_map(hosts.iter().map(|h| h.id.clone()))
}

/// Hosts belonging to any of `resource_pool_ids`, in host id order.
pub async fn candidates_from_pools(
    inventory: &InventoryClient,
    resource_pool_ids: &[String],
) -> PlacementResult<CandidateMap> {
    let per_pool = join_all(resource_pool_ids.iter().map(|pool| {
        let criteria = Criteria::new().contains("resource_pool_ids", pool.as_str());
        async move { inventory.query::<HostState>(&criteria).await }
    }))
    .await;

    let mut hosts: BTreeMap<String, HostState> = BTreeMap::new();
    for found in per_pool {
        for host in found? {
            hosts.entry(host.id.clone()).or_insert(host);
        }
    }
    debug!(pools = resource_pool_ids.len(), hosts = hosts.len(), "candidate hosts loaded");
    Ok(candidate_map(hosts.into_keys()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::*;

    #[test]
    fn keeps_host_order() {
        let map = candidates_from_hosts(&[host("h2"), host("h1")]);
        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["h2", "h1"]);
    }

    #[tokio::test]
    async fn merges_pools_without_duplicates() {
        let store = store();
        let mut shared = host("h3");
        shared.resource_pool_ids = vec!["pool-1".to_string(), "pool-2".to_string()];
        let mut other = host("h2");
        other.resource_pool_ids = vec!["pool-2".to_string()];
        let mut outside = host("h4");
        outside.resource_pool_ids = vec!["pool-9".to_string()];
        store.put(&host("h1")).unwrap();
        store.put(&other).unwrap();
        store.put(&shared).unwrap();
        store.put(&outside).unwrap();

        let pools = vec!["pool-1".to_string(), "pool-2".to_string()];
        let map = candidates_from_pools(&client(store), &pools).await.unwrap();
        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["h1", "h2", "h3"]);
    }
}
