//! Fixtures shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use corral_inventory::*;

use crate::client::InventoryClient;
use crate::config::PlacementConfig;
use crate::context::PlacementContext;

pub const GIB: u64 = 1024 * 1024 * 1024;

pub fn store() -> InventoryStore {
    InventoryStore::open_in_memory().unwrap()
}

pub fn client(store: InventoryStore) -> InventoryClient {
    InventoryClient::new(Arc::new(store), &PlacementConfig::default())
}

/// Client over a faulty gateway with a short query expiration.
pub fn faulty_client(gateway: FaultyGateway) -> InventoryClient {
    InventoryClient::new(Arc::new(gateway), &short_timeouts())
}

pub fn short_timeouts() -> PlacementConfig {
    PlacementConfig {
        query_timeout_ms: 20,
        ..PlacementConfig::default()
    }
}

pub const SLOW: Duration = Duration::from_millis(250);

pub fn ctx(group: &str) -> PlacementContext {
    PlacementContext::new(group, vec!["pool-1".to_string()])
}

pub fn host(id: &str) -> HostState {
    HostState {
        id: id.to_string(),
        name: format!("{id}.local"),
        endpoint_id: "endpoint-1".to_string(),
        resource_pool_ids: vec!["pool-1".to_string()],
        total_memory_bytes: 16 * GIB,
        ..HostState::default()
    }
}

pub fn description(id: &str, name: &str) -> WorkloadDescription {
    WorkloadDescription {
        id: id.to_string(),
        name: name.to_string(),
        ..WorkloadDescription::default()
    }
}

pub fn instance(id: &str, description_link: &str, host_id: &str, group: &str) -> PlacedInstance {
    PlacedInstance {
        id: id.to_string(),
        name: format!("{id}-name"),
        description_link: description_link.to_string(),
        host_id: host_id.to_string(),
        placement_group_id: group.to_string(),
    }
}

/// Wraps a store and injects failures or latency per resource id, and per
/// record kind for queries.
pub struct FaultyGateway {
    inner: InventoryStore,
    failing_metrics: HashSet<String>,
    failing_resources: HashSet<String>,
    failing_queries: HashSet<RecordKind>,
    delays: HashMap<String, Duration>,
    query_delays: HashMap<RecordKind, Duration>,
}

impl FaultyGateway {
    pub fn new(inner: InventoryStore) -> Self {
        Self {
            inner,
            failing_metrics: HashSet::new(),
            failing_resources: HashSet::new(),
            failing_queries: HashSet::new(),
            delays: HashMap::new(),
            query_delays: HashMap::new(),
        }
    }

    pub fn fail_metrics_for(mut self, resource_id: &str) -> Self {
        self.failing_metrics.insert(resource_id.to_string());
        self
    }

    pub fn fail_resource(mut self, id: &str) -> Self {
        self.failing_resources.insert(id.to_string());
        self
    }

    pub fn fail_queries(mut self, kind: RecordKind) -> Self {
        self.failing_queries.insert(kind);
        self
    }

    pub fn delay_queries(mut self, kind: RecordKind, delay: Duration) -> Self {
        self.query_delays.insert(kind, delay);
        self
    }

    /// Delay point lookups and metric reads of `resource_id`.
    pub fn delay(mut self, resource_id: &str, delay: Duration) -> Self {
        self.delays.insert(resource_id.to_string(), delay);
        self
    }

    async fn maybe_delay(&self, resource_id: &str) {
        if let Some(delay) = self.delays.get(resource_id) {
            tokio::time::sleep(*delay).await;
        }
    }
}

#[async_trait]
impl InventoryGateway for FaultyGateway {
    async fn query_page(
        &self,
        kind: RecordKind,
        criteria: &Criteria,
        page_limit: usize,
        cursor: Option<&str>,
    ) -> InventoryResult<Page> {
        if let Some(delay) = self.query_delays.get(&kind) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing_queries.contains(&kind) {
            return Err(InventoryError::Unavailable(format!("query {kind}")));
        }
        self.inner.query_page(kind, criteria, page_limit, cursor).await
    }

    async fn get_resource(&self, kind: RecordKind, id: &str) -> InventoryResult<Option<Record>> {
        self.maybe_delay(id).await;
        if self.failing_resources.contains(id) {
            return Err(InventoryError::Unavailable(format!("{kind} {id}")));
        }
        self.inner.get_resource(kind, id).await
    }

    async fn get_metric(
        &self,
        resource_id: &str,
        metric_name: &str,
    ) -> InventoryResult<Option<MetricSample>> {
        self.maybe_delay(resource_id).await;
        if self.failing_metrics.contains(resource_id) {
            return Err(InventoryError::Unavailable(format!(
                "metric {metric_name} of {resource_id}"
            )));
        }
        self.inner.get_metric(resource_id, metric_name).await
    }

    async fn get_placement_policy(
        &self,
        resource_pool_id: &str,
    ) -> InventoryResult<PlacementPolicy> {
        self.inner.get_placement_policy(resource_pool_id).await
    }
}
