//! The inventory capability the placement core depends on.

use async_trait::async_trait;

use crate::error::InventoryResult;
use crate::query::{Criteria, Page};
use crate::types::{MetricSample, PlacementPolicy, Record, RecordKind};

/// Asynchronous access to the inventory substrate.
///
/// Implementations must tolerate arbitrarily many outstanding calls from
/// unrelated placements; each call is independent.
#[async_trait]
pub trait InventoryGateway: Send + Sync {
    /// Fetch one page of records of `kind` matching `criteria`.
    ///
    /// `cursor` is the `next` value of the previous page, `None` for the first.
    async fn query_page(
        &self,
        kind: RecordKind,
        criteria: &Criteria,
        page_limit: usize,
        cursor: Option<&str>,
    ) -> InventoryResult<Page>;

    /// Point lookup of a single record.
    async fn get_resource(&self, kind: RecordKind, id: &str) -> InventoryResult<Option<Record>>;

    /// Most recent sample of `metric_name` for a resource.
    async fn get_metric(
        &self,
        resource_id: &str,
        metric_name: &str,
    ) -> InventoryResult<Option<MetricSample>>;

    /// Load policy configured for a resource pool.
    async fn get_placement_policy(&self, resource_pool_id: &str)
    -> InventoryResult<PlacementPolicy>;
}
