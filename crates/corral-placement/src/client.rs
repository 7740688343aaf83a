//! Inventory access with expirations and paging.
//!
//! Every call the filters make goes through [`InventoryClient`], which bounds
//! each gateway call by the configured query timeout and drains paged
//! queries into typed lists.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use corral_inventory::{
    Criteria, Document, InventoryError, InventoryGateway, InventoryResult, MetricSample,
    PlacementPolicy,
};
use tracing::debug;

use crate::config::PlacementConfig;
use crate::error::{PlacementError, PlacementResult};

/// Shared handle to the inventory gateway.
#[derive(Clone)]
pub struct InventoryClient {
    gateway: Arc<dyn InventoryGateway>,
    timeout: Duration,
    page_limit: usize,
}

impl InventoryClient {
    pub fn new(gateway: Arc<dyn InventoryGateway>, config: &PlacementConfig) -> Self {
        Self {
            gateway,
            timeout: config.query_timeout(),
            page_limit: config.page_limit.max(1),
        }
    }

    /// Run one gateway call under the query expiration.
    async fn bounded<T, F>(&self, what: impl FnOnce() -> String, call: F) -> PlacementResult<T>
    where
        F: Future<Output = InventoryResult<T>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(PlacementError::QueryTimeout {
                what: what(),
                timeout: self.timeout,
            }),
        }
    }

    /// All documents of type `T` matching `criteria`, across pages.
    pub async fn query<T: Document>(&self, criteria: &Criteria) -> PlacementResult<Vec<T>> {
        let mut results = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self
                .bounded(
                    || format!("query {}", T::KIND),
                    self.gateway
                        .query_page(T::KIND, criteria, self.page_limit, cursor.as_deref()),
                )
                .await?;
            for record in &page.records {
                results.push(record.decode::<T>()?);
            }
            match page.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        debug!(kind = %T::KIND, count = results.len(), "query drained");
        Ok(results)
    }

    /// Number of documents of type `T` matching `criteria`.
    pub async fn count<T: Document>(&self, criteria: &Criteria) -> PlacementResult<usize> {
        Ok(self.query::<T>(criteria).await?.len())
    }

    /// Point lookup of a document.
    pub async fn get<T: Document>(&self, id: &str) -> PlacementResult<Option<T>> {
        let record = self
            .bounded(
                || format!("get {} {id}", T::KIND),
                self.gateway.get_resource(T::KIND, id),
            )
            .await?;
        record.map(|r| r.decode::<T>()).transpose().map_err(Into::into)
    }

    /// Point lookup of a document that must exist.
    pub async fn require<T: Document>(&self, id: &str) -> PlacementResult<T> {
        self.get::<T>(id)
            .await?
            .ok_or_else(|| {
                InventoryError::NotFound {
                    kind: T::KIND,
                    id: id.to_string(),
                }
                .into()
            })
    }

    pub async fn metric(
        &self,
        resource_id: &str,
        metric_name: &str,
    ) -> PlacementResult<Option<MetricSample>> {
        self.bounded(
            || format!("metric {metric_name} of {resource_id}"),
            self.gateway.get_metric(resource_id, metric_name),
        )
        .await
    }

    pub async fn policy(&self, resource_pool_id: &str) -> PlacementResult<PlacementPolicy> {
        self.bounded(
            || format!("placement policy of {resource_pool_id}"),
            self.gateway.get_placement_policy(resource_pool_id),
        )
        .await
    }
}
