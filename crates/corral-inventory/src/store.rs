//! InventoryStore: a redb-backed reference implementation of the gateway.
//!
//! Documents, metric samples and pool policies are stored as JSON. Record
//! keys sort by kind and metric keys by resource, metric and timestamp, so
//! every lookup is a range over one key prefix.

use std::ops::Bound;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableDatabase};
use tracing::debug;

use crate::error::{InventoryError, InventoryResult};
use crate::gateway::InventoryGateway;
use crate::query::{Criteria, Page};
use crate::tables::*;
use crate::types::*;

/// Thread-safe inventory store backed by redb.
#[derive(Clone)]
pub struct InventoryStore {
    db: Arc<Database>,
}

impl InventoryStore {
    /// Open (or create) a persistent inventory at the given path.
    pub fn open(path: &Path) -> InventoryResult<Self> {
        let store = Self::with_database(Database::create(path)?)?;
        debug!(?path, "inventory store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory inventory.
    pub fn open_in_memory() -> InventoryResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let store = Self::with_database(Database::builder().create_with_backend(backend)?)?;
        debug!("in-memory inventory store opened");
        Ok(store)
    }

    fn with_database(db: Database) -> InventoryResult<Self> {
        let txn = db.begin_write()?;
        for table in [RECORDS, METRICS, POLICIES] {
            txn.open_table(table)?;
        }
        txn.commit()?;
        Ok(Self { db: Arc::new(db) })
    }

    // ── Records ────────────────────────────────────────────────────

    /// Insert or update a typed document.
    pub fn put<T: Document>(&self, doc: &T) -> InventoryResult<()> {
        let record = Record::from_typed(T::KIND, doc.document_id(), doc)?;
        self.put_record(&record)
    }

    /// Insert or update a raw record.
    pub fn put_record(&self, record: &Record) -> InventoryResult<()> {
        let key = record_key(record.kind, &record.id);
        let value =
            serde_json::to_vec(&record.body).map_err(InventoryError::encode(record.kind.as_str()))?;
        let txn = self.db.begin_write()?;
        txn.open_table(RECORDS)?
            .insert(key.as_str(), value.as_slice())?;
        txn.commit()?;
        debug!(%key, "record stored");
        Ok(())
    }

    /// Get a record by kind and id.
    pub fn get_record(&self, kind: RecordKind, id: &str) -> InventoryResult<Option<Record>> {
        let key = record_key(kind, id);
        let txn = self.db.begin_read()?;
        let table = txn.open_table(RECORDS)?;
        let Some(guard) = table.get(key.as_str())? else {
            return Ok(None);
        };
        let body = serde_json::from_slice(guard.value()).map_err(InventoryError::decode(&key))?;
        Ok(Some(Record {
            kind,
            id: id.to_string(),
            body,
        }))
    }

    /// Delete a record. Returns true if it existed.
    pub fn delete_record(&self, kind: RecordKind, id: &str) -> InventoryResult<bool> {
        let key = record_key(kind, id);
        let txn = self.db.begin_write()?;
        let existed = txn.open_table(RECORDS)?.remove(key.as_str())?.is_some();
        txn.commit()?;
        debug!(%key, existed, "record deleted");
        Ok(existed)
    }

    /// Scan records of `kind` after `cursor`, returning at most `limit` matches.
    ///
    /// Only keys of `kind` are visited. A cursor from another kind restarts
    /// the scan.
    pub fn scan(
        &self,
        kind: RecordKind,
        criteria: &Criteria,
        limit: usize,
        cursor: Option<&str>,
    ) -> InventoryResult<Page> {
        let (prefix, end) = record_prefix(kind);
        let limit = limit.max(1);
        let start = match cursor.filter(|c| c.starts_with(&prefix)) {
            Some(cursor) => Bound::Excluded(cursor),
            None => Bound::Included(prefix.as_str()),
        };
        let txn = self.db.begin_read()?;
        let table = txn.open_table(RECORDS)?;

        let mut records = Vec::new();
        let mut last_key = None;
        let mut more = false;
        for entry in table.range::<&str>((start, Bound::Excluded(end.as_str())))? {
            let (key, value) = entry?;
            let key = key.value();
            let body: serde_json::Value =
                serde_json::from_slice(value.value()).map_err(InventoryError::decode(key))?;
            if !criteria.matches(&body) {
                continue;
            }
            if records.len() == limit {
                more = true;
                break;
            }
            records.push(Record {
                kind,
                id: key[prefix.len()..].to_string(),
                body,
            });
            last_key = Some(key.to_string());
        }

        Ok(Page {
            records,
            next: if more { last_key } else { None },
        })
    }

    // ── Metrics ────────────────────────────────────────────────────

    /// Append a metric sample for a resource.
    pub fn put_metric(
        &self,
        resource_id: &str,
        metric_name: &str,
        sample: MetricSample,
    ) -> InventoryResult<()> {
        let key = format!("{resource_id}:{metric_name}:{:020}", sample.timestamp_micros);
        let value = serde_json::to_vec(&sample).map_err(InventoryError::encode("metric"))?;
        let txn = self.db.begin_write()?;
        txn.open_table(METRICS)?
            .insert(key.as_str(), value.as_slice())?;
        txn.commit()?;
        Ok(())
    }

    /// Latest sample of a metric: the last key under its prefix.
    pub fn latest_metric(
        &self,
        resource_id: &str,
        metric_name: &str,
    ) -> InventoryResult<Option<MetricSample>> {
        let start = format!("{resource_id}:{metric_name}:");
        let end = format!("{resource_id}:{metric_name};");
        let txn = self.db.begin_read()?;
        let table = txn.open_table(METRICS)?;
        let Some(entry) = table.range(start.as_str()..end.as_str())?.next_back() else {
            return Ok(None);
        };
        let (key, value) = entry?;
        let sample =
            serde_json::from_slice(value.value()).map_err(InventoryError::decode(key.value()))?;
        Ok(Some(sample))
    }

    // ── Policies ───────────────────────────────────────────────────

    /// Set the load policy of a resource pool.
    pub fn put_policy(&self, resource_pool_id: &str, policy: PlacementPolicy) -> InventoryResult<()> {
        let value = serde_json::to_vec(&policy).map_err(InventoryError::encode("policy"))?;
        let txn = self.db.begin_write()?;
        txn.open_table(POLICIES)?
            .insert(resource_pool_id, value.as_slice())?;
        txn.commit()?;
        debug!(%resource_pool_id, ?policy, "placement policy stored");
        Ok(())
    }

    /// Load policy of a resource pool; pools without one report `None`.
    pub fn policy(&self, resource_pool_id: &str) -> InventoryResult<PlacementPolicy> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(POLICIES)?;
        match table.get(resource_pool_id)? {
            Some(guard) => serde_json::from_slice(guard.value())
                .map_err(InventoryError::decode(format!("policy of {resource_pool_id}"))),
            None => Ok(PlacementPolicy::None),
        }
    }
}

#[async_trait]
impl InventoryGateway for InventoryStore {
    async fn query_page(
        &self,
        kind: RecordKind,
        criteria: &Criteria,
        page_limit: usize,
        cursor: Option<&str>,
    ) -> InventoryResult<Page> {
        self.scan(kind, criteria, page_limit, cursor)
    }

    async fn get_resource(&self, kind: RecordKind, id: &str) -> InventoryResult<Option<Record>> {
        self.get_record(kind, id)
    }

    async fn get_metric(
        &self,
        resource_id: &str,
        metric_name: &str,
    ) -> InventoryResult<Option<MetricSample>> {
        self.latest_metric(resource_id, metric_name)
    }

    async fn get_placement_policy(
        &self,
        resource_pool_id: &str,
    ) -> InventoryResult<PlacementPolicy> {
        self.policy(resource_pool_id)
    }
}

fn record_key(kind: RecordKind, id: &str) -> String {
    format!("{}/{}", kind.as_str(), id)
}

/// Key prefix of a record kind and the first key past it.
fn record_prefix(kind: RecordKind) -> (String, String) {
    (format!("{}/", kind.as_str()), format!("{}0", kind.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> InventoryStore {
        InventoryStore::open_in_memory().unwrap()
    }

    fn instance(id: &str, host: &str, group: &str) -> PlacedInstance {
        PlacedInstance {
            id: id.to_string(),
            name: format!("{id}-name"),
            description_link: "desc-web".to_string(),
            host_id: host.to_string(),
            placement_group_id: group.to_string(),
        }
    }

    #[test]
    fn record_put_and_get() {
        let store = test_store();
        store.put(&instance("i1", "h1", "g1")).unwrap();

        let record = store.get_record(RecordKind::Instance, "i1").unwrap().unwrap();
        let decoded: PlacedInstance = record.decode().unwrap();
        assert_eq!(decoded.host_id, "h1");
    }

    #[test]
    fn get_nonexistent_returns_none() {
        let store = test_store();
        assert!(store.get_record(RecordKind::Host, "nope").unwrap().is_none());
    }

    #[test]
    fn kinds_do_not_collide() {
        let store = test_store();
        store.put(&instance("x", "h1", "g1")).unwrap();
        assert!(store.get_record(RecordKind::Host, "x").unwrap().is_none());
    }

    #[test]
    fn delete_record() {
        let store = test_store();
        store.put(&instance("i1", "h1", "g1")).unwrap();
        assert!(store.delete_record(RecordKind::Instance, "i1").unwrap());
        assert!(!store.delete_record(RecordKind::Instance, "i1").unwrap());
    }

    #[test]
    fn scan_applies_criteria() {
        let store = test_store();
        store.put(&instance("i1", "h1", "g1")).unwrap();
        store.put(&instance("i2", "h2", "g1")).unwrap();
        store.put(&instance("i3", "h1", "g2")).unwrap();

        let page = store
            .scan(
                RecordKind::Instance,
                &Criteria::new().eq("host_id", "h1").eq("placement_group_id", "g1"),
                10,
                None,
            )
            .unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0].id, "i1");
        assert!(page.next.is_none());
    }

    #[test]
    fn scan_pages_through_results() {
        let store = test_store();
        for i in 0..5 {
            store.put(&instance(&format!("i{i}"), "h1", "g1")).unwrap();
        }

        let first = store.scan(RecordKind::Instance, &Criteria::new(), 2, None).unwrap();
        assert_eq!(first.records.len(), 2);
        let cursor = first.next.clone().unwrap();

        let second = store
            .scan(RecordKind::Instance, &Criteria::new(), 2, Some(&cursor))
            .unwrap();
        assert_eq!(second.records.len(), 2);
        assert_ne!(first.records[0].id, second.records[0].id);

        let third = store
            .scan(RecordKind::Instance, &Criteria::new(), 2, second.next.as_deref())
            .unwrap();
        assert_eq!(third.records.len(), 1);
        assert!(third.next.is_none());
    }

    #[test]
    fn exact_page_has_no_next_cursor() {
        let store = test_store();
        store.put(&instance("i1", "h1", "g1")).unwrap();
        store.put(&instance("i2", "h1", "g1")).unwrap();

        let page = store.scan(RecordKind::Instance, &Criteria::new(), 2, None).unwrap();
        assert_eq!(page.records.len(), 2);
        assert!(page.next.is_none());
    }

    #[test]
    fn latest_metric_wins() {
        let store = test_store();
        let sample = |value, ts| MetricSample {
            value,
            timestamp_micros: ts,
        };
        store.put_metric("h1", "memory.used.bytes", sample(1.0, 900)).unwrap();
        store.put_metric("h1", "memory.used.bytes", sample(3.0, 1_000)).unwrap();
        store.put_metric("h1", "memory.used.bytes", sample(2.0, 950)).unwrap();
        store.put_metric("h10", "memory.used.bytes", sample(9.0, 5_000)).unwrap();

        let latest = store.latest_metric("h1", "memory.used.bytes").unwrap().unwrap();
        assert_eq!(latest.value, 3.0);
        assert!(store.latest_metric("h1", "cpu").unwrap().is_none());
    }

    #[test]
    fn latest_metric_ignores_neighbouring_keys() {
        let store = test_store();
        let sample = |value, ts| MetricSample {
            value,
            timestamp_micros: ts,
        };
        store.put_metric("h1", "memory.used", sample(1.0, 10)).unwrap();
        store.put_metric("h1", "memory.used.bytes", sample(2.0, 90)).unwrap();
        store.put_metric("h1", "memory.used0", sample(3.0, 99)).unwrap();

        let latest = store.latest_metric("h1", "memory.used").unwrap().unwrap();
        assert_eq!(latest.value, 1.0);
    }

    #[test]
    fn scan_stays_within_its_kind() {
        let store = test_store();
        store.put(&instance("i1", "h1", "g1")).unwrap();
        store
            .put(&HostState {
                id: "h1".to_string(),
                ..HostState::default()
            })
            .unwrap();
        store
            .put(&VolumeState {
                id: "v1".to_string(),
                ..VolumeState::default()
            })
            .unwrap();

        let hosts = store.scan(RecordKind::Host, &Criteria::new(), 10, None).unwrap();
        assert_eq!(hosts.records.len(), 1);
        assert_eq!(hosts.records[0].id, "h1");

        let restarted = store
            .scan(RecordKind::Instance, &Criteria::new(), 10, Some("host/h1"))
            .unwrap();
        assert_eq!(restarted.records.len(), 1);
        assert_eq!(restarted.records[0].id, "i1");
    }

    #[test]
    fn corrupt_documents_name_their_key() {
        let store = test_store();
        {
            let txn = store.db.begin_write().unwrap();
            txn.open_table(RECORDS)
                .unwrap()
                .insert("host/h1", b"not json".as_slice())
                .unwrap();
            txn.commit().unwrap();
        }
        let err = store.get_record(RecordKind::Host, "h1").unwrap_err();
        assert!(matches!(err, InventoryError::Decode { .. }));
        assert!(err.to_string().contains("host/h1"));
    }

    #[test]
    fn policy_defaults_to_none() {
        let store = test_store();
        assert_eq!(store.policy("pool-a").unwrap(), PlacementPolicy::None);
        store.put_policy("pool-a", PlacementPolicy::Spread).unwrap();
        assert_eq!(store.policy("pool-a").unwrap(), PlacementPolicy::Spread);
    }

    #[tokio::test]
    async fn gateway_delegates_to_store() {
        let store = test_store();
        store.put(&instance("i1", "h1", "g1")).unwrap();
        store.put_policy("pool", PlacementPolicy::Binpack).unwrap();

        let gateway: Arc<dyn InventoryGateway> = Arc::new(store);
        let page = gateway
            .query_page(RecordKind::Instance, &Criteria::new(), 10, None)
            .await
            .unwrap();
        assert_eq!(page.records.len(), 1);
        assert!(gateway.get_resource(RecordKind::Instance, "i1").await.unwrap().is_some());
        assert_eq!(
            gateway.get_placement_policy("pool").await.unwrap(),
            PlacementPolicy::Binpack
        );
    }

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.redb");
        {
            let store = InventoryStore::open(&path).unwrap();
            store.put(&instance("i1", "h1", "g1")).unwrap();
            store.put_policy("pool", PlacementPolicy::Spread).unwrap();
        }
        let store = InventoryStore::open(&path).unwrap();
        assert!(store.get_record(RecordKind::Instance, "i1").unwrap().is_some());
        assert_eq!(store.policy("pool").unwrap(), PlacementPolicy::Spread);
    }
}
