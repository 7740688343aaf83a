//! redb table definitions for the Corral inventory store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized documents).
//! Composite keys follow the pattern `{kind}/{id}` or `{resource}:{metric}:{timestamp}`.

use redb::TableDefinition;

/// Inventory documents keyed by `{kind}/{id}`.
pub const RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("records");

/// Metric samples keyed by `{resource_id}:{metric}:{timestamp_micros:020}`.
pub const METRICS: TableDefinition<&str, &[u8]> = TableDefinition::new("metrics");

/// Placement policies keyed by resource pool id.
pub const POLICIES: TableDefinition<&str, &[u8]> = TableDefinition::new("policies");
