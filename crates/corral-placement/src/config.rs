//! Placement tunables, parsed from a flat TOML table.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Hosts must keep more than this much free memory to receive bin-packed work.
pub const DEFAULT_BINPACK_MEMORY_FLOOR_BYTES: u64 = 3 * 1024 * 1024 * 1024;

/// Callback references under this path belong to reservation tasks.
pub const DEFAULT_RESERVATION_TASK_PREFIX: &str = "/requests/reservation-tasks";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlacementConfig {
    /// Free-memory floor used by the bin-pack filter.
    pub binpack_memory_floor_bytes: u64,
    /// Expiration applied to every inventory call.
    pub query_timeout_ms: u64,
    /// Records requested per inventory page.
    pub page_limit: usize,
    /// Callback-reference prefix identifying reservation-time placements.
    pub reservation_task_prefix: String,
    /// Host metric holding memory in use, in bytes.
    pub memory_used_metric: String,
    /// Datastore metric holding free capacity, in bytes.
    pub storage_available_metric: String,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            binpack_memory_floor_bytes: DEFAULT_BINPACK_MEMORY_FLOOR_BYTES,
            query_timeout_ms: 10_000,
            page_limit: 1_000,
            reservation_task_prefix: DEFAULT_RESERVATION_TASK_PREFIX.to_string(),
            memory_used_metric: "memory.used.bytes".to_string(),
            storage_available_metric: "storage.available.bytes".to_string(),
        }
    }
}

impl PlacementConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: PlacementConfig = toml::from_str(content)?;
        Ok(config)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}
