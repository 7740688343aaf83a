//! Turning a host selection into per-host instance counts.

use indexmap::IndexMap;
use tracing::{debug, warn};

use corral_inventory::HostId;

use crate::selection::CandidateMap;

/// Instances to provision on each selected host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementPlan {
    pub placement_group_id: String,
    /// Host id → number of instances, in selection order.
    pub assignments: IndexMap<HostId, u32>,
}

impl PlacementPlan {
    pub fn total(&self) -> u32 {
        self.assignments.values().sum()
    }
}

/// Assign `requested_count` instances by cycling the selected hosts in map
/// order.
pub fn assign_instances(
    placement_group_id: &str,
    selection: &CandidateMap,
    requested_count: u32,
) -> PlacementPlan {
    let mut assignments: IndexMap<HostId, u32> = IndexMap::new();

    if selection.is_empty() {
        if requested_count > 0 {
            warn!(
                placement_group = placement_group_id,
                requested_count, "no hosts selected, nothing assigned"
            );
        }
    } else {
        for (host_id, _) in selection.iter().cycle().take(requested_count as usize) {
            *assignments.entry(host_id.clone()).or_default() += 1;
        }
    }

    for (host_id, count) in &assignments {
        debug!(host = %host_id, instances = count, "assigned instances");
    }

    PlacementPlan {
        placement_group_id: placement_group_id.to_string(),
        assignments,
    }
}
