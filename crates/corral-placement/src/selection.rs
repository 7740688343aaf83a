//! Per-host accumulators threaded through the filter chain.

use std::collections::{BTreeMap, BTreeSet};

use corral_inventory::{HostId, WorkloadDescription};
use indexmap::IndexMap;

/// Working set of eligible hosts, in the order candidates were supplied.
pub type CandidateMap = IndexMap<HostId, HostSelection>;

/// A sibling description discovered on a host.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DescName {
    pub description_link: String,
    pub description_name: String,
    pub affinity_names: Vec<String>,
    /// Names of the sibling's resources on the host, without repeats.
    pub resource_names: Vec<String>,
}

impl DescName {
    pub fn from_description(desc: &WorkloadDescription) -> Self {
        Self {
            description_link: desc.id.clone(),
            description_name: desc.name.clone(),
            affinity_names: desc.affinity.clone(),
            resource_names: Vec::new(),
        }
    }

    pub fn add_resource_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.resource_names.contains(&name) {
            self.resource_names.push(name);
        }
    }
}

/// What the chain has learned about one candidate host.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HostSelection {
    pub host_id: HostId,
    /// Ids of same-placement-group resources found on this host.
    pub placed_siblings: BTreeSet<String>,
    /// Sibling descriptions found on this host, keyed by description link.
    pub descriptions: BTreeMap<String, DescName>,
}

impl HostSelection {
    pub fn new(host_id: impl Into<HostId>) -> Self {
        Self {
            host_id: host_id.into(),
            ..Self::default()
        }
    }

    /// Record a sibling description, merging resource names into any
    /// entry already present for the same description.
    pub fn add_description(&mut self, desc: DescName) {
        match self.descriptions.get_mut(&desc.description_link) {
            Some(existing) => {
                for name in desc.resource_names {
                    existing.add_resource_name(name);
                }
            }
            None => {
                self.descriptions.insert(desc.description_link.clone(), desc);
            }
        }
    }

    /// Record a placed sibling; recording the same instance twice is a no-op.
    pub fn add_placed_sibling(&mut self, instance_id: impl Into<String>) {
        self.placed_siblings.insert(instance_id.into());
    }

    pub fn placed_sibling_count(&self) -> usize {
        self.placed_siblings.len()
    }
}

/// Build a candidate map from host ids, keeping their order.
pub fn candidate_map<I, S>(host_ids: I) -> CandidateMap
where
    I: IntoIterator<Item = S>,
    S: Into<HostId>,
{
    host_ids
        .into_iter()
        .map(|id| {
            let id = id.into();
            (id.clone(), HostSelection::new(id))
        })
        .collect()
}
