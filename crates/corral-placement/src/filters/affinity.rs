//! Named affinity and anti-affinity between sibling descriptions.
//!
//! Relationships are resolved in both directions: descriptions this one
//! names in its affinity entries, and descriptions whose own entries name
//! this one. Placed instances of those siblings, restricted to the placement
//! group and the candidate hosts, decide where this workload may go.
//!
//! - **Affinity**: a hard match pins the workload to exactly one host; more
//!   than one is fatal. Unresolved hard affinity is fatal too. Otherwise
//!   soft matches narrow the set.
//! - **Anti-affinity**: hard matches are removed outright; soft matches are
//!   removed one at a time while more than one candidate remains.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use corral_inventory::{Criteria, HostId, PlacedInstance, WorkloadDescription};
use indexmap::IndexMap;
use tracing::{debug, info};

use crate::client::InventoryClient;
use crate::constraint::{AffinityConstraint, ConstraintStrength, constraints_of};
use crate::context::PlacementContext;
use crate::error::{PlacementError, PlacementResult};
use crate::filter::HostFilter;
use crate::selection::{CandidateMap, DescName};

/// A sibling description and the constraints relating it to the workload.
struct Related {
    desc: DescName,
    constraints: Vec<AffinityConstraint>,
}

/// Candidate hosts matched by each kind of constraint.
#[derive(Default)]
struct Matches {
    hard_affinity: HashSet<HostId>,
    soft_affinity: HashSet<HostId>,
    hard_anti: HashSet<HostId>,
    soft_anti: HashSet<HostId>,
    names: Vec<String>,
}

impl Matches {
    fn record(&mut self, host_id: &str, constraint: &AffinityConstraint) {
        let bucket = match (constraint.anti_affinity, constraint.strength) {
            (false, ConstraintStrength::Hard) => &mut self.hard_affinity,
            (false, ConstraintStrength::Soft) => &mut self.soft_affinity,
            (true, ConstraintStrength::Hard) => &mut self.hard_anti,
            (true, ConstraintStrength::Soft) => &mut self.soft_anti,
        };
        bucket.insert(host_id.to_string());
        if !self.names.contains(&constraint.name) {
            self.names.push(constraint.name.clone());
        }
    }
}

pub struct NamedAffinityFilter {
    inventory: InventoryClient,
}

impl NamedAffinityFilter {
    pub fn new(inventory: InventoryClient) -> Self {
        Self { inventory }
    }

    /// Sibling descriptions related to `desc` in either direction.
    async fn related_descriptions(
        &self,
        desc: &WorkloadDescription,
        outgoing: &BTreeMap<String, AffinityConstraint>,
    ) -> PlacementResult<IndexMap<String, Related>> {
        let outgoing_query = async {
            if outgoing.is_empty() {
                return Ok(Vec::new());
            }
            let criteria = Criteria::new().one_of("name", outgoing.keys().map(String::as_str));
            self.inventory.query::<WorkloadDescription>(&criteria).await
        };
        let incoming_criteria = Criteria::new().any_item_contains("affinity", &desc.name);
        let incoming_query = self.inventory.query::<WorkloadDescription>(&incoming_criteria);

        let (targets, sources) = tokio::try_join!(outgoing_query, incoming_query)?;

        let mut related: IndexMap<String, Related> = IndexMap::new();
        let mut relate = |other: &WorkloadDescription, constraint: AffinityConstraint| {
            related
                .entry(other.id.clone())
                .or_insert_with(|| Related {
                    desc: DescName::from_description(other),
                    constraints: Vec::new(),
                })
                .constraints
                .push(constraint);
        };

        for other in targets.iter().filter(|d| d.id != desc.id) {
            if let Some(constraint) = outgoing.get(&other.name) {
                relate(other, constraint.clone());
            }
        }

        // The wildcard query over-matches; keep only exact name references.
        for other in sources.iter().filter(|d| d.id != desc.id) {
            for constraint in constraints_of(&other.affinity).into_values() {
                if constraint.name == desc.name {
                    relate(
                        other,
                        AffinityConstraint {
                            name: other.name.clone(),
                            ..constraint
                        },
                    );
                }
            }
        }

        Ok(related)
    }

    fn apply(
        &self,
        ctx: &PlacementContext,
        outgoing: &BTreeMap<String, AffinityConstraint>,
        mut candidates: CandidateMap,
        matches: Matches,
    ) -> PlacementResult<CandidateMap> {
        let hard_outgoing: Vec<&str> = outgoing
            .values()
            .filter(|c| !c.anti_affinity && c.is_hard())
            .map(|c| c.name.as_str())
            .collect();

        if !matches.hard_affinity.is_empty() {
            if matches.hard_affinity.len() > 1 {
                return Err(PlacementError::violation(
                    format!(
                        "hard affinity resolves to {} hosts, expected exactly one",
                        matches.hard_affinity.len()
                    ),
                    matches.names,
                    ctx,
                ));
            }
            candidates.retain(|id, _| matches.hard_affinity.contains(id));
        } else if !hard_outgoing.is_empty() {
            return Err(PlacementError::violation(
                "no placed resources satisfy hard affinity",
                hard_outgoing,
                ctx,
            ));
        } else if !matches.soft_affinity.is_empty() {
            candidates.retain(|id, _| matches.soft_affinity.contains(id));
        }

        if !matches.hard_anti.is_empty() {
            candidates.retain(|id, _| !matches.hard_anti.contains(id));
            if candidates.is_empty() {
                return Err(PlacementError::violation(
                    "no host satisfies anti-affinity",
                    matches.names,
                    ctx,
                ));
            }
        }

        if !matches.soft_anti.is_empty() {
            let soft: Vec<HostId> = candidates
                .keys()
                .filter(|id| matches.soft_anti.contains(*id))
                .cloned()
                .collect();
            for id in soft {
                if candidates.len() <= 1 {
                    break;
                }
                candidates.shift_remove(&id);
            }
        }

        Ok(candidates)
    }
}

#[async_trait]
impl HostFilter for NamedAffinityFilter {
    fn name(&self) -> &'static str {
        "named-affinity"
    }

    /// Active for any named workload, even one that declares no affinity.
    ///
    /// Other descriptions may name this one in their own affinity entries,
    /// and those incoming relationships can only be found by querying the
    /// inventory. The check reads the description alone; the query runs in
    /// `filter`.
    fn is_active(&self, desc: &WorkloadDescription, _ctx: &PlacementContext) -> bool {
        !desc.name.is_empty() || !desc.affinity.is_empty()
    }

    fn affinity_constraints(
        &self,
        desc: &WorkloadDescription,
    ) -> BTreeMap<String, AffinityConstraint> {
        constraints_of(&desc.affinity)
    }

    async fn filter(
        &self,
        desc: &WorkloadDescription,
        ctx: &PlacementContext,
        mut candidates: CandidateMap,
    ) -> PlacementResult<CandidateMap> {
        let outgoing = self.affinity_constraints(desc);
        info!(
            description = %desc.name,
            affinity = ?outgoing.keys().collect::<Vec<_>>(),
            placement_group = %ctx.placement_group_id,
            "named affinity filter active"
        );

        let related = self.related_descriptions(desc, &outgoing).await?;
        debug!(count = related.len(), "related descriptions found");

        if related.is_empty() {
            let unresolved: Vec<&str> = outgoing
                .values()
                .filter(|c| !c.anti_affinity && c.is_hard())
                .map(|c| c.name.as_str())
                .collect();
            if !unresolved.is_empty() {
                return Err(PlacementError::violation(
                    "no descriptions found for hard affinity",
                    unresolved,
                    ctx,
                ));
            }
            return Ok(candidates);
        }

        let criteria = Criteria::new()
            .eq("placement_group_id", ctx.placement_group_id.as_str())
            .one_of("description_link", related.keys().map(String::as_str))
            .one_of("host_id", candidates.keys().map(String::as_str));
        let placed = self.inventory.query::<PlacedInstance>(&criteria).await?;

        let mut matches = Matches::default();
        for instance in &placed {
            let (Some(selection), Some(rel)) = (
                candidates.get_mut(&instance.host_id),
                related.get(&instance.description_link),
            ) else {
                continue;
            };
            let mut found = rel.desc.clone();
            found.add_resource_name(instance.name.clone());
            selection.add_description(found);
            selection.add_placed_sibling(instance.id.clone());

            for constraint in &rel.constraints {
                matches.record(&instance.host_id, constraint);
            }
        }

        let result = self.apply(ctx, &outgoing, candidates, matches)?;
        info!(
            description = %desc.name,
            hosts = ?result.keys().collect::<Vec<_>>(),
            "selected hosts for named affinity"
        );
        Ok(result)
    }
}
