//! Placement error types.

use std::time::Duration;

use corral_inventory::InventoryError;
use thiserror::Error;

use crate::context::PlacementContext;

/// Errors that terminate a placement.
#[derive(Debug, Error)]
pub enum PlacementError {
    /// A placement rule cannot be satisfied by any remaining host.
    #[error(
        "{reason} (constraints: [{}], placement group: {placement_group_id})",
        .constraints.join(", ")
    )]
    ConstraintViolation {
        reason: String,
        constraints: Vec<String>,
        placement_group_id: String,
    },

    #[error("no candidate hosts for placement group {0}")]
    NoCandidates(String),

    #[error("inventory query timed out after {timeout:?}: {what}")]
    QueryTimeout { what: String, timeout: Duration },

    #[error("inventory error: {0}")]
    Inventory(#[from] InventoryError),
}

impl PlacementError {
    /// Build a constraint violation scoped to the request's placement group.
    pub fn violation<I, S>(reason: impl Into<String>, constraints: I, ctx: &PlacementContext) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PlacementError::ConstraintViolation {
            reason: reason.into(),
            constraints: constraints.into_iter().map(Into::into).collect(),
            placement_group_id: ctx.placement_group_id.clone(),
        }
    }

    /// Whether this failure is a rule violation rather than an upstream fault.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, PlacementError::ConstraintViolation { .. })
    }
}

pub type PlacementResult<T> = Result<T, PlacementError>;
