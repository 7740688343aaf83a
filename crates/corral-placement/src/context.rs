//! Request-scoped placement parameters.

use sha2::{Digest, Sha256};

/// Immutable parameters of one placement call.
///
/// Built fresh for each request and only ever borrowed by filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementContext {
    /// Correlates every resource provisioned together.
    pub placement_group_id: String,
    /// Eligible pools; the first one is authoritative for allocation-time filters.
    pub resource_pool_ids: Vec<String>,
    /// Instances being placed by this call.
    pub requested_count: u32,
    /// Growing an existing cluster rather than creating one.
    pub is_clustering: bool,
    /// Originating task, used to tell reservation from allocation.
    pub callback_ref: Option<String>,
}

impl PlacementContext {
    pub fn new(placement_group_id: impl Into<String>, resource_pool_ids: Vec<String>) -> Self {
        Self {
            placement_group_id: placement_group_id.into(),
            resource_pool_ids,
            requested_count: 1,
            is_clustering: false,
            callback_ref: None,
        }
    }

    pub fn with_requested_count(mut self, count: u32) -> Self {
        self.requested_count = count;
        self
    }

    pub fn clustering(mut self) -> Self {
        self.is_clustering = true;
        self
    }

    pub fn with_callback_ref(mut self, callback_ref: impl Into<String>) -> Self {
        self.callback_ref = Some(callback_ref.into());
        self
    }

    /// The pool whose policy governs load filters.
    pub fn primary_pool(&self) -> Option<&str> {
        self.resource_pool_ids.first().map(String::as_str)
    }

    /// Whether this call originates from a reservation task.
    pub fn is_reservation(&self, reservation_prefix: &str) -> bool {
        self.callback_ref
            .as_deref()
            .is_some_and(|r| r.starts_with(reservation_prefix))
    }

    /// Deterministic index in `0..choices` derived from the placement group.
    ///
    /// Every filter run for the same placement group picks the same index,
    /// in this process or any other.
    pub fn tie_break_index(&self, choices: usize) -> usize {
        if choices == 0 {
            return 0;
        }
        let digest = Sha256::digest(self.placement_group_id.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        (u64::from_be_bytes(prefix) % choices as u64) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> PlacementContext {
        PlacementContext::new("group-1", vec!["pool-a".to_string(), "pool-b".to_string()])
    }

    #[test]
    fn primary_pool_is_first() {
        assert_eq!(ctx().primary_pool(), Some("pool-a"));
        assert_eq!(PlacementContext::new("g", vec![]).primary_pool(), None);
    }

    #[test]
    fn reservation_detection_uses_prefix() {
        let prefix = "/requests/reservation-tasks";
        assert!(!ctx().is_reservation(prefix));
        assert!(
            ctx()
                .with_callback_ref("/requests/reservation-tasks/abc")
                .is_reservation(prefix)
        );
        assert!(
            !ctx()
                .with_callback_ref("/requests/allocation-tasks/abc")
                .is_reservation(prefix)
        );
    }

    #[test]
    fn tie_break_is_stable_and_in_range() {
        let a = ctx();
        let b = ctx();
        for n in 1..10 {
            let i = a.tie_break_index(n);
            assert!(i < n);
            assert_eq!(i, b.tie_break_index(n));
        }
        assert_eq!(a.tie_break_index(0), 0);
    }

    #[test]
    fn builder_methods() {
        let c = ctx().with_requested_count(4).clustering();
        assert_eq!(c.requested_count, 4);
        assert!(c.is_clustering);
    }
}
