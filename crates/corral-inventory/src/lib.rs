//! corral-inventory: the inventory boundary of the Corral placement core.
//!
//! The placement filters never talk to a database directly. They consume the
//! [`InventoryGateway`] capability: paged record queries, point lookups,
//! latest-metric lookups, and pool placement policies.
//!
//! # Architecture
//!
//! Records are JSON documents addressed by `(kind, id)`. Query criteria are
//! conjunctions of field predicates evaluated against the document body.
//!
//! [`InventoryStore`] is a reference gateway backed by
//! [redb](https://docs.rs/redb). It is `Clone` + `Send` + `Sync` (backed by
//! `Arc<Database>`) and can be shared across concurrent placements.

pub mod error;
pub mod gateway;
pub mod query;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{InventoryError, InventoryResult};
pub use gateway::InventoryGateway;
pub use query::{Criteria, Match, Page, Predicate};
pub use store::InventoryStore;
pub use types::*;
