//! Error types for the Corral inventory boundary.

use thiserror::Error;

use crate::types::RecordKind;

/// Result type alias for inventory operations.
pub type InventoryResult<T> = Result<T, InventoryError>;

/// Errors that can occur while querying or storing inventory records.
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("cannot open inventory database: {0}")]
    Open(#[from] redb::DatabaseError),

    #[error("inventory transaction failed: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("inventory commit failed: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("inventory table unavailable: {0}")]
    Table(#[from] redb::TableError),

    #[error("inventory storage failure: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("cannot encode {kind} document: {source}")]
    Encode {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot decode {what}: {source}")]
    Decode {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{kind} {id} is not in the inventory")]
    NotFound { kind: RecordKind, id: String },

    /// The backing substrate could not answer (network partition, overload).
    #[error("inventory unavailable: {0}")]
    Unavailable(String),
}

impl InventoryError {
    pub(crate) fn encode(kind: &'static str) -> impl FnOnce(serde_json::Error) -> Self {
        move |source| InventoryError::Encode { kind, source }
    }

    pub(crate) fn decode(what: impl Into<String>) -> impl FnOnce(serde_json::Error) -> Self {
        let what = what.into();
        move |source| InventoryError::Decode { what, source }
    }
}
