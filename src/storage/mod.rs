//! Durable transaction storage.
//!
//! `RecordStore` is the authoritative source of truth; the search index is a
//! derived projection that can always be rebuilt from here.

pub mod sqlite;

use thiserror::Error;
use uuid::Uuid;

use crate::model::types::{NewTransaction, TransactionPatch, TransactionRecord};

/// Error from a store operation. Write errors are propagated to the caller
/// as-is; the core never retries automatically.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to save transaction: {0}")]
    SaveFailed(String),
    #[error("failed to update transaction: {0}")]
    UpdateFailed(String),
    #[error("failed to delete transaction: {0}")]
    DeleteFailed(String),
    #[error("failed to load transactions: {0}")]
    LoadFailed(String),
    #[error("transaction {0} not found")]
    NotFound(Uuid),
}

/// Result ordering for fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    TimestampDesc,
    TimestampAsc,
}

/// Keyed, transactional storage for ledger records.
pub trait RecordStore: Send + Sync {
    /// Persist a new record. Trimming and defaults are applied before the
    /// write; a blank merchant name is rejected as `SaveFailed`.
    fn create(&self, new: NewTransaction) -> Result<TransactionRecord, StoreError>;

    /// Apply a patch to an existing record, returning the refreshed state.
    fn update(&self, id: Uuid, patch: TransactionPatch) -> Result<TransactionRecord, StoreError>;

    /// Remove a record. Fails with `NotFound` if the id no longer exists.
    fn delete(&self, id: Uuid) -> Result<(), StoreError>;

    fn fetch_all(&self, sort: SortOrder) -> Result<Vec<TransactionRecord>, StoreError>;

    /// Fetch the records whose ids appear in `ids`; absent ids are skipped.
    fn fetch_by_ids(&self, ids: &[Uuid], sort: SortOrder)
    -> Result<Vec<TransactionRecord>, StoreError>;

    /// Fetch records matching an in-process predicate.
    fn fetch_by_predicate(
        &self,
        pred: &dyn Fn(&TransactionRecord) -> bool,
        sort: SortOrder,
    ) -> Result<Vec<TransactionRecord>, StoreError>;
}
