//! Keeps the search index consistent with the record store.
//!
//! Called after each store write commits. The index is best-effort and
//! eventually consistent: a write failure here is logged and swallowed, and
//! the triggering record mutation stands. The fallback search path reads the
//! store directly, so a lagging index never produces wrong results.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::model::types::TransactionRecord;
use crate::search::index::{SearchIndex, SearchIndexEntry};
use crate::storage::{RecordStore, SortOrder};

/// Entries per batched upsert call during bulk synchronization.
const BULK_CHUNK: usize = 256;

pub struct IndexSynchronizer {
    index: Arc<dyn SearchIndex>,
}

impl IndexSynchronizer {
    pub fn new(index: Arc<dyn SearchIndex>) -> Self {
        Self { index }
    }

    /// Index a freshly created record.
    pub fn on_create(&self, record: &TransactionRecord) {
        self.upsert_one(record);
    }

    /// Re-index a record after an update; replaces the previous entry.
    pub fn on_update(&self, record: &TransactionRecord) {
        self.upsert_one(record);
    }

    /// Drop the entry for a deleted record. Idempotent.
    pub fn on_delete(&self, id: Uuid) {
        if let Err(e) = self.index.remove(&[id]) {
            warn!(record_id = %id, error = %e, "index removal failed");
        }
    }

    /// Index many records under a single batch commit, bounding write
    /// amplification for bulk mutations.
    pub fn on_bulk(&self, records: &[TransactionRecord]) {
        self.index.begin_batch();
        for chunk in records.chunks(BULK_CHUNK) {
            let entries: Vec<SearchIndexEntry> =
                chunk.iter().map(SearchIndexEntry::from_record).collect();
            match self.index.upsert(&entries) {
                Ok(per_entry) => {
                    for (entry, result) in entries.iter().zip(per_entry) {
                        if let Err(e) = result {
                            warn!(record_id = %entry.id, error = %e, "index upsert failed");
                        }
                    }
                }
                Err(e) => warn!(error = %e, count = entries.len(), "index batch upsert failed"),
            }
        }
        if let Err(e) = self.index.end_batch() {
            warn!(error = %e, "index batch commit failed");
        }
        debug!(count = records.len(), "bulk index synchronization done");
    }

    /// Drop the projection and rebuild it from the store. Safe at any time;
    /// the store is authoritative.
    pub fn rebuild(&self, store: &dyn RecordStore) {
        match store.fetch_all(SortOrder::TimestampDesc) {
            Ok(records) => {
                if let Err(e) = self.index.clear() {
                    warn!(error = %e, "index clear failed, rebuilding over existing entries");
                }
                self.on_bulk(&records);
            }
            Err(e) => warn!(error = %e, "rebuild skipped, store unreadable"),
        }
    }

    fn upsert_one(&self, record: &TransactionRecord) {
        let entry = SearchIndexEntry::from_record(record);
        match self.index.upsert(std::slice::from_ref(&entry)) {
            Ok(per_entry) => {
                if let Some(Err(e)) = per_entry.into_iter().next() {
                    warn!(record_id = %record.id, error = %e, "index upsert failed");
                }
            }
            Err(e) => warn!(record_id = %record.id, error = %e, "index upsert failed"),
        }
    }
}
