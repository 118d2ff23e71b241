//! The `SearchIndex` contract and the derived entry it stores.

use thiserror::Error;
use uuid::Uuid;

use crate::model::types::TransactionRecord;

/// Expiration horizon for index entries: 9999-12-31T23:59:59Z in epoch
/// millis. Entries carry this so index housekeeping never evicts a live
/// entry; only an explicit `remove` takes one out.
pub const EXPIRATION_HORIZON_MS: i64 = 253_402_300_799_000;

/// Error from the semantic index. These are non-fatal to search: the
/// coordinator absorbs them and falls back to content filtering, and the
/// synchronizer logs and swallows them.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("index unavailable: {0}")]
    Unavailable(String),
    #[error("index read failed: {0}")]
    ReadFailed(String),
    #[error("index write failed: {0}")]
    WriteFailed(String),
}

/// One event from a query's lazy result sequence. Suggestions are produced
/// by some index implementations alongside matches; the coordinator ignores
/// them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryEvent {
    Match(Uuid),
    Suggestion(String),
}

/// Lazy, finite sequence of query events, consumed until exhaustion or
/// cancellation.
pub type QueryEvents = Box<dyn Iterator<Item = Result<QueryEvent, IndexError>> + Send>;

/// Denormalized, queryable projection of a record's searchable text.
///
/// Derived and rebuildable; it has no identity of its own and must never
/// outlive its source record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchIndexEntry {
    pub id: Uuid,
    /// Merchant name, the entry's title.
    pub title: String,
    /// Full-text blob: merchant + category + location + description,
    /// space-joined, absent fields omitted.
    pub content: String,
    /// Human-readable summary for display surfaces.
    pub display_label: String,
    /// Record timestamp, used for ranking.
    pub last_used_ms: i64,
    pub expires_at_ms: i64,
}

impl SearchIndexEntry {
    /// Project a record into its index entry. The record is already trimmed
    /// by the store, so the blob never contains stray whitespace.
    pub fn from_record(record: &TransactionRecord) -> Self {
        let mut parts = vec![record.merchant_name.as_str()];
        parts.extend(record.category.as_deref());
        parts.extend(record.location.as_deref());
        parts.extend(record.description.as_deref());
        Self {
            id: record.id,
            title: record.merchant_name.clone(),
            content: parts.join(" "),
            display_label: format!(
                "{} ({:.2} {})",
                record.merchant_name, record.amount, record.currency
            ),
            last_used_ms: record.timestamp.timestamp_millis(),
            expires_at_ms: EXPIRATION_HORIZON_MS,
        }
    }
}

/// A queryable projection of record text.
///
/// Any implementation satisfying this contract works: an embedded full-text
/// index, an external search service, or an in-memory inverted index.
pub trait SearchIndex: Send + Sync {
    /// Start grouping writes; nothing becomes visible until `end_batch`.
    fn begin_batch(&self);

    /// Insert or fully replace entries, returning a result per entry. Each
    /// upsert is atomic: either the entry reflects the new state or the
    /// previous entry is retained.
    fn upsert(
        &self,
        entries: &[SearchIndexEntry],
    ) -> Result<Vec<Result<(), IndexError>>, IndexError>;

    /// Remove entries by id. Removing an absent id is not an error.
    fn remove(&self, ids: &[Uuid]) -> Result<(), IndexError>;

    /// Commit the open batch and make its writes visible.
    fn end_batch(&self) -> Result<(), IndexError>;

    /// Ranked lookup for `text`, yielding at most `limit` match events.
    fn query(&self, text: &str, limit: usize) -> Result<QueryEvents, IndexError>;

    /// Drop the whole projection. The caller rebuilds it from the store.
    fn clear(&self) -> Result<(), IndexError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::types::NewTransaction;
    use chrono::{TimeZone, Utc};

    #[test]
    fn entry_projects_trimmed_fields() {
        let record = NewTransaction {
            merchant_name: " Starbucks ".into(),
            amount: -4.5,
            timestamp: Some(Utc.timestamp_millis_opt(1_000).unwrap()),
            category: Some("Coffee".into()),
            description: Some("oat latte".into()),
            ..Default::default()
        }
        .normalize("CAD")
        .unwrap();

        let entry = SearchIndexEntry::from_record(&record);
        assert_eq!(entry.id, record.id);
        assert_eq!(entry.title, "Starbucks");
        assert_eq!(entry.content, "Starbucks Coffee oat latte");
        assert_eq!(entry.display_label, "Starbucks (-4.50 CAD)");
        assert_eq!(entry.last_used_ms, 1_000);
        assert_eq!(entry.expires_at_ms, EXPIRATION_HORIZON_MS);
    }

    #[test]
    fn entry_omits_absent_fields() {
        let record = NewTransaction {
            merchant_name: "Metro".into(),
            amount: -30.0,
            ..Default::default()
        }
        .normalize("CAD")
        .unwrap();
        let entry = SearchIndexEntry::from_record(&record);
        assert_eq!(entry.content, "Metro");
    }
}
