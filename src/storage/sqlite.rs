//! `SQLite` backend: schema, pragmas, and record CRUD.

use std::path::Path;

use chrono::DateTime;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::info;
use uuid::Uuid;

use crate::model::types::{NewTransaction, TransactionPatch, TransactionRecord};
use crate::storage::{RecordStore, SortOrder, StoreError};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS transactions (
    id            TEXT PRIMARY KEY,
    merchant_name TEXT NOT NULL CHECK (length(merchant_name) > 0),
    amount        REAL NOT NULL,
    timestamp_ms  INTEGER NOT NULL,
    currency      TEXT NOT NULL,
    location      TEXT,
    category      TEXT,
    description   TEXT
);
CREATE INDEX IF NOT EXISTS idx_transactions_timestamp
    ON transactions(timestamp_ms DESC);
"#;

/// Thread-safe SQLite-backed `RecordStore`.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    default_currency: String,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and ensure the schema exists.
    pub fn open(path: &Path, default_currency: &str) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::LoadFailed(e.to_string()))?;
        }
        let conn = Connection::open(path).map_err(|e| StoreError::LoadFailed(e.to_string()))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| StoreError::LoadFailed(e.to_string()))?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| StoreError::LoadFailed(e.to_string()))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| StoreError::LoadFailed(e.to_string()))?;
        info!(path = %path.display(), "opened transaction store");
        Ok(Self {
            conn: Mutex::new(conn),
            default_currency: default_currency.to_string(),
        })
    }

    /// In-memory store, used by tests and throwaway sessions.
    pub fn open_in_memory(default_currency: &str) -> Result<Self, StoreError> {
        let conn =
            Connection::open_in_memory().map_err(|e| StoreError::LoadFailed(e.to_string()))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| StoreError::LoadFailed(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
            default_currency: default_currency.to_string(),
        })
    }

    fn fetch_one(conn: &Connection, id: Uuid) -> Result<Option<TransactionRecord>, StoreError> {
        conn.query_row(
            "SELECT id, merchant_name, amount, timestamp_ms, currency, location, category, description
             FROM transactions WHERE id = ?1",
            params![id.to_string()],
            row_to_record,
        )
        .optional()
        .map_err(|e| StoreError::LoadFailed(e.to_string()))
    }
}

fn order_clause(sort: SortOrder) -> &'static str {
    match sort {
        SortOrder::TimestampDesc => "ORDER BY timestamp_ms DESC, rowid ASC",
        SortOrder::TimestampAsc => "ORDER BY timestamp_ms ASC, rowid ASC",
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<TransactionRecord> {
    let id: String = row.get(0)?;
    let timestamp_ms: i64 = row.get(3)?;
    Ok(TransactionRecord {
        id: Uuid::parse_str(&id).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?,
        merchant_name: row.get(1)?,
        amount: row.get(2)?,
        timestamp: DateTime::from_timestamp_millis(timestamp_ms).ok_or(
            rusqlite::Error::IntegralValueOutOfRange(3, timestamp_ms),
        )?,
        currency: row.get(4)?,
        location: row.get(5)?,
        category: row.get(6)?,
        description: row.get(7)?,
    })
}

fn insert_record(conn: &Connection, record: &TransactionRecord) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO transactions
             (id, merchant_name, amount, timestamp_ms, currency, location, category, description)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            record.id.to_string(),
            record.merchant_name,
            record.amount,
            record.timestamp.timestamp_millis(),
            record.currency,
            record.location,
            record.category,
            record.description,
        ],
    )?;
    Ok(())
}

impl RecordStore for SqliteStore {
    fn create(&self, new: NewTransaction) -> Result<TransactionRecord, StoreError> {
        let record = new
            .normalize(&self.default_currency)
            .ok_or_else(|| StoreError::SaveFailed("merchant name must not be empty".into()))?;
        let conn = self.conn.lock();
        insert_record(&conn, &record).map_err(|e| StoreError::SaveFailed(e.to_string()))?;
        Ok(record)
    }

    fn update(&self, id: Uuid, patch: TransactionPatch) -> Result<TransactionRecord, StoreError> {
        let conn = self.conn.lock();
        let current = Self::fetch_one(&conn, id)?.ok_or(StoreError::NotFound(id))?;
        let updated = patch
            .apply(&current)
            .ok_or_else(|| StoreError::UpdateFailed("merchant name must not be empty".into()))?;
        insert_record(&conn, &updated).map_err(|e| StoreError::UpdateFailed(e.to_string()))?;
        Ok(updated)
    }

    fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let affected = conn
            .execute(
                "DELETE FROM transactions WHERE id = ?1",
                params![id.to_string()],
            )
            .map_err(|e| StoreError::DeleteFailed(e.to_string()))?;
        if affected == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    fn fetch_all(&self, sort: SortOrder) -> Result<Vec<TransactionRecord>, StoreError> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT id, merchant_name, amount, timestamp_ms, currency, location, category, description
             FROM transactions {}",
            order_clause(sort)
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| StoreError::LoadFailed(e.to_string()))?;
        let rows = stmt
            .query_map([], row_to_record)
            .map_err(|e| StoreError::LoadFailed(e.to_string()))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| StoreError::LoadFailed(e.to_string()))
    }

    fn fetch_by_ids(
        &self,
        ids: &[Uuid],
        sort: SortOrder,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock();
        let placeholders = (1..=ids.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(",");
        let sql = format!(
            "SELECT id, merchant_name, amount, timestamp_ms, currency, location, category, description
             FROM transactions WHERE id IN ({placeholders}) {}",
            order_clause(sort)
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| StoreError::LoadFailed(e.to_string()))?;
        let id_strings: Vec<String> = ids.iter().map(Uuid::to_string).collect();
        let rows = stmt
            .query_map(rusqlite::params_from_iter(id_strings.iter()), row_to_record)
            .map_err(|e| StoreError::LoadFailed(e.to_string()))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| StoreError::LoadFailed(e.to_string()))
    }

    fn fetch_by_predicate(
        &self,
        pred: &dyn Fn(&TransactionRecord) -> bool,
        sort: SortOrder,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        let mut records = self.fetch_all(sort)?;
        records.retain(|r| pred(r));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn new_tx(merchant: &str, amount: f64, ts_ms: i64) -> NewTransaction {
        NewTransaction {
            merchant_name: merchant.into(),
            amount,
            timestamp: Some(Utc.timestamp_millis_opt(ts_ms).unwrap()),
            ..Default::default()
        }
    }

    #[test]
    fn create_and_fetch_roundtrip() {
        let store = SqliteStore::open_in_memory("CAD").unwrap();
        let created = store
            .create(NewTransaction {
                merchant_name: "  Starbucks ".into(),
                amount: -4.5,
                description: Some(" latte ".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(created.merchant_name, "Starbucks");
        assert_eq!(created.currency, "CAD");
        assert_eq!(created.description.as_deref(), Some("latte"));

        let all = store.fetch_all(SortOrder::TimestampDesc).unwrap();
        assert_eq!(all, vec![created]);
    }

    #[test]
    fn fetch_all_orders_by_timestamp_desc() {
        let store = SqliteStore::open_in_memory("CAD").unwrap();
        store.create(new_tx("Starbucks", -4.5, 1_000)).unwrap();
        store.create(new_tx("Star Market", -20.0, 2_000)).unwrap();

        let all = store.fetch_all(SortOrder::TimestampDesc).unwrap();
        let names: Vec<_> = all.iter().map(|r| r.merchant_name.as_str()).collect();
        assert_eq!(names, vec!["Star Market", "Starbucks"]);
    }

    #[test]
    fn update_refreshes_record() {
        let store = SqliteStore::open_in_memory("CAD").unwrap();
        let created = store.create(new_tx("Metro", -30.0, 1_000)).unwrap();
        let updated = store
            .update(
                created.id,
                TransactionPatch {
                    merchant_name: Some(" Metro Plus ".into()),
                    amount: Some(-35.0),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.merchant_name, "Metro Plus");
        assert_eq!(updated.amount, -35.0);

        let fetched = store
            .fetch_by_ids(&[created.id], SortOrder::TimestampDesc)
            .unwrap();
        assert_eq!(fetched, vec![updated]);
    }

    #[test]
    fn update_missing_is_not_found() {
        let store = SqliteStore::open_in_memory("CAD").unwrap();
        let err = store
            .update(Uuid::new_v4(), TransactionPatch::default())
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn delete_then_delete_again_is_not_found() {
        let store = SqliteStore::open_in_memory("CAD").unwrap();
        let created = store.create(new_tx("Metro", -30.0, 1_000)).unwrap();
        store.delete(created.id).unwrap();
        let err = store.delete(created.id).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert!(store.fetch_all(SortOrder::TimestampDesc).unwrap().is_empty());
    }

    #[test]
    fn fetch_by_ids_skips_absent() {
        let store = SqliteStore::open_in_memory("CAD").unwrap();
        let a = store.create(new_tx("A", 1.0, 1_000)).unwrap();
        let fetched = store
            .fetch_by_ids(&[a.id, Uuid::new_v4()], SortOrder::TimestampDesc)
            .unwrap();
        assert_eq!(fetched, vec![a]);
    }

    #[test]
    fn fetch_by_predicate_filters() {
        let store = SqliteStore::open_in_memory("CAD").unwrap();
        store.create(new_tx("A", -1.0, 1_000)).unwrap();
        store.create(new_tx("B", 2.0, 2_000)).unwrap();
        let expenses = store
            .fetch_by_predicate(&|r| r.amount < 0.0, SortOrder::TimestampDesc)
            .unwrap();
        assert_eq!(expenses.len(), 1);
        assert_eq!(expenses[0].merchant_name, "A");
    }
}
