//! Tantivy-backed `SearchIndex` implementation.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{INDEXED, STORED, STRING, Schema, TEXT, Term, Value};
use tantivy::TantivyDocument;
use tantivy::{Index, IndexReader, IndexWriter, doc};
use uuid::Uuid;

use crate::search::index::{IndexError, QueryEvent, QueryEvents, SearchIndex, SearchIndexEntry};

const SCHEMA_VERSION: &str = "v1";

#[derive(Clone, Copy)]
struct Fields {
    id: tantivy::schema::Field,
    title: tantivy::schema::Field,
    content: tantivy::schema::Field,
    label: tantivy::schema::Field,
    last_used: tantivy::schema::Field,
    expires_at: tantivy::schema::Field,
}

/// On-disk full-text index over transaction entries.
///
/// The id field is raw-tokenized so an upsert can atomically replace the
/// previous entry via delete-by-term followed by add.
pub struct TantivyTransactionIndex {
    writer: Mutex<IndexWriter>,
    reader: IndexReader,
    parser: QueryParser,
    fields: Fields,
    in_batch: AtomicBool,
}

impl TantivyTransactionIndex {
    pub fn open_or_create(path: &Path) -> Result<Self> {
        let schema = build_schema();
        std::fs::create_dir_all(path)?;
        let index = if path.join("meta.json").exists() {
            Index::open_in_dir(path)?
        } else {
            Index::create_in_dir(path, schema.clone())?
        };
        let writer = index
            .writer(50_000_000)
            .with_context(|| "create index writer")?;
        let reader = index.reader()?;
        let fields = fields_from_schema(&schema)?;
        let parser = QueryParser::for_index(&index, vec![fields.title, fields.content]);

        Ok(Self {
            writer: Mutex::new(writer),
            reader,
            parser,
            fields,
            in_batch: AtomicBool::new(false),
        })
    }

    fn commit(&self, writer: &mut IndexWriter) -> Result<(), IndexError> {
        writer
            .commit()
            .map_err(|e| IndexError::WriteFailed(e.to_string()))?;
        self.reader
            .reload()
            .map_err(|e| IndexError::ReadFailed(e.to_string()))?;
        Ok(())
    }

    fn commit_unless_batched(&self, writer: &mut IndexWriter) -> Result<(), IndexError> {
        if self.in_batch.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.commit(writer)
    }
}

impl SearchIndex for TantivyTransactionIndex {
    fn begin_batch(&self) {
        self.in_batch.store(true, Ordering::SeqCst);
    }

    fn upsert(
        &self,
        entries: &[SearchIndexEntry],
    ) -> Result<Vec<Result<(), IndexError>>, IndexError> {
        let mut writer = self.writer.lock();
        let mut results = Vec::with_capacity(entries.len());
        for entry in entries {
            writer.delete_term(Term::from_field_text(self.fields.id, &entry.id.to_string()));
            let result = writer
                .add_document(doc!(
                    self.fields.id => entry.id.to_string(),
                    self.fields.title => entry.title.clone(),
                    self.fields.content => entry.content.clone(),
                    self.fields.label => entry.display_label.clone(),
                    self.fields.last_used => entry.last_used_ms,
                    self.fields.expires_at => entry.expires_at_ms,
                ))
                .map(|_| ())
                .map_err(|e| IndexError::WriteFailed(e.to_string()));
            results.push(result);
        }
        self.commit_unless_batched(&mut writer)?;
        Ok(results)
    }

    fn remove(&self, ids: &[Uuid]) -> Result<(), IndexError> {
        let mut writer = self.writer.lock();
        for id in ids {
            writer.delete_term(Term::from_field_text(self.fields.id, &id.to_string()));
        }
        self.commit_unless_batched(&mut writer)
    }

    fn end_batch(&self) -> Result<(), IndexError> {
        let mut writer = self.writer.lock();
        let result = self.commit(&mut writer);
        self.in_batch.store(false, Ordering::SeqCst);
        result
    }

    fn query(&self, text: &str, limit: usize) -> Result<QueryEvents, IndexError> {
        let query = self
            .parser
            .parse_query(text)
            .map_err(|e| IndexError::InvalidQuery(e.to_string()))?;
        let searcher = self.reader.searcher();
        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(limit.max(1)).order_by_score())
            .map_err(|e| IndexError::ReadFailed(e.to_string()))?;

        let mut events: Vec<Result<QueryEvent, IndexError>> = Vec::with_capacity(top_docs.len());
        for (_score, addr) in top_docs {
            let doc: TantivyDocument = match searcher.doc(addr) {
                Ok(d) => d,
                Err(e) => {
                    events.push(Err(IndexError::ReadFailed(e.to_string())));
                    continue;
                }
            };
            let id = doc
                .get_first(self.fields.id)
                .and_then(|v| v.as_str())
                .and_then(|s| Uuid::parse_str(s).ok());
            match id {
                Some(id) => events.push(Ok(QueryEvent::Match(id))),
                None => events.push(Err(IndexError::ReadFailed(
                    "document missing id field".into(),
                ))),
            }
        }
        Ok(Box::new(events.into_iter()))
    }

    fn clear(&self) -> Result<(), IndexError> {
        let mut writer = self.writer.lock();
        writer
            .delete_all_documents()
            .map_err(|e| IndexError::WriteFailed(e.to_string()))?;
        self.commit(&mut writer)
    }
}

fn build_schema() -> Schema {
    let mut schema_builder = Schema::builder();
    schema_builder.add_text_field("id", STRING | STORED);
    schema_builder.add_text_field("title", TEXT | STORED);
    schema_builder.add_text_field("content", TEXT);
    schema_builder.add_text_field("label", STORED);
    schema_builder.add_i64_field("last_used", INDEXED | STORED);
    schema_builder.add_i64_field("expires_at", INDEXED | STORED);
    schema_builder.build()
}

fn fields_from_schema(schema: &Schema) -> Result<Fields> {
    let field = |name: &str| {
        schema
            .get_field(name)
            .map_err(|_| anyhow::anyhow!("schema missing {name}"))
    };
    Ok(Fields {
        id: field("id")?,
        title: field("title")?,
        content: field("content")?,
        label: field("label")?,
        last_used: field("last_used")?,
        expires_at: field("expires_at")?,
    })
}

/// Default index directory under `base`.
pub fn index_dir(base: &Path) -> Result<std::path::PathBuf> {
    let dir = base.join("index").join(SCHEMA_VERSION);
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::types::NewTransaction;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn entry(merchant: &str, ts_ms: i64) -> SearchIndexEntry {
        let record = NewTransaction {
            merchant_name: merchant.into(),
            amount: -1.0,
            timestamp: Some(Utc.timestamp_millis_opt(ts_ms).unwrap()),
            ..Default::default()
        }
        .normalize("CAD")
        .unwrap();
        SearchIndexEntry::from_record(&record)
    }

    fn matched_ids(index: &TantivyTransactionIndex, text: &str) -> Vec<Uuid> {
        index
            .query(text, 10)
            .unwrap()
            .filter_map(|e| match e {
                Ok(QueryEvent::Match(id)) => Some(id),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn upsert_then_query_matches() {
        let dir = TempDir::new().unwrap();
        let index = TantivyTransactionIndex::open_or_create(dir.path()).unwrap();
        let e = entry("Starbucks", 1_000);
        let results = index.upsert(std::slice::from_ref(&e)).unwrap();
        assert!(results.iter().all(Result::is_ok));
        assert_eq!(matched_ids(&index, "starbucks"), vec![e.id]);
    }

    #[test]
    fn upsert_replaces_previous_entry() {
        let dir = TempDir::new().unwrap();
        let index = TantivyTransactionIndex::open_or_create(dir.path()).unwrap();
        let mut e = entry("Starbucks", 1_000);
        index.upsert(std::slice::from_ref(&e)).unwrap();

        e.title = "Second Cup".into();
        e.content = "Second Cup".into();
        index.upsert(std::slice::from_ref(&e)).unwrap();

        assert!(matched_ids(&index, "starbucks").is_empty());
        assert_eq!(matched_ids(&index, "second"), vec![e.id]);
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let index = TantivyTransactionIndex::open_or_create(dir.path()).unwrap();
        let e = entry("Starbucks", 1_000);
        index.upsert(std::slice::from_ref(&e)).unwrap();
        index.remove(&[e.id]).unwrap();
        index.remove(&[e.id]).unwrap();
        assert!(matched_ids(&index, "starbucks").is_empty());
    }

    #[test]
    fn batch_writes_become_visible_at_end_batch() {
        let dir = TempDir::new().unwrap();
        let index = TantivyTransactionIndex::open_or_create(dir.path()).unwrap();
        index.begin_batch();
        index.upsert(&[entry("Starbucks", 1_000)]).unwrap();
        index.upsert(&[entry("Star Market", 2_000)]).unwrap();
        assert!(matched_ids(&index, "star").is_empty());
        index.end_batch().unwrap();
        assert_eq!(matched_ids(&index, "star").len(), 2);
    }

    #[test]
    fn malformed_query_is_invalid_query() {
        let dir = TempDir::new().unwrap();
        let index = TantivyTransactionIndex::open_or_create(dir.path()).unwrap();
        let err = index.query("title:(unbalanced", 10).err().unwrap();
        assert!(matches!(err, IndexError::InvalidQuery(_)));
    }

    #[test]
    fn clear_empties_the_projection() {
        let dir = TempDir::new().unwrap();
        let index = TantivyTransactionIndex::open_or_create(dir.path()).unwrap();
        index.upsert(&[entry("Starbucks", 1_000)]).unwrap();
        index.clear().unwrap();
        assert!(matched_ids(&index, "starbucks").is_empty());
    }
}
