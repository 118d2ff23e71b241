//! In-memory `SearchIndex` implementation.
//!
//! Suitable for light deployments and tests: folded substring matching over
//! entry title and content, ranked by the entry's last-used timestamp.
//! Batched writes are staged and become visible on `end_batch`, matching the
//! on-disk implementation's visibility semantics.

use std::collections::HashMap;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::search::filter::fold_for_match;
use crate::search::index::{IndexError, QueryEvent, QueryEvents, SearchIndex, SearchIndexEntry};

#[derive(Default)]
struct State {
    live: HashMap<Uuid, SearchIndexEntry>,
    staged: Vec<StagedOp>,
    in_batch: bool,
}

enum StagedOp {
    Upsert(SearchIndexEntry),
    Remove(Uuid),
}

#[derive(Default)]
pub struct MemoryIndex {
    state: RwLock<State>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.state.read().live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SearchIndex for MemoryIndex {
    fn begin_batch(&self) {
        self.state.write().in_batch = true;
    }

    fn upsert(
        &self,
        entries: &[SearchIndexEntry],
    ) -> Result<Vec<Result<(), IndexError>>, IndexError> {
        let mut state = self.state.write();
        for entry in entries {
            if state.in_batch {
                state.staged.push(StagedOp::Upsert(entry.clone()));
            } else {
                state.live.insert(entry.id, entry.clone());
            }
        }
        Ok(entries.iter().map(|_| Ok(())).collect())
    }

    fn remove(&self, ids: &[Uuid]) -> Result<(), IndexError> {
        let mut state = self.state.write();
        for id in ids {
            if state.in_batch {
                state.staged.push(StagedOp::Remove(*id));
            } else {
                state.live.remove(id);
            }
        }
        Ok(())
    }

    fn end_batch(&self) -> Result<(), IndexError> {
        let mut state = self.state.write();
        let staged = std::mem::take(&mut state.staged);
        for op in staged {
            match op {
                StagedOp::Upsert(entry) => {
                    state.live.insert(entry.id, entry);
                }
                StagedOp::Remove(id) => {
                    state.live.remove(&id);
                }
            }
        }
        state.in_batch = false;
        Ok(())
    }

    fn query(&self, text: &str, limit: usize) -> Result<QueryEvents, IndexError> {
        let folded = fold_for_match(text.trim());
        if folded.is_empty() {
            return Err(IndexError::InvalidQuery("empty query".into()));
        }
        let state = self.state.read();
        let mut hits: Vec<&SearchIndexEntry> = state
            .live
            .values()
            .filter(|e| {
                fold_for_match(&e.title).contains(&folded)
                    || fold_for_match(&e.content).contains(&folded)
            })
            .collect();
        hits.sort_by(|a, b| b.last_used_ms.cmp(&a.last_used_ms));
        hits.truncate(limit);

        // Title completions ride along as suggestion events; consumers that
        // only want matches skip them.
        let mut events: Vec<Result<QueryEvent, IndexError>> = Vec::new();
        for hit in &hits {
            if fold_for_match(&hit.title).starts_with(&folded) {
                events.push(Ok(QueryEvent::Suggestion(hit.title.clone())));
            }
        }
        events.extend(hits.into_iter().map(|e| Ok(QueryEvent::Match(e.id))));
        Ok(Box::new(events.into_iter()))
    }

    fn clear(&self) -> Result<(), IndexError> {
        let mut state = self.state.write();
        state.live.clear();
        state.staged.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::types::NewTransaction;
    use chrono::{TimeZone, Utc};

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

    fn matched_ids(index: &MemoryIndex, text: &str) -> Vec<Uuid> {
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
    fn matches_are_ranked_newest_first() {
        let index = MemoryIndex::new();
        let old = entry("Starbucks", 1_000);
        let new = entry("Star Market", 2_000);
        index.upsert(&[old.clone(), new.clone()]).unwrap();
        assert_eq!(matched_ids(&index, "star"), vec![new.id, old.id]);
    }

    #[test]
    fn batch_visibility_deferred_to_end_batch() {
        let index = MemoryIndex::new();
        index.begin_batch();
        index.upsert(&[entry("Starbucks", 1_000)]).unwrap();
        assert!(matched_ids(&index, "star").is_empty());
        index.end_batch().unwrap();
        assert_eq!(matched_ids(&index, "star").len(), 1);
    }

    #[test]
    fn emits_suggestions_for_title_prefixes() {
        let index = MemoryIndex::new();
        index.upsert(&[entry("Starbucks", 1_000)]).unwrap();
        let events: Vec<_> = index.query("star", 10).unwrap().collect();
        assert!(events.iter().any(|e| matches!(
            e,
            Ok(QueryEvent::Suggestion(s)) if s == "Starbucks"
        )));
    }

    #[test]
    fn empty_query_is_invalid() {
        let index = MemoryIndex::new();
        assert!(matches!(
            index.query("  ", 10).err().unwrap(),
            IndexError::InvalidQuery(_)
        ));
    }
}
