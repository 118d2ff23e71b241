//! Debounced, cancelable query coordination.
//!
//! Each submission supersedes the previous one: the debounce timer and any
//! in-flight lookup for an older submission are abandoned, and their results
//! are discarded before they can reach the subscriber. Index lookups that
//! return nothing or fail fall back to direct content filtering over the
//! record store, which always yields conclusively correct results.

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::SearchConfig;
use crate::model::types::TransactionRecord;
use crate::search::filter::filter_records;
use crate::search::index::{IndexError, QueryEvent, SearchIndex};
use crate::storage::{RecordStore, SortOrder, StoreError};

/// Error surfaced to the subscriber. Index failures never appear here; only
/// a failure of the fallback path itself is reported, paired with an empty
/// result set.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search failed: {0}")]
    SearchFailed(String),
}

/// One delivered search outcome.
#[derive(Debug)]
pub struct SearchDelivery {
    /// The trimmed query text this outcome answers.
    pub query: String,
    pub records: Vec<TransactionRecord>,
    pub error: Option<SearchError>,
}

/// Supersession gate: delivery happens under the same lock that assigns
/// generations, so a result for generation N can never slip out after
/// generation N+1 has been issued.
struct DeliveryGate {
    generation: Mutex<u64>,
    tx: mpsc::UnboundedSender<SearchDelivery>,
}

impl DeliveryGate {
    fn supersede(&self) -> u64 {
        let mut generation = self.generation.lock();
        *generation += 1;
        *generation
    }

    fn is_current(&self, generation: u64) -> bool {
        *self.generation.lock() == generation
    }

    fn deliver(&self, generation: u64, delivery: SearchDelivery) -> bool {
        let current = self.generation.lock();
        if *current != generation {
            debug!(
                generation,
                current = *current,
                "discarding superseded search result"
            );
            return false;
        }
        // Subscriber may have gone away; that is not an error here.
        let _ = self.tx.send(delivery);
        true
    }
}

/// Coordinates raw query text into at most one delivered result per burst of
/// submissions.
pub struct QueryCoordinator {
    store: Arc<dyn RecordStore>,
    index: Arc<dyn SearchIndex>,
    config: SearchConfig,
    gate: Arc<DeliveryGate>,
}

impl QueryCoordinator {
    /// Create a coordinator and the receiver its deliveries arrive on.
    pub fn new(
        store: Arc<dyn RecordStore>,
        index: Arc<dyn SearchIndex>,
        config: SearchConfig,
    ) -> (Self, mpsc::UnboundedReceiver<SearchDelivery>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let gate = Arc::new(DeliveryGate {
            generation: Mutex::new(0),
            tx,
        });
        (
            Self {
                store,
                index,
                config,
                gate,
            },
            rx,
        )
    }

    /// Cancel any scheduled or in-flight query without scheduling a new one.
    pub fn cancel_pending(&self) {
        self.gate.supersede();
    }

    /// Submit raw query text. The result (for the newest submission only) is
    /// delivered asynchronously on the receiver returned by [`new`].
    ///
    /// Trimmed-empty text delivers an empty result immediately, without
    /// touching the index or the store.
    ///
    /// [`new`]: QueryCoordinator::new
    pub fn submit_query(&self, text: &str) {
        let generation = self.gate.supersede();
        let query = text.trim().to_string();

        if query.is_empty() {
            self.gate.deliver(
                generation,
                SearchDelivery {
                    query,
                    records: Vec::new(),
                    error: None,
                },
            );
            return;
        }

        let store = Arc::clone(&self.store);
        let index = Arc::clone(&self.index);
        let gate = Arc::clone(&self.gate);
        let debounce = self.config.debounce;
        let limit = self.config.result_limit;

        tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            if !gate.is_current(generation) {
                return;
            }

            let lookup = {
                let index = Arc::clone(&index);
                let query = query.clone();
                tokio::task::spawn_blocking(move || index_lookup(&index, &query, limit))
                    .await
                    .unwrap_or_else(|e| Err(IndexError::Unavailable(e.to_string())))
            };
            if !gate.is_current(generation) {
                return;
            }

            let delivery = match lookup {
                Ok(ids) if !ids.is_empty() => {
                    debug!(query = %query, matches = ids.len(), "index lookup hit");
                    resolve_matches(&store, &query, ids).await
                }
                Ok(_) => {
                    debug!(query = %query, "index lookup empty, falling back");
                    fallback_search(&store, &query).await
                }
                Err(e) => {
                    warn!(query = %query, error = %e, "index lookup failed, falling back");
                    fallback_search(&store, &query).await
                }
            };

            gate.deliver(generation, delivery);
        });
    }
}

/// Consume the index's event sequence, accumulating matched ids. Suggestions
/// are skipped; any event-level error fails the whole lookup so the caller
/// falls back.
fn index_lookup(
    index: &Arc<dyn SearchIndex>,
    query: &str,
    limit: usize,
) -> Result<Vec<Uuid>, IndexError> {
    let events = index.query(query, limit)?;
    let mut ids = Vec::new();
    for event in events {
        match event? {
            QueryEvent::Match(id) => ids.push(id),
            QueryEvent::Suggestion(_) => {}
        }
    }
    Ok(ids)
}

/// Resolve matched ids back to full records, newest first. Deleted ids fall
/// out naturally because the store only returns rows that still exist.
async fn resolve_matches(
    store: &Arc<dyn RecordStore>,
    query: &str,
    ids: Vec<Uuid>,
) -> SearchDelivery {
    let store = Arc::clone(store);
    let result = tokio::task::spawn_blocking(move || {
        store.fetch_by_ids(&ids, SortOrder::TimestampDesc)
    })
    .await
    .unwrap_or_else(|e| Err(StoreError::LoadFailed(e.to_string())));

    match result {
        Ok(records) => SearchDelivery {
            query: query.to_string(),
            records,
            error: None,
        },
        Err(e) => SearchDelivery {
            query: query.to_string(),
            records: Vec::new(),
            error: Some(SearchError::SearchFailed(e.to_string())),
        },
    }
}

/// Direct content filter over the store, the conclusive search path.
async fn fallback_search(store: &Arc<dyn RecordStore>, query: &str) -> SearchDelivery {
    let store = Arc::clone(store);
    let owned_query = query.to_string();
    let result = tokio::task::spawn_blocking(move || {
        store
            .fetch_all(SortOrder::TimestampDesc)
            .map(|records| filter_records(records, &owned_query))
    })
    .await
    .unwrap_or_else(|e| Err(StoreError::LoadFailed(e.to_string())));

    match result {
        Ok(records) => SearchDelivery {
            query: query.to_string(),
            records,
            error: None,
        },
        Err(e) => {
            warn!(query = %query, error = %e, "fallback search failed");
            SearchDelivery {
                query: query.to_string(),
                records: Vec::new(),
                error: Some(SearchError::SearchFailed(e.to_string())),
            }
        }
    }
}
