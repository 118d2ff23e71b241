//! Two-tier transaction search: semantic index lookup with a content-filter
//! fallback, plus the synchronization that keeps the index consistent with
//! the record store.

pub mod coordinator;
pub mod filter;
pub mod index;
pub mod memory;
pub mod sync;
pub mod tantivy;
