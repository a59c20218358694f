//! Live records tracked by the in-memory cache.

use crate::{raw::RawRecord, RecordId, SyncStatus, TableName};
use parking_lot::RwLock;
use std::sync::Arc;

/// A live record instance shared between the store cache and sync payloads.
///
/// The `(table, id)` identity is fixed. The raw state changes over time and
/// is only written by the owning [`Database`](crate::Database).
#[derive(Debug)]
pub struct Record {
    table: TableName,
    id: RecordId,
    raw: RwLock<RawRecord>,
}

impl Record {
    /// Wrap a raw record as a live, shareable instance.
    pub fn new(table: impl Into<TableName>, raw: RawRecord) -> Arc<Self> {
        Arc::new(Self {
            table: table.into(),
            id: raw.id.clone(),
            raw: RwLock::new(raw),
        })
    }

    /// Table this record belongs to.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Record identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Copy of the current raw state.
    pub fn raw(&self) -> RawRecord {
        self.raw.read().clone()
    }

    /// Current sync status.
    pub fn status(&self) -> SyncStatus {
        self.raw.read().status
    }

    /// Run `f` against the current raw state without copying it.
    pub fn with_raw<R>(&self, f: impl FnOnce(&RawRecord) -> R) -> R {
        f(&self.raw.read())
    }

    pub(crate) fn replace_raw(&self, raw: RawRecord) {
        *self.raw.write() = raw;
    }

    /// Whether this instance is the record `(table, id)`.
    pub fn is(&self, table: &str, id: &str) -> bool {
        self.table == table && self.id == id
    }
}

/// Find the live record for `(table, id)` among `candidates`.
///
/// Linear scan, first match wins. `None` is an expected outcome: the record
/// may have been evicted or destroyed since it was sent.
pub fn find_record<'a>(
    table: &str,
    id: &str,
    candidates: &'a [Arc<Record>],
) -> Option<&'a Arc<Record>> {
    candidates.iter().find(|record| record.is(table, id))
}
