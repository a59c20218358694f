//! Local change payloads exchanged with the sync orchestrator.

use crate::{raw::RawRecord, record::Record, RecordId, TableName};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Created, updated and deleted changes of one table in one sync round.
///
/// An id appears in at most one of the three sequences.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    /// Send-time snapshots of locally created records
    pub created: Vec<RawRecord>,
    /// Send-time snapshots of locally updated records
    pub updated: Vec<RawRecord>,
    /// Ids of records marked deleted locally
    pub deleted: Vec<RecordId>,
}

impl ChangeSet {
    /// Create an empty change set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshots in push order: created first, then updated.
    pub fn snapshots(&self) -> impl Iterator<Item = &RawRecord> {
        self.created.iter().chain(self.updated.iter())
    }

    /// Number of created and updated snapshots.
    pub fn pending_len(&self) -> usize {
        self.created.len() + self.updated.len()
    }

    /// Check if there is nothing to reconcile for this table.
    pub fn is_empty(&self) -> bool {
        self.pending_len() == 0 && self.deleted.is_empty()
    }
}

/// Everything a push sent, as handed back for reconciliation.
#[derive(Debug, Clone, Default)]
pub struct SyncLocalChanges {
    /// Change sets by table name (ordered for deterministic batches)
    pub changes: BTreeMap<TableName, ChangeSet>,
    /// Live record instances included in the push
    pub affected_records: Vec<Arc<Record>>,
}

impl SyncLocalChanges {
    /// Create an empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style helper to attach a table's change set.
    pub fn with_table(mut self, table: impl Into<TableName>, changes: ChangeSet) -> Self {
        self.changes.insert(table.into(), changes);
        self
    }

    /// Builder-style helper to attach a live record.
    pub fn with_record(mut self, record: Arc<Record>) -> Self {
        self.affected_records.push(record);
        self
    }

    /// Check if no table carries any change.
    pub fn is_empty(&self) -> bool {
        self.changes.values().all(ChangeSet::is_empty)
    }

    /// Tables with at least one id to destroy.
    pub fn tables_with_deletions(&self) -> impl Iterator<Item = (&TableName, &[RecordId])> {
        self.changes
            .iter()
            .filter(|(_, set)| !set.deleted.is_empty())
            .map(|(table, set)| (table, set.deleted.as_slice()))
    }
}
