//! Sync eligibility: which pushed records are still safe to mark as synced.
//!
//! A record is eligible only if its live raw state still equals the snapshot
//! taken when it was sent. Anything touched after that stays pending and goes
//! out again on the next sync round.

use crate::{
    changes::SyncLocalChanges,
    raw::RawComparator,
    record::{find_record, Record},
};
use std::sync::Arc;

/// Outcome of resolving eligibility over a sync payload.
#[derive(Debug, Default)]
pub struct Eligibility {
    /// Records to mark as synced, per table in created-then-updated order
    pub records: Vec<Arc<Record>>,
    /// Snapshots whose live record changed since it was sent
    pub diverged: usize,
    /// Snapshots with no live record in the payload
    pub missing: usize,
}

/// Resolve the records that can be marked as synced.
pub fn resolve(changes: &SyncLocalChanges, comparator: &RawComparator) -> Eligibility {
    let mut eligibility = Eligibility::default();

    for (table, set) in &changes.changes {
        for snapshot in set.snapshots() {
            let Some(record) = find_record(table, &snapshot.id, &changes.affected_records) else {
                tracing::warn!(
                    table = %table,
                    id = %snapshot.id,
                    "record to mark as synced is not in the cache, skipping until next sync"
                );
                eligibility.missing += 1;
                continue;
            };

            if record.with_raw(|current| comparator.equal(current, snapshot)) {
                eligibility.records.push(Arc::clone(record));
            } else {
                tracing::debug!(
                    table = %table,
                    id = %snapshot.id,
                    "record changed since it was sent, leaving it pending"
                );
                eligibility.diverged += 1;
            }
        }
    }

    eligibility
}
