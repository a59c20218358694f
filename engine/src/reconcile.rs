//! Post-push reconciliation: marking sent changes as synced.
//!
//! After a push succeeds, the local store has to record the remote's
//! acknowledgment without losing anything the application wrote while the
//! push was in flight.
//!
//! # Algorithm
//!
//! 1. Take the store-wide write lock and open one transaction
//! 2. Resolve eligible records: live raw still equals the send-time snapshot
//! 3. Concurrently: batch the status flips, destroy every table's deletions
//! 4. Await both; commit only if both succeeded, otherwise roll back
//! 5. After commit, publish synced raws to live records and evict destroyed ones
//!
//! Records that changed after they were sent are left pending and go out
//! again on the next sync round.

use crate::{
    adapter::{Mutation, StorageAdapter, Transaction},
    changes::SyncLocalChanges,
    database::Database,
    deletion::destroy_deleted_records,
    eligibility::resolve,
    error::Result,
    mark::{prepare_mark_as_synced, PreparedMarkAsSynced},
};
use serde::{Deserialize, Serialize};
use tracing::Instrument;

/// What a reconciliation did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    /// Records flipped to synced
    pub marked: usize,
    /// Records left pending because they changed after being sent
    pub diverged: usize,
    /// Snapshots skipped because their record was not in the cache
    pub missing: usize,
    /// Ids submitted for physical removal
    pub destroyed: usize,
}

/// Mark the changes of a successful push as synced.
///
/// Runs as a single write transaction labelled with
/// [`ReconcileConfig::tx_label`](crate::ReconcileConfig::tx_label), inside a
/// `reconcile` debug span whose `label` field carries that label. Either
/// every eligible record is marked and every deletion applied, or nothing
/// is. Storage errors come back unchanged; there is no retry here.
pub async fn mark_local_changes_as_synced<A>(
    db: &Database<A>,
    changes: &SyncLocalChanges,
) -> Result<ReconcileReport>
where
    A: StorageAdapter,
{
    let label = db.config().tx_label.as_str();
    let span = tracing::debug_span!("reconcile", label = %label);
    reconcile(db, changes, label).instrument(span).await
}

async fn reconcile<A>(
    db: &Database<A>,
    changes: &SyncLocalChanges,
    label: &str,
) -> Result<ReconcileReport>
where
    A: StorageAdapter,
{
    let scope = db.write(label).await?;

    let eligibility = resolve(changes, db.comparator());
    let prepared: Vec<PreparedMarkAsSynced> = eligibility
        .records
        .iter()
        .map(prepare_mark_as_synced)
        .collect();
    let mutations: Vec<Mutation> = prepared.iter().map(PreparedMarkAsSynced::mutation).collect();

    let tx = scope.tx();
    let mark = async move {
        if mutations.is_empty() {
            return Ok(());
        }
        tx.batch(mutations).await
    };
    let (marked, destroyed) = futures::join!(mark, destroy_deleted_records(tx, changes));

    let destroyed = match marked.and(destroyed) {
        Ok(destroyed) => destroyed,
        Err(err) => return Err(scope.abort(err).await),
    };

    let report = ReconcileReport {
        marked: prepared.len(),
        diverged: eligibility.diverged,
        missing: eligibility.missing,
        destroyed,
    };

    scope
        .commit_then(|| {
            for flip in prepared {
                flip.publish();
            }
            for (table, ids) in changes.tables_with_deletions() {
                db.evict(table, ids);
            }
        })
        .await?;

    tracing::info!(
        marked = report.marked,
        diverged = report.diverged,
        missing = report.missing,
        destroyed = report.destroyed,
        "local changes marked as synced"
    );
    Ok(report)
}
