//! Physical removal of rows deleted locally and confirmed by the remote.

use crate::{adapter::Transaction, changes::SyncLocalChanges, error::Result};
use futures::future::join_all;

/// Destroy every table's deleted ids inside `tx`, one request per table.
///
/// Tables without deletions are skipped entirely. All requests run
/// concurrently and are all awaited; the first failure is returned.
/// Returns the number of ids submitted for removal.
pub async fn destroy_deleted_records<T>(tx: &T, changes: &SyncLocalChanges) -> Result<usize>
where
    T: Transaction,
{
    let requests = changes.tables_with_deletions().map(|(table, ids)| async move {
        tracing::debug!(table = %table, count = ids.len(), "destroying deleted records");
        tx.destroy_deleted_records(table, ids)
            .await
            .map(|()| ids.len())
    });

    let counts = join_all(requests)
        .await
        .into_iter()
        .collect::<Result<Vec<usize>>>()?;

    Ok(counts.into_iter().sum())
}
