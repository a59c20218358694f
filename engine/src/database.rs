//! Database - the local store facade.
//!
//! Owns the storage adapter, the cache of live records, and the store-wide
//! write lock. Every write, local or sync-driven, runs inside one adapter
//! transaction while holding that lock, so writes never interleave.

use crate::{
    adapter::{Mutation, StorageAdapter, Transaction},
    changes::{ChangeSet, SyncLocalChanges},
    config::ReconcileConfig,
    error::Result,
    raw::{RawComparator, RawRecord},
    record::Record,
    Error, RecordId, SyncStatus, TableName,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::MutexGuard;

type Cache = BTreeMap<TableName, BTreeMap<RecordId, Arc<Record>>>;

/// An open write transaction holding the store-wide write lock.
///
/// Dropping the scope without committing releases the lock and leaves the
/// transaction to the adapter, which must treat it as rolled back.
pub struct WriteScope<'a, T> {
    _guard: MutexGuard<'a, ()>,
    tx: T,
}

impl<T: Transaction> WriteScope<'_, T> {
    /// The transaction writes are issued on.
    pub fn tx(&self) -> &T {
        &self.tx
    }

    /// Commit, then release the write lock.
    pub async fn commit(self) -> Result<()> {
        self.commit_then(|| ()).await
    }

    /// Commit, run `on_commit`, then release the write lock.
    ///
    /// `on_commit` is where in-memory state follows the committed rows; it
    /// runs before any other writer can get in.
    pub async fn commit_then<F>(self, on_commit: F) -> Result<()>
    where
        F: FnOnce() + Send,
    {
        let label = self.tx.label().to_string();
        self.tx.commit().await?;
        on_commit();
        tracing::debug!(label = %label, "transaction committed");
        Ok(())
    }

    /// Roll back, then release the write lock.
    pub async fn rollback(self) -> Result<()> {
        let label = self.tx.label().to_string();
        self.tx.rollback().await?;
        tracing::debug!(label = %label, "transaction rolled back");
        Ok(())
    }

    /// Roll back after `cause` and hand `cause` back.
    ///
    /// A failing rollback is logged; the caller still sees the original error.
    pub async fn abort(self, cause: Error) -> Error {
        let label = self.tx.label().to_string();
        tracing::warn!(label = %label, error = %cause, "transaction failed, rolling back");
        if let Err(err) = self.tx.rollback().await {
            tracing::warn!(label = %label, error = %err, "rollback failed");
        }
        cause
    }
}

/// The local store.
pub struct Database<A: StorageAdapter> {
    adapter: A,
    config: ReconcileConfig,
    comparator: RawComparator,
    cache: Mutex<Cache>,
    write_lock: tokio::sync::Mutex<()>,
}

impl<A: StorageAdapter> Database<A> {
    /// Create a store over `adapter` with default configuration.
    pub fn new(adapter: A) -> Self {
        Self::with_config(adapter, ReconcileConfig::default())
    }

    /// Create a store over `adapter` with the given configuration.
    pub fn with_config(adapter: A, config: ReconcileConfig) -> Self {
        let comparator = RawComparator::from_config(&config);
        Self {
            adapter,
            config,
            comparator,
            cache: Mutex::new(Cache::new()),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Get the storage adapter.
    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Get the configuration.
    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Snapshot comparator following the configured policy.
    pub fn comparator(&self) -> &RawComparator {
        &self.comparator
    }

    /// Wait for the write lock and open a transaction named `label`.
    pub async fn write(&self, label: &str) -> Result<WriteScope<'_, A::Transaction>> {
        let guard = self.write_lock.lock().await;
        let tx = self.adapter.begin(label).await?;
        tracing::debug!(label = %label, "transaction started");
        Ok(WriteScope { _guard: guard, tx })
    }

    /// Get the live record for `(table, id)`, including ones marked deleted.
    pub fn find(&self, table: &str, id: &str) -> Option<Arc<Record>> {
        self.cache
            .lock()
            .get(table)
            .and_then(|records| records.get(id))
            .cloned()
    }

    /// Create a record locally.
    pub async fn create(
        &self,
        table: &str,
        id: impl Into<RecordId>,
        fields: BTreeMap<String, Value>,
    ) -> Result<Arc<Record>> {
        let raw = RawRecord::new(id, fields);
        let scope = self.write("local-create").await?;
        if self.find(table, &raw.id).is_some() {
            let err = Error::RecordAlreadyExists(table.to_string(), raw.id);
            return Err(scope.abort(err).await);
        }

        let record = Record::new(table, raw.clone());
        let mutation = Mutation::Create {
            table: table.to_string(),
            raw,
        };
        let cached = Arc::clone(&record);
        self.apply_local(scope, mutation, move || {
            self.cache
                .lock()
                .entry(cached.table().to_string())
                .or_default()
                .insert(cached.id().to_string(), cached);
        })
        .await?;
        Ok(record)
    }

    /// Update fields of a record locally.
    ///
    /// Fields not listed keep their value. Changed columns are tracked and
    /// the status moves to `updated` unless the record was never pushed.
    pub async fn update(&self, record: &Arc<Record>, fields: BTreeMap<String, Value>) -> Result<()> {
        let scope = self.write("local-update").await?;
        let current = record.raw();
        if current.status == SyncStatus::Deleted {
            let err = Error::RecordNotFound(record.table().to_string(), record.id().to_string());
            return Err(scope.abort(err).await);
        }

        let mut next = current.clone();
        for (name, value) in fields {
            if next.fields.get(&name) == Some(&value) {
                continue;
            }
            if !next.changed.contains(&name) {
                next.changed.push(name.clone());
            }
            next.fields.insert(name, value);
        }
        if next == current {
            return scope.rollback().await;
        }
        if next.status == SyncStatus::Synced {
            next.status = SyncStatus::Updated;
        }

        let mutation = Mutation::Update {
            table: record.table().to_string(),
            raw: next.clone(),
        };
        self.apply_local(scope, mutation, || record.replace_raw(next))
            .await
    }

    /// Mark a record as deleted locally.
    ///
    /// The row stays in storage until a sync round confirms the deletion.
    pub async fn mark_as_deleted(&self, record: &Arc<Record>) -> Result<()> {
        let scope = self.write("local-markAsDeleted").await?;
        let current = record.raw();
        if current.status == SyncStatus::Deleted {
            return scope.rollback().await;
        }

        let next = current.with_status(SyncStatus::Deleted);
        let mutation = Mutation::Update {
            table: record.table().to_string(),
            raw: next.clone(),
        };
        self.apply_local(scope, mutation, || record.replace_raw(next))
            .await
    }

    /// Collect every pending local change for the next push.
    ///
    /// Created and updated records contribute a raw snapshot and their live
    /// instance; deleted records contribute their id.
    pub fn fetch_local_changes(&self) -> SyncLocalChanges {
        let cache = self.cache.lock();
        let mut local = SyncLocalChanges::new();

        for (table, records) in cache.iter() {
            let mut set = ChangeSet::new();
            for record in records.values() {
                let raw = record.raw();
                match raw.status {
                    SyncStatus::Created => set.created.push(raw),
                    SyncStatus::Updated => set.updated.push(raw),
                    SyncStatus::Deleted => {
                        set.deleted.push(raw.id);
                        continue;
                    }
                    SyncStatus::Synced => continue,
                }
                local.affected_records.push(Arc::clone(record));
            }
            if !set.is_empty() {
                local.changes.insert(table.clone(), set);
            }
        }

        local
    }

    /// Drop destroyed records from the cache.
    pub(crate) fn evict(&self, table: &str, ids: &[RecordId]) {
        let mut cache = self.cache.lock();
        if let Some(records) = cache.get_mut(table) {
            for id in ids {
                records.remove(id);
            }
        }
    }

    async fn apply_local<F>(
        &self,
        scope: WriteScope<'_, A::Transaction>,
        mutation: Mutation,
        on_commit: F,
    ) -> Result<()>
    where
        F: FnOnce() + Send,
    {
        if let Err(err) = scope.tx().batch(vec![mutation]).await {
            return Err(scope.abort(err).await);
        }
        scope.commit_then(on_commit).await
    }
}
