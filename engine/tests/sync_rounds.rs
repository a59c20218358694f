//! End-to-end sync rounds against the in-memory adapter.
//!
//! Each test plays the part of the sync orchestrator: fetch local changes,
//! pretend the push succeeded, then mark the changes as synced.

use async_trait::async_trait;
use serde_json::{json, Value};
use settle_engine::{
    mark_local_changes_as_synced, ChangeSet, Database, Error, MemoryAdapter, MemoryTransaction,
    Mutation, RawRecord, Record, RecordId, StorageAdapter, SyncLocalChanges, SyncStatus,
    Transaction,
};
use std::collections::BTreeMap;
use std::sync::Arc;

fn fields(title: &str) -> BTreeMap<String, Value> {
    BTreeMap::from([("title".to_string(), json!(title))])
}

fn raw(id: &str, title: &str) -> RawRecord {
    RawRecord::new(id, fields(title))
}

/// Run a full round: everything pending is pushed and acknowledged.
async fn settle_round<A: StorageAdapter>(db: &Database<A>) {
    let changes = db.fetch_local_changes();
    mark_local_changes_as_synced(db, &changes).await.unwrap();
}

// ============================================================================
// Failure injection
// ============================================================================

/// Memory storage whose transactions fail on demand.
#[derive(Clone)]
struct FaultyAdapter {
    inner: MemoryAdapter,
    fail_destroy_in: Option<&'static str>,
}

struct FaultyTransaction {
    inner: MemoryTransaction,
    fail_destroy_in: Option<&'static str>,
}

#[async_trait]
impl StorageAdapter for FaultyAdapter {
    type Transaction = FaultyTransaction;

    async fn begin(&self, label: &str) -> settle_engine::error::Result<FaultyTransaction> {
        Ok(FaultyTransaction {
            inner: self.inner.begin(label).await?,
            fail_destroy_in: self.fail_destroy_in,
        })
    }
}

#[async_trait]
impl Transaction for FaultyTransaction {
    fn label(&self) -> &str {
        self.inner.label()
    }

    async fn batch(&self, mutations: Vec<Mutation>) -> settle_engine::error::Result<()> {
        self.inner.batch(mutations).await
    }

    async fn destroy_deleted_records(
        &self,
        table: &str,
        ids: &[RecordId],
    ) -> settle_engine::error::Result<()> {
        if self.fail_destroy_in == Some(table) {
            return Err(Error::Storage(format!("disk I/O error in {}", table)));
        }
        self.inner.destroy_deleted_records(table, ids).await
    }

    async fn commit(self) -> settle_engine::error::Result<()> {
        self.inner.commit().await
    }

    async fn rollback(self) -> settle_engine::error::Result<()> {
        self.inner.rollback().await
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn unchanged_record_is_marked_and_deleted_row_destroyed() {
    let adapter = MemoryAdapter::new(["tasks"]);
    adapter
        .seed("tasks", raw("z", "gone").with_status(SyncStatus::Deleted))
        .unwrap();
    let db = Database::new(adapter);
    let a = db.create("tasks", "a", fields("x")).await.unwrap();

    let changes = SyncLocalChanges::new()
        .with_table(
            "tasks",
            ChangeSet {
                created: vec![raw("a", "x")],
                updated: vec![],
                deleted: vec!["z".into()],
            },
        )
        .with_record(Arc::clone(&a));

    let report = mark_local_changes_as_synced(&db, &changes).await.unwrap();

    assert_eq!(report.marked, 1);
    assert_eq!(report.destroyed, 1);
    assert_eq!(a.status(), SyncStatus::Synced);
    assert!(!db.adapter().contains("tasks", "z"));
    assert_eq!(
        db.adapter().row("tasks", "a").unwrap().status,
        SyncStatus::Synced
    );
}

#[tokio::test]
async fn diverged_record_stays_pending() {
    let db = Database::new(MemoryAdapter::new(["tasks"]));
    let a = db.create("tasks", "a", fields("y")).await.unwrap();

    let changes = SyncLocalChanges::new()
        .with_table(
            "tasks",
            ChangeSet {
                created: vec![raw("a", "x")],
                updated: vec![],
                deleted: vec!["z".into()],
            },
        )
        .with_record(Arc::clone(&a));

    let report = mark_local_changes_as_synced(&db, &changes).await.unwrap();

    assert_eq!(report.marked, 0);
    assert_eq!(report.diverged, 1);
    assert_eq!(a.status(), SyncStatus::Created);
    assert_eq!(
        db.adapter().row("tasks", "a").unwrap().status,
        SyncStatus::Created
    );
}

#[tokio::test]
async fn record_edited_during_push_goes_out_next_round() {
    let db = Database::new(MemoryAdapter::new(["tasks"]));
    let a = db.create("tasks", "a", fields("x")).await.unwrap();
    settle_round(&db).await;

    // second round: edit, push, edit again before the acknowledgment
    db.update(&a, fields("y")).await.unwrap();
    let first = db.fetch_local_changes();
    db.update(&a, fields("z")).await.unwrap();

    let report = mark_local_changes_as_synced(&db, &first).await.unwrap();
    assert_eq!(report.diverged, 1);
    assert_eq!(a.status(), SyncStatus::Updated);

    // the next payload carries the latest state verbatim
    let second = db.fetch_local_changes();
    assert_eq!(second.changes["tasks"].updated, [a.raw()]);
    assert_eq!(a.raw().get("title"), Some(&json!("z")));

    let report = mark_local_changes_as_synced(&db, &second).await.unwrap();
    assert_eq!(report.marked, 1);
    assert_eq!(a.status(), SyncStatus::Synced);
}

#[tokio::test]
async fn missing_record_is_tolerated() {
    let db = Database::new(MemoryAdapter::new(["tasks"]));
    let changes = SyncLocalChanges::new().with_table(
        "tasks",
        ChangeSet {
            updated: vec![raw("evicted", "x")],
            ..ChangeSet::new()
        },
    );

    let report = mark_local_changes_as_synced(&db, &changes).await.unwrap();
    assert_eq!(report.missing, 1);
    assert_eq!(report.marked, 0);
}

#[tokio::test]
async fn deletion_failure_rolls_back_everything() {
    let inner = MemoryAdapter::new(["tasks", "projects"]);
    inner
        .seed("projects", raw("p", "old").with_status(SyncStatus::Deleted))
        .unwrap();
    inner
        .seed("tasks", raw("t", "old").with_status(SyncStatus::Deleted))
        .unwrap();
    let db = Database::new(FaultyAdapter {
        inner: inner.clone(),
        fail_destroy_in: Some("tasks"),
    });

    let a = db.create("projects", "a", fields("x")).await.unwrap();
    let changes = SyncLocalChanges::new()
        .with_table(
            "projects",
            ChangeSet {
                created: vec![a.raw()],
                deleted: vec!["p".into()],
                ..ChangeSet::new()
            },
        )
        .with_table(
            "tasks",
            ChangeSet {
                deleted: vec!["t".into()],
                ..ChangeSet::new()
            },
        )
        .with_record(Arc::clone(&a));

    let result = mark_local_changes_as_synced(&db, &changes).await;

    assert_eq!(
        result,
        Err(Error::Storage("disk I/O error in tasks".into()))
    );
    // nothing marked, no table's deletions committed
    assert_eq!(a.status(), SyncStatus::Created);
    assert_eq!(inner.row("projects", "a").unwrap().status, SyncStatus::Created);
    assert!(inner.contains("projects", "p"));
    assert!(inner.contains("tasks", "t"));

    // the same payload can be retried once storage recovers
    let db = Database::new(inner.clone());
    let a = Record::new("projects", a.raw());
    let retry = SyncLocalChanges {
        affected_records: vec![Arc::clone(&a)],
        ..changes
    };
    let report = mark_local_changes_as_synced(&db, &retry).await.unwrap();
    assert_eq!(report.marked, 1);
    assert_eq!(report.destroyed, 2);
    assert!(!inner.contains("projects", "p"));
    assert!(!inner.contains("tasks", "t"));
}

#[tokio::test]
async fn failure_keeps_store_writable() {
    let db = Database::new(FaultyAdapter {
        inner: MemoryAdapter::new(["tasks"]),
        fail_destroy_in: Some("tasks"),
    });
    let changes = SyncLocalChanges::new().with_table(
        "tasks",
        ChangeSet {
            deleted: vec!["t".into()],
            ..ChangeSet::new()
        },
    );

    assert!(mark_local_changes_as_synced(&db, &changes).await.is_err());

    // write lock was released
    let record = db.create("tasks", "after", fields("x")).await.unwrap();
    assert_eq!(record.status(), SyncStatus::Created);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_local_writes_are_serialized() {
    let db = Arc::new(Database::new(MemoryAdapter::new(["tasks"])));
    let mut records = Vec::new();
    for i in 0..20 {
        let id = format!("task_{}", i);
        records.push(db.create("tasks", id, fields("x")).await.unwrap());
    }
    let changes = db.fetch_local_changes();

    let writer = {
        let db = Arc::clone(&db);
        let records = records.clone();
        tokio::spawn(async move {
            for record in records.iter().step_by(2) {
                db.update(record, fields("edited")).await.unwrap();
            }
        })
    };
    let reconcile = {
        let db = Arc::clone(&db);
        tokio::spawn(async move { mark_local_changes_as_synced(&*db, &changes).await })
    };

    writer.await.unwrap();
    let report = reconcile.await.unwrap().unwrap();
    assert_eq!(report.marked + report.diverged, 20);

    // whatever the interleaving, memory and storage agree and no edit is lost
    for record in &records {
        let row = db.adapter().row("tasks", record.id()).unwrap();
        assert_eq!(row, record.raw());
        if row.get("title") == Some(&json!("edited")) {
            assert!(row.status.is_pending());
        }
    }
    for record in records.iter().step_by(2) {
        assert_eq!(record.raw().get("title"), Some(&json!("edited")));
    }
}
