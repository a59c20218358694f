//! # Settle Engine
//!
//! Post-sync reconciliation for offline-first local stores.
//!
//! An offline-first store pushes its local changes to a remote source, and
//! the application keeps writing while that round trip is in flight. Once
//! the push succeeds, the store must record the remote's acknowledgment
//! without losing any of those concurrent writes. This crate does that
//! final step.
//!
//! ## Core Concepts
//!
//! ### Records
//!
//! Each record is a live [`Record`] owned by the store cache and identified
//! by `(table, id)`. Its persisted state is a [`RawRecord`]: fields plus a
//! [`SyncStatus`] (`created`, `updated`, `synced`, `deleted`) and the list of
//! columns changed since the last sync.
//!
//! ### Local changes
//!
//! [`Database::fetch_local_changes`] produces a [`SyncLocalChanges`]: per
//! table, a [`ChangeSet`] of created/updated raw snapshots and deleted ids,
//! plus the live records that were sent. The snapshots are what the remote
//! received.
//!
//! ### Reconciliation
//!
//! [`mark_local_changes_as_synced`] runs one write transaction that:
//! - marks every record whose live raw still equals its snapshot as `synced`
//! - leaves records touched after the push pending, to go out next round
//! - physically destroys rows whose deletion was pushed
//!
//! Status flips and deletions run concurrently inside the transaction and
//! commit together, or not at all.
//!
//! ## Quick Start
//!
//! ```rust
//! use settle_engine::{mark_local_changes_as_synced, Database, MemoryAdapter, SyncStatus};
//! use serde_json::json;
//! use std::collections::BTreeMap;
//!
//! # tokio_test_block_on(async {
//! // 1. Open a store over in-memory storage
//! let db = Database::new(MemoryAdapter::new(["tasks"]));
//!
//! // 2. Write locally
//! let fields = BTreeMap::from([("title".to_string(), json!("buy milk"))]);
//! let task = db.create("tasks", "task_1", fields).await.unwrap();
//!
//! // 3. Collect what to push, then push it (not shown)
//! let local = db.fetch_local_changes();
//!
//! // 4. After a successful push, settle the local bookkeeping
//! let report = mark_local_changes_as_synced(&db, &local).await.unwrap();
//! assert_eq!(report.marked, 1);
//! assert_eq!(task.status(), SyncStatus::Synced);
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```
//!
//! ## Storage
//!
//! Persistence sits behind [`StorageAdapter`] and [`Transaction`].
//! [`MemoryAdapter`] keeps everything in process.

pub mod adapter;
pub mod changes;
pub mod config;
pub mod database;
pub mod deletion;
pub mod eligibility;
pub mod error;
pub mod mark;
pub mod raw;
pub mod reconcile;
pub mod record;

// Re-export main types at crate root
pub use adapter::{MemoryAdapter, MemoryTransaction, Mutation, StorageAdapter, Transaction};
pub use changes::{ChangeSet, SyncLocalChanges};
pub use config::{ConfigError, ReconcileConfig, DEFAULT_TX_LABEL};
pub use database::{Database, WriteScope};
pub use deletion::destroy_deleted_records;
pub use eligibility::{resolve, Eligibility};
pub use error::Error;
pub use mark::{prepare_mark_as_synced, PreparedMarkAsSynced};
pub use raw::{raws_equal, RawComparator, RawRecord, SyncStatus};
pub use reconcile::{mark_local_changes_as_synced, ReconcileReport};
pub use record::{find_record, Record};

/// Type aliases for clarity
pub type RecordId = String;
pub type TableName = String;
