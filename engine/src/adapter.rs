//! Storage adapter seam.
//!
//! The engine never touches persistence directly. It opens a write
//! transaction through a [`StorageAdapter`], issues batched mutations and
//! physical deletions on the returned [`Transaction`], then commits or rolls
//! back. [`MemoryAdapter`] is the in-memory implementation used by tests,
//! benchmarks, and embedders that keep everything in process.

use crate::{error::Result, raw::RawRecord, Error, RecordId, TableName};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// A prepared write against one row.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Insert a new row
    Create { table: TableName, raw: RawRecord },
    /// Replace an existing row with `raw`
    Update { table: TableName, raw: RawRecord },
}

impl Mutation {
    /// Table the mutation targets.
    pub fn table(&self) -> &str {
        match self {
            Mutation::Create { table, .. } | Mutation::Update { table, .. } => table.as_str(),
        }
    }

    /// Raw state written by the mutation.
    pub fn raw(&self) -> &RawRecord {
        match self {
            Mutation::Create { raw, .. } | Mutation::Update { raw, .. } => raw,
        }
    }
}

/// Opens write transactions against the underlying storage.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    type Transaction: Transaction;

    /// Begin a write transaction. `label` names it for diagnostics.
    async fn begin(&self, label: &str) -> Result<Self::Transaction>;
}

/// An open write transaction.
///
/// Writes take `&self` so several of them can be in flight at once inside
/// the same transaction. Nothing is visible outside until [`commit`] returns.
///
/// [`commit`]: Transaction::commit
#[async_trait]
pub trait Transaction: Send + Sync {
    /// Label the transaction was opened with.
    fn label(&self) -> &str;

    /// Apply prepared mutations as one batched write.
    async fn batch(&self, mutations: Vec<Mutation>) -> Result<()>;

    /// Physically remove rows that were marked deleted.
    async fn destroy_deleted_records(&self, table: &str, ids: &[RecordId]) -> Result<()>;

    /// Make every write issued in this transaction durable and visible.
    async fn commit(self) -> Result<()>;

    /// Discard every write issued in this transaction.
    async fn rollback(self) -> Result<()>;
}

type Rows = BTreeMap<RecordId, RawRecord>;
type Tables = HashMap<TableName, Rows>;

/// Pending writes for one table: `Some` upserts the row, `None` removes it.
type StagedRows = BTreeMap<RecordId, Option<RawRecord>>;
type Overlay = HashMap<TableName, StagedRows>;

/// In-memory storage keyed by table, then record id.
///
/// Transactions stage their writes in a private overlay and apply only
/// those writes on commit. Rows written outside the transaction in the
/// meantime are left alone.
#[derive(Debug, Clone, Default)]
pub struct MemoryAdapter {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryAdapter {
    /// Create storage with the given (empty) tables.
    pub fn new<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TableName>,
    {
        let tables = tables
            .into_iter()
            .map(|name| (name.into(), Rows::new()))
            .collect();
        Self {
            tables: Arc::new(Mutex::new(tables)),
        }
    }

    /// Write a row directly, outside any transaction.
    pub fn seed(&self, table: &str, raw: RawRecord) -> Result<()> {
        let mut tables = self.tables.lock();
        let rows = tables
            .get_mut(table)
            .ok_or_else(|| Error::TableNotFound(table.to_string()))?;
        rows.insert(raw.id.clone(), raw);
        Ok(())
    }

    /// Get a committed row.
    pub fn row(&self, table: &str, id: &str) -> Option<RawRecord> {
        self.tables
            .lock()
            .get(table)
            .and_then(|rows| rows.get(id))
            .cloned()
    }

    /// Check if a committed row exists.
    pub fn contains(&self, table: &str, id: &str) -> bool {
        self.row(table, id).is_some()
    }

    /// Count of committed rows in a table.
    pub fn count(&self, table: &str) -> usize {
        self.tables.lock().get(table).map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl StorageAdapter for MemoryAdapter {
    type Transaction = MemoryTransaction;

    async fn begin(&self, label: &str) -> Result<MemoryTransaction> {
        Ok(MemoryTransaction {
            label: label.to_string(),
            target: Arc::clone(&self.tables),
            staged: Mutex::new(Overlay::new()),
        })
    }
}

/// Transaction over a [`MemoryAdapter`].
#[derive(Debug)]
pub struct MemoryTransaction {
    label: String,
    target: Arc<Mutex<Tables>>,
    staged: Mutex<Overlay>,
}

impl MemoryTransaction {
    // Lock order is always overlay, then committed tables.
    fn with_staged<R>(&self, f: impl FnOnce(&mut Overlay, &Tables) -> Result<R>) -> Result<R> {
        let mut staged = self.staged.lock();
        let committed = self.target.lock();
        f(&mut staged, &committed)
    }
}

fn staged_rows<'a>(
    overlay: &'a mut Overlay,
    committed: &'a Tables,
    table: &str,
) -> Result<(&'a mut StagedRows, &'a Rows)> {
    let rows = committed
        .get(table)
        .ok_or_else(|| Error::TableNotFound(table.to_string()))?;
    Ok((overlay.entry(table.to_string()).or_default(), rows))
}

/// Whether `id` exists as seen from inside the transaction.
fn visible(staged: &StagedRows, rows: &Rows, id: &str) -> bool {
    match staged.get(id) {
        Some(entry) => entry.is_some(),
        None => rows.contains_key(id),
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    fn label(&self) -> &str {
        &self.label
    }

    async fn batch(&self, mutations: Vec<Mutation>) -> Result<()> {
        self.with_staged(|overlay, committed| {
            for mutation in mutations {
                match mutation {
                    Mutation::Create { table, raw } => {
                        let (staged, rows) = staged_rows(overlay, committed, &table)?;
                        if visible(staged, rows, &raw.id) {
                            return Err(Error::RecordAlreadyExists(table, raw.id));
                        }
                        staged.insert(raw.id.clone(), Some(raw));
                    }
                    Mutation::Update { table, raw } => {
                        let (staged, rows) = staged_rows(overlay, committed, &table)?;
                        if !visible(staged, rows, &raw.id) {
                            return Err(Error::RecordNotFound(table, raw.id));
                        }
                        staged.insert(raw.id.clone(), Some(raw));
                    }
                }
            }
            Ok(())
        })
    }

    async fn destroy_deleted_records(&self, table: &str, ids: &[RecordId]) -> Result<()> {
        self.with_staged(|overlay, committed| {
            let (staged, _) = staged_rows(overlay, committed, table)?;
            for id in ids {
                staged.insert(id.clone(), None);
            }
            Ok(())
        })
    }

    async fn commit(self) -> Result<()> {
        let overlay = self.staged.into_inner();
        let mut tables = self.target.lock();
        for (table, staged) in overlay {
            let Some(rows) = tables.get_mut(&table) else {
                continue;
            };
            for (id, entry) in staged {
                match entry {
                    Some(raw) => {
                        rows.insert(id, raw);
                    }
                    None => {
                        rows.remove(&id);
                    }
                }
            }
        }
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}
