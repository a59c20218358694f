//! Raw record state and snapshot comparison.
//!
//! A [`RawRecord`] is the persisted shape of a record: its id, sync
//! bookkeeping (`_status`, `_changed`), and a flat map of field values.
//! Snapshots taken at push time are plain clones of it.

use crate::{config::ReconcileConfig, RecordId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Serialized name of the sync status column.
pub const STATUS_FIELD: &str = "_status";
/// Serialized name of the changed-columns column.
pub const CHANGED_FIELD: &str = "_changed";

/// Sync status of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Created locally, never pushed
    #[default]
    Created,
    /// Modified locally since the last push
    Updated,
    /// Matches what the remote has acknowledged
    Synced,
    /// Marked deleted locally, awaiting physical removal
    Deleted,
}

impl SyncStatus {
    /// Whether the record still has local changes the remote hasn't confirmed.
    pub fn is_pending(self) -> bool {
        !matches!(self, SyncStatus::Synced)
    }
}

/// Persisted field snapshot of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub id: RecordId,
    #[serde(rename = "_status")]
    pub status: SyncStatus,
    /// Columns modified locally since the last sync
    #[serde(rename = "_changed", default)]
    pub changed: Vec<String>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

impl RawRecord {
    /// Create a raw record for a freshly created local record.
    pub fn new(id: impl Into<RecordId>, fields: BTreeMap<String, Value>) -> Self {
        Self {
            id: id.into(),
            status: SyncStatus::Created,
            changed: Vec::new(),
            fields,
        }
    }

    /// Builder-style helper to set a single field.
    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Builder-style helper to set the sync status.
    pub fn with_status(mut self, status: SyncStatus) -> Self {
        self.status = status;
        self
    }

    /// Get a field value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Copy of this raw with sync bookkeeping reset and fields untouched.
    pub fn synced(&self) -> Self {
        Self {
            status: SyncStatus::Synced,
            changed: Vec::new(),
            ..self.clone()
        }
    }
}

/// Structural equality between a live raw and a send-time snapshot.
///
/// Every field takes part, including null values and the `_status`/`_changed`
/// bookkeeping, unless it was explicitly ignored. A field present on one side
/// and absent on the other is drift.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawComparator {
    ignored: BTreeSet<String>,
}

impl RawComparator {
    /// Comparator over the full raw surface.
    pub fn new() -> Self {
        Self::default()
    }

    /// Comparator that skips the given fields.
    pub fn ignoring<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ignored: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Comparator following the configured ignore policy.
    pub fn from_config(config: &ReconcileConfig) -> Self {
        Self {
            ignored: config.ignored_fields.clone(),
        }
    }

    /// Returns true iff `current` has not drifted from `snapshot`.
    pub fn equal(&self, current: &RawRecord, snapshot: &RawRecord) -> bool {
        if current.id != snapshot.id {
            return false;
        }
        if !self.ignores(STATUS_FIELD) && current.status != snapshot.status {
            return false;
        }
        if !self.ignores(CHANGED_FIELD) && current.changed != snapshot.changed {
            return false;
        }
        self.visible(&current.fields).eq(self.visible(&snapshot.fields))
    }

    fn ignores(&self, field: &str) -> bool {
        self.ignored.contains(field)
    }

    fn visible<'a>(
        &'a self,
        fields: &'a BTreeMap<String, Value>,
    ) -> impl Iterator<Item = (&'a String, &'a Value)> + 'a {
        fields.iter().filter(move |(name, _)| !self.ignores(name))
    }
}

/// Full-surface comparison, see [`RawComparator`].
pub fn raws_equal(current: &RawRecord, snapshot: &RawRecord) -> bool {
    RawComparator::new().equal(current, snapshot)
}
