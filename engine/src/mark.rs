//! Preparing status flips to `synced`.

use crate::{adapter::Mutation, raw::RawRecord, record::Record};
use std::sync::Arc;

/// A status flip prepared for one eligible record.
///
/// The mutation goes into the transaction's batch; the live record only
/// takes the new raw after the transaction commits.
#[derive(Debug)]
pub struct PreparedMarkAsSynced {
    record: Arc<Record>,
    raw: RawRecord,
}

impl PreparedMarkAsSynced {
    /// The record being marked.
    pub fn record(&self) -> &Arc<Record> {
        &self.record
    }

    /// Raw state the record will have once committed.
    pub fn raw(&self) -> &RawRecord {
        &self.raw
    }

    /// Storage mutation for the batch.
    pub fn mutation(&self) -> Mutation {
        Mutation::Update {
            table: self.record.table().to_string(),
            raw: self.raw.clone(),
        }
    }

    /// Make the committed state visible on the live record.
    pub(crate) fn publish(self) {
        self.record.replace_raw(self.raw);
    }
}

/// Prepare a mutation setting `record` to synced with its fields untouched.
///
/// Eligibility is decided upstream; this does not re-check the snapshot.
pub fn prepare_mark_as_synced(record: &Arc<Record>) -> PreparedMarkAsSynced {
    PreparedMarkAsSynced {
        record: Arc::clone(record),
        raw: record.with_raw(RawRecord::synced),
    }
}
