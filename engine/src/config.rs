//! Configuration for the reconciliation transaction.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::env;

/// Label used for the sync-completion write transaction.
pub const DEFAULT_TX_LABEL: &str = "sync-markLocalChangesAsSynced";

/// Settings that shape how local changes are marked as synced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconcileConfig {
    /// Name of the write transaction, used for logging and by adapters.
    pub tx_label: String,
    /// Raw fields left out of the send-time snapshot comparison.
    ///
    /// Empty means full raw equality. Only list fields that are purely local
    /// bookkeeping; anything the remote cares about must stay comparable.
    pub ignored_fields: BTreeSet<String>,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            tx_label: DEFAULT_TX_LABEL.to_string(),
            ignored_fields: BTreeSet::new(),
        }
    }
}

impl ReconcileConfig {
    /// Load configuration from environment variables.
    ///
    /// - `SETTLE_TX_LABEL`: transaction label
    /// - `SETTLE_IGNORED_FIELDS`: comma-separated field names
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let tx_label = match lookup("SETTLE_TX_LABEL") {
            Some(label) if label.trim().is_empty() => return Err(ConfigError::EmptyLabel),
            Some(label) => label.trim().to_string(),
            None => DEFAULT_TX_LABEL.to_string(),
        };

        let mut ignored_fields = BTreeSet::new();
        if let Some(raw) = lookup("SETTLE_IGNORED_FIELDS") {
            for name in raw.split(',').map(str::trim).filter(|n| !n.is_empty()) {
                if name == "id" {
                    return Err(ConfigError::IdNotIgnorable);
                }
                ignored_fields.insert(name.to_string());
            }
        }

        Ok(Self {
            tx_label,
            ignored_fields,
        })
    }

    /// Builder-style helper to exclude a field from comparison.
    pub fn ignore_field(mut self, name: impl Into<String>) -> Self {
        self.ignored_fields.insert(name.into());
        self
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("SETTLE_TX_LABEL must not be empty")]
    EmptyLabel,

    #[error("the id field cannot be excluded from snapshot comparison")]
    IdNotIgnorable,
}
