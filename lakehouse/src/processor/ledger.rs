use crate::schema::TableKind;
use crate::storage::ObjectStorage;
use crate::utils::paths::ledger_key;
use chrono::{DateTime, Utc};
use common::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

pub fn content_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub source_key: String,
    pub rows: usize,
    pub loaded_at: DateTime<Utc>,
}

/// Content hashes of every staged object already inserted into one table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadLedger {
    entries: BTreeMap<String, LedgerEntry>,
}

impl LoadLedger {
    pub async fn load(storage: &dyn ObjectStorage, bucket: &str, table: TableKind) -> Result<Self> {
        match storage.get_object(bucket, &ledger_key(table.name())).await {
            Ok(data) => Ok(serde_json::from_slice(&data)?),
            Err(Error::NotFound(_)) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    pub async fn save(
        &self,
        storage: &dyn ObjectStorage,
        bucket: &str,
        table: TableKind,
    ) -> Result<()> {
        let data = serde_json::to_vec_pretty(self)?;
        storage
            .put_object(bucket, &ledger_key(table.name()), &data)
            .await
    }

    pub fn get(&self, hash: &str) -> Option<&LedgerEntry> {
        self.entries.get(hash)
    }

    pub fn record(&mut self, hash: String, entry: LedgerEntry) {
        self.entries.insert(hash, entry);
    }
}
