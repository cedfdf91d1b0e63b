// Drafts — per-account scratch storage for unsubmitted form edits
//
// A draft survives page reloads for 24 hours. Expiry is lazy: a stale record
// stays in storage until the next read of that account, which deletes it.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::backend::StorageBackend;
use crate::clock::Clock;
use crate::DraftStoreError;

/// Partially edited fields of one record, as sent by the form
pub type FieldMap = Map<String, Value>;

/// Edited contact fields keyed by contact id
pub type ContactEdits = BTreeMap<String, FieldMap>;

/// A persisted draft
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<FieldMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contacts: Option<ContactEdits>,
    /// When the draft was saved (unix millis)
    pub timestamp: u64,
}

impl DraftRecord {
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.timestamp)
    }

    pub fn is_expired(&self, now_ms: u64, ttl_ms: u64) -> bool {
        self.age_ms(now_ms) > ttl_ms
    }
}

/// Draft persistence over a key/value backend
pub struct DraftStore {
    storage: Arc<dyn StorageBackend>,
    clock: Arc<dyn Clock>,
    ttl_ms: u64,
    key_prefix: String,
}

impl DraftStore {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        clock: Arc<dyn Clock>,
        ttl_ms: u64,
        key_prefix: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            clock,
            ttl_ms,
            key_prefix: key_prefix.into(),
        }
    }

    pub fn key_for(&self, account_id: &str) -> String {
        format!("{}{}", self.key_prefix, account_id)
    }

    /// Save a draft, replacing any earlier one. Failures are logged, never returned.
    pub fn save(
        &self,
        account_id: &str,
        company: Option<FieldMap>,
        contacts: Option<ContactEdits>,
    ) -> bool {
        match self.try_save(account_id, company, contacts) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("Failed to save draft for {}: {}", account_id, e);
                false
            }
        }
    }

    pub(crate) fn try_save(
        &self,
        account_id: &str,
        company: Option<FieldMap>,
        contacts: Option<ContactEdits>,
    ) -> Result<DraftRecord, DraftStoreError> {
        let record = DraftRecord {
            company,
            contacts,
            timestamp: self.clock.now_ms(),
        };
        let json = serde_json::to_string(&record)?;
        self.storage.set(&self.key_for(account_id), &json)?;
        tracing::debug!("Draft saved for {} ({} bytes)", account_id, json.len());
        Ok(record)
    }

    /// Load a live draft. Expired records are deleted on the way out.
    pub fn load(&self, account_id: &str) -> Option<DraftRecord> {
        match self.try_load(account_id) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("Failed to load draft for {}: {}", account_id, e);
                None
            }
        }
    }

    pub(crate) fn try_load(&self, account_id: &str) -> Result<Option<DraftRecord>, DraftStoreError> {
        let key = self.key_for(account_id);
        let Some(raw) = self.storage.get(&key)? else {
            return Ok(None);
        };
        let record: DraftRecord = serde_json::from_str(&raw)?;

        if record.is_expired(self.clock.now_ms(), self.ttl_ms) {
            tracing::debug!("Draft for {} expired, evicting", account_id);
            self.storage.remove(&key)?;
            return Ok(None);
        }
        Ok(Some(record))
    }

    pub fn clear(&self, account_id: &str) {
        if let Err(e) = self.storage.remove(&self.key_for(account_id)) {
            tracing::warn!("Failed to clear draft for {}: {}", account_id, e);
        }
    }

    pub fn has(&self, account_id: &str) -> bool {
        self.load(account_id).is_some()
    }

    /// Account ids holding a live draft. Expired ones are evicted while listing.
    pub fn accounts(&self) -> Vec<String> {
        let keys = match self.storage.keys_with_prefix(&self.key_prefix) {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!("Failed to list drafts: {}", e);
                return Vec::new();
            }
        };

        keys.iter()
            .filter_map(|key| key.strip_prefix(&self.key_prefix))
            .filter(|account_id| self.has(account_id))
            .map(str::to_string)
            .collect()
    }

    /// Remove expired and unreadable drafts for every account
    pub fn purge_expired(&self) -> usize {
        match self.try_purge_expired() {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!("Failed to purge drafts: {}", e);
                0
            }
        }
    }

    fn try_purge_expired(&self) -> Result<usize, DraftStoreError> {
        let now = self.clock.now_ms();
        let mut removed = 0;

        for key in self.storage.keys_with_prefix(&self.key_prefix)? {
            let Some(raw) = self.storage.get(&key)? else {
                continue;
            };
            let stale = match serde_json::from_str::<DraftRecord>(&raw) {
                Ok(record) => record.is_expired(now, self.ttl_ms),
                Err(_) => true,
            };
            if stale {
                self.storage.remove(&key)?;
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::info!("Purged {} stale draft(s)", removed);
        }
        Ok(removed)
    }
}
