// Retry queue — failed writes waiting to be replayed against BridgeAPI
//
// The whole queue lives under a single key as a JSON array, in insertion order.
// Each entry backs off between attempts and is never offered again once it has
// used up its retry budget. Exhausted entries stay in the queue until the caller
// decides what to do with them.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::backend::StorageBackend;
use crate::clock::Clock;
use crate::config::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAYS_MS};
use crate::DraftStoreError;

/// Which BridgeAPI write failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryKind {
    Company,
    Contact,
}

impl fmt::Display for RetryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Company => write!(f, "company"),
            Self::Contact => write!(f, "contact"),
        }
    }
}

impl FromStr for RetryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "company" => Ok(Self::Company),
            "contact" => Ok(Self::Contact),
            other => Err(format!("Unknown retry type: {}", other)),
        }
    }
}

/// A failed write as reported by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRetryItem {
    #[serde(rename = "type")]
    pub kind: RetryKind,
    pub account_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<String>,
    pub data: Value,
}

impl NewRetryItem {
    pub fn company(account_id: impl Into<String>, data: Value) -> Self {
        Self {
            kind: RetryKind::Company,
            account_id: account_id.into(),
            contact_id: None,
            data,
        }
    }

    pub fn contact(account_id: impl Into<String>, contact_id: impl Into<String>, data: Value) -> Self {
        Self {
            kind: RetryKind::Contact,
            account_id: account_id.into(),
            contact_id: Some(contact_id.into()),
            data,
        }
    }
}

/// A queued write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryItem {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: RetryKind,
    pub account_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<String>,
    /// Payload that failed to save, opaque to the store
    pub data: Value,
    /// Retries attempted so far
    pub retry_count: u32,
    /// Unix millis of the last attempt, 0 if never attempted
    pub last_attempt: u64,
}

impl RetryItem {
    fn from_new(item: NewRetryItem, now_ms: u64) -> Self {
        let target = item.contact_id.as_deref().unwrap_or("company");
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self {
            id: format!(
                "{}_{}_{}_{}_{}",
                item.kind,
                item.account_id,
                target,
                now_ms,
                &suffix[..8]
            ),
            kind: item.kind,
            account_id: item.account_id,
            contact_id: item.contact_id,
            data: item.data,
            retry_count: 0,
            last_attempt: 0,
        }
    }
}

/// Retry ceiling and backoff schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Wait after the 1st, 2nd, ... failed attempt. The last value repeats.
    pub delays_ms: Vec<u64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            delays_ms: DEFAULT_RETRY_DELAYS_MS.to_vec(),
        }
    }
}

impl RetryPolicy {
    /// Backoff owed by an item with `retry_count` failed attempts.
    ///
    /// Indexed by the count the last attempt had before it was incremented.
    pub fn delay_ms(&self, retry_count: u32) -> u64 {
        let index = retry_count.saturating_sub(1) as usize;
        self.delays_ms
            .get(index)
            .or_else(|| self.delays_ms.last())
            .copied()
            .unwrap_or(0)
    }

    pub fn is_exhausted(&self, item: &RetryItem) -> bool {
        item.retry_count >= self.max_retries
    }

    pub fn is_due(&self, item: &RetryItem, now_ms: u64) -> bool {
        !self.is_exhausted(item)
            && now_ms.saturating_sub(item.last_attempt) >= self.delay_ms(item.retry_count)
    }
}

/// Persistent retry queue
pub struct RetryQueue {
    storage: Arc<dyn StorageBackend>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    key: String,
    /// Serializes read-modify-write cycles on the queue key
    write_lock: Mutex<()>,
}

impl RetryQueue {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        clock: Arc<dyn Clock>,
        policy: RetryPolicy,
        key: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            clock,
            policy,
            key: key.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn try_load(&self) -> Result<Vec<RetryItem>, DraftStoreError> {
        match self.storage.get(&self.key)? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    /// Queue contents for a mutation. An unreadable queue is replaced rather than
    /// blocking new entries forever.
    fn load_for_update(&self) -> Result<Vec<RetryItem>, DraftStoreError> {
        match self.try_load() {
            Err(DraftStoreError::Serialization(e)) => {
                tracing::warn!("Discarding unreadable retry queue: {}", e);
                Ok(Vec::new())
            }
            other => other,
        }
    }

    fn try_persist(&self, items: &[RetryItem]) -> Result<(), DraftStoreError> {
        let json = serde_json::to_string(items)?;
        self.storage.set(&self.key, &json)?;
        Ok(())
    }

    /// Queue a failed write. Returns the new id, or `None` if it could not be persisted.
    pub fn add(&self, item: NewRetryItem) -> Option<String> {
        let _guard = self.write_lock.lock();
        let result = self.load_for_update().and_then(|mut items| {
            let entry = RetryItem::from_new(item, self.clock.now_ms());
            let id = entry.id.clone();
            items.push(entry);
            self.try_persist(&items)?;
            Ok(id)
        });

        match result {
            Ok(id) => {
                tracing::debug!("Queued retry {}", id);
                Some(id)
            }
            Err(e) => {
                tracing::warn!("Failed to add retry item: {}", e);
                None
            }
        }
    }

    /// Entire queue in insertion order
    pub fn items(&self) -> Vec<RetryItem> {
        self.try_load().unwrap_or_else(|e| {
            tracing::warn!("Failed to read retry queue: {}", e);
            Vec::new()
        })
    }

    pub fn remove(&self, id: &str) {
        let _guard = self.write_lock.lock();
        let result = self.try_load().and_then(|mut items| {
            items.retain(|item| item.id != id);
            self.try_persist(&items)
        });
        if let Err(e) = result {
            tracing::warn!("Failed to remove retry item {}: {}", id, e);
        }
    }

    /// Entries that may be attempted right now
    pub fn retryable(&self) -> Vec<RetryItem> {
        let now = self.clock.now_ms();
        self.items()
            .into_iter()
            .filter(|item| self.policy.is_due(item, now))
            .collect()
    }

    /// Entries that used up their retry budget
    pub fn exhausted(&self) -> Vec<RetryItem> {
        self.items()
            .into_iter()
            .filter(|item| self.policy.is_exhausted(item))
            .collect()
    }

    /// Record the outcome of an attempt. Success drops the entry.
    pub fn mark_attempt(&self, id: &str, success: bool) {
        let _guard = self.write_lock.lock();
        let now = self.clock.now_ms();
        let max_retries = self.policy.max_retries;

        let result = self.try_load().and_then(|mut items| {
            let Some(pos) = items.iter().position(|item| item.id == id) else {
                tracing::debug!("Retry item {} not in queue", id);
                return Ok(());
            };

            if success {
                items.remove(pos);
                tracing::debug!("Retry {} delivered", id);
            } else {
                let item = &mut items[pos];
                item.retry_count = item.retry_count.saturating_add(1).min(max_retries);
                item.last_attempt = now;
                if item.retry_count >= max_retries {
                    tracing::warn!("Retry {} exhausted after {} attempts", id, item.retry_count);
                }
            }
            self.try_persist(&items)
        });

        if let Err(e) = result {
            tracing::warn!("Failed to record attempt for {}: {}", id, e);
        }
    }

    pub fn clear(&self) {
        let _guard = self.write_lock.lock();
        if let Err(e) = self.storage.remove(&self.key) {
            tracing::warn!("Failed to clear retry queue: {}", e);
        }
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
