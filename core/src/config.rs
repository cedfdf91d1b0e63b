//! Store configuration
//!
//! Every field has a default matching the portal's behaviour, so an empty JSON
//! object deserializes into a working configuration:
//! - Drafts expire 24 hours after their last save
//! - Autosave fires after 2 seconds of inactivity
//! - Failed writes are retried at most 3 times, backing off 1s / 5s / 15s

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::RetryPolicy;

pub const DEFAULT_DRAFT_TTL_MS: u64 = 24 * 60 * 60 * 1000;
pub const DEFAULT_AUTOSAVE_DELAY_MS: u64 = 2_000;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAYS_MS: [u64; 3] = [1_000, 5_000, 15_000];
pub const DRAFT_KEY_PREFIX: &str = "company_draft_";
pub const RETRY_QUEUE_KEY: &str = "retry_queue";

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid draft TTL: must be > 0")]
    ZeroDraftTtl,

    #[error("Invalid retry policy: max_retries must be > 0")]
    ZeroMaxRetries,

    #[error("Invalid retry policy: backoff schedule is empty")]
    EmptyBackoffSchedule,

    #[error("Invalid storage key: {0} must not be empty")]
    EmptyKey(&'static str),
}

// ============================================================================
// CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Age after which a draft is treated as absent
    pub draft_ttl_ms: u64,

    /// Debounce window for autosave
    pub autosave_delay_ms: u64,

    /// Retry ceiling and backoff schedule
    pub retry: RetryPolicy,

    /// Draft key is this prefix followed by the account id
    pub draft_key_prefix: String,

    /// Single key holding the whole retry queue
    pub retry_queue_key: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            draft_ttl_ms: DEFAULT_DRAFT_TTL_MS,
            autosave_delay_ms: DEFAULT_AUTOSAVE_DELAY_MS,
            retry: RetryPolicy::default(),
            draft_key_prefix: DRAFT_KEY_PREFIX.to_string(),
            retry_queue_key: RETRY_QUEUE_KEY.to_string(),
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.draft_ttl_ms == 0 {
            return Err(ConfigError::ZeroDraftTtl);
        }
        if self.retry.max_retries == 0 {
            return Err(ConfigError::ZeroMaxRetries);
        }
        if self.retry.delays_ms.is_empty() {
            return Err(ConfigError::EmptyBackoffSchedule);
        }
        if self.draft_key_prefix.is_empty() {
            return Err(ConfigError::EmptyKey("draft_key_prefix"));
        }
        if self.retry_queue_key.is_empty() {
            return Err(ConfigError::EmptyKey("retry_queue_key"));
        }
        Ok(())
    }
}
