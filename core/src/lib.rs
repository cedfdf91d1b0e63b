// BridgePortal Core — draft persistence and write-retry store
//
// Form components keep in-progress company/contact edits here so they survive
// reloads, and park failed BridgeAPI writes here until a retry goes through.

pub mod autosave;
pub mod clock;
pub mod config;
pub mod manager;
pub mod store;

use thiserror::Error;

pub use autosave::{AutoSaveScheduler, DebounceTimers, TimerDriver, TimerHandle, TimerTask};
#[cfg(not(target_arch = "wasm32"))]
pub use autosave::TokioTimerDriver;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, StoreConfig};
pub use manager::{DraftManager, RetryHandler, RetryReport};
pub use store::{
    BackendError, ContactEdits, DraftRecord, FieldMap, MemoryStorage, NewRetryItem, RetryItem,
    RetryKind, RetryPolicy, StorageBackend,
};
#[cfg(not(target_arch = "wasm32"))]
pub use store::SledStorage;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Failure inside a store operation. Public store methods log these instead of
/// returning them.
#[derive(Debug, Error)]
pub enum DraftStoreError {
    #[error("Storage error: {0}")]
    Backend(#[from] BackendError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
