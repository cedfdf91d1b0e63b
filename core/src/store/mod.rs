// Store module — draft persistence and the failed-write retry queue

pub mod backend;
pub mod draft;
pub mod retry;

#[cfg(not(target_arch = "wasm32"))]
pub use backend::SledStorage;
pub use backend::{BackendError, BackendResult, MemoryStorage, StorageBackend};
pub use draft::{ContactEdits, DraftRecord, DraftStore, FieldMap};
pub use retry::{NewRetryItem, RetryItem, RetryKind, RetryPolicy, RetryQueue};
