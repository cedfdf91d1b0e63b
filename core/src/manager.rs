//! `DraftManager` — the store handed to form components
//!
//! Built once at startup with its storage backend, timer driver and clock, then
//! shared by reference. None of its public operations fail: storage problems are
//! logged and turned into "nothing saved" / "nothing found".

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::autosave::{AutoSaveScheduler, TimerDriver};
use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigError, StoreConfig};
use crate::store::{
    ContactEdits, DraftRecord, DraftStore, FieldMap, NewRetryItem, RetryItem, RetryQueue,
    StorageBackend,
};

/// Replays a queued write against BridgeAPI
#[cfg(not(target_arch = "wasm32"))]
#[async_trait]
pub trait RetryHandler: Send + Sync {
    async fn retry(&self, item: &RetryItem) -> anyhow::Result<()>;
}

/// Replays a queued write against BridgeAPI (browser handlers hold JS values)
#[cfg(target_arch = "wasm32")]
#[async_trait(?Send)]
pub trait RetryHandler {
    async fn retry(&self, item: &RetryItem) -> anyhow::Result<()>;
}

/// Outcome of one [`DraftManager::process_retries`] pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Entries now out of retries (including ones exhausted earlier)
    pub exhausted: usize,
}

pub struct DraftManager {
    config: StoreConfig,
    storage: Arc<dyn StorageBackend>,
    drafts: Arc<DraftStore>,
    retry_queue: RetryQueue,
    autosave: AutoSaveScheduler,
}

impl DraftManager {
    /// Manager with default settings and the system clock
    pub fn new(storage: Arc<dyn StorageBackend>, timers: Arc<dyn TimerDriver>) -> Self {
        let config = StoreConfig::default();
        Self::build(storage, timers, Arc::new(SystemClock), config)
    }

    pub fn with_config(
        storage: Arc<dyn StorageBackend>,
        timers: Arc<dyn TimerDriver>,
        clock: Arc<dyn Clock>,
        config: StoreConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(storage, timers, clock, config))
    }

    fn build(
        storage: Arc<dyn StorageBackend>,
        timers: Arc<dyn TimerDriver>,
        clock: Arc<dyn Clock>,
        config: StoreConfig,
    ) -> Self {
        let drafts = Arc::new(DraftStore::new(
            Arc::clone(&storage),
            Arc::clone(&clock),
            config.draft_ttl_ms,
            config.draft_key_prefix.clone(),
        ));
        let retry_queue = RetryQueue::new(
            Arc::clone(&storage),
            clock,
            config.retry.clone(),
            config.retry_queue_key.clone(),
        );
        let autosave = AutoSaveScheduler::new(
            Arc::clone(&drafts),
            timers,
            Duration::from_millis(config.autosave_delay_ms),
        );

        Self {
            config,
            storage,
            drafts,
            retry_queue,
            autosave,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Push buffered writes down to the backend
    pub fn flush(&self) {
        if let Err(e) = self.storage.flush() {
            tracing::warn!("Failed to flush storage: {}", e);
        }
    }

    // ------------------------------------------------------------------------
    // DRAFTS
    // ------------------------------------------------------------------------

    pub fn save_draft(
        &self,
        account_id: &str,
        company: Option<FieldMap>,
        contacts: Option<ContactEdits>,
    ) {
        self.drafts.save(account_id, company, contacts);
    }

    pub fn load_draft(&self, account_id: &str) -> Option<DraftRecord> {
        self.drafts.load(account_id)
    }

    pub fn clear_draft(&self, account_id: &str) {
        self.drafts.clear(account_id);
    }

    pub fn has_draft(&self, account_id: &str) -> bool {
        self.drafts.has(account_id)
    }

    pub fn draft_accounts(&self) -> Vec<String> {
        self.drafts.accounts()
    }

    pub fn purge_expired_drafts(&self) -> usize {
        self.drafts.purge_expired()
    }

    // ------------------------------------------------------------------------
    // RETRY QUEUE
    // ------------------------------------------------------------------------

    pub fn add_to_retry_queue(&self, item: NewRetryItem) -> Option<String> {
        self.retry_queue.add(item)
    }

    pub fn get_retry_queue(&self) -> Vec<RetryItem> {
        self.retry_queue.items()
    }

    pub fn remove_from_retry_queue(&self, id: &str) {
        self.retry_queue.remove(id);
    }

    pub fn get_retryable_items(&self) -> Vec<RetryItem> {
        self.retry_queue.retryable()
    }

    pub fn exhausted_retry_items(&self) -> Vec<RetryItem> {
        self.retry_queue.exhausted()
    }

    pub fn mark_retry_attempt(&self, id: &str, success: bool) {
        self.retry_queue.mark_attempt(id, success);
    }

    pub fn clear_retry_queue(&self) {
        self.retry_queue.clear();
    }

    /// Replay every due entry through `handler` and record the outcomes
    pub async fn process_retries(&self, handler: &dyn RetryHandler) -> RetryReport {
        let mut report = RetryReport::default();

        for item in self.retry_queue.retryable() {
            report.attempted += 1;
            match handler.retry(&item).await {
                Ok(()) => {
                    self.retry_queue.mark_attempt(&item.id, true);
                    report.succeeded += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        "Retry {} failed (attempt {}): {:#}",
                        item.id,
                        item.retry_count.saturating_add(1),
                        e
                    );
                    self.retry_queue.mark_attempt(&item.id, false);
                    report.failed += 1;
                }
            }
        }

        report.exhausted = self.retry_queue.exhausted().len();
        if report.attempted > 0 {
            tracing::info!(
                "Retry pass: {} attempted, {} succeeded, {} failed, {} exhausted",
                report.attempted,
                report.succeeded,
                report.failed,
                report.exhausted
            );
        }
        report
    }

    // ------------------------------------------------------------------------
    // AUTOSAVE
    // ------------------------------------------------------------------------

    pub fn schedule_auto_save(
        &self,
        account_id: &str,
        company: Option<FieldMap>,
        contacts: Option<ContactEdits>,
    ) {
        self.autosave.schedule(account_id, company, contacts);
    }

    pub fn cancel_auto_save(&self, account_id: &str) {
        self.autosave.cancel(account_id);
    }

    pub fn has_pending_auto_save(&self, account_id: &str) -> bool {
        self.autosave.is_pending(account_id)
    }

    pub fn pending_auto_saves(&self) -> usize {
        self.autosave.pending_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autosave::{TimerHandle, TimerTask};
    use crate::clock::ManualClock;
    use crate::store::MemoryStorage;
    use serde_json::json;

    /// Timers that never fire
    struct IdleDriver;

    struct IdleHandle;

    impl TimerHandle for IdleHandle {
        fn cancel(self: Box<Self>) {}
    }

    impl TimerDriver for IdleDriver {
        fn arm(&self, _delay: Duration, _task: TimerTask) -> Box<dyn TimerHandle> {
            Box::new(IdleHandle)
        }
    }

    fn manager(clock: ManualClock) -> DraftManager {
        DraftManager::with_config(
            Arc::new(MemoryStorage::new()),
            Arc::new(IdleDriver),
            Arc::new(clock),
            StoreConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = StoreConfig::default();
        config.retry.delays_ms.clear();

        let result = DraftManager::with_config(
            Arc::new(MemoryStorage::new()),
            Arc::new(IdleDriver),
            Arc::new(ManualClock::new(0)),
            config,
        );
        assert!(matches!(result, Err(ConfigError::EmptyBackoffSchedule)));
    }

    #[test]
    fn test_pending_autosave_tracking() {
        let manager = manager(ManualClock::new(0));
        manager.schedule_auto_save("acc-1", None, None);
        manager.schedule_auto_save("acc-1", None, None);
        manager.schedule_auto_save("acc-2", None, None);
        assert_eq!(manager.pending_auto_saves(), 2);

        manager.cancel_auto_save("acc-1");
        manager.cancel_auto_save("acc-1");
        assert!(!manager.has_pending_auto_save("acc-1"));
        assert!(manager.has_pending_auto_save("acc-2"));
    }

    #[test]
    fn test_draft_operations_delegate() {
        let manager = manager(ManualClock::new(0));
        let company = json!({"englishName": "Acme"}).as_object().cloned();

        manager.save_draft("acc-1", company.clone(), None);
        assert!(manager.has_draft("acc-1"));
        assert_eq!(manager.load_draft("acc-1").unwrap().company, company);
        assert_eq!(manager.draft_accounts(), vec!["acc-1".to_string()]);

        manager.clear_draft("acc-1");
        assert!(!manager.has_draft("acc-1"));
    }

    #[test]
    fn test_retry_operations_delegate() {
        let clock = ManualClock::new(50_000);
        let manager = manager(clock.clone());

        let id = manager
            .add_to_retry_queue(NewRetryItem::company("acc-1", json!({})))
            .unwrap();
        assert_eq!(manager.get_retryable_items().len(), 1);

        manager.mark_retry_attempt(&id, false);
        assert!(manager.get_retryable_items().is_empty());

        manager.remove_from_retry_queue(&id);
        assert!(manager.get_retry_queue().is_empty());
    }
}
