// Autosave — coalesce bursts of form edits into one draft write per account
//
// Per account: Idle -> Pending (timer armed) -> Idle (draft saved), or
// Pending -> Idle (cancelled). Scheduling while Pending restarts the window.

pub mod timer;

use std::sync::Arc;
use std::time::Duration;

pub use timer::{DebounceTimers, TimerDriver, TimerHandle, TimerTask};
#[cfg(not(target_arch = "wasm32"))]
pub use timer::TokioTimerDriver;

use crate::store::{ContactEdits, DraftStore, FieldMap};

pub struct AutoSaveScheduler {
    drafts: Arc<DraftStore>,
    timers: DebounceTimers<String>,
    delay: Duration,
}

impl AutoSaveScheduler {
    pub fn new(drafts: Arc<DraftStore>, driver: Arc<dyn TimerDriver>, delay: Duration) -> Self {
        Self {
            drafts,
            timers: DebounceTimers::new(driver),
            delay,
        }
    }

    /// Save this snapshot once the account has been quiet for the debounce window
    pub fn schedule(
        &self,
        account_id: &str,
        company: Option<FieldMap>,
        contacts: Option<ContactEdits>,
    ) {
        let drafts = Arc::clone(&self.drafts);
        let account = account_id.to_string();
        self.timers.arm(account_id.to_string(), self.delay, move || {
            tracing::debug!("Autosave firing for {}", account);
            drafts.save(&account, company, contacts);
        });
    }

    /// Drop the pending save for an account, if any
    pub fn cancel(&self, account_id: &str) -> bool {
        self.timers.cancel(&account_id.to_string())
    }

    pub fn is_pending(&self, account_id: &str) -> bool {
        self.timers.is_pending(&account_id.to_string())
    }

    pub fn pending_count(&self) -> usize {
        self.timers.pending_count()
    }
}
