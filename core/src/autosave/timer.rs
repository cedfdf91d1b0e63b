//! Keyed debounce timers
//!
//! [`DebounceTimers`] keeps at most one armed timer per key. Arming a key that
//! already has a timer replaces it, so only the most recent action runs.
//!
//! The actual sleeping is delegated to a [`TimerDriver`]: tokio on native hosts,
//! `setTimeout` in the browser (see the wasm crate).

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

/// Work run when a timer fires
pub type TimerTask = Box<dyn FnOnce() + Send + 'static>;

/// Cancellation handle for one armed timer
pub trait TimerHandle: Send {
    fn cancel(self: Box<Self>);
}

/// Runs a task once after a delay
pub trait TimerDriver: Send + Sync {
    fn arm(&self, delay: Duration, task: TimerTask) -> Box<dyn TimerHandle>;
}

struct Slot {
    generation: u64,
    handle: Option<Box<dyn TimerHandle>>,
}

/// One outstanding timer per key, replaced on every arm
pub struct DebounceTimers<K> {
    driver: Arc<dyn TimerDriver>,
    slots: Arc<Mutex<HashMap<K, Slot>>>,
    next_generation: AtomicU64,
}

impl<K> DebounceTimers<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    pub fn new(driver: Arc<dyn TimerDriver>) -> Self {
        Self {
            driver,
            slots: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Arm `action` for `key`, cancelling whatever was pending for it.
    pub fn arm<F>(&self, key: K, delay: Duration, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        // Claim the slot first so a timer that fires early still finds itself current.
        let previous = self.slots.lock().insert(
            key.clone(),
            Slot {
                generation,
                handle: None,
            },
        );
        if let Some(handle) = previous.and_then(|slot| slot.handle) {
            handle.cancel();
        }

        let slots = Arc::clone(&self.slots);
        let fire_key = key.clone();
        let handle = self.driver.arm(
            delay,
            Box::new(move || {
                let current = {
                    let mut slots = slots.lock();
                    match slots.get(&fire_key) {
                        Some(slot) if slot.generation == generation => {
                            slots.remove(&fire_key);
                            true
                        }
                        _ => false,
                    }
                };
                if current {
                    action();
                }
            }),
        );

        let mut slots = self.slots.lock();
        match slots.get_mut(&key) {
            Some(slot) if slot.generation == generation => slot.handle = Some(handle),
            // Already fired or replaced in the meantime
            _ => {}
        }
    }

    /// Cancel the pending timer for `key`. Returns whether one was pending.
    pub fn cancel(&self, key: &K) -> bool {
        let removed = self.slots.lock().remove(key);
        match removed {
            Some(slot) => {
                if let Some(handle) = slot.handle {
                    handle.cancel();
                }
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.slots.lock().contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        self.slots.lock().len()
    }

    /// Cancel every pending timer
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<Slot> = self.slots.lock().drain().map(|(_, slot)| slot).collect();
        let count = drained.len();
        for handle in drained.into_iter().filter_map(|slot| slot.handle) {
            handle.cancel();
        }
        count
    }
}

// ============================================================================
// TOKIO DRIVER
// ============================================================================

#[cfg(not(target_arch = "wasm32"))]
pub use tokio_driver::TokioTimerDriver;

#[cfg(not(target_arch = "wasm32"))]
mod tokio_driver {
    use super::*;
    use tokio::runtime::Handle;
    use tokio::task::JoinHandle;

    /// Timer driver backed by tokio tasks
    #[derive(Debug, Clone)]
    pub struct TokioTimerDriver {
        runtime: Handle,
    }

    impl TokioTimerDriver {
        pub fn new(runtime: Handle) -> Self {
            Self { runtime }
        }

        /// Driver for the runtime this is called from, if any
        pub fn current() -> Option<Self> {
            Handle::try_current().ok().map(Self::new)
        }
    }

    struct TokioTimerHandle(JoinHandle<()>);

    impl TimerHandle for TokioTimerHandle {
        fn cancel(self: Box<Self>) {
            self.0.abort();
        }
    }

    impl TimerDriver for TokioTimerDriver {
        fn arm(&self, delay: Duration, task: TimerTask) -> Box<dyn TimerHandle> {
            let join = self.runtime.spawn(async move {
                tokio::time::sleep(delay).await;
                task();
            });
            Box::new(TokioTimerHandle(join))
        }
    }
}
