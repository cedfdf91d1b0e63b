// Browser timer driver — window.setTimeout for the core debounce timers
//
// Cancelling does not call clearTimeout: the closure handed to setTimeout is
// freed only when it runs, so a cancelled timer still fires and finds its flag set.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bridgeportal_core::{TimerDriver, TimerHandle, TimerTask};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::JsCast;

#[derive(Debug, Clone, Copy, Default)]
pub struct BrowserTimerDriver;

impl BrowserTimerDriver {
    pub fn new() -> Self {
        Self
    }
}

struct BrowserTimerHandle {
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle for BrowserTimerHandle {
    fn cancel(self: Box<Self>) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

impl TimerDriver for BrowserTimerDriver {
    fn arm(&self, delay: Duration, task: TimerTask) -> Box<dyn TimerHandle> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);

        let callback = Closure::once_into_js(move || {
            if !flag.load(Ordering::SeqCst) {
                task();
            }
        });

        let timeout = i32::try_from(delay.as_millis()).unwrap_or(i32::MAX);
        let armed = web_sys::window().map(|window| {
            window.set_timeout_with_callback_and_timeout_and_arguments_0(
                callback.unchecked_ref(),
                timeout,
            )
        });
        match armed {
            Some(Ok(_)) => {}
            Some(Err(e)) => tracing::warn!("setTimeout failed: {:?}", e),
            None => tracing::warn!("No window to arm an autosave timer on"),
        }

        Box::new(BrowserTimerHandle { cancelled })
    }
}
