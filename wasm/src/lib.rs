// bridgeportal-wasm — WebAssembly bindings for the portal's form pages
//
// Exposes the core DraftManager to JavaScript, persisted in localStorage with
// autosave timers on window.setTimeout. Values cross the boundary as plain JS
// objects shaped like the persisted JSON. Native builds of the workspace see an
// empty crate.

#![cfg(target_arch = "wasm32")]

pub mod storage;
pub mod timer;

use std::sync::{Arc, Once};

use async_trait::async_trait;
use bridgeportal_core::{
    ContactEdits, DraftManager as RustDraftManager, FieldMap, NewRetryItem, RetryHandler,
    RetryItem, StoreConfig, SystemClock,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;

pub use storage::LocalStorage;
pub use timer::BrowserTimerDriver;

static LOGGING: Once = Once::new();

#[wasm_bindgen(js_name = initLogging)]
pub fn init_logging() {
    LOGGING.call_once(|| {
        console_error_panic_hook::set_once();
        tracing_wasm::set_as_global_default();
    });
}

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| JsValue::from_str(&format!("{}", e)))
}

fn from_js<T: DeserializeOwned>(value: JsValue) -> Result<T, JsValue> {
    serde_wasm_bindgen::from_value(value).map_err(|e| JsValue::from_str(&format!("{}", e)))
}

/// `undefined` and `null` both mean "no edits"
fn edits_from_js(
    company: JsValue,
    contacts: JsValue,
) -> Result<(Option<FieldMap>, Option<ContactEdits>), JsValue> {
    Ok((from_js(company)?, from_js(contacts)?))
}

#[wasm_bindgen]
pub struct DraftManager {
    inner: Arc<RustDraftManager>,
}

#[wasm_bindgen]
impl DraftManager {
    #[wasm_bindgen(constructor)]
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        init_logging();
        Self {
            inner: Arc::new(RustDraftManager::new(
                Arc::new(LocalStorage::new()),
                Arc::new(BrowserTimerDriver::new()),
            )),
        }
    }

    /// Manager with a partial `StoreConfig` object; missing fields keep their defaults
    #[wasm_bindgen(js_name = withConfig)]
    pub fn with_config(config: JsValue) -> Result<DraftManager, JsValue> {
        init_logging();
        let config: StoreConfig = if config.is_undefined() || config.is_null() {
            StoreConfig::default()
        } else {
            from_js(config)?
        };
        let inner = RustDraftManager::with_config(
            Arc::new(LocalStorage::new()),
            Arc::new(BrowserTimerDriver::new()),
            Arc::new(SystemClock),
            config,
        )
        .map_err(|e| JsValue::from_str(&format!("{}", e)))?;

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    // Drafts

    #[wasm_bindgen(js_name = saveDraft)]
    pub fn save_draft(
        &self,
        account_id: &str,
        company: JsValue,
        contacts: JsValue,
    ) -> Result<(), JsValue> {
        let (company, contacts) = edits_from_js(company, contacts)?;
        self.inner.save_draft(account_id, company, contacts);
        Ok(())
    }

    /// The live draft, or `null`
    #[wasm_bindgen(js_name = loadDraft)]
    pub fn load_draft(&self, account_id: &str) -> Result<JsValue, JsValue> {
        match self.inner.load_draft(account_id) {
            Some(draft) => to_js(&draft),
            None => Ok(JsValue::NULL),
        }
    }

    #[wasm_bindgen(js_name = clearDraft)]
    pub fn clear_draft(&self, account_id: &str) {
        self.inner.clear_draft(account_id);
    }

    #[wasm_bindgen(js_name = hasDraft)]
    pub fn has_draft(&self, account_id: &str) -> bool {
        self.inner.has_draft(account_id)
    }

    #[wasm_bindgen(js_name = draftAccounts)]
    pub fn draft_accounts(&self) -> Vec<String> {
        self.inner.draft_accounts()
    }

    #[wasm_bindgen(js_name = purgeExpiredDrafts)]
    pub fn purge_expired_drafts(&self) -> u32 {
        self.inner.purge_expired_drafts() as u32
    }

    // Retry queue

    /// Queue `{ type, accountId, contactId?, data }`. Returns the new id, or
    /// `undefined` when it could not be stored.
    #[wasm_bindgen(js_name = addToRetryQueue)]
    pub fn add_to_retry_queue(&self, item: JsValue) -> Result<Option<String>, JsValue> {
        let item: NewRetryItem = from_js(item)?;
        Ok(self.inner.add_to_retry_queue(item))
    }

    #[wasm_bindgen(js_name = getRetryQueue)]
    pub fn get_retry_queue(&self) -> Result<JsValue, JsValue> {
        to_js(&self.inner.get_retry_queue())
    }

    #[wasm_bindgen(js_name = removeFromRetryQueue)]
    pub fn remove_from_retry_queue(&self, id: &str) {
        self.inner.remove_from_retry_queue(id);
    }

    #[wasm_bindgen(js_name = getRetryableItems)]
    pub fn get_retryable_items(&self) -> Result<JsValue, JsValue> {
        to_js(&self.inner.get_retryable_items())
    }

    #[wasm_bindgen(js_name = exhaustedRetryItems)]
    pub fn exhausted_retry_items(&self) -> Result<JsValue, JsValue> {
        to_js(&self.inner.exhausted_retry_items())
    }

    #[wasm_bindgen(js_name = markRetryAttempt)]
    pub fn mark_retry_attempt(&self, id: &str, success: bool) {
        self.inner.mark_retry_attempt(id, success);
    }

    #[wasm_bindgen(js_name = clearRetryQueue)]
    pub fn clear_retry_queue(&self) {
        self.inner.clear_retry_queue();
    }

    /// Call `handler(item)` for every due entry. A handler that throws or
    /// returns a rejected promise counts as a failed attempt. Resolves to
    /// `{ attempted, succeeded, failed, exhausted }`.
    #[wasm_bindgen(js_name = processRetries)]
    pub fn process_retries(&self, handler: js_sys::Function) -> js_sys::Promise {
        let inner = Arc::clone(&self.inner);
        wasm_bindgen_futures::future_to_promise(async move {
            let handler = JsRetryHandler { callback: handler };
            let report = inner.process_retries(&handler).await;
            to_js(&report)
        })
    }

    // Autosave

    #[wasm_bindgen(js_name = scheduleAutoSave)]
    pub fn schedule_auto_save(
        &self,
        account_id: &str,
        company: JsValue,
        contacts: JsValue,
    ) -> Result<(), JsValue> {
        let (company, contacts) = edits_from_js(company, contacts)?;
        self.inner.schedule_auto_save(account_id, company, contacts);
        Ok(())
    }

    #[wasm_bindgen(js_name = cancelAutoSave)]
    pub fn cancel_auto_save(&self, account_id: &str) {
        self.inner.cancel_auto_save(account_id);
    }

    #[wasm_bindgen(js_name = hasPendingAutoSave)]
    pub fn has_pending_auto_save(&self, account_id: &str) -> bool {
        self.inner.has_pending_auto_save(account_id)
    }
}

/// Adapts a JS callback (sync or promise-returning) to the core retry hook
struct JsRetryHandler {
    callback: js_sys::Function,
}

#[async_trait(?Send)]
impl RetryHandler for JsRetryHandler {
    async fn retry(&self, item: &RetryItem) -> anyhow::Result<()> {
        let arg = to_js(item).map_err(|e| anyhow::anyhow!("{:?}", e))?;
        let returned = self
            .callback
            .call1(&JsValue::NULL, &arg)
            .map_err(|e| anyhow::anyhow!("handler threw: {:?}", e))?;

        if let Ok(promise) = returned.dyn_into::<js_sys::Promise>() {
            JsFuture::from(promise)
                .await
                .map_err(|e| anyhow::anyhow!("handler rejected: {:?}", e))?;
        }
        Ok(())
    }
}
