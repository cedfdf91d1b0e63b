// Browser storage — window.localStorage behind the core StorageBackend trait
//
// web_sys::Storage is not Send, so nothing is cached: every call looks the
// store up again. Quota errors surface from set_item as a DOMException.

use bridgeportal_core::store::BackendResult;
use bridgeportal_core::{BackendError, StorageBackend};
use wasm_bindgen::JsValue;

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalStorage;

impl LocalStorage {
    pub fn new() -> Self {
        Self
    }

    /// Whether this page can use localStorage at all (private mode, sandboxed iframes)
    pub fn is_available() -> bool {
        storage().is_ok()
    }
}

fn storage() -> BackendResult<web_sys::Storage> {
    let window =
        web_sys::window().ok_or_else(|| BackendError::Unavailable("no window".to_string()))?;
    window
        .local_storage()
        .map_err(|e| BackendError::Unavailable(describe(&e)))?
        .ok_or_else(|| BackendError::Unavailable("localStorage disabled".to_string()))
}

fn describe(value: &JsValue) -> String {
    value
        .as_string()
        .or_else(|| {
            js_sys::Reflect::get(value, &JsValue::from_str("name"))
                .ok()
                .and_then(|name| name.as_string())
        })
        .unwrap_or_else(|| format!("{:?}", value))
}

fn used_bytes(storage: &web_sys::Storage) -> usize {
    let len = storage.length().unwrap_or(0);
    (0..len)
        .filter_map(|i| storage.key(i).ok().flatten())
        .map(|key| {
            let value = storage.get_item(&key).ok().flatten().unwrap_or_default();
            key.len() + value.len()
        })
        .sum()
}

impl StorageBackend for LocalStorage {
    fn get(&self, key: &str) -> BackendResult<Option<String>> {
        storage()?
            .get_item(key)
            .map_err(|e| BackendError::Io(describe(&e)))
    }

    fn set(&self, key: &str, value: &str) -> BackendResult<()> {
        let storage = storage()?;
        storage.set_item(key, value).map_err(|e| {
            let reason = describe(&e);
            if reason.contains("QuotaExceeded") {
                // Browsers do not expose the limit; the store is full at `used`
                let used = used_bytes(&storage);
                BackendError::QuotaExceeded { used, limit: used }
            } else {
                BackendError::Io(reason)
            }
        })
    }

    fn remove(&self, key: &str) -> BackendResult<()> {
        storage()?
            .remove_item(key)
            .map_err(|e| BackendError::Io(describe(&e)))
    }

    fn keys_with_prefix(&self, prefix: &str) -> BackendResult<Vec<String>> {
        let storage = storage()?;
        let len = storage
            .length()
            .map_err(|e| BackendError::Io(describe(&e)))?;

        let mut keys = Vec::new();
        for i in 0..len {
            if let Some(key) = storage.key(i).map_err(|e| BackendError::Io(describe(&e)))? {
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn flush(&self) -> BackendResult<()> {
        // localStorage writes are synchronous
        Ok(())
    }
}
