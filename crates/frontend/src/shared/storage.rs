//! Storage adapter over the browser's localStorage.
//!
//! Every failure (storage disabled, quota exceeded, undecodable payload) is
//! logged and turned into `None`/`false`; callers keep working with
//! in-memory state only.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use thiserror::Error;
use wasm_bindgen::JsCast;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage is not available")]
    Unavailable,
    #[error("storage quota exceeded writing `{key}` ({bytes} bytes)")]
    QuotaExceeded { key: String, bytes: usize },
    #[error("storage access failed: {0}")]
    Access(String),
    #[error("could not encode value: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Raw string key-value store.
pub trait StorageBackend {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn write(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// `window.localStorage`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalStorageBackend;

impl LocalStorageBackend {
    fn storage() -> Result<web_sys::Storage, StorageError> {
        web_sys::window()
            .ok_or(StorageError::Unavailable)?
            .local_storage()
            .map_err(|e| StorageError::Access(format!("{e:?}")))?
            .ok_or(StorageError::Unavailable)
    }

    /// Whether localStorage can be reached at all on this page.
    pub fn is_available() -> bool {
        Self::storage().is_ok()
    }
}

fn access_error(err: wasm_bindgen::JsValue, key: &str, bytes: usize) -> StorageError {
    match err.dyn_ref::<web_sys::DomException>() {
        Some(ex) if ex.name() == "QuotaExceededError" => StorageError::QuotaExceeded {
            key: key.to_string(),
            bytes,
        },
        _ => StorageError::Access(format!("{err:?}")),
    }
}

impl StorageBackend for LocalStorageBackend {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        Self::storage()?
            .get_item(key)
            .map_err(|e| access_error(e, key, 0))
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        Self::storage()?
            .set_item(key, value)
            .map_err(|e| access_error(e, key, value.len()))
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        Self::storage()?
            .remove_item(key)
            .map_err(|e| access_error(e, key, 0))
    }
}

/// In-memory store, used when localStorage is unavailable and in tests.
/// Clones share the same entries.
#[derive(Clone, Debug, Default)]
pub struct MemoryBackend {
    entries: Rc<RefCell<HashMap<String, String>>>,
    quota_bytes: Option<usize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects writes whose value exceeds `bytes`, like a full localStorage.
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            quota_bytes: Some(bytes),
            ..Self::default()
        }
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    pub fn put_raw(&self, key: &str, value: &str) {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
    }
}

impl StorageBackend for MemoryBackend {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.raw(key))
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if let Some(quota) = self.quota_bytes {
            if value.len() > quota {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    bytes: value.len(),
                });
            }
        }
        self.put_raw(key, value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

/// JSON get/set/remove that never fails loudly.
#[derive(Clone)]
pub struct StorageAdapter {
    backend: Rc<dyn StorageBackend>,
}

impl StorageAdapter {
    pub fn new(backend: Rc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// localStorage when reachable, otherwise an in-memory fallback.
    pub fn browser_default() -> Self {
        if LocalStorageBackend::is_available() {
            Self::new(Rc::new(LocalStorageBackend))
        } else {
            log::warn!("localStorage unavailable, form data will live in memory only");
            Self::new(Rc::new(MemoryBackend::new()))
        }
    }

    pub fn get_raw(&self, key: &str) -> Option<String> {
        match self.backend.read(key) {
            Ok(value) => value,
            Err(err) => {
                log::warn!("storage read `{}` failed: {}", key, err);
                None
            }
        }
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get_raw(key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                log::warn!("storage entry `{}` is not valid JSON: {}", key, err);
                None
            }
        }
    }

    pub fn set_raw(&self, key: &str, value: &str) -> bool {
        match self.backend.write(key, value) {
            Ok(()) => true,
            Err(err) => {
                log::warn!("storage write `{}` failed: {}", key, err);
                false
            }
        }
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> bool {
        match serde_json::to_string(value) {
            Ok(text) => self.set_raw(key, &text),
            Err(err) => {
                log::warn!("{}", StorageError::from(err));
                false
            }
        }
    }

    pub fn remove(&self, key: &str) -> bool {
        match self.backend.delete(key) {
            Ok(()) => true,
            Err(err) => {
                log::warn!("storage remove `{}` failed: {}", key, err);
                false
            }
        }
    }
}
