//! KeyValueStore trait: the abstract interface for durable preferences.
//!
//! This trait keeps the engine storage-agnostic. Implementations include
//! SQLite (primary) and in-memory (for tests).

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::error::{Result, StoreError};

/// Durable string-keyed storage.
///
/// # Design Notes
///
/// - **Synchronous and durable**: a successful `put_string` survives a
///   process restart.
/// - **No transactions**: callers that need read-modify-write atomicity
///   serialize access themselves.
pub trait KeyValueStore: Send + Sync {
    /// Read a raw string value.
    fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Write a raw string value, replacing any previous one.
    fn put_string(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a value. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;

    /// Whether a value is stored under `key`.
    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get_string(key)?.is_some())
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Arc<S> {
    fn get_string(&self, key: &str) -> Result<Option<String>> {
        (**self).get_string(key)
    }

    fn put_string(&self, key: &str, value: &str) -> Result<()> {
        (**self).put_string(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }

    fn contains(&self, key: &str) -> Result<bool> {
        (**self).contains(key)
    }
}

/// Extension trait for JSON and integer values.
pub trait KeyValueStoreExt: KeyValueStore {
    /// Read a JSON value. Missing keys read as `Value::Null`.
    fn get_json(&self, key: &str) -> Result<Value> {
        match self.get_string(key)? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Value::Null),
        }
    }

    /// Write a JSON value. Writing `Value::Null` removes the key.
    fn put_json(&self, key: &str, value: &Value) -> Result<()> {
        if value.is_null() {
            return self.remove(key);
        }
        self.put_string(key, &value.to_string())
    }

    /// Read and decode a typed value. Missing keys read as `None`.
    fn get_typed<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get_json(key)? {
            Value::Null => Ok(None),
            value => Ok(Some(serde_json::from_value(value)?)),
        }
    }

    /// Encode and write a typed value.
    fn put_typed<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.put_json(key, &serde_json::to_value(value)?)
    }

    /// Read an integer stored as a decimal string.
    fn get_i64(&self, key: &str) -> Result<Option<i64>> {
        match self.get_string(key)? {
            Some(raw) => raw
                .trim()
                .parse::<i64>()
                .map(Some)
                .map_err(|e| StoreError::InvalidData {
                    key: key.to_string(),
                    reason: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    fn put_i64(&self, key: &str, value: i64) -> Result<()> {
        self.put_string(key, &value.to_string())
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStoreExt for S {}
