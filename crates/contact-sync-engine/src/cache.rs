//! A single cached value with an expiry.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::clock::Clock;

struct Entry<T> {
    value: T,
    expires_at: i64,
}

/// Holds at most one value until it expires or is invalidated.
pub struct CachedValue<T> {
    entry: Mutex<Option<Entry<T>>>,
    clock: Arc<dyn Clock>,
}

impl<T: Clone> CachedValue<T> {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entry: Mutex::new(None),
            clock,
        }
    }

    /// The cached value, if present and not expired.
    pub fn get(&self) -> Option<T> {
        let mut entry = self.entry.lock().unwrap_or_else(|e| e.into_inner());
        match entry.as_ref() {
            Some(e) if self.clock.now_millis() < e.expires_at => Some(e.value.clone()),
            Some(_) => {
                *entry = None;
                None
            }
            None => None,
        }
    }

    pub fn set(&self, value: T, lifetime: Duration) {
        let expires_at = self
            .clock
            .now_millis()
            .saturating_add(lifetime.as_millis() as i64);
        *self.entry.lock().unwrap_or_else(|e| e.into_inner()) = Some(Entry { value, expires_at });
    }

    pub fn invalidate(&self) {
        *self.entry.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}
