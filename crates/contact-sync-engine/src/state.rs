//! Persistent contact state: the operation log, the last known identity,
//! anonymous data, and the last resolve time.
//!
//! Every read-modify-write of the operation log happens under one
//! operation lock. The lock is never held across network I/O.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use contact_sync_core::{
    decode_operations, encode_operations, ContactData, ContactIdentity, Operation,
};
use contact_sync_store::{KeyValueStore, KeyValueStoreExt, StoreError};
use serde_json::Value;
use tracing::{debug, error};

use crate::error::Result;
use crate::planner::{self, PlanContext};

/// Store keys.
pub mod keys {
    pub const OPERATIONS: &str = "com.urbanairship.contacts.OPERATIONS";
    pub const LAST_CONTACT_IDENTITY: &str = "com.urbanairship.contacts.LAST_CONTACT_IDENTITY_KEY";
    pub const ANON_CONTACT_DATA: &str = "com.urbanairship.contacts.ANON_CONTACT_DATA_KEY";
    pub const LAST_RESOLVED_DATE: &str = "com.urbanairship.contacts.LAST_RESOLVED_DATE_KEY";

    pub const LEGACY_NAMED_USER_ID: &str = "com.urbanairship.nameduser.NAMED_USER_ID_KEY";
    pub const LEGACY_ATTRIBUTE_MUTATIONS: &str =
        "com.urbanairship.nameduser.ATTRIBUTE_MUTATION_STORE_KEY";
    pub const LEGACY_TAG_GROUP_MUTATIONS: &str =
        "com.urbanairship.nameduser.PENDING_TAG_GROUP_MUTATIONS_KEY";
}

/// Contact state backed by a key-value store.
pub struct ContactState<S> {
    store: S,
    operation_lock: Mutex<()>,
    contact_id_refreshed: AtomicBool,
}

impl<S: KeyValueStore> ContactState<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            operation_lock: Mutex::new(()),
            contact_id_refreshed: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        // The guarded data is the store itself, which stays consistent even
        // if a holder panicked.
        self.operation_lock
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Operation log
    // ─────────────────────────────────────────────────────────────────────────

    /// Read a raw JSON value. Text that is not JSON at all reads as null.
    fn read_json(&self, key: &str) -> Result<Value> {
        match self.store.get_json(key) {
            Err(StoreError::Serialization(e)) => {
                error!(key, error = %e, "dropping unreadable contact record");
                self.remove_quietly(key);
                Ok(Value::Null)
            }
            other => Ok(other?),
        }
    }

    fn read_operations(&self) -> Result<Vec<Operation>> {
        let raw = self.read_json(keys::OPERATIONS)?;
        Ok(decode_operations(raw)
            .into_iter()
            .filter_map(|decoded| match decoded {
                Ok(op) => Some(op),
                Err(e) => {
                    error!(error = %e, "dropping unreadable contact operation");
                    None
                }
            })
            .collect())
    }

    fn write_operations(&self, operations: &[Operation]) -> Result<()> {
        if operations.is_empty() {
            self.store.remove(keys::OPERATIONS)?;
        } else {
            self.store
                .put_json(keys::OPERATIONS, &encode_operations(operations)?)?;
        }
        Ok(())
    }

    /// The pending operations, oldest first.
    pub fn operations(&self) -> Result<Vec<Operation>> {
        let _guard = self.lock();
        self.read_operations()
    }

    /// The last identity and the pending operations, read under one lock.
    ///
    /// The driver stores a new identity before removing the operation that
    /// produced it, so a log read here always covers the identity read.
    pub fn identity_and_operations(&self) -> Result<(Option<ContactIdentity>, Vec<Operation>)> {
        let _guard = self.lock();
        let identity = self.last_identity();
        let operations = self.read_operations()?;
        Ok((identity, operations))
    }

    pub fn append(&self, operation: Operation) -> Result<()> {
        self.append_all([operation])
    }

    /// Append several operations in one write.
    pub fn append_all(&self, operations: impl IntoIterator<Item = Operation>) -> Result<()> {
        let _guard = self.lock();
        let mut log = self.read_operations()?;
        log.extend(operations);
        self.write_operations(&log)
    }

    /// Drop the head of the log, if any.
    pub fn remove_head(&self) -> Result<()> {
        let _guard = self.lock();
        let mut log = self.read_operations()?;
        if !log.is_empty() {
            log.remove(0);
            self.write_operations(&log)?;
        }
        Ok(())
    }

    /// Plan the next operation and persist the planned log.
    pub fn prepare_next_operation(&self) -> Result<Option<Operation>> {
        let _guard = self.lock();
        let operations = self.read_operations()?;
        if operations.is_empty() {
            return Ok(None);
        }

        let identity = self.last_identity();
        let anonymous_data = self.anonymous_data();
        let ctx = PlanContext {
            identity: identity.as_ref(),
            anonymous_data: anonymous_data.as_ref(),
            contact_id_refreshed: self.is_contact_id_refreshed(),
        };

        let before = operations.len();
        let plan = planner::plan(operations, &ctx);
        if plan.log.len() != before {
            debug!(before, after = plan.log.len(), "contact operation log rewritten");
        }
        self.write_operations(&plan.log)?;
        Ok(plan.next)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Identity and anonymous data
    // ─────────────────────────────────────────────────────────────────────────

    /// Read a JSON record, dropping it if it cannot be decoded.
    fn read_record<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.read_json(key) {
            Ok(Value::Null) => return None,
            Ok(raw) => raw,
            Err(e) => {
                error!(key, error = %e, "failed to read contact record");
                return None;
            }
        };
        match serde_json::from_value(raw) {
            Ok(value) => Some(value),
            Err(e) => {
                error!(key, error = %e, "dropping unreadable contact record");
                self.remove_quietly(key);
                None
            }
        }
    }

    fn remove_quietly(&self, key: &str) {
        if let Err(e) = self.store.remove(key) {
            error!(key, error = %e, "failed to remove contact record");
        }
    }

    /// The last identity reported by the service.
    pub fn last_identity(&self) -> Option<ContactIdentity> {
        self.read_record(keys::LAST_CONTACT_IDENTITY)
    }

    pub fn set_last_identity(&self, identity: &ContactIdentity) -> Result<()> {
        self.store.put_typed(keys::LAST_CONTACT_IDENTITY, identity)?;
        Ok(())
    }

    /// Data accrued on the current anonymous contact.
    pub fn anonymous_data(&self) -> Option<ContactData> {
        self.read_record(keys::ANON_CONTACT_DATA)
    }

    /// Store or clear anonymous data. Empty data is cleared.
    pub fn set_anonymous_data(&self, data: Option<&ContactData>) -> Result<()> {
        match data {
            Some(data) if !data.is_empty() => self.store.put_typed(keys::ANON_CONTACT_DATA, data)?,
            _ => self.store.remove(keys::ANON_CONTACT_DATA)?,
        }
        Ok(())
    }

    /// Read-modify-write anonymous data under the operation lock.
    pub fn update_anonymous_data(&self, f: impl FnOnce(&mut ContactData)) -> Result<()> {
        let _guard = self.lock();
        let mut data = self.anonymous_data().unwrap_or_default();
        f(&mut data);
        self.set_anonymous_data(Some(&data))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Resolve bookkeeping
    // ─────────────────────────────────────────────────────────────────────────

    /// When the identity was last resolved, in Unix millis.
    pub fn last_resolved_at(&self) -> Option<i64> {
        match self.store.get_i64(keys::LAST_RESOLVED_DATE) {
            Ok(value) => value,
            Err(e) => {
                error!(error = %e, "failed to read last resolved date");
                None
            }
        }
    }

    pub fn set_last_resolved_at(&self, millis: i64) -> Result<()> {
        self.store.put_i64(keys::LAST_RESOLVED_DATE, millis)?;
        Ok(())
    }

    pub fn is_contact_id_refreshed(&self) -> bool {
        self.contact_id_refreshed.load(Ordering::SeqCst)
    }

    pub fn set_contact_id_refreshed(&self, refreshed: bool) {
        self.contact_id_refreshed.store(refreshed, Ordering::SeqCst);
    }
}
