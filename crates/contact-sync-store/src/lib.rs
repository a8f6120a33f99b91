//! # Contact Sync Store
//!
//! Durable, string-keyed storage for the contact sync engine. The engine only
//! ever sees the [`KeyValueStore`] trait; the backends here are
//! [`SqliteStore`] for on-device persistence and [`MemoryStore`] for tests.
//!
//! ## Key Types
//!
//! - [`KeyValueStore`] - Synchronous get/put/remove of string values
//! - [`KeyValueStoreExt`] - JSON and integer helpers layered on top
//! - [`SqliteStore`] - SQLite-backed persistent store
//! - [`MemoryStore`] - In-memory store for tests
//!
//! ## Usage
//!
//! ```rust,no_run
//! use contact_sync_store::{KeyValueStore, KeyValueStoreExt, SqliteStore};
//! use serde_json::json;
//!
//! let store = SqliteStore::open("contact.db").unwrap();
//! store.put_json("some.key", &json!({"a": 1})).unwrap();
//! assert_eq!(store.get_json("some.key").unwrap()["a"], 1);
//! store.remove("some.key").unwrap();
//! ```
//!
//! ## Design Notes
//!
//! - **Synchronous**: every call is durable when it returns. Callers hold
//!   their own locks around read-modify-write sequences.
//! - **Missing is not an error**: absent keys read as `None` / `Value::Null`.
//! - **Shared handles**: `Arc<S>` is itself a store, so one backend can be
//!   handed to several owners.

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{KeyValueStore, KeyValueStoreExt};
