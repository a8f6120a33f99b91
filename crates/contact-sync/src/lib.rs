//! # Contact Sync
//!
//! The unified contact API: identify the device's user, edit their tags,
//! attributes and subscription lists, and register additional channels.
//!
//! ## Overview
//!
//! A [`Contact`] owns a durable operation log. Every public call appends to
//! the log and asks the host scheduler for a background job; nothing blocks
//! on the network. When the job runs, the engine reconciles the log with the
//! remote identity service one step at a time and retries transient
//! failures.
//!
//! ## Key Concepts
//!
//! - **Anonymous contact**: the contact a channel belongs to before
//!   `identify` is called. Data written to it is tracked locally.
//! - **Named contact**: a contact bound to a named user id.
//! - **Conflict**: identifying as a different user while the anonymous
//!   contact holds data. Listeners receive that data before it is dropped.
//! - **Privacy features**: `Contacts` and `TagsAndAttributes` gate every
//!   call. Disabling `Contacts` resets a named contact.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use contact_sync::engine::{MemoryContactService, RecordingDispatcher, StaticChannel};
//! use contact_sync::store::SqliteStore;
//! use contact_sync::{Contact, ContactConfig, ContactServices};
//!
//! async fn example() -> contact_sync::Result<()> {
//!     let store = SqliteStore::open("contact.db")?;
//!     let services = ContactServices::new(
//!         Arc::new(RecordingDispatcher::new()),
//!         Arc::new(StaticChannel::new("channel-id")),
//!     );
//!     let contact = Contact::new(
//!         store,
//!         MemoryContactService::new(),
//!         services,
//!         ContactConfig::default(),
//!     );
//!     contact.init();
//!
//!     contact.identify("user-123");
//!     contact
//!         .edit_attributes()
//!         .set_string("first_name", "Ada")
//!         .apply();
//!
//!     // Normally invoked by the host scheduler.
//!     let _result = contact.perform_job(contact_sync::engine::ACTION_UPDATE_CONTACT).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `contact_sync::core` - Operations, mutations and identities
//! - `contact_sync::store` - Key-value storage, in memory and SQLite
//! - `contact_sync::engine` - Operation log, planner and sync driver

pub mod contact;
pub mod editor;
pub mod error;
mod legacy;
pub mod privacy;

// Re-export component crates
pub use contact_sync_core as core;
pub use contact_sync_engine as engine;
pub use contact_sync_store as store;

// Re-export main types for convenience
pub use contact::{Contact, ContactConfig, ContactServices, MAX_NAMED_USER_ID_LENGTH};
pub use editor::{AttributeEditor, SubscriptionListEditor, TagGroupsEditor};
pub use error::{ContactError, Result};
pub use privacy::{Feature, PrivacyListener, PrivacyManager};

// Re-export commonly used core types
pub use contact_sync_core::{
    AssociatedChannel, AttributeMutation, ChannelType, ContactData, ContactIdentity,
    EmailRegistrationOptions, OpenChannelRegistrationOptions, Operation, Scope,
    ScopedSubscriptionListMutation, SmsRegistrationOptions, SubscriptionLists, TagGroupsMutation,
};
pub use contact_sync_engine::{ConflictEvent, JobResult, SyncConfig};
